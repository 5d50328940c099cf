//! Worker errors.

use edge_cache::CacheError;
use edge_core::{BoxError, ConfigError, WorkerPhase};
use edge_data::FetchError;
use edge_streaming::ScanError;

/// Errors surfaced by the worker.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// The configuration is invalid.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The placeholder tokens are malformed.
    #[error("invalid placeholders: {0}")]
    Scan(#[from] ScanError),

    /// A network fetch failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The cache store failed where it could not be bypassed.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// A response body broke off while being read.
    #[error("body of {url} failed: {source}")]
    Body {
        url: String,
        #[source]
        source: BoxError,
    },

    /// A lifecycle step was called in the wrong phase.
    #[error("cannot {action} while {phase}")]
    Lifecycle {
        action: &'static str,
        phase: WorkerPhase,
    },
}
