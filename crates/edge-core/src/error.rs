//! Configuration error types.

use thiserror::Error;

/// Errors raised while loading or validating a [`WorkerConfig`](crate::WorkerConfig).
///
/// Every variant is fatal: a worker never starts with a configuration that
/// produced one of these.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse a TOML configuration.
    #[error("Failed to parse TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    /// Failed to parse a JSON configuration.
    #[error("Failed to parse JSON config: {0}")]
    Json(#[from] serde_json::Error),

    /// A URL in the configuration could not be parsed.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// One placeholder token is a strict prefix of another.
    #[error("Placeholder token '{shorter}' is a prefix of '{longer}'")]
    AmbiguousTokens { shorter: String, longer: String },

    /// Two resources share the same cache suffix.
    #[error("Duplicate cache suffix: {0}")]
    DuplicateSuffix(String),

    /// Any other invalid value.
    #[error("Invalid config: {0}")]
    Invalid(String),
}
