//! Observability for the edge-stitch worker.
//!
//! This crate provides:
//! - `StructuredLogger` - Request-correlated structured logging
//! - `LogConfig` - Shared settings producing one logger per request
//! - `init_tracing` - `tracing` subscriber setup for binaries

mod logging;
mod subscriber;

pub use logging::*;
pub use subscriber::*;

// Re-export RequestId from edge-core for convenience
pub use edge_core::RequestId;
