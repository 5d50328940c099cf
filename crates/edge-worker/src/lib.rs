//! The edge-stitch worker.
//!
//! This crate provides:
//! - `Worker` - Lifecycle (install, activate, kill switch) and request handling
//! - `classify` / `Strategy` - Pure request classification
//! - `Outcome` - Response override or pass-through
//! - `BackgroundTasks` - Effects that must not delay a response
//! - `ClientMessage` - Notifications broadcast to controlled clients
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use edge_cache::MemoryStore;
//! use edge_core::{InterceptedRequest, WorkerConfig};
//! use edge_data::HttpFetcher;
//! use edge_worker::{Outcome, Worker};
//!
//! let config = WorkerConfig::load("edge-stitch.toml")?;
//! let worker = Worker::new(config, Arc::new(MemoryStore::new()), Arc::new(HttpFetcher::new()?))?;
//! worker.install().await?;
//! worker.activate().await?;
//!
//! match worker.handle(InterceptedRequest::get(url).navigate()).await? {
//!     Outcome::Respond(response) => { /* send it */ }
//!     Outcome::PassThrough => { /* let the request proceed */ }
//! }
//! ```

mod background;
mod dispatch;
mod error;
mod fallback;
mod keyed;
mod lifecycle;
mod navigation;
mod static_assets;
mod worker;

pub use background::*;
pub use dispatch::*;
pub use error::*;
pub use fallback::*;
pub use lifecycle::*;
pub use worker::*;
