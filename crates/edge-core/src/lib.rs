//! Core types for the edge-stitch fragment caching worker.
//!
//! This crate provides the fundamental types shared by every other crate:
//! - `WorkerConfig` - Host-supplied configuration (fragments, keyed URLs, identity)
//! - `InterceptedRequest` - A request handed to the worker by its host
//! - `SiteLocale` - Site/locale request identity
//! - `Response` / `Body` - Streaming response model
//! - `WorkerPhase` - Worker lifecycle tracking

mod config;
mod context;
mod error;
mod identity;
mod lifecycle;
mod message;
mod template;

pub use config::*;
pub use context::*;
pub use error::*;
pub use identity::*;
pub use lifecycle::*;
pub use message::*;
pub use template::*;
