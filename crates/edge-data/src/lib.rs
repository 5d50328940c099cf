//! Network access for the edge-stitch worker.
//!
//! This crate provides:
//! - `Fetcher` - The seam through which the worker reaches the network
//! - `FetchRequest` / `RedirectMode` - Outbound request description
//! - `HttpFetcher` - `reqwest`-backed implementation
//! - `MockFetcher` - Scripted in-memory implementation for tests (`test-util`)

mod client;
#[cfg(any(test, feature = "test-util"))]
mod mock;

pub use client::*;
#[cfg(any(test, feature = "test-util"))]
pub use mock::*;
