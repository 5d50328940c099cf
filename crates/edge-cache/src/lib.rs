//! Caching for the edge-stitch worker.
//!
//! This crate provides:
//! - `CacheGeneration` / `CacheKey` - Generation-scoped cache keys
//! - `CacheStore` - Storage trait, with `MemoryStore` and `DiskStore`
//! - `FragmentResolver` - Cache-or-fetch resolution of page fragments
//! - `InvalidationIndex` - Trigger URLs that purge keyed entries
//! - `header_names` / `CacheStatus` - Response headers describing cache use
//!
//! # Example
//!
//! ```ignore
//! use edge_cache::{CacheGeneration, CacheKey, EntryKey};
//! use edge_core::SiteLocale;
//!
//! let key = CacheKey::new(
//!     CacheGeneration::new("1.4.0", "v7"),
//!     EntryKey::keyed(&SiteLocale::new("RefArch", "en_US"), "header"),
//! );
//! assert_eq!(key.to_string(), "edge-stitch-1.4.0-v7/RefArch.en_US.header");
//! ```

mod disk;
mod fragment;
mod headers;
mod invalidation;
mod key;
mod store;

pub use disk::*;
pub use fragment::*;
pub use headers::*;
pub use invalidation::*;
pub use key::*;
pub use store::*;
