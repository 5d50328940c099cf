//! Placeholder scanning and streaming fragment substitution.
//!
//! This crate rewrites navigation bodies without buffering them:
//! - `PlaceholderSet` - Byte-level token scanner tolerant of chunk splits
//! - `StreamRewriter` - Pull-driven rewriter interleaving pass-through bytes with fragments
//! - `FragmentSource` - Where substituted fragment bytes come from

mod rewriter;
mod scanner;

pub use rewriter::*;
pub use scanner::*;
