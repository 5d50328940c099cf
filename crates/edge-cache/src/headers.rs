//! Header names and cache status reporting.

use serde::{Deserialize, Serialize};

/// Header names used by the worker.
pub mod header_names {
    /// Cache status of a keyed or static response (HIT, MISS).
    pub const X_CACHE_STATUS: &str = "x-edge-stitch-cache";
    /// Cache generation that served or stored the response.
    pub const X_CACHE_GENERATION: &str = "x-edge-stitch-generation";
}

/// Status of a cache lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    /// Served from the cache.
    Hit,
    /// Fetched from the network.
    Miss,
}

impl CacheStatus {
    /// Header pair announcing this status.
    pub fn header(&self) -> (&'static str, &'static str) {
        let value = match self {
            Self::Hit => "HIT",
            Self::Miss => "MISS",
        };
        (header_names::X_CACHE_STATUS, value)
    }
}

impl std::fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.header().1)
    }
}
