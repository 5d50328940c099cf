//! Cache key composition.

use edge_core::{SiteLocale, WorkerConfig};
use serde::{Deserialize, Serialize};

/// Prefix shared by every generation this worker creates.
pub const GENERATION_PREFIX: &str = "edge-stitch";

/// Identifier of one cache generation.
///
/// Derived from the build version and the backend cache version, so a new
/// deployment or a backend cache flush starts from an empty cache.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CacheGeneration(String);

impl CacheGeneration {
    /// Build the generation for a build version and cache version tag.
    pub fn new(build_version: &str, cache_version_tag: &str) -> Self {
        Self(format!(
            "{}-{}-{}",
            GENERATION_PREFIX, build_version, cache_version_tag
        ))
    }

    /// The generation a configuration runs under.
    pub fn from_config(config: &WorkerConfig) -> Self {
        Self::new(&config.build_version, &config.cache_version_tag)
    }

    /// Wrap an existing generation name (e.g. one listed by a store).
    pub fn from_name(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the generation name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheGeneration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Key of an entry inside one generation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKey {
    /// A per-site/locale entry (fragment or keyed AJAX response).
    Keyed {
        site_id: String,
        locale: String,
        suffix: String,
    },
    /// A static asset keyed by its absolute URL.
    Url(String),
}

impl EntryKey {
    /// Key `{site}.{locale}.{suffix}`.
    pub fn keyed(identity: &SiteLocale, suffix: impl Into<String>) -> Self {
        Self::Keyed {
            site_id: identity.site_id.clone(),
            locale: identity.locale.clone(),
            suffix: suffix.into(),
        }
    }

    /// Key for a URL.
    pub fn url(url: impl Into<String>) -> Self {
        Self::Url(url.into())
    }

    /// The resource suffix of a keyed entry.
    pub fn suffix(&self) -> Option<&str> {
        match self {
            Self::Keyed { suffix, .. } => Some(suffix),
            Self::Url(_) => None,
        }
    }
}

impl std::fmt::Display for EntryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Keyed {
                site_id,
                locale,
                suffix,
            } => write!(f, "{}.{}.{}", site_id, locale, suffix),
            Self::Url(url) => write!(f, "{}", url),
        }
    }
}

/// A fully qualified cache key: generation plus entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub generation: CacheGeneration,
    pub entry: EntryKey,
}

impl CacheKey {
    /// Create a cache key.
    pub fn new(generation: CacheGeneration, entry: EntryKey) -> Self {
        Self { generation, entry }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.generation, self.entry)
    }
}
