//! Worker configuration.
//!
//! The host application generates one `WorkerConfig` per deployment. It is
//! loaded and validated once at startup and shared read-only afterwards.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::identity::SiteLocale;

/// A fragment substituted into navigation responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedPart {
    /// Placeholder token in the base document (e.g. "$swheader$").
    pub placeholder_token: String,
    /// Logical resource suffix of the cache key.
    pub cache_suffix: String,
    /// URL the fragment is fetched from, generated for the default identity.
    pub source_url: String,
    /// Query parameter telling the backend to omit this fragment.
    pub skip_parameter: String,
    /// URLs whose requests invalidate this fragment.
    #[serde(default)]
    pub invalidation_triggers: BTreeSet<String>,
}

impl CachedPart {
    /// Create a new fragment definition.
    pub fn new(
        placeholder_token: impl Into<String>,
        cache_suffix: impl Into<String>,
        source_url: impl Into<String>,
        skip_parameter: impl Into<String>,
    ) -> Self {
        Self {
            placeholder_token: placeholder_token.into(),
            cache_suffix: cache_suffix.into(),
            source_url: source_url.into(),
            skip_parameter: skip_parameter.into(),
            invalidation_triggers: BTreeSet::new(),
        }
    }

    /// Add an invalidation trigger URL.
    pub fn invalidated_by(mut self, trigger: impl Into<String>) -> Self {
        self.invalidation_triggers.insert(trigger.into());
        self
    }

    /// Placeholder token as raw bytes.
    pub fn token_bytes(&self) -> &[u8] {
        self.placeholder_token.as_bytes()
    }
}

/// A same-origin AJAX URL cached per site/locale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedUrl {
    /// URL template, generated for the default identity.
    pub url: String,
    /// Logical resource suffix of the cache key.
    pub cache_suffix: String,
    /// URLs whose requests invalidate this entry.
    #[serde(default)]
    pub invalidation_triggers: BTreeSet<String>,
}

impl CachedUrl {
    /// Create a new keyed URL definition.
    pub fn new(url: impl Into<String>, cache_suffix: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            cache_suffix: cache_suffix.into(),
            invalidation_triggers: BTreeSet::new(),
        }
    }

    /// Add an invalidation trigger URL.
    pub fn invalidated_by(mut self, trigger: impl Into<String>) -> Self {
        self.invalidation_triggers.insert(trigger.into());
        self
    }
}

/// Full worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Origin the worker serves (e.g. "https://shop.example.com").
    pub origin: String,
    /// Page served when a navigation cannot reach the network.
    pub offline_url: String,
    /// Fragments substituted into navigation responses.
    #[serde(default)]
    pub cached_parts: Vec<CachedPart>,
    /// Keyed AJAX URLs.
    #[serde(default)]
    pub cached_urls: Vec<CachedUrl>,
    /// Site id the configured URLs were generated for.
    pub url_site_id: String,
    /// Locale the configured URLs were generated for.
    pub url_locale: String,
    /// Backend cache version; part of the cache generation.
    pub cache_version_tag: String,
    /// Build version; part of the cache generation.
    #[serde(default = "default_build_version")]
    pub build_version: String,
    /// Kill switch. When false the worker unregisters on activation.
    #[serde(default = "default_true")]
    pub sw_enabled: bool,
    /// Common prefix of every placeholder token.
    #[serde(default = "default_placeholder_prefix")]
    pub placeholder_prefix: String,
    /// Path prefix preceding the `{site}/{locale}` segments.
    #[serde(default = "default_site_path_prefix")]
    pub site_path_prefix: String,
    /// Path marker identifying static assets.
    #[serde(default = "default_static_path_marker")]
    pub static_path_marker: String,
    /// Request header carrying the site id.
    #[serde(default = "default_site_id_header")]
    pub site_id_header: String,
    /// Request header carrying the locale.
    #[serde(default = "default_locale_header")]
    pub locale_header: String,
    /// Header added to rewritten navigation responses.
    #[serde(default = "default_marker_header")]
    pub marker_header: String,
}

fn default_build_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_true() -> bool {
    true
}

fn default_placeholder_prefix() -> String {
    "$sw".to_string()
}

fn default_site_path_prefix() -> String {
    "/s/".to_string()
}

fn default_static_path_marker() -> String {
    "/static/".to_string()
}

fn default_site_id_header() -> String {
    "x-sf-site-id".to_string()
}

fn default_locale_header() -> String {
    "x-sf-locale".to_string()
}

fn default_marker_header() -> String {
    "x-edge-stitch".to_string()
}

impl WorkerConfig {
    /// Create a configuration with defaults for everything optional.
    pub fn new(
        origin: impl Into<String>,
        offline_url: impl Into<String>,
        default_identity: SiteLocale,
        cache_version_tag: impl Into<String>,
    ) -> Self {
        Self {
            origin: origin.into(),
            offline_url: offline_url.into(),
            cached_parts: Vec::new(),
            cached_urls: Vec::new(),
            url_site_id: default_identity.site_id,
            url_locale: default_identity.locale,
            cache_version_tag: cache_version_tag.into(),
            build_version: default_build_version(),
            sw_enabled: true,
            placeholder_prefix: default_placeholder_prefix(),
            site_path_prefix: default_site_path_prefix(),
            static_path_marker: default_static_path_marker(),
            site_id_header: default_site_id_header(),
            locale_header: default_locale_header(),
            marker_header: default_marker_header(),
        }
    }

    /// Add a substituted fragment.
    pub fn with_part(mut self, part: CachedPart) -> Self {
        self.cached_parts.push(part);
        self
    }

    /// Add a keyed AJAX URL.
    pub fn with_url(mut self, url: CachedUrl) -> Self {
        self.cached_urls.push(url);
        self
    }

    /// Set the build version.
    pub fn with_build_version(mut self, version: impl Into<String>) -> Self {
        self.build_version = version.into();
        self
    }

    /// Set the kill switch.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.sw_enabled = enabled;
        self
    }

    /// Load and validate a config file. `.json` files are parsed as JSON,
    /// anything else as TOML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let config = if path.extension().is_some_and(|ext| ext == "json") {
            Self::from_json_str(&content)?
        } else {
            Self::from_toml_str(&content)?
        };

        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document without validating it.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Parse a JSON document without validating it.
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    /// The identity the configured URLs were generated for.
    pub fn default_identity(&self) -> SiteLocale {
        SiteLocale::new(&self.url_site_id, &self.url_locale)
    }

    /// Parsed origin URL.
    pub fn origin_url(&self) -> Result<url::Url, ConfigError> {
        url::Url::parse(&self.origin).map_err(|e| ConfigError::InvalidUrl {
            url: self.origin.clone(),
            reason: e.to_string(),
        })
    }

    /// Resolve a configured (possibly relative) URL against the origin.
    pub fn absolute_url(&self, url: &str) -> Result<url::Url, ConfigError> {
        self.origin_url()?
            .join(url)
            .map_err(|e| ConfigError::InvalidUrl {
                url: url.to_string(),
                reason: e.to_string(),
            })
    }

    /// Check the configuration for values the worker cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let origin = self.origin_url()?;
        if !matches!(origin.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl {
                url: self.origin.clone(),
                reason: "origin must be http or https".to_string(),
            });
        }

        if self.offline_url.is_empty() {
            return Err(ConfigError::Invalid("offline_url is empty".to_string()));
        }
        self.absolute_url(&self.offline_url)?;

        for (name, value) in [
            ("url_site_id", &self.url_site_id),
            ("url_locale", &self.url_locale),
            ("cache_version_tag", &self.cache_version_tag),
            ("placeholder_prefix", &self.placeholder_prefix),
        ] {
            if value.is_empty() {
                return Err(ConfigError::Invalid(format!("{} is empty", name)));
            }
        }

        let mut suffixes = HashSet::new();
        let all_suffixes = self
            .cached_parts
            .iter()
            .map(|p| &p.cache_suffix)
            .chain(self.cached_urls.iter().map(|u| &u.cache_suffix));
        for suffix in all_suffixes {
            if suffix.is_empty() || suffix.contains(['.', '/']) {
                return Err(ConfigError::Invalid(format!(
                    "cache suffix '{}' must be non-empty and contain no '.' or '/'",
                    suffix
                )));
            }
            if !suffixes.insert(suffix.as_str()) {
                return Err(ConfigError::DuplicateSuffix(suffix.clone()));
            }
        }

        for part in &self.cached_parts {
            self.absolute_url(&part.source_url)?;
            if part.skip_parameter.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "fragment '{}' has no skip parameter",
                    part.cache_suffix
                )));
            }
        }

        for url in &self.cached_urls {
            self.absolute_url(&url.url)?;
        }

        if let Some((shorter, longer)) = self.ambiguous_tokens() {
            return Err(ConfigError::AmbiguousTokens { shorter, longer });
        }

        Ok(())
    }

    /// Find a placeholder token that is a prefix of (or equal to) another.
    fn ambiguous_tokens(&self) -> Option<(String, String)> {
        for (i, a) in self.cached_parts.iter().enumerate() {
            for (j, b) in self.cached_parts.iter().enumerate() {
                if i != j && b.placeholder_token.starts_with(&a.placeholder_token) {
                    return Some((a.placeholder_token.clone(), b.placeholder_token.clone()));
                }
            }
        }
        None
    }
}
