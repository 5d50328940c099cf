//! Site and locale request identity.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The site/locale pair a request belongs to.
///
/// Keyed cache entries and fragment URLs are scoped by this pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SiteLocale {
    /// Site identifier (e.g. "RefArch").
    pub site_id: String,
    /// Locale (e.g. "en_US").
    pub locale: String,
}

impl SiteLocale {
    /// Create a new identity.
    pub fn new(site_id: impl Into<String>, locale: impl Into<String>) -> Self {
        Self {
            site_id: site_id.into(),
            locale: locale.into(),
        }
    }

    /// Parse the identity out of a path shaped `{prefix}{site}/{locale}/...`.
    pub fn from_path(path: &str, site_path_prefix: &str) -> Option<Self> {
        let rest = path.strip_prefix(site_path_prefix)?;
        let mut segments = rest.split('/');
        let site = segments.next().filter(|s| !s.is_empty())?;
        let locale = segments.next().filter(|s| !s.is_empty())?;
        // A lone trailing segment is a page, not a locale.
        segments.next()?;
        Some(Self::new(site, locale))
    }
}

impl fmt::Display for SiteLocale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.site_id, self.locale)
    }
}
