//! Request classification.
//!
//! `classify` is pure: it looks at the request and the configuration only.
//! Rules are tried in order and the first match wins:
//!
//! 1. same-origin GET with both identity headers whose path and query equal
//!    a keyed URL localized to that identity: keyed cache
//! 2. top-level GET navigation: navigation rewrite
//! 3. GET of a static asset under the static path marker, on any origin:
//!    static cache (same-origin assets also get the background invalidation)
//! 4. any other same-origin request: no override, background invalidation
//! 5. everything else: no override

use edge_core::{localize_url, path_and_query, InterceptedRequest, SiteLocale, WorkerConfig};
use http::Method;
use url::Url;

/// File extensions treated as static assets regardless of destination.
const STATIC_EXTENSIONS: &[&str] = &[
    "css", "js", "mjs", "map", "png", "jpg", "jpeg", "gif", "svg", "webp", "avif", "ico",
    "woff", "woff2", "ttf", "otf", "eot",
];

/// How a request is handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// Cache-or-fetch under `{site}.{locale}.{suffix}`.
    KeyedCache {
        suffix: String,
        identity: SiteLocale,
    },
    /// Fetch with skip parameters and stream through the rewriter.
    Navigation,
    /// Let the request through; check invalidation triggers in the background.
    SameOrigin,
    /// Cache-or-fetch keyed by URL.
    StaticAsset,
    /// Let the request through untouched.
    PassThrough,
}

impl Strategy {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::KeyedCache { .. } => "keyed-cache",
            Self::Navigation => "navigation",
            Self::SameOrigin => "same-origin",
            Self::StaticAsset => "static-cache",
            Self::PassThrough => "pass-through",
        }
    }

    /// Whether the worker produces the response itself.
    pub fn overrides_response(&self) -> bool {
        matches!(
            self,
            Self::KeyedCache { .. } | Self::Navigation | Self::StaticAsset
        )
    }
}

/// Pick the strategy for a request.
pub fn classify(request: &InterceptedRequest, config: &WorkerConfig, origin: &Url) -> Strategy {
    let same_origin = request.is_same_origin(origin);
    let is_get = request.method == Method::GET;

    if same_origin && is_get {
        if let Some(strategy) = match_keyed(request, config) {
            return strategy;
        }
    }

    if is_get && request.is_navigation() {
        return Strategy::Navigation;
    }

    if is_get && is_static_asset(request, config) {
        return Strategy::StaticAsset;
    }

    if same_origin {
        return Strategy::SameOrigin;
    }

    Strategy::PassThrough
}

fn match_keyed(request: &InterceptedRequest, config: &WorkerConfig) -> Option<Strategy> {
    let identity = request.header_identity(config)?;
    let default_identity = config.default_identity();
    let target = request.path_and_query();

    config.cached_urls.iter().find_map(|cached| {
        let url = config.absolute_url(&cached.url).ok()?;
        let candidate = path_and_query(&localize_url(&url, &default_identity, &identity));
        (candidate == target).then(|| Strategy::KeyedCache {
            suffix: cached.cache_suffix.clone(),
            identity: identity.clone(),
        })
    })
}

fn is_static_asset(request: &InterceptedRequest, config: &WorkerConfig) -> bool {
    let path = request.url.path();
    if !path.contains(config.static_path_marker.as_str()) {
        return false;
    }
    request.destination.is_static_asset() || has_static_extension(path)
}

fn has_static_extension(path: &str) -> bool {
    let file = path.rsplit('/').next().unwrap_or(path);
    file.rsplit_once('.')
        .is_some_and(|(_, ext)| STATIC_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}
