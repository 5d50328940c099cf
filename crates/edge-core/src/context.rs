//! Intercepted request model.

use std::sync::atomic::{AtomicU64, Ordering};

use http::{HeaderMap, HeaderName, HeaderValue, Method};
use url::Url;

use crate::config::WorkerConfig;
use crate::identity::SiteLocale;
use crate::template;

/// Unique request identifier for log correlation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(pub String);

impl RequestId {
    /// Generate a new request ID.
    pub fn generate() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let id = format!(
            "{:x}-{:x}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        Self(id)
    }

    /// Create from an existing ID string.
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fetch mode of the intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    /// Top-level document navigation.
    Navigate,
    /// Same-origin only subresource or script request.
    SameOrigin,
    /// Cross-origin request with CORS.
    #[default]
    Cors,
    /// Opaque cross-origin request.
    NoCors,
}

/// What the requested resource will be used as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Destination {
    Document,
    Style,
    Script,
    Image,
    Font,
    /// fetch()/XHR requests.
    #[default]
    Empty,
    Other,
}

impl Destination {
    /// Whether this destination is a cacheable static asset class.
    pub fn is_static_asset(&self) -> bool {
        matches!(self, Self::Style | Self::Script | Self::Image | Self::Font)
    }
}

/// A request handed to the worker by its host.
#[derive(Debug, Clone)]
pub struct InterceptedRequest {
    /// Unique request identifier.
    pub request_id: RequestId,
    /// HTTP method.
    pub method: Method,
    /// Absolute request URL.
    pub url: Url,
    /// Request headers.
    pub headers: HeaderMap,
    /// Fetch mode.
    pub mode: RequestMode,
    /// Request destination.
    pub destination: Destination,
}

impl InterceptedRequest {
    /// Create a GET request for a URL.
    pub fn get(url: Url) -> Self {
        Self {
            request_id: RequestId::generate(),
            method: Method::GET,
            url,
            headers: HeaderMap::new(),
            mode: RequestMode::default(),
            destination: Destination::default(),
        }
    }

    /// Mark as a top-level navigation.
    pub fn navigate(mut self) -> Self {
        self.mode = RequestMode::Navigate;
        self.destination = Destination::Document;
        self
    }

    /// Set the fetch mode.
    pub fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the destination.
    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    /// Set the HTTP method.
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Add a header. Invalid names or values are ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Get a header value by name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Whether this is a top-level navigation.
    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }

    /// Whether the request targets the given origin.
    pub fn is_same_origin(&self, origin: &Url) -> bool {
        self.url.origin() == origin.origin()
    }

    /// Path plus query string (e.g. "/s/RefArch/en_US/Cart-Show?x=1").
    pub fn path_and_query(&self) -> String {
        template::path_and_query(&self.url)
    }

    /// Identity carried by the two identity headers, if both are present.
    pub fn header_identity(&self, config: &WorkerConfig) -> Option<SiteLocale> {
        let site = self.header(&config.site_id_header).filter(|s| !s.is_empty())?;
        let locale = self.header(&config.locale_header).filter(|s| !s.is_empty())?;
        Some(SiteLocale::new(site, locale))
    }

    /// Best-known identity: headers, then path, then the configured default.
    pub fn identity(&self, config: &WorkerConfig) -> SiteLocale {
        self.header_identity(config)
            .or_else(|| SiteLocale::from_path(self.url.path(), &config.site_path_prefix))
            .unwrap_or_else(|| config.default_identity())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> WorkerConfig {
        WorkerConfig::new(
            "https://shop.example.com",
            "/offline",
            SiteLocale::new("RefArch", "en_US"),
            "v1",
        )
    }

    fn request(url: &str) -> InterceptedRequest {
        InterceptedRequest::get(Url::parse(url).unwrap())
    }

    #[test]
    fn test_request_ids_are_unique() {
        assert_ne!(RequestId::generate(), RequestId::generate());
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let req = request("https://shop.example.com/").with_header("X-SF-Site-Id", "Outlet");
        assert_eq!(req.header("x-sf-site-id"), Some("Outlet"));
    }

    #[test]
    fn test_header_identity_requires_both_headers() {
        let req = request("https://shop.example.com/").with_header("x-sf-site-id", "Outlet");
        assert!(req.header_identity(&config()).is_none());

        let req = req.with_header("x-sf-locale", "de_DE");
        assert_eq!(
            req.header_identity(&config()),
            Some(SiteLocale::new("Outlet", "de_DE"))
        );
    }

    #[test]
    fn test_identity_falls_back_to_path_then_default() {
        let req = request("https://shop.example.com/s/Outlet/fr_FR/Home-Show");
        assert_eq!(req.identity(&config()), SiteLocale::new("Outlet", "fr_FR"));

        let req = request("https://shop.example.com/robots.txt");
        assert_eq!(req.identity(&config()), SiteLocale::new("RefArch", "en_US"));
    }

    #[test]
    fn test_same_origin() {
        let origin = Url::parse("https://shop.example.com").unwrap();
        assert!(request("https://shop.example.com/a").is_same_origin(&origin));
        assert!(!request("https://cdn.example.com/a").is_same_origin(&origin));
        assert!(!request("http://shop.example.com/a").is_same_origin(&origin));
    }

    #[test]
    fn test_path_and_query() {
        assert_eq!(
            request("https://shop.example.com/a/b?x=1").path_and_query(),
            "/a/b?x=1"
        );
        assert_eq!(request("https://shop.example.com/a/b").path_and_query(), "/a/b");
    }
}
