//! Scripted in-memory fetcher.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use edge_core::{Body, Response};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};

use crate::client::{FetchError, FetchRequest, Fetcher, RedirectMode};

/// A canned response for one URL.
#[derive(Debug, Clone)]
pub struct MockRoute {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Body, delivered as these chunks in order.
    pub chunks: Vec<Bytes>,
    /// Delay before the response head is returned.
    pub delay: Option<Duration>,
}

impl MockRoute {
    /// A 200 response with a single-chunk body.
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self::status(StatusCode::OK).with_chunks([body.into()])
    }

    /// An empty response with a status.
    pub fn status(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            chunks: Vec::new(),
            delay: None,
        }
    }

    /// A redirect to `location`.
    pub fn redirect(status: StatusCode, location: &str) -> Self {
        Self::status(status).with_header("location", location)
    }

    /// Replace the body with several chunks.
    pub fn with_chunks<I, B>(mut self, chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        self.chunks = chunks.into_iter().map(Into::into).collect();
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

    /// Delay the response.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// [`Fetcher`] answering from a table of routes and recording every request.
///
/// Unknown URLs get a 404. While offline every request fails with
/// [`FetchError::Network`].
#[derive(Default)]
pub struct MockFetcher {
    routes: Mutex<HashMap<String, MockRoute>>,
    requests: Mutex<Vec<FetchRequest>>,
    offline: AtomicBool,
}

impl MockFetcher {
    /// Create an empty fetcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a route (builder form).
    pub fn with_route(self, url: &str, route: MockRoute) -> Self {
        self.set_route(url, route);
        self
    }

    /// Register or replace a route. `url` is matched against the full
    /// request URL including its query.
    pub fn set_route(&self, url: &str, route: MockRoute) {
        if let Ok(mut routes) = self.routes.lock() {
            routes.insert(url.to_string(), route);
        }
    }

    /// Simulate losing or regaining the network.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Every request seen so far.
    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Number of requests seen for a URL.
    pub fn count(&self, url: &str) -> usize {
        self.requests
            .lock()
            .map(|r| r.iter().filter(|req| req.url.as_str() == url).count())
            .unwrap_or(0)
    }

    /// Total number of requests seen.
    pub fn total(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: FetchRequest) -> Result<Response, FetchError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        if self.offline.load(Ordering::SeqCst) {
            return Err(FetchError::Network {
                url: request.url.to_string(),
                reason: "offline".to_string(),
            });
        }

        let route = self
            .routes
            .lock()
            .ok()
            .and_then(|routes| routes.get(request.url.as_str()).cloned())
            .unwrap_or_else(|| MockRoute::status(StatusCode::NOT_FOUND));

        if let Some(delay) = route.delay {
            tokio::time::sleep(delay).await;
        }

        let mut response = Response::new(route.status)
            .with_headers(route.headers)
            .with_body(Body::from_chunks(route.chunks));
        if request.redirect == RedirectMode::Manual && route.status.is_redirection() {
            response = response.opaque_redirect();
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use url::Url;

    use super::*;

    fn get(url: &str) -> FetchRequest {
        FetchRequest::get(Url::parse(url).unwrap())
    }

    // === Routing Tests ===

    #[tokio::test]
    async fn test_known_route() {
        let fetcher = MockFetcher::new().with_route(
            "https://shop.example.com/a",
            MockRoute::ok("hello").with_header("content-type", "text/plain"),
        );
        let response = fetcher.fetch(get("https://shop.example.com/a")).await.unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.header("content-type"), Some("text/plain"));
        assert_eq!(response.body.collect().await.unwrap(), Bytes::from("hello"));
        assert_eq!(fetcher.count("https://shop.example.com/a"), 1);
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let fetcher = MockFetcher::new();
        let response = fetcher.fetch(get("https://shop.example.com/nope")).await.unwrap();
        assert_eq!(response.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_offline_fails_and_records() {
        let fetcher =
            MockFetcher::new().with_route("https://shop.example.com/a", MockRoute::ok("x"));
        fetcher.set_offline(true);
        let err = fetcher.fetch(get("https://shop.example.com/a")).await.unwrap_err();
        assert!(matches!(err, FetchError::Network { .. }));
        assert_eq!(fetcher.total(), 1);
    }

    #[tokio::test]
    async fn test_manual_redirect_is_opaque() {
        let fetcher = MockFetcher::new().with_route(
            "https://shop.example.com/old",
            MockRoute::redirect(StatusCode::FOUND, "/new"),
        );
        let follow = fetcher.fetch(get("https://shop.example.com/old")).await.unwrap();
        assert_eq!(follow.response_type, edge_core::ResponseType::Basic);

        let manual = fetcher
            .fetch(get("https://shop.example.com/old").with_redirect(RedirectMode::Manual))
            .await
            .unwrap();
        assert!(manual.is_redirect());
        assert_eq!(manual.response_type, edge_core::ResponseType::OpaqueRedirect);
        assert_eq!(manual.header("location"), Some("/new"));
    }
}
