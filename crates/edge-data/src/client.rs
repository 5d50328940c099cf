//! Fetch abstraction and the `reqwest` client behind it.

use std::time::Duration;

use async_trait::async_trait;
use edge_core::{Body, InterceptedRequest, Response};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use url::Url;

/// Error type for fetch operations.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The network could not be reached or the exchange broke off.
    #[error("network error for {url}: {reason}")]
    Network { url: String, reason: String },

    /// The server answered with a status the caller cannot use.
    #[error("HTTP error: {status} for {url}")]
    Status { status: u16, url: String },

    /// The client could not be constructed.
    #[error("client error: {0}")]
    Client(String),
}

impl FetchError {
    /// Build a status error.
    pub fn status(status: http::StatusCode, url: &Url) -> Self {
        Self::Status {
            status: status.as_u16(),
            url: url.to_string(),
        }
    }
}

/// How redirects are handled for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RedirectMode {
    /// Follow redirects and return the final response.
    #[default]
    Follow,
    /// Return the first response; a 3xx comes back as an opaque redirect.
    Manual,
}

/// An outbound request.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute target URL.
    pub url: Url,
    /// Request headers.
    pub headers: HeaderMap,
    /// Redirect handling.
    pub redirect: RedirectMode,
}

impl FetchRequest {
    /// A GET request for a URL.
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: HeaderMap::new(),
            redirect: RedirectMode::Follow,
        }
    }

    /// Forward an intercepted request, keeping method and headers.
    pub fn from_intercepted(request: &InterceptedRequest) -> Self {
        Self {
            method: request.method.clone(),
            url: request.url.clone(),
            headers: request.headers.clone(),
            redirect: RedirectMode::Follow,
        }
    }

    /// Replace the target URL.
    pub fn with_url(mut self, url: Url) -> Self {
        self.url = url;
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

    /// Set redirect handling.
    pub fn with_redirect(mut self, redirect: RedirectMode) -> Self {
        self.redirect = redirect;
        self
    }
}

/// The worker's only route to the network.
#[async_trait]
pub trait Fetcher: Send + Sync + 'static {
    /// Perform a request. Any status the server returns is a response;
    /// only transport failures are errors.
    async fn fetch(&self, request: FetchRequest) -> Result<Response, FetchError>;
}

/// Settings for [`HttpFetcher`].
#[derive(Debug, Clone)]
pub struct HttpFetcherConfig {
    /// User-Agent header sent with every request.
    pub user_agent: String,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Maximum redirects followed in [`RedirectMode::Follow`].
    pub max_redirects: usize,
}

impl Default for HttpFetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("edge-stitch/{}", env!("CARGO_PKG_VERSION")),
            connect_timeout: Duration::from_secs(10),
            max_redirects: 10,
        }
    }
}

/// [`Fetcher`] over `reqwest`, streaming response bodies.
pub struct HttpFetcher {
    follow: reqwest::Client,
    manual: reqwest::Client,
}

impl HttpFetcher {
    /// Create a fetcher with default settings.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_config(HttpFetcherConfig::default())
    }

    /// Create a fetcher with explicit settings.
    pub fn with_config(config: HttpFetcherConfig) -> Result<Self, FetchError> {
        let build = |policy: reqwest::redirect::Policy| {
            reqwest::Client::builder()
                .user_agent(&config.user_agent)
                .connect_timeout(config.connect_timeout)
                .redirect(policy)
                .use_rustls_tls()
                .build()
                .map_err(|e| FetchError::Client(format!("failed to build HTTP client: {}", e)))
        };

        Ok(Self {
            follow: build(reqwest::redirect::Policy::limited(config.max_redirects))?,
            manual: build(reqwest::redirect::Policy::none())?,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: FetchRequest) -> Result<Response, FetchError> {
        let client = match request.redirect {
            RedirectMode::Follow => &self.follow,
            RedirectMode::Manual => &self.manual,
        };

        let url = request.url.clone();
        let response = client
            .request(request.method, request.url)
            .headers(request.headers)
            .send()
            .await
            .map_err(|e| FetchError::Network {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        let headers = response.headers().clone();
        tracing::debug!(%url, status = status.as_u16(), "fetched");

        let body = Body::from_stream(response.bytes_stream());
        let mut out = Response::new(status).with_headers(headers).with_body(body);
        if request.redirect == RedirectMode::Manual && status.is_redirection() {
            out = out.opaque_redirect();
        }
        Ok(out)
    }
}
