//! Streaming response model.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};

/// Boxed error carried by body streams.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A streamed response body.
pub struct Body {
    inner: BoxStream<'static, Result<Bytes, BoxError>>,
}

impl Body {
    /// An empty body.
    pub fn empty() -> Self {
        Self {
            inner: stream::empty().boxed(),
        }
    }

    /// A body made of a single chunk.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Self::empty();
        }
        Self {
            inner: stream::once(async move { Ok(bytes) }).boxed(),
        }
    }

    /// A body made of several chunks, delivered one at a time.
    pub fn from_chunks<I, B>(chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        I::IntoIter: Send + 'static,
        B: Into<Bytes>,
    {
        Self {
            inner: stream::iter(chunks.into_iter().map(|c| Ok(c.into()))).boxed(),
        }
    }

    /// Wrap any stream of chunks.
    pub fn from_stream<S, E>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        Self {
            inner: stream.map(|item| item.map_err(Into::into)).boxed(),
        }
    }

    /// Pass chunks through unchanged while keeping a copy.
    ///
    /// When the stream ends cleanly `on_complete` receives every byte read.
    /// A stream that fails or is dropped early never calls it.
    pub fn tee<F>(self, on_complete: F) -> Self
    where
        F: FnOnce(Bytes) + Send + 'static,
    {
        Self {
            inner: Tee {
                inner: self.inner,
                copy: BytesMut::new(),
                on_complete: Some(Box::new(on_complete)),
            }
            .boxed(),
        }
    }

    /// Read the whole body into memory.
    pub async fn collect(mut self) -> Result<Bytes, BoxError> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.inner.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }
}

impl Stream for Body {
    type Item = Result<Bytes, BoxError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

struct Tee {
    inner: BoxStream<'static, Result<Bytes, BoxError>>,
    copy: BytesMut,
    on_complete: Option<Box<dyn FnOnce(Bytes) + Send>>,
}

impl Stream for Tee {
    type Item = Result<Bytes, BoxError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match this.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                if this.on_complete.is_some() {
                    this.copy.extend_from_slice(&chunk);
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.on_complete = None;
                this.copy.clear();
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                if let Some(done) = this.on_complete.take() {
                    done(std::mem::take(&mut this.copy).freeze());
                }
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Body { .. }")
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::empty()
    }
}

/// How a response was produced with respect to redirects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseType {
    /// An ordinary response.
    #[default]
    Basic,
    /// A redirect returned unfollowed under manual redirect handling.
    OpaqueRedirect,
}

/// A response returned by the network, the cache, or synthesized by the worker.
#[derive(Debug)]
pub struct Response {
    /// HTTP status.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: Body,
    /// Redirect handling outcome.
    pub response_type: ResponseType,
}

impl Response {
    /// Create an empty response with a status.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Body::empty(),
            response_type: ResponseType::Basic,
        }
    }

    /// Create an HTML response.
    pub fn html(status: StatusCode, html: impl Into<Bytes>) -> Self {
        Self::new(status)
            .with_header("content-type", "text/html; charset=utf-8")
            .with_body(Body::from_bytes(html))
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

    /// Replace the headers.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Replace the body.
    pub fn with_body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    /// Mark as an opaque redirect.
    pub fn opaque_redirect(mut self) -> Self {
        self.response_type = ResponseType::OpaqueRedirect;
        self
    }

    /// Check if status is 2xx.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Whether the response is a redirect the worker must return unmodified.
    pub fn is_redirect(&self) -> bool {
        self.response_type == ResponseType::OpaqueRedirect
            || self.status == StatusCode::MOVED_PERMANENTLY
            || self.status == StatusCode::FOUND
    }

    /// Get a header value by name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Read the whole body, returning the head and the bytes.
    pub async fn into_buffered(self) -> Result<(StatusCode, HeaderMap, Bytes), BoxError> {
        let bytes = self.body.collect().await?;
        Ok((self.status, self.headers, bytes))
    }
}
