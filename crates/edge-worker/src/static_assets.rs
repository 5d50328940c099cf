//! Static asset caching keyed by URL.

use std::sync::Arc;

use edge_cache::{CacheKey, CacheStatus, CachedResponse, EntryKey};
use edge_core::{Body, InterceptedRequest, Response};
use edge_data::FetchRequest;
use edge_observability::StructuredLogger;

use crate::error::WorkerError;
use crate::worker::Shared;

/// Serve a static asset from cache, or fetch it and store it before returning.
pub(crate) async fn handle(
    shared: &Arc<Shared>,
    request: &InterceptedRequest,
    logger: &StructuredLogger,
) -> Result<Response, WorkerError> {
    let key = CacheKey::new(shared.generation.clone(), EntryKey::url(request.url.as_str()));

    if let Some(hit) = shared.lookup(&key, logger).await {
        return Ok(shared.annotate(hit.to_response(), CacheStatus::Hit));
    }

    let response = shared
        .fetcher
        .fetch(FetchRequest::from_intercepted(request))
        .await?;
    if !response.is_success() {
        return Ok(response);
    }

    let (status, headers, body) =
        response
            .into_buffered()
            .await
            .map_err(|source| WorkerError::Body {
                url: request.url.to_string(),
                source,
            })?;

    if let Err(e) = shared
        .store
        .put(&key, CachedResponse::new(status, &headers, body.clone()))
        .await
    {
        logger
            .warn_builder("cache write failed")
            .field("key", key.to_string())
            .field("error", e.to_string())
            .emit();
    }

    let response = Response::new(status)
        .with_headers(headers)
        .with_body(Body::from_bytes(body));
    Ok(shared.annotate(response, CacheStatus::Miss))
}
