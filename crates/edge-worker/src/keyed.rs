//! Keyed AJAX caching.
//!
//! A miss streams the live response to the client and stores the body in
//! the background once it has been read to the end.

use std::sync::Arc;

use edge_cache::{CacheKey, CacheStatus, CachedResponse, EntryKey};
use edge_core::{InterceptedRequest, Response, SiteLocale};
use edge_data::FetchRequest;
use edge_observability::StructuredLogger;

use crate::error::WorkerError;
use crate::worker::Shared;

/// Serve from `{site}.{locale}.{suffix}` or fetch and store in the background.
pub(crate) async fn handle(
    shared: &Arc<Shared>,
    request: &InterceptedRequest,
    suffix: &str,
    identity: &SiteLocale,
    logger: &StructuredLogger,
) -> Result<Response, WorkerError> {
    let key = CacheKey::new(shared.generation.clone(), EntryKey::keyed(identity, suffix));

    if let Some(hit) = shared.lookup(&key, logger).await {
        logger.debug_builder("cache hit").field("key", key.to_string()).emit();
        return Ok(shared.annotate(hit.to_response(), CacheStatus::Hit));
    }

    let mut response = shared
        .fetcher
        .fetch(FetchRequest::from_intercepted(request))
        .await?;
    if !response.is_success() {
        logger
            .debug_builder("not caching error response")
            .field_u64("status", u64::from(response.status.as_u16()))
            .emit();
        return Ok(response);
    }

    // The client reads the live body; the cache gets a copy once it ends.
    let status = response.status;
    let headers = response.headers.clone();
    let store = Arc::clone(&shared.store);
    let background = shared.background.clone();
    let body = std::mem::take(&mut response.body).tee(move |bytes| {
        let entry = CachedResponse::new(status, &headers, bytes);
        background.spawn("keyed-store", async move {
            store.put(&key, entry).await?;
            Ok(())
        });
    });

    Ok(shared.annotate(response.with_body(body), CacheStatus::Miss))
}
