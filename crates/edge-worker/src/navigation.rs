//! Navigation rewriting.
//!
//! The page is fetched with every skip parameter set, so the server leaves
//! fragment markup out and emits the placeholder tokens instead. The body is
//! then streamed through the rewriter, which splices in cached fragments for
//! the request's identity.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use edge_cache::FragmentResolver;
use edge_core::{append_query, BoxError, InterceptedRequest, Response, SiteLocale, WorkerConfig};
use edge_data::{FetchRequest, RedirectMode};
use edge_observability::StructuredLogger;
use edge_streaming::{FragmentSource, StreamRewriter};
use http::{header, StatusCode};
use url::Url;

use crate::fallback::{auth_recovery_page, offline_unavailable_page};
use crate::worker::Shared;

/// Fragments of one page, resolved for the page's identity.
struct PageFragments {
    resolver: Arc<FragmentResolver>,
    config: Arc<WorkerConfig>,
    identity: SiteLocale,
}

#[async_trait]
impl FragmentSource for PageFragments {
    async fn fragment(&self, index: usize) -> Result<Bytes, BoxError> {
        let part = self
            .config
            .cached_parts
            .get(index)
            .ok_or_else(|| BoxError::from(format!("no fragment at index {}", index)))?;
        Ok(self.resolver.resolve(part, &self.identity).await?)
    }
}

/// Handle a top-level navigation. Never fails: network trouble falls back
/// to the offline page.
pub(crate) async fn handle(
    shared: &Arc<Shared>,
    request: &InterceptedRequest,
    logger: &StructuredLogger,
) -> Response {
    let config = &shared.config;
    let identity = request.identity(config);

    match shared
        .index
        .check(shared.store.as_ref(), &shared.generation, &request.url, &identity)
        .await
    {
        Ok(0) => {}
        Ok(removed) => logger
            .info_builder("fragments invalidated")
            .field_u64("entries", removed as u64)
            .emit(),
        Err(e) => logger
            .warn_builder("invalidation failed")
            .field("error", e.to_string())
            .emit(),
    }

    let url = skip_fragments_url(config, &request.url);
    let fetch = FetchRequest::from_intercepted(request)
        .with_url(url)
        .with_redirect(RedirectMode::Manual);
    let response = match shared.fetcher.fetch(fetch).await {
        Ok(response) => response,
        Err(e) => {
            logger
                .warn_builder("page fetch failed")
                .field("error", e.to_string())
                .emit();
            return offline_page(shared, logger).await;
        }
    };

    if response.status == StatusCode::UNAUTHORIZED {
        logger.info("authentication required, unregistering");
        return auth_recovery_page();
    }
    if response.is_redirect() {
        return response;
    }

    rewrite(shared, response, identity)
}

/// The request URL with every fragment's skip parameter set.
pub(crate) fn skip_fragments_url(config: &WorkerConfig, url: &Url) -> Url {
    let params: Vec<(&str, &str)> = config
        .cached_parts
        .iter()
        .map(|part| (part.skip_parameter.as_str(), "true"))
        .collect();
    append_query(url, &params)
}

fn rewrite(shared: &Shared, response: Response, identity: SiteLocale) -> Response {
    let source = Arc::new(PageFragments {
        resolver: Arc::clone(&shared.resolver),
        config: Arc::clone(&shared.config),
        identity,
    });
    let body =
        StreamRewriter::new(response.body, Arc::clone(&shared.placeholders), source).into_body();

    let mut headers = response.headers;
    headers.remove(header::CONTENT_LENGTH);

    Response::new(response.status)
        .with_headers(headers)
        .with_header(&shared.config.marker_header, "true")
        .with_body(body)
}

async fn offline_page(shared: &Shared, logger: &StructuredLogger) -> Response {
    match shared.lookup(&shared.offline_key, logger).await {
        Some(page) => page.to_response(),
        None => {
            logger.warn("offline page missing from cache");
            offline_unavailable_page()
        }
    }
}

#[cfg(test)]
mod tests {
    use edge_core::CachedPart;

    use super::*;

    fn config() -> WorkerConfig {
        WorkerConfig::new(
            "https://shop.example.com",
            "/offline",
            SiteLocale::new("RefArch", "en_US"),
            "v1",
        )
        .with_part(CachedPart::new("$swheader$", "header", "/h", "skipHeader"))
        .with_part(CachedPart::new("$swfooter$", "footer", "/f", "skipFooter"))
    }

    #[test]
    fn test_skip_parameters_in_part_order() {
        let url = Url::parse("https://shop.example.com/s/RefArch/en_US/Home-Show").unwrap();
        let fetched = skip_fragments_url(&config(), &url);
        assert_eq!(fetched.query(), Some("skipHeader=true&skipFooter=true"));
    }

    #[test]
    fn test_skip_parameters_keep_existing_query() {
        let url = Url::parse("https://shop.example.com/search?q=shoes#top").unwrap();
        let fetched = skip_fragments_url(&config(), &url);
        assert_eq!(fetched.query(), Some("q=shoes&skipHeader=true&skipFooter=true"));
    }
}
