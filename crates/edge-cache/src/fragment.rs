//! Fragment resolution: cache first, network on miss.

use std::sync::Arc;

use bytes::Bytes;
use edge_core::{localize_url, BoxError, CachedPart, ConfigError, SiteLocale, WorkerConfig};
use edge_data::{FetchError, FetchRequest, Fetcher};

use crate::key::{CacheGeneration, CacheKey, EntryKey};
use crate::store::{CacheStore, CachedResponse};

/// Why a fragment could not be produced.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// The localized fragment URL is not valid.
    #[error(transparent)]
    Url(#[from] ConfigError),

    /// Fetching failed or returned a non-success status.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The fragment body broke off while being read.
    #[error("fragment body from {url} failed: {source}")]
    Body {
        url: String,
        #[source]
        source: BoxError,
    },
}

/// Where resolved bytes came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Cached,
    Fetched,
}

/// Resolves fragment bytes for a site/locale in the active generation.
pub struct FragmentResolver {
    config: Arc<WorkerConfig>,
    store: Arc<dyn CacheStore>,
    fetcher: Arc<dyn Fetcher>,
    generation: CacheGeneration,
}

impl FragmentResolver {
    /// Create a resolver for the configuration's generation.
    pub fn new(
        config: Arc<WorkerConfig>,
        store: Arc<dyn CacheStore>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        let generation = CacheGeneration::from_config(&config);
        Self {
            config,
            store,
            fetcher,
            generation,
        }
    }

    /// Generation entries are read from and written to.
    pub fn generation(&self) -> &CacheGeneration {
        &self.generation
    }

    /// Cache key of a fragment for an identity.
    pub fn key(&self, part: &CachedPart, identity: &SiteLocale) -> CacheKey {
        CacheKey::new(
            self.generation.clone(),
            EntryKey::keyed(identity, &part.cache_suffix),
        )
    }

    /// Resolve a fragment's bytes.
    pub async fn resolve(
        &self,
        part: &CachedPart,
        identity: &SiteLocale,
    ) -> Result<Bytes, ResolveError> {
        self.resolve_traced(part, identity).await.map(|(bytes, _)| bytes)
    }

    /// Resolve a fragment's bytes and report whether the cache served them.
    ///
    /// A failing cache read counts as a miss. The fetched body is stored only
    /// when the response status is a success; a failing cache write is logged
    /// and the bytes are still returned.
    pub async fn resolve_traced(
        &self,
        part: &CachedPart,
        identity: &SiteLocale,
    ) -> Result<(Bytes, Resolution), ResolveError> {
        let key = self.key(part, identity);

        match self.store.get(&key).await {
            Ok(Some(hit)) => {
                tracing::debug!(%key, "fragment cache hit");
                return Ok((hit.body, Resolution::Cached));
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(%key, error = %e, "fragment cache read failed"),
        }

        let url = localize_url(
            &self.config.absolute_url(&part.source_url)?,
            &self.config.default_identity(),
            identity,
        );
        let response = self.fetcher.fetch(FetchRequest::get(url.clone())).await?;
        if !response.is_success() {
            return Err(FetchError::status(response.status, &url).into());
        }

        let (status, headers, body) =
            response
                .into_buffered()
                .await
                .map_err(|source| ResolveError::Body {
                    url: url.to_string(),
                    source,
                })?;

        let cached = CachedResponse::new(status, &headers, body.clone());
        if let Err(e) = self.store.put(&key, cached).await {
            tracing::warn!(%key, error = %e, "fragment cache write failed");
        } else {
            tracing::debug!(%key, %url, bytes = body.len(), "fragment fetched and stored");
        }

        Ok((body, Resolution::Fetched))
    }
}

#[cfg(test)]
mod tests {
    use edge_data::{MockFetcher, MockRoute};
    use http::StatusCode;

    use super::*;
    use crate::store::MemoryStore;

    const HEADER_URL: &str = "https://shop.example.com/s/RefArch/en_US/Page-Header";
    const OUTLET_HEADER_URL: &str = "https://shop.example.com/s/Outlet/de_DE/Page-Header";

    fn config() -> Arc<WorkerConfig> {
        Arc::new(
            WorkerConfig::new(
                "https://shop.example.com",
                "/offline",
                SiteLocale::new("RefArch", "en_US"),
                "v1",
            )
            .with_part(CachedPart::new(
                "$swheader$",
                "header",
                "/s/RefArch/en_US/Page-Header",
                "skipHeader",
            )),
        )
    }

    fn refarch() -> SiteLocale {
        SiteLocale::new("RefArch", "en_US")
    }

    fn setup(fetcher: MockFetcher) -> (FragmentResolver, Arc<MemoryStore>, Arc<MockFetcher>) {
        let store = Arc::new(MemoryStore::new());
        let fetcher = Arc::new(fetcher);
        let resolver = FragmentResolver::new(config(), store.clone(), fetcher.clone());
        (resolver, store, fetcher)
    }

    // === Resolve Tests ===

    #[tokio::test]
    async fn test_miss_fetches_and_stores() {
        let (resolver, store, fetcher) =
            setup(MockFetcher::new().with_route(HEADER_URL, MockRoute::ok("HDR")));
        let part = config().cached_parts[0].clone();

        let (bytes, how) = resolver.resolve_traced(&part, &refarch()).await.unwrap();
        assert_eq!(bytes, Bytes::from("HDR"));
        assert_eq!(how, Resolution::Fetched);
        assert_eq!(fetcher.count(HEADER_URL), 1);

        let stored = store.get(&resolver.key(&part, &refarch())).await.unwrap();
        assert_eq!(stored.unwrap().body, Bytes::from("HDR"));
    }

    #[tokio::test]
    async fn test_hit_skips_network() {
        let (resolver, _store, fetcher) =
            setup(MockFetcher::new().with_route(HEADER_URL, MockRoute::ok("HDR")));
        let part = config().cached_parts[0].clone();

        resolver.resolve(&part, &refarch()).await.unwrap();
        let (bytes, how) = resolver.resolve_traced(&part, &refarch()).await.unwrap();
        assert_eq!(bytes, Bytes::from("HDR"));
        assert_eq!(how, Resolution::Cached);
        assert_eq!(fetcher.total(), 1);
    }

    #[tokio::test]
    async fn test_source_url_is_localized() {
        let (resolver, store, fetcher) =
            setup(MockFetcher::new().with_route(OUTLET_HEADER_URL, MockRoute::ok("DE")));
        let part = config().cached_parts[0].clone();
        let outlet = SiteLocale::new("Outlet", "de_DE");

        assert_eq!(resolver.resolve(&part, &outlet).await.unwrap(), Bytes::from("DE"));
        assert_eq!(fetcher.count(OUTLET_HEADER_URL), 1);
        assert!(store
            .get(&resolver.key(&part, &refarch()))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_error_status_is_not_stored() {
        let (resolver, store, _fetcher) = setup(MockFetcher::new().with_route(
            HEADER_URL,
            MockRoute::status(StatusCode::INTERNAL_SERVER_ERROR),
        ));
        let part = config().cached_parts[0].clone();

        let err = resolver.resolve(&part, &refarch()).await.unwrap_err();
        assert!(matches!(
            err,
            ResolveError::Fetch(FetchError::Status { status: 500, .. })
        ));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_network_failure_propagates() {
        let (resolver, _store, fetcher) = setup(MockFetcher::new());
        fetcher.set_offline(true);
        let part = config().cached_parts[0].clone();

        let err = resolver.resolve(&part, &refarch()).await.unwrap_err();
        assert!(matches!(err, ResolveError::Fetch(FetchError::Network { .. })));
    }

    #[tokio::test]
    async fn test_failing_cache_falls_back_to_network() {
        let (resolver, store, fetcher) =
            setup(MockFetcher::new().with_route(HEADER_URL, MockRoute::ok("HDR")));
        store.set_failing(true);
        let part = config().cached_parts[0].clone();

        assert_eq!(resolver.resolve(&part, &refarch()).await.unwrap(), Bytes::from("HDR"));
        assert_eq!(resolver.resolve(&part, &refarch()).await.unwrap(), Bytes::from("HDR"));
        assert_eq!(fetcher.total(), 2);
    }
}
