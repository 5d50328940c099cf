//! Install and activate steps, the kill switch, and client notifications.

use edge_cache::CachedResponse;
use edge_core::WorkerPhase;
use edge_data::{FetchError, FetchRequest};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::WorkerError;
use crate::worker::Worker;

/// Messages broadcast to the clients a worker controls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// A new generation took control.
    Activated { generation: String },
    /// The worker unregistered itself; clients should reload.
    Reload,
}

impl Worker {
    /// Precache the offline page.
    ///
    /// Installation fails if the page cannot be fetched or stored, which
    /// leaves the worker in the `Error` phase.
    pub async fn install(&self) -> Result<(), WorkerError> {
        match self.phase() {
            WorkerPhase::Parsed | WorkerPhase::Error(_) => {}
            phase => {
                return Err(WorkerError::Lifecycle {
                    action: "install",
                    phase,
                })
            }
        }

        self.set_phase(WorkerPhase::Installing);
        match self.precache_offline_page().await {
            Ok(()) => {
                self.set_phase(WorkerPhase::Installed);
                tracing::info!(generation = %self.generation(), "worker installed");
                Ok(())
            }
            Err(e) => {
                self.set_phase(WorkerPhase::Error(e.to_string()));
                Err(e)
            }
        }
    }

    async fn precache_offline_page(&self) -> Result<(), WorkerError> {
        let shared = &self.shared;
        let url = shared.config.absolute_url(&shared.config.offline_url)?;

        let response = shared.fetcher.fetch(FetchRequest::get(url.clone())).await?;
        if !response.is_success() {
            return Err(FetchError::status(response.status, &url).into());
        }
        let (status, headers, body) =
            response
                .into_buffered()
                .await
                .map_err(|source| WorkerError::Body {
                    url: url.to_string(),
                    source,
                })?;

        shared
            .store
            .put(&shared.offline_key, CachedResponse::new(status, &headers, body))
            .await?;
        Ok(())
    }

    /// Take control.
    ///
    /// With the kill switch engaged every generation is deleted, the worker
    /// unregisters, and clients are told to reload. Otherwise every generation
    /// but the current one is deleted and clients are told which generation
    /// is active.
    pub async fn activate(&self) -> Result<(), WorkerError> {
        if !self.shared.config.sw_enabled {
            return self.unregister().await;
        }

        let phase = self.phase();
        if phase != WorkerPhase::Installed {
            return Err(WorkerError::Lifecycle {
                action: "activate",
                phase,
            });
        }

        self.set_phase(WorkerPhase::Activating);
        match self.reclaim_old_generations().await {
            Ok(removed) => {
                self.set_phase(WorkerPhase::Activated);
                tracing::info!(generation = %self.generation(), removed, "worker activated");
                self.notify(ClientMessage::Activated {
                    generation: self.generation().to_string(),
                });
                Ok(())
            }
            Err(e) => {
                self.set_phase(WorkerPhase::Error(e.to_string()));
                Err(e)
            }
        }
    }

    async fn reclaim_old_generations(&self) -> Result<usize, WorkerError> {
        let store = &self.shared.store;
        let mut removed = 0;
        for generation in store.generations().await? {
            if &generation != self.generation() && store.delete_generation(&generation).await? {
                tracing::debug!(%generation, "generation deleted");
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn unregister(&self) -> Result<(), WorkerError> {
        let store = &self.shared.store;
        for generation in store.generations().await? {
            store.delete_generation(&generation).await?;
        }
        self.set_phase(WorkerPhase::Unregistered);
        tracing::warn!("kill switch engaged, worker unregistered");
        self.notify(ClientMessage::Reload);
        Ok(())
    }

    /// Receive client notifications from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientMessage> {
        self.clients.subscribe()
    }

    fn notify(&self, message: ClientMessage) {
        // No receivers is not an error: nothing is listening yet.
        let _ = self.clients.send(message);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use edge_cache::{
        CacheGeneration, CacheKey, CacheStore, CachedResponse, EntryKey, MemoryStore,
    };
    use edge_core::{InterceptedRequest, SiteLocale, WorkerConfig};
    use edge_data::{MockFetcher, MockRoute};
    use http::StatusCode;
    use url::Url;

    use super::*;

    const OFFLINE: &str = "https://shop.example.com/offline";

    fn config() -> WorkerConfig {
        WorkerConfig::new(
            "https://shop.example.com",
            "/offline",
            SiteLocale::new("RefArch", "en_US"),
            "v2",
        )
        .with_build_version("1.0.0")
    }

    fn setup(config: WorkerConfig) -> (Worker, Arc<MemoryStore>, Arc<MockFetcher>) {
        let store = Arc::new(MemoryStore::new());
        let fetcher =
            Arc::new(MockFetcher::new().with_route(OFFLINE, MockRoute::ok("<p>offline</p>")));
        let worker = Worker::new(config, store.clone(), fetcher.clone()).unwrap();
        (worker, store, fetcher)
    }

    fn entry(generation: &str, suffix: &str) -> CacheKey {
        CacheKey::new(
            CacheGeneration::from_name(generation),
            EntryKey::keyed(&SiteLocale::new("RefArch", "en_US"), suffix),
        )
    }

    // === Install Tests ===

    #[tokio::test]
    async fn test_install_precaches_offline_page() {
        let (worker, store, _) = setup(config());
        worker.install().await.unwrap();

        assert_eq!(worker.phase(), WorkerPhase::Installed);
        let page = store.get(worker.offline_key()).await.unwrap().unwrap();
        assert_eq!(page.body, bytes::Bytes::from("<p>offline</p>"));
    }

    #[tokio::test]
    async fn test_install_fails_without_offline_page() {
        let (worker, _, fetcher) = setup(config());
        fetcher.set_route(OFFLINE, MockRoute::status(StatusCode::NOT_FOUND));

        let result = worker.install().await;
        assert!(matches!(result, Err(WorkerError::Fetch(_))));
        assert!(matches!(worker.phase(), WorkerPhase::Error(_)));
    }

    #[tokio::test]
    async fn test_install_twice_is_rejected() {
        let (worker, _, _) = setup(config());
        worker.install().await.unwrap();
        let result = worker.install().await;
        assert!(matches!(
            result,
            Err(WorkerError::Lifecycle { action: "install", .. })
        ));
    }

    // === Activate Tests ===

    #[tokio::test]
    async fn test_activate_requires_install() {
        let (worker, _, _) = setup(config());
        let result = worker.activate().await;
        assert!(matches!(
            result,
            Err(WorkerError::Lifecycle { action: "activate", phase: WorkerPhase::Parsed })
        ));
    }

    #[tokio::test]
    async fn test_activate_deletes_other_generations() {
        let (worker, store, _) = setup(config());
        store
            .put(&entry("edge-stitch-1.0.0-v1", "header"), CachedResponse::ok("old"))
            .await
            .unwrap();
        store
            .put(&entry("edge-stitch-0.9.0-v2", "footer"), CachedResponse::ok("old"))
            .await
            .unwrap();
        let mut clients = worker.subscribe();

        worker.install().await.unwrap();
        worker.activate().await.unwrap();

        assert_eq!(worker.phase(), WorkerPhase::Activated);
        assert_eq!(
            store.generations().await.unwrap(),
            vec![CacheGeneration::new("1.0.0", "v2")]
        );
        assert!(store.get(worker.offline_key()).await.unwrap().is_some());
        assert_eq!(
            clients.recv().await.unwrap(),
            ClientMessage::Activated {
                generation: "edge-stitch-1.0.0-v2".to_string()
            }
        );
    }

    // === Kill Switch Tests ===

    #[tokio::test]
    async fn test_kill_switch_deletes_everything_and_reloads() {
        let (worker, store, _) = setup(config().with_enabled(false));
        store
            .put(&entry("edge-stitch-1.0.0-v1", "header"), CachedResponse::ok("old"))
            .await
            .unwrap();
        worker.install().await.unwrap();
        let mut clients = worker.subscribe();

        worker.activate().await.unwrap();

        assert_eq!(worker.phase(), WorkerPhase::Unregistered);
        assert!(store.is_empty());
        assert_eq!(clients.recv().await.unwrap(), ClientMessage::Reload);

        let request = InterceptedRequest::get(
            Url::parse("https://shop.example.com/s/RefArch/en_US/Home-Show").unwrap(),
        )
        .navigate();
        assert!(worker.handle(request).await.unwrap().is_pass_through());
    }

    #[tokio::test]
    async fn test_kill_switch_without_install() {
        let (worker, _, fetcher) = setup(config().with_enabled(false));
        worker.activate().await.unwrap();
        assert_eq!(worker.phase(), WorkerPhase::Unregistered);
        assert_eq!(fetcher.total(), 0);
    }

    // === Message Tests ===

    #[test]
    fn test_client_message_json() {
        let json = serde_json::to_string(&ClientMessage::Activated {
            generation: "edge-stitch-1.0.0-v2".to_string(),
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"activated","generation":"edge-stitch-1.0.0-v2"}"#);
        assert_eq!(
            serde_json::to_string(&ClientMessage::Reload).unwrap(),
            r#"{"type":"reload"}"#
        );
    }
}
