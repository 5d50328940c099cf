//! The worker: shared state and request handling.

use std::sync::{Arc, RwLock};

use edge_cache::{
    header_names, CacheGeneration, CacheKey, CacheStatus, CacheStore, CachedResponse, EntryKey,
    FragmentResolver, InvalidationIndex,
};
use edge_core::{InterceptedRequest, Response, WorkerConfig, WorkerPhase};
use edge_data::Fetcher;
use edge_observability::{LogConfig, StructuredLogger};
use edge_streaming::PlaceholderSet;
use tokio::sync::broadcast;
use url::Url;

use crate::background::BackgroundTasks;
use crate::dispatch::{classify, Strategy};
use crate::error::WorkerError;
use crate::lifecycle::ClientMessage;
use crate::{keyed, navigation, static_assets};

/// What the host should do with an intercepted request.
#[derive(Debug)]
pub enum Outcome {
    /// Answer with this response.
    Respond(Response),
    /// Let the request proceed as if no worker were installed.
    PassThrough,
}

impl Outcome {
    /// Whether the request passes through.
    pub fn is_pass_through(&self) -> bool {
        matches!(self, Self::PassThrough)
    }

    /// The override response, if any.
    pub fn into_response(self) -> Option<Response> {
        match self {
            Self::Respond(response) => Some(response),
            Self::PassThrough => None,
        }
    }
}

/// State shared by every request and background effect.
pub(crate) struct Shared {
    pub(crate) config: Arc<WorkerConfig>,
    pub(crate) origin: Url,
    pub(crate) generation: CacheGeneration,
    pub(crate) offline_key: CacheKey,
    pub(crate) placeholders: Arc<PlaceholderSet>,
    pub(crate) index: InvalidationIndex,
    pub(crate) store: Arc<dyn CacheStore>,
    pub(crate) fetcher: Arc<dyn Fetcher>,
    pub(crate) resolver: Arc<FragmentResolver>,
    pub(crate) background: BackgroundTasks,
}

impl Shared {
    /// Read an entry, treating store failures as a miss.
    pub(crate) async fn lookup(
        &self,
        key: &CacheKey,
        logger: &StructuredLogger,
    ) -> Option<CachedResponse> {
        match self.store.get(key).await {
            Ok(hit) => hit,
            Err(e) => {
                logger
                    .warn_builder("cache read failed")
                    .field("key", key.to_string())
                    .field("error", e.to_string())
                    .emit();
                None
            }
        }
    }

    /// Tag a cache-or-fetch response with its cache status and generation.
    pub(crate) fn annotate(&self, response: Response, status: CacheStatus) -> Response {
        let (name, value) = status.header();
        response
            .with_header(name, value)
            .with_header(header_names::X_CACHE_GENERATION, self.generation.as_str())
    }

    /// Check a request against the invalidation index without blocking it.
    fn spawn_invalidation(self: &Arc<Self>, request: &InterceptedRequest) {
        if self.index.is_empty() {
            return;
        }
        let shared = Arc::clone(self);
        let url = request.url.clone();
        let identity = request.identity(&self.config);
        self.background.spawn("invalidation", async move {
            shared
                .index
                .check(shared.store.as_ref(), &shared.generation, &url, &identity)
                .await?;
            Ok(())
        });
    }
}

/// A fragment-caching worker for one configuration.
pub struct Worker {
    pub(crate) shared: Arc<Shared>,
    pub(crate) phase: RwLock<WorkerPhase>,
    pub(crate) clients: broadcast::Sender<ClientMessage>,
    log: LogConfig,
}

impl Worker {
    /// Validate the configuration and build the worker.
    pub fn new(
        config: WorkerConfig,
        store: Arc<dyn CacheStore>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self, WorkerError> {
        config.validate()?;
        let placeholders = Arc::new(PlaceholderSet::from_config(&config)?);
        let origin = config.origin_url()?;
        let offline_url = config.absolute_url(&config.offline_url)?;
        let generation = CacheGeneration::from_config(&config);
        let index = InvalidationIndex::from_config(&config);

        let config = Arc::new(config);
        let resolver = Arc::new(FragmentResolver::new(
            Arc::clone(&config),
            Arc::clone(&store),
            Arc::clone(&fetcher),
        ));
        let (clients, _) = broadcast::channel(16);

        tracing::info!(
            %generation,
            fragments = placeholders.len(),
            triggers = index.len(),
            "worker parsed"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                origin,
                offline_key: CacheKey::new(generation.clone(), EntryKey::url(offline_url.as_str())),
                generation,
                placeholders,
                index,
                store,
                fetcher,
                resolver,
                background: BackgroundTasks::new(),
            }),
            phase: RwLock::new(WorkerPhase::Parsed),
            clients,
            log: LogConfig::default(),
        })
    }

    /// Set request logging.
    pub fn with_logging(mut self, log: LogConfig) -> Self {
        self.log = log;
        self
    }

    /// The configuration.
    pub fn config(&self) -> &WorkerConfig {
        &self.shared.config
    }

    /// The active cache generation.
    pub fn generation(&self) -> &CacheGeneration {
        &self.shared.generation
    }

    /// The invalidation index.
    pub fn index(&self) -> &InvalidationIndex {
        &self.shared.index
    }

    /// Key of the precached offline page.
    pub fn offline_key(&self) -> &CacheKey {
        &self.shared.offline_key
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> WorkerPhase {
        match self.phase.read() {
            Ok(phase) => phase.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub(crate) fn set_phase(&self, phase: WorkerPhase) {
        tracing::debug!(%phase, "worker phase");
        match self.phase.write() {
            Ok(mut current) => *current = phase,
            Err(poisoned) => *poisoned.into_inner() = phase,
        }
    }

    /// Background effects spawned by requests.
    pub fn background(&self) -> &BackgroundTasks {
        &self.shared.background
    }

    /// Wait for every background effect to finish.
    pub async fn settle(&self) -> usize {
        self.shared.background.settle().await
    }

    /// Handle one intercepted request.
    ///
    /// Outside the `Activated` phase every request passes through.
    pub async fn handle(&self, request: InterceptedRequest) -> Result<Outcome, WorkerError> {
        if !self.phase().is_intercepting() {
            return Ok(Outcome::PassThrough);
        }

        let strategy = classify(&request, &self.shared.config, &self.shared.origin);
        let logger = self
            .log
            .logger(request.request_id.clone())
            .with_strategy(strategy.name())
            .with_route(request.url.path());

        let result = match strategy {
            Strategy::KeyedCache { suffix, identity } => {
                keyed::handle(&self.shared, &request, &suffix, &identity, &logger)
                    .await
                    .map(Outcome::Respond)
            }
            Strategy::Navigation => Ok(Outcome::Respond(
                navigation::handle(&self.shared, &request, &logger).await,
            )),
            Strategy::SameOrigin => {
                self.shared.spawn_invalidation(&request);
                Ok(Outcome::PassThrough)
            }
            Strategy::StaticAsset => {
                if request.is_same_origin(&self.shared.origin) {
                    self.shared.spawn_invalidation(&request);
                }
                static_assets::handle(&self.shared, &request, &logger)
                    .await
                    .map(Outcome::Respond)
            }
            Strategy::PassThrough => Ok(Outcome::PassThrough),
        };

        match &result {
            Ok(Outcome::Respond(response)) => logger
                .info_builder("request handled")
                .field_u64("status", u64::from(response.status.as_u16()))
                .emit(),
            Ok(Outcome::PassThrough) => logger.debug("passed through"),
            Err(e) => logger
                .warn_builder("request failed")
                .field("error", e.to_string())
                .emit(),
        }
        result
    }
}
