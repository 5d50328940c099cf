//! Generation-scoped response storage.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use edge_core::{Body, Response};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::{Deserialize, Serialize};

use crate::key::{CacheGeneration, CacheKey, EntryKey};

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache operation errors.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Filesystem access failed.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to serialize/deserialize a cache entry.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Backend storage error.
    #[error("storage error: {0}")]
    Storage(String),
}

/// A stored response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers, in order.
    pub headers: Vec<(String, String)>,
    /// Response body.
    #[serde(skip)]
    pub body: Bytes,
    /// When the entry was written.
    pub stored_at: DateTime<Utc>,
}

impl CachedResponse {
    /// Capture a buffered response.
    pub fn new(status: StatusCode, headers: &HeaderMap, body: Bytes) -> Self {
        let headers = headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        Self {
            status: status.as_u16(),
            headers,
            body,
            stored_at: Utc::now(),
        }
    }

    /// A 200 response with a body and no headers.
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self::new(StatusCode::OK, &HeaderMap::new(), body.into())
    }

    /// Rebuild a streamable response.
    pub fn to_response(&self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK);
        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.append(name, value);
            }
        }
        Response::new(status)
            .with_headers(headers)
            .with_body(Body::from_bytes(self.body.clone()))
    }

    /// Age of the entry.
    pub fn age(&self) -> chrono::Duration {
        Utc::now().signed_duration_since(self.stored_at)
    }
}

/// Durable key/value storage partitioned by generation.
///
/// Writes are last-write-wins per key. Implementations synchronize
/// internally; callers never lock.
#[async_trait]
pub trait CacheStore: Send + Sync + 'static {
    /// Look up an entry.
    async fn get(&self, key: &CacheKey) -> CacheResult<Option<CachedResponse>>;

    /// Store an entry, replacing any previous one.
    async fn put(&self, key: &CacheKey, response: CachedResponse) -> CacheResult<()>;

    /// Delete an entry. Returns whether it existed.
    async fn delete(&self, key: &CacheKey) -> CacheResult<bool>;

    /// Every entry key of a generation.
    async fn keys(&self, generation: &CacheGeneration) -> CacheResult<Vec<EntryKey>>;

    /// Every generation holding storage.
    async fn generations(&self) -> CacheResult<Vec<CacheGeneration>>;

    /// Drop a whole generation. Returns whether it existed.
    async fn delete_generation(&self, generation: &CacheGeneration) -> CacheResult<bool>;
}

type Generations = HashMap<CacheGeneration, HashMap<EntryKey, CachedResponse>>;

/// In-memory store (for tests, demos and short-lived hosts).
#[derive(Default)]
pub struct MemoryStore {
    generations: RwLock<Generations>,
    failing: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with [`CacheError::Storage`].
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Total number of entries across generations.
    pub fn len(&self) -> usize {
        self.generations
            .read()
            .map(|g| g.values().map(HashMap::len).sum())
            .unwrap_or(0)
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check(&self) -> CacheResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CacheError::Storage("store unavailable".to_string()));
        }
        Ok(())
    }

    fn read(&self) -> CacheResult<std::sync::RwLockReadGuard<'_, Generations>> {
        self.check()?;
        self.generations
            .read()
            .map_err(|_| CacheError::Storage("lock poisoned".to_string()))
    }

    fn write(&self) -> CacheResult<std::sync::RwLockWriteGuard<'_, Generations>> {
        self.check()?;
        self.generations
            .write()
            .map_err(|_| CacheError::Storage("lock poisoned".to_string()))
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &CacheKey) -> CacheResult<Option<CachedResponse>> {
        let generations = self.read()?;
        Ok(generations
            .get(&key.generation)
            .and_then(|entries| entries.get(&key.entry))
            .cloned())
    }

    async fn put(&self, key: &CacheKey, response: CachedResponse) -> CacheResult<()> {
        let mut generations = self.write()?;
        generations
            .entry(key.generation.clone())
            .or_default()
            .insert(key.entry.clone(), response);
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> CacheResult<bool> {
        let mut generations = self.write()?;
        Ok(generations
            .get_mut(&key.generation)
            .and_then(|entries| entries.remove(&key.entry))
            .is_some())
    }

    async fn keys(&self, generation: &CacheGeneration) -> CacheResult<Vec<EntryKey>> {
        let generations = self.read()?;
        let mut keys: Vec<EntryKey> = generations
            .get(generation)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        Ok(keys)
    }

    async fn generations(&self) -> CacheResult<Vec<CacheGeneration>> {
        let generations = self.read()?;
        let mut names: Vec<CacheGeneration> = generations.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn delete_generation(&self, generation: &CacheGeneration) -> CacheResult<bool> {
        let mut generations = self.write()?;
        Ok(generations.remove(generation).is_some())
    }
}

#[cfg(test)]
mod tests {
    use edge_core::SiteLocale;

    use super::*;

    fn key(generation: &str, suffix: &str) -> CacheKey {
        CacheKey::new(
            CacheGeneration::from_name(generation),
            EntryKey::keyed(&SiteLocale::new("RefArch", "en_US"), suffix),
        )
    }

    // === CachedResponse Tests ===

    #[tokio::test]
    async fn test_round_trip_through_response() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("text/html"));
        let cached = CachedResponse::new(StatusCode::OK, &headers, Bytes::from("<p>hi</p>"));

        let response = cached.to_response();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.header("content-type"), Some("text/html"));
        assert_eq!(response.body.collect().await.unwrap(), Bytes::from("<p>hi</p>"));
    }

    #[test]
    fn test_age_is_non_negative() {
        assert!(CachedResponse::ok("x").age() >= chrono::Duration::zero());
    }

    // === MemoryStore Tests ===

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = MemoryStore::new();
        let key = key("g1", "header");

        assert!(store.get(&key).await.unwrap().is_none());
        store.put(&key, CachedResponse::ok("HDR")).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap().unwrap().body, Bytes::from("HDR"));

        assert!(store.delete(&key).await.unwrap());
        assert!(!store.delete(&key).await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let store = MemoryStore::new();
        let key = key("g1", "header");
        store.put(&key, CachedResponse::ok("old")).await.unwrap();
        store.put(&key, CachedResponse::ok("new")).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap().unwrap().body, Bytes::from("new"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_generations_are_isolated() {
        let store = MemoryStore::new();
        store.put(&key("g1", "header"), CachedResponse::ok("a")).await.unwrap();
        store.put(&key("g2", "header"), CachedResponse::ok("b")).await.unwrap();

        assert_eq!(
            store.generations().await.unwrap(),
            vec![CacheGeneration::from_name("g1"), CacheGeneration::from_name("g2")]
        );

        assert!(store
            .delete_generation(&CacheGeneration::from_name("g1"))
            .await
            .unwrap());
        assert!(store.get(&key("g1", "header")).await.unwrap().is_none());
        assert!(store.get(&key("g2", "header")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_keys_of_generation() {
        let store = MemoryStore::new();
        store.put(&key("g1", "header"), CachedResponse::ok("a")).await.unwrap();
        store.put(&key("g1", "footer"), CachedResponse::ok("b")).await.unwrap();

        let keys = store.keys(&CacheGeneration::from_name("g1")).await.unwrap();
        let suffixes: Vec<_> = keys.iter().filter_map(EntryKey::suffix).collect();
        assert_eq!(suffixes, vec!["footer", "header"]);
        assert!(store
            .keys(&CacheGeneration::from_name("nope"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_failing_store() {
        let store = MemoryStore::new();
        store.set_failing(true);
        assert!(matches!(
            store.get(&key("g1", "header")).await,
            Err(CacheError::Storage(_))
        ));
        store.set_failing(false);
        assert!(store.get(&key("g1", "header")).await.unwrap().is_none());
    }
}
