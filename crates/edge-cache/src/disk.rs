//! On-disk store.
//!
//! Layout: one directory per generation (hex-encoded name), and per entry a
//! `{sha256}.json` metadata file next to a `{sha256}.body` file holding the
//! raw bytes.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::key::{CacheGeneration, CacheKey, EntryKey};
use crate::store::{CacheError, CacheResult, CacheStore, CachedResponse};

/// Metadata file contents.
#[derive(Serialize, Deserialize)]
struct EntryMeta {
    key: EntryKey,
    #[serde(flatten)]
    response: CachedResponse,
}

/// [`CacheStore`] persisting entries under a root directory.
#[derive(Debug, Clone)]
pub struct DiskStore {
    root: PathBuf,
}

fn io_error(path: &Path, source: std::io::Error) -> CacheError {
    CacheError::Io {
        path: path.display().to_string(),
        source,
    }
}

impl DiskStore {
    /// Create a store rooted at `root`. The directory is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn generation_dir(&self, generation: &CacheGeneration) -> PathBuf {
        self.root.join(hex::encode(generation.as_str()))
    }

    fn entry_paths(&self, key: &CacheKey) -> (PathBuf, PathBuf) {
        let digest = hex::encode(Sha256::digest(key.entry.to_string().as_bytes()));
        let dir = self.generation_dir(&key.generation);
        (
            dir.join(format!("{}.json", digest)),
            dir.join(format!("{}.body", digest)),
        )
    }

    async fn read_meta(path: &Path) -> CacheResult<Option<EntryMeta>> {
        match tokio::fs::read(path).await {
            Ok(raw) => serde_json::from_slice(&raw)
                .map(Some)
                .map_err(|e| CacheError::Serialization(format!("{}: {}", path.display(), e))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(path, e)),
        }
    }
}

#[async_trait]
impl CacheStore for DiskStore {
    async fn get(&self, key: &CacheKey) -> CacheResult<Option<CachedResponse>> {
        let (meta_path, body_path) = self.entry_paths(key);
        let Some(meta) = Self::read_meta(&meta_path).await? else {
            return Ok(None);
        };

        let body = match tokio::fs::read(&body_path).await {
            Ok(body) => Bytes::from(body),
            // Metadata without a body is a torn write; treat as absent.
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&body_path, e)),
        };

        Ok(Some(CachedResponse {
            body,
            ..meta.response
        }))
    }

    async fn put(&self, key: &CacheKey, response: CachedResponse) -> CacheResult<()> {
        let dir = self.generation_dir(&key.generation);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| io_error(&dir, e))?;

        let (meta_path, body_path) = self.entry_paths(key);
        tokio::fs::write(&body_path, &response.body)
            .await
            .map_err(|e| io_error(&body_path, e))?;

        let meta = EntryMeta {
            key: key.entry.clone(),
            response,
        };
        let raw = serde_json::to_vec_pretty(&meta)
            .map_err(|e| CacheError::Serialization(e.to_string()))?;
        tokio::fs::write(&meta_path, raw)
            .await
            .map_err(|e| io_error(&meta_path, e))?;

        tracing::trace!(%key, "stored on disk");
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> CacheResult<bool> {
        let (meta_path, body_path) = self.entry_paths(key);
        let existed = match tokio::fs::remove_file(&meta_path).await {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => return Err(io_error(&meta_path, e)),
        };
        match tokio::fs::remove_file(&body_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(io_error(&body_path, e)),
        }
        Ok(existed)
    }

    async fn keys(&self, generation: &CacheGeneration) -> CacheResult<Vec<EntryKey>> {
        let dir = self.generation_dir(generation);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&dir, e)),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| io_error(&dir, e))? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(meta) = Self::read_meta(&path).await? {
                    keys.push(meta.key);
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn generations(&self) -> CacheResult<Vec<CacheGeneration>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&self.root, e)),
        };

        let mut generations = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_error(&self.root, e))?
        {
            let name = entry.file_name();
            // Directories this store did not create are ignored.
            let decoded = name
                .to_str()
                .and_then(|n| hex::decode(n).ok())
                .and_then(|raw| String::from_utf8(raw).ok());
            if let Some(name) = decoded {
                generations.push(CacheGeneration::from_name(name));
            }
        }
        generations.sort();
        Ok(generations)
    }

    async fn delete_generation(&self, generation: &CacheGeneration) -> CacheResult<bool> {
        let dir = self.generation_dir(generation);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error(&dir, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use edge_core::SiteLocale;
    use http::{HeaderMap, HeaderValue, StatusCode};

    use super::*;

    fn keyed(generation: &str, site: &str, suffix: &str) -> CacheKey {
        CacheKey::new(
            CacheGeneration::from_name(generation),
            EntryKey::keyed(&SiteLocale::new(site, "en_US"), suffix),
        )
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path());

        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("text/html"));
        let cached = CachedResponse::new(StatusCode::OK, &headers, Bytes::from("<nav/>"));
        let key = keyed("edge-stitch-1-a", "RefArch", "header");

        store.put(&key, cached.clone()).await.unwrap();
        let loaded = store.get(&key).await.unwrap().unwrap();
        assert_eq!(loaded, cached);
    }

    #[tokio::test]
    async fn test_missing_entry_and_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path().join("not-yet"));
        let key = keyed("g", "RefArch", "header");

        assert!(store.get(&key).await.unwrap().is_none());
        assert!(!store.delete(&key).await.unwrap());
        assert!(store.generations().await.unwrap().is_empty());
        assert!(store.keys(&key.generation).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_keys_and_generations() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path());

        store.put(&keyed("g1", "RefArch", "header"), CachedResponse::ok("a")).await.unwrap();
        store.put(&keyed("g1", "Outlet", "header"), CachedResponse::ok("b")).await.unwrap();
        store
            .put(
                &CacheKey::new(
                    CacheGeneration::from_name("g2"),
                    EntryKey::url("https://shop.example.com/static/a.css"),
                ),
                CachedResponse::ok("c"),
            )
            .await
            .unwrap();

        assert_eq!(
            store.generations().await.unwrap(),
            vec![CacheGeneration::from_name("g1"), CacheGeneration::from_name("g2")]
        );
        let keys = store.keys(&CacheGeneration::from_name("g1")).await.unwrap();
        assert_eq!(keys.len(), 2);
        assert!(keys.iter().all(|k| k.suffix() == Some("header")));
    }

    #[tokio::test]
    async fn test_delete_generation() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path());
        let key = keyed("g1", "RefArch", "header");
        store.put(&key, CachedResponse::ok("a")).await.unwrap();

        assert!(store.delete_generation(&key.generation).await.unwrap());
        assert!(!store.delete_generation(&key.generation).await.unwrap());
        assert!(store.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_foreign_directories_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("not-hex")).unwrap();
        let store = DiskStore::new(dir.path());
        store.put(&keyed("g1", "RefArch", "header"), CachedResponse::ok("a")).await.unwrap();

        assert_eq!(
            store.generations().await.unwrap(),
            vec![CacheGeneration::from_name("g1")]
        );
    }
}
