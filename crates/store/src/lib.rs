//! # FaceFind Store
//!
//! Uniform access to the blob store that holds both uploaded photo originals
//! and the serialized face-encoding caches derived from them.
//!
//! ## Core Features
//!
//! - **Pluggable Backends**: storage goes through the [`BlobBackend`] trait.
//!   Out of the box there is:
//!   - An in-memory `BTreeMap` backend for tests and ephemeral deployments.
//!   - A Redb backend for persistent, on-disk storage (enabled via the
//!     `backend-redb` feature, on by default).
//! - **Namespaces**: every blob lives in one of two logical partitions,
//!   [`Namespace::Photos`] and [`Namespace::Encodings`], addressed by a stable
//!   string key.
//! - **Bounded I/O**: [`BlobStore`] wraps every backend call in a timeout so a
//!   single slow read cannot stall a whole search.
//! - **Capped listings**: `list` returns at most `limit` entries. There is no
//!   pagination; callers see a truncated listing silently.
//!
//! ## Example Usage
//!
//! ```
//! use store::{BlobStore, BackendConfig, Namespace, StoreConfig};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), store::StoreError> {
//! let store = BlobStore::new(StoreConfig::new().with_backend(BackendConfig::in_memory()))?;
//!
//! let info = store
//!     .upload(Namespace::Photos, "team.jpg", b"jpeg bytes".to_vec())
//!     .await?;
//! assert_eq!(info.size, 10);
//! assert!(info.url.ends_with("/group_imgs/team.jpg"));
//!
//! let listed = store.list(Namespace::Photos, "", 10).await?;
//! assert_eq!(listed.len(), 1);
//! # Ok(())
//! # }
//! ```

mod backend;

#[cfg(feature = "backend-redb")]
pub use backend::RedbBackend;
pub use backend::{BackendConfig, BlobBackend, BlobMeta, InMemoryBackend};

use bincode::error::{DecodeError, EncodeError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Longest key accepted by [`BlobStore`].
pub const MAX_KEY_LEN: usize = 512;

/// Logical partition inside the blob store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    /// Uploaded group photo originals.
    Photos,
    /// Serialized face-encoding cache entries.
    Encodings,
}

impl Namespace {
    pub const ALL: [Namespace; 2] = [Namespace::Photos, Namespace::Encodings];

    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Photos => "photos",
            Namespace::Encodings => "encodings",
        }
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A blob as seen by callers: backend metadata plus its display URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlobInfo {
    pub key: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
    pub url: String,
}

/// Store error type
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("backend error: {0}")]
    Backend(String),
    #[error("{op} timed out after {after:?}")]
    Timeout { op: &'static str, after: Duration },
    #[error("invalid blob key {0:?}")]
    InvalidKey(String),
    #[error("record encode error: {0}")]
    Encode(String),
    #[error("record decode error: {0}")]
    Decode(String),
}

impl From<EncodeError> for StoreError {
    fn from(e: EncodeError) -> Self {
        StoreError::Encode(e.to_string())
    }
}

impl From<DecodeError> for StoreError {
    fn from(e: DecodeError) -> Self {
        StoreError::Decode(e.to_string())
    }
}

impl StoreError {
    pub fn backend<E: std::fmt::Display>(err: E) -> Self {
        Self::Backend(err.to_string())
    }

    /// Whether retrying the same call later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Backend(_) | StoreError::Timeout { .. })
    }
}

/// Config for the blob store.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Backend storage configuration (in-memory or Redb).
    pub backend: BackendConfig,
    /// Folder name used in URLs for [`Namespace::Photos`].
    pub photos_folder: String,
    /// Folder name used in URLs for [`Namespace::Encodings`].
    pub cache_folder: String,
    /// Base URL under which blobs are publicly reachable.
    pub public_base_url: String,
    /// Hard cap on entries returned by a single listing.
    pub list_limit: usize,
    /// Upper bound on every backend call.
    pub io_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            photos_folder: "group_imgs".into(),
            cache_folder: "group_encodings_cache".into(),
            public_base_url: "http://localhost:8080/blobs".into(),
            list_limit: 500,
            io_timeout: Duration::from_secs(10),
        }
    }
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(mut self, backend: BackendConfig) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_folders(mut self, photos: impl Into<String>, cache: impl Into<String>) -> Self {
        self.photos_folder = photos.into();
        self.cache_folder = cache.into();
        self
    }

    pub fn with_public_base_url(mut self, url: impl Into<String>) -> Self {
        self.public_base_url = url.into();
        self
    }

    pub fn with_list_limit(mut self, limit: usize) -> Self {
        self.list_limit = limit;
        self
    }

    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Folder name for a namespace.
    pub fn folder(&self, ns: Namespace) -> &str {
        match ns {
            Namespace::Photos => &self.photos_folder,
            Namespace::Encodings => &self.cache_folder,
        }
    }

    /// Reverse lookup of [`folder`](Self::folder).
    pub fn namespace_for_folder(&self, folder: &str) -> Option<Namespace> {
        Namespace::ALL.into_iter().find(|ns| self.folder(*ns) == folder)
    }
}

/// Blob store handle shared by the cache, the search orchestrator and the
/// upload path. Cheap to clone.
#[derive(Clone)]
pub struct BlobStore {
    backend: Arc<dyn BlobBackend>,
    cfg: Arc<StoreConfig>,
}

impl BlobStore {
    /// Build the configured backend and wrap it.
    pub fn new(cfg: StoreConfig) -> Result<Self, StoreError> {
        let backend = cfg.backend.build()?;
        Ok(Self::with_backend(cfg, backend))
    }

    /// Wrap a custom backend (e.g. a fault-injecting one in tests).
    pub fn with_backend(cfg: StoreConfig, backend: Arc<dyn BlobBackend>) -> Self {
        Self {
            backend,
            cfg: Arc::new(cfg),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.cfg
    }

    pub fn list_limit(&self) -> usize {
        self.cfg.list_limit
    }

    /// Display URL of a blob. Pure string construction, no I/O.
    pub fn url(&self, ns: Namespace, key: &str) -> String {
        format!(
            "{}/{}/{}",
            self.cfg.public_base_url.trim_end_matches('/'),
            self.cfg.folder(ns),
            key
        )
    }

    /// Upload bytes under `key`, overwriting any previous blob.
    pub async fn upload(
        &self,
        ns: Namespace,
        key: &str,
        data: Vec<u8>,
    ) -> Result<BlobInfo, StoreError> {
        validate_key(key)?;
        let meta = self.timed("put", self.backend.put(ns, key, data)).await?;
        Ok(self.info(ns, meta))
    }

    /// Fetch a blob; `None` when the key does not exist.
    pub async fn download(&self, ns: Namespace, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        validate_key(key)?;
        self.timed("get", self.backend.get(ns, key)).await
    }

    pub async fn stat(&self, ns: Namespace, key: &str) -> Result<Option<BlobInfo>, StoreError> {
        validate_key(key)?;
        let meta = self.timed("stat", self.backend.stat(ns, key)).await?;
        Ok(meta.map(|m| self.info(ns, m)))
    }

    pub async fn exists(&self, ns: Namespace, key: &str) -> Result<bool, StoreError> {
        Ok(self.stat(ns, key).await?.is_some())
    }

    /// Delete a blob. Deleting a missing key succeeds.
    pub async fn delete(&self, ns: Namespace, key: &str) -> Result<(), StoreError> {
        validate_key(key)?;
        self.timed("delete", self.backend.delete(ns, key)).await
    }

    /// List blobs whose key starts with `prefix`, ordered by key.
    ///
    /// At most `min(limit, list_limit)` entries are returned; anything past
    /// that is silently left out.
    pub async fn list(
        &self,
        ns: Namespace,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<BlobInfo>, StoreError> {
        let limit = limit.min(self.cfg.list_limit);
        if limit == 0 {
            return Ok(Vec::new());
        }
        let metas = self
            .timed("list", self.backend.list(ns, prefix, limit))
            .await?;
        if metas.len() == limit {
            tracing::debug!(namespace = %ns, limit, "listing reached cap, results may be truncated");
        }
        Ok(metas.into_iter().map(|m| self.info(ns, m)).collect())
    }

    fn info(&self, ns: Namespace, meta: BlobMeta) -> BlobInfo {
        let url = self.url(ns, &meta.key);
        BlobInfo {
            key: meta.key,
            size: meta.size,
            created_at: meta.created_at,
            url,
        }
    }

    async fn timed<T, F>(&self, op: &'static str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let after = self.cfg.io_timeout;
        match tokio::time::timeout(after, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(op, timeout_ms = after.as_millis() as u64, "blob store call timed out");
                Err(StoreError::Timeout { op, after })
            }
        }
    }
}

/// Reject keys that are empty, too long, or could escape their namespace.
pub fn validate_key(key: &str) -> Result<(), StoreError> {
    if key.is_empty()
        || key.len() > MAX_KEY_LEN
        || key.contains('/')
        || key.contains('\\')
        || key.contains("..")
    {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    fn memory_store() -> BlobStore {
        BlobStore::new(StoreConfig::new().with_backend(BackendConfig::in_memory()))
            .expect("in-memory store")
    }

    #[tokio::test]
    async fn upload_download_roundtrip() {
        let store = memory_store();
        let info = store
            .upload(Namespace::Photos, "a.png", vec![1, 2, 3])
            .await
            .unwrap();
        assert_eq!(info.key, "a.png");
        assert_eq!(info.size, 3);
        assert_eq!(info.url, "http://localhost:8080/blobs/group_imgs/a.png");

        let bytes = store.download(Namespace::Photos, "a.png").await.unwrap();
        assert_eq!(bytes, Some(vec![1, 2, 3]));
        assert_eq!(store.download(Namespace::Photos, "b.png").await.unwrap(), None);
    }

    #[tokio::test]
    async fn namespaces_are_isolated() {
        let store = memory_store();
        store
            .upload(Namespace::Photos, "same", b"photo".to_vec())
            .await
            .unwrap();
        store
            .upload(Namespace::Encodings, "same", b"cache".to_vec())
            .await
            .unwrap();

        assert_eq!(
            store.download(Namespace::Photos, "same").await.unwrap(),
            Some(b"photo".to_vec())
        );
        store.delete(Namespace::Encodings, "same").await.unwrap();
        assert!(store.exists(Namespace::Photos, "same").await.unwrap());
        assert!(!store.exists(Namespace::Encodings, "same").await.unwrap());
    }

    #[tokio::test]
    async fn put_overwrites_and_delete_is_idempotent() {
        let store = memory_store();
        store.upload(Namespace::Photos, "k", vec![1]).await.unwrap();
        store.upload(Namespace::Photos, "k", vec![2, 2]).await.unwrap();
        assert_eq!(
            store.download(Namespace::Photos, "k").await.unwrap(),
            Some(vec![2, 2])
        );

        store.delete(Namespace::Photos, "k").await.unwrap();
        store.delete(Namespace::Photos, "k").await.unwrap();
        store.delete(Namespace::Photos, "never-existed").await.unwrap();
        assert!(!store.exists(Namespace::Photos, "k").await.unwrap());
    }

    #[tokio::test]
    async fn list_respects_prefix_and_both_limits() {
        let store = BlobStore::new(
            StoreConfig::new()
                .with_backend(BackendConfig::in_memory())
                .with_list_limit(3),
        )
        .unwrap();
        for i in 0..5 {
            store
                .upload(Namespace::Photos, &format!("img-{i}.jpg"), vec![i])
                .await
                .unwrap();
        }
        store
            .upload(Namespace::Photos, "other.jpg", vec![9])
            .await
            .unwrap();

        let capped = store.list(Namespace::Photos, "img-", 100).await.unwrap();
        assert_eq!(capped.len(), 3, "config cap applies");
        let keys: Vec<_> = capped.iter().map(|b| b.key.as_str()).collect();
        assert_eq!(keys, ["img-0.jpg", "img-1.jpg", "img-2.jpg"]);

        let limited = store.list(Namespace::Photos, "", 2).await.unwrap();
        assert_eq!(limited.len(), 2, "caller limit applies");
        assert!(store.list(Namespace::Photos, "", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_keys_are_rejected() {
        let store = memory_store();
        for key in ["", "a/b", "..", "x\\y"] {
            let err = store
                .upload(Namespace::Photos, key, vec![1])
                .await
                .unwrap_err();
            assert!(matches!(err, StoreError::InvalidKey(_)), "{key:?}");
        }
    }

    struct SlowBackend;

    #[async_trait]
    impl BlobBackend for SlowBackend {
        async fn put(&self, _: Namespace, key: &str, data: Vec<u8>) -> Result<BlobMeta, StoreError> {
            Ok(BlobMeta {
                key: key.to_string(),
                size: data.len() as u64,
                created_at: Utc::now(),
            })
        }
        async fn get(&self, _: Namespace, _: &str) -> Result<Option<Vec<u8>>, StoreError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(None)
        }
        async fn stat(&self, _: Namespace, _: &str) -> Result<Option<BlobMeta>, StoreError> {
            Ok(None)
        }
        async fn delete(&self, _: Namespace, _: &str) -> Result<(), StoreError> {
            Ok(())
        }
        async fn list(&self, _: Namespace, _: &str, _: usize) -> Result<Vec<BlobMeta>, StoreError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn slow_backend_call_times_out() {
        let store = BlobStore::with_backend(
            StoreConfig::new().with_io_timeout(Duration::from_millis(20)),
            Arc::new(SlowBackend),
        );
        let err = store.download(Namespace::Photos, "x").await.unwrap_err();
        assert!(matches!(err, StoreError::Timeout { op: "get", .. }));
        assert!(err.is_transient());
    }

    #[test]
    fn folder_lookup_roundtrips() {
        let cfg = StoreConfig::new().with_folders("pics", "encs");
        assert_eq!(cfg.folder(Namespace::Photos), "pics");
        assert_eq!(cfg.namespace_for_folder("encs"), Some(Namespace::Encodings));
        assert_eq!(cfg.namespace_for_folder("nope"), None);
    }
}
