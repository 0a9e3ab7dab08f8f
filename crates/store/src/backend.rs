use crate::{Namespace, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// Metadata a backend reports for a stored blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobMeta {
    pub key: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

/// Trait for a namespaced blob storage backend.
/// This allows for different storage implementations (e.g., in-memory, Redb).
#[async_trait]
pub trait BlobBackend: Send + Sync {
    /// Store `data` under `key`, replacing any previous blob.
    async fn put(&self, ns: Namespace, key: &str, data: Vec<u8>) -> Result<BlobMeta, StoreError>;
    /// Retrieve a blob by key.
    async fn get(&self, ns: Namespace, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
    /// Metadata without the payload.
    async fn stat(&self, ns: Namespace, key: &str) -> Result<Option<BlobMeta>, StoreError>;
    /// Remove a blob. Missing keys are not an error.
    async fn delete(&self, ns: Namespace, key: &str) -> Result<(), StoreError>;
    /// Up to `limit` blobs whose key starts with `prefix`, in key order.
    async fn list(
        &self,
        ns: Namespace,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<BlobMeta>, StoreError>;
}

/// Configuration for selecting and building a backend.
///
/// # Example
/// ```
/// use store::BackendConfig;
///
/// // In-memory (for testing)
/// let config = BackendConfig::in_memory();
///
/// // Redb (persistent)
/// let config = BackendConfig::redb("/data/facefind.redb");
/// ```
#[derive(Clone, Debug, Default)]
pub enum BackendConfig {
    /// Persistent Redb database file at `path`.
    ///
    /// Requires the `backend-redb` feature (enabled by default).
    Redb { path: String },
    /// Process-local maps, lost on restart.
    #[default]
    InMemory,
}

impl BackendConfig {
    pub fn in_memory() -> Self {
        BackendConfig::InMemory
    }

    pub fn redb<P: Into<String>>(path: P) -> Self {
        BackendConfig::Redb { path: path.into() }
    }

    /// Build the backend based on the configuration.
    pub fn build(&self) -> Result<Arc<dyn BlobBackend>, StoreError> {
        match self {
            BackendConfig::InMemory => Ok(Arc::new(InMemoryBackend::new())),
            BackendConfig::Redb { path } => {
                #[cfg(feature = "backend-redb")]
                {
                    Ok(Arc::new(RedbBackend::open(path)?))
                }
                #[cfg(not(feature = "backend-redb"))]
                {
                    let _ = path;
                    Err(StoreError::backend("redb backend disabled at compile time"))
                }
            }
        }
    }
}

/// An in-memory blob: creation time travels with the bytes.
#[derive(Debug, Clone)]
pub(crate) struct StoredBlob {
    pub created_at_ms: i64,
    pub data: Vec<u8>,
}

impl StoredBlob {
    pub(crate) fn new(data: Vec<u8>) -> Self {
        Self {
            created_at_ms: Utc::now().timestamp_millis(),
            data,
        }
    }

    pub(crate) fn meta(&self, key: &str) -> BlobMeta {
        BlobMeta {
            key: key.to_string(),
            size: self.data.len() as u64,
            created_at: Utc
                .timestamp_millis_opt(self.created_at_ms)
                .single()
                .unwrap_or_default(),
        }
    }
}

type Shelf = RwLock<BTreeMap<String, StoredBlob>>;

/// An in-memory backend: one `RwLock<BTreeMap>` per namespace.
#[derive(Default)]
pub struct InMemoryBackend {
    photos: Shelf,
    encodings: Shelf,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn shelf(&self, ns: Namespace) -> &Shelf {
        match ns {
            Namespace::Photos => &self.photos,
            Namespace::Encodings => &self.encodings,
        }
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::backend("poisoned lock")
}

#[async_trait]
impl BlobBackend for InMemoryBackend {
    async fn put(&self, ns: Namespace, key: &str, data: Vec<u8>) -> Result<BlobMeta, StoreError> {
        let blob = StoredBlob::new(data);
        let meta = blob.meta(key);
        self.shelf(ns)
            .write()
            .map_err(poisoned)?
            .insert(key.to_string(), blob);
        Ok(meta)
    }

    async fn get(&self, ns: Namespace, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let guard = self.shelf(ns).read().map_err(poisoned)?;
        Ok(guard.get(key).map(|b| b.data.clone()))
    }

    async fn stat(&self, ns: Namespace, key: &str) -> Result<Option<BlobMeta>, StoreError> {
        let guard = self.shelf(ns).read().map_err(poisoned)?;
        Ok(guard.get(key).map(|b| b.meta(key)))
    }

    async fn delete(&self, ns: Namespace, key: &str) -> Result<(), StoreError> {
        self.shelf(ns).write().map_err(poisoned)?.remove(key);
        Ok(())
    }

    async fn list(
        &self,
        ns: Namespace,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<BlobMeta>, StoreError> {
        let guard = self.shelf(ns).read().map_err(poisoned)?;
        Ok(guard
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .take(limit)
            .map(|(k, b)| b.meta(k))
            .collect())
    }
}

/// Redb-backed persistent storage.
#[cfg(feature = "backend-redb")]
pub mod redb;

#[cfg(feature = "backend-redb")]
pub use redb::RedbBackend;
