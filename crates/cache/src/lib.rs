//! # FaceFind Encoding Cache
//!
//! Maps a photo name to the face encodings detected in it, decides when
//! those encodings must be (re)computed, persists them in the blob store and
//! serves them back to the search path.
//!
//! ## Semantics
//!
//! - Entries live in [`Namespace::Encodings`] under the photo's name. The
//!   key is the *name*, not a content hash: a photo replaced under the same
//!   name keeps its stale entry until [`EncodingCache::ensure`] runs with
//!   `force_update = true`. Uploads always mint a fresh name, and reprocess
//!   is the explicit escape hatch.
//! - An entry with zero vectors means "processed, no face found". It is
//!   distinct from a missing entry and is never recomputed implicitly.
//! - Each entry records the embedder model that produced it. An entry from
//!   another model reads as a miss, so switching embedders recomputes
//!   lazily instead of comparing vectors from different spaces.
//! - A blob that fails to decode is treated as a miss. It is logged, counted
//!   and deleted so the next `ensure` rebuilds it.
//! - There is no locking. Two concurrent `ensure` calls may both compute and
//!   both write; writes overwrite whole entries, so the last one wins and
//!   the entry is never torn.

mod codec;
mod reconcile;

pub use codec::{
    decode_entry, encode_entry, CodecError, CompressionCodec, CompressionConfig,
    EncodingCacheEntry, CACHE_SCHEMA_VERSION,
};
pub use reconcile::ReconcileReport;

use embedding::{EmbeddingError, FaceEmbedder};
use metrics::counter;
use preprocess::{PreprocessConfig, PreprocessError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use store::{BlobStore, Namespace, StoreError};
use thiserror::Error;

/// Face encodings of one photo, one vector per face in detection order.
pub type EncodingList = Vec<Vec<f32>>;

/// Cache tuning knobs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub compression: CompressionConfig,
    /// Photos processed at once during startup reconciliation.
    pub reconcile_concurrency: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            compression: CompressionConfig::default(),
            reconcile_concurrency: 4,
        }
    }
}

/// Why turning photo bytes into encodings failed.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProcessingError {
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    #[error("preprocessing task aborted: {0}")]
    Aborted(String),
}

/// Cache error type
#[derive(Debug, Error, Clone)]
pub enum CacheError {
    #[error("photo {0:?} does not exist")]
    PhotoMissing(String),
    #[error("failed to process photo {photo:?}: {source}")]
    Processing {
        photo: String,
        #[source]
        source: ProcessingError,
    },
    #[error("blob store error: {0}")]
    Store(#[from] StoreError),
    #[error("failed to write cache entry for {photo:?}: {reason}")]
    CacheWrite { photo: String, reason: String },
}

/// Outcome of [`EncodingCache::ensure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureStatus {
    /// An entry already existed; nothing was computed.
    Cached,
    /// Encodings were computed and written.
    Computed { faces: usize },
}

impl EnsureStatus {
    pub fn is_computed(&self) -> bool {
        matches!(self, EnsureStatus::Computed { .. })
    }
}

/// Encoding cache over a [`BlobStore`] and a [`FaceEmbedder`]. Cheap to clone.
#[derive(Clone)]
pub struct EncodingCache {
    store: BlobStore,
    embedder: Arc<dyn FaceEmbedder>,
    preprocess: PreprocessConfig,
    cfg: CacheConfig,
}

impl EncodingCache {
    pub fn new(
        store: BlobStore,
        embedder: Arc<dyn FaceEmbedder>,
        preprocess: PreprocessConfig,
        cfg: CacheConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            preprocess,
            cfg,
        }
    }

    pub fn store(&self) -> &BlobStore {
        &self.store
    }

    pub fn config(&self) -> &CacheConfig {
        &self.cfg
    }

    /// Advisory existence check. Store failures read as "absent", and so do
    /// entries written by a different embedder model.
    pub async fn has(&self, photo: &str) -> bool {
        match self.get_entry(photo).await {
            Ok(entry) => entry.is_some(),
            Err(e) => {
                tracing::warn!(photo, error = %e, "cache existence check failed");
                false
            }
        }
    }

    /// Cached encodings for `photo`, or `None` when absent or corrupt.
    pub async fn get(&self, photo: &str) -> Result<Option<EncodingList>, CacheError> {
        Ok(self.get_entry(photo).await?.map(|entry| entry.encodings))
    }

    /// Like [`get`](Self::get) but with the entry's metadata.
    ///
    /// Entries computed by another model are stale and read as `None`; they
    /// are left in place until the next `ensure` overwrites them.
    pub async fn get_entry(&self, photo: &str) -> Result<Option<EncodingCacheEntry>, CacheError> {
        let Some(blob) = self.store.download(Namespace::Encodings, photo).await? else {
            return Ok(None);
        };
        match decode_entry(&blob) {
            Ok(entry) if entry.model != self.embedder.model_name() => {
                counter!("facefind_cache_stale_total").increment(1);
                tracing::debug!(
                    photo,
                    entry_model = %entry.model,
                    current_model = self.embedder.model_name(),
                    "ignoring cache entry from another model"
                );
                Ok(None)
            }
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                counter!("facefind_cache_corrupt_total").increment(1);
                tracing::warn!(photo, error = %e, "discarding corrupt cache entry");
                if let Err(del) = self.store.delete(Namespace::Encodings, photo).await {
                    tracing::warn!(photo, error = %del, "failed to delete corrupt cache entry");
                }
                Ok(None)
            }
        }
    }

    /// Persist `encodings` for `photo`, replacing any previous entry.
    pub async fn put(&self, photo: &str, encodings: EncodingList) -> Result<(), CacheError> {
        let entry = EncodingCacheEntry::new(photo, self.embedder.model_name(), encodings);
        let blob = encode_entry(&entry, &self.cfg.compression).map_err(|e| CacheError::CacheWrite {
            photo: photo.to_string(),
            reason: e.to_string(),
        })?;
        self.store
            .upload(Namespace::Encodings, photo, blob)
            .await
            .map_err(|e| CacheError::CacheWrite {
                photo: photo.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    /// Make sure `photo` has a cache entry.
    ///
    /// Without `force_update`, an existing entry short-circuits. Otherwise the
    /// original is fetched from `photo_key` in the photos namespace,
    /// preprocessed, embedded and written.
    pub async fn ensure(
        &self,
        photo_key: &str,
        photo: &str,
        force_update: bool,
    ) -> Result<EnsureStatus, CacheError> {
        if !force_update && self.has(photo).await {
            tracing::trace!(photo, "cache hit");
            return Ok(EnsureStatus::Cached);
        }

        let bytes = self
            .store
            .download(Namespace::Photos, photo_key)
            .await?
            .ok_or_else(|| CacheError::PhotoMissing(photo_key.to_string()))?;

        let encodings = self
            .compute_encodings(bytes)
            .await
            .map_err(|source| CacheError::Processing {
                photo: photo.to_string(),
                source,
            })?;
        let faces = encodings.len();
        self.put(photo, encodings).await?;

        counter!("facefind_cache_computed_total").increment(1);
        tracing::info!(photo, faces, forced = force_update, "computed face encodings");
        Ok(EnsureStatus::Computed { faces })
    }

    /// Preprocess raw image bytes and embed every face found.
    ///
    /// Decoding and resizing run on the blocking pool.
    pub async fn compute_encodings(&self, bytes: Vec<u8>) -> Result<EncodingList, ProcessingError> {
        let cfg = self.preprocess.clone();
        let image = tokio::task::spawn_blocking(move || preprocess::normalize(&bytes, &cfg))
            .await
            .map_err(|e| ProcessingError::Aborted(e.to_string()))??;
        Ok(self.embedder.detect_and_embed(&image).await?)
    }

    /// Remove the entry for `photo`. Absent entries are fine.
    pub async fn delete(&self, photo: &str) -> Result<(), CacheError> {
        self.store.delete(Namespace::Encodings, photo).await?;
        Ok(())
    }
}
