//! Workspace umbrella crate for FaceFind.
//!
//! [`FaceFind`] stitches the blob store, image preprocessor, face embedder,
//! encoding cache and photo search together behind the operations a photo
//! service exposes: upload (single and bulk), find a person, list, view,
//! delete and reprocess photos, plus startup reconciliation of the cache.
//!
//! ```no_run
//! use facefind::{FaceFind, FaceFindConfig};
//!
//! # async fn run() -> Result<(), facefind::FaceFindError> {
//! let app = FaceFind::new(FaceFindConfig::default())?;
//! let photo = std::fs::read("team.jpg").unwrap_or_default();
//! app.upload("team.jpg", photo).await?;
//!
//! let selfie = std::fs::read("me.png").unwrap_or_default();
//! let found = app.find_person("me.png", selfie, None).await?;
//! println!("{} of {} photos match", found.matches.len(), found.total_images_checked);
//! # Ok(())
//! # }
//! ```

pub mod config;

pub use config::{ConfigLoadError, FaceFindConfig, StoreYamlConfig, UploadConfig};

pub use cache::{CacheError, EncodingCache, EncodingList, EnsureStatus, ProcessingError, ReconcileReport};
pub use embedding::{FaceEmbedder, build_embedder};
pub use matcher::{MatchError, MatchResult, PhotoSearch, SearchOutcome};
pub use store::{BlobInfo, BlobStore, Namespace, StoreError};

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by [`FaceFind`] operations.
#[derive(Debug, Error, Clone)]
pub enum FaceFindError {
    /// The request itself is unacceptable (bad file type, empty body,
    /// reference without exactly one face, malformed name).
    #[error("{0}")]
    Validation(String),
    #[error("photo {0:?} not found")]
    NotFound(String),
    #[error("image processing failed: {0}")]
    Processing(#[from] ProcessingError),
    #[error("failed to persist encodings for {photo:?}: {reason}")]
    CacheWrite { photo: String, reason: String },
    #[error("storage error: {0}")]
    Store(StoreError),
    #[error(transparent)]
    Match(#[from] MatchError),
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<StoreError> for FaceFindError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidKey(key) => {
                FaceFindError::Validation(format!("invalid photo name {key:?}"))
            }
            other => FaceFindError::Store(other),
        }
    }
}

impl From<CacheError> for FaceFindError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::PhotoMissing(photo) => FaceFindError::NotFound(photo),
            CacheError::Processing { source, .. } => FaceFindError::Processing(source),
            CacheError::Store(e) => e.into(),
            CacheError::CacheWrite { photo, reason } => FaceFindError::CacheWrite { photo, reason },
        }
    }
}

impl From<ConfigLoadError> for FaceFindError {
    fn from(err: ConfigLoadError) -> Self {
        FaceFindError::Config(err.to_string())
    }
}

/// A stored photo and what happened when its encodings were computed.
///
/// Upload never rolls back on a processing failure: the photo stays stored
/// and `processing_error` says why it has no cache entry yet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadOutcome {
    pub filename: String,
    pub url: String,
    pub size: u64,
    /// Faces found, `None` when processing failed.
    pub faces: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_error: Option<String>,
}

/// A file rejected by [`FaceFind::upload_bulk`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkUploadError {
    /// Filename as submitted.
    pub filename: String,
    pub error: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkUploadStatus {
    AllSucceeded,
    Partial,
    AllFailed,
}

/// Per-file results of a bulk upload, in submission order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BulkUploadReport {
    pub uploaded: Vec<UploadOutcome>,
    pub errors: Vec<BulkUploadError>,
}

impl BulkUploadReport {
    /// A stored file that could not be processed counts against the batch,
    /// so the batch is only fully successful when every file is searchable.
    pub fn status(&self) -> BulkUploadStatus {
        let unprocessed = self.unprocessed();
        match (self.uploaded.is_empty(), self.errors.is_empty() && unprocessed == 0) {
            (_, true) => BulkUploadStatus::AllSucceeded,
            (true, false) => BulkUploadStatus::AllFailed,
            (false, false) => BulkUploadStatus::Partial,
        }
    }

    /// Stored files whose encodings could not be computed.
    pub fn unprocessed(&self) -> usize {
        self.uploaded
            .iter()
            .filter(|u| u.processing_error.is_some())
            .count()
    }
}

/// Result of [`FaceFind::find_person`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FindPersonReport {
    pub matches: Vec<MatchResult>,
    pub tolerance_used: f32,
    pub total_images_checked: usize,
    pub failed: usize,
}

/// The FaceFind application service. Cheap to clone.
#[derive(Clone)]
pub struct FaceFind {
    cfg: Arc<FaceFindConfig>,
    search: PhotoSearch,
}

impl FaceFind {
    /// Build every component from `cfg`.
    pub fn new(cfg: FaceFindConfig) -> Result<Self, FaceFindError> {
        cfg.validate()?;
        let store = BlobStore::new(cfg.store.to_store_config())?;
        let embedder =
            build_embedder(&cfg.embedding).map_err(|e| FaceFindError::Config(e.to_string()))?;
        Ok(Self::with_components(cfg, store, embedder))
    }

    /// Assemble from pre-built parts; the store and embedder sections of
    /// `cfg` are ignored.
    pub fn with_components(
        cfg: FaceFindConfig,
        store: BlobStore,
        embedder: Arc<dyn FaceEmbedder>,
    ) -> Self {
        let cache = EncodingCache::new(
            store,
            embedder,
            cfg.preprocess.clone(),
            cfg.cache.clone(),
        );
        let search = PhotoSearch::new(cache, cfg.search.clone());
        Self {
            cfg: Arc::new(cfg),
            search,
        }
    }

    pub fn config(&self) -> &FaceFindConfig {
        &self.cfg
    }

    pub fn store(&self) -> &BlobStore {
        self.cache().store()
    }

    pub fn cache(&self) -> &EncodingCache {
        self.search.cache()
    }

    /// Store a group photo under a fresh unique name and encode it.
    pub async fn upload(&self, filename: &str, bytes: Vec<u8>) -> Result<UploadOutcome, FaceFindError> {
        let clean = self.accept_filename(filename)?;
        if bytes.is_empty() {
            return Err(FaceFindError::Validation(format!("{filename:?} is empty")));
        }

        let name = format!("{}_{clean}", Uuid::new_v4());
        let info = self.store().upload(Namespace::Photos, &name, bytes).await?;

        let (faces, processing_error) = match self.cache().ensure(&name, &name, true).await {
            Ok(EnsureStatus::Computed { faces }) => (Some(faces), None),
            Ok(EnsureStatus::Cached) => (None, None),
            Err(e) => {
                tracing::warn!(photo = %name, error = %e, "uploaded photo could not be encoded");
                (None, Some(e.to_string()))
            }
        };
        tracing::info!(photo = %name, size = info.size, ?faces, "group photo uploaded");

        Ok(UploadOutcome {
            filename: info.key,
            url: info.url,
            size: info.size,
            faces,
            processing_error,
        })
    }

    /// Upload several files. One file failing never affects the others.
    pub async fn upload_bulk(
        &self,
        files: Vec<(String, Vec<u8>)>,
    ) -> Result<BulkUploadReport, FaceFindError> {
        if files.is_empty() {
            return Err(FaceFindError::Validation("no files provided".into()));
        }
        let concurrency = self.cfg.upload.concurrency.max(1);

        let results: Vec<(String, Result<UploadOutcome, FaceFindError>)> = stream::iter(files)
            .map(|(filename, bytes)| async move {
                let result = self.upload(&filename, bytes).await;
                (filename, result)
            })
            .buffered(concurrency)
            .collect()
            .await;

        let mut report = BulkUploadReport::default();
        for (filename, result) in results {
            match result {
                Ok(outcome) => report.uploaded.push(outcome),
                Err(e) => report.errors.push(BulkUploadError {
                    filename,
                    error: e.to_string(),
                }),
            }
        }
        tracing::info!(
            uploaded = report.uploaded.len(),
            rejected = report.errors.len(),
            "bulk upload processed"
        );
        Ok(report)
    }

    /// Find every stored photo containing the single face in `bytes`.
    pub async fn find_person(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        tolerance: Option<f32>,
    ) -> Result<FindPersonReport, FaceFindError> {
        self.accept_filename(filename)?;
        let tolerance =
            matcher::validate_tolerance(tolerance.unwrap_or(self.cfg.search.default_tolerance))?;
        if bytes.is_empty() {
            return Err(FaceFindError::Validation("reference image is empty".into()));
        }

        let mut faces = self.cache().compute_encodings(bytes).await?;
        if faces.len() != 1 {
            return Err(FaceFindError::Validation(format!(
                "reference image must contain exactly one face (found {})",
                faces.len()
            )));
        }
        let reference = faces.remove(0);

        let photos = self.photo_names().await?;
        let outcome = self.search.search(&reference, tolerance, &photos).await?;
        Ok(FindPersonReport {
            matches: outcome.matches,
            tolerance_used: tolerance,
            total_images_checked: outcome.checked,
            failed: outcome.failed,
        })
    }

    /// Stored photos with an allowed extension, ordered by name and capped
    /// by the store's list limit.
    pub async fn list_photos(&self) -> Result<Vec<BlobInfo>, FaceFindError> {
        let store = self.store();
        let listed = store
            .list(Namespace::Photos, "", store.list_limit())
            .await?;
        Ok(listed
            .into_iter()
            .filter(|info| self.cfg.upload.is_allowed(&info.key))
            .collect())
    }

    pub async fn photo_info(&self, name: &str) -> Result<BlobInfo, FaceFindError> {
        self.store()
            .stat(Namespace::Photos, name)
            .await?
            .ok_or_else(|| FaceFindError::NotFound(name.to_string()))
    }

    /// Display URL of a stored photo.
    pub async fn photo_url(&self, name: &str) -> Result<String, FaceFindError> {
        Ok(self.photo_info(name).await?.url)
    }

    /// Original bytes of a stored photo.
    pub async fn photo_bytes(&self, name: &str) -> Result<Vec<u8>, FaceFindError> {
        self.store()
            .download(Namespace::Photos, name)
            .await?
            .ok_or_else(|| FaceFindError::NotFound(name.to_string()))
    }

    /// Delete a photo and then its cache entry.
    pub async fn delete_photo(&self, name: &str) -> Result<(), FaceFindError> {
        if self.store().stat(Namespace::Photos, name).await?.is_none() {
            return Err(FaceFindError::NotFound(name.to_string()));
        }
        self.store().delete(Namespace::Photos, name).await?;
        if let Err(e) = self.cache().delete(name).await {
            tracing::warn!(photo = name, error = %e, "photo deleted but its cache entry was not");
        }
        tracing::info!(photo = name, "group photo deleted");
        Ok(())
    }

    /// Recompute one photo's encodings regardless of its cache entry.
    pub async fn reprocess_photo(&self, name: &str) -> Result<usize, FaceFindError> {
        match self.cache().ensure(name, name, true).await? {
            EnsureStatus::Computed { faces } => Ok(faces),
            EnsureStatus::Cached => Ok(0),
        }
    }

    /// Build missing cache entries for every listed photo.
    pub async fn reconcile(&self) -> Result<ReconcileReport, FaceFindError> {
        let photos = self.photo_names().await?;
        Ok(self.cache().reconcile(&photos).await)
    }

    async fn photo_names(&self) -> Result<Vec<String>, FaceFindError> {
        Ok(self
            .list_photos()
            .await?
            .into_iter()
            .map(|info| info.key)
            .collect())
    }

    fn accept_filename(&self, filename: &str) -> Result<String, FaceFindError> {
        let clean = sanitize_filename(filename)
            .ok_or_else(|| FaceFindError::Validation(format!("invalid file name {filename:?}")))?;
        if !self.cfg.upload.is_allowed(&clean) {
            return Err(FaceFindError::Validation(format!(
                "invalid file type for {filename:?}, allowed: {}",
                self.cfg.upload.allowed_extensions.join(", ")
            )));
        }
        Ok(clean)
    }
}

/// Reduce a client-supplied file name to a safe final path segment.
///
/// Directory components are dropped, control characters become `_` and
/// runs of dots collapse to one. Returns `None` when nothing usable is left.
pub fn sanitize_filename(filename: &str) -> Option<String> {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    let mut clean = String::with_capacity(base.len());
    for ch in base.chars() {
        let ch = if ch.is_control() { '_' } else { ch };
        if ch == '.' && clean.ends_with('.') {
            continue;
        }
        clean.push(ch);
    }

    let stem_empty = clean.trim_start_matches('.').is_empty();
    (!stem_empty).then_some(clean)
}
