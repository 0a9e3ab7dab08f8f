//! YAML configuration for the FaceFind pipeline.
//!
//! One file describes every stage (store, preprocess, embedding, cache,
//! search, upload). Missing sections fall back to their defaults, and the
//! whole document is validated before it is handed to [`FaceFind`].
//!
//! ## Example YAML Configuration
//!
//! ```yaml
//! version: "1.0"
//! name: "studio"
//!
//! store:
//!   backend: "redb"
//!   path: "./data/facefind.redb"
//!   photos_folder: "group_imgs"
//!   cache_folder: "group_encodings_cache"
//!   public_base_url: "https://photos.example.com/blobs"
//!   list_limit: 500
//!   io_timeout_ms: 10000
//!
//! preprocess:
//!   max_dimension: 800
//!
//! embedding:
//!   mode: "api"
//!   api_url: "http://face-service:9000"
//!   embedding_dim: 128
//!
//! cache:
//!   compression:
//!     codec: "zstd"
//!     level: 3
//!   reconcile_concurrency: 4
//!
//! search:
//!   concurrency: 8
//!   default_tolerance: 0.5
//!
//! upload:
//!   allowed_extensions: ["png", "jpg", "jpeg"]
//! ```
//!
//! [`FaceFind`]: crate::FaceFind

use std::fs;
use std::path::Path;
use std::time::Duration;

use cache::CacheConfig;
use embedding::EmbeddingConfig;
use matcher::SearchConfig;
use preprocess::PreprocessConfig;
use serde::{Deserialize, Serialize};
use store::{BackendConfig, StoreConfig};
use thiserror::Error;

/// Errors that can occur when loading YAML configuration files
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported config version: {0}")]
    UnsupportedVersion(String),
}

/// Top-level configuration of a [`FaceFind`](crate::FaceFind) instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FaceFindConfig {
    /// Configuration format version
    pub version: String,

    /// Optional configuration name/description
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub store: StoreYamlConfig,

    #[serde(default)]
    pub preprocess: PreprocessConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub upload: UploadConfig,
}

impl FaceFindConfig {
    /// Load a YAML configuration file from the given path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse YAML configuration from a string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigLoadError> {
        let config: FaceFindConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        match self.version.as_str() {
            "1.0" | "1" => Ok(()),
            v => Err(ConfigLoadError::UnsupportedVersion(v.to_string())),
        }?;

        self.store.validate()?;
        self.preprocess
            .validate()
            .map_err(|e| ConfigLoadError::Validation(format!("preprocess: {e}")))?;
        self.embedding
            .validate()
            .map_err(|e| ConfigLoadError::Validation(format!("embedding: {e}")))?;
        if self.cache.reconcile_concurrency == 0 {
            return Err(ConfigLoadError::Validation(
                "cache.reconcile_concurrency must be >= 1".into(),
            ));
        }
        if !(-7..=22).contains(&self.cache.compression.level) {
            return Err(ConfigLoadError::Validation(format!(
                "cache.compression.level must be within -7..=22 (got {})",
                self.cache.compression.level
            )));
        }
        matcher::validate_tolerance(self.search.default_tolerance)
            .map_err(|e| ConfigLoadError::Validation(format!("search.default_tolerance: {e}")))?;
        if self.search.concurrency == Some(0) {
            return Err(ConfigLoadError::Validation(
                "search.concurrency must be >= 1".into(),
            ));
        }
        self.upload.validate()?;
        Ok(())
    }
}

impl Default for FaceFindConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            name: None,
            store: StoreYamlConfig::default(),
            preprocess: PreprocessConfig::default(),
            embedding: EmbeddingConfig::default(),
            cache: CacheConfig::default(),
            search: SearchConfig::default(),
            upload: UploadConfig::default(),
        }
    }
}

/// Blob store section. Mapped onto [`StoreConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreYamlConfig {
    /// `"in_memory"` or `"redb"`.
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Database file, required for the redb backend.
    #[serde(default)]
    pub path: Option<String>,

    #[serde(default = "default_photos_folder")]
    pub photos_folder: String,

    #[serde(default = "default_cache_folder")]
    pub cache_folder: String,

    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,

    #[serde(default = "default_list_limit")]
    pub list_limit: usize,

    #[serde(default = "default_io_timeout_ms")]
    pub io_timeout_ms: u64,
}

impl StoreYamlConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        match self.backend.as_str() {
            "in_memory" => {}
            "redb" => {
                if self.path.as_deref().is_none_or(|p| p.trim().is_empty()) {
                    return Err(ConfigLoadError::Validation(
                        "store.path is required for the redb backend".into(),
                    ));
                }
            }
            other => {
                return Err(ConfigLoadError::Validation(format!(
                    "store.backend must be 'in_memory' or 'redb' (got {other:?})"
                )))
            }
        }
        if self.photos_folder.is_empty() || self.cache_folder.is_empty() {
            return Err(ConfigLoadError::Validation(
                "store folders must not be empty".into(),
            ));
        }
        if self.photos_folder == self.cache_folder {
            return Err(ConfigLoadError::Validation(
                "store.photos_folder and store.cache_folder must differ".into(),
            ));
        }
        if self.list_limit == 0 {
            return Err(ConfigLoadError::Validation(
                "store.list_limit must be >= 1".into(),
            ));
        }
        if self.io_timeout_ms == 0 {
            return Err(ConfigLoadError::Validation(
                "store.io_timeout_ms must be >= 1".into(),
            ));
        }
        Ok(())
    }

    pub fn to_store_config(&self) -> StoreConfig {
        let backend = match (self.backend.as_str(), &self.path) {
            ("redb", Some(path)) => BackendConfig::redb(path.clone()),
            _ => BackendConfig::in_memory(),
        };
        StoreConfig::new()
            .with_backend(backend)
            .with_folders(self.photos_folder.clone(), self.cache_folder.clone())
            .with_public_base_url(self.public_base_url.clone())
            .with_list_limit(self.list_limit)
            .with_io_timeout(Duration::from_millis(self.io_timeout_ms))
    }
}

impl Default for StoreYamlConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: None,
            photos_folder: default_photos_folder(),
            cache_folder: default_cache_folder(),
            public_base_url: default_public_base_url(),
            list_limit: default_list_limit(),
            io_timeout_ms: default_io_timeout_ms(),
        }
    }
}

/// Upload policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Accepted file extensions, compared case-insensitively.
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,

    /// Files of one bulk upload processed at once.
    #[serde(default = "default_upload_concurrency")]
    pub concurrency: usize,
}

impl UploadConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.concurrency == 0 {
            return Err(ConfigLoadError::Validation(
                "upload.concurrency must be >= 1".into(),
            ));
        }
        if self.allowed_extensions.is_empty() {
            return Err(ConfigLoadError::Validation(
                "upload.allowed_extensions must not be empty".into(),
            ));
        }
        if let Some(bad) = self
            .allowed_extensions
            .iter()
            .find(|ext| ext.is_empty() || ext.contains('.'))
        {
            return Err(ConfigLoadError::Validation(format!(
                "upload.allowed_extensions entries are bare extensions like 'png' (got {bad:?})"
            )));
        }
        Ok(())
    }

    /// Whether `filename` carries one of the allowed extensions.
    pub fn is_allowed(&self, filename: &str) -> bool {
        match filename.rsplit_once('.') {
            Some((_, ext)) => self
                .allowed_extensions
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(ext)),
            None => false,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            allowed_extensions: default_allowed_extensions(),
            concurrency: default_upload_concurrency(),
        }
    }
}

fn default_backend() -> String {
    "in_memory".to_string()
}
fn default_photos_folder() -> String {
    "group_imgs".to_string()
}
fn default_cache_folder() -> String {
    "group_encodings_cache".to_string()
}
fn default_public_base_url() -> String {
    "http://localhost:8080/blobs".to_string()
}
fn default_list_limit() -> usize {
    500
}
fn default_io_timeout_ms() -> u64 {
    10_000
}
fn default_allowed_extensions() -> Vec<String> {
    vec!["png".into(), "jpg".into(), "jpeg".into()]
}
fn default_upload_concurrency() -> usize {
    4
}
