use serde::{Deserialize, Serialize};

use crate::retry::RetryConfig;
use crate::EmbeddingError;

/// Runtime configuration selecting the face embedder and its post-processing.
///
/// # Example
/// ```
/// use embedding::{build_embedder, EmbeddingConfig};
///
/// let cfg = EmbeddingConfig {
///     mode: "api".into(),
///     api_url: Some("http://faces.internal:9000".into()),
///     api_auth_header: Some("Bearer secret".into()),
///     ..Default::default()
/// };
/// assert!(cfg.validate().is_ok());
///
/// let embedder = build_embedder(&EmbeddingConfig::default()).unwrap();
/// assert_eq!(embedder.model_name(), "face-stub-v1");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `"fast"` uses the deterministic stub, `"api"` calls a remote face service.
    pub mode: String,
    /// Label recorded next to every cached encoding list.
    pub model_name: String,
    /// Vector length produced by the stub. Remote models decide their own.
    pub embedding_dim: usize,
    /// Base URL of the face service when [`mode`](Self::mode) is `"api"`.
    pub api_url: Option<String>,
    /// Authorization header value (e.g., `"Bearer xxx"`).
    pub api_auth_header: Option<String>,
    /// Per-request timeout in seconds.
    pub api_timeout_secs: u64,
    /// Normalize vectors to unit length.
    pub normalize: bool,
    pub retry: RetryConfig,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            mode: "fast".into(),
            model_name: "face-stub-v1".into(),
            embedding_dim: 128,
            api_url: None,
            api_auth_header: None,
            api_timeout_secs: 30,
            normalize: true,
            retry: RetryConfig::default(),
        }
    }
}

impl EmbeddingConfig {
    pub fn validate(&self) -> Result<(), EmbeddingError> {
        match self.mode.as_str() {
            "fast" | "stub" => {
                if self.embedding_dim == 0 {
                    return Err(EmbeddingError::InvalidConfig(
                        "embedding_dim must be greater than zero".into(),
                    ));
                }
            }
            "api" => {
                let url = self.api_url.as_deref().unwrap_or("");
                if url.trim().is_empty() {
                    return Err(EmbeddingError::InvalidConfig(
                        "api_url is required for api mode".into(),
                    ));
                }
                if self.api_timeout_secs == 0 {
                    return Err(EmbeddingError::InvalidConfig(
                        "api_timeout_secs must be greater than zero".into(),
                    ));
                }
            }
            other => {
                return Err(EmbeddingError::InvalidConfig(format!(
                    "unknown embedding mode {other:?} (expected \"fast\" or \"api\")"
                )))
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn defaults_select_the_stub() {
        let cfg = EmbeddingConfig::default();
        assert_eq!(cfg.mode, "fast");
        assert_eq!(cfg.embedding_dim, 128);
        assert!(cfg.normalize);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn api_mode_requires_url() {
        let cfg = EmbeddingConfig {
            mode: "api".into(),
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(EmbeddingError::InvalidConfig(_))));
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let cfg = EmbeddingConfig {
            mode: "onnx".into(),
            ..Default::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("onnx"));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: EmbeddingConfig = serde_json::from_str(
            r#"{"mode": "api", "api_url": "http://x", "retry": {"max_retries": 1, "base_delay": 250}}"#,
        )
        .unwrap();
        assert_eq!(cfg.retry.max_retries, 1);
        assert_eq!(cfg.retry.base_delay, Duration::from_millis(250));
        assert_eq!(cfg.retry.max_delay, Duration::from_secs(5));
        assert_eq!(cfg.api_timeout_secs, 30);
        assert!(cfg.validate().is_ok());
    }
}
