use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use facefind::FaceFind;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Instant;

/// Shared application state
#[derive(Clone)]
pub struct ServerState {
    /// Server configuration
    pub config: Arc<ServerConfig>,

    /// FaceFind service (shared across requests)
    pub app: FaceFind,

    /// Prometheus render handle, `None` when metrics are disabled
    pub metrics: Option<PrometheusHandle>,

    pub started_at: Instant,
}

impl ServerState {
    /// Create new server state from the configured pipeline file
    pub fn new(config: ServerConfig, metrics: Option<PrometheusHandle>) -> ServerResult<Self> {
        let pipeline = config
            .load_pipeline()
            .map_err(|e| ServerError::Config(e.to_string()))?;
        let app = FaceFind::new(pipeline)?;
        Ok(Self::with_app(config, app, metrics))
    }

    /// Wrap an already-built service
    pub fn with_app(config: ServerConfig, app: FaceFind, metrics: Option<PrometheusHandle>) -> Self {
        Self {
            config: Arc::new(config),
            app,
            metrics,
            started_at: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
