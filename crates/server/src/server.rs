//! Server initialization and routing
//!
//! This module handles the Axum server setup including:
//! - Router configuration with all API endpoints
//! - Middleware stack (request ids, logging, timeout, compression, CORS, body limit)
//! - Prometheus recorder installation
//! - Background cache reconciliation and graceful shutdown

use crate::config::ServerConfig;
use crate::middleware::{log_requests, request_id};
use crate::routes::{api_info, not_found};
use crate::routes::{health, photos, search};
use crate::state::ServerState;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::middleware::from_fn;
use axum::routing::{delete, get, post};
use axum::Router;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Build the Axum router with all routes and middleware
///
/// Middleware stack, outermost first:
/// 1. Request ID tracking
/// 2. Request logging
/// 3. HTTP tracing
/// 4. CORS
/// 5. Compression
/// 6. Timeout handling
/// 7. Body limit
pub fn build_router(state: Arc<ServerState>) -> Router {
    let cors = if state.config.enable_cors {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::new()
    };

    let ops_routes = Router::new()
        .route("/", get(api_info))
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics));

    let photo_routes = Router::new()
        .route("/upload-group-photo", post(photos::upload_group_photo))
        .route(
            "/upload-bulk-group-photos",
            post(photos::upload_bulk_group_photos),
        )
        .route("/find-person", post(search::find_person))
        .route("/list-group-photos", get(photos::list_group_photos))
        .route("/view-image/{filename}", get(photos::view_image))
        .route(
            "/delete-group-photo/{filename}",
            delete(photos::delete_group_photo),
        )
        .route(
            "/reprocess-group-photo/{filename}",
            post(photos::reprocess_group_photo),
        )
        .route("/blobs/{folder}/{key}", get(photos::serve_blob));

    Router::new()
        .merge(ops_routes)
        .merge(photo_routes)
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(state.config.max_body_size()))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            state.config.timeout(),
        ))
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(from_fn(log_requests))
        .layer(from_fn(request_id))
        .with_state(state)
}

/// Install the process-wide Prometheus recorder once.
///
/// Returns `None` if another recorder was installed first.
pub fn install_metrics_recorder() -> Option<PrometheusHandle> {
    static HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();
    HANDLE
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!(error = %e, "prometheus recorder not installed");
                None
            }
        })
        .clone()
}

/// Start the FaceFind HTTP server
///
/// Sets up JSON logging, builds the [`FaceFind`](facefind::FaceFind)
/// service from the pipeline config, optionally reconciles the encoding
/// cache in the background, and serves until SIGTERM or Ctrl+C.
///
/// ```rust,no_run
/// use server::ServerConfig;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = ServerConfig::load()?;
///     server::start_server(config).await?;
///     Ok(())
/// }
/// ```
pub async fn start_server(config: ServerConfig) -> anyhow::Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(&config.log_level)
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .json()
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::debug!("global tracing subscriber already set");
    }

    let metrics = if config.metrics_enabled {
        install_metrics_recorder()
    } else {
        None
    };

    let state = Arc::new(ServerState::new(config.clone(), metrics)?);

    if config.reconcile_on_startup {
        let app = state.app.clone();
        tokio::spawn(async move {
            match app.reconcile().await {
                Ok(report) => tracing::info!(
                    total = report.total,
                    computed = report.computed,
                    failed = report.failed,
                    "startup reconciliation done"
                ),
                Err(e) => tracing::error!(error = %e, "startup reconciliation could not list photos"),
            }
        });
    }

    let app = build_router(state.clone());
    let addr: SocketAddr = config.socket_addr()?;

    tracing::info!(
        %addr,
        embedder = %state.app.config().embedding.mode,
        store = %state.app.config().store.backend,
        "Starting FaceFind server"
    );
    tracing::info!(
        "Timeout: {}s, Max body: {}MB, CORS: {}, Metrics: {}",
        config.timeout_secs,
        config.max_body_size_mb,
        config.enable_cors,
        config.metrics_enabled
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Shutdown signal handler
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
