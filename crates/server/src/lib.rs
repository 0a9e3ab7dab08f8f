//! FaceFind Server - HTTP API for finding people across group photos
//!
//! This crate exposes the [`facefind`] service over HTTP. It supports:
//!
//! - **Photo management**: single and bulk upload, listing, viewing,
//!   deletion and forced reprocessing of group photos
//! - **Face search**: find every photo containing the face in a reference image
//! - **Health & Metrics**: liveness/readiness probes and Prometheus metrics
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use server::ServerConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::load()?;
//!     server::start_server(config).await?;
//!     Ok(())
//! }
//! ```
//!
//! # API Endpoints
//!
//! - `POST /upload-group-photo` - multipart field `file`
//! - `POST /upload-bulk-group-photos` - multipart fields `files` (200 / 207 / 400)
//! - `POST /find-person` - multipart field `file`, optional `tolerance`
//! - `GET /list-group-photos`
//! - `GET /view-image/{filename}` - redirect to the display URL
//! - `DELETE /delete-group-photo/{filename}`
//! - `POST /reprocess-group-photo/{filename}`
//! - `GET /blobs/{folder}/{key}` - originals from the photos folder
//! - `GET /`, `/health`, `/ready`, `/metrics`
//!
//! Errors are returned as `{"error": {"code": ..., "message": ...}}`.

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use server::{build_router, install_metrics_recorder, start_server};
pub use state::ServerState;
