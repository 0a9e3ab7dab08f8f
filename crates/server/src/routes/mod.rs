//! API route handlers
//!
//! Routes are organized by functionality:
//!
//! - `health`: Health checks, readiness, and metrics
//! - `photos`: Group photo upload, listing, viewing, deletion and reprocessing
//! - `search`: Finding a person across the stored photos

pub mod health;
pub mod photos;
pub mod search;

use crate::error::{ServerError, ServerResult};
use axum::extract::multipart::Field;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

/// Service name and endpoint list.
pub async fn api_info() -> ServerResult<impl IntoResponse> {
    Ok(Json(json!({
        "name": "FaceFind Server",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [
            "POST /upload-group-photo",
            "POST /upload-bulk-group-photos",
            "POST /find-person",
            "GET /list-group-photos",
            "GET /view-image/{filename}",
            "DELETE /delete-group-photo/{filename}",
            "POST /reprocess-group-photo/{filename}",
            "GET /blobs/{folder}/{key}",
            "/health",
            "/ready",
            "/metrics"
        ]
    })))
}

/// 404 Not Found handler
pub async fn not_found() -> ServerError {
    ServerError::NotFound("no such route".into())
}

/// An uploaded file read from a multipart field.
pub(crate) struct UploadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub(crate) async fn read(field: Field<'_>) -> ServerResult<Self> {
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await?.to_vec();
        Ok(Self { filename, bytes })
    }
}
