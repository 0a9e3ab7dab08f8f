use super::UploadedFile;
use crate::error::{ServerError, ServerResult};
use crate::state::ServerState;
use axum::extract::{Multipart, Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect};
use axum::Json;
use chrono::{DateTime, Utc};
use facefind::{BlobInfo, BulkUploadError, BulkUploadStatus, Namespace, UploadOutcome};
use serde::Serialize;
use std::sync::Arc;

/// Response from a single upload
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub filename: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub faces: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_error: Option<String>,
}

/// One stored file in a bulk upload response
#[derive(Debug, Serialize)]
pub struct UploadedFileSummary {
    pub filename: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub faces: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_error: Option<String>,
}

impl From<UploadOutcome> for UploadedFileSummary {
    fn from(u: UploadOutcome) -> Self {
        Self {
            filename: u.filename,
            url: u.url,
            faces: u.faces,
            processing_error: u.processing_error,
        }
    }
}

/// Bulk upload response
#[derive(Debug, Serialize)]
pub struct BulkUploadResponse {
    pub message: String,
    pub uploaded_files: Vec<UploadedFileSummary>,
    pub total_uploaded: usize,
    pub errors: Vec<BulkUploadError>,
    pub total_errors: usize,
    /// Stored files without usable encodings.
    pub total_unprocessed: usize,
}

/// Single entry of the photo listing
#[derive(Debug, Serialize)]
pub struct PhotoEntry {
    pub filename: String,
    pub size: u64,
    pub upload_time: DateTime<Utc>,
    pub url: String,
    pub view_url: String,
}

impl From<BlobInfo> for PhotoEntry {
    fn from(info: BlobInfo) -> Self {
        Self {
            view_url: info.url.clone(),
            filename: info.key,
            size: info.size,
            upload_time: info.created_at,
            url: info.url,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListPhotosResponse {
    pub photos: Vec<PhotoEntry>,
    pub count: usize,
}

/// Upload one group photo from the multipart field `file`
pub async fn upload_group_photo(
    State(state): State<Arc<ServerState>>,
    mut multipart: Multipart,
) -> ServerResult<impl IntoResponse> {
    let mut file = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("file") {
            file = Some(UploadedFile::read(field).await?);
        }
    }
    let file = file.ok_or_else(|| ServerError::BadRequest("No file provided".into()))?;

    let outcome = state.app.upload(&file.filename, file.bytes).await?;
    let message = match outcome.processing_error {
        None => "Group photo uploaded and processed",
        Some(_) => "Group photo uploaded but could not be processed",
    };
    Ok(Json(UploadResponse {
        message: message.into(),
        filename: outcome.filename,
        url: outcome.url,
        faces: outcome.faces,
        processing_error: outcome.processing_error,
    }))
}

/// Upload every multipart field named `files`
///
/// Responds 200 when all files were stored, 207 on a partial success and
/// 400 when nothing was stored.
pub async fn upload_bulk_group_photos(
    State(state): State<Arc<ServerState>>,
    mut multipart: Multipart,
) -> ServerResult<impl IntoResponse> {
    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("files") {
            let file = UploadedFile::read(field).await?;
            files.push((file.filename, file.bytes));
        }
    }
    if files.is_empty() || files.iter().all(|(name, _)| name.is_empty()) {
        return Err(ServerError::BadRequest("No files provided".into()));
    }

    let report = state.app.upload_bulk(files).await?;
    let status = match report.status() {
        BulkUploadStatus::AllSucceeded => StatusCode::OK,
        BulkUploadStatus::Partial => StatusCode::MULTI_STATUS,
        BulkUploadStatus::AllFailed => StatusCode::BAD_REQUEST,
    };

    let total_unprocessed = report.unprocessed();
    let uploaded_files: Vec<UploadedFileSummary> = report
        .uploaded
        .into_iter()
        .map(UploadedFileSummary::from)
        .collect();
    let body = BulkUploadResponse {
        message: "Bulk upload processed".into(),
        total_uploaded: uploaded_files.len(),
        uploaded_files,
        total_errors: report.errors.len(),
        errors: report.errors,
        total_unprocessed,
    };
    Ok((status, Json(body)))
}

/// List stored group photos
pub async fn list_group_photos(
    State(state): State<Arc<ServerState>>,
) -> ServerResult<impl IntoResponse> {
    let photos: Vec<PhotoEntry> = state
        .app
        .list_photos()
        .await?
        .into_iter()
        .map(PhotoEntry::from)
        .collect();
    Ok(Json(ListPhotosResponse {
        count: photos.len(),
        photos,
    }))
}

/// Redirect to a photo's display URL
pub async fn view_image(
    State(state): State<Arc<ServerState>>,
    Path(filename): Path<String>,
) -> ServerResult<Redirect> {
    let url = state.app.photo_url(&filename).await?;
    Ok(Redirect::temporary(&url))
}

/// Delete a photo and its cache entry
pub async fn delete_group_photo(
    State(state): State<Arc<ServerState>>,
    Path(filename): Path<String>,
) -> ServerResult<impl IntoResponse> {
    state.app.delete_photo(&filename).await?;
    Ok(Json(serde_json::json!({
        "message": "Group photo and cache deleted successfully",
        "filename": filename,
    })))
}

/// Recompute a photo's face encodings
pub async fn reprocess_group_photo(
    State(state): State<Arc<ServerState>>,
    Path(filename): Path<String>,
) -> ServerResult<impl IntoResponse> {
    let faces = state.app.reprocess_photo(&filename).await?;
    Ok(Json(serde_json::json!({
        "message": "Group photo reprocessed",
        "filename": filename,
        "faces": faces,
    })))
}

/// Serve an original from the photos folder
///
/// The cache folder is never served.
pub async fn serve_blob(
    State(state): State<Arc<ServerState>>,
    Path((folder, key)): Path<(String, String)>,
) -> ServerResult<impl IntoResponse> {
    let store_cfg = state.app.store().config();
    if store_cfg.namespace_for_folder(&folder) != Some(Namespace::Photos) {
        return Err(ServerError::NotFound(format!("folder {folder:?}")));
    }
    let bytes = state.app.photo_bytes(&key).await?;
    Ok(([(CONTENT_TYPE, content_type_for(&key))], bytes))
}

fn content_type_for(key: &str) -> &'static str {
    let ext = key.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}
