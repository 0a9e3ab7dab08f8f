use super::UploadedFile;
use crate::error::{ServerError, ServerResult};
use crate::state::ServerState;
use axum::extract::{Multipart, State};
use axum::response::IntoResponse;
use axum::Json;
use facefind::MatchResult;
use serde::Serialize;
use std::sync::Arc;

/// One matching photo
#[derive(Debug, Serialize)]
pub struct FaceMatch {
    pub filename: String,
    pub url: String,
    pub distance: f32,
    /// `1 - distance`, floored at zero.
    pub confidence: f32,
    pub face_index: usize,
}

impl From<MatchResult> for FaceMatch {
    fn from(m: MatchResult) -> Self {
        Self {
            confidence: (1.0 - m.distance).max(0.0),
            filename: m.filename,
            url: m.url,
            distance: m.distance,
            face_index: m.face_index,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FindPersonResponse {
    pub matches: Vec<FaceMatch>,
    pub tolerance_used: f32,
    pub total_images_checked: usize,
    pub failed_checks: usize,
}

/// Find a person from the reference image in field `file`
///
/// An optional `tolerance` field overrides the configured default.
pub async fn find_person(
    State(state): State<Arc<ServerState>>,
    mut multipart: Multipart,
) -> ServerResult<impl IntoResponse> {
    let mut reference = None;
    let mut tolerance = None;
    while let Some(field) = multipart.next_field().await? {
        match field.name() {
            Some("file") => reference = Some(UploadedFile::read(field).await?),
            Some("tolerance") => {
                let raw = field.text().await?;
                let raw = raw.trim();
                if !raw.is_empty() {
                    let value = raw
                        .parse::<f32>()
                        .map_err(|_| ServerError::BadRequest("Invalid tolerance value".into()))?;
                    tolerance = Some(value);
                }
            }
            _ => {}
        }
    }
    let reference =
        reference.ok_or_else(|| ServerError::BadRequest("No reference image provided".into()))?;

    let report = state
        .app
        .find_person(&reference.filename, reference.bytes, tolerance)
        .await?;

    Ok(Json(FindPersonResponse {
        matches: report.matches.into_iter().map(FaceMatch::from).collect(),
        tolerance_used: report.tolerance_used,
        total_images_checked: report.total_images_checked,
        failed_checks: report.failed,
    }))
}
