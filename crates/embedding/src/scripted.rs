//! Scripted embedder for tests, behind the `test-util` feature.
//!
//! Faces are looked up by the colour of the image's top-left pixel, which
//! survives preprocessing for solid-colour test images. Each scripted
//! colour maps to an explicit list of encodings, so tests can control exact
//! distances between faces.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::{BoundingBox, EmbeddingError, FaceEmbedder, RgbImage, Vector};

#[derive(Debug, Default)]
pub struct ScriptedEmbedder {
    faces: HashMap<[u8; 3], Vec<Vector>>,
    failing: HashSet<[u8; 3]>,
    model: Option<String>,
    calls: AtomicUsize,
}

impl ScriptedEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Images whose top-left pixel is `rgb` contain these faces.
    pub fn with_faces(mut self, rgb: [u8; 3], faces: Vec<Vector>) -> Self {
        self.faces.insert(rgb, faces);
        self
    }

    /// Images whose top-left pixel is `rgb` fail detection.
    pub fn with_failure(mut self, rgb: [u8; 3]) -> Self {
        self.failing.insert(rgb);
        self
    }

    /// Report `model` from [`FaceEmbedder::model_name`] instead of `"scripted"`.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Number of `detect_faces` calls served so far.
    pub fn detect_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn key(image: &RgbImage) -> Option<[u8; 3]> {
        (image.width() > 0 && image.height() > 0).then(|| image.get_pixel(0, 0).0)
    }
}

#[async_trait]
impl FaceEmbedder for ScriptedEmbedder {
    fn model_name(&self) -> &str {
        self.model.as_deref().unwrap_or("scripted")
    }

    async fn detect_faces(&self, image: &RgbImage) -> Result<Vec<BoundingBox>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let Some(key) = Self::key(image) else {
            return Ok(Vec::new());
        };
        if self.failing.contains(&key) {
            return Err(EmbeddingError::Inference(format!(
                "scripted detection failure for colour {key:?}"
            )));
        }
        let count = self.faces.get(&key).map_or(0, Vec::len);
        Ok(vec![BoundingBox::covering(image); count])
    }

    async fn embed_faces(
        &self,
        image: &RgbImage,
        boxes: &[BoundingBox],
    ) -> Result<Vec<Vector>, EmbeddingError> {
        let faces = Self::key(image)
            .and_then(|key| self.faces.get(&key))
            .cloned()
            .unwrap_or_default();
        Ok(faces.into_iter().take(boxes.len()).collect())
    }
}
