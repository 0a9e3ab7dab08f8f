//! # FaceFind Face Embedding
//!
//! The face detection / embedding capability behind a single async trait,
//! [`FaceEmbedder`]. Everything downstream (the encoding cache, the search
//! entry point) only sees that trait, so the model can live in-process, in a
//! sidecar, or be replaced by a deterministic stub in tests.
//!
//! ## Contract
//!
//! - `detect_faces(image)` returns zero or more bounding boxes, in detection
//!   order.
//! - `embed_faces(image, boxes)` returns exactly one vector per box, in the
//!   same order.
//! - For a fixed model the output is deterministic, and every vector it
//!   produces has the same length.
//!
//! ## Backends
//!
//! | mode     | type                | notes                                      |
//! |----------|---------------------|--------------------------------------------|
//! | `"fast"` | [`StubEmbedder`]    | hash-derived vectors, no model required    |
//! | `"api"`  | [`ApiEmbedder`]     | remote face service, retries with backoff  |
//!
//! Use [`build_embedder`] to construct the configured one.

mod api;
mod config;
mod error;
mod normalize;
pub mod retry;
#[cfg(any(test, feature = "test-util"))]
pub mod scripted;
mod serde_millis;
mod stub;

pub use api::ApiEmbedder;
pub use config::EmbeddingConfig;
pub use error::EmbeddingError;
pub use retry::RetryConfig;
#[cfg(any(test, feature = "test-util"))]
pub use scripted::ScriptedEmbedder;
pub use stub::StubEmbedder;

pub use preprocess::RgbImage;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One face embedding.
pub type Vector = Vec<f32>;

/// Pixel rectangle of a detected face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The whole image as a single box.
    pub fn covering(image: &RgbImage) -> Self {
        Self::new(0, 0, image.width(), image.height())
    }

    /// Clamp the box to the image bounds. `None` when nothing is left.
    pub fn clamp_to(&self, image: &RgbImage) -> Option<Self> {
        let (w, h) = image.dimensions();
        if self.x >= w || self.y >= h {
            return None;
        }
        let width = self.width.min(w - self.x);
        let height = self.height.min(h - self.y);
        (width > 0 && height > 0).then(|| Self::new(self.x, self.y, width, height))
    }
}

/// Face detection and embedding capability.
#[async_trait]
pub trait FaceEmbedder: Send + Sync {
    /// Identifier of the model producing the vectors.
    fn model_name(&self) -> &str;

    async fn detect_faces(&self, image: &RgbImage) -> Result<Vec<BoundingBox>, EmbeddingError>;

    async fn embed_faces(
        &self,
        image: &RgbImage,
        boxes: &[BoundingBox],
    ) -> Result<Vec<Vector>, EmbeddingError>;

    /// Detect every face and embed each one, in detection order.
    ///
    /// An image without faces yields an empty list, not an error.
    async fn detect_and_embed(&self, image: &RgbImage) -> Result<Vec<Vector>, EmbeddingError> {
        let boxes = self.detect_faces(image).await?;
        if boxes.is_empty() {
            return Ok(Vec::new());
        }
        let vectors = self.embed_faces(image, &boxes).await?;
        if vectors.len() != boxes.len() {
            return Err(EmbeddingError::CountMismatch {
                boxes: boxes.len(),
                vectors: vectors.len(),
            });
        }
        Ok(vectors)
    }
}

/// Build the embedder selected by `cfg.mode`.
pub fn build_embedder(cfg: &EmbeddingConfig) -> Result<Arc<dyn FaceEmbedder>, EmbeddingError> {
    cfg.validate()?;
    let embedder: Arc<dyn FaceEmbedder> = match cfg.mode.as_str() {
        "api" => Arc::new(ApiEmbedder::new(cfg)?),
        _ => Arc::new(StubEmbedder::new(cfg)),
    };
    tracing::info!(mode = %cfg.mode, model = embedder.model_name(), "face embedder ready");
    Ok(embedder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    struct LossyEmbedder;

    #[async_trait]
    impl FaceEmbedder for LossyEmbedder {
        fn model_name(&self) -> &str {
            "lossy"
        }

        async fn detect_faces(&self, image: &RgbImage) -> Result<Vec<BoundingBox>, EmbeddingError> {
            Ok(vec![BoundingBox::covering(image); 2])
        }

        async fn embed_faces(
            &self,
            _image: &RgbImage,
            _boxes: &[BoundingBox],
        ) -> Result<Vec<Vector>, EmbeddingError> {
            Ok(vec![vec![1.0]])
        }
    }

    #[tokio::test]
    async fn detect_and_embed_rejects_count_mismatch() {
        let image = RgbImage::from_pixel(4, 4, Rgb([1, 2, 3]));
        let err = LossyEmbedder.detect_and_embed(&image).await.unwrap_err();
        assert_eq!(err, EmbeddingError::CountMismatch { boxes: 2, vectors: 1 });
    }

    #[test]
    fn clamp_trims_and_discards() {
        let image = RgbImage::new(10, 8);
        assert_eq!(
            BoundingBox::new(6, 4, 10, 10).clamp_to(&image),
            Some(BoundingBox::new(6, 4, 4, 4))
        );
        assert_eq!(BoundingBox::new(10, 0, 1, 1).clamp_to(&image), None);
        assert_eq!(BoundingBox::new(0, 0, 0, 5).clamp_to(&image), None);
    }

    #[test]
    fn build_embedder_rejects_bad_config() {
        let cfg = EmbeddingConfig {
            mode: "api".into(),
            api_url: None,
            ..Default::default()
        };
        assert!(build_embedder(&cfg).is_err());
    }
}
