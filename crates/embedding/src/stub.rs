use async_trait::async_trait;
use fxhash::hash64;
use image::imageops;

use crate::normalize::l2_normalize_in_place;
use crate::{BoundingBox, EmbeddingConfig, EmbeddingError, FaceEmbedder, RgbImage, Vector};

/// Deterministic embedder used when mode is `"fast"`.
///
/// A uniformly coloured image has no face; any other image has exactly one
/// face covering the whole frame. Vectors are sinusoids seeded by a hash of
/// the face crop's pixels, so identical crops embed identically and
/// different crops land far apart.
#[derive(Debug, Clone)]
pub struct StubEmbedder {
    model_name: String,
    dim: usize,
    normalize: bool,
}

impl StubEmbedder {
    pub fn new(cfg: &EmbeddingConfig) -> Self {
        Self {
            model_name: cfg.model_name.clone(),
            dim: cfg.embedding_dim.max(1),
            normalize: cfg.normalize,
        }
    }

    fn embed_crop(&self, pixels: &[u8]) -> Vector {
        let h = hash64(pixels);
        let mut v: Vector = (0..self.dim)
            .map(|idx| {
                let phase = (h.rotate_left((idx % 64) as u32) & 0xffff) as f32;
                (phase * 0.001 + idx as f32).sin()
            })
            .collect();
        if self.normalize {
            l2_normalize_in_place(&mut v);
        }
        v
    }
}

#[async_trait]
impl FaceEmbedder for StubEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn detect_faces(&self, image: &RgbImage) -> Result<Vec<BoundingBox>, EmbeddingError> {
        let mut pixels = image.pixels();
        let uniform = match pixels.next() {
            Some(first) => pixels.all(|p| p == first),
            None => true,
        };
        if uniform {
            return Ok(Vec::new());
        }
        Ok(vec![BoundingBox::covering(image)])
    }

    async fn embed_faces(
        &self,
        image: &RgbImage,
        boxes: &[BoundingBox],
    ) -> Result<Vec<Vector>, EmbeddingError> {
        boxes
            .iter()
            .map(|b| {
                let b = b.clamp_to(image).ok_or_else(|| {
                    EmbeddingError::Inference(format!("face box {b:?} lies outside the image"))
                })?;
                let crop = imageops::crop_imm(image, b.x, b.y, b.width, b.height).to_image();
                Ok(self.embed_crop(crop.as_raw()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn stub() -> StubEmbedder {
        StubEmbedder::new(&EmbeddingConfig::default())
    }

    fn gradient(seed: u8) -> RgbImage {
        RgbImage::from_fn(12, 9, |x, y| Rgb([x as u8 * 10, y as u8 * 20, seed]))
    }

    #[tokio::test]
    async fn uniform_image_has_no_face() {
        let image = RgbImage::from_pixel(8, 8, Rgb([200, 200, 200]));
        assert!(stub().detect_and_embed(&image).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn textured_image_has_one_normalized_face() {
        let vectors = stub().detect_and_embed(&gradient(1)).await.unwrap();
        assert_eq!(vectors.len(), 1);
        assert_eq!(vectors[0].len(), 128);
        let norm: f32 = vectors[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4, "norm={norm}");
    }

    #[tokio::test]
    async fn deterministic_per_content() {
        let s = stub();
        let a1 = s.detect_and_embed(&gradient(1)).await.unwrap();
        let a2 = s.detect_and_embed(&gradient(1)).await.unwrap();
        let b = s.detect_and_embed(&gradient(2)).await.unwrap();
        assert_eq!(a1, a2);
        assert_ne!(a1, b);
    }

    #[tokio::test]
    async fn honours_configured_dimension() {
        let cfg = EmbeddingConfig {
            embedding_dim: 16,
            normalize: false,
            ..Default::default()
        };
        let vectors = StubEmbedder::new(&cfg)
            .detect_and_embed(&gradient(3))
            .await
            .unwrap();
        assert_eq!(vectors[0].len(), 16);
        assert!(vectors[0].iter().all(|v| (-1.0..=1.0).contains(v)));
    }

    #[tokio::test]
    async fn out_of_bounds_box_is_an_error() {
        let err = stub()
            .embed_faces(&gradient(1), &[BoundingBox::new(100, 100, 5, 5)])
            .await
            .unwrap_err();
        assert!(matches!(err, EmbeddingError::Inference(_)));
    }
}
