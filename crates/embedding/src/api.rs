use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::normalize::l2_normalize_in_place;
use crate::retry::{retry_async, RetryConfig};
use crate::{BoundingBox, EmbeddingConfig, EmbeddingError, FaceEmbedder, RgbImage, Vector};

/// Client for a remote face service.
///
/// Wire protocol, both endpoints JSON over `POST`:
///
/// - `{api_url}/detect` with `{"model", "image"}` answers `{"boxes": [{x, y, width, height}]}`
/// - `{api_url}/embed` with `{"model", "image", "boxes"}` answers `{"embeddings": [[f32]]}`
///
/// `image` is the normalized image as base64 PNG. Transport errors, 5xx and
/// 429 are retried per [`RetryConfig`].
#[derive(Debug, Clone)]
pub struct ApiEmbedder {
    client: reqwest::Client,
    base_url: String,
    auth_header: Option<String>,
    model_name: String,
    normalize: bool,
    retry: RetryConfig,
}

#[derive(Serialize)]
struct DetectRequest<'a> {
    model: &'a str,
    image: &'a str,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    image: &'a str,
    boxes: &'a [BoundingBox],
}

#[derive(Deserialize)]
struct DetectResponse {
    boxes: Vec<BoundingBox>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vector>,
}

impl ApiEmbedder {
    pub fn new(cfg: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let base_url = cfg
            .api_url
            .as_deref()
            .map(|u| u.trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .ok_or_else(|| EmbeddingError::InvalidConfig("api_url is required for api mode".into()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.api_timeout_secs.max(1)))
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(32)
            .build()
            .map_err(|e| EmbeddingError::InvalidConfig(format!("http client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            auth_header: cfg.api_auth_header.clone(),
            model_name: cfg.model_name.clone(),
            normalize: cfg.normalize,
            retry: cfg.retry,
        })
    }

    fn encode_image(image: &RgbImage) -> Result<String, EmbeddingError> {
        let png = preprocess::encode_png(image).map_err(|e| EmbeddingError::Image(e.to_string()))?;
        Ok(STANDARD.encode(png))
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, EmbeddingError>
    where
        B: Serialize + Sync + ?Sized,
        R: DeserializeOwned + Send,
    {
        let url = format!("{}/{path}", self.base_url);
        retry_async(&self.retry, EmbeddingError::is_retryable, |attempt| {
            let url = url.as_str();
            async move {
                if attempt > 0 {
                    tracing::info!(attempt, url, "retrying face service request");
                }
                let mut request = self.client.post(url).json(body);
                if let Some(header) = self.auth_header.as_deref() {
                    request = request.header(reqwest::header::AUTHORIZATION, header);
                }
                let response = request.send().await?;
                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(EmbeddingError::Http {
                        status: status.as_u16(),
                        body,
                    });
                }
                response
                    .json::<R>()
                    .await
                    .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))
            }
        })
        .await
    }
}

#[async_trait]
impl FaceEmbedder for ApiEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn detect_faces(&self, image: &RgbImage) -> Result<Vec<BoundingBox>, EmbeddingError> {
        let encoded = Self::encode_image(image)?;
        let response: DetectResponse = self
            .post(
                "detect",
                &DetectRequest {
                    model: &self.model_name,
                    image: &encoded,
                },
            )
            .await?;
        Ok(response.boxes)
    }

    async fn embed_faces(
        &self,
        image: &RgbImage,
        boxes: &[BoundingBox],
    ) -> Result<Vec<Vector>, EmbeddingError> {
        if boxes.is_empty() {
            return Ok(Vec::new());
        }
        let encoded = Self::encode_image(image)?;
        let response: EmbedResponse = self
            .post(
                "embed",
                &EmbedRequest {
                    model: &self.model_name,
                    image: &encoded,
                    boxes,
                },
            )
            .await?;

        let mut vectors = response.embeddings;
        if let Some(first) = vectors.first() {
            let dim = first.len();
            if dim == 0 || vectors.iter().any(|v| v.len() != dim) {
                return Err(EmbeddingError::InvalidResponse(
                    "embeddings have inconsistent dimensions".into(),
                ));
            }
        }
        if self.normalize {
            vectors.iter_mut().for_each(|v| l2_normalize_in_place(v));
        }
        if vectors.iter().flatten().any(|x| !x.is_finite()) {
            return Err(EmbeddingError::InvalidResponse(
                "embeddings contain non-finite values".into(),
            ));
        }
        Ok(vectors)
    }
}
