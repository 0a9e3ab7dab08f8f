use thiserror::Error;

/// Errors surfaced by face detection and embedding.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EmbeddingError {
    /// Configuration is inconsistent (e.g., `api` mode without `api_url`).
    #[error("invalid embedding config: {0}")]
    InvalidConfig(String),
    /// The request never produced an HTTP response (connect, timeout, reset).
    #[error("transport failure: {0}")]
    Transport(String),
    /// The remote face service answered with a non-success status.
    #[error("HTTP error {status}: {body}")]
    Http { status: u16, body: String },
    /// The remote answer could not be understood.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    /// Embedder returned a different number of vectors than boxes it was given.
    #[error("embedder returned {vectors} vectors for {boxes} faces")]
    CountMismatch { boxes: usize, vectors: usize },
    /// The image could not be prepared for the embedder.
    #[error("image encoding failed: {0}")]
    Image(String),
    /// Detection or embedding failed inside the model.
    #[error("inference failure: {0}")]
    Inference(String),
}

impl EmbeddingError {
    /// Whether the same request may succeed if retried.
    ///
    /// Transport failures, 5xx and 429 are transient; everything else is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            EmbeddingError::Transport(_) => true,
            EmbeddingError::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for EmbeddingError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            EmbeddingError::Http {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else if err.is_decode() {
            EmbeddingError::InvalidResponse(err.to_string())
        } else {
            EmbeddingError::Transport(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(EmbeddingError::Transport("connection reset".into()).is_retryable());
        for status in [500, 502, 503, 504, 429] {
            let err = EmbeddingError::Http {
                status,
                body: String::new(),
            };
            assert!(err.is_retryable(), "{status}");
        }
        for status in [400, 401, 404, 422] {
            let err = EmbeddingError::Http {
                status,
                body: String::new(),
            };
            assert!(!err.is_retryable(), "{status}");
        }
        assert!(!EmbeddingError::InvalidResponse("bad json".into()).is_retryable());
        assert!(!EmbeddingError::CountMismatch { boxes: 2, vectors: 1 }.is_retryable());
    }

    #[test]
    fn messages_carry_detail() {
        let err = EmbeddingError::Http {
            status: 503,
            body: "overloaded".into(),
        };
        assert_eq!(err.to_string(), "HTTP error 503: overloaded");

        let err = EmbeddingError::CountMismatch { boxes: 3, vectors: 2 };
        assert!(err.to_string().contains("2 vectors for 3 faces"));
    }
}
