//! Configuration and error types for image preprocessing.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest side, in pixels, of a normalized image.
pub const DEFAULT_MAX_DIMENSION: u32 = 800;

/// Largest raw upload accepted for decoding.
pub const DEFAULT_MAX_INPUT_BYTES: usize = 25 * 1024 * 1024;

/// Preprocessing settings shared by uploads and reference images.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Images whose longest side exceeds this are downscaled to it.
    pub max_dimension: u32,
    /// Payloads larger than this are rejected before decoding.
    pub max_input_bytes: usize,
    /// Apply the EXIF orientation tag before resizing.
    pub apply_exif_orientation: bool,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            max_dimension: DEFAULT_MAX_DIMENSION,
            max_input_bytes: DEFAULT_MAX_INPUT_BYTES,
            apply_exif_orientation: true,
        }
    }
}

impl PreprocessConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_dimension(mut self, max_dimension: u32) -> Self {
        self.max_dimension = max_dimension;
        self
    }

    pub fn with_max_input_bytes(mut self, max_input_bytes: usize) -> Self {
        self.max_input_bytes = max_input_bytes;
        self
    }

    pub fn validate(&self) -> Result<(), PreprocessError> {
        if self.max_dimension == 0 {
            return Err(PreprocessError::InvalidConfig(
                "max_dimension must be greater than zero".into(),
            ));
        }
        if self.max_input_bytes == 0 {
            return Err(PreprocessError::InvalidConfig(
                "max_input_bytes must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Errors raised while turning raw bytes into a canonical RGB image.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PreprocessError {
    #[error("image payload is empty")]
    Empty,
    #[error("image payload of {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },
    #[error("unrecognized image format")]
    UnknownFormat,
    #[error("failed to decode image: {0}")]
    Decode(String),
    #[error("failed to encode image: {0}")]
    Encode(String),
    #[error("invalid preprocess config: {0}")]
    InvalidConfig(String),
}
