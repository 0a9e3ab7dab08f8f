//! # FaceFind Preprocessing
//!
//! Turns raw upload bytes into the canonical pixel array consumed by the face
//! embedder.
//!
//! ## Pipeline
//!
//! 1. Guess the format from the payload's magic bytes (PNG or JPEG).
//! 2. Read the EXIF orientation tag from the decoder and rotate/flip the
//!    decoded image accordingly. This happens *before* resizing so the
//!    longest-side cap is measured on the image as a viewer sees it.
//! 3. Convert to 8-bit RGB.
//! 4. Downscale with a Lanczos3 filter so the longest side is at most
//!    [`PreprocessConfig::max_dimension`]. Aspect ratio is kept; target
//!    sizes are truncated, never rounded up.
//!
//! `normalize` is a pure function of `(bytes, config)`.
//!
//! ## Example Usage
//!
//! ```
//! use image::{ImageFormat, Rgb, RgbImage};
//! use preprocess::{normalize, PreprocessConfig};
//! use std::io::Cursor;
//!
//! let mut png = Vec::new();
//! RgbImage::from_pixel(1600, 900, Rgb([10, 20, 30]))
//!     .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
//!     .unwrap();
//!
//! let rgb = normalize(&png, &PreprocessConfig::default()).unwrap();
//! assert_eq!(rgb.dimensions(), (800, 450));
//! ```

mod config;

pub use config::{
    PreprocessConfig, PreprocessError, DEFAULT_MAX_DIMENSION, DEFAULT_MAX_INPUT_BYTES,
};
pub use image::RgbImage;

use image::imageops::{self, FilterType};
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader};
use std::io::Cursor;

/// Decode, orient, convert and downscale an image.
pub fn normalize(bytes: &[u8], cfg: &PreprocessConfig) -> Result<RgbImage, PreprocessError> {
    cfg.validate()?;
    if bytes.is_empty() {
        return Err(PreprocessError::Empty);
    }
    if bytes.len() > cfg.max_input_bytes {
        return Err(PreprocessError::TooLarge {
            size: bytes.len(),
            limit: cfg.max_input_bytes,
        });
    }

    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| PreprocessError::Decode(e.to_string()))?;
    if reader.format().is_none() {
        return Err(PreprocessError::UnknownFormat);
    }

    let mut decoder = reader
        .into_decoder()
        .map_err(|e| PreprocessError::Decode(e.to_string()))?;
    let orientation = if cfg.apply_exif_orientation {
        decoder.orientation().unwrap_or_else(|e| {
            tracing::debug!(error = %e, "unreadable exif orientation, assuming upright");
            Orientation::NoTransforms
        })
    } else {
        Orientation::NoTransforms
    };
    let image =
        DynamicImage::from_decoder(decoder).map_err(|e| PreprocessError::Decode(e.to_string()))?;

    let rgb = orient(image, orientation).into_rgb8();
    Ok(downscale(rgb, cfg.max_dimension))
}

fn orient(mut image: DynamicImage, orientation: Orientation) -> DynamicImage {
    if orientation != Orientation::NoTransforms {
        tracing::trace!(?orientation, "applying exif orientation");
        image.apply_orientation(orientation);
    }
    image
}

/// Target size for an image so its longest side fits in `max_dimension`.
///
/// Images already within the cap are left untouched.
pub fn fit_within(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest <= max_dimension || longest == 0 {
        return (width, height);
    }
    let scale = |side: u32| ((side as u64 * max_dimension as u64) / longest as u64).max(1) as u32;
    (scale(width), scale(height))
}

fn downscale(rgb: RgbImage, max_dimension: u32) -> RgbImage {
    let (width, height) = rgb.dimensions();
    let (target_w, target_h) = fit_within(width, height, max_dimension);
    if (target_w, target_h) == (width, height) {
        return rgb;
    }
    imageops::resize(&rgb, target_w, target_h, FilterType::Lanczos3)
}

/// PNG-encode a normalized image, e.g. for shipping it to a remote embedder.
pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>, PreprocessError> {
    let mut out = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .map_err(|e| PreprocessError::Encode(e.to_string()))?;
    Ok(out)
}
