//! On-store representation of a cache entry.
//!
//! Layout: one codec tag byte followed by the (optionally zstd-compressed)
//! bincode encoding of [`EncodingCacheEntry`]. The tag makes every blob
//! self-describing, so changing the configured codec never strands old
//! entries.

use bincode::config::standard;
use bincode::serde::{decode_from_slice, encode_to_vec};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use zstd::{decode_all, encode_all};

use crate::EncodingList;

/// Bump this value whenever the stored `EncodingCacheEntry` layout changes.
pub const CACHE_SCHEMA_VERSION: u16 = 1;

const TAG_NONE: u8 = 0;
const TAG_ZSTD: u8 = 1;

/// Face encodings of one photo, as persisted in the encodings namespace.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EncodingCacheEntry {
    pub schema_version: u16,
    /// Photo name this entry was computed from.
    pub photo: String,
    /// Embedder model that produced the vectors.
    pub model: String,
    pub computed_at_ms: i64,
    /// One vector per detected face, in detection order. May be empty.
    pub encodings: EncodingList,
}

impl EncodingCacheEntry {
    pub fn new(photo: &str, model: &str, encodings: EncodingList) -> Self {
        Self {
            schema_version: CACHE_SCHEMA_VERSION,
            photo: photo.to_string(),
            model: model.to_string(),
            computed_at_ms: Utc::now().timestamp_millis(),
            encodings,
        }
    }

    pub fn computed_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.computed_at_ms).single()
    }
}

/// Compression codec options for cache blobs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionCodec {
    None,
    #[default]
    Zstd,
}

/// Compression behavior configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    pub codec: CompressionCodec,
    /// Zstd level (1-22, higher = smaller but slower).
    pub level: i32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            codec: CompressionCodec::default(),
            level: 3,
        }
    }
}

impl CompressionConfig {
    pub fn new(codec: CompressionCodec, level: i32) -> Self {
        Self { codec, level }
    }

    pub fn with_codec(mut self, codec: CompressionCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }
}

/// Why a stored blob could not be turned back into an entry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("empty cache blob")]
    Empty,
    #[error("unknown codec tag {0}")]
    UnknownTag(u8),
    #[error("decompression failed: {0}")]
    Decompress(String),
    #[error("compression failed: {0}")]
    Compress(String),
    #[error("bincode: {0}")]
    Bincode(String),
    #[error("schema version {found} does not match {expected}")]
    SchemaMismatch { found: u16, expected: u16 },
}

pub fn encode_entry(
    entry: &EncodingCacheEntry,
    compression: &CompressionConfig,
) -> Result<Vec<u8>, CodecError> {
    let encoded = encode_to_vec(entry, standard()).map_err(|e| CodecError::Bincode(e.to_string()))?;
    let mut out = Vec::with_capacity(encoded.len() + 1);
    match compression.codec {
        CompressionCodec::None => {
            out.push(TAG_NONE);
            out.extend_from_slice(&encoded);
        }
        CompressionCodec::Zstd => {
            out.push(TAG_ZSTD);
            let compressed = encode_all(encoded.as_slice(), compression.level)
                .map_err(|e| CodecError::Compress(e.to_string()))?;
            out.extend_from_slice(&compressed);
        }
    }
    Ok(out)
}

pub fn decode_entry(data: &[u8]) -> Result<EncodingCacheEntry, CodecError> {
    let (&tag, body) = data.split_first().ok_or(CodecError::Empty)?;
    let raw = match tag {
        TAG_NONE => body.to_vec(),
        TAG_ZSTD => decode_all(body).map_err(|e| CodecError::Decompress(e.to_string()))?,
        other => return Err(CodecError::UnknownTag(other)),
    };
    let (entry, _): (EncodingCacheEntry, usize) =
        decode_from_slice(&raw, standard()).map_err(|e| CodecError::Bincode(e.to_string()))?;
    if entry.schema_version != CACHE_SCHEMA_VERSION {
        return Err(CodecError::SchemaMismatch {
            found: entry.schema_version,
            expected: CACHE_SCHEMA_VERSION,
        });
    }
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> EncodingCacheEntry {
        EncodingCacheEntry::new(
            "abc_team.jpg",
            "face-stub-v1",
            vec![vec![0.25, -0.5, 1.0], vec![0.0, 0.125, -0.75]],
        )
    }

    #[test]
    fn both_codecs_preserve_vectors_exactly() {
        for codec in [CompressionCodec::None, CompressionCodec::Zstd] {
            let cfg = CompressionConfig::default().with_codec(codec);
            let blob = encode_entry(&entry(), &cfg).unwrap();
            let back = decode_entry(&blob).unwrap();
            assert_eq!(back, entry_with_time(back.computed_at_ms));
        }
    }

    fn entry_with_time(ms: i64) -> EncodingCacheEntry {
        EncodingCacheEntry {
            computed_at_ms: ms,
            ..entry()
        }
    }

    #[test]
    fn empty_encoding_list_survives() {
        let e = EncodingCacheEntry::new("noface.png", "m", Vec::new());
        let blob = encode_entry(&e, &CompressionConfig::default()).unwrap();
        assert_eq!(decode_entry(&blob).unwrap().encodings, Vec::<Vec<f32>>::new());
    }

    #[test]
    fn decode_is_independent_of_current_config() {
        let blob = encode_entry(
            &entry(),
            &CompressionConfig::new(CompressionCodec::None, 0),
        )
        .unwrap();
        assert_eq!(blob[0], TAG_NONE);
        assert!(decode_entry(&blob).is_ok());
    }

    #[test]
    fn corrupt_blobs_are_rejected() {
        assert_eq!(decode_entry(&[]), Err(CodecError::Empty));
        assert_eq!(decode_entry(&[9, 1, 2]), Err(CodecError::UnknownTag(9)));
        assert!(matches!(
            decode_entry(&[TAG_ZSTD, 1, 2, 3]),
            Err(CodecError::Decompress(_))
        ));
        assert!(matches!(
            decode_entry(&[TAG_NONE, 0xff]),
            Err(CodecError::Bincode(_))
        ));
    }

    #[test]
    fn schema_mismatch_is_rejected() {
        let mut e = entry();
        e.schema_version = CACHE_SCHEMA_VERSION + 1;
        let blob = encode_entry(&e, &CompressionConfig::default()).unwrap();
        assert!(matches!(
            decode_entry(&blob),
            Err(CodecError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn compression_config_from_json() {
        let cfg: CompressionConfig = serde_json::from_str(r#"{"codec": "none"}"#).unwrap();
        assert_eq!(cfg, CompressionConfig::new(CompressionCodec::None, 3));
    }
}
