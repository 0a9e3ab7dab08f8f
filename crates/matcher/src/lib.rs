//! # FaceFind Matcher (`matcher`)
//!
//! ## Purpose
//!
//! `matcher` answers "which photos contain this face?". It sits on top of
//! the encoding cache (`cache`) and the blob store (`store`): given one
//! reference encoding and a set of photo names, it reads (or lazily
//! computes) each photo's face encodings, compares them against the
//! reference under a distance tolerance and aggregates the hits.
//!
//! ## Core Types
//!
//! - [`distance`]: pure functions over encodings ([`face_distance`],
//!   [`best_match`], [`matches`]). Raw Euclidean distance, no calibration.
//! - [`SearchConfig`]: fan-out width and the default tolerance.
//! - [`PhotoSearch`]: the orchestrator. One bounded stream of per-photo
//!   checks; each check yields `Result<Option<MatchResult>, CheckError>`.
//! - [`SearchOutcome`]: unordered matches plus `checked` and `failed` counts.
//!
//! ## Guarantees
//!
//! - `checked` always equals the number of photos submitted.
//! - A failing photo check is logged and counted, never fatal.
//! - No task is spawned per photo. Dropping the search future cancels every
//!   in-flight check.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use cache::{CacheConfig, EncodingCache};
//! use embedding::{build_embedder, EmbeddingConfig};
//! use matcher::{PhotoSearch, SearchConfig, DEFAULT_TOLERANCE};
//! use preprocess::PreprocessConfig;
//! use store::{BlobStore, StoreConfig};
//!
//! # async fn run(reference: Vec<f32>) -> Result<(), Box<dyn std::error::Error>> {
//! let store = BlobStore::new(StoreConfig::new())?;
//! let embedder = build_embedder(&EmbeddingConfig::default())?;
//! let cache = EncodingCache::new(store, embedder, PreprocessConfig::default(), CacheConfig::default());
//! let search = PhotoSearch::new(cache, SearchConfig::default());
//!
//! let outcome = search
//!     .search(&reference, DEFAULT_TOLERANCE, &["group-1.jpg", "group-2.jpg"])
//!     .await?;
//! for hit in &outcome.matches {
//!     println!("{} at {:.3}", hit.url, hit.distance);
//! }
//! # Ok(())
//! # }
//! ```

pub mod distance;
pub mod engine;
pub mod types;

pub use crate::distance::{best_match, face_distance, matches};
pub use crate::engine::{CheckError, PhotoSearch};
pub use crate::types::{
    validate_tolerance, MatchError, MatchResult, SearchConfig, SearchOutcome, DEFAULT_TOLERANCE,
};
