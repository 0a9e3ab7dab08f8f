use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tolerance applied when the caller does not supply one.
pub const DEFAULT_TOLERANCE: f32 = 0.50;

/// Search tuning knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Photos checked at once. `None` uses the available parallelism.
    pub concurrency: Option<usize>,
    pub default_tolerance: f32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            concurrency: None,
            default_tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl SearchConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    /// Effective number of in-flight photo checks, never zero.
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(4)
            })
            .max(1)
    }
}

/// A photo containing a face within tolerance of the reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub filename: String,
    /// Display URL resolved at match time.
    pub url: String,
    /// Distance of the closest face.
    pub distance: f32,
    /// Detection-order index of the closest face.
    pub face_index: usize,
}

/// Aggregated result of one search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    /// Unordered.
    pub matches: Vec<MatchResult>,
    /// Always the number of photos submitted.
    pub checked: usize,
    /// Checks that errored and were counted as no-match.
    pub failed: usize,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MatchError {
    #[error("tolerance must be a finite, non-negative number (got {0})")]
    InvalidTolerance(f32),
    #[error("reference encoding is empty")]
    EmptyReference,
}

/// Reject NaN, infinities and negative tolerances.
pub fn validate_tolerance(tolerance: f32) -> Result<f32, MatchError> {
    if tolerance.is_finite() && tolerance >= 0.0 {
        Ok(tolerance)
    } else {
        Err(MatchError::InvalidTolerance(tolerance))
    }
}
