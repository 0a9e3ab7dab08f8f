use std::time::Instant;

use cache::{CacheError, EncodingCache};
use futures::stream::{self, StreamExt};
use metrics::counter;
use store::{Namespace, StoreError};
use thiserror::Error;

use crate::distance::best_match;
use crate::types::{validate_tolerance, MatchError, MatchResult, SearchConfig, SearchOutcome};


/// Why a single photo could not be checked. Never escapes [`PhotoSearch::search`].
#[derive(Debug, Error)]
pub enum CheckError {
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("cache entry for {0:?} vanished right after it was computed")]
    EntryVanished(String),
}

/// Runs one reference encoding against a set of photos.
#[derive(Clone)]
pub struct PhotoSearch {
    cache: EncodingCache,
    cfg: SearchConfig,
}

impl PhotoSearch {
    pub fn new(cache: EncodingCache, cfg: SearchConfig) -> Self {
        Self { cache, cfg }
    }

    pub fn cache(&self) -> &EncodingCache {
        &self.cache
    }

    pub fn config(&self) -> &SearchConfig {
        &self.cfg
    }

    /// Check every photo against `reference` and collect the matches.
    ///
    /// At most `concurrency` checks are in flight. A check that fails is
    /// logged and counted in [`SearchOutcome::failed`]; it never aborts the
    /// search. Match order is unspecified.
    pub async fn search<S>(
        &self,
        reference: &[f32],
        tolerance: f32,
        photos: &[S],
    ) -> Result<SearchOutcome, MatchError>
    where
        S: AsRef<str> + Sync,
    {
        let tolerance = validate_tolerance(tolerance)?;
        if reference.is_empty() {
            return Err(MatchError::EmptyReference);
        }

        let started = Instant::now();
        let concurrency = self.cfg.effective_concurrency();

        let outcome = stream::iter(photos.iter().map(S::as_ref))
            .map(|photo| async move {
                (photo, self.check_photo(reference, tolerance, photo).await)
            })
            .buffer_unordered(concurrency)
            .fold(
                SearchOutcome {
                    checked: photos.len(),
                    ..Default::default()
                },
                |mut outcome, (photo, result)| async move {
                    match result {
                        Ok(Some(hit)) => outcome.matches.push(hit),
                        Ok(None) => {}
                        Err(e) => {
                            outcome.failed += 1;
                            tracing::warn!(photo, error = %e, "search: photo check failed, counted as no match");
                        }
                    }
                    outcome
                },
            )
            .await;

        counter!("facefind_search_checked_total").increment(outcome.checked as u64);
        counter!("facefind_search_failed_total").increment(outcome.failed as u64);
        counter!("facefind_search_matches_total").increment(outcome.matches.len() as u64);
        tracing::info!(
            checked = outcome.checked,
            matched = outcome.matches.len(),
            failed = outcome.failed,
            tolerance,
            concurrency,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "photo search finished"
        );
        Ok(outcome)
    }

    async fn check_photo(
        &self,
        reference: &[f32],
        tolerance: f32,
        photo: &str,
    ) -> Result<Option<MatchResult>, CheckError> {
        let encodings = match self.cache.get(photo).await? {
            Some(encodings) => encodings,
            None => {
                tracing::debug!(photo, "cache miss during search");
                self.cache.ensure(photo, photo, false).await?;
                self.cache
                    .get(photo)
                    .await?
                    .ok_or_else(|| CheckError::EntryVanished(photo.to_string()))?
            }
        };

        let Some((face_index, distance)) = best_match(reference, &encodings)
            .filter(|&(_, d)| d <= tolerance)
        else {
            return Ok(None);
        };

        let Some(info) = self.cache.store().stat(Namespace::Photos, photo).await? else {
            tracing::debug!(photo, "matched photo was deleted during search");
            return Ok(None);
        };
        Ok(Some(MatchResult {
            filename: info.key,
            url: info.url,
            distance,
            face_index,
        }))
    }
}
