use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::time::Instant;

use crate::{EncodingCache, EnsureStatus};

/// Summary of a reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub total: usize,
    pub cached: usize,
    pub computed: usize,
    pub failed: usize,
}

impl EncodingCache {
    /// Compute entries for every photo in `photos` that lacks one.
    ///
    /// Runs at most `reconcile_concurrency` photos at a time. Per-photo
    /// failures are logged and counted; they never stop the pass.
    pub async fn reconcile<S>(&self, photos: &[S]) -> ReconcileReport
    where
        S: AsRef<str> + Sync,
    {
        let started = Instant::now();
        let concurrency = self.config().reconcile_concurrency.max(1);

        let report = stream::iter(photos.iter().map(S::as_ref))
            .map(|photo| async move { (photo, self.ensure(photo, photo, false).await) })
            .buffer_unordered(concurrency)
            .fold(
                ReconcileReport {
                    total: photos.len(),
                    ..Default::default()
                },
                |mut report, (photo, result)| async move {
                    match result {
                        Ok(EnsureStatus::Cached) => report.cached += 1,
                        Ok(EnsureStatus::Computed { .. }) => report.computed += 1,
                        Err(e) => {
                            report.failed += 1;
                            tracing::warn!(photo, error = %e, "reconcile: could not build cache entry");
                        }
                    }
                    report
                },
            )
            .await;

        tracing::info!(
            total = report.total,
            cached = report.cached,
            computed = report.computed,
            failed = report.failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "cache reconciliation finished"
        );
        report
    }
}
