use serde::Serialize;

use crate::{EnrichmentResult, FailureKind, Outcome};

/// Outcome counts for a finished batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub ok: usize,
    pub partial: usize,
    pub failed: usize,
    /// Included in `failed`.
    pub cancelled: usize,
}

impl BatchSummary {
    pub fn from_results(results: &[EnrichmentResult]) -> Self {
        let mut summary = Self {
            total: results.len(),
            ..Self::default()
        };
        for result in results {
            match result.outcome {
                Outcome::Ok => summary.ok += 1,
                Outcome::PartialFailure => summary.partial += 1,
                Outcome::Failure => {
                    summary.failed += 1;
                    if result.error_kind == Some(FailureKind::Cancelled) {
                        summary.cancelled += 1;
                    }
                }
            }
        }
        summary
    }

    /// Share of results that failed outright; `0.0` for an empty batch.
    pub fn failure_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.failed as f64 / self.total as f64
    }

    pub fn exceeds(&self, threshold: f64) -> bool {
        self.failure_rate() > threshold
    }
}
