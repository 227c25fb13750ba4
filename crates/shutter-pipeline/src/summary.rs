//! Batch summary reported to callers.

use serde::Serialize;
use shutter_core::{UploadItem, UploadStatus};
use std::fmt::{Display, Formatter, Result as FmtResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum BatchOutcome {
    FullySucceeded,
    PartiallySucceeded { succeeded: usize, total: usize },
    Failed,
}

/// Counts over one session. Deleted items are reported but do not count
/// towards `total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub deleted: usize,
    /// Items still pending, paused or in flight.
    pub unfinished: usize,
}

impl BatchSummary {
    pub fn from_items(items: &[UploadItem]) -> Self {
        let mut summary = BatchSummary::default();
        for item in items {
            match item.status {
                UploadStatus::Deleted => {
                    summary.deleted += 1;
                    continue;
                }
                UploadStatus::Success => summary.succeeded += 1,
                UploadStatus::Error => summary.failed += 1,
                _ => summary.unfinished += 1,
            }
            summary.total += 1;
        }
        summary
    }

    pub fn outcome(&self) -> BatchOutcome {
        if self.total > 0 && self.succeeded == self.total {
            BatchOutcome::FullySucceeded
        } else if self.succeeded > 0 {
            BatchOutcome::PartiallySucceeded {
                succeeded: self.succeeded,
                total: self.total,
            }
        } else {
            BatchOutcome::Failed
        }
    }
}

impl Display for BatchSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{} of {} uploaded", self.succeeded, self.total)
    }
}
