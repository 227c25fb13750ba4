//! Batch commit
//!
//! Once every item has settled, the finalized references are attached to the
//! owning record in one idempotent call. Committed items graduate out of the
//! durable session; items that are still paused or failed stay in it, and
//! the session is cleared once nothing is left.

use shutter_core::constants::COMMIT_KIND_IMAGE;
use shutter_core::{CommitEntry, CommitReceipt, PipelineError, UploadItem, UploadStatus};
use std::collections::BTreeSet;
use tokio_util::sync::CancellationToken;

use crate::orchestrator::{SourceFile, SubmitReport, UploadPipeline};
use crate::summary::BatchSummary;

/// Everything a caller needs after [`UploadPipeline::upload_all`].
#[derive(Debug)]
pub struct BatchResult {
    pub report: SubmitReport,
    pub summary: BatchSummary,
    /// `None` when nothing succeeded, so nothing was committed.
    pub receipt: Option<CommitReceipt>,
    pub urls: Vec<String>,
}

/// The last acknowledged commit of this session.
pub(crate) struct CommittedBatch {
    record_id: String,
    object_ids: BTreeSet<String>,
    receipt: CommitReceipt,
}

impl CommittedBatch {
    /// Whether attaching `object_ids` to `record_id` would add nothing.
    fn covers(&self, record_id: &str, object_ids: &BTreeSet<String>) -> bool {
        self.record_id == record_id && object_ids.is_subset(&self.object_ids)
    }

    /// Committed successes and removed items leave the session.
    pub(crate) fn graduates(&self, item: &UploadItem) -> bool {
        match item.status {
            UploadStatus::Deleted => true,
            UploadStatus::Success => item
                .remote()
                .is_some_and(|remote| self.object_ids.contains(&remote.object_id)),
            _ => false,
        }
    }
}

impl UploadPipeline {
    /// Attach every successful item to `record_id`.
    ///
    /// Waits for in-flight items first. Calling it again for the same record
    /// returns the previous receipt without a backend call, unless more items
    /// have succeeded since. On failure the durable session is kept so the
    /// commit can be retried.
    #[tracing::instrument(skip(self), fields(session = %self.key))]
    pub async fn commit(&self, record_id: &str) -> Result<CommitReceipt, PipelineError> {
        let _commit = self.commit_lock.lock().await;
        self.wait_until_idle().await;

        let entries: Vec<CommitEntry> = {
            let state = self.shared.lock();
            let mut entries: Vec<CommitEntry> = state
                .items
                .iter()
                .filter(|item| item.status == UploadStatus::Success)
                .filter_map(|item| item.remote())
                .map(|remote| CommitEntry {
                    url: remote.url,
                    object_id: remote.object_id,
                    kind: COMMIT_KIND_IMAGE.to_string(),
                })
                .collect();
            entries.sort_by(|a, b| a.object_id.cmp(&b.object_id));

            let object_ids: BTreeSet<String> =
                entries.iter().map(|entry| entry.object_id.clone()).collect();
            if let Some(batch) = state
                .committed
                .as_ref()
                .filter(|batch| batch.covers(record_id, &object_ids))
            {
                tracing::debug!(record_id, "Batch already committed");
                return Ok(batch.receipt.clone());
            }
            entries
        };

        if entries.is_empty() {
            return Err(PipelineError::NothingToCommit);
        }

        let never = CancellationToken::new();
        let committer = &self.deps.committer;
        let entries_ref = entries.as_slice();
        let result = self
            .retry
            .run_simple(&never, move |_| committer.attach(record_id, entries_ref))
            .await;

        match result {
            Ok(receipt) => {
                self.graduate(CommittedBatch {
                    record_id: record_id.to_string(),
                    object_ids: entries.iter().map(|entry| entry.object_id.clone()).collect(),
                    receipt: receipt.clone(),
                })
                .await;
                tracing::info!(
                    record_id,
                    attached = receipt.attached,
                    entries = entries.len(),
                    "Batch committed"
                );
                Ok(receipt)
            }
            Err(e) => {
                tracing::error!(record_id, error = %e, entries = entries.len(), "Batch commit failed");
                Err(PipelineError::Commit(e))
            }
        }
    }

    /// Rewrite the durable session without the committed items, or clear it
    /// when nothing else is left.
    async fn graduate(&self, batch: CommittedBatch) {
        let _gate = self.write_gate.lock().await;
        let remaining: Vec<UploadItem> = {
            let mut state = self.shared.lock();
            let remaining = state
                .items
                .iter()
                .filter(|item| !batch.graduates(item))
                .cloned()
                .collect();
            state.committed = Some(batch);
            remaining
        };

        let persisted = if remaining.is_empty() {
            self.deps.store.clear_session(&self.key).await
        } else {
            self.deps.store.save_session(&self.key, &remaining).await
        };
        if let Err(e) = persisted {
            tracing::warn!(
                session = %self.key,
                remaining = remaining.len(),
                error = %e,
                "Failed to update committed session"
            );
        }
    }

    /// Submit `files`, drive them to completion and commit whatever
    /// succeeded to `record_id`.
    pub async fn upload_all(
        &self,
        files: Vec<SourceFile>,
        record_id: &str,
    ) -> Result<BatchResult, PipelineError> {
        let report = self.submit(files).await;
        let summary = self.run().await;

        let receipt = if summary.succeeded > 0 {
            Some(self.commit(record_id).await?)
        } else {
            tracing::warn!(%summary, "No item succeeded, skipping commit");
            None
        };

        Ok(BatchResult {
            report,
            summary,
            receipt,
            urls: self.finalized_urls(),
        })
    }
}
