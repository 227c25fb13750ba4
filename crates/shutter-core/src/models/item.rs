use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::FailureKind;
use crate::models::RemoteObject;

/// Lifecycle state of an [`UploadItem`].
///
/// ```text
/// pending      -> compressing | signing | deleted | paused
/// compressing  -> pending | signing | deleted | paused
/// signing      -> uploading | error | deleted | paused
/// uploading    -> success | error | deleted | paused
/// error        -> signing | uploading            (manual retry)
/// paused       -> pending | deleted              (resume / removal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Pending,
    Compressing,
    Signing,
    Uploading,
    Success,
    Error,
    Deleted,
    Paused,
}

impl UploadStatus {
    /// `success`, `error` and `deleted` end an item's run. `error` can still be
    /// re-entered through an explicit manual retry.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            UploadStatus::Success | UploadStatus::Error | UploadStatus::Deleted
        )
    }

    /// States in which work for the item is queued or in flight.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            UploadStatus::Pending
                | UploadStatus::Compressing
                | UploadStatus::Signing
                | UploadStatus::Uploading
        )
    }

    pub fn can_transition_to(self, next: UploadStatus) -> bool {
        use UploadStatus::*;
        match (self, next) {
            (Pending, Compressing | Signing | Deleted | Paused) => true,
            (Compressing, Pending | Signing | Deleted | Paused) => true,
            (Signing, Uploading | Error | Deleted | Paused) => true,
            (Uploading, Success | Error | Deleted | Paused) => true,
            (Error, Signing | Uploading) => true,
            (Paused, Pending | Deleted) => true,
            _ => false,
        }
    }

    /// How far along the happy path a status is. Used to compare durable
    /// state with in-memory state after a simulated crash.
    pub fn advancement(self) -> u8 {
        match self {
            UploadStatus::Pending | UploadStatus::Paused => 0,
            UploadStatus::Compressing => 1,
            UploadStatus::Signing => 2,
            UploadStatus::Uploading => 3,
            UploadStatus::Success | UploadStatus::Error | UploadStatus::Deleted => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UploadStatus::Pending => "pending",
            UploadStatus::Compressing => "compressing",
            UploadStatus::Signing => "signing",
            UploadStatus::Uploading => "uploading",
            UploadStatus::Success => "success",
            UploadStatus::Error => "error",
            UploadStatus::Deleted => "deleted",
            UploadStatus::Paused => "paused",
        }
    }
}

impl Display for UploadStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for UploadStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(UploadStatus::Pending),
            "compressing" => Ok(UploadStatus::Compressing),
            "signing" => Ok(UploadStatus::Signing),
            "uploading" => Ok(UploadStatus::Uploading),
            "success" => Ok(UploadStatus::Success),
            "error" => Ok(UploadStatus::Error),
            "deleted" => Ok(UploadStatus::Deleted),
            "paused" => Ok(UploadStatus::Paused),
            _ => Err(anyhow::anyhow!("Invalid upload status: {}", s)),
        }
    }
}

/// One file's journey through the pipeline.
///
/// The orchestrator is the only writer; the durable store keeps a serialized
/// mirror and UI consumers receive cloned snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadItem {
    pub id: Uuid,
    pub file_name: String,
    pub content_type: String,
    pub source_size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compressed_size: Option<u64>,
    pub status: UploadStatus,
    /// Percentage in `0..=100`. Reset to 0 on every status change.
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_object_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<FailureKind>,
    /// Tiny inlined thumbnail (`data:` URL) so a reloaded session can still be
    /// rendered without the original bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_fingerprint: Option<String>,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UploadItem {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, size: u64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            file_name: file_name.into(),
            content_type: content_type.into(),
            source_size: size,
            compressed_size: None,
            status: UploadStatus::Pending,
            progress: 0,
            final_url: None,
            remote_object_id: None,
            error: None,
            error_kind: None,
            preview_fingerprint: None,
            retry_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Identifier of the remote object this item is written to.
    pub fn object_id(&self) -> String {
        self.id.simple().to_string()
    }

    /// Remote reference of a finalized item.
    pub fn remote(&self) -> Option<RemoteObject> {
        match (&self.final_url, &self.remote_object_id) {
            (Some(url), Some(object_id)) if self.status == UploadStatus::Success => {
                Some(RemoteObject {
                    url: url.clone(),
                    object_id: object_id.clone(),
                })
            }
            _ => None,
        }
    }

    /// Apply a patch in place.
    ///
    /// Keeps `final_url`/`remote_object_id` populated only while the status is
    /// `success`, resets progress on status changes and keeps progress
    /// monotonic within a status.
    pub fn apply(&mut self, patch: &ItemPatch) {
        let status_changed = patch.status.is_some_and(|s| s != self.status);

        if let Some(status) = patch.status {
            self.status = status;
        }

        if status_changed {
            self.progress = 0;
        }
        if let Some(progress) = patch.progress {
            let progress = progress.min(100);
            self.progress = if status_changed {
                progress
            } else {
                self.progress.max(progress)
            };
        }

        if let Some(size) = patch.compressed_size {
            self.compressed_size = Some(size);
        }
        if let Some(count) = patch.retry_count {
            self.retry_count = count;
        }

        if self.status == UploadStatus::Success {
            if let Some(remote) = &patch.remote {
                self.final_url = Some(remote.url.clone());
                self.remote_object_id = Some(remote.object_id.clone());
            }
            self.progress = 100;
        } else {
            self.final_url = None;
            self.remote_object_id = None;
        }

        if let Some((kind, message)) = &patch.failure {
            self.error_kind = Some(*kind);
            self.error = Some(message.clone());
        } else if status_changed
            && !matches!(self.status, UploadStatus::Error | UploadStatus::Deleted)
        {
            self.error_kind = None;
            self.error = None;
        }

        self.updated_at = Utc::now();
    }
}

/// Partial update of an [`UploadItem`], persisted as-is by the durable store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<UploadStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compressed_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<RemoteObject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<(FailureKind, String)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
}

impl ItemPatch {
    pub fn status(status: UploadStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn progress(progress: u8) -> Self {
        Self {
            progress: Some(progress),
            ..Default::default()
        }
    }

    pub fn with_compressed_size(mut self, size: u64) -> Self {
        self.compressed_size = Some(size);
        self
    }

    pub fn with_remote(mut self, remote: RemoteObject) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_failure(mut self, kind: FailureKind, message: impl Into<String>) -> Self {
        self.failure = Some((kind, message.into()));
        self
    }

    pub fn with_retry_count(mut self, count: u32) -> Self {
        self.retry_count = Some(count);
        self
    }
}
