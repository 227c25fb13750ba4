//! Commit endpoint client
//!
//! `POST {prefix}/records/{record_id}/attachments` attaches finalized remote
//! references to the owning record in one call. Requests carry an
//! `Idempotency-Key` derived from the record and the attached object ids, so
//! a retried commit is recognisable server-side.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use shutter_core::{CommitEntry, CommitError, CommitReceipt, RecordCommitter, TransferError};

use crate::{error_for_status, read_json, send, ApiClient};

pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// Stable key for attaching `entries` to `record_id`; independent of entry
/// order.
pub fn idempotency_key(record_id: &str, entries: &[CommitEntry]) -> String {
    let mut object_ids: Vec<&str> = entries.iter().map(|e| e.object_id.as_str()).collect();
    object_ids.sort_unstable();
    object_ids.dedup();

    let mut hasher = Sha256::new();
    hasher.update(record_id.as_bytes());
    for object_id in object_ids {
        hasher.update(b"\n");
        hasher.update(object_id.as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AttachRequest<'a> {
    record_id: &'a str,
    items: &'a [CommitEntry],
}

#[derive(Deserialize)]
struct AttachResponse {
    success: bool,
    #[serde(default)]
    attached: Option<usize>,
}

#[derive(Clone, Debug)]
pub struct HttpRecordCommitter {
    client: ApiClient,
}

impl HttpRecordCommitter {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    fn map_error(record_id: &str, err: TransferError) -> CommitError {
        match err {
            TransferError::Client { status, .. } if status == 401 || status == 403 => {
                CommitError::Unauthorized(record_id.to_string())
            }
            TransferError::Client { status, message } | TransferError::Server { status, message } => {
                CommitError::Rejected { status, message }
            }
            other => CommitError::Transport(other),
        }
    }
}

#[async_trait]
impl RecordCommitter for HttpRecordCommitter {
    async fn attach(
        &self,
        record_id: &str,
        entries: &[CommitEntry],
    ) -> Result<CommitReceipt, CommitError> {
        let path = format!(
            "/records/{}/attachments",
            urlencoding::encode(record_id)
        );
        let request = self
            .client
            .post(&path)
            .header(IDEMPOTENCY_KEY_HEADER, idempotency_key(record_id, entries))
            .json(&AttachRequest {
                record_id,
                items: entries,
            });

        let response = send(request)
            .await
            .map_err(|e| Self::map_error(record_id, e))?;
        let response = error_for_status(response)
            .await
            .map_err(|e| Self::map_error(record_id, e))?;
        let body: AttachResponse = read_json(response)
            .await
            .map_err(|e| Self::map_error(record_id, e))?;

        if !body.success {
            return Err(CommitError::NotAcknowledged);
        }

        Ok(CommitReceipt {
            record_id: record_id.to_string(),
            attached: body.attached.unwrap_or(entries.len()),
            success: true,
        })
    }
}
