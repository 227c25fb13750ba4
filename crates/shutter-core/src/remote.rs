//! Remote collaborator traits
//!
//! The pipeline only talks to the outside world through these seams: the
//! credential endpoint, the object store upload endpoint and the commit
//! endpoint. `shutter-api-client` provides the HTTP implementations.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::{CommitError, CredentialError, TransferError};
use crate::models::{Credential, RemoteObject};

/// Byte-level progress callback: `(bytes_sent, total_bytes)`.
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Issues signed per-object upload credentials.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Request credentials for several objects in one call. Ids the backend
    /// does not return are simply absent from the result.
    async fn fetch_batch(
        &self,
        session_id: &str,
        object_ids: &[String],
    ) -> Result<Vec<Credential>, CredentialError>;

    /// Request a credential for a single object.
    async fn fetch_one(
        &self,
        session_id: &str,
        object_id: &str,
    ) -> Result<Credential, CredentialError>;
}

/// Binary handed to the transfer engine.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub data: Bytes,
    pub file_name: String,
    pub content_type: String,
}

/// Performs the direct upload to the remote object store.
#[async_trait]
pub trait ObjectUploader: Send + Sync {
    /// Upload `request` using `credential`.
    ///
    /// Implementations report progress through `progress`, enforce their own
    /// per-attempt timeout and return [`TransferError::Aborted`] as soon as
    /// `cancel` fires.
    async fn upload(
        &self,
        request: TransferRequest,
        credential: &Credential,
        progress: ProgressFn,
        cancel: CancellationToken,
    ) -> Result<RemoteObject, TransferError>;
}

/// One finalized reference attached to the owning record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitEntry {
    pub url: String,
    pub object_id: String,
    pub kind: String,
}

/// Backend acknowledgement of a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitReceipt {
    pub record_id: String,
    pub attached: usize,
    pub success: bool,
}

/// Attaches finalized references to the authoritative backend record.
///
/// Implementations must be idempotent: attaching the same url twice must not
/// duplicate the association.
#[async_trait]
pub trait RecordCommitter: Send + Sync {
    async fn attach(
        &self,
        record_id: &str,
        entries: &[CommitEntry],
    ) -> Result<CommitReceipt, CommitError>;
}
