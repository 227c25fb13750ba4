//! Error types module
//!
//! Per-item failures are recorded on the item as a [`FailureKind`] plus a
//! message; only commit failures and store/configuration problems surface as
//! a batch-level [`PipelineError`].

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use uuid::Uuid;

use crate::models::UploadStatus;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Expected outcomes such as user cancellation or validation rejects
    Debug,
    /// Recoverable or per-item failures
    Warn,
    /// Failures that affect the whole batch
    Error,
}

/// Errors self-describe how they should be treated by callers.
pub trait ErrorMetadata {
    /// Machine-readable error code (e.g., "TRANSFER_TIMEOUT")
    fn error_code(&self) -> &'static str;

    /// Whether the failing call may be attempted again automatically
    fn is_retryable(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;

    /// Whether the error should be surfaced to the user (e.g. as a toast)
    fn is_user_visible(&self) -> bool {
        true
    }
}

/// Failure taxonomy recorded on items and reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    Validation,
    CompressionFailure,
    CredentialFailure,
    TransferNetwork,
    TransferTimeout,
    TransferServer,
    TransferClient,
    TransferAborted,
    CommitFailure,
    StorageCorruption,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Validation => "validation",
            FailureKind::CompressionFailure => "compression-failure",
            FailureKind::CredentialFailure => "credential-failure",
            FailureKind::TransferNetwork => "transfer-network",
            FailureKind::TransferTimeout => "transfer-timeout",
            FailureKind::TransferServer => "transfer-server",
            FailureKind::TransferClient => "transfer-client",
            FailureKind::TransferAborted => "transfer-aborted",
            FailureKind::CommitFailure => "commit-failure",
            FailureKind::StorageCorruption => "storage-corruption",
        }
    }
}

impl Display for FailureKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// Categorized failure of a network call (credential fetch, transfer, commit).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Client error ({status}): {message}")]
    Client { status: u16, message: String },

    #[error("Transfer aborted")]
    Aborted,
}

impl TransferError {
    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if status >= 500 {
            TransferError::Server { status, message }
        } else {
            TransferError::Client { status, message }
        }
    }

    pub fn failure_kind(&self) -> FailureKind {
        match self {
            TransferError::Network(_) => FailureKind::TransferNetwork,
            TransferError::Timeout => FailureKind::TransferTimeout,
            TransferError::Server { .. } => FailureKind::TransferServer,
            TransferError::Client { .. } => FailureKind::TransferClient,
            TransferError::Aborted => FailureKind::TransferAborted,
        }
    }
}

impl ErrorMetadata for TransferError {
    fn error_code(&self) -> &'static str {
        match self {
            TransferError::Network(_) => "TRANSFER_NETWORK",
            TransferError::Timeout => "TRANSFER_TIMEOUT",
            TransferError::Server { .. } => "TRANSFER_SERVER",
            TransferError::Client { .. } => "TRANSFER_CLIENT",
            TransferError::Aborted => "TRANSFER_ABORTED",
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransferError::Network(_) | TransferError::Timeout | TransferError::Server { .. }
        )
    }

    fn log_level(&self) -> LogLevel {
        match self {
            TransferError::Aborted => LogLevel::Debug,
            _ => LogLevel::Warn,
        }
    }

    fn is_user_visible(&self) -> bool {
        !matches!(self, TransferError::Aborted)
    }
}

/// Failure obtaining a signed upload credential.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    #[error("Not authorized to upload into session {0}")]
    Unauthorized(String),

    #[error("No credential returned for object {0}")]
    Missing(String),

    #[error("Credential request failed: {0}")]
    Transport(#[from] TransferError),
}

impl ErrorMetadata for CredentialError {
    fn error_code(&self) -> &'static str {
        match self {
            CredentialError::Unauthorized(_) => "CREDENTIAL_UNAUTHORIZED",
            CredentialError::Missing(_) => "CREDENTIAL_MISSING",
            CredentialError::Transport(_) => "CREDENTIAL_TRANSPORT",
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            CredentialError::Transport(inner) => inner.is_retryable(),
            _ => false,
        }
    }

    fn log_level(&self) -> LogLevel {
        LogLevel::Warn
    }

    fn is_user_visible(&self) -> bool {
        !matches!(self, CredentialError::Transport(TransferError::Aborted))
    }
}

/// Failure of the batch attach call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommitError {
    #[error("Not authorized to attach to record {0}")]
    Unauthorized(String),

    #[error("Commit rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Commit was not acknowledged by the backend")]
    NotAcknowledged,

    #[error("Commit request failed: {0}")]
    Transport(#[from] TransferError),
}

impl ErrorMetadata for CommitError {
    fn error_code(&self) -> &'static str {
        match self {
            CommitError::Unauthorized(_) => "COMMIT_UNAUTHORIZED",
            CommitError::Rejected { .. } => "COMMIT_REJECTED",
            CommitError::NotAcknowledged => "COMMIT_NOT_ACKNOWLEDGED",
            CommitError::Transport(_) => "COMMIT_TRANSPORT",
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            CommitError::Transport(inner) => inner.is_retryable(),
            CommitError::Rejected { status, .. } => *status >= 500,
            _ => false,
        }
    }

    fn log_level(&self) -> LogLevel {
        LogLevel::Error
    }
}

/// Batch-level errors returned by the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Commit failed: {0}")]
    Commit(#[from] CommitError),

    #[error("Nothing to commit: no item in the session has finished uploading")]
    NothingToCommit,

    #[error("Unknown upload item: {0}")]
    UnknownItem(Uuid),

    #[error("Invalid transition for item {id}: {from} -> {to}")]
    InvalidTransition {
        id: Uuid,
        from: UploadStatus,
        to: UploadStatus,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ErrorMetadata for PipelineError {
    fn error_code(&self) -> &'static str {
        match self {
            PipelineError::Commit(_) => "COMMIT_FAILURE",
            PipelineError::NothingToCommit => "NOTHING_TO_COMMIT",
            PipelineError::UnknownItem(_) => "UNKNOWN_ITEM",
            PipelineError::InvalidTransition { .. } => "INVALID_TRANSITION",
            PipelineError::Storage(_) => "STORAGE_ERROR",
            PipelineError::Config(_) => "CONFIG_ERROR",
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            PipelineError::Commit(inner) => inner.is_retryable(),
            _ => false,
        }
    }

    fn log_level(&self) -> LogLevel {
        match self {
            PipelineError::UnknownItem(_) | PipelineError::InvalidTransition { .. } => {
                LogLevel::Debug
            }
            _ => LogLevel::Error,
        }
    }
}
