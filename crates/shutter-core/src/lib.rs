//! Shutter Core Library
//!
//! This crate provides the domain model, error taxonomy, configuration and the
//! remote-collaborator traits shared by every shutter component.

pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod remote;

// Re-export commonly used types
pub use config::{StoreBackend, UploadConfig};
pub use error::{
    CommitError, CredentialError, ErrorMetadata, FailureKind, LogLevel, PipelineError,
    TransferError,
};
pub use models::{
    ConnectionClass, Credential, ItemPatch, NetworkHints, NetworkProfile, RemoteObject,
    SessionKey, SessionRecord, UploadItem, UploadStatus,
};
pub use remote::{
    CommitEntry, CommitReceipt, CredentialSource, ObjectUploader, ProgressFn, RecordCommitter,
    TransferRequest,
};
