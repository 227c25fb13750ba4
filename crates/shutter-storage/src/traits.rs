//! Durable item store abstraction
//!
//! This module defines the ItemStore trait that all store backends must implement.

use crate::StoreBackend;
use async_trait::async_trait;
use shutter_core::{ItemPatch, SessionKey, SessionRecord, UploadItem};
use thiserror::Error;
use uuid::Uuid;

/// Store operation errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to serialize session: {0}")]
    Serialization(String),

    #[error("Stored session {key} is corrupt: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("Session of {size} bytes exceeds the {max} byte limit")]
    TooLarge { size: u64, max: u64 },

    #[error("Store backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Durable item store trait
///
/// Keeps a serialized mirror of each session's items so progress survives a
/// crash or reload. The pipeline treats every write as best-effort: a failed
/// write is logged by the caller and never fails an upload.
///
/// Reads are self-healing. `get_session` never reports corrupt or oversized
/// data as an error; the offending session is cleared and `Ok(None)` returned.
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Replace the whole session with `items`.
    async fn save_session(&self, key: &SessionKey, items: &[UploadItem]) -> StoreResult<()>;

    /// Load a session, or `None` on a miss or after self-healing.
    async fn get_session(&self, key: &SessionKey) -> StoreResult<Option<SessionRecord>>;

    /// Apply `patch` to one item of the session.
    ///
    /// Returns `false` when the session or item does not exist; nothing is
    /// written in that case.
    async fn update_item(&self, key: &SessionKey, id: Uuid, patch: &ItemPatch)
        -> StoreResult<bool>;

    /// Drop one item from the session. Missing items are ignored.
    async fn remove_item(&self, key: &SessionKey, id: Uuid) -> StoreResult<()>;

    /// Remove the session entirely. Clearing a missing session is not an error.
    async fn clear_session(&self, key: &SessionKey) -> StoreResult<()>;

    /// Remove fully terminal sessions last written more than `max_age_hours`
    /// ago, plus any undecodable leftovers. Returns how many were removed.
    async fn compact_old_sessions(&self, max_age_hours: u64) -> StoreResult<usize>;

    /// Get the store backend type
    fn backend_type(&self) -> StoreBackend;
}
