use crate::codec;
use crate::traits::{ItemStore, StoreError, StoreResult};
use crate::StoreBackend;
use async_trait::async_trait;
use shutter_core::constants::DEFAULT_MAX_SESSION_BYTES;
use shutter_core::{ItemPatch, SessionKey, SessionRecord, UploadItem, UploadStatus};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// In-process durable item store
///
/// Holds the same serialized payloads a file-backed store would, so corruption
/// and size limits behave identically. Sessions live as long as the store.
/// Used by the CLI's `memory` backend and throughout the pipeline tests.
#[derive(Clone)]
pub struct MemoryItemStore {
    sessions: Arc<Mutex<HashMap<String, String>>>,
    journal: Arc<Mutex<Vec<(Uuid, UploadStatus)>>>,
    fail_writes: Arc<AtomicBool>,
    max_session_bytes: u64,
}

impl Default for MemoryItemStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SESSION_BYTES)
    }
}

impl MemoryItemStore {
    pub fn new(max_session_bytes: u64) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            journal: Arc::new(Mutex::new(Vec::new())),
            fail_writes: Arc::new(AtomicBool::new(false)),
            max_session_bytes,
        }
    }

    /// Store a raw payload verbatim, bypassing encoding.
    pub async fn insert_raw(&self, key: &SessionKey, raw: impl Into<String>) {
        self.sessions
            .lock()
            .await
            .insert(key.as_str().to_string(), raw.into());
    }

    pub async fn raw(&self, key: &SessionKey) -> Option<String> {
        self.sessions.lock().await.get(key.as_str()).cloned()
    }

    /// Make every subsequent write fail with a backend error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Every status persisted through `update_item`, in write order.
    pub async fn status_journal(&self) -> Vec<(Uuid, UploadStatus)> {
        self.journal.lock().await.clone()
    }

    fn check_writable(&self) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::BackendError(
                "memory store is rejecting writes".to_string(),
            ));
        }
        Ok(())
    }

    fn load(
        &self,
        sessions: &mut HashMap<String, String>,
        key: &SessionKey,
    ) -> Option<SessionRecord> {
        let raw = sessions.get(key.as_str())?;
        match codec::decode(key, raw, self.max_session_bytes) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(session = %key, error = %e, "Clearing unreadable session");
                sessions.remove(key.as_str());
                None
            }
        }
    }
}

#[async_trait]
impl ItemStore for MemoryItemStore {
    async fn save_session(&self, key: &SessionKey, items: &[UploadItem]) -> StoreResult<()> {
        self.check_writable()?;
        let raw = codec::encode(&codec::new_record(key, items), self.max_session_bytes)?;
        self.sessions
            .lock()
            .await
            .insert(key.as_str().to_string(), raw);
        Ok(())
    }

    async fn get_session(&self, key: &SessionKey) -> StoreResult<Option<SessionRecord>> {
        let mut sessions = self.sessions.lock().await;
        Ok(self.load(&mut sessions, key))
    }

    async fn update_item(
        &self,
        key: &SessionKey,
        id: Uuid,
        patch: &ItemPatch,
    ) -> StoreResult<bool> {
        self.check_writable()?;
        let mut sessions = self.sessions.lock().await;
        let Some(mut record) = self.load(&mut sessions, key) else {
            return Ok(false);
        };
        if !codec::patch_item(&mut record, id, patch) {
            return Ok(false);
        }

        let raw = codec::encode(&record, self.max_session_bytes)?;
        sessions.insert(key.as_str().to_string(), raw);

        if let Some(status) = patch.status {
            self.journal.lock().await.push((id, status));
        }
        Ok(true)
    }

    async fn remove_item(&self, key: &SessionKey, id: Uuid) -> StoreResult<()> {
        self.check_writable()?;
        let mut sessions = self.sessions.lock().await;
        let Some(mut record) = self.load(&mut sessions, key) else {
            return Ok(());
        };
        record.items.retain(|item| item.id != id);
        let raw = codec::encode(&record, self.max_session_bytes)?;
        sessions.insert(key.as_str().to_string(), raw);
        Ok(())
    }

    async fn clear_session(&self, key: &SessionKey) -> StoreResult<()> {
        self.check_writable()?;
        self.sessions.lock().await.remove(key.as_str());
        Ok(())
    }

    async fn compact_old_sessions(&self, max_age_hours: u64) -> StoreResult<usize> {
        let now = chrono::Utc::now();
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();

        sessions.retain(|raw_key, raw| {
            let key = SessionKey::from_raw(raw_key.clone());
            match codec::decode(&key, raw, self.max_session_bytes) {
                Ok(record) => !record.is_compactable(max_age_hours, now),
                Err(_) => false,
            }
        });

        Ok(before - sessions.len())
    }

    fn backend_type(&self) -> StoreBackend {
        StoreBackend::Memory
    }
}
