use crate::codec;
use crate::keys::{session_file_name, session_key_from_file_name};
use crate::traits::{ItemStore, StoreError, StoreResult};
use crate::StoreBackend;
use async_trait::async_trait;
use shutter_core::{ItemPatch, SessionKey, SessionRecord, UploadItem};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

/// File-backed durable item store
///
/// One JSON file per session under `base_path`. Writes go to a temporary
/// file that is renamed over the target, so a crash mid-write leaves either
/// the previous or the new session on disk, never a torn one.
pub struct LocalItemStore {
    base_path: PathBuf,
    max_session_bytes: u64,
    // Serializes read-modify-write cycles across all sessions of this store.
    write_lock: Mutex<()>,
}

impl LocalItemStore {
    /// Create a new LocalItemStore instance
    ///
    /// # Arguments
    /// * `base_path` - Directory holding one file per session
    /// * `max_session_bytes` - Serialized sessions above this size are rejected on
    ///   write and cleared on read
    pub async fn new(base_path: impl Into<PathBuf>, max_session_bytes: u64) -> StoreResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StoreError::ConfigError(format!(
                "Failed to create store directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalItemStore {
            base_path,
            max_session_bytes,
            write_lock: Mutex::new(()),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn session_path(&self, key: &SessionKey) -> PathBuf {
        self.base_path.join(session_file_name(key))
    }

    async fn read_raw(&self, path: &Path) -> StoreResult<Option<String>> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Load and decode, clearing the file if it cannot be trusted.
    async fn load(&self, key: &SessionKey) -> StoreResult<Option<SessionRecord>> {
        let path = self.session_path(key);
        let Some(raw) = self.read_raw(&path).await? else {
            return Ok(None);
        };

        match codec::decode(key, &raw, self.max_session_bytes) {
            Ok(record) => Ok(Some(record)),
            Err(e) if codec::is_self_healable(&e) => {
                tracing::warn!(
                    session = %key,
                    path = %path.display(),
                    error = %e,
                    "Clearing unreadable session"
                );
                self.remove_file(&path).await?;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn write(&self, record: &SessionRecord) -> StoreResult<()> {
        let raw = codec::encode(record, self.max_session_bytes)?;
        let path = self.session_path(&record.key);
        let tmp_path = path.with_extension("json.tmp");
        let start = std::time::Instant::now();

        let mut file = fs::File::create(&tmp_path).await.map_err(|e| {
            StoreError::BackendError(format!(
                "Failed to create file {}: {}",
                tmp_path.display(),
                e
            ))
        })?;

        file.write_all(raw.as_bytes()).await.map_err(|e| {
            StoreError::BackendError(format!("Failed to write file {}: {}", tmp_path.display(), e))
        })?;

        file.sync_all().await.map_err(|e| {
            StoreError::BackendError(format!("Failed to sync file {}: {}", tmp_path.display(), e))
        })?;
        drop(file);

        fs::rename(&tmp_path, &path).await?;

        tracing::debug!(
            session = %record.key,
            items = record.items.len(),
            size_bytes = raw.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Session persisted"
        );

        Ok(())
    }

    async fn remove_file(&self, path: &Path) -> StoreResult<()> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ItemStore for LocalItemStore {
    async fn save_session(&self, key: &SessionKey, items: &[UploadItem]) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        self.write(&codec::new_record(key, items)).await
    }

    async fn get_session(&self, key: &SessionKey) -> StoreResult<Option<SessionRecord>> {
        let _guard = self.write_lock.lock().await;
        self.load(key).await
    }

    async fn update_item(
        &self,
        key: &SessionKey,
        id: Uuid,
        patch: &ItemPatch,
    ) -> StoreResult<bool> {
        let _guard = self.write_lock.lock().await;
        let Some(mut record) = self.load(key).await? else {
            tracing::debug!(session = %key, item_id = %id, "Update for missing session ignored");
            return Ok(false);
        };

        if !codec::patch_item(&mut record, id, patch) {
            tracing::debug!(session = %key, item_id = %id, "Update for missing item ignored");
            return Ok(false);
        }

        self.write(&record).await?;
        Ok(true)
    }

    async fn remove_item(&self, key: &SessionKey, id: Uuid) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let Some(mut record) = self.load(key).await? else {
            return Ok(());
        };

        let before = record.items.len();
        record.items.retain(|item| item.id != id);
        if record.items.len() != before {
            record.updated_at = chrono::Utc::now();
            self.write(&record).await?;
        }
        Ok(())
    }

    async fn clear_session(&self, key: &SessionKey) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        self.remove_file(&self.session_path(key)).await?;
        tracing::info!(session = %key, "Session cleared");
        Ok(())
    }

    async fn compact_old_sessions(&self, max_age_hours: u64) -> StoreResult<usize> {
        let _guard = self.write_lock.lock().await;
        let now = chrono::Utc::now();
        let mut removed = 0;

        let mut entries = fs::read_dir(&self.base_path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(key) = name.to_str().and_then(session_key_from_file_name) else {
                continue;
            };

            let path = entry.path();
            let Some(raw) = self.read_raw(&path).await? else {
                continue;
            };

            let drop_it = match codec::decode(&key, &raw, self.max_session_bytes) {
                Ok(record) => record.is_compactable(max_age_hours, now),
                Err(e) => codec::is_self_healable(&e),
            };

            if drop_it {
                self.remove_file(&path).await?;
                removed += 1;
                tracing::debug!(session = %key, "Compacted session");
            }
        }

        tracing::info!(removed, max_age_hours, "Session compaction finished");
        Ok(removed)
    }

    fn backend_type(&self) -> StoreBackend {
        StoreBackend::Local
    }
}
