//! Session (de)serialization shared by every backend.

use shutter_core::{ItemPatch, SessionKey, SessionRecord, UploadItem};
use uuid::Uuid;

use crate::traits::{StoreError, StoreResult};

pub fn encode(record: &SessionRecord, max_bytes: u64) -> StoreResult<String> {
    let raw =
        serde_json::to_string(record).map_err(|e| StoreError::Serialization(e.to_string()))?;
    let size = raw.len() as u64;
    if size > max_bytes {
        return Err(StoreError::TooLarge {
            size,
            max: max_bytes,
        });
    }
    Ok(raw)
}

pub fn decode(key: &SessionKey, raw: &str, max_bytes: u64) -> StoreResult<SessionRecord> {
    let size = raw.len() as u64;
    if size > max_bytes {
        return Err(StoreError::TooLarge {
            size,
            max: max_bytes,
        });
    }

    let record: SessionRecord =
        serde_json::from_str(raw).map_err(|e| StoreError::Corrupt {
            key: key.to_string(),
            reason: e.to_string(),
        })?;

    if &record.key != key {
        return Err(StoreError::Corrupt {
            key: key.to_string(),
            reason: format!("payload belongs to session {}", record.key),
        });
    }

    Ok(record)
}

/// Whether a decode failure should be healed by clearing the session.
pub fn is_self_healable(err: &StoreError) -> bool {
    matches!(err, StoreError::Corrupt { .. } | StoreError::TooLarge { .. })
}

pub fn new_record(key: &SessionKey, items: &[UploadItem]) -> SessionRecord {
    SessionRecord::new(key.clone(), items.to_vec())
}

/// Apply a patch to the item with `id`. Returns `false` if it is absent.
pub fn patch_item(record: &mut SessionRecord, id: Uuid, patch: &ItemPatch) -> bool {
    match record.items.iter_mut().find(|item| item.id == id) {
        Some(item) => {
            item.apply(patch);
            record.updated_at = chrono::Utc::now();
            true
        }
        None => false,
    }
}
