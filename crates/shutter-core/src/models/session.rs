use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

use crate::models::UploadItem;

const SESSION_KEY_PREFIX: &str = "upload_session";

/// Deterministic identifier of a session, derived from the acting user, the
/// usage scope and an optional scope instance (e.g. a specific listing id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionKey(String);

impl SessionKey {
    pub fn new(actor: &str, scope: &str, instance: Option<&str>) -> Self {
        match instance.filter(|i| !i.is_empty()) {
            Some(instance) => Self(format!(
                "{}:{}:{}:{}",
                SESSION_KEY_PREFIX, actor, scope, instance
            )),
            None => Self(format!("{}:{}:{}", SESSION_KEY_PREFIX, actor, scope)),
        }
    }

    /// Wrap an already-derived key (e.g. read back from storage).
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for SessionKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0)
    }
}

/// Durable form of a session: its items plus the time of the last write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub key: SessionKey,
    pub items: Vec<UploadItem>,
    pub updated_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new(key: SessionKey, items: Vec<UploadItem>) -> Self {
        Self {
            key,
            items,
            updated_at: Utc::now(),
        }
    }

    /// True when no item has work left to do. Empty sessions count as terminal.
    pub fn is_fully_terminal(&self) -> bool {
        self.items.iter().all(|item| item.status.is_terminal())
    }

    /// Whether maintenance may drop this session.
    pub fn is_compactable(&self, max_age_hours: u64, now: DateTime<Utc>) -> bool {
        let max_age = Duration::hours(max_age_hours.min(i64::MAX as u64) as i64);
        self.is_fully_terminal() && now - self.updated_at > max_age
    }
}
