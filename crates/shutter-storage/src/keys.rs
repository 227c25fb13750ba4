//! Shared naming for persisted sessions.
//!
//! Session keys contain `:` and caller-supplied ids, so file-based backends
//! hex-encode the key into a flat, filesystem-safe name.

use shutter_core::SessionKey;

pub const SESSION_FILE_EXTENSION: &str = "json";

/// File name holding the given session: `{hex(key)}.json`.
pub fn session_file_name(key: &SessionKey) -> String {
    format!("{}.{}", hex::encode(key.as_str()), SESSION_FILE_EXTENSION)
}

/// Inverse of [`session_file_name`]; `None` for foreign files.
pub fn session_key_from_file_name(name: &str) -> Option<SessionKey> {
    let stem = name.strip_suffix(SESSION_FILE_EXTENSION)?.strip_suffix('.')?;
    let raw = hex::decode(stem).ok()?;
    String::from_utf8(raw).ok().map(SessionKey::from_raw)
}
