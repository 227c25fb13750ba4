//! State machine guards and session recovery.

use shutter_core::{FailureKind, ItemPatch, PipelineError, UploadItem, UploadStatus};

pub const RESELECT_MESSAGE: &str = "Source file is no longer available; re-select it to upload";

/// What to do with non-terminal items found in a reloaded session. Their
/// source bytes were never persisted, so they cannot resume on their own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RecoveryPolicy {
    /// Drop them silently.
    #[default]
    Discard,
    /// Keep them as `error` with a prompt to re-select the file.
    RequireReselect,
}

/// Reject a status change the state machine does not allow. Patches that
/// keep the current status always pass.
pub fn check_transition(item: &UploadItem, patch: &ItemPatch) -> Result<(), PipelineError> {
    match patch.status {
        Some(next) if next != item.status && !item.status.can_transition_to(next) => {
            Err(PipelineError::InvalidTransition {
                id: item.id,
                from: item.status,
                to: next,
            })
        }
        _ => Ok(()),
    }
}

/// Normalize items loaded from the durable store. Terminal items are kept as
/// they are; the rest follow `policy`. Returns the items and whether anything
/// changed.
pub fn recover_items(items: Vec<UploadItem>, policy: RecoveryPolicy) -> (Vec<UploadItem>, bool) {
    let mut changed = false;
    let mut recovered = Vec::with_capacity(items.len());

    for mut item in items {
        if item.status.is_terminal() {
            recovered.push(item);
            continue;
        }

        changed = true;
        match policy {
            RecoveryPolicy::Discard => {
                tracing::debug!(item_id = %item.id, status = %item.status, "Discarding unrecoverable item");
            }
            RecoveryPolicy::RequireReselect => {
                // Load-time normalization: not a live transition.
                item.status = UploadStatus::Error;
                item.progress = 0;
                item.apply(
                    &ItemPatch::status(UploadStatus::Error)
                        .with_failure(FailureKind::Validation, RESELECT_MESSAGE),
                );
                recovered.push(item);
            }
        }
    }

    (recovered, changed)
}
