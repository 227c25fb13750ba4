//! Scripted stand-ins for the remote collaborators.

use async_trait::async_trait;
use chrono::Utc;
use shutter_core::{
    CommitEntry, CommitError, CommitReceipt, Credential, CredentialError, CredentialSource,
    ObjectUploader, ProgressFn, RecordCommitter, RemoteObject, TransferError, TransferRequest,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Issues credentials. Batches containing a poisoned id fail with a 503.
#[derive(Default)]
pub struct ScriptedCredentialSource {
    poisoned: Mutex<HashSet<String>>,
    reject_singles: Mutex<bool>,
    pub batch_calls: AtomicUsize,
    pub single_calls: AtomicUsize,
}

impl ScriptedCredentialSource {
    pub fn poison(&self, object_ids: impl IntoIterator<Item = String>) {
        self.poisoned.lock().unwrap().extend(object_ids);
    }

    /// Make single fetches fail with a non-retryable 403.
    pub fn reject_singles(&self) {
        *self.reject_singles.lock().unwrap() = true;
    }

    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    pub fn single_calls(&self) -> usize {
        self.single_calls.load(Ordering::SeqCst)
    }

    fn credential(object_id: &str) -> Credential {
        Credential {
            account_id: "acct-test".into(),
            timestamp: Utc::now().timestamp(),
            folder: "uploads".into(),
            object_id: object_id.into(),
            signature: format!("sig-{}", object_id),
            upload_endpoint: "https://store.test/upload".into(),
        }
    }
}

#[async_trait]
impl CredentialSource for ScriptedCredentialSource {
    async fn fetch_batch(
        &self,
        _session_id: &str,
        object_ids: &[String],
    ) -> Result<Vec<Credential>, CredentialError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        let poisoned = self.poisoned.lock().unwrap().clone();
        if object_ids.iter().any(|id| poisoned.contains(id)) {
            return Err(CredentialError::Transport(TransferError::from_status(
                503,
                "signer unavailable",
            )));
        }
        Ok(object_ids.iter().map(|id| Self::credential(id)).collect())
    }

    async fn fetch_one(
        &self,
        session_id: &str,
        object_id: &str,
    ) -> Result<Credential, CredentialError> {
        self.single_calls.fetch_add(1, Ordering::SeqCst);
        if *self.reject_singles.lock().unwrap() {
            return Err(CredentialError::Unauthorized(session_id.to_string()));
        }
        Ok(Self::credential(object_id))
    }
}

/// Uploads that succeed after replaying the failures scripted per file name.
pub struct ScriptedUploader {
    failures: Mutex<HashMap<String, VecDeque<TransferError>>>,
    blocking: Mutex<HashSet<String>>,
    latency: Duration,
    attempts: Mutex<HashMap<String, usize>>,
    uploaded: Mutex<Vec<(String, usize)>>,
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Default for ScriptedUploader {
    fn default() -> Self {
        Self::with_latency(Duration::from_millis(5))
    }
}

impl ScriptedUploader {
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            failures: Mutex::new(HashMap::new()),
            blocking: Mutex::new(HashSet::new()),
            latency,
            attempts: Mutex::new(HashMap::new()),
            uploaded: Mutex::new(Vec::new()),
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Fail the next attempts for `file_name` with `errors`, in order.
    pub fn fail_with(&self, file_name: &str, errors: Vec<TransferError>) {
        self.failures
            .lock()
            .unwrap()
            .insert(file_name.to_string(), errors.into());
    }

    /// Fail every attempt for `file_name` with a retryable 503.
    pub fn always_fail(&self, file_name: &str) {
        self.fail_with(file_name, vec![TransferError::from_status(503, "busy"); 64]);
    }

    /// Hold uploads of `file_name` until they are cancelled.
    pub fn block(&self, file_name: &str) {
        self.blocking.lock().unwrap().insert(file_name.to_string());
    }

    pub fn unblock(&self, file_name: &str) {
        self.blocking.lock().unwrap().remove(file_name);
    }

    pub fn attempts(&self, file_name: &str) -> usize {
        self.attempts
            .lock()
            .unwrap()
            .get(file_name)
            .copied()
            .unwrap_or(0)
    }

    /// `(file_name, bytes)` of every successful upload.
    pub fn uploaded(&self) -> Vec<(String, usize)> {
        self.uploaded.lock().unwrap().clone()
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectUploader for ScriptedUploader {
    async fn upload(
        &self,
        request: TransferRequest,
        credential: &Credential,
        progress: ProgressFn,
        cancel: CancellationToken,
    ) -> Result<RemoteObject, TransferError> {
        *self
            .attempts
            .lock()
            .unwrap()
            .entry(request.file_name.clone())
            .or_default() += 1;

        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let result = self.transfer(&request, credential, &progress, &cancel).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

impl ScriptedUploader {
    async fn transfer(
        &self,
        request: &TransferRequest,
        credential: &Credential,
        progress: &ProgressFn,
        cancel: &CancellationToken,
    ) -> Result<RemoteObject, TransferError> {
        let total = request.data.len() as u64;
        progress(total / 2, total);

        if self.blocking.lock().unwrap().contains(&request.file_name) {
            cancel.cancelled().await;
            return Err(TransferError::Aborted);
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(TransferError::Aborted),
            _ = tokio::time::sleep(self.latency) => {}
        }

        let scripted = self
            .failures
            .lock()
            .unwrap()
            .get_mut(&request.file_name)
            .and_then(|queue| queue.pop_front());
        if let Some(error) = scripted {
            return Err(error);
        }

        progress(total, total);
        self.uploaded
            .lock()
            .unwrap()
            .push((request.file_name.clone(), request.data.len()));
        Ok(RemoteObject {
            url: format!("https://cdn.test/{}/{}", credential.folder, credential.object_id),
            object_id: credential.object_id.clone(),
        })
    }
}

/// Idempotent record store that remembers every attach call.
#[derive(Default)]
pub struct RecordingCommitter {
    calls: Mutex<Vec<(String, Vec<CommitEntry>)>>,
    associations: Mutex<HashSet<(String, String)>>,
    failures: Mutex<VecDeque<CommitError>>,
}

impl RecordingCommitter {
    pub fn fail_next(&self, errors: Vec<CommitError>) {
        self.failures.lock().unwrap().extend(errors);
    }

    pub fn calls(&self) -> Vec<(String, Vec<CommitEntry>)> {
        self.calls.lock().unwrap().clone()
    }

    /// Distinct urls attached to `record_id`.
    pub fn attached_to(&self, record_id: &str) -> Vec<String> {
        let mut urls: Vec<String> = self
            .associations
            .lock()
            .unwrap()
            .iter()
            .filter(|(record, _)| record == record_id)
            .map(|(_, url)| url.clone())
            .collect();
        urls.sort();
        urls
    }
}

#[async_trait]
impl RecordCommitter for RecordingCommitter {
    async fn attach(
        &self,
        record_id: &str,
        entries: &[CommitEntry],
    ) -> Result<CommitReceipt, CommitError> {
        self.calls
            .lock()
            .unwrap()
            .push((record_id.to_string(), entries.to_vec()));

        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }

        let mut associations = self.associations.lock().unwrap();
        for entry in entries {
            associations.insert((record_id.to_string(), entry.url.clone()));
        }
        Ok(CommitReceipt {
            record_id: record_id.to_string(),
            attached: entries.len(),
            success: true,
        })
    }
}
