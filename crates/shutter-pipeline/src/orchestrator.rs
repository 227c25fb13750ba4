//! Pipeline orchestrator
//!
//! Owns every item of one session and is the only writer of item state.
//! Each status change goes through [`UploadPipeline::transition`], which
//! validates it against the state machine, applies it in memory, awaits the
//! durable store write and only then publishes the new snapshot. The next
//! transition of any item cannot start before that write has returned.

use bytes::Bytes;
use futures::stream::{FuturesUnordered, StreamExt};
use shutter_core::{
    Credential, CredentialSource, ErrorMetadata, FailureKind, ItemPatch, LogLevel,
    ObjectUploader, PipelineError, ProgressFn, RecordCommitter, SessionKey, TransferError,
    TransferRequest, UploadConfig, UploadItem, UploadStatus,
};
use shutter_infra::{ConcurrencyLimiter, RetryAttempt, RetryController, RetryPolicy};
use shutter_processing::{
    content_type_for, preview, CompressionOutcome, CompressionPolicy, CompressionStage,
    CompressionWorkerPool, Fingerprint, Fingerprinter, MediaValidator, NetworkProfiler,
    ValidationError,
};
use shutter_storage::ItemStore;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::broker::CredentialBroker;
use crate::commit::CommittedBatch;
use crate::state::{check_transition, recover_items, RecoveryPolicy};
use crate::summary::BatchSummary;

/// Remote collaborators and the durable store a pipeline works against.
#[derive(Clone)]
pub struct PipelineDeps {
    pub store: Arc<dyn ItemStore>,
    pub credentials: Arc<dyn CredentialSource>,
    pub uploader: Arc<dyn ObjectUploader>,
    pub committer: Arc<dyn RecordCommitter>,
}

/// A user-selected file handed to [`UploadPipeline::submit`].
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub file_name: String,
    /// Guessed from the file extension when absent.
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl SourceFile {
    pub fn new(file_name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: None,
            data: data.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub async fn read(path: &Path) -> std::io::Result<Self> {
        let data = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("upload")
            .to_string();
        Ok(Self::new(file_name, data))
    }
}

/// Outcome of a submission. Rejected and duplicate files never become items.
#[derive(Debug, Default)]
pub struct SubmitReport {
    pub accepted: Vec<Uuid>,
    pub duplicates: Vec<String>,
    pub rejected: Vec<(String, ValidationError)>,
}

#[derive(Clone)]
struct Payload {
    data: Bytes,
    content_type: String,
}

#[derive(Default)]
pub(crate) struct PipelineState {
    pub(crate) items: Vec<UploadItem>,
    // Source bytes live only in memory; they are gone after a reload.
    sources: HashMap<Uuid, Bytes>,
    prepared: HashMap<Uuid, Payload>,
    fingerprints: HashMap<Fingerprint, Uuid>,
    cancels: HashMap<Uuid, CancellationToken>,
    pub(crate) committed: Option<CommittedBatch>,
}

impl PipelineState {
    fn item(&self, id: Uuid) -> Option<&UploadItem> {
        self.items.iter().find(|item| item.id == id)
    }

    fn forget(&mut self, id: Uuid) {
        self.sources.remove(&id);
        self.prepared.remove(&id);
        self.fingerprints.retain(|_, owner| *owner != id);
    }

    /// Items graduated by the last commit leave the session. Failed items
    /// stay so they can still be retried.
    fn start_new_submission(&mut self) {
        let Some(batch) = self.committed.take() else {
            return;
        };
        let graduated: Vec<Uuid> = self
            .items
            .iter()
            .filter(|item| batch.graduates(item))
            .map(|item| item.id)
            .collect();
        self.items.retain(|item| !batch.graduates(item));
        for id in graduated {
            self.forget(id);
        }
    }
}

pub(crate) struct Shared {
    state: Mutex<PipelineState>,
    snapshots: watch::Sender<Vec<UploadItem>>,
}

impl Shared {
    pub(crate) fn lock(&self) -> MutexGuard<'_, PipelineState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn publish(&self) {
        let items = self.lock().items.clone();
        self.snapshots.send_replace(items);
    }

    /// In-memory only; progress is not persisted.
    fn record_progress(&self, id: Uuid, sent: u64, total: u64) {
        let percent = if total == 0 {
            100
        } else {
            (sent.saturating_mul(100) / total).min(100) as u8
        };

        let items = {
            let mut state = self.lock();
            let Some(item) = state.items.iter_mut().find(|item| item.id == id) else {
                return;
            };
            if item.status != UploadStatus::Uploading || percent <= item.progress {
                return;
            }
            item.apply(&ItemPatch::progress(percent));
            state.items.clone()
        };
        self.snapshots.send_replace(items);
    }
}

/// Upload pipeline for one session.
pub struct UploadPipeline {
    pub(crate) key: SessionKey,
    pub(crate) config: UploadConfig,
    pub(crate) deps: PipelineDeps,
    validator: MediaValidator,
    fingerprinter: Fingerprinter,
    pool: Arc<CompressionWorkerPool>,
    compression: CompressionStage,
    compression_limiter: ConcurrencyLimiter,
    pub(crate) retry: RetryController,
    broker: CredentialBroker,
    pub(crate) shared: Arc<Shared>,
    pause: Mutex<CancellationToken>,
    pub(crate) write_gate: tokio::sync::Mutex<()>,
    run_lock: tokio::sync::Mutex<()>,
    pub(crate) commit_lock: tokio::sync::Mutex<()>,
}

impl UploadPipeline {
    /// Load the session from the durable store and recover it.
    ///
    /// Unreadable sessions were already cleared by the store; a store that
    /// fails outright is logged and the session starts empty.
    #[tracing::instrument(skip(key, config, deps), fields(session = %key))]
    pub async fn open(
        key: SessionKey,
        config: UploadConfig,
        deps: PipelineDeps,
        recovery: RecoveryPolicy,
    ) -> Result<Self, PipelineError> {
        config
            .validate()
            .map_err(|e| PipelineError::Config(e.to_string()))?;

        let stored = match deps.store.get_session(&key).await {
            Ok(record) => record.map(|record| record.items).unwrap_or_default(),
            Err(e) => {
                tracing::warn!(session = %key, error = %e, "Failed to load session, starting empty");
                Vec::new()
            }
        };
        let loaded = stored.len();
        let (items, changed) = recover_items(stored, recovery);
        if changed {
            if let Err(e) = deps.store.save_session(&key, &items).await {
                tracing::warn!(session = %key, error = %e, "Failed to persist recovered session");
            }
        }

        tracing::info!(
            session = %key,
            loaded,
            restored = items.len(),
            ?recovery,
            "Upload session opened"
        );

        let retry = RetryController::new(RetryPolicy::from_config(&config));
        let pool = Arc::new(CompressionWorkerPool::new(
            config.compression_concurrency,
            config.compression_timeout(),
        ));
        let compression = CompressionStage::new(
            Arc::clone(&pool),
            config.compression_skip_threshold_bytes,
        );
        let broker = CredentialBroker::new(
            Arc::clone(&deps.credentials),
            retry.clone(),
            key.as_str(),
            config.credential_chunk_size,
            config.credential_validity(),
        );
        let (snapshots, _) = watch::channel(items.clone());

        Ok(Self {
            validator: MediaValidator::from_config(&config),
            fingerprinter: Fingerprinter::default(),
            compression_limiter: ConcurrencyLimiter::new(
                "compression",
                config.compression_concurrency,
            ),
            pool,
            compression,
            retry,
            broker,
            shared: Arc::new(Shared {
                state: Mutex::new(PipelineState {
                    items,
                    ..PipelineState::default()
                }),
                snapshots,
            }),
            pause: Mutex::new(CancellationToken::new()),
            write_gate: tokio::sync::Mutex::new(()),
            run_lock: tokio::sync::Mutex::new(()),
            commit_lock: tokio::sync::Mutex::new(()),
            key,
            config,
            deps,
        })
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// Current snapshot of every item, in submission order.
    pub fn items(&self) -> Vec<UploadItem> {
        self.shared.lock().items.clone()
    }

    pub fn item(&self, id: Uuid) -> Option<UploadItem> {
        self.shared.lock().item(id).cloned()
    }

    /// Read-only projection updated on every transition and progress step.
    pub fn subscribe(&self) -> watch::Receiver<Vec<UploadItem>> {
        self.shared.snapshots.subscribe()
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary::from_items(&self.shared.lock().items)
    }

    /// Remote URLs of every item currently in `success`.
    pub fn finalized_urls(&self) -> Vec<String> {
        self.shared
            .lock()
            .items
            .iter()
            .filter_map(|item| item.remote().map(|remote| remote.url))
            .collect()
    }

    pub fn is_paused(&self) -> bool {
        self.pause_token().is_cancelled()
    }

    fn pause_token(&self) -> CancellationToken {
        self.pause
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Stop the compression workers. The pipeline must not be run afterwards.
    pub fn shutdown(&self) {
        self.pool.shutdown();
    }

    /// Validate, deduplicate and stage files as `pending` items.
    #[tracing::instrument(skip(self, files), fields(session = %self.key, count = files.len()))]
    pub async fn submit(&self, files: Vec<SourceFile>) -> SubmitReport {
        let mut report = SubmitReport::default();

        for file in files {
            let content_type = file
                .content_type
                .clone()
                .unwrap_or_else(|| content_type_for(&file.file_name).to_string());
            let size = file.data.len() as u64;

            if let Err(e) = self.validator.validate(&file.file_name, &content_type, size) {
                tracing::debug!(
                    file = %file.file_name,
                    kind = %FailureKind::Validation,
                    error = %e,
                    "File rejected"
                );
                report.rejected.push((file.file_name, e));
                continue;
            }

            let fingerprint = self.fingerprinter.fingerprint(&file.data);
            if self.shared.lock().fingerprints.contains_key(&fingerprint) {
                tracing::debug!(file = %file.file_name, %fingerprint, "Duplicate file skipped");
                report.duplicates.push(file.file_name);
                continue;
            }

            let mut item = UploadItem::new(file.file_name.as_str(), content_type, size);
            item.preview_fingerprint = render_preview_off_thread(file.data.clone()).await;

            {
                let mut state = self.shared.lock();
                if state.fingerprints.contains_key(&fingerprint) {
                    report.duplicates.push(file.file_name);
                    continue;
                }
                state.start_new_submission();
                state.fingerprints.insert(fingerprint, item.id);
                state.sources.insert(item.id, file.data);
                state.items.push(item.clone());
            }

            tracing::debug!(item_id = %item.id, file = %item.file_name, size, "Item staged");
            report.accepted.push(item.id);
        }

        if !report.accepted.is_empty() {
            let _gate = self.write_gate.lock().await;
            let items = self.items();
            if let Err(e) = self.deps.store.save_session(&self.key, &items).await {
                tracing::warn!(session = %self.key, error = %e, "Failed to persist submitted items");
            }
            self.shared.publish();
        }

        tracing::info!(
            accepted = report.accepted.len(),
            duplicates = report.duplicates.len(),
            rejected = report.rejected.len(),
            "Files submitted"
        );
        report
    }

    /// Apply one patch: check the state machine, update memory, persist,
    /// then publish.
    pub(crate) async fn transition(
        &self,
        id: Uuid,
        patch: ItemPatch,
    ) -> Result<UploadItem, PipelineError> {
        let _gate = self.write_gate.lock().await;
        self.transition_locked(id, patch).await
    }

    /// Transition issued by a run. Skipped (`None`) once `cancel` has fired,
    /// so pause and removal always own the item's next status.
    async fn advance(
        &self,
        id: Uuid,
        patch: ItemPatch,
        cancel: &CancellationToken,
    ) -> Result<Option<UploadItem>, PipelineError> {
        let _gate = self.write_gate.lock().await;
        if cancel.is_cancelled() {
            return Ok(None);
        }
        self.transition_locked(id, patch).await.map(Some)
    }

    async fn transition_locked(
        &self,
        id: Uuid,
        patch: ItemPatch,
    ) -> Result<UploadItem, PipelineError> {
        let (from, item) = {
            let mut state = self.shared.lock();
            let item = state
                .items
                .iter_mut()
                .find(|item| item.id == id)
                .ok_or(PipelineError::UnknownItem(id))?;
            check_transition(item, &patch)?;
            let from = item.status;
            item.apply(&patch);
            (from, item.clone())
        };

        match self.deps.store.update_item(&self.key, id, &patch).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(item_id = %id, "Item missing from durable store, update skipped")
            }
            Err(e) => {
                tracing::warn!(item_id = %id, error = %e, "Failed to persist item update")
            }
        }

        self.shared.publish();

        if from != item.status {
            tracing::debug!(
                item_id = %id,
                from = %from,
                to = %item.status,
                retry_count = item.retry_count,
                "Item transitioned"
            );
        }
        Ok(item)
    }

    async fn record_retry(&self, id: Uuid, attempt: RetryAttempt) {
        let patch = ItemPatch::default().with_retry_count(attempt.retry);
        if let Err(e) = self.transition(id, patch).await {
            tracing::debug!(item_id = %id, error = %e, "Failed to record retry");
        }
    }

    /// Drive every runnable item to a terminal state (or until paused).
    ///
    /// Items are admitted into compression and transfer in submission order;
    /// they finish in whatever order their transfers complete.
    #[tracing::instrument(skip(self), fields(session = %self.key))]
    pub async fn run(&self) -> BatchSummary {
        let _run = self.run_lock.lock().await;

        let pause = self.pause_token();
        if pause.is_cancelled() {
            tracing::info!("Pipeline is paused, nothing to run");
            return self.summary();
        }

        let profile = NetworkProfiler::profile(&self.config.network_hints);
        let policy = CompressionPolicy::from_profile(&profile);
        let transfer_limiter = ConcurrencyLimiter::new("transfer", profile.max_concurrent);

        let runnable: Vec<(Uuid, String, CancellationToken)> = {
            let mut state = self.shared.lock();
            let candidates: Vec<(Uuid, String)> = state
                .items
                .iter()
                .filter(|item| {
                    matches!(
                        item.status,
                        UploadStatus::Pending | UploadStatus::Signing | UploadStatus::Uploading
                    )
                })
                .map(|item| (item.id, item.object_id()))
                .collect();

            let mut runnable = Vec::with_capacity(candidates.len());
            for (id, object_id) in candidates {
                if !state.sources.contains_key(&id) || state.cancels.contains_key(&id) {
                    continue;
                }
                let cancel = pause.child_token();
                state.cancels.insert(id, cancel.clone());
                runnable.push((id, object_id, cancel));
            }
            runnable
        };

        if runnable.is_empty() {
            return self.summary();
        }

        tracing::info!(
            items = runnable.len(),
            connection = %profile.connection,
            max_concurrent = profile.max_concurrent,
            max_dimension = profile.max_dimension,
            quality = profile.quality,
            "Pipeline run started"
        );

        let object_ids: Vec<String> = runnable
            .iter()
            .map(|(_, object_id, _)| object_id.clone())
            .collect();
        self.broker.prefetch(&object_ids).await;

        let mut drives: FuturesUnordered<_> = runnable
            .into_iter()
            .map(|(id, _, cancel)| self.drive_item(id, policy, &transfer_limiter, cancel))
            .collect();
        while drives.next().await.is_some() {}

        let summary = self.summary();
        tracing::info!(
            %summary,
            succeeded = summary.succeeded,
            failed = summary.failed,
            deleted = summary.deleted,
            peak_transfers = transfer_limiter.peak(),
            "Pipeline run finished"
        );
        summary
    }

    async fn drive_item(
        &self,
        id: Uuid,
        policy: CompressionPolicy,
        limiter: &ConcurrencyLimiter,
        cancel: CancellationToken,
    ) {
        if let Err(e) = self.drive_phases(id, policy, limiter, &cancel).await {
            match e.log_level() {
                LogLevel::Debug => tracing::debug!(item_id = %id, error = %e, "Item stopped"),
                _ => tracing::warn!(item_id = %id, error = %e, "Item stopped"),
            }
        }
        self.shared.lock().cancels.remove(&id);
        self.shared.publish();
    }

    async fn drive_phases(
        &self,
        id: Uuid,
        policy: CompressionPolicy,
        limiter: &ConcurrencyLimiter,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        let (status, source, content_type, prepared) = {
            let state = self.shared.lock();
            let item = state.item(id).ok_or(PipelineError::UnknownItem(id))?;
            let source = state
                .sources
                .get(&id)
                .cloned()
                .ok_or(PipelineError::UnknownItem(id))?;
            (
                item.status,
                source,
                item.content_type.clone(),
                state.prepared.contains_key(&id),
            )
        };

        if status == UploadStatus::Pending
            && !prepared
            && self
                .compression
                .should_compress(source.len() as u64, &content_type)
            && !self.compress(id, source, &content_type, policy, cancel).await?
        {
            return Ok(());
        }

        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            permit = limiter.acquire() => permit.map_err(|e| PipelineError::Config(e.to_string()))?,
        };

        let Some(credential) = self.sign(id, cancel).await? else {
            return Ok(());
        };
        self.upload(id, credential, cancel).await?;

        let delay = self.config.inter_item_delay();
        if !delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => {}
            }
        }
        Ok(())
    }

    /// Compression phase. Returns `false` if cancelled.
    async fn compress(
        &self,
        id: Uuid,
        source: Bytes,
        content_type: &str,
        policy: CompressionPolicy,
        cancel: &CancellationToken,
    ) -> Result<bool, PipelineError> {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(false),
            permit = self.compression_limiter.acquire() => {
                permit.map_err(|e| PipelineError::Config(e.to_string()))?
            }
        };

        if self
            .advance(id, ItemPatch::status(UploadStatus::Compressing), cancel)
            .await?
            .is_none()
        {
            return Ok(false);
        }

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(false),
            outcome = self.compression.process(source.clone(), content_type, policy) => outcome,
        };
        drop(permit);

        let mut patch = ItemPatch::status(UploadStatus::Pending);
        if let Some(size) = outcome.compressed_size() {
            let (data, content_type) = outcome.payload(&source, content_type);
            patch = patch.with_compressed_size(size);
            self.shared
                .lock()
                .prepared
                .insert(id, Payload { data, content_type });
        }
        if let CompressionOutcome::FellBack { reason } = &outcome {
            tracing::warn!(
                item_id = %id,
                kind = %FailureKind::CompressionFailure,
                reason = %reason,
                "Uploading original file"
            );
        }

        Ok(self.advance(id, patch, cancel).await?.is_some())
    }

    /// Signing phase. Returns `None` when the item stopped here.
    async fn sign(
        &self,
        id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<Option<Credential>, PipelineError> {
        let (status, object_id) = {
            let state = self.shared.lock();
            let item = state.item(id).ok_or(PipelineError::UnknownItem(id))?;
            (item.status, item.object_id())
        };

        match status {
            UploadStatus::Pending => {
                let patch = ItemPatch::status(UploadStatus::Signing).with_retry_count(0);
                if self.advance(id, patch, cancel).await?.is_none() {
                    return Ok(None);
                }
            }
            UploadStatus::Signing | UploadStatus::Uploading => {}
            _ => return Ok(None),
        }

        if let Some(credential) = self.broker.cached(&object_id) {
            return Ok(Some(credential));
        }

        let object_id = object_id.as_str();
        let result = self
            .retry
            .run(
                cancel,
                move |_| self.broker.fetch_one(object_id),
                move |attempt| self.record_retry(id, attempt),
            )
            .await;

        match result {
            Ok(credential) => Ok(Some(credential)),
            Err(_) if cancel.is_cancelled() => Ok(None),
            Err(e) => {
                let patch = ItemPatch::status(UploadStatus::Error)
                    .with_failure(FailureKind::CredentialFailure, e.to_string());
                if self.advance(id, patch, cancel).await?.is_some() {
                    tracing::warn!(item_id = %id, error = %e, "Credential fetch failed");
                }
                Ok(None)
            }
        }
    }

    /// Transfer phase.
    async fn upload(
        &self,
        id: Uuid,
        credential: Credential,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        let (request, status) = {
            let state = self.shared.lock();
            let item = state.item(id).ok_or(PipelineError::UnknownItem(id))?;
            let payload = state
                .prepared
                .get(&id)
                .cloned()
                .or_else(|| {
                    state.sources.get(&id).map(|data| Payload {
                        data: data.clone(),
                        content_type: item.content_type.clone(),
                    })
                })
                .ok_or(PipelineError::UnknownItem(id))?;
            (
                TransferRequest {
                    data: payload.data,
                    file_name: item.file_name.clone(),
                    content_type: payload.content_type,
                },
                item.status,
            )
        };

        if status != UploadStatus::Uploading {
            let patch = ItemPatch::status(UploadStatus::Uploading).with_retry_count(0);
            if self.advance(id, patch, cancel).await?.is_none() {
                return Ok(());
            }
        }

        let progress = self.progress_fn(id);
        let uploader = &self.deps.uploader;
        let credential_ref = &credential;
        let result = self
            .retry
            .run(
                cancel,
                move |_| {
                    uploader.upload(
                        request.clone(),
                        credential_ref,
                        Arc::clone(&progress),
                        cancel.clone(),
                    )
                },
                move |attempt| self.record_retry(id, attempt),
            )
            .await;

        match result {
            Ok(remote) => {
                let patch = ItemPatch::status(UploadStatus::Success).with_remote(remote);
                let Some(item) = self.advance(id, patch, cancel).await? else {
                    return Ok(());
                };
                tracing::info!(
                    item_id = %id,
                    url = item.final_url.as_deref().unwrap_or_default(),
                    retry_count = item.retry_count,
                    "Upload finished"
                );
            }
            // Pause or removal owns the item's next status.
            Err(_) if cancel.is_cancelled() => {}
            Err(e) => {
                if let TransferError::Client { status: 401 | 403, .. } = e {
                    self.broker.invalidate(&credential.object_id);
                }
                let patch = ItemPatch::status(UploadStatus::Error)
                    .with_failure(e.failure_kind(), e.to_string());
                if self.advance(id, patch, cancel).await?.is_some() && e.is_user_visible() {
                    tracing::warn!(item_id = %id, error = %e, code = e.error_code(), "Upload failed");
                }
            }
        }
        Ok(())
    }

    fn progress_fn(&self, id: Uuid) -> ProgressFn {
        let shared = Arc::clone(&self.shared);
        Arc::new(move |sent, total| shared.record_progress(id, sent, total))
    }

    /// Abort every in-flight call and park all unfinished items as `paused`.
    /// Paused attempts do not count as retries. Returns how many items were
    /// paused.
    #[tracing::instrument(skip(self), fields(session = %self.key))]
    pub async fn pause(&self) -> usize {
        self.pause_token().cancel();

        let ids: Vec<Uuid> = self
            .shared
            .lock()
            .items
            .iter()
            .filter(|item| item.status.is_active())
            .map(|item| item.id)
            .collect();

        let mut paused = 0;
        for id in ids {
            match self
                .transition(id, ItemPatch::status(UploadStatus::Paused))
                .await
            {
                Ok(_) => paused += 1,
                Err(e) => tracing::debug!(item_id = %id, error = %e, "Item not paused"),
            }
        }

        tracing::info!(paused, "Pipeline paused");
        paused
    }

    /// Re-admit paused items as `pending`. Call [`run`](Self::run) to drive
    /// them again. Returns how many items were resumed.
    #[tracing::instrument(skip(self), fields(session = %self.key))]
    pub async fn resume(&self) -> usize {
        {
            let mut pause = self
                .pause
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if pause.is_cancelled() {
                *pause = CancellationToken::new();
            }
        }

        let ids: Vec<Uuid> = self
            .shared
            .lock()
            .items
            .iter()
            .filter(|item| item.status == UploadStatus::Paused)
            .map(|item| item.id)
            .collect();

        let mut resumed = 0;
        for id in ids {
            match self
                .transition(id, ItemPatch::status(UploadStatus::Pending))
                .await
            {
                Ok(_) => resumed += 1,
                Err(e) => tracing::debug!(item_id = %id, error = %e, "Item not resumed"),
            }
        }

        tracing::info!(resumed, "Pipeline resumed");
        resumed
    }

    /// Manually retry failed items whose bytes are still in memory. They go
    /// back to `signing` with a fresh retry budget; a run reuses a still-fresh
    /// credential and only moves them to `uploading` once a transfer slot is
    /// free. Call [`run`](Self::run) to drive them.
    #[tracing::instrument(skip(self), fields(session = %self.key))]
    pub async fn retry_failed(&self) -> Vec<Uuid> {
        let candidates: Vec<Uuid> = {
            let state = self.shared.lock();
            state
                .items
                .iter()
                .filter(|item| {
                    item.status == UploadStatus::Error && state.sources.contains_key(&item.id)
                })
                .map(|item| item.id)
                .collect()
        };

        let mut retried = Vec::with_capacity(candidates.len());
        for id in candidates {
            let patch = ItemPatch::status(UploadStatus::Signing).with_retry_count(0);
            match self.transition(id, patch).await {
                Ok(_) => retried.push(id),
                Err(e) => tracing::debug!(item_id = %id, error = %e, "Item not retried"),
            }
        }

        tracing::info!(retried = retried.len(), "Failed items re-queued");
        retried
    }

    /// Remove an item. In-flight work is aborted and an unfinished item is
    /// marked `deleted`; a finished item is dropped from the session so it
    /// is never committed.
    #[tracing::instrument(skip(self), fields(session = %self.key))]
    pub async fn remove(&self, id: Uuid) -> Result<(), PipelineError> {
        let (status, token) = {
            let state = self.shared.lock();
            let item = state.item(id).ok_or(PipelineError::UnknownItem(id))?;
            (item.status, state.cancels.get(&id).cloned())
        };

        if let Some(token) = token {
            token.cancel();
        }

        if status.is_terminal() {
            return self.drop_item(id).await;
        }

        match self
            .transition(id, ItemPatch::status(UploadStatus::Deleted))
            .await
        {
            Ok(_) => {
                self.shared.lock().forget(id);
                tracing::info!(item_id = %id, "Item removed");
                Ok(())
            }
            // Finished while we were cancelling it.
            Err(PipelineError::InvalidTransition { from, .. }) if from.is_terminal() => {
                self.drop_item(id).await
            }
            Err(e) => Err(e),
        }
    }

    async fn drop_item(&self, id: Uuid) -> Result<(), PipelineError> {
        let _gate = self.write_gate.lock().await;
        {
            let mut state = self.shared.lock();
            state.items.retain(|item| item.id != id);
            state.forget(id);
        }
        if let Err(e) = self.deps.store.remove_item(&self.key, id).await {
            tracing::warn!(item_id = %id, error = %e, "Failed to drop item from durable store");
        }
        self.shared.publish();
        tracing::info!(item_id = %id, "Item dropped from session");
        Ok(())
    }

    /// Wait until no item is being driven by a run.
    pub(crate) async fn wait_until_idle(&self) {
        let mut changes = self.shared.snapshots.subscribe();
        loop {
            if self.shared.lock().cancels.is_empty() {
                return;
            }
            if changes.changed().await.is_err() {
                return;
            }
        }
    }
}

async fn render_preview_off_thread(data: Bytes) -> Option<String> {
    match tokio::task::spawn_blocking(move || preview::render_preview(&data)).await {
        Ok(Ok(preview)) => Some(preview),
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "No preview for file");
            None
        }
        Err(e) => {
            tracing::warn!(error = %e, "Preview task failed");
            None
        }
    }
}
