pub mod fakes;
pub mod fixtures;

use fakes::{RecordingCommitter, ScriptedCredentialSource, ScriptedUploader};
use shutter_core::{SessionKey, UploadConfig, UploadItem, UploadStatus};
use shutter_pipeline::{PipelineDeps, RecoveryPolicy, UploadPipeline};
use shutter_storage::{ItemStore, MemoryItemStore};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Pipeline wired to scripted collaborators and an in-memory store.
pub struct TestPipeline {
    pub pipeline: Arc<UploadPipeline>,
    pub store: MemoryItemStore,
    pub credentials: Arc<ScriptedCredentialSource>,
    pub uploader: Arc<ScriptedUploader>,
    pub committer: Arc<RecordingCommitter>,
}

/// Configuration with instant retries so tests do not sleep.
pub fn test_config() -> UploadConfig {
    UploadConfig {
        retry_base_delay_ms: 0,
        retry_max_jitter_ms: 0,
        ..UploadConfig::default()
    }
}

pub fn session_key() -> SessionKey {
    SessionKey::new("user-1", "listing", Some("draft-7"))
}

pub async fn setup_pipeline() -> TestPipeline {
    setup_pipeline_with(test_config(), ScriptedUploader::default()).await
}

pub async fn setup_pipeline_with(config: UploadConfig, uploader: ScriptedUploader) -> TestPipeline {
    let store = MemoryItemStore::default();
    let credentials = Arc::new(ScriptedCredentialSource::default());
    let uploader = Arc::new(uploader);
    let committer = Arc::new(RecordingCommitter::default());

    let pipeline = open_pipeline(
        config,
        store.clone(),
        credentials.clone(),
        uploader.clone(),
        committer.clone(),
        RecoveryPolicy::Discard,
    )
    .await;

    TestPipeline {
        pipeline,
        store,
        credentials,
        uploader,
        committer,
    }
}

pub async fn open_pipeline(
    config: UploadConfig,
    store: MemoryItemStore,
    credentials: Arc<ScriptedCredentialSource>,
    uploader: Arc<ScriptedUploader>,
    committer: Arc<RecordingCommitter>,
    recovery: RecoveryPolicy,
) -> Arc<UploadPipeline> {
    let deps = PipelineDeps {
        store: Arc::new(store) as Arc<dyn ItemStore>,
        credentials,
        uploader,
        committer,
    };
    let pipeline = UploadPipeline::open(session_key(), config, deps, recovery)
        .await
        .expect("pipeline should open");
    Arc::new(pipeline)
}

/// Wait until `id` reaches `status`, or panic after two seconds.
pub async fn wait_for_status(pipeline: &UploadPipeline, id: Uuid, status: UploadStatus) {
    let reached = wait_until(pipeline, |items| {
        items.iter().any(|item| item.id == id && item.status == status)
    })
    .await;
    assert!(reached, "item {} never reached {}", id, status);
}

/// Wait until a snapshot satisfies `ready`. Gives up after two seconds.
pub async fn wait_until(pipeline: &UploadPipeline, ready: impl Fn(&[UploadItem]) -> bool) -> bool {
    let mut snapshots = pipeline.subscribe();
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if ready(snapshots.borrow_and_update().as_slice()) {
                return;
            }
            if snapshots.changed().await.is_err() {
                return;
            }
        }
    })
    .await
    .is_ok()
}

pub fn status_of(items: &[UploadItem], id: Uuid) -> Option<UploadStatus> {
    items.iter().find(|item| item.id == id).map(|item| item.status)
}
