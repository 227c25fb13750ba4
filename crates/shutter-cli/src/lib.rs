//! Shared pieces of the `shutter` command-line client.

use anyhow::Context;
use serde::Serialize;
use shutter_api_client::{
    ApiClient, HttpCredentialSource, HttpRecordCommitter, HttpTransferEngine,
};
use shutter_core::{CommitReceipt, SessionKey, UploadConfig, UploadItem, UploadStatus};
use shutter_pipeline::{BatchOutcome, BatchResult, PipelineDeps};
use shutter_storage::ItemStore;
use std::sync::Arc;

/// Initialize tracing for the CLI. Logs go to stderr so stdout stays JSON.
pub fn init_tracing(json: bool) {
    if let Err(e) = shutter_infra::init_telemetry("shutter-cli", json) {
        eprintln!("Tracing already initialized: {}", e);
    }
}

pub fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize output")?;
    println!("{}", out);
    Ok(())
}

/// Wire the HTTP collaborators and the configured store.
pub async fn build_deps(config: &UploadConfig) -> anyhow::Result<PipelineDeps> {
    let client = ApiClient::from_config(config).context("Failed to create API client")?;
    if !client.has_credentials() {
        tracing::warn!("No API token configured; set SHUTTER_API_TOKEN");
    }
    let store = open_store(config).await?;
    let uploader = HttpTransferEngine::new(config.transfer_timeout())
        .context("Failed to create transfer engine")?;

    Ok(PipelineDeps {
        store,
        credentials: Arc::new(HttpCredentialSource::new(client.clone())),
        uploader: Arc::new(uploader),
        committer: Arc::new(HttpRecordCommitter::new(client)),
    })
}

pub async fn open_store(config: &UploadConfig) -> anyhow::Result<Arc<dyn ItemStore>> {
    shutter_storage::create_store(config)
        .await
        .context("Failed to open item store")
}

pub fn session_key(actor: &str, scope: &str, instance: Option<&str>) -> SessionKey {
    SessionKey::new(actor, scope, instance)
}

/// One line of `shutter status` / `shutter upload` output.
#[derive(Debug, Serialize)]
pub struct ItemView {
    pub id: String,
    pub file_name: String,
    pub status: UploadStatus,
    pub progress: u8,
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&UploadItem> for ItemView {
    fn from(item: &UploadItem) -> Self {
        Self {
            id: item.id.to_string(),
            file_name: item.file_name.clone(),
            status: item.status,
            progress: item.progress,
            retry_count: item.retry_count,
            url: item.final_url.clone(),
            error: match (&item.error_kind, &item.error) {
                (Some(kind), Some(message)) => Some(format!("{}: {}", kind, message)),
                (None, Some(message)) => Some(message.clone()),
                _ => None,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UploadOutput {
    pub session: String,
    pub message: String,
    #[serde(flatten)]
    pub outcome: BatchOutcome,
    pub accepted: usize,
    pub duplicates: Vec<String>,
    pub rejected: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<CommitReceipt>,
    pub urls: Vec<String>,
    pub items: Vec<ItemView>,
}

impl UploadOutput {
    pub fn new(key: &SessionKey, result: &BatchResult, items: &[UploadItem]) -> Self {
        Self {
            session: key.to_string(),
            message: result.summary.to_string(),
            outcome: result.summary.outcome(),
            accepted: result.report.accepted.len(),
            duplicates: result.report.duplicates.clone(),
            rejected: result
                .report
                .rejected
                .iter()
                .map(|(name, e)| format!("{}: {}", name, e))
                .collect(),
            receipt: result.receipt.clone(),
            urls: result.urls.clone(),
            items: items.iter().map(ItemView::from).collect(),
        }
    }

    /// Process exit code: 0 when everything landed, 2 on partial success.
    pub fn exit_code(&self) -> i32 {
        match self.outcome {
            BatchOutcome::FullySucceeded => 0,
            BatchOutcome::PartiallySucceeded { .. } => 2,
            BatchOutcome::Failed => 1,
        }
    }
}
