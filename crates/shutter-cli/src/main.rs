//! Shutter CLI: resilient batch uploads from the command line.
//!
//! Configuration comes from SHUTTER_* environment variables (or a `.env`
//! file). Interrupting an upload with Ctrl-C pauses the batch; the session
//! is kept in the item store and `shutter status` shows where it stopped.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use shutter_cli::{
    build_deps, init_tracing, open_store, print_json, session_key, ItemView, UploadOutput,
};
use shutter_core::{SessionKey, UploadConfig};
use shutter_pipeline::{RecoveryPolicy, SourceFile, UploadPipeline};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "shutter", about = "Resilient batch image uploader")]
struct Cli {
    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SessionArgs {
    /// Acting user
    #[arg(long)]
    actor: String,
    /// Logical context of the batch (e.g. "listing")
    #[arg(long)]
    scope: String,
    /// Instance within the scope (e.g. a draft id)
    #[arg(long)]
    instance: Option<String>,
}

impl SessionArgs {
    fn key(&self) -> SessionKey {
        session_key(&self.actor, &self.scope, self.instance.as_deref())
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Upload files and attach them to a record
    Upload {
        #[command(flatten)]
        session: SessionArgs,
        /// Record the finished uploads are attached to
        #[arg(long)]
        record: String,
        /// Keep unfinished items of a previous run as errors instead of dropping them
        #[arg(long)]
        keep_unfinished: bool,
        /// Files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Show the persisted items of a session
    Status {
        #[command(flatten)]
        session: SessionArgs,
    },
    /// Remove sessions older than the retention window
    Compact {
        /// Override SHUTTER_SESSION_RETENTION_HOURS
        #[arg(long)]
        max_age_hours: Option<u64>,
    },
    /// Forget a session
    Clear {
        #[command(flatten)]
        session: SessionArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = UploadConfig::from_env().context("Invalid SHUTTER_* configuration")?;

    let code = match cli.command {
        Commands::Upload {
            session,
            record,
            keep_unfinished,
            files,
        } => {
            let recovery = if keep_unfinished {
                RecoveryPolicy::RequireReselect
            } else {
                RecoveryPolicy::Discard
            };
            upload(config, session.key(), &record, recovery, files).await?
        }
        Commands::Status { session } => {
            let key = session.key();
            let store = open_store(&config).await?;
            let items: Vec<ItemView> = store
                .get_session(&key)
                .await?
                .map(|record| record.items.iter().map(ItemView::from).collect())
                .unwrap_or_default();
            print_json(&serde_json::json!({ "session": key.to_string(), "items": items }))?;
            0
        }
        Commands::Compact { max_age_hours } => {
            let max_age_hours = max_age_hours.unwrap_or(config.session_retention_hours);
            let store = open_store(&config).await?;
            let removed = store.compact_old_sessions(max_age_hours).await?;
            print_json(&serde_json::json!({
                "removed": removed,
                "max_age_hours": max_age_hours,
                "backend": store.backend_type().to_string(),
            }))?;
            0
        }
        Commands::Clear { session } => {
            let key = session.key();
            let store = open_store(&config).await?;
            store.clear_session(&key).await?;
            print_json(&serde_json::json!({ "success": true, "session": key.to_string() }))?;
            0
        }
    };

    shutter_infra::shutdown_telemetry().await;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

async fn upload(
    config: UploadConfig,
    key: SessionKey,
    record: &str,
    recovery: RecoveryPolicy,
    paths: Vec<PathBuf>,
) -> anyhow::Result<i32> {
    let mut files = Vec::with_capacity(paths.len());
    for path in &paths {
        let file = SourceFile::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        files.push(file);
    }

    let deps = build_deps(&config).await?;
    let pipeline = Arc::new(UploadPipeline::open(key.clone(), config, deps, recovery).await?);

    let interrupt = {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, pausing uploads");
                pipeline.pause().await;
            }
        })
    };
    let progress = spawn_progress_logger(&pipeline);

    let result = pipeline.upload_all(files, record).await;
    interrupt.abort();
    progress.abort();
    pipeline.shutdown();

    let result = result?;
    let output = UploadOutput::new(&key, &result, &pipeline.items());
    print_json(&output)?;
    Ok(output.exit_code())
}

/// Log a line whenever the number of settled items changes.
fn spawn_progress_logger(pipeline: &UploadPipeline) -> tokio::task::JoinHandle<()> {
    let mut snapshots = pipeline.subscribe();
    tokio::spawn(async move {
        let mut last_settled = 0;
        while snapshots.changed().await.is_ok() {
            let (settled, total) = {
                let items = snapshots.borrow_and_update();
                let settled = items.iter().filter(|i| i.status.is_terminal()).count();
                (settled, items.len())
            };
            if settled != last_settled {
                last_settled = settled;
                tracing::info!(settled, total, "Upload progress");
            }
        }
    })
}
