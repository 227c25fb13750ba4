#[path = "helpers/mod.rs"]
mod helpers;

use helpers::fakes::ScriptedUploader;
use helpers::fixtures::photos;
use helpers::{setup_pipeline_with, test_config};
use shutter_core::{ConnectionClass, NetworkHints, TransferError, UploadConfig, UploadStatus};
use std::time::Duration;

fn config_for(connection: ConnectionClass) -> UploadConfig {
    UploadConfig {
        network_hints: NetworkHints {
            effective_type: Some(connection),
            ..NetworkHints::default()
        },
        ..test_config()
    }
}

#[tokio::test]
async fn test_transfers_respect_the_fast_link_ceiling() {
    let t = setup_pipeline_with(
        config_for(ConnectionClass::FourG),
        ScriptedUploader::with_latency(Duration::from_millis(30)),
    )
    .await;

    t.pipeline.submit(photos(10)).await;
    let summary = t.pipeline.run().await;

    assert_eq!(summary.succeeded, 10);
    assert!(t.uploader.peak() <= 4, "peak was {}", t.uploader.peak());
    assert!(t.uploader.peak() > 1);
}

#[tokio::test]
async fn test_slow_links_upload_one_at_a_time() {
    let t = setup_pipeline_with(
        config_for(ConnectionClass::Slow2g),
        ScriptedUploader::with_latency(Duration::from_millis(10)),
    )
    .await;

    t.pipeline.submit(photos(4)).await;
    let summary = t.pipeline.run().await;

    assert_eq!(summary.succeeded, 4);
    assert_eq!(t.uploader.peak(), 1);
}

#[tokio::test]
async fn test_manual_retry_respects_the_transfer_ceiling() {
    let t = setup_pipeline_with(
        config_for(ConnectionClass::Slow2g),
        ScriptedUploader::default(),
    )
    .await;
    let files = photos(5);
    for file in &files {
        t.uploader.fail_with(
            &file.file_name,
            vec![TransferError::from_status(400, "bad request")],
        );
    }
    t.pipeline.submit(files).await;
    assert_eq!(t.pipeline.run().await.failed, 5);

    assert_eq!(t.pipeline.retry_failed().await.len(), 5);
    let uploading = |items: &[shutter_core::UploadItem]| {
        items
            .iter()
            .filter(|item| item.status == UploadStatus::Uploading)
            .count()
    };
    assert_eq!(uploading(t.pipeline.items().as_slice()), 0);

    let mut snapshots = t.pipeline.subscribe();
    let watcher = tokio::spawn(async move {
        let mut peak = 0;
        loop {
            let (now, done) = {
                let items = snapshots.borrow_and_update();
                let now = uploading(items.as_slice());
                let done = items.iter().all(|item| item.status == UploadStatus::Success);
                (now, done)
            };
            peak = peak.max(now);
            if done || snapshots.changed().await.is_err() {
                return peak;
            }
        }
    });

    let summary = t.pipeline.run().await;
    assert_eq!(summary.succeeded, 5);

    let peak = tokio::time::timeout(Duration::from_secs(2), watcher)
        .await
        .expect("watcher finished")
        .unwrap();
    assert!(peak <= 1, "{} items uploading at once", peak);
    assert_eq!(t.uploader.peak(), 1);
}

#[tokio::test]
async fn test_failed_credential_chunks_fall_back_to_single_fetches() {
    let config = UploadConfig {
        credential_chunk_size: 8,
        ..config_for(ConnectionClass::FourG)
    };
    let t = setup_pipeline_with(config, ScriptedUploader::default()).await;

    t.pipeline.submit(photos(16)).await;
    let first_chunk: Vec<String> = t
        .pipeline
        .items()
        .iter()
        .take(8)
        .map(|item| item.object_id())
        .collect();
    t.credentials.poison(first_chunk);

    let summary = t.pipeline.run().await;

    assert_eq!(summary.succeeded, 16);
    assert_eq!(t.credentials.single_calls(), 8);
    // Failed chunk: first attempt plus three retries. Healthy chunk: once.
    assert_eq!(t.credentials.batch_calls(), 5);
}

#[tokio::test]
async fn test_concurrent_runs_do_not_duplicate_work() {
    let t = setup_pipeline_with(test_config(), ScriptedUploader::default()).await;
    t.pipeline.submit(photos(3)).await;

    let (a, b) = tokio::join!(t.pipeline.run(), t.pipeline.run());

    assert_eq!(a.succeeded, 3);
    assert_eq!(b.succeeded, 3);
    for i in 0..3 {
        assert_eq!(t.uploader.attempts(&format!("photo-{}.jpg", i)), 1);
    }
    assert!(t
        .pipeline
        .items()
        .iter()
        .all(|item| item.status == UploadStatus::Success));
}
