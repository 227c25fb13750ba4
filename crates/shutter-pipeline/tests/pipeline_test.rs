#[path = "helpers/mod.rs"]
mod helpers;

use helpers::fixtures::{photo, photos};
use helpers::{setup_pipeline, setup_pipeline_with, status_of, test_config, wait_for_status};
use helpers::fakes::ScriptedUploader;
use shutter_core::{FailureKind, TransferError, UploadStatus};
use shutter_pipeline::{BatchOutcome, SourceFile};

#[tokio::test]
async fn test_batch_of_five_uploads_and_commits_once() {
    let t = setup_pipeline().await;

    let result = t
        .pipeline
        .upload_all(photos(5), "listing-42")
        .await
        .expect("batch should commit");

    assert_eq!(result.report.accepted.len(), 5);
    assert_eq!(result.summary.succeeded, 5);
    assert_eq!(result.summary.outcome(), BatchOutcome::FullySucceeded);
    assert_eq!(result.urls.len(), 5);

    let receipt = result.receipt.expect("commit receipt");
    assert_eq!(receipt.attached, 5);

    let calls = t.committer.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "listing-42");
    assert_eq!(calls[0].1.len(), 5);
    assert!(calls[0].1.iter().all(|entry| entry.kind == "image"));

    assert!(t.pipeline.items().iter().all(|item| item.progress == 100));
    assert!(t.store.raw(&helpers::session_key()).await.is_none());
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let t = setup_pipeline().await;
    t.uploader.fail_with(
        "photo-0.jpg",
        vec![
            TransferError::from_status(503, "busy"),
            TransferError::Network("connection reset".into()),
        ],
    );

    let report = t.pipeline.submit(vec![photo(0)]).await;
    let summary = t.pipeline.run().await;

    assert_eq!(summary.succeeded, 1);
    let item = t.pipeline.item(report.accepted[0]).unwrap();
    assert_eq!(item.status, UploadStatus::Success);
    assert_eq!(item.retry_count, 2);
    assert_eq!(t.uploader.attempts("photo-0.jpg"), 3);
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let t = setup_pipeline().await;
    t.uploader.always_fail("photo-0.jpg");

    let report = t.pipeline.submit(photos(2)).await;
    let summary = t.pipeline.run().await;

    let failed = t.pipeline.item(report.accepted[0]).unwrap();
    assert_eq!(failed.status, UploadStatus::Error);
    assert_eq!(failed.retry_count, 3);
    assert_eq!(failed.error_kind, Some(FailureKind::TransferServer));
    assert_eq!(t.uploader.attempts("photo-0.jpg"), 4);

    assert_eq!(
        summary.outcome(),
        BatchOutcome::PartiallySucceeded {
            succeeded: 1,
            total: 2
        }
    );
    assert_eq!(summary.to_string(), "1 of 2 uploaded");
}

#[tokio::test]
async fn test_client_error_fails_fast_then_manual_retry_succeeds() {
    let t = setup_pipeline().await;
    t.uploader.fail_with(
        "photo-0.jpg",
        vec![TransferError::from_status(400, "bad request")],
    );

    let report = t.pipeline.submit(vec![photo(0)]).await;
    let id = report.accepted[0];
    t.pipeline.run().await;

    let item = t.pipeline.item(id).unwrap();
    assert_eq!(item.status, UploadStatus::Error);
    assert_eq!(item.error_kind, Some(FailureKind::TransferClient));
    assert_eq!(item.retry_count, 0);
    assert_eq!(t.uploader.attempts("photo-0.jpg"), 1);

    let retried = t.pipeline.retry_failed().await;
    assert_eq!(retried, vec![id]);
    assert_eq!(
        status_of(&t.pipeline.items(), id),
        Some(UploadStatus::Signing)
    );

    t.pipeline.run().await;
    let item = t.pipeline.item(id).unwrap();
    assert_eq!(item.status, UploadStatus::Success);
    assert!(item.error.is_none());
    // The still-fresh credential is reused.
    assert_eq!(t.credentials.single_calls(), 0);
}

#[tokio::test]
async fn test_credential_failure_marks_item() {
    let t = setup_pipeline().await;
    t.credentials.reject_singles();

    let report = t.pipeline.submit(vec![photo(0)]).await;
    let id = report.accepted[0];
    let object_id = t.pipeline.item(id).unwrap().object_id();
    t.credentials.poison([object_id]);

    t.pipeline.run().await;

    let item = t.pipeline.item(id).unwrap();
    assert_eq!(item.status, UploadStatus::Error);
    assert_eq!(item.error_kind, Some(FailureKind::CredentialFailure));
    assert_eq!(t.uploader.attempts("photo-0.jpg"), 0);
}

#[tokio::test]
async fn test_removing_in_flight_item_excludes_it_from_commit() {
    let t = setup_pipeline().await;
    t.uploader.block("photo-1.jpg");

    let report = t.pipeline.submit(photos(2)).await;
    let (kept, removed) = (report.accepted[0], report.accepted[1]);

    let runner = {
        let pipeline = t.pipeline.clone();
        tokio::spawn(async move { pipeline.run().await })
    };
    wait_for_status(&t.pipeline, removed, UploadStatus::Uploading).await;

    t.pipeline.remove(removed).await.unwrap();
    let summary = runner.await.unwrap();

    assert_eq!(summary.total, 1);
    assert_eq!(summary.deleted, 1);
    assert_eq!(summary.outcome(), BatchOutcome::FullySucceeded);
    assert_eq!(
        status_of(&t.pipeline.items(), removed),
        Some(UploadStatus::Deleted)
    );

    t.pipeline.commit("listing-42").await.unwrap();
    let calls = t.committer.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1.len(), 1);
    let kept_url = t.pipeline.item(kept).unwrap().final_url.unwrap();
    assert_eq!(calls[0].1[0].url, kept_url);
}

#[tokio::test]
async fn test_removing_finished_item_drops_it() {
    let t = setup_pipeline().await;
    let report = t.pipeline.submit(photos(2)).await;
    t.pipeline.run().await;

    t.pipeline.remove(report.accepted[0]).await.unwrap();

    assert_eq!(t.pipeline.items().len(), 1);
    let receipt = t.pipeline.commit("listing-42").await.unwrap();
    assert_eq!(receipt.attached, 1);
}

#[tokio::test]
async fn test_duplicate_files_are_skipped() {
    let t = setup_pipeline().await;

    let report = t.pipeline.submit(vec![photo(0), photo(0), photo(1)]).await;
    assert_eq!(report.accepted.len(), 2);
    assert_eq!(report.duplicates, vec!["photo-0.jpg".to_string()]);

    let renamed = SourceFile::new("copy.jpg", photo(1).data);
    let report = t.pipeline.submit(vec![renamed]).await;
    assert!(report.accepted.is_empty());
    assert_eq!(report.duplicates.len(), 1);
    assert_eq!(t.pipeline.items().len(), 2);
}

#[tokio::test]
async fn test_invalid_files_are_rejected_before_staging() {
    let t = setup_pipeline().await;

    let report = t
        .pipeline
        .submit(vec![
            SourceFile::new("notes.txt", b"hello".to_vec()),
            SourceFile::new("empty.jpg", Vec::new()),
            photo(0),
        ])
        .await;

    assert_eq!(report.accepted.len(), 1);
    assert_eq!(report.rejected.len(), 2);
    assert_eq!(t.pipeline.items().len(), 1);
}

#[tokio::test]
async fn test_pause_and_resume() {
    let t = setup_pipeline().await;
    t.uploader.block("photo-0.jpg");

    let report = t.pipeline.submit(vec![photo(0)]).await;
    let id = report.accepted[0];

    let runner = {
        let pipeline = t.pipeline.clone();
        tokio::spawn(async move { pipeline.run().await })
    };
    wait_for_status(&t.pipeline, id, UploadStatus::Uploading).await;

    assert_eq!(t.pipeline.pause().await, 1);
    runner.await.unwrap();

    let item = t.pipeline.item(id).unwrap();
    assert_eq!(item.status, UploadStatus::Paused);
    assert_eq!(item.retry_count, 0);
    assert!(t.pipeline.is_paused());

    // Runs are no-ops while paused.
    t.pipeline.run().await;
    assert_eq!(
        status_of(&t.pipeline.items(), id),
        Some(UploadStatus::Paused)
    );

    t.uploader.unblock("photo-0.jpg");
    assert_eq!(t.pipeline.resume().await, 1);
    assert!(!t.pipeline.is_paused());

    let summary = t.pipeline.run().await;
    assert_eq!(summary.succeeded, 1);
    assert_eq!(t.uploader.attempts("photo-0.jpg"), 2);
}

#[tokio::test]
async fn test_store_write_failures_do_not_fail_uploads() {
    let t = setup_pipeline().await;
    t.store.set_fail_writes(true);

    let result = t
        .pipeline
        .upload_all(photos(3), "listing-42")
        .await
        .expect("uploads proceed without a durable store");

    assert_eq!(result.summary.succeeded, 3);
    assert!(result.receipt.is_some());
}

#[tokio::test]
async fn test_compression_failure_falls_back_to_original() {
    let config = shutter_core::UploadConfig {
        compression_skip_threshold_bytes: 0,
        ..test_config()
    };
    let t = setup_pipeline_with(config, ScriptedUploader::default()).await;

    // Not a decodable image.
    let report = t.pipeline.submit(vec![photo(0)]).await;
    let id = report.accepted[0];
    t.pipeline.run().await;

    let item = t.pipeline.item(id).unwrap();
    assert_eq!(item.status, UploadStatus::Success);
    assert!(item.compressed_size.is_none());
    assert_eq!(t.uploader.uploaded(), vec![("photo-0.jpg".to_string(), 2048)]);

    let statuses: Vec<UploadStatus> = t
        .store
        .status_journal()
        .await
        .into_iter()
        .filter(|(item_id, _)| *item_id == id)
        .map(|(_, status)| status)
        .collect();
    assert_eq!(
        statuses,
        vec![
            UploadStatus::Compressing,
            UploadStatus::Pending,
            UploadStatus::Signing,
            UploadStatus::Uploading,
            UploadStatus::Success,
        ]
    );
}

#[tokio::test]
async fn test_large_images_are_compressed_before_upload() {
    let config = shutter_core::UploadConfig {
        compression_skip_threshold_bytes: 0,
        ..test_config()
    };
    let t = setup_pipeline_with(config, ScriptedUploader::default()).await;

    let png = helpers::fixtures::noisy_png(256, 256);
    let original_size = png.len();
    let report = t
        .pipeline
        .submit(vec![SourceFile::new("noise.png", png)])
        .await;
    let id = report.accepted[0];
    t.pipeline.run().await;

    let item = t.pipeline.item(id).unwrap();
    assert_eq!(item.status, UploadStatus::Success);
    assert!(item.preview_fingerprint.is_some());
    let compressed = item.compressed_size.expect("compressed size recorded");
    assert!((compressed as usize) < original_size);

    let uploaded = t.uploader.uploaded();
    assert_eq!(uploaded.len(), 1);
    assert_eq!(uploaded[0].1 as u64, compressed);
}

#[tokio::test]
async fn test_snapshots_are_published() {
    let t = setup_pipeline().await;
    let mut snapshots = t.pipeline.subscribe();

    t.pipeline.submit(vec![photo(0)]).await;
    assert!(snapshots.has_changed().unwrap());
    assert_eq!(snapshots.borrow_and_update().len(), 1);

    t.pipeline.run().await;
    let latest = snapshots.borrow_and_update().clone();
    assert_eq!(latest[0].status, UploadStatus::Success);
}
