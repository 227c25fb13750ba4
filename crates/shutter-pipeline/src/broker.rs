//! Credential broker
//!
//! Prefetches signed credentials in fixed-size chunks issued in parallel and
//! merges whatever succeeded into a per-object cache. Anything missing (failed
//! chunk, item added later, stale credential) is fetched lazily one at a time.

use chrono::Utc;
use futures::future::join_all;
use shutter_core::{Credential, CredentialError, CredentialSource};
use shutter_infra::RetryController;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct CredentialBroker {
    source: Arc<dyn CredentialSource>,
    retry: RetryController,
    session_id: String,
    chunk_size: usize,
    validity: Duration,
    cache: Mutex<HashMap<String, Credential>>,
}

impl CredentialBroker {
    pub fn new(
        source: Arc<dyn CredentialSource>,
        retry: RetryController,
        session_id: impl Into<String>,
        chunk_size: usize,
        validity: Duration,
    ) -> Self {
        Self {
            source,
            retry,
            session_id: session_id.into(),
            chunk_size: chunk_size.max(1),
            validity,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<String, Credential>> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Batched prefetch. Returns how many of `object_ids` now have a fresh
    /// credential cached. Chunk failures are logged and otherwise ignored.
    #[tracing::instrument(skip(self, object_ids), fields(session = %self.session_id, count = object_ids.len()))]
    pub async fn prefetch(&self, object_ids: &[String]) -> usize {
        let wanted: Vec<String> = object_ids
            .iter()
            .filter(|id| self.cached(id).is_none())
            .cloned()
            .collect();
        if wanted.is_empty() {
            return object_ids.len();
        }

        // Prefetch is not tied to any single item, so nothing cancels it.
        let never = &CancellationToken::new();
        let requests = wanted.chunks(self.chunk_size).map(move |chunk| async move {
            let result = self
                .retry
                .run_simple(never, |_| self.source.fetch_batch(&self.session_id, chunk))
                .await;
            (chunk, result)
        });

        let mut failed_chunks = 0;
        for (chunk, result) in join_all(requests).await {
            match result {
                Ok(credentials) => {
                    let mut cache = self.cache();
                    for credential in credentials {
                        cache.insert(credential.object_id.clone(), credential);
                    }
                }
                Err(e) => {
                    failed_chunks += 1;
                    tracing::warn!(
                        chunk_size = chunk.len(),
                        error = %e,
                        "Credential chunk failed, items will be signed lazily"
                    );
                }
            }
        }

        let ready = object_ids.iter().filter(|id| self.cached(id).is_some()).count();
        tracing::debug!(ready, failed_chunks, "Credential prefetch finished");
        ready
    }

    /// Cached credential for `object_id`, if still within its validity window.
    pub fn cached(&self, object_id: &str) -> Option<Credential> {
        let mut cache = self.cache();
        match cache.get(object_id) {
            Some(credential) if credential.is_fresh(self.validity, Utc::now()) => {
                Some(credential.clone())
            }
            Some(_) => {
                tracing::debug!(object_id, "Dropping stale credential");
                cache.remove(object_id);
                None
            }
            None => None,
        }
    }

    /// Single lazy fetch, one attempt. The result is cached.
    pub async fn fetch_one(&self, object_id: &str) -> Result<Credential, CredentialError> {
        let credential = self.source.fetch_one(&self.session_id, object_id).await?;
        self.cache()
            .insert(credential.object_id.clone(), credential.clone());
        Ok(credential)
    }

    /// Forget a credential the object store refused.
    pub fn invalidate(&self, object_id: &str) {
        self.cache().remove(object_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use shutter_core::TransferError;
    use shutter_infra::RetryPolicy;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeSource {
        fail_ids: Vec<String>,
        batch_calls: AtomicUsize,
        single_calls: AtomicUsize,
        issued_at: i64,
    }

    impl FakeSource {
        fn new(fail_ids: &[&str]) -> Self {
            Self {
                fail_ids: fail_ids.iter().map(|s| s.to_string()).collect(),
                batch_calls: AtomicUsize::new(0),
                single_calls: AtomicUsize::new(0),
                issued_at: Utc::now().timestamp(),
            }
        }

        fn credential(&self, object_id: &str) -> Credential {
            Credential {
                account_id: "acct".into(),
                timestamp: self.issued_at,
                folder: "f".into(),
                object_id: object_id.into(),
                signature: "sig".into(),
                upload_endpoint: "https://store.test".into(),
            }
        }
    }

    #[async_trait]
    impl CredentialSource for FakeSource {
        async fn fetch_batch(
            &self,
            _session_id: &str,
            object_ids: &[String],
        ) -> Result<Vec<Credential>, CredentialError> {
            self.batch_calls.fetch_add(1, Ordering::SeqCst);
            if object_ids.iter().any(|id| self.fail_ids.contains(id)) {
                return Err(CredentialError::Transport(TransferError::from_status(
                    503, "down",
                )));
            }
            Ok(object_ids.iter().map(|id| self.credential(id)).collect())
        }

        async fn fetch_one(
            &self,
            _session_id: &str,
            object_id: &str,
        ) -> Result<Credential, CredentialError> {
            self.single_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.credential(object_id))
        }
    }

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("obj-{:02}", i)).collect()
    }

    fn broker(source: Arc<FakeSource>, validity: Duration) -> CredentialBroker {
        CredentialBroker::new(
            source,
            RetryController::new(RetryPolicy::immediate(1)),
            "session",
            4,
            validity,
        )
    }

    #[tokio::test]
    async fn test_prefetch_chunks_requests() {
        let source = Arc::new(FakeSource::new(&[]));
        let broker = broker(Arc::clone(&source), Duration::from_secs(600));

        assert_eq!(broker.prefetch(&ids(10)).await, 10);
        assert_eq!(source.batch_calls.load(Ordering::SeqCst), 3);

        // Already cached: no further requests.
        assert_eq!(broker.prefetch(&ids(10)).await, 10);
        assert_eq!(source.batch_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_failed_chunk_leaves_gaps() {
        let source = Arc::new(FakeSource::new(&["obj-01"]));
        let broker = broker(Arc::clone(&source), Duration::from_secs(600));

        assert_eq!(broker.prefetch(&ids(8)).await, 4);
        assert!(broker.cached("obj-01").is_none());
        assert!(broker.cached("obj-05").is_some());
        // Failing chunk attempted twice (one retry), healthy chunk once.
        assert_eq!(source.batch_calls.load(Ordering::SeqCst), 3);

        let credential = broker.fetch_one("obj-01").await.unwrap();
        assert_eq!(credential.object_id, "obj-01");
        assert!(broker.cached("obj-01").is_some());
    }

    #[tokio::test]
    async fn test_stale_credentials_are_not_served() {
        let source = Arc::new(FakeSource::new(&[]));
        let broker = broker(Arc::clone(&source), Duration::ZERO);

        assert_eq!(broker.prefetch(&ids(2)).await, 0);
        assert!(broker.cached("obj-00").is_none());
    }

    #[tokio::test]
    async fn test_invalidate() {
        let source = Arc::new(FakeSource::new(&[]));
        let broker = broker(source, Duration::from_secs(600));
        broker.fetch_one("obj-00").await.unwrap();
        broker.invalidate("obj-00");
        assert!(broker.cached("obj-00").is_none());
    }
}
