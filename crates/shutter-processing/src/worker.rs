//! Compression worker pool
//!
//! Image re-encoding runs on dedicated OS threads so the orchestrating task
//! never blocks on it. Callers talk to the pool through a small
//! request/response protocol: every request carries a task id, the worker
//! echoes it back, and the caller enforces a wall-clock timeout on the reply.

use bytes::Bytes;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::oneshot;

use shutter_core::NetworkProfile;

/// Target encoding requested from the compressor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetEncoding {
    Jpeg,
    Png,
    /// JPEG unless the image carries meaningful transparency.
    Auto,
}

/// Parameters for one compression job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionPolicy {
    pub max_dimension: u32,
    pub quality: u8,
    pub encoding: TargetEncoding,
}

impl CompressionPolicy {
    pub fn from_profile(profile: &NetworkProfile) -> Self {
        Self {
            max_dimension: profile.max_dimension,
            quality: profile.quality,
            encoding: TargetEncoding::Auto,
        }
    }
}

/// Successful worker output.
#[derive(Debug, Clone)]
pub struct CompressedImage {
    pub data: Bytes,
    pub content_type: String,
    pub extension: String,
    pub original_size: u64,
    pub compressed_size: u64,
    pub width: u32,
    pub height: u32,
}

impl CompressedImage {
    /// Compressed size as a fraction of the original.
    pub fn ratio(&self) -> f64 {
        if self.original_size == 0 {
            return 1.0;
        }
        self.compressed_size as f64 / self.original_size as f64
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompressionFailure {
    #[error("Compression worker did not respond within {0:?}")]
    TimedOut(Duration),

    #[error("Compression failed: {0}")]
    Worker(String),

    #[error("Compression worker pool is unavailable")]
    Unavailable,

    #[error("Compression worker answered task {got} while {expected} was pending")]
    ProtocolMismatch { expected: u64, got: u64 },
}

struct WorkerRequest {
    task_id: u64,
    data: Bytes,
    policy: CompressionPolicy,
    reply: oneshot::Sender<WorkerResponse>,
}

struct WorkerResponse {
    task_id: u64,
    result: Result<CompressedImage, String>,
}

type Job = Arc<dyn Fn(&[u8], &CompressionPolicy) -> Result<CompressedImage, String> + Send + Sync>;

/// Pool of compression threads fed from one shared queue.
///
/// A worker that misses the timeout keeps running its job, so the pool
/// spawns a replacement and the stalled thread exits once its abandoned job
/// returns. At most `workers` replacements are outstanding at a time.
pub struct CompressionWorkerPool {
    sender: Mutex<Option<mpsc::Sender<WorkerRequest>>>,
    receiver: Arc<Mutex<mpsc::Receiver<WorkerRequest>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    job: Job,
    workers: usize,
    live: Arc<AtomicUsize>,
    surplus: Arc<AtomicUsize>,
    spawned: AtomicUsize,
    next_task_id: AtomicU64,
    timeout: Duration,
}

impl CompressionWorkerPool {
    pub fn new(workers: usize, timeout: Duration) -> Self {
        Self::with_job(workers, timeout, Arc::new(run_job))
    }

    fn with_job(workers: usize, timeout: Duration, job: Job) -> Self {
        let (sender, receiver) = mpsc::channel::<WorkerRequest>();
        let pool = Self {
            sender: Mutex::new(Some(sender)),
            receiver: Arc::new(Mutex::new(receiver)),
            handles: Mutex::new(Vec::new()),
            job,
            workers: workers.max(1),
            live: Arc::new(AtomicUsize::new(0)),
            surplus: Arc::new(AtomicUsize::new(0)),
            spawned: AtomicUsize::new(0),
            next_task_id: AtomicU64::new(1),
            timeout,
        };

        for _ in 0..pool.workers {
            pool.spawn_worker();
        }
        if pool.live_workers() == 0 {
            pool.sender
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .take();
        }

        tracing::debug!(workers = pool.live_workers(), ?timeout, "Compression worker pool started");
        pool
    }

    fn spawn_worker(&self) -> bool {
        let index = self.spawned.fetch_add(1, Ordering::Relaxed);
        let receiver = Arc::clone(&self.receiver);
        let job = Arc::clone(&self.job);
        let live = Arc::clone(&self.live);
        let surplus = Arc::clone(&self.surplus);

        live.fetch_add(1, Ordering::SeqCst);
        let spawned = std::thread::Builder::new()
            .name(format!("shutter-compress-{}", index))
            .spawn({
                let live = Arc::clone(&live);
                move || {
                    worker_loop(receiver, job, surplus);
                    live.fetch_sub(1, Ordering::SeqCst);
                }
            });

        match spawned {
            Ok(handle) => {
                self.handles
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .push(handle);
                true
            }
            Err(e) => {
                live.fetch_sub(1, Ordering::SeqCst);
                tracing::error!(error = %e, "Failed to spawn compression worker");
                false
            }
        }
    }

    /// Threads currently serving the queue, including stalled ones.
    pub fn live_workers(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    fn replace_stalled_worker(&self) {
        let reserved = self
            .surplus
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < self.workers).then_some(n + 1)
            })
            .is_ok();
        if !reserved {
            tracing::warn!(workers = self.workers, "Too many stalled compression workers, not replacing");
            return;
        }
        if !self.spawn_worker() {
            self.surplus.fetch_sub(1, Ordering::SeqCst);
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Submit one job and wait for its reply, bounded by the pool timeout.
    pub async fn compress(
        &self,
        data: Bytes,
        policy: CompressionPolicy,
    ) -> Result<CompressedImage, CompressionFailure> {
        let task_id = self.next_task_id.fetch_add(1, Ordering::Relaxed);
        let (reply, response) = oneshot::channel();

        {
            let guard = self
                .sender
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let sender = guard.as_ref().ok_or(CompressionFailure::Unavailable)?;
            sender
                .send(WorkerRequest {
                    task_id,
                    data,
                    policy,
                    reply,
                })
                .map_err(|_| CompressionFailure::Unavailable)?;
        }

        // A late reply lands on a dropped receiver and is discarded.
        let response = match tokio::time::timeout(self.timeout, response).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => return Err(CompressionFailure::Unavailable),
            Err(_) => {
                tracing::warn!(task_id, timeout = ?self.timeout, "Compression worker timed out");
                self.replace_stalled_worker();
                return Err(CompressionFailure::TimedOut(self.timeout));
            }
        };

        if response.task_id != task_id {
            return Err(CompressionFailure::ProtocolMismatch {
                expected: task_id,
                got: response.task_id,
            });
        }

        response.result.map_err(CompressionFailure::Worker)
    }

    /// Stop accepting work and join the worker threads once their current job
    /// finishes.
    pub fn shutdown(&self) {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        drop(sender);

        let handles = std::mem::take(
            &mut *self
                .handles
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        for handle in handles {
            if handle.join().is_err() {
                tracing::warn!("Compression worker exited with a panic");
            }
        }
    }
}

impl Drop for CompressionWorkerPool {
    fn drop(&mut self) {
        // Closing the channel ends each worker loop; threads are detached.
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
    }
}

fn worker_loop(
    receiver: Arc<Mutex<mpsc::Receiver<WorkerRequest>>>,
    job: Job,
    surplus: Arc<AtomicUsize>,
) {
    loop {
        let request = {
            let guard = receiver
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.recv()
        };

        let Ok(request) = request else {
            break;
        };

        let result = job(&request.data, &request.policy);
        let delivered = request
            .reply
            .send(WorkerResponse {
                task_id: request.task_id,
                result,
            })
            .is_ok();

        // The caller gave up on this job; retire if a replacement took our slot.
        if !delivered
            && surplus
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            tracing::debug!("Stalled compression worker retired");
            break;
        }
    }
}

#[cfg(feature = "image")]
fn run_job(data: &[u8], policy: &CompressionPolicy) -> Result<CompressedImage, String> {
    crate::compression::ImageCompressor::compress(data, policy).map_err(|e| e.to_string())
}

#[cfg(not(feature = "image"))]
fn run_job(_data: &[u8], _policy: &CompressionPolicy) -> Result<CompressedImage, String> {
    Err("image support is not compiled in".to_string())
}
