// file: src/pipeline/fanout.rs
// description: bounded parallel dispatch of per-frame work with timeout and retry
// reference: buffer_unordered worker pool over spawned tasks

use crate::artifacts::{ScannedArtifact, ScopedWrite};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::models::{ArtifactKind, JobResult, WorkItem};
use crate::pipeline::progress::ProgressTracker;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinError;
use tracing::{debug, warn};

/// Work done for a single item. Outputs are published through
/// [`Attempt::publish`]; returns the published path.
#[async_trait]
pub trait ItemProcessor: Send + Sync + 'static {
    async fn process(&self, item: &WorkItem, attempt: &Attempt) -> Result<PathBuf>;
}

const LIVE: u8 = 0;
const PUBLISHING: u8 = 1;
const ABANDONED: u8 = 2;

/// One try at one item. Once abandoned by a timeout it can no longer
/// publish, and blocking work started through it is waited on before the
/// worker slot is reused.
#[derive(Debug, Clone)]
pub struct Attempt {
    state: Arc<AtomicU8>,
    blocking: Arc<RwLock<()>>,
}

impl Attempt {
    pub fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(LIVE)),
            blocking: Arc::new(RwLock::new(())),
        }
    }

    /// Run `work` on the blocking pool. The thread keeps running if the
    /// attempt is aborted, so it is tracked until it returns.
    pub async fn blocking<F, T>(&self, work: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let guard = Arc::clone(&self.blocking).read_owned().await;
        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            work()
        })
        .await
        .map_err(join_error)?
    }

    /// Commit `scoped` to its destination unless the attempt was abandoned.
    pub fn publish(&self, scoped: ScopedWrite) -> Result<PathBuf> {
        if self
            .state
            .compare_exchange(LIVE, PUBLISHING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(PipelineError::Worker(format!(
                "attempt abandoned before publishing {}",
                scoped.dest().display()
            )));
        }
        scoped.commit()
    }

    /// False when a publish already started; that commit is let through.
    fn abandon(&self) -> bool {
        self.state
            .compare_exchange(LIVE, ABANDONED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    async fn drained(&self) {
        let _idle = self.blocking.write().await;
    }
}

impl Default for Attempt {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct FanOut {
    workers: usize,
    timeout: Duration,
    max_retries: u32,
}

impl FanOut {
    pub fn new(workers: usize, timeout: Duration, max_retries: u32) -> Self {
        Self {
            workers: workers.max(1),
            timeout,
            max_retries,
        }
    }

    pub fn from_config(config: &PipelineConfig, workers: usize) -> Self {
        Self::new(workers, config.item_timeout(), config.max_retries)
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run every item through `processor`, at most `workers` at a time.
    /// Exactly one result per item, returned in index order.
    pub async fn run<P: ItemProcessor>(
        &self,
        processor: Arc<P>,
        items: Vec<WorkItem>,
        progress: &ProgressTracker,
    ) -> Vec<JobResult> {
        debug!(
            "Dispatching {} items across {} workers",
            items.len(),
            self.workers
        );

        let mut results: Vec<JobResult> = stream::iter(items.into_iter().map(|item| {
            let processor = Arc::clone(&processor);
            async move {
                let label = item.label();
                let result = self.run_item(processor, item).await;
                progress.record(&result, &label);
                result
            }
        }))
        .buffer_unordered(self.workers)
        .collect()
        .await;

        results.sort_by_key(|r| r.index());
        results
    }

    async fn run_item<P: ItemProcessor>(&self, processor: Arc<P>, item: WorkItem) -> JobResult {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.attempt(Arc::clone(&processor), item.clone()).await {
                Ok(output) => {
                    return JobResult::Success {
                        index: item.index,
                        output,
                    };
                }
                Err(e) if e.is_transient() && attempts <= self.max_retries => {
                    warn!(
                        "{} attempt {} failed, retrying: {}",
                        item.label(),
                        attempts,
                        e
                    );
                }
                Err(e) => {
                    return JobResult::Failure {
                        index: item.index,
                        input: item.input,
                        error: e.to_string(),
                        attempts,
                    };
                }
            }
        }
    }

    /// One attempt in its own task so a panic stays inside this item.
    /// Returns only after any blocking work it started has finished.
    async fn attempt<P: ItemProcessor>(&self, processor: Arc<P>, item: WorkItem) -> Result<PathBuf> {
        let attempt = Attempt::new();
        let task_attempt = attempt.clone();
        let mut handle = tokio::spawn(async move { processor.process(&item, &task_attempt).await });

        let result = match tokio::time::timeout(self.timeout, &mut handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(join_error(join)),
            Err(_) if attempt.abandon() => {
                // dropping the task's future kills any child process it owns
                handle.abort();
                Err(PipelineError::Timeout(self.timeout))
            }
            // commit already underway
            Err(_) => handle.await.map_err(join_error).and_then(|r| r),
        };

        attempt.drained().await;
        result
    }
}

/// One work item per input artifact, outputs named by the same index.
pub fn work_items(inputs: &[ScannedArtifact], out_dir: &Path, kind: ArtifactKind) -> Vec<WorkItem> {
    inputs
        .iter()
        .map(|a| WorkItem::new(a.index, a.path.clone(), kind.path_in(out_dir, a.index)))
        .collect()
}

pub fn join_error(err: JoinError) -> PipelineError {
    if err.is_panic() {
        let payload = err.into_panic();
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        PipelineError::Worker(format!("panicked: {}", message))
    } else {
        PipelineError::Worker(err.to_string())
    }
}
