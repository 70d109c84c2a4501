//! Bounded worker pool
//!
//! A producer feeds file paths through a bounded channel to a fixed set of
//! workers. Each file is processed on the blocking thread pool. Results are
//! only handed back once every worker has finished.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Work done once per file. Runs on a blocking thread.
pub trait FileTask: Send + Sync + 'static {
    type Output: Send + 'static;

    fn run(&self, path: &Path) -> Result<Self::Output, String>;
}

#[derive(Debug)]
pub struct FileOutcome<O> {
    pub path: PathBuf,
    pub result: Result<O, String>,
}

#[derive(Debug)]
pub struct BatchReport<O> {
    /// In submission order; files skipped by cancellation are absent
    pub outcomes: Vec<FileOutcome<O>>,
    pub cancelled: bool,
}

impl<O> BatchReport<O> {
    pub fn failures(&self) -> impl Iterator<Item = &FileOutcome<O>> + '_ {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }

    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }
}

type Queue = Arc<Mutex<mpsc::Receiver<(usize, PathBuf)>>>;

pub struct BatchPool {
    workers: usize,
    cancel_token: CancellationToken,
}

impl BatchPool {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            cancel_token: CancellationToken::new(),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Token checked by workers between files
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    pub async fn run<T: FileTask>(&self, task: Arc<T>, files: Vec<PathBuf>) -> BatchReport<T::Output> {
        let total = files.len();
        let (tx, rx) = mpsc::channel(self.workers * 2);
        let queue: Queue = Arc::new(Mutex::new(rx));

        let producer_cancel = self.cancel_token.clone();
        let producer = tokio::spawn(async move {
            for item in files.into_iter().enumerate() {
                if producer_cancel.is_cancelled() || tx.send(item).await.is_err() {
                    break;
                }
            }
        });

        let handles: Vec<_> = (0..self.workers)
            .map(|worker| {
                let queue = queue.clone();
                let task = task.clone();
                let cancel = self.cancel_token.clone();
                tokio::spawn(Self::worker(worker, queue, task, cancel))
            })
            .collect();
        // Workers hold the only queue handles now, so the producer sees a
        // closed channel once they stop early.
        drop(queue);

        let mut indexed = Vec::with_capacity(total);
        for handle in handles {
            match handle.await {
                Ok(mut results) => indexed.append(&mut results),
                Err(e) => warn!(error = %e, "analysis worker failed"),
            }
        }
        if let Err(e) = producer.await {
            warn!(error = %e, "analysis producer failed");
        }

        indexed.sort_by_key(|(index, _)| *index);
        let outcomes: Vec<_> = indexed.into_iter().map(|(_, outcome)| outcome).collect();
        let cancelled = self.cancel_token.is_cancelled();
        debug!(total, processed = outcomes.len(), cancelled, "analysis batch finished");
        BatchReport { outcomes, cancelled }
    }

    async fn worker<T: FileTask>(
        worker: usize,
        queue: Queue,
        task: Arc<T>,
        cancel: CancellationToken,
    ) -> Vec<(usize, FileOutcome<T::Output>)> {
        let mut done = Vec::new();
        loop {
            if cancel.is_cancelled() {
                trace!(worker, "analysis worker cancelled");
                break;
            }
            let next = queue.lock().await.recv().await;
            let Some((index, path)) = next else { break };

            let task = task.clone();
            let job_path = path.clone();
            let result = tokio::task::spawn_blocking(move || task.run(&job_path))
                .await
                .unwrap_or_else(|e| Err(format!("analysis task panicked: {}", e)));
            done.push((index, FileOutcome { path, result }));
        }
        done
    }
}
