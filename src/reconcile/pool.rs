use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, Instrument, Span};

use crate::error::{BqdmError, Result};

/// Bounded set of worker tasks sharing one cancellation token.
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
}

/// A spawned per-resource operation awaiting collection.
pub struct Pending<T = ()> {
    pub label: String,
    handle: JoinHandle<Result<T>>,
}

#[derive(Debug)]
pub struct TaskFailure {
    pub label: String,
    pub error: BqdmError,
}

#[derive(Debug)]
pub struct PoolReport<T = ()> {
    pub completed: Vec<T>,
    pub failures: Vec<TaskFailure>,
}

impl<T> PoolReport<T> {
    pub fn total(&self) -> usize {
        self.completed.len() + self.failures.len()
    }

    /// The completed values, or [`BqdmError::Apply`] if any task failed.
    ///
    /// A lone failure is returned as-is so its cause stays visible.
    pub fn into_result(mut self) -> Result<Vec<T>> {
        let total = self.total();
        match self.failures.len() {
            0 => Ok(self.completed),
            1 if total == 1 => Err(self.failures.remove(0).error),
            failed => Err(BqdmError::Apply { failed, total }),
        }
    }
}

impl WorkerPool {
    pub fn new(parallelism: usize, cancel: CancellationToken) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(parallelism.max(1))),
            cancel,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run `task` once a permit is free, inside `span`.
    ///
    /// A task still queued when cancellation is requested never starts.
    pub fn spawn<T, F>(&self, label: impl Into<String>, span: Span, task: F) -> Pending<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let label = label.into();
        let permits = self.permits.clone();
        let cancel = self.cancel.clone();
        let queued = label.clone();

        let handle = tokio::spawn(
            async move {
                let _permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        return Err(BqdmError::Cancelled(queued));
                    }
                    permit = permits.acquire_owned() => permit
                        .map_err(|_| BqdmError::Task(format!("worker pool closed before {}", queued)))?,
                };
                task.await
            }
            .instrument(span),
        );

        Pending { label, handle }
    }

    /// Await every pending task, collecting failures without aborting siblings.
    pub async fn join_all<T>(pending: Vec<Pending<T>>) -> PoolReport<T> {
        let mut completed = Vec::with_capacity(pending.len());
        let mut failures = Vec::new();

        for Pending { label, handle } in pending {
            let outcome = match handle.await {
                Ok(result) => result,
                Err(e) => Err(BqdmError::Task(format!("{}: {}", label, e))),
            };
            match outcome {
                Ok(value) => completed.push(value),
                Err(error) => {
                    error!(resource = %label, error = %error, "Operation failed");
                    failures.push(TaskFailure { label, error });
                }
            }
        }

        PoolReport { completed, failures }
    }
}
