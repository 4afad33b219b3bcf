//! Minimal FIFO async task runner with concurrency exactly 1.
//!
//! An unbounded channel feeds a single worker task, so at most one
//! pushed task runs at any time and tasks run in push order. A failing
//! task does not stop the queue; its error reaches only the caller
//! awaiting that push. `reset` bumps an epoch so queued-but-unstarted
//! tasks are skipped when the worker reaches them.

use std::future::Future;
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use tokio::sync::{mpsc, oneshot};

use crate::error::{Result, SyncError};

type TaskFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<()>> + Send>;

struct Job {
    epoch: u64,
    run: TaskFn,
    done: oneshot::Sender<Result<()>>,
}

struct Shared {
    epoch: u64,
    depth: usize,
    idle_waiters: Vec<oneshot::Sender<()>>,
}

pub struct SerialQueue {
    jobs: mpsc::UnboundedSender<Job>,
    shared: Arc<Mutex<Shared>>,
}

impl Default for SerialQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialQueue {
    /// Creates the queue and spawns its worker. Must be called from
    /// within a tokio runtime.
    pub fn new() -> Self {
        let (jobs, mut rx) = mpsc::unbounded_channel::<Job>();
        let shared = Arc::new(Mutex::new(Shared {
            epoch: 0,
            depth: 0,
            idle_waiters: Vec::new(),
        }));

        let worker_shared = shared.clone();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let stale = worker_shared.lock().unwrap().epoch != job.epoch;
                if stale {
                    let _ = job.done.send(Err(SyncError::Cancelled));
                } else {
                    let result = (job.run)().await;
                    if let Err(e) = &result {
                        log::warn!("serial queue task failed: {e}");
                    }
                    let _ = job.done.send(result);
                }
                Self::finish_one(&worker_shared);
            }
        });

        Self { jobs, shared }
    }

    /// Appends a task. The returned future resolves when that task
    /// completes (or with [`SyncError::Cancelled`] if a reset discarded
    /// it first). Dropping the future detaches the task; it still runs.
    pub fn push<F, Fut>(&self, task: F) -> impl Future<Output = Result<()>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let (done, done_rx) = oneshot::channel();
        let epoch = {
            let mut shared = self.shared.lock().unwrap();
            shared.depth += 1;
            shared.epoch
        };
        let job = Job {
            epoch,
            run: Box::new(move || -> BoxFuture<'static, Result<()>> { Box::pin(task()) }),
            done,
        };
        if self.jobs.send(job).is_err() {
            // Worker gone; undo the depth bump so idleness stays accurate.
            Self::finish_one(&self.shared);
        }
        async move { done_rx.await.unwrap_or(Err(SyncError::Cancelled)) }
    }

    /// Discards every task that has not started yet. The running task
    /// finishes normally.
    pub fn reset(&self) {
        self.shared.lock().unwrap().epoch += 1;
    }

    /// Resolves once no task is running or queued.
    pub fn on_idle(&self) -> impl Future<Output = ()> {
        let waiter = {
            let mut shared = self.shared.lock().unwrap();
            if shared.depth == 0 {
                None
            } else {
                let (tx, rx) = oneshot::channel();
                shared.idle_waiters.push(tx);
                Some(rx)
            }
        };
        async move {
            if let Some(rx) = waiter {
                let _ = rx.await;
            }
        }
    }

    pub fn is_idle(&self) -> bool {
        self.shared.lock().unwrap().depth == 0
    }

    fn finish_one(shared: &Arc<Mutex<Shared>>) {
        let waiters = {
            let mut shared = shared.lock().unwrap();
            shared.depth -= 1;
            if shared.depth == 0 {
                std::mem::take(&mut shared.idle_waiters)
            } else {
                Vec::new()
            }
        };
        for waiter in waiters {
            let _ = waiter.send(());
        }
    }
}
