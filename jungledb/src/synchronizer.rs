//! A single-lane FIFO executor (spec.md §4.9). `push` enqueues a zero-arg
//! operation; a single background task drains the queue in order, so
//! operations that must not interleave with each other — even under
//! cooperative scheduling — are serialized without callers blocking a
//! shared lock across an `await`.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{CResult, Error};

/// Serializes otherwise racy critical sections behind one FIFO lane. Boxed
/// closures are drained one at a time on a dedicated task; each submitter
/// gets its own result back through a `oneshot`.
pub struct Synchronizer {
    sender: mpsc::UnboundedSender<(Box<dyn FnOnce() + Send>,)>,
    worker: JoinHandle<()>,
}

impl Synchronizer {
    pub fn new() -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<(Box<dyn FnOnce() + Send>,)>();
        let worker = tokio::spawn(async move {
            while let Some((job,)) = receiver.recv().await {
                job();
            }
        });
        Self { sender, worker }
    }

    /// Enqueues `op`, running it on the synchronizer's single lane once
    /// every job ahead of it has finished, and returns its result.
    pub async fn push<F, R>(&self, op: F) -> CResult<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Box<dyn FnOnce() + Send> = Box::new(move || {
            let _ = reply_tx.send(op());
        });
        self.sender.send((job,)).map_err(|_| Error::Internal("synchronizer worker is gone".into()))?;
        reply_rx.await.map_err(|_| Error::Internal("synchronizer dropped the job before it ran".into()))
    }

    /// Stops accepting new work and waits for the queue to drain.
    pub async fn shutdown(self) {
        drop(self.sender);
        let _ = self.worker.await;
    }
}

impl Default for Synchronizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn runs_jobs_in_submission_order() {
        let sync = Synchronizer::new();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..5 {
            let order = Arc::clone(&order);
            handles.push(sync.push(move || order.lock().unwrap().push(i)));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn surfaces_job_results() {
        let sync = Synchronizer::new();
        let counter = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&counter);
        let result = sync.push(move || c.fetch_add(1, Ordering::SeqCst) + 1).await.unwrap();
        assert_eq!(result, 1);
    }
}
