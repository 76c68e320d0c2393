//! Bounded worker pool for sandboxed executions.
//!
//! A fixed number of workers drain a bounded queue; submission applies
//! back-pressure once all workers are busy and the queue is full. The pool is
//! deliberately small by default: each slot may pin a full CPU and 256 MiB in
//! the container runtime.
//!
//! Workers give no ordering guarantee across submissions. A panicking task is
//! contained at the worker boundary; its reply channel is dropped, which the
//! submitter observes as an internal failure.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::error::Error;

/// Default number of worker slots.
pub const DEFAULT_WORKERS: usize = 2;

/// Fixed-size pool running one handler function over queued messages.
pub struct WorkerPool<T> {
    tx: std::sync::Mutex<Option<mpsc::Sender<T>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Spawn `size` workers draining a queue of the same capacity.
    pub fn new<F, Fut>(size: usize, handler: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        assert!(size > 0, "worker pool requires at least one slot");

        let (tx, rx) = mpsc::channel(size);
        let rx = Arc::new(Mutex::new(rx));
        let handler = Arc::new(handler);

        let mut workers = Vec::with_capacity(size);
        for worker_id in 0..size {
            let rx = Arc::clone(&rx);
            let handler = Arc::clone(&handler);
            workers.push(tokio::spawn(async move {
                loop {
                    // Hold the receiver lock only while waiting for a message
                    // so sibling workers can take the next one immediately.
                    let msg = { rx.lock().await.recv().await };
                    let Some(msg) = msg else { break };

                    if AssertUnwindSafe(handler(msg)).catch_unwind().await.is_err() {
                        // The message's reply channel died with the task; the
                        // submitter sees that as an internal failure.
                        error!(worker_id, "pool task panicked");
                    }
                }
            }));
        }

        Self {
            tx: std::sync::Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
        }
    }

    /// Enqueue a message, waiting for a free slot.
    ///
    /// Returns an error without submitting if the token is cancelled first or
    /// the pool has been closed.
    pub async fn submit(&self, cancel: &CancellationToken, msg: T) -> Result<(), Error> {
        let tx = self
            .tx
            .lock()
            .expect("pool sender lock poisoned")
            .clone()
            .ok_or_else(|| Error::internal("pool.submit", "pool is closed"))?;

        tokio::select! {
            res = tx.send(msg) => {
                res.map_err(|_| Error::internal("pool.submit", "pool is closed"))
            }
            _ = cancel.cancelled() => {
                Err(Error::internal("pool.submit", "submission cancelled"))
            }
        }
    }

    /// Close the queue and wait for the workers to finish draining it.
    pub async fn close(&self) {
        drop(self.tx.lock().expect("pool sender lock poisoned").take());

        let mut workers = self.workers.lock().await;
        for handle in workers.drain(..) {
            let _ = handle.await;
        }
    }
}

impl<T> std::fmt::Debug for WorkerPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use tokio::sync::oneshot;

    use super::*;

    struct Job {
        reply: oneshot::Sender<usize>,
        value: usize,
        panic: bool,
    }

    fn job_pool(size: usize, counter: Arc<AtomicUsize>) -> WorkerPool<Job> {
        WorkerPool::new(size, move |job: Job| {
            let counter = Arc::clone(&counter);
            async move {
                if job.panic {
                    panic!("scripted panic");
                }
                counter.fetch_add(1, Ordering::SeqCst);
                let _ = job.reply.send(job.value * 2);
            }
        })
    }

    #[tokio::test]
    async fn runs_submitted_jobs() {
        let counter = Arc::new(AtomicUsize::new(0));
        let pool = job_pool(2, Arc::clone(&counter));
        let cancel = CancellationToken::new();

        let mut replies = Vec::new();
        for value in 0..8 {
            let (tx, rx) = oneshot::channel();
            pool.submit(&cancel, Job { reply: tx, value, panic: false })
                .await
                .unwrap();
            replies.push((value, rx));
        }

        for (value, rx) in replies {
            assert_eq!(rx.await.unwrap(), value * 2);
        }
        assert_eq!(counter.load(Ordering::SeqCst), 8);
        pool.close().await;
    }

    #[tokio::test]
    async fn cancelled_submission_does_not_enqueue() {
        // One worker parked on a job that never finishes, queue slot filled:
        // the next submit must block until the token fires.
        let pool: WorkerPool<oneshot::Sender<()>> = WorkerPool::new(1, |tx| async move {
            // Park forever; the test never completes this job.
            std::mem::forget(tx);
            std::future::pending::<()>().await;
        });
        let cancel = CancellationToken::new();

        let (tx1, _rx1) = oneshot::channel();
        pool.submit(&cancel, tx1).await.unwrap();
        let (tx2, _rx2) = oneshot::channel();
        pool.submit(&cancel, tx2).await.unwrap();

        let (tx3, _rx3) = oneshot::channel();
        let token = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });
        let err = pool.submit(&cancel, tx3).await.unwrap_err();
        assert!(err.is_internal());
    }

    #[tokio::test]
    async fn panicked_job_drops_reply_and_pool_survives() {
        let counter = Arc::new(AtomicUsize::new(0));
        let pool = job_pool(1, Arc::clone(&counter));
        let cancel = CancellationToken::new();

        let (tx, rx) = oneshot::channel();
        pool.submit(&cancel, Job { reply: tx, value: 1, panic: true })
            .await
            .unwrap();
        assert!(rx.await.is_err(), "reply channel should be dropped");

        // The worker keeps serving after the panic.
        let (tx, rx) = oneshot::channel();
        pool.submit(&cancel, Job { reply: tx, value: 3, panic: false })
            .await
            .unwrap();
        assert_eq!(rx.await.unwrap(), 6);
        pool.close().await;
    }

    #[tokio::test]
    async fn close_drains_queue_then_rejects() {
        let counter = Arc::new(AtomicUsize::new(0));
        let pool = job_pool(2, Arc::clone(&counter));
        let cancel = CancellationToken::new();

        for value in 0..4 {
            let (tx, _rx) = oneshot::channel();
            pool.submit(&cancel, Job { reply: tx, value, panic: false })
                .await
                .unwrap();
        }
        pool.close().await;
        assert_eq!(counter.load(Ordering::SeqCst), 4);

        let (tx, _rx) = oneshot::channel();
        let err = pool
            .submit(&cancel, Job { reply: tx, value: 0, panic: false })
            .await
            .unwrap_err();
        assert!(err.is_internal());
    }
}
