//! Bounded worker pool for send tasks
//!
//! `size` workers pull jobs from a queue of capacity `size`. Submitting to a
//! full queue waits for a free slot, which is the back-pressure the report
//! timer sees. [`WorkerPool::shutdown`] closes the queue and waits until
//! every job already queued has run.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, trace};

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Returned when submitting to a pool that is shutting down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolClosed;

impl std::fmt::Display for PoolClosed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "worker pool is closed")
    }
}

impl std::error::Error for PoolClosed {}

pub struct WorkerPool {
    sender: Option<mpsc::Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `size` workers (at least one) on the current runtime
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let (sender, receiver) = mpsc::channel::<Job>(size);
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..size)
            .map(|worker| {
                let receiver = receiver.clone();
                tokio::spawn(async move {
                    loop {
                        // hold the lock only while waiting for the next job
                        let job = receiver.lock().await.recv().await;
                        match job {
                            Some(job) => {
                                trace!(worker, "running job");
                                job.await;
                            }
                            None => break,
                        }
                    }
                    trace!(worker, "worker stopped");
                })
            })
            .collect();

        debug!("worker pool started with {} workers", size);

        Self {
            sender: Some(sender),
            workers,
        }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Queue `job`, waiting while the queue is full
    pub async fn submit<F>(&self, job: F) -> Result<(), PoolClosed>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let sender = self.sender.as_ref().ok_or(PoolClosed)?;
        sender.send(Box::pin(job)).await.map_err(|_| PoolClosed)
    }

    /// Close the queue and wait for all queued and running jobs
    pub async fn shutdown(mut self) {
        // dropping the only sender lets recv() drain and then return None
        self.sender.take();

        for result in join_all(self.workers.drain(..)).await {
            if let Err(e) = result {
                error!("worker panicked: {}", e);
            }
        }

        debug!("worker pool drained");
    }
}
