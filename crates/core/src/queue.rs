use crate::error::Result;
use crate::models::JobDescriptor;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tracing::debug;

/// Durable FIFO handoff between the upload side and the workers.
///
/// Delivery is at-least-once: a job checked out by a worker that crashes
/// may be redelivered, so everything downstream must be idempotent per
/// `document_id`. Implementations are constructed and injected at startup
/// rather than reached through globals, so tests can substitute fakes.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: JobDescriptor) -> Result<()>;

    /// Block up to `timeout` for the next job; `None` on timeout.
    async fn dequeue(&self, timeout: Duration) -> Result<Option<JobDescriptor>>;

    async fn len(&self) -> usize;
}

/// In-process FIFO queue. The capability boundary matches a durable
/// broker; durability itself is the deployment's property, not the
/// pipeline's.
#[derive(Default)]
pub struct MemoryJobQueue {
    jobs: Mutex<VecDeque<JobDescriptor>>,
    notify: Notify,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, job: JobDescriptor) -> Result<()> {
        debug!(document_id = %job.document_id, "job enqueued");
        self.jobs.lock().await.push_back(job);
        self.notify.notify_one();
        Ok(())
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<JobDescriptor>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(job) = self.jobs.lock().await.pop_front() {
                return Ok(Some(job));
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            // notify_one stores a permit, so a wakeup that races the pop
            // above is not lost.
            let _ = tokio::time::timeout(deadline - now, self.notify.notified()).await;
        }
    }

    async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }
}
