//! In-memory durable queue for tests and single-process deployments.
//!
//! Nothing survives a restart; use [`super::FileDurableQueue`] when it must.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use super::QueuedJob;
use crate::core::{DurableQueueBackend, SchedulerError};

/// FIFO queue of workflow jobs with a depth limit.
#[derive(Debug)]
pub struct InMemoryDurableQueue {
    max_depth: usize,
    jobs: Mutex<VecDeque<QueuedJob>>,
}

impl Default for InMemoryDurableQueue {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl InMemoryDurableQueue {
    /// Create a queue holding at most `max_depth` jobs.
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth: max_depth.max(1),
            jobs: Mutex::new(VecDeque::new()),
        }
    }

    /// Depth limit.
    pub const fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Jobs waiting for a worker.
    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    /// True if no job is waiting.
    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }

    /// Waiting jobs, oldest first.
    pub fn jobs(&self) -> Vec<QueuedJob> {
        self.jobs.lock().iter().cloned().collect()
    }

    /// Take the oldest job (worker side).
    pub fn dequeue(&self) -> Option<QueuedJob> {
        self.jobs.lock().pop_front()
    }
}

#[async_trait]
impl DurableQueueBackend for InMemoryDurableQueue {
    async fn enqueue(
        &self,
        name: &str,
        payload: &Value,
        provider: Option<&str>,
    ) -> Result<String, SchedulerError> {
        let mut jobs = self.jobs.lock();
        if jobs.len() >= self.max_depth {
            return Err(SchedulerError::Backend(format!(
                "durable queue full ({} jobs)",
                self.max_depth
            )));
        }
        let job = QueuedJob::new(name, payload, provider);
        let job_id = job.job_id.clone();
        jobs.push_back(job);
        debug!(job_id = %job_id, workflow = name, "workflow enqueued");
        Ok(job_id)
    }
}
