//! File-backed durable queue.
//!
//! Jobs are appended to `<dir>/<stream>.jsonl` as JSON lines. Pending jobs
//! are reloaded on `start`, so a job accepted before a restart is still
//! there afterwards until a worker acknowledges it.

use std::collections::VecDeque;
use std::fs::{OpenOptions, create_dir_all};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info};

use super::QueuedJob;
use crate::core::{BackendSelection, DurableQueueBackend, SchedulerError};

/// JSON-lines queue that survives process restarts.
#[derive(Debug)]
pub struct FileDurableQueue {
    dir: PathBuf,
    stream: String,
    started: AtomicBool,
    jobs: Mutex<VecDeque<QueuedJob>>,
}

impl FileDurableQueue {
    /// Queue persisted under `dir`. Nothing touches the disk until `start`.
    pub fn new(dir: impl AsRef<Path>, stream: impl Into<String>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            stream: stream.into(),
            started: AtomicBool::new(false),
            jobs: Mutex::new(VecDeque::new()),
        }
    }

    /// Path of the backing file.
    pub fn file_path(&self) -> PathBuf {
        self.dir.join(format!("{}.jsonl", self.stream))
    }

    /// Jobs not yet acknowledged, oldest first.
    pub fn pending(&self) -> Vec<QueuedJob> {
        self.jobs.lock().iter().cloned().collect()
    }

    /// Remove a finished job. Returns false if the id is unknown.
    pub fn acknowledge(&self, job_id: &str) -> Result<bool, SchedulerError> {
        let mut jobs = self.jobs.lock();
        let before = jobs.len();
        jobs.retain(|job| job.job_id != job_id);
        if jobs.len() == before {
            return Ok(false);
        }
        self.rewrite_disk(&jobs)?;
        debug!(job_id, "job acknowledged");
        Ok(true)
    }

    fn load_from_disk(&self) -> Result<VecDeque<QueuedJob>, SchedulerError> {
        let file_path = self.file_path();
        let mut jobs = VecDeque::new();
        if !file_path.exists() {
            return Ok(jobs);
        }
        let file = OpenOptions::new()
            .read(true)
            .open(&file_path)
            .map_err(io_error)?;
        for line in BufReader::new(file).lines() {
            let line = line.map_err(io_error)?;
            if line.trim().is_empty() {
                continue;
            }
            let job: QueuedJob = serde_json::from_str(&line)
                .map_err(|e| SchedulerError::Backend(format!("corrupt queue line: {e}")))?;
            jobs.push_back(job);
        }
        Ok(jobs)
    }

    fn append_to_disk(&self, job: &QueuedJob) -> Result<(), SchedulerError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.file_path())
            .map_err(io_error)?;
        let line = serde_json::to_string(job).map_err(|e| SchedulerError::Backend(e.to_string()))?;
        writeln!(file, "{line}").map_err(io_error)
    }

    fn rewrite_disk(&self, jobs: &VecDeque<QueuedJob>) -> Result<(), SchedulerError> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(self.file_path())
            .map_err(io_error)?;
        for job in jobs {
            let line =
                serde_json::to_string(job).map_err(|e| SchedulerError::Backend(e.to_string()))?;
            writeln!(file, "{line}").map_err(io_error)?;
        }
        Ok(())
    }
}

#[allow(clippy::needless_pass_by_value)]
fn io_error(err: std::io::Error) -> SchedulerError {
    SchedulerError::Backend(format!("durable queue io: {err}"))
}

#[async_trait]
impl DurableQueueBackend for FileDurableQueue {
    async fn start(&self) -> Result<(), SchedulerError> {
        create_dir_all(&self.dir).map_err(io_error)?;
        let loaded = self.load_from_disk()?;
        let pending = loaded.len();
        *self.jobs.lock() = loaded;
        self.started.store(true, Ordering::Release);
        info!(path = %self.file_path().display(), pending, "file durable queue started");
        Ok(())
    }

    async fn stop(&self) {
        self.started.store(false, Ordering::Release);
    }

    async fn enqueue(
        &self,
        name: &str,
        payload: &Value,
        provider: Option<&str>,
    ) -> Result<String, SchedulerError> {
        if !self.started.load(Ordering::Acquire) {
            return Err(SchedulerError::BackendUnavailable(
                BackendSelection::DurableQueue,
            ));
        }
        let job = QueuedJob::new(name, payload, provider);
        let mut jobs = self.jobs.lock();
        self.append_to_disk(&job)?;
        let job_id = job.job_id.clone();
        jobs.push_back(job);
        debug!(job_id = %job_id, workflow = name, "workflow persisted");
        Ok(job_id)
    }

    async fn health_check(&self) -> Result<(), SchedulerError> {
        if !self.started.load(Ordering::Acquire) {
            return Err(SchedulerError::BackendUnavailable(
                BackendSelection::DurableQueue,
            ));
        }
        if self.dir.is_dir() {
            Ok(())
        } else {
            Err(SchedulerError::Backend(format!(
                "queue directory {} is gone",
                self.dir.display()
            )))
        }
    }
}
