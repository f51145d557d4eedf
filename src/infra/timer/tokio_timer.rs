//! In-process timer backend on the tokio runtime.
//!
//! Each registered task is one tokio task looping sleep → run. Runs of the
//! same task never overlap: the next delay is computed after the previous
//! run finishes. A semaphore bounds how many task bodies run at once across
//! the whole backend.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::{
    BackendSelection, CompiledTrigger, ScheduledTaskHandle, SchedulerError, TaskFn,
    TimerBackend, Trigger,
};

struct Job {
    handle: ScheduledTaskHandle,
    join: JoinHandle<()>,
}

#[derive(Default)]
struct TimerState {
    runtime: Option<Handle>,
    shutdown: Option<watch::Sender<bool>>,
    semaphore: Option<Arc<Semaphore>>,
    jobs: HashMap<String, Job>,
}

/// Timer backend spawning one tokio task per registered task.
pub struct TokioTimerBackend {
    max_concurrency: usize,
    state: Mutex<TimerState>,
}

impl std::fmt::Debug for TokioTimerBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TokioTimerBackend")
            .field("max_concurrency", &self.max_concurrency)
            .field("started", &state.runtime.is_some())
            .field("jobs", &state.jobs.len())
            .finish()
    }
}

impl Default for TokioTimerBackend {
    fn default() -> Self {
        Self::new(num_cpus::get().max(1) * 2)
    }
}

impl TokioTimerBackend {
    /// Backend running at most `max_concurrency` task bodies at once.
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
            state: Mutex::new(TimerState::default()),
        }
    }

    /// Concurrency bound.
    pub const fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Ids of registered tasks that have not finished.
    pub fn scheduled_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self
            .state
            .lock()
            .jobs
            .iter()
            .filter(|(_, job)| !job.join.is_finished())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// True between `start` and `stop`.
    pub fn is_started(&self) -> bool {
        self.state.lock().runtime.is_some()
    }
}

#[async_trait]
impl TimerBackend for TokioTimerBackend {
    async fn start(&self) -> Result<(), SchedulerError> {
        let mut state = self.state.lock();
        if state.runtime.is_some() {
            return Ok(());
        }
        let runtime = Handle::try_current()
            .map_err(|e| SchedulerError::Backend(format!("no tokio runtime: {e}")))?;
        let (shutdown, _) = watch::channel(false);
        state.runtime = Some(runtime);
        state.shutdown = Some(shutdown);
        state.semaphore = Some(Arc::new(Semaphore::new(self.max_concurrency)));
        info!(max_concurrency = self.max_concurrency, "timer backend started");
        Ok(())
    }

    async fn stop(&self, grace: Duration) {
        let (shutdown, jobs) = {
            let mut state = self.state.lock();
            state.runtime = None;
            state.semaphore = None;
            (state.shutdown.take(), std::mem::take(&mut state.jobs))
        };
        if let Some(shutdown) = shutdown {
            shutdown.send_replace(true);
        }

        let mut joins: Vec<_> = jobs.into_values().map(|job| job.join).collect();
        let total = joins.len();
        let drained =
            tokio::time::timeout(grace, futures::future::join_all(joins.iter_mut())).await;
        if drained.is_err() {
            let stragglers = joins.iter().filter(|j| !j.is_finished()).count();
            warn!(
                stragglers,
                grace_ms = grace.as_millis(),
                "timer tasks still running after grace period; aborting"
            );
            for join in &joins {
                join.abort();
            }
        }
        info!(tasks = total, "timer backend stopped");
    }

    fn schedule(
        &self,
        task: TaskFn,
        trigger: &Trigger,
        params: Value,
        id: &str,
    ) -> Result<ScheduledTaskHandle, SchedulerError> {
        let compiled = trigger.compile()?;
        let mut state = self.state.lock();
        let (Some(runtime), Some(shutdown), Some(semaphore)) = (
            state.runtime.clone(),
            state.shutdown.as_ref().map(watch::Sender::subscribe),
            state.semaphore.clone(),
        ) else {
            return Err(SchedulerError::BackendUnavailable(BackendSelection::Timer));
        };

        state.jobs.retain(|_, job| !job.join.is_finished());
        if let Some(previous) = state.jobs.remove(id) {
            previous.join.abort();
            debug!(task = id, "replacing scheduled task");
        }

        let handle = ScheduledTaskHandle::new(id);
        let join = runtime.spawn(run_task(
            id.to_string(),
            task,
            params,
            compiled,
            semaphore,
            shutdown,
        ));
        state.jobs.insert(
            id.to_string(),
            Job {
                handle: handle.clone(),
                join,
            },
        );
        Ok(handle)
    }

    fn cancel(&self, handle: &ScheduledTaskHandle) -> bool {
        let mut state = self.state.lock();
        let matches = state
            .jobs
            .get(handle.id())
            .is_some_and(|job| &job.handle == handle);
        if !matches {
            return false;
        }
        if let Some(job) = state.jobs.remove(handle.id()) {
            job.join.abort();
        }
        debug!(task = handle.id(), "scheduled task cancelled");
        true
    }

    async fn health_check(&self) -> Result<(), SchedulerError> {
        if self.is_started() {
            Ok(())
        } else {
            Err(SchedulerError::BackendUnavailable(BackendSelection::Timer))
        }
    }
}

async fn run_task(
    id: String,
    task: TaskFn,
    params: Value,
    trigger: CompiledTrigger,
    semaphore: Arc<Semaphore>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut runs: u64 = 0;
    while let Some(delay) = trigger.next_delay(runs, Utc::now()) {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => break,
        }
        let Ok(_permit) = Arc::clone(&semaphore).acquire_owned().await else {
            break;
        };
        task(params.clone()).await;
        runs += 1;
    }
    debug!(task = %id, runs, "timer task finished");
}
