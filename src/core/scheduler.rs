//! Unified scheduler: one entry point over the in-process timer, the durable
//! queue and the DAG orchestrator.
//!
//! Callers either pick a backend explicitly (`schedule_internal_task`,
//! `enqueue_workflow`, `schedule_deployment`) or describe the task and let
//! [`classify`] pick one (`submit`). Hand-offs to the external backends run
//! under circuit breakers owned by the scheduler's [`ErrorRecoveryManager`];
//! failed hand-offs archived in the dead-letter queue carry enough context to
//! be replayed by the drain maintenance task.
//!
//! Startup is best effort: a backend that fails to start is reported and
//! skipped, and submissions routed to it fail with
//! [`SchedulerError::BackendUnavailable`] while the others keep working.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::core::{
    AppResult, AuditSink, BackendSelection, CircuitBreakerError, CircuitBreakerSnapshot,
    CircuitState, DagOrchestratorBackend, DeadLetterContext, DeadLetterEntry, DeadLetterProcessResult,
    DeadLetterQueue, DeadLetterStats, DeploymentSchedule, DurableQueueBackend, ErrorRecoveryManager,
    MaintenanceHooks, NoopMaintenanceHooks, ScheduledTaskHandle, SchedulerError,
    TaskCharacteristics, TaskExecutor, TaskFn, TimerBackend, Trigger, build_audit_event,
    classify, task_fn,
};

/// Breaker (and dead-letter operation) name for durable-queue hand-offs.
pub const DURABLE_QUEUE_OPERATION: &str = "durable_queue.enqueue";
/// Breaker (and dead-letter operation) name for DAG deployment hand-offs.
pub const DAG_DEPLOYMENT_OPERATION: &str = "dag_orchestrator.create_deployment";
/// Dead-letter context key holding the [`ReplayableSubmission`].
pub const SUBMISSION_CONTEXT_KEY: &str = "submission";

/// Prefix of the scheduler's own timer task ids and breaker names.
/// Caller-supplied timer ids may not use it.
pub const MAINTENANCE_PREFIX: &str = "maintenance.";

/// Maintenance task ids, also used as `maintenance.<id>` breaker names.
const HEALTH_PROBE: &str = "health_probe";
const METRICS_SNAPSHOT: &str = "metrics_snapshot";
const CLEANUP: &str = "cleanup";
const DEAD_LETTER_DRAIN: &str = "dead_letter_drain";
const CREDENTIAL_ROTATION: &str = "credential_rotation";

/// Availability of one backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BackendStatus {
    /// Started and passing health checks.
    Available,
    /// Failed to start, failed a health check, or the scheduler is stopped.
    Unavailable {
        /// Last failure.
        reason: String,
    },
}

impl BackendStatus {
    /// True for [`BackendStatus::Available`].
    pub const fn is_available(&self) -> bool {
        matches!(self, Self::Available)
    }

    fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }
}

/// Outcome of [`UnifiedScheduler::start`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartReport {
    /// Backends that came up.
    pub available: Vec<BackendSelection>,
    /// Backends that did not, with the failure.
    pub unavailable: BTreeMap<BackendSelection, String>,
}

impl StartReport {
    /// True if at least one backend is down.
    pub fn is_degraded(&self) -> bool {
        !self.unavailable.is_empty()
    }

    /// True if `backend` came up.
    pub fn is_available(&self, backend: BackendSelection) -> bool {
        self.available.contains(&backend)
    }
}

/// Answer to a health-status query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    /// Whether the scheduler is started.
    pub running: bool,
    /// Availability per backend.
    pub backends: BTreeMap<BackendSelection, BackendStatus>,
    /// Stored state per breaker.
    pub circuit_breakers: BTreeMap<String, CircuitState>,
    /// Fraction of breakers that are CLOSED.
    pub health_score: f64,
    /// Entries parked in the dead-letter queue.
    pub dead_letter_count: usize,
}

/// Periodic capture of resilience and backend state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// When the snapshot was taken.
    pub captured_at: DateTime<Utc>,
    /// Backend availability.
    pub backends: BTreeMap<BackendSelection, bool>,
    /// Every breaker with its counters.
    pub circuit_breakers: Vec<CircuitBreakerSnapshot>,
    /// Dead-letter statistics.
    pub dead_letters: DeadLetterStats,
}

/// A task handed to [`UnifiedScheduler::submit`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSubmission {
    /// Task name; also the timer id, workflow name or deployment name.
    pub name: String,
    /// Payload (timer params, workflow payload or deployment parameters).
    #[serde(default)]
    pub payload: Value,
    /// Recurrence for timer tasks and deployments.
    #[serde(default)]
    pub trigger: Option<Trigger>,
    /// Queue provider hint for durable workflows.
    #[serde(default)]
    pub provider: Option<String>,
}

impl TaskSubmission {
    /// Submission with a payload and nothing else.
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
            trigger: None,
            provider: None,
        }
    }

    /// Set the trigger.
    #[must_use]
    pub fn with_trigger(mut self, trigger: Trigger) -> Self {
        self.trigger = Some(trigger);
        self
    }

    /// Set the provider hint.
    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }
}

/// What a submission turned into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "kebab-case")]
pub enum SubmissionHandle {
    /// Registered with the in-process timer.
    Timer {
        /// Timer handle, usable with [`UnifiedScheduler::unschedule`].
        handle: ScheduledTaskHandle,
    },
    /// Enqueued on the durable queue.
    DurableQueue {
        /// Queue job id.
        job_id: String,
    },
    /// Created as a DAG deployment.
    DagOrchestrator {
        /// Orchestrator deployment id.
        deployment_id: String,
    },
}

impl SubmissionHandle {
    /// Backend the submission went to.
    pub const fn backend(&self) -> BackendSelection {
        match self {
            Self::Timer { .. } => BackendSelection::Timer,
            Self::DurableQueue { .. } => BackendSelection::DurableQueue,
            Self::DagOrchestrator { .. } => BackendSelection::DagOrchestrator,
        }
    }
}

impl fmt::Display for SubmissionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timer { handle } => write!(f, "timer:{handle}"),
            Self::DurableQueue { job_id } => write!(f, "job:{job_id}"),
            Self::DagOrchestrator { deployment_id } => write!(f, "deployment:{deployment_id}"),
        }
    }
}

/// External hand-off stored in a dead-letter entry so the drain can replay it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplayableSubmission {
    /// `enqueue_workflow` call.
    Workflow {
        /// Workflow name.
        name: String,
        /// Workflow payload.
        payload: Value,
        /// Provider hint.
        provider: Option<String>,
    },
    /// `schedule_deployment` call.
    Deployment {
        /// Deployment name.
        name: String,
        /// Deployment schedule.
        schedule: DeploymentSchedule,
    },
}

impl ReplayableSubmission {
    /// Backend the hand-off targets.
    pub const fn backend(&self) -> BackendSelection {
        match self {
            Self::Workflow { .. } => BackendSelection::DurableQueue,
            Self::Deployment { .. } => BackendSelection::DagOrchestrator,
        }
    }

    /// Breaker name the hand-off runs under.
    pub const fn operation_name(&self) -> &'static str {
        match self {
            Self::Workflow { .. } => DURABLE_QUEUE_OPERATION,
            Self::Deployment { .. } => DAG_DEPLOYMENT_OPERATION,
        }
    }

    /// Read the submission back out of a dead-letter entry.
    pub fn from_entry(entry: &DeadLetterEntry) -> Result<Self, SchedulerError> {
        let value = entry.context.get(SUBMISSION_CONTEXT_KEY).ok_or_else(|| {
            SchedulerError::InvalidInput(format!(
                "dead-letter entry {} has no `{SUBMISSION_CONTEXT_KEY}` context",
                entry.id
            ))
        })?;
        serde_json::from_value(value.clone()).map_err(|e| {
            SchedulerError::InvalidInput(format!(
                "dead-letter entry {} has a malformed submission: {e}",
                entry.id
            ))
        })
    }

    fn name(&self) -> &str {
        match self {
            Self::Workflow { name, .. } | Self::Deployment { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Stopped,
    /// `start` is in progress or was abandoned mid-way; `stop` still tears down.
    Starting,
    Running,
}

/// Everything a scheduler is assembled from.
pub(crate) struct SchedulerComponents {
    pub config: SchedulerConfig,
    pub timer: Arc<dyn TimerBackend>,
    pub durable: Arc<dyn DurableQueueBackend>,
    pub dag: Arc<dyn DagOrchestratorBackend>,
    pub recovery: Arc<ErrorRecoveryManager>,
    pub executor: Option<Arc<dyn TaskExecutor>>,
    pub hooks: Arc<dyn MaintenanceHooks>,
    pub audit: Option<Box<dyn AuditSink>>,
}

struct SchedulerInner {
    config: SchedulerConfig,
    timer: Arc<dyn TimerBackend>,
    durable: Arc<dyn DurableQueueBackend>,
    dag: Arc<dyn DagOrchestratorBackend>,
    recovery: Arc<ErrorRecoveryManager>,
    executor: Option<Arc<dyn TaskExecutor>>,
    hooks: Arc<dyn MaintenanceHooks>,
    lifecycle: tokio::sync::Mutex<Lifecycle>,
    running: AtomicBool,
    availability: RwLock<BTreeMap<BackendSelection, BackendStatus>>,
    maintenance: Mutex<Vec<ScheduledTaskHandle>>,
    audit: Option<Mutex<Box<dyn AuditSink>>>,
    last_metrics: Mutex<Option<MetricsSnapshot>>,
}

/// Facade over the three backends plus the resilience layer.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct UnifiedScheduler {
    inner: Arc<SchedulerInner>,
}

impl fmt::Debug for UnifiedScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnifiedScheduler")
            .field("running", &self.is_running())
            .field("backends", &*self.inner.availability.read())
            .field("recovery", &self.inner.recovery)
            .finish_non_exhaustive()
    }
}

impl UnifiedScheduler {
    /// Scheduler over the given backends with a recovery manager built from
    /// `config.resilience`, no task executor and no-op maintenance hooks.
    pub fn new(
        config: SchedulerConfig,
        timer: Arc<dyn TimerBackend>,
        durable: Arc<dyn DurableQueueBackend>,
        dag: Arc<dyn DagOrchestratorBackend>,
    ) -> Self {
        let recovery = Arc::new(ErrorRecoveryManager::new(
            config.resilience.circuit_breaker(),
            DeadLetterQueue::new(config.resilience.dead_letter_max_size),
            config.resilience.dead_letter_policy,
        ));
        Self::from_components(SchedulerComponents {
            config,
            timer,
            durable,
            dag,
            recovery,
            executor: None,
            hooks: Arc::new(NoopMaintenanceHooks),
            audit: None,
        })
    }

    pub(crate) fn from_components(parts: SchedulerComponents) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                config: parts.config,
                timer: parts.timer,
                durable: parts.durable,
                dag: parts.dag,
                recovery: parts.recovery,
                executor: parts.executor,
                hooks: parts.hooks,
                lifecycle: tokio::sync::Mutex::new(Lifecycle::Stopped),
                running: AtomicBool::new(false),
                availability: RwLock::new(BTreeMap::new()),
                maintenance: Mutex::new(Vec::new()),
                audit: parts.audit.map(Mutex::new),
                last_metrics: Mutex::new(None),
            }),
        }
    }

    /// Configuration in force.
    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// The recovery manager shared by every protected operation.
    pub fn recovery(&self) -> &Arc<ErrorRecoveryManager> {
        &self.inner.recovery
    }

    /// Whether `start` has completed and `stop` has not been called since.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Whether `backend` is currently accepting work.
    pub fn is_available(&self, backend: BackendSelection) -> bool {
        self.inner.ensure_available(backend).is_ok()
    }

    /// Start all three backends concurrently and register maintenance tasks.
    ///
    /// Each backend gets `startup_timeout` to come up; one that errors or
    /// times out is reported as unavailable and the rest keep going.
    /// Maintenance tasks are only registered if the timer came up. Calling
    /// `start` on a running scheduler returns the current availability.
    pub async fn start(&self) -> StartReport {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        if *lifecycle == Lifecycle::Running {
            debug!("unified scheduler already running");
            return self.inner.start_report();
        }
        *lifecycle = Lifecycle::Starting;

        let timeout = self.inner.config.startup_timeout();
        let (timer, durable, dag) = tokio::join!(
            bounded(BackendSelection::Timer, timeout, self.inner.timer.start()),
            bounded(
                BackendSelection::DurableQueue,
                timeout,
                self.inner.durable.start()
            ),
            bounded(
                BackendSelection::DagOrchestrator,
                timeout,
                self.inner.dag.start()
            ),
        );

        {
            let mut availability = self.inner.availability.write();
            for (backend, result) in [
                (BackendSelection::Timer, timer),
                (BackendSelection::DurableQueue, durable),
                (BackendSelection::DagOrchestrator, dag),
            ] {
                let status = match result {
                    Ok(()) => {
                        info!(backend = %backend, "backend started");
                        BackendStatus::Available
                    }
                    Err(err) => {
                        warn!(backend = %backend, error = %err, "backend failed to start");
                        BackendStatus::unavailable(err.to_string())
                    }
                };
                availability.insert(backend, status);
            }
        }
        self.inner.running.store(true, Ordering::Release);

        if self.inner.ensure_available(BackendSelection::Timer).is_ok() {
            self.register_maintenance_tasks();
        } else {
            warn!("timer backend unavailable; maintenance tasks not registered");
        }

        *lifecycle = Lifecycle::Running;
        let report = self.inner.start_report();
        info!(
            available = ?report.available,
            unavailable = report.unavailable.len(),
            "unified scheduler started"
        );
        report
    }

    /// Cancel maintenance and timer tasks, then release every backend.
    ///
    /// Waits at most `shutdown_grace` for running timer bodies and for each
    /// external client to shut down. Work already handed to the durable
    /// queue or DAG orchestrator is left alone. No-op when stopped.
    pub async fn stop(&self) {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        if *lifecycle == Lifecycle::Stopped {
            debug!("unified scheduler already stopped");
            return;
        }
        self.inner.running.store(false, Ordering::Release);

        let handles = std::mem::take(&mut *self.inner.maintenance.lock());
        for handle in &handles {
            self.inner.timer.cancel(handle);
        }

        let grace = self.inner.config.shutdown_grace();
        self.inner.timer.stop(grace).await;
        let (durable, dag) = tokio::join!(
            tokio::time::timeout(grace, self.inner.durable.stop()),
            tokio::time::timeout(grace, self.inner.dag.stop()),
        );
        if durable.is_err() {
            warn!(backend = %BackendSelection::DurableQueue, "backend did not stop within grace period");
        }
        if dag.is_err() {
            warn!(backend = %BackendSelection::DagOrchestrator, "backend did not stop within grace period");
        }

        self.inner.availability.write().clear();
        *lifecycle = Lifecycle::Stopped;
        info!("unified scheduler stopped");
    }

    /// Register `task` with the timer backend under `id`, bypassing
    /// classification. Ids starting with [`MAINTENANCE_PREFIX`] are
    /// reserved and rejected.
    pub fn schedule_internal_task(
        &self,
        task: TaskFn,
        trigger: &Trigger,
        params: Value,
        id: &str,
    ) -> Result<ScheduledTaskHandle, SchedulerError> {
        if id.trim().is_empty() {
            return Err(SchedulerError::InvalidInput("task id must not be empty".into()));
        }
        if id.starts_with(MAINTENANCE_PREFIX) {
            return Err(SchedulerError::InvalidInput(format!(
                "task id `{id}` uses the reserved `{MAINTENANCE_PREFIX}` prefix"
            )));
        }
        self.inner.ensure_available(BackendSelection::Timer)?;
        let handle = self.inner.timer.schedule(task, trigger, params, id)?;
        debug!(task = id, %trigger, "internal task scheduled");
        Ok(handle)
    }

    /// Cancel a timer task. Returns false if the handle is unknown.
    pub fn unschedule(&self, handle: &ScheduledTaskHandle) -> bool {
        self.inner.timer.cancel(handle)
    }

    /// Hand a workflow to the durable queue; returns the job id.
    pub async fn enqueue_workflow(
        &self,
        name: &str,
        payload: Value,
        provider: Option<&str>,
    ) -> Result<String, SchedulerError> {
        require_name(name)?;
        self.inner.ensure_available(BackendSelection::DurableQueue)?;
        self.inner
            .hand_off(ReplayableSubmission::Workflow {
                name: name.to_string(),
                payload,
                provider: provider.map(str::to_string),
            })
            .await
    }

    /// Create a DAG deployment; returns the deployment id.
    pub async fn schedule_deployment(
        &self,
        name: &str,
        schedule: DeploymentSchedule,
    ) -> Result<String, SchedulerError> {
        require_name(name)?;
        if let Some(trigger) = &schedule.trigger {
            trigger.compile()?;
        }
        self.inner.ensure_available(BackendSelection::DagOrchestrator)?;
        self.inner
            .hand_off(ReplayableSubmission::Deployment {
                name: name.to_string(),
                schedule,
            })
            .await
    }

    /// Classify the task and dispatch it to the selected backend.
    ///
    /// Timer-class tasks run through the registered [`TaskExecutor`] under
    /// the breaker `task.<name>`; without a trigger they run once, right
    /// away. Submitting a timer task under a name that is already scheduled
    /// replaces it.
    pub async fn submit(
        &self,
        characteristics: &TaskCharacteristics,
        submission: TaskSubmission,
    ) -> Result<SubmissionHandle, SchedulerError> {
        require_name(&submission.name)?;
        let backend = classify(characteristics);
        let name = submission.name.clone();
        info!(task = %name, backend = %backend, "task routed");

        let result = match backend {
            BackendSelection::Timer => self
                .submit_timer_task(submission)
                .map(|handle| SubmissionHandle::Timer { handle }),
            BackendSelection::DurableQueue => self
                .enqueue_workflow(
                    &submission.name,
                    submission.payload,
                    submission.provider.as_deref(),
                )
                .await
                .map(|job_id| SubmissionHandle::DurableQueue { job_id }),
            BackendSelection::DagOrchestrator => self
                .schedule_deployment(
                    &submission.name,
                    DeploymentSchedule {
                        trigger: submission.trigger,
                        parameters: submission.payload,
                    },
                )
                .await
                .map(|deployment_id| SubmissionHandle::DagOrchestrator { deployment_id }),
        };

        self.inner.audit(&name, backend, &result);
        result
    }

    fn submit_timer_task(
        &self,
        submission: TaskSubmission,
    ) -> Result<ScheduledTaskHandle, SchedulerError> {
        let executor = self.inner.executor.clone().ok_or_else(|| {
            SchedulerError::InvalidInput(format!(
                "no task executor registered for timer task `{}`",
                submission.name
            ))
        })?;
        let trigger = submission
            .trigger
            .unwrap_or(Trigger::once(Duration::ZERO));
        let recovery = Arc::clone(&self.inner.recovery);
        let name = submission.name.clone();
        let operation = format!("task.{name}");

        let body = task_fn(move |params| {
            let executor = Arc::clone(&executor);
            let recovery = Arc::clone(&recovery);
            let name = name.clone();
            let operation = operation.clone();
            async move {
                let outcome = recovery
                    .execute_with_circuit_breaker(&operation, || executor.execute(&name, params))
                    .await;
                match outcome {
                    Ok(()) => debug!(task = %name, "timer task run complete"),
                    Err(err) if err.is_circuit_open() => {
                        debug!(task = %name, "timer task run skipped, circuit open");
                    }
                    Err(err) => warn!(task = %name, error = %err, "timer task run failed"),
                }
            }
        });
        self.schedule_internal_task(body, &trigger, submission.payload, &submission.name)
    }

    /// Run `operation` under the scheduler's breaker named `name`.
    pub async fn execute_with_circuit_breaker<F, Fut, T, E>(
        &self,
        name: &str,
        operation: F,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display + 'static,
    {
        self.inner
            .recovery
            .execute_with_circuit_breaker(name, operation)
            .await
    }

    /// Dead-letter queue statistics.
    pub fn get_dead_letter_queue_stats(&self) -> DeadLetterStats {
        self.inner.recovery.get_dead_letter_queue_stats()
    }

    /// Replay archived durable-queue and DAG hand-offs once.
    ///
    /// This is the body of the drain maintenance task, exposed so operators
    /// can trigger a pass without waiting for the next tick.
    pub async fn drain_dead_letters(&self) -> DeadLetterProcessResult {
        self.inner.drain_dead_letters().await
    }

    /// Per-backend availability and per-breaker state.
    pub fn health_status(&self) -> HealthReport {
        let running = self.is_running();
        let backends = {
            let availability = self.inner.availability.read();
            BackendSelection::ALL
                .into_iter()
                .map(|backend| {
                    let status = availability
                        .get(&backend)
                        .cloned()
                        .unwrap_or_else(|| BackendStatus::unavailable("scheduler not running"));
                    (backend, status)
                })
                .collect()
        };
        let recovery = &self.inner.recovery;
        HealthReport {
            running,
            backends,
            circuit_breakers: recovery.circuit_breaker_states(),
            health_score: recovery.health_score(),
            dead_letter_count: recovery.dead_letter_queue().len(),
        }
    }

    /// Snapshot stored by the last metrics maintenance tick.
    pub fn metrics_snapshot(&self) -> Option<MetricsSnapshot> {
        self.inner.last_metrics.lock().clone()
    }

    /// Capture a snapshot now, without storing it.
    pub fn capture_metrics(&self) -> MetricsSnapshot {
        self.inner.capture_metrics()
    }

    fn register_maintenance_tasks(&self) {
        let maintenance = self.inner.config.maintenance.clone();
        let weak = Arc::downgrade(&self.inner);
        let tasks: [(&'static str, Trigger, TaskFn); 5] = [
            (
                HEALTH_PROBE,
                Trigger::interval(Duration::from_secs(maintenance.health_probe_interval_secs)),
                maintenance_task(weak.clone(), HEALTH_PROBE, |inner| async move {
                    inner.probe_backends().await
                }),
            ),
            (
                METRICS_SNAPSHOT,
                Trigger::interval(Duration::from_secs(maintenance.metrics_interval_secs)),
                maintenance_task(weak.clone(), METRICS_SNAPSHOT, |inner| async move {
                    inner.record_metrics();
                    Ok(())
                }),
            ),
            (
                CLEANUP,
                Trigger::interval(Duration::from_secs(maintenance.cleanup_interval_secs)),
                maintenance_task(weak.clone(), CLEANUP, |inner| async move {
                    inner.cleanup().await
                }),
            ),
            (
                DEAD_LETTER_DRAIN,
                Trigger::interval(Duration::from_secs(
                    maintenance.dead_letter_drain_interval_secs,
                )),
                maintenance_task(weak.clone(), DEAD_LETTER_DRAIN, |inner| async move {
                    inner.drain_dead_letters().await;
                    Ok(())
                }),
            ),
            (
                CREDENTIAL_ROTATION,
                Trigger::cron(maintenance.credential_rotation_cron),
                maintenance_task(weak, CREDENTIAL_ROTATION, |inner| async move {
                    inner.hooks.check_credential_rotation().await
                }),
            ),
        ];

        let mut registered = Vec::with_capacity(tasks.len());
        for (id, trigger, body) in tasks {
            let task_id = format!("{MAINTENANCE_PREFIX}{id}");
            match self.inner.timer.schedule(body, &trigger, Value::Null, &task_id) {
                Ok(handle) => {
                    debug!(task = %task_id, %trigger, "maintenance task registered");
                    registered.push(handle);
                }
                Err(err) => warn!(task = %task_id, error = %err, "maintenance task not registered"),
            }
        }
        *self.inner.maintenance.lock() = registered;
    }
}

impl SchedulerInner {
    fn ensure_available(&self, backend: BackendSelection) -> Result<(), SchedulerError> {
        let available = self.running.load(Ordering::Acquire)
            && self
                .availability
                .read()
                .get(&backend)
                .is_some_and(BackendStatus::is_available);
        if available {
            Ok(())
        } else {
            Err(SchedulerError::BackendUnavailable(backend))
        }
    }

    fn set_status(&self, backend: BackendSelection, status: BackendStatus) {
        if !self.running.load(Ordering::Acquire) {
            return;
        }
        self.availability.write().insert(backend, status);
    }

    fn start_report(&self) -> StartReport {
        let mut report = StartReport::default();
        for (backend, status) in self.availability.read().iter() {
            match status {
                BackendStatus::Available => report.available.push(*backend),
                BackendStatus::Unavailable { reason } => {
                    report.unavailable.insert(*backend, reason.clone());
                }
            }
        }
        report
    }

    async fn dispatch(&self, submission: &ReplayableSubmission) -> Result<String, SchedulerError> {
        let backend = submission.backend();
        let call = async {
            match submission {
                ReplayableSubmission::Workflow {
                    name,
                    payload,
                    provider,
                } => self.durable.enqueue(name, payload, provider.as_deref()).await,
                ReplayableSubmission::Deployment { name, schedule } => {
                    self.dag.create_deployment(name, schedule).await
                }
            }
        };
        tokio::time::timeout(self.config.submission_timeout(), call)
            .await
            .unwrap_or_else(|_| Err(SchedulerError::Timeout(backend)))
    }

    async fn hand_off(&self, submission: ReplayableSubmission) -> Result<String, SchedulerError> {
        let mut context = DeadLetterContext::new();
        match serde_json::to_value(&submission) {
            Ok(value) => {
                context.insert(SUBMISSION_CONTEXT_KEY.to_string(), value);
            }
            Err(err) => {
                warn!(task = submission.name(), error = %err, "submission not serializable; it cannot be replayed");
            }
        }
        let id = self
            .recovery
            .execute_with_circuit_breaker_and_context(
                submission.operation_name(),
                context,
                || self.dispatch(&submission),
            )
            .await?;
        debug!(
            task = submission.name(),
            backend = %submission.backend(),
            id = %id,
            "task handed off"
        );
        Ok(id)
    }

    /// The recovery manager runs this under the operation's breaker, so a
    /// failed replay is not archived a second time.
    async fn replay(&self, entry: DeadLetterEntry) -> Result<(), SchedulerError> {
        let submission = ReplayableSubmission::from_entry(&entry)?;
        self.ensure_available(submission.backend())?;
        let id = self.dispatch(&submission).await?;
        info!(
            entry = %entry.id,
            task = submission.name(),
            id = %id,
            "dead-lettered submission replayed"
        );
        Ok(())
    }

    /// Entries for a backend that is currently unavailable are skipped
    /// without touching their attempt counts.
    async fn drain_dead_letters(&self) -> DeadLetterProcessResult {
        let max_retries = self.config.resilience.dead_letter_max_retries;
        let mut total = DeadLetterProcessResult::default();
        for (operation, backend) in [
            (DURABLE_QUEUE_OPERATION, BackendSelection::DurableQueue),
            (DAG_DEPLOYMENT_OPERATION, BackendSelection::DagOrchestrator),
        ] {
            if self.ensure_available(backend).is_err() {
                let waiting = self.recovery.dead_letter_queue().get_all(Some(operation));
                let (exhausted, pending): (Vec<_>, Vec<_>) = waiting
                    .iter()
                    .partition(|entry| entry.attempts >= max_retries);
                if !pending.is_empty() {
                    debug!(
                        operation,
                        backend = %backend,
                        pending = pending.len(),
                        "dead-letter pass skipped, backend unavailable"
                    );
                }
                total += DeadLetterProcessResult {
                    exhausted: exhausted.len(),
                    skipped: pending.len(),
                    ..DeadLetterProcessResult::default()
                };
                continue;
            }
            total += self
                .recovery
                .process_dead_letter_queue(Some(operation), |entry| self.replay(entry), max_retries)
                .await;
        }
        total
    }

    /// Health-checks available backends and retries `start` on the others.
    /// The timer is never restarted from here since this runs on it.
    async fn probe_backends(&self) -> AppResult<()> {
        let timeout = self.config.startup_timeout();
        let mut failures = Vec::new();
        let mut first_error = None;

        for backend in BackendSelection::ALL {
            let was_available = self.ensure_available(backend).is_ok();
            let result = match (backend, was_available) {
                (BackendSelection::Timer, _) => {
                    bounded(backend, timeout, self.timer.health_check()).await
                }
                (BackendSelection::DurableQueue, true) => {
                    bounded(backend, timeout, self.durable.health_check()).await
                }
                (BackendSelection::DurableQueue, false) => {
                    bounded(backend, timeout, self.durable.start()).await
                }
                (BackendSelection::DagOrchestrator, true) => {
                    bounded(backend, timeout, self.dag.health_check()).await
                }
                (BackendSelection::DagOrchestrator, false) => {
                    bounded(backend, timeout, self.dag.start()).await
                }
            };
            match result {
                Ok(()) => {
                    if !was_available {
                        info!(backend = %backend, "backend recovered");
                    }
                    self.set_status(backend, BackendStatus::Available);
                }
                Err(err) => {
                    if was_available {
                        warn!(backend = %backend, error = %err, "backend health check failed");
                    } else {
                        debug!(backend = %backend, error = %err, "backend still unavailable");
                    }
                    self.set_status(backend, BackendStatus::unavailable(err.to_string()));
                    failures.push(format!("{backend}: {err}"));
                    first_error.get_or_insert(err);
                }
            }
        }

        self.hooks.probe_health().await?;
        match first_error {
            None => Ok(()),
            Some(err) => Err(anyhow::Error::new(err)
                .context(format!("unhealthy backends: {}", failures.join("; ")))),
        }
    }

    fn capture_metrics(&self) -> MetricsSnapshot {
        let backends = {
            let availability = self.availability.read();
            BackendSelection::ALL
                .into_iter()
                .map(|backend| {
                    let up = availability
                        .get(&backend)
                        .is_some_and(BackendStatus::is_available);
                    (backend, up)
                })
                .collect()
        };
        MetricsSnapshot {
            captured_at: Utc::now(),
            backends,
            circuit_breakers: self.recovery.circuit_breaker_snapshots(),
            dead_letters: self.recovery.get_dead_letter_queue_stats(),
        }
    }

    fn record_metrics(&self) {
        let snapshot = self.capture_metrics();
        let open = snapshot
            .circuit_breakers
            .iter()
            .filter(|b| b.state != CircuitState::Closed)
            .count();
        info!(
            breakers = snapshot.circuit_breakers.len(),
            breakers_not_closed = open,
            dead_letters = snapshot.dead_letters.total,
            dead_letters_evicted = snapshot.dead_letters.evicted,
            "metrics snapshot"
        );
        *self.last_metrics.lock() = Some(snapshot);
    }

    async fn cleanup(&self) -> AppResult<()> {
        let retention = self.config.resilience.dead_letter_retention();
        let removed = self.recovery.cleanup_old_dead_letter_entries(retention);
        if removed > 0 {
            info!(removed, "expired dead-letter entries removed");
        }
        self.hooks.cleanup().await
    }

    fn audit<T: fmt::Display>(
        &self,
        task: &str,
        backend: BackendSelection,
        result: &Result<T, SchedulerError>,
    ) {
        let Some(sink) = &self.audit else {
            return;
        };
        let event = match result {
            Ok(handle) => build_audit_event(task, backend, "handoff", Some(handle.to_string())),
            Err(err) => build_audit_event(task, backend, "reject", Some(err.to_string())),
        };
        sink.lock().record(event);
    }
}

/// Wrap a maintenance body: skip if the scheduler is gone, run under the
/// `maintenance.<name>` breaker, log the outcome.
fn maintenance_task<F, Fut>(weak: Weak<SchedulerInner>, name: &'static str, body: F) -> TaskFn
where
    F: Fn(Arc<SchedulerInner>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AppResult<()>> + Send + 'static,
{
    let body = Arc::new(body);
    task_fn(move |_params| {
        let weak = weak.clone();
        let body = Arc::clone(&body);
        async move {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let recovery = Arc::clone(&inner.recovery);
            let operation = format!("{MAINTENANCE_PREFIX}{name}");
            match recovery
                .execute_with_circuit_breaker(&operation, || body(inner))
                .await
            {
                Ok(()) => debug!(task = name, "maintenance tick complete"),
                Err(err) if err.is_circuit_open() => {
                    debug!(task = name, "maintenance tick skipped, circuit open");
                }
                Err(err) => warn!(task = name, error = %err, "maintenance tick failed"),
            }
        }
    })
}

async fn bounded<F>(
    backend: BackendSelection,
    timeout: Duration,
    call: F,
) -> Result<(), SchedulerError>
where
    F: Future<Output = Result<(), SchedulerError>>,
{
    tokio::time::timeout(timeout, call)
        .await
        .unwrap_or_else(|_| Err(SchedulerError::Timeout(backend)))
}

fn require_name(name: &str) -> Result<(), SchedulerError> {
    if name.trim().is_empty() {
        Err(SchedulerError::InvalidInput("task name must not be empty".into()))
    } else {
        Ok(())
    }
}
