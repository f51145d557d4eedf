//! Adapter contracts for the three execution backends and the trigger model
//! used by the in-process timer.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::core::SchedulerError;

/// Body of an in-process task. Receives the task's params on every run.
pub type TaskFn = Arc<dyn Fn(Value) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wrap an async closure as a [`TaskFn`].
pub fn task_fn<F, Fut>(f: F) -> TaskFn
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    Arc::new(move |params| Box::pin(f(params)))
}

/// When an in-process task fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trigger {
    /// Repeatedly, waiting `every` between the end of one run and the next.
    Interval {
        /// Delay between runs.
        every: Duration,
    },
    /// On a cron schedule (5-field Unix or 6-field with seconds), in UTC.
    Cron {
        /// Cron expression.
        expression: String,
    },
    /// Once, after `delay`.
    Once {
        /// Delay before the single run.
        delay: Duration,
    },
}

impl Trigger {
    /// Fixed-interval trigger.
    pub const fn interval(every: Duration) -> Self {
        Self::Interval { every }
    }

    /// Cron trigger.
    pub fn cron(expression: impl Into<String>) -> Self {
        Self::Cron {
            expression: expression.into(),
        }
    }

    /// One-shot trigger.
    pub const fn once(delay: Duration) -> Self {
        Self::Once { delay }
    }

    /// Validate and pre-parse the trigger.
    pub fn compile(&self) -> Result<CompiledTrigger, SchedulerError> {
        match self {
            Self::Interval { every } if every.is_zero() => Err(SchedulerError::InvalidTrigger(
                "interval must be greater than zero".into(),
            )),
            Self::Interval { every } => Ok(CompiledTrigger::Interval(*every)),
            Self::Once { delay } => Ok(CompiledTrigger::Once(*delay)),
            Self::Cron { expression } => {
                let normalized = normalize_cron_expr(expression);
                cron::Schedule::from_str(&normalized)
                    .map(|schedule| CompiledTrigger::Cron(Box::new(schedule)))
                    .map_err(|e| {
                        SchedulerError::InvalidTrigger(format!(
                            "invalid cron expression '{expression}': {e}"
                        ))
                    })
            }
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interval { every } => write!(f, "every {every:?}"),
            Self::Cron { expression } => write!(f, "cron '{expression}'"),
            Self::Once { delay } => write!(f, "once after {delay:?}"),
        }
    }
}

/// The `cron` crate wants a seconds field; prepend `0` to 5-field expressions.
fn normalize_cron_expr(expression: &str) -> String {
    if expression.split_whitespace().count() == 5 {
        format!("0 {expression}")
    } else {
        expression.to_string()
    }
}

/// A validated trigger ready to compute fire times.
#[derive(Debug, Clone)]
pub enum CompiledTrigger {
    /// Fixed delay between runs.
    Interval(Duration),
    /// Parsed cron schedule.
    Cron(Box<cron::Schedule>),
    /// Single run after a delay.
    Once(Duration),
}

impl CompiledTrigger {
    /// Delay until the next run, or `None` once the trigger is exhausted.
    /// `runs` is the number of completed runs so far.
    pub fn next_delay(&self, runs: u64, now: DateTime<Utc>) -> Option<Duration> {
        match self {
            Self::Interval(every) => Some(*every),
            Self::Once(delay) => (runs == 0).then_some(*delay),
            Self::Cron(schedule) => schedule
                .after(&now)
                .next()
                .map(|next| (next - now).to_std().unwrap_or(Duration::ZERO)),
        }
    }
}

/// Opaque handle to a task registered with the timer backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScheduledTaskHandle {
    id: String,
    key: Uuid,
}

impl ScheduledTaskHandle {
    /// Fresh handle for the caller-facing task id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            key: Uuid::new_v4(),
        }
    }

    /// Caller-facing task id.
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for ScheduledTaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.id, self.key)
    }
}

/// In-process timer scheduler.
#[async_trait]
pub trait TimerBackend: Send + Sync {
    /// Bring the timer up.
    async fn start(&self) -> Result<(), SchedulerError>;

    /// Stop every task, waiting at most `grace` for running bodies.
    async fn stop(&self, grace: Duration);

    /// Register `task` under `id`. Re-using an id replaces the earlier task.
    fn schedule(
        &self,
        task: TaskFn,
        trigger: &Trigger,
        params: Value,
        id: &str,
    ) -> Result<ScheduledTaskHandle, SchedulerError>;

    /// Cancel one task. Returns false if the handle is unknown.
    fn cancel(&self, handle: &ScheduledTaskHandle) -> bool;

    /// Liveness check used by the health probe.
    async fn health_check(&self) -> Result<(), SchedulerError> {
        Ok(())
    }
}

/// Durable external queue client.
#[async_trait]
pub trait DurableQueueBackend: Send + Sync {
    /// Connect / prepare the client.
    async fn start(&self) -> Result<(), SchedulerError> {
        Ok(())
    }

    /// Release client resources. Jobs already handed off are not touched.
    async fn stop(&self) {}

    /// Hand a workflow to the queue; returns the queue's job id.
    async fn enqueue(
        &self,
        name: &str,
        payload: &Value,
        provider: Option<&str>,
    ) -> Result<String, SchedulerError>;

    /// Liveness check used by the health probe.
    async fn health_check(&self) -> Result<(), SchedulerError> {
        Ok(())
    }
}

/// Schedule handed to the DAG orchestrator with a deployment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentSchedule {
    /// Recurrence, or `None` for an on-demand deployment.
    pub trigger: Option<Trigger>,
    /// Parameters passed to every flow run.
    #[serde(default)]
    pub parameters: Value,
}

/// DAG-deployment orchestrator client.
#[async_trait]
pub trait DagOrchestratorBackend: Send + Sync {
    /// Connect / prepare the client.
    async fn start(&self) -> Result<(), SchedulerError> {
        Ok(())
    }

    /// Release client resources. Deployments already created are not touched.
    async fn stop(&self) {}

    /// Create a deployment; returns the orchestrator's deployment id.
    async fn create_deployment(
        &self,
        name: &str,
        schedule: &DeploymentSchedule,
    ) -> Result<String, SchedulerError>;

    /// Liveness check used by the health probe.
    async fn health_check(&self) -> Result<(), SchedulerError> {
        Ok(())
    }
}
