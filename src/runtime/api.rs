//! API-facing request/response models.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{
    BackendSelection, BackendStatus, CircuitState, DeadLetterStats, SubmissionHandle,
    TaskCharacteristics, TaskSubmission, Trigger, UnifiedScheduler, classify,
};

/// Task submission payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSubmissionRequest {
    /// Task name.
    pub name: String,
    /// Declared characteristics used for routing.
    pub characteristics: TaskCharacteristics,
    /// Opaque payload.
    #[serde(default)]
    pub payload: Value,
    /// Optional recurrence.
    #[serde(default)]
    pub trigger: Option<Trigger>,
    /// Optional queue provider hint.
    #[serde(default)]
    pub provider: Option<String>,
}

/// Submission result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionResponse {
    /// Task name.
    pub name: String,
    /// Backend the task was routed to.
    pub backend: BackendSelection,
    /// Handle on success.
    pub handle: Option<SubmissionHandle>,
    /// Failure reason.
    pub error: Option<String>,
}

/// Health response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    /// Healthy flag: running and every backend available.
    pub ok: bool,
    /// Whether the scheduler is started.
    pub running: bool,
    /// Availability per backend.
    pub backends: BTreeMap<BackendSelection, BackendStatus>,
    /// State per breaker.
    pub circuit_breakers: BTreeMap<String, CircuitState>,
    /// Fraction of breakers that are CLOSED.
    pub health_score: f64,
}

/// Dead-letter statistics response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterStatsResponse {
    /// Entries held.
    pub total: usize,
    /// Capacity.
    pub max_size: usize,
    /// Entries evicted at capacity since start.
    pub evicted: u64,
    /// Entries per operation.
    pub by_operation: BTreeMap<String, usize>,
    /// Entries per error type.
    pub by_error_type: BTreeMap<String, usize>,
    /// Age of the oldest entry in seconds.
    pub oldest_age_secs: Option<u64>,
}

impl From<DeadLetterStats> for DeadLetterStatsResponse {
    fn from(stats: DeadLetterStats) -> Self {
        Self {
            total: stats.total,
            max_size: stats.max_size,
            evicted: stats.evicted,
            by_operation: stats.by_operation,
            by_error_type: stats.by_error_type,
            oldest_age_secs: stats.oldest_age.map(|age| age.as_secs()),
        }
    }
}

/// Route and submit a task. Errors are reported in the response body.
pub async fn submit_task(
    scheduler: &UnifiedScheduler,
    req: TaskSubmissionRequest,
) -> SubmissionResponse {
    let backend = classify(&req.characteristics);
    let submission = TaskSubmission {
        name: req.name.clone(),
        payload: req.payload,
        trigger: req.trigger,
        provider: req.provider,
    };
    match scheduler.submit(&req.characteristics, submission).await {
        Ok(handle) => SubmissionResponse {
            name: req.name,
            backend,
            handle: Some(handle),
            error: None,
        },
        Err(err) => SubmissionResponse {
            name: req.name,
            backend,
            handle: None,
            error: Some(err.to_string()),
        },
    }
}

/// Return a health payload.
pub fn health(scheduler: &UnifiedScheduler) -> Health {
    let report = scheduler.health_status();
    let ok = report.running && report.backends.values().all(BackendStatus::is_available);
    Health {
        ok,
        running: report.running,
        backends: report.backends,
        circuit_breakers: report.circuit_breakers,
        health_score: report.health_score,
    }
}

/// Return dead-letter statistics.
pub fn dead_letter_stats(scheduler: &UnifiedScheduler) -> DeadLetterStatsResponse {
    scheduler.get_dead_letter_queue_stats().into()
}
