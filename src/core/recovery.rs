//! Error recovery: a named registry of circuit breakers plus one dead-letter
//! queue.
//!
//! One `ErrorRecoveryManager` is created per scheduler and shared by
//! reference (`Arc`) with everything that runs protected operations. There
//! is no process-wide registry.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerSnapshot,
    CircuitState, DeadLetterContext, DeadLetterEntry, DeadLetterInput,
    DeadLetterQueue, DeadLetterStats, ErrorRecord, SchedulerError,
};

/// When a failed protected operation is also archived in the dead-letter
/// queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadLetterPolicy {
    /// Only if the breaker is OPEN after the failure, i.e. this failure
    /// tripped (or confirmed) it.
    #[default]
    WhenOpen,
    /// Every operation failure.
    Always,
    /// Never; callers archive explicitly.
    Never,
}

/// Result of one dead-letter processing pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetterProcessResult {
    /// Entries a retry was attempted for.
    pub retried: usize,
    /// Retries that succeeded (entry removed).
    pub succeeded: usize,
    /// Retries that failed (entry kept).
    pub still_failing: usize,
    /// Entries skipped because they reached `max_retries`.
    pub exhausted: usize,
    /// Entries not retried because the operation was rejected up front
    /// (breaker OPEN or backend unavailable). Their attempt count is
    /// unchanged.
    pub skipped: usize,
}

impl std::ops::AddAssign for DeadLetterProcessResult {
    fn add_assign(&mut self, other: Self) {
        self.retried += other.retried;
        self.succeeded += other.succeeded;
        self.still_failing += other.still_failing;
        self.exhausted += other.exhausted;
        self.skipped += other.skipped;
    }
}

/// Owns the breaker registry and the dead-letter queue.
pub struct ErrorRecoveryManager {
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
    dead_letters: DeadLetterQueue,
    defaults: CircuitBreakerConfig,
    policy: DeadLetterPolicy,
}

impl fmt::Debug for ErrorRecoveryManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorRecoveryManager")
            .field("breakers", &self.breakers.read().len())
            .field("dead_letters", &self.dead_letters.len())
            .field("defaults", &self.defaults)
            .field("policy", &self.policy)
            .finish()
    }
}

impl Default for ErrorRecoveryManager {
    fn default() -> Self {
        Self::new(
            CircuitBreakerConfig::default(),
            DeadLetterQueue::default(),
            DeadLetterPolicy::default(),
        )
    }
}

impl ErrorRecoveryManager {
    /// Create a manager with default breaker settings, a queue and a policy.
    pub fn new(
        defaults: CircuitBreakerConfig,
        dead_letters: DeadLetterQueue,
        policy: DeadLetterPolicy,
    ) -> Self {
        Self {
            breakers: RwLock::new(HashMap::new()),
            dead_letters,
            defaults,
            policy,
        }
    }

    /// Default breaker configuration for lazily created breakers.
    pub const fn defaults(&self) -> &CircuitBreakerConfig {
        &self.defaults
    }

    /// Dead-letter forwarding policy.
    pub const fn policy(&self) -> DeadLetterPolicy {
        self.policy
    }

    /// The dead-letter queue.
    pub const fn dead_letter_queue(&self) -> &DeadLetterQueue {
        &self.dead_letters
    }

    /// Resolve the breaker for `name`, creating it on first use.
    ///
    /// The first caller's parameters win; later calls asking for different
    /// parameters get the existing breaker and a warning.
    pub fn get_or_create_circuit_breaker(
        &self,
        name: &str,
        failure_threshold: Option<u32>,
        recovery_timeout: Option<Duration>,
    ) -> Arc<CircuitBreaker> {
        let requested = CircuitBreakerConfig {
            failure_threshold: failure_threshold.unwrap_or(self.defaults.failure_threshold),
            recovery_timeout: recovery_timeout.unwrap_or(self.defaults.recovery_timeout),
            success_threshold: self.defaults.success_threshold,
        };

        let existing = self.breakers.read().get(name).cloned();
        let breaker = existing.unwrap_or_else(|| {
            let mut breakers = self.breakers.write();
            Arc::clone(breakers.entry(name.to_string()).or_insert_with(|| {
                info!(operation = name, "circuit breaker created");
                Arc::new(CircuitBreaker::new(name, requested))
            }))
        });

        let asked_for_specific = failure_threshold.is_some() || recovery_timeout.is_some();
        let current = breaker.config();
        if asked_for_specific
            && (current.failure_threshold != requested.failure_threshold.max(1)
                || current.recovery_timeout != requested.recovery_timeout)
        {
            warn!(
                operation = name,
                existing_failure_threshold = current.failure_threshold,
                requested_failure_threshold = requested.failure_threshold,
                existing_recovery_timeout_ms = current.recovery_timeout.as_millis(),
                requested_recovery_timeout_ms = requested.recovery_timeout.as_millis(),
                "circuit breaker already exists with different settings; keeping the original"
            );
        }
        breaker
    }

    /// Existing breaker for `name`, if any.
    pub fn circuit_breaker(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.read().get(name).cloned()
    }

    /// Run `operation` under the breaker named `name`.
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
        self.execute_with_circuit_breaker_and_context(name, DeadLetterContext::new(), operation)
            .await
    }

    /// Like [`Self::execute_with_circuit_breaker`], attaching `context` to the
    /// dead-letter entry if the failure is archived.
    pub async fn execute_with_circuit_breaker_and_context<F, Fut, T, E>(
        &self,
        name: &str,
        context: DeadLetterContext,
        operation: F,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display + 'static,
    {
        let breaker = self.get_or_create_circuit_breaker(name, None, None);
        let result = breaker.call(operation).await;

        if let Err(CircuitBreakerError::OperationFailed(err)) = &result {
            let forward = match self.policy {
                DeadLetterPolicy::Always => true,
                DeadLetterPolicy::WhenOpen => breaker.state() == CircuitState::Open,
                DeadLetterPolicy::Never => false,
            };
            if forward {
                self.archive(DeadLetterInput {
                    operation: name.to_string(),
                    error: ErrorRecord::of(err),
                    context,
                });
            } else {
                debug!(operation = name, error = %err, "protected operation failed");
            }
        }
        result
    }

    /// Archive a failure without going through a breaker.
    pub fn send_to_dead_letter_queue(
        &self,
        operation_name: &str,
        error: ErrorRecord,
        context: DeadLetterContext,
    ) -> Result<DeadLetterEntry, SchedulerError> {
        self.dead_letters.enqueue(DeadLetterInput {
            operation: operation_name.to_string(),
            error,
            context,
        })
    }

    fn archive(&self, input: DeadLetterInput) {
        if let Err(err) = self.dead_letters.enqueue(input) {
            warn!(error = %err, "failed to archive operation failure");
        }
    }

    /// Retry archived entries for `operation_name` (all entries if `None`).
    ///
    /// Entries are processed one at a time, oldest first. Each retry runs
    /// under the breaker named by the entry's operation. While that breaker
    /// rejects calls the entry is skipped and its attempt count is left
    /// alone, so a pass that re-trips the breaker does not burn the retry
    /// budget of the entries behind it.
    ///
    /// An entry whose attempt count has reached `max_retries` is skipped and
    /// left in place; permanently failed entries are only removed by an
    /// explicit admin action or TTL cleanup.
    pub async fn process_dead_letter_queue<F, Fut, E>(
        &self,
        operation_name: Option<&str>,
        retry_fn: F,
        max_retries: u32,
    ) -> DeadLetterProcessResult
    where
        F: Fn(DeadLetterEntry) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: fmt::Display,
    {
        let mut outcome = DeadLetterProcessResult::default();
        for entry in self.dead_letters.get_all(operation_name) {
            if entry.attempts >= max_retries {
                outcome.exhausted += 1;
                continue;
            }
            let id = entry.id;
            // Removed concurrently (admin action or TTL); nothing to retry.
            if self.dead_letters.get(id).is_none() {
                continue;
            }
            let breaker = self.get_or_create_circuit_breaker(&entry.operation, None, None);
            match breaker.call(|| retry_fn(entry)).await {
                Ok(()) => {
                    if self.dead_letters.settle_attempt(id, true) {
                        outcome.retried += 1;
                        outcome.succeeded += 1;
                    }
                }
                Err(CircuitBreakerError::OperationFailed(err)) => {
                    if self.dead_letters.settle_attempt(id, false) {
                        outcome.retried += 1;
                        outcome.still_failing += 1;
                        debug!(%id, error = %err, "dead-letter entry still failing");
                    }
                }
                Err(CircuitBreakerError::CircuitOpen { retry_after, .. }) => {
                    outcome.skipped += 1;
                    debug!(%id, ?retry_after, "dead-letter retry skipped, circuit open");
                }
            }
        }
        if outcome.retried > 0 || outcome.exhausted > 0 || outcome.skipped > 0 {
            info!(
                operation = operation_name.unwrap_or("*"),
                retried = outcome.retried,
                succeeded = outcome.succeeded,
                still_failing = outcome.still_failing,
                exhausted = outcome.exhausted,
                skipped = outcome.skipped,
                "dead-letter pass complete"
            );
        }
        outcome
    }

    /// Remove archived entries older than `max_age`.
    pub fn cleanup_old_dead_letter_entries(&self, max_age: Duration) -> usize {
        self.dead_letters.clear_old_entries(max_age)
    }

    /// Dead-letter queue statistics.
    pub fn get_dead_letter_queue_stats(&self) -> DeadLetterStats {
        self.dead_letters.get_statistics()
    }

    /// Admin reset of one breaker. Returns false if it does not exist.
    pub fn reset_circuit_breaker(&self, name: &str) -> bool {
        self.circuit_breaker(name).is_some_and(|breaker| {
            breaker.reset();
            true
        })
    }

    /// Stored state per breaker name.
    pub fn circuit_breaker_states(&self) -> BTreeMap<String, CircuitState> {
        self.breakers
            .read()
            .iter()
            .map(|(name, breaker)| (name.clone(), breaker.state()))
            .collect()
    }

    /// Snapshots of every breaker, sorted by name.
    pub fn circuit_breaker_snapshots(&self) -> Vec<CircuitBreakerSnapshot> {
        let mut snapshots: Vec<_> = self
            .breakers
            .read()
            .values()
            .map(|breaker| breaker.snapshot())
            .collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    /// Number of breakers in each state.
    pub fn state_summary(&self) -> HashMap<CircuitState, usize> {
        let mut summary = HashMap::new();
        for state in self.breakers.read().values().map(|b| b.state()) {
            *summary.entry(state).or_default() += 1;
        }
        summary
    }

    /// Fraction of breakers that are CLOSED; 1.0 with no breakers.
    #[allow(clippy::cast_precision_loss)]
    pub fn health_score(&self) -> f64 {
        let breakers = self.breakers.read();
        if breakers.is_empty() {
            return 1.0;
        }
        let closed = breakers
            .values()
            .filter(|b| b.state() == CircuitState::Closed)
            .count();
        closed as f64 / breakers.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breakers_are_shared_by_name() {
        let manager = ErrorRecoveryManager::default();
        let a = manager.get_or_create_circuit_breaker("db", Some(3), None);
        let b = manager.get_or_create_circuit_breaker("db", Some(9), None);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.config().failure_threshold, 3);
        assert_eq!(manager.circuit_breaker_states().len(), 1);
    }

    #[test]
    fn health_score_counts_closed_breakers() {
        let manager = ErrorRecoveryManager::default();
        assert!((manager.health_score() - 1.0).abs() < f64::EPSILON);
        manager.get_or_create_circuit_breaker("a", None, None);
        manager
            .get_or_create_circuit_breaker("b", None, None)
            .force_open();
        assert!((manager.health_score() - 0.5).abs() < f64::EPSILON);
        assert_eq!(manager.state_summary()[&CircuitState::Open], 1);
        assert!(manager.reset_circuit_breaker("b"));
        assert!(!manager.reset_circuit_breaker("missing"));
    }
}
