//! Per-operation circuit breaker.
//!
//! Three states: Closed (calls pass through), Open (calls are rejected
//! without running) and Half-Open (calls run as probes).
//!
//! OPEN→HALF_OPEN is evaluated lazily at call time, not proactively: there
//! is no background timer per breaker. A breaker that was tripped and then
//! left alone keeps reporting `Open` until the next call attempt. The
//! recovery clock is tokio's, so it follows a paused test clock.
//!
//! Every transition starts a new generation. A call reports its result
//! against the generation it was admitted in; results that arrive after a
//! later transition are counted in the metrics but do not move the state.
//!
//! All state transitions happen under a single `parking_lot::Mutex` per
//! breaker; the lock is never held across the wrapped operation's await.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::core::CircuitBreakerError;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Normal operation.
    Closed,
    /// Failing fast.
    Open,
    /// Probing for recovery.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Closed => "CLOSED",
            Self::Open => "OPEN",
            Self::HalfOpen => "HALF_OPEN",
        })
    }
}

/// Breaker tuning parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures in CLOSED that trip the breaker.
    pub failure_threshold: u32,
    /// Time spent OPEN before a probe is allowed.
    pub recovery_timeout: Duration,
    /// Consecutive probe successes in HALF_OPEN needed to close.
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 2,
        }
    }
}

impl CircuitBreakerConfig {
    /// Zero thresholds are bumped to one.
    const fn sanitized(self) -> Self {
        Self {
            failure_threshold: if self.failure_threshold == 0 { 1 } else { self.failure_threshold },
            recovery_timeout: self.recovery_timeout,
            success_threshold: if self.success_threshold == 0 { 1 } else { self.success_threshold },
        }
    }
}

/// Call and transition counters for a single breaker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerMetrics {
    /// Operations actually invoked.
    pub total_calls: u64,
    /// Invocations that succeeded.
    pub success_count: u64,
    /// Invocations that failed.
    pub failure_count: u64,
    /// Calls rejected without invoking the operation.
    pub rejected_count: u64,
    /// Transitions into OPEN.
    pub opened: u64,
    /// Transitions into HALF_OPEN.
    pub half_opened: u64,
    /// Transitions into CLOSED (recoveries and resets).
    pub closed: u64,
}

#[derive(Debug, Default)]
struct AtomicMetrics {
    total_calls: AtomicU64,
    success_count: AtomicU64,
    failure_count: AtomicU64,
    rejected_count: AtomicU64,
    opened: AtomicU64,
    half_opened: AtomicU64,
    closed: AtomicU64,
}

impl AtomicMetrics {
    fn snapshot(&self) -> CircuitBreakerMetrics {
        CircuitBreakerMetrics {
            total_calls: self.total_calls.load(Ordering::Relaxed),
            success_count: self.success_count.load(Ordering::Relaxed),
            failure_count: self.failure_count.load(Ordering::Relaxed),
            rejected_count: self.rejected_count.load(Ordering::Relaxed),
            opened: self.opened.load(Ordering::Relaxed),
            half_opened: self.half_opened.load(Ordering::Relaxed),
            closed: self.closed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerSnapshot {
    /// Operation name.
    pub name: String,
    /// Stored state (OPEN is reported until the next call re-evaluates it).
    pub state: CircuitState,
    /// Consecutive failures counted in CLOSED.
    pub consecutive_failures: u32,
    /// Consecutive probe successes counted in HALF_OPEN.
    pub consecutive_successes: u32,
    /// Configuration in force.
    pub config: CircuitBreakerConfig,
    /// Wall-clock time of the last transition.
    pub last_transition_at: DateTime<Utc>,
    /// Counters.
    pub metrics: CircuitBreakerMetrics,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    probes_in_flight: u32,
    generation: u64,
    last_transition: Instant,
    last_transition_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AdmissionKind {
    Normal,
    Probe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Admission {
    kind: AdmissionKind,
    generation: u64,
}

impl Admission {
    const fn is_probe(self) -> bool {
        matches!(self.kind, AdmissionKind::Probe)
    }
}

impl BreakerState {
    /// Give back a probe slot taken in the current generation.
    fn release_probe(&mut self, admission: Admission) {
        if admission.is_probe() && admission.generation == self.generation {
            self.probes_in_flight = self.probes_in_flight.saturating_sub(1);
        }
    }
}

/// Releases a half-open probe slot if the call future is dropped mid-flight.
struct ProbeGuard<'a> {
    breaker: &'a CircuitBreaker,
    admission: Admission,
    armed: bool,
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.inner.lock().release_probe(self.admission);
        }
    }
}

/// Failure-isolation state machine guarding one named operation.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
    metrics: AtomicMetrics,
}

impl CircuitBreaker {
    /// Create a closed breaker.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        let config = config.sanitized();
        debug!(
            operation = %name,
            failure_threshold = config.failure_threshold,
            recovery_timeout_ms = config.recovery_timeout.as_millis(),
            success_threshold = config.success_threshold,
            "circuit breaker initialized"
        );
        Self {
            name,
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                probes_in_flight: 0,
                generation: 0,
                last_transition: Instant::now(),
                last_transition_at: Utc::now(),
            }),
            metrics: AtomicMetrics::default(),
        }
    }

    /// Operation name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configuration in force.
    pub const fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Stored state.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Counter snapshot.
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        self.metrics.snapshot()
    }

    /// Full snapshot.
    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let inner = self.inner.lock();
        CircuitBreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            consecutive_successes: inner.consecutive_successes,
            config: self.config,
            last_transition_at: inner.last_transition_at,
            metrics: self.metrics.snapshot(),
        }
    }

    /// Run `operation` under breaker protection.
    ///
    /// Returns `CircuitOpen` without invoking the operation while the breaker
    /// is OPEN (or while every HALF_OPEN probe slot is taken), otherwise the
    /// operation's own result with errors wrapped in `OperationFailed`.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let admission = match self.try_admit() {
            Ok(admission) => admission,
            Err(retry_after) => {
                self.metrics.rejected_count.fetch_add(1, Ordering::Relaxed);
                debug!(operation = %self.name, ?retry_after, "call rejected, circuit open");
                return Err(CircuitBreakerError::CircuitOpen {
                    name: self.name.clone(),
                    retry_after,
                });
            }
        };
        let mut guard = ProbeGuard {
            breaker: self,
            admission,
            armed: admission.is_probe(),
        };

        self.metrics.total_calls.fetch_add(1, Ordering::Relaxed);
        let result = operation().await;
        guard.armed = false;

        match &result {
            Ok(_) => self.on_success(admission),
            Err(_) => self.on_failure(admission),
        }
        result.map_err(CircuitBreakerError::OperationFailed)
    }

    /// Admin reset: back to CLOSED with counters cleared.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        self.transition(&mut inner, CircuitState::Closed);
    }

    /// Admin trip: OPEN now, recovery clock restarted.
    pub fn force_open(&self) {
        let mut inner = self.inner.lock();
        self.transition(&mut inner, CircuitState::Open);
    }

    fn try_admit(&self) -> Result<Admission, Duration> {
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::Open {
            let elapsed = inner.last_transition.elapsed();
            if elapsed < self.config.recovery_timeout {
                return Err(self.config.recovery_timeout - elapsed);
            }
            self.transition(&mut inner, CircuitState::HalfOpen);
        }
        let generation = inner.generation;
        match inner.state {
            CircuitState::Closed => Ok(Admission {
                kind: AdmissionKind::Normal,
                generation,
            }),
            CircuitState::HalfOpen => {
                let needed = self
                    .config
                    .success_threshold
                    .saturating_sub(inner.consecutive_successes);
                if inner.probes_in_flight < needed {
                    inner.probes_in_flight += 1;
                    Ok(Admission {
                        kind: AdmissionKind::Probe,
                        generation,
                    })
                } else {
                    Err(Duration::ZERO)
                }
            }
            CircuitState::Open => Err(self.config.recovery_timeout),
        }
    }

    fn on_success(&self, admission: Admission) {
        self.metrics.success_count.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.inner.lock();
        if admission.generation != inner.generation {
            debug!(operation = %self.name, "stale success ignored");
            return;
        }
        inner.release_probe(admission);
        match (inner.state, admission.kind) {
            (CircuitState::Closed, _) => inner.consecutive_failures = 0,
            (CircuitState::HalfOpen, AdmissionKind::Probe) => {
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.config.success_threshold {
                    self.transition(&mut inner, CircuitState::Closed);
                }
            }
            _ => {}
        }
    }

    fn on_failure(&self, admission: Admission) {
        self.metrics.failure_count.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.inner.lock();
        if admission.generation != inner.generation {
            debug!(operation = %self.name, "stale failure ignored");
            return;
        }
        inner.release_probe(admission);
        match (inner.state, admission.kind) {
            (CircuitState::Closed, _) => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            (CircuitState::HalfOpen, AdmissionKind::Probe) => {
                self.transition(&mut inner, CircuitState::Open);
            }
            _ => {}
        }
    }

    fn transition(&self, inner: &mut BreakerState, to: CircuitState) {
        let from = inner.state;
        inner.state = to;
        inner.generation = inner.generation.wrapping_add(1);
        inner.probes_in_flight = 0;
        inner.last_transition = Instant::now();
        inner.last_transition_at = Utc::now();
        inner.consecutive_successes = 0;
        match to {
            CircuitState::Open => {
                self.metrics.opened.fetch_add(1, Ordering::Relaxed);
                warn!(
                    operation = %self.name,
                    %from,
                    consecutive_failures = inner.consecutive_failures,
                    recovery_timeout_ms = self.config.recovery_timeout.as_millis(),
                    "circuit breaker opened"
                );
            }
            CircuitState::HalfOpen => {
                self.metrics.half_opened.fetch_add(1, Ordering::Relaxed);
                info!(operation = %self.name, %from, "circuit breaker half-open, probing");
            }
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
                self.metrics.closed.fetch_add(1, Ordering::Relaxed);
                info!(operation = %self.name, %from, "circuit breaker closed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(failures: u32, timeout_ms: u64, successes: u32) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                failure_threshold: failures,
                recovery_timeout: Duration::from_millis(timeout_ms),
                success_threshold: successes,
            },
        )
    }

    #[tokio::test]
    async fn success_resets_failure_count() {
        let cb = breaker(2, 1_000, 1);
        let _ = cb.call(|| async { Err::<(), _>("boom") }).await;
        let _ = cb.call(|| async { Ok::<_, &str>(()) }).await;
        let _ = cb.call(|| async { Err::<(), _>("boom") }).await;
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.snapshot().consecutive_failures, 1);
    }

    #[tokio::test]
    async fn concurrent_probe_slots_are_bounded() {
        let cb = breaker(1, 0, 1);
        let _ = cb.call(|| async { Err::<(), _>("boom") }).await;
        assert_eq!(cb.state(), CircuitState::Open);

        // Hold the single probe slot while a second call arrives.
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let probe = cb.call(|| async move {
            let _ = rx.await;
            Ok::<_, &str>(())
        });
        let second = async {
            tokio::task::yield_now().await;
            let rejected = cb.call(|| async { Ok::<_, &str>(()) }).await;
            let _ = tx.send(());
            rejected
        };
        let (probe, second) = tokio::join!(probe, second);
        assert!(probe.is_ok());
        assert!(second.unwrap_err().is_circuit_open());
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn dropped_probe_releases_its_slot() {
        let cb = breaker(1, 0, 1);
        let _ = cb.call(|| async { Err::<(), _>("boom") }).await;

        let pending = cb.call(|| std::future::pending::<Result<(), &str>>());
        let _ = tokio::time::timeout(Duration::from_millis(5), pending).await;

        assert!(cb.call(|| async { Ok::<_, &str>(()) }).await.is_ok());
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn late_result_from_an_earlier_episode_is_ignored() {
        use futures::poll;
        use std::pin::pin;

        let cb = breaker(1, 0, 1);
        let _ = cb.call(|| async { Err::<(), _>("boom") }).await;

        let (release_old, old_rx) = tokio::sync::oneshot::channel::<()>();
        let mut old = pin!(cb.call(|| async move {
            let _ = old_rx.await;
            Ok::<_, &str>(())
        }));
        assert!(poll!(old.as_mut()).is_pending());

        // Re-trip and start a new half-open episode while the old call hangs.
        cb.force_open();
        let (release_new, new_rx) = tokio::sync::oneshot::channel::<()>();
        let mut new = pin!(cb.call(|| async move {
            let _ = new_rx.await;
            Ok::<_, &str>(())
        }));
        assert!(poll!(new.as_mut()).is_pending());
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        release_old.send(()).unwrap();
        assert!(old.await.is_ok());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert_eq!(cb.snapshot().consecutive_successes, 0);

        // The new episode's only slot is still held by its own call.
        let extra = cb.call(|| async { Ok::<_, &str>(()) }).await;
        assert!(extra.unwrap_err().is_circuit_open());

        release_new.send(()).unwrap();
        assert!(new.await.is_ok());
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.metrics().success_count, 2);
    }

    #[test]
    fn admin_reset_and_force_open() {
        let cb = breaker(3, 60_000, 1);
        cb.force_open();
        assert_eq!(cb.state(), CircuitState::Open);
        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        let metrics = cb.metrics();
        assert_eq!(metrics.opened, 1);
        assert_eq!(metrics.closed, 1);
    }
}
