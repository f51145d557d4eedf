//! Integration tests for the circuit breaker state machine.
//!
//! This test validates:
//! 1. The breaker opens after exactly `failure_threshold` consecutive failures
//! 2. Calls are rejected without running while OPEN
//! 3. A call after `recovery_timeout` runs as a HALF_OPEN probe
//! 4. `success_threshold` probe successes close it, a probe failure reopens it
//! 5. Concurrent callers never produce more than one CLOSED → OPEN transition

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use unified_scheduler::core::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState,
};

const RECOVERY: Duration = Duration::from_millis(60);

fn breaker(failure_threshold: u32, success_threshold: u32) -> CircuitBreaker {
    CircuitBreaker::new(
        "repo.sync",
        CircuitBreakerConfig {
            failure_threshold,
            recovery_timeout: RECOVERY,
            success_threshold,
        },
    )
}

async fn fail(cb: &CircuitBreaker, invoked: &AtomicUsize) -> Result<(), CircuitBreakerError<String>> {
    cb.call(|| async {
        invoked.fetch_add(1, Ordering::SeqCst);
        Err("upstream down".to_string())
    })
    .await
}

async fn succeed(cb: &CircuitBreaker, invoked: &AtomicUsize) -> Result<u32, CircuitBreakerError<String>> {
    cb.call(|| async {
        invoked.fetch_add(1, Ordering::SeqCst);
        Ok(7)
    })
    .await
}

#[tokio::test]
async fn test_fourth_call_rejected_after_three_failures() {
    let cb = breaker(3, 2);
    let invoked = AtomicUsize::new(0);

    for _ in 0..2 {
        assert!(matches!(
            fail(&cb, &invoked).await,
            Err(CircuitBreakerError::OperationFailed(_))
        ));
        assert_eq!(cb.state(), CircuitState::Closed);
    }
    assert!(fail(&cb, &invoked).await.is_err());
    assert_eq!(cb.state(), CircuitState::Open);
    assert_eq!(invoked.load(Ordering::SeqCst), 3);

    let err = succeed(&cb, &invoked).await.unwrap_err();
    match err {
        CircuitBreakerError::CircuitOpen { name, retry_after } => {
            assert_eq!(name, "repo.sync");
            assert!(retry_after <= RECOVERY);
        }
        CircuitBreakerError::OperationFailed(e) => panic!("operation should not run: {e}"),
    }
    assert_eq!(invoked.load(Ordering::SeqCst), 3, "rejected call must not invoke");
    assert_eq!(cb.metrics().rejected_count, 1);
}

#[tokio::test]
async fn test_probe_after_recovery_timeout_closes_on_success_threshold() {
    let cb = breaker(1, 2);
    let invoked = AtomicUsize::new(0);

    let _ = fail(&cb, &invoked).await;
    assert_eq!(cb.state(), CircuitState::Open);

    tokio::time::sleep(RECOVERY + Duration::from_millis(20)).await;

    assert_eq!(succeed(&cb, &invoked).await.unwrap(), 7);
    assert_eq!(cb.state(), CircuitState::HalfOpen);
    assert_eq!(cb.snapshot().consecutive_successes, 1);

    assert_eq!(succeed(&cb, &invoked).await.unwrap(), 7);
    let snapshot = cb.snapshot();
    assert_eq!(snapshot.state, CircuitState::Closed);
    assert_eq!(snapshot.consecutive_failures, 0);
    assert_eq!(snapshot.consecutive_successes, 0);
    assert_eq!(invoked.load(Ordering::SeqCst), 3);

    let metrics = cb.metrics();
    assert_eq!(metrics.opened, 1);
    assert_eq!(metrics.half_opened, 1);
    assert_eq!(metrics.closed, 1);
}

#[tokio::test]
async fn test_probe_failure_reopens_and_restarts_recovery_clock() {
    let cb = breaker(1, 2);
    let invoked = AtomicUsize::new(0);

    let _ = fail(&cb, &invoked).await;
    tokio::time::sleep(RECOVERY + Duration::from_millis(20)).await;

    assert!(matches!(
        fail(&cb, &invoked).await,
        Err(CircuitBreakerError::OperationFailed(_))
    ));
    assert_eq!(cb.state(), CircuitState::Open);

    let err = succeed(&cb, &invoked).await.unwrap_err();
    assert!(err.is_circuit_open());
    if let CircuitBreakerError::CircuitOpen { retry_after, .. } = err {
        assert!(retry_after > Duration::from_millis(20), "clock was restarted");
    }
    assert_eq!(invoked.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_open_state_is_reported_until_next_call() {
    let cb = breaker(1, 1);
    let invoked = AtomicUsize::new(0);
    let _ = fail(&cb, &invoked).await;

    tokio::time::sleep(RECOVERY + Duration::from_millis(20)).await;
    // No background timer: still OPEN until somebody calls.
    assert_eq!(cb.state(), CircuitState::Open);

    succeed(&cb, &invoked).await.unwrap();
    assert_eq!(cb.state(), CircuitState::Closed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_failures_open_exactly_once() {
    let cb = Arc::new(breaker(5, 1));
    let invoked = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..32 {
        let cb = Arc::clone(&cb);
        let invoked = Arc::clone(&invoked);
        handles.push(tokio::spawn(async move {
            cb.call(|| async {
                invoked.fetch_add(1, Ordering::SeqCst);
                tokio::task::yield_now().await;
                Err::<(), _>("boom")
            })
            .await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().is_err());
    }

    let metrics = cb.metrics();
    assert_eq!(cb.state(), CircuitState::Open);
    assert_eq!(metrics.opened, 1);
    assert_eq!(metrics.total_calls + metrics.rejected_count, 32);
    assert_eq!(metrics.total_calls, invoked.load(Ordering::SeqCst) as u64);
    assert!(metrics.total_calls >= 5);
}

#[tokio::test]
async fn test_reset_closes_open_breaker() {
    let cb = breaker(1, 1);
    let invoked = AtomicUsize::new(0);
    let _ = fail(&cb, &invoked).await;
    assert_eq!(cb.state(), CircuitState::Open);

    cb.reset();
    assert_eq!(cb.state(), CircuitState::Closed);
    assert_eq!(succeed(&cb, &invoked).await.unwrap(), 7);
}
