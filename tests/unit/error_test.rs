//! Tests for error types

use std::time::Duration;

use unified_scheduler::core::{
    BackendSelection, CircuitBreakerError, DeadLetterError, ErrorRecord, SchedulerError,
};

#[test]
fn test_backend_unavailable_error() {
    let err = SchedulerError::BackendUnavailable(BackendSelection::DurableQueue);
    assert_eq!(format!("{err}"), "backend unavailable: durable-queue");
}

#[test]
fn test_timeout_error() {
    let err = SchedulerError::Timeout(BackendSelection::DagOrchestrator);
    assert_eq!(format!("{err}"), "backend timed out: dag-orchestrator");
}

#[test]
fn test_backend_error() {
    let err = SchedulerError::Backend("connection failed".to_string());
    assert_eq!(format!("{err}"), "backend error: connection failed");
}

#[test]
fn test_circuit_breaker_error_accessors() {
    let open: CircuitBreakerError<String> = CircuitBreakerError::CircuitOpen {
        name: "dag".into(),
        retry_after: Duration::from_secs(1),
    };
    assert!(open.is_circuit_open());
    assert!(open.into_operation_error().is_none());

    let failed = CircuitBreakerError::OperationFailed("boom".to_string());
    assert!(!failed.is_circuit_open());
    assert_eq!(failed.into_operation_error().as_deref(), Some("boom"));
}

#[test]
fn test_operation_failure_unwraps_to_scheduler_error() {
    let err: SchedulerError =
        CircuitBreakerError::OperationFailed(SchedulerError::InvalidInput("bad".into())).into();
    assert!(matches!(err, SchedulerError::InvalidInput(ref m) if m == "bad"));
}

#[test]
fn test_dead_letter_error_display() {
    let err: DeadLetterError<&str> = DeadLetterError::OperationFailed("still down");
    assert_eq!(err.to_string(), "retry failed: still down");
}

#[test]
fn test_error_record_display() {
    let record = ErrorRecord::new("IoError", "reset by peer");
    assert_eq!(record.to_string(), "IoError: reset by peer");
}
