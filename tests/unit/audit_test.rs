//! Tests for audit sink

use std::sync::Arc;

use parking_lot::Mutex;
use unified_scheduler::core::{AuditSink, BackendSelection, InMemoryAuditSink, build_audit_event};

#[test]
fn test_in_memory_audit_sink() {
    let mut sink = InMemoryAuditSink::new(10);

    let event = build_audit_event(
        "reindex",
        BackendSelection::DurableQueue,
        "handoff",
        Some("job:1".to_string()),
    );
    sink.record(event);

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].task, "reindex");
    assert_eq!(events[0].backend, BackendSelection::DurableQueue);
    assert_eq!(events[0].action, "handoff");
}

#[test]
fn test_audit_sink_overflow() {
    let mut sink = InMemoryAuditSink::new(2);

    for task in ["a", "b", "c"] {
        sink.record(build_audit_event(task, BackendSelection::Timer, "handoff", None));
    }

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].task, "b"); // First one popped
    assert_eq!(events[1].task, "c");
}

#[test]
fn test_build_audit_event() {
    let event = build_audit_event(
        "etl",
        BackendSelection::DagOrchestrator,
        "reject",
        Some("backend unavailable".to_string()),
    );

    assert!(event.event_id.starts_with("etl-reject-"));
    assert_eq!(event.detail.as_deref(), Some("backend unavailable"));
    assert!(event.created_at_ms > 0);
}

#[test]
fn test_shared_sink_records_through_handle() {
    let shared = Arc::new(Mutex::new(InMemoryAuditSink::new(4)));
    let mut handle = Arc::clone(&shared);
    handle.record(build_audit_event("tick", BackendSelection::Timer, "handoff", None));
    assert_eq!(shared.lock().events().len(), 1);
}
