//! Audit sinks for scheduling decisions.
//!
//! Every submission records which backend it was routed to and how the
//! hand-off ended.

use std::collections::VecDeque;

use crate::core::BackendSelection;
use crate::util::clock::now_ms;

/// Audit event structure.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    /// Event identifier.
    pub event_id: String,
    /// Task name from the submission.
    pub task: String,
    /// Backend the task was routed to.
    pub backend: BackendSelection,
    /// Action taken: `handoff` or `reject`.
    pub action: String,
    /// Timestamp milliseconds.
    pub created_at_ms: u128,
    /// Additional context (job id, error text).
    pub detail: Option<String>,
}

/// Audit sink abstraction.
pub trait AuditSink: Send {
    /// Record an audit event.
    fn record(&mut self, event: AuditEvent);
}

/// In-memory audit sink for testing and dev.
pub struct InMemoryAuditSink {
    events: VecDeque<AuditEvent>,
    max_events: usize,
}

impl InMemoryAuditSink {
    /// Create a new in-memory sink with a bounded buffer.
    pub fn new(max_events: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(max_events.min(1024)),
            max_events: max_events.max(1),
        }
    }

    /// Retrieve a snapshot of stored events.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.iter().cloned().collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&mut self, event: AuditEvent) {
        if self.events.len() >= self.max_events {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }
}

/// Sink forwarding to a shared in-memory sink, so callers can keep a handle
/// for inspection after moving the sink into the scheduler.
impl AuditSink for std::sync::Arc<parking_lot::Mutex<InMemoryAuditSink>> {
    fn record(&mut self, event: AuditEvent) {
        self.lock().record(event);
    }
}

/// Helper to build an audit event from context.
pub fn build_audit_event(
    task: impl Into<String>,
    backend: BackendSelection,
    action: impl Into<String>,
    detail: Option<String>,
) -> AuditEvent {
    let task = task.into();
    let action = action.into();
    let created_at_ms = now_ms();
    AuditEvent {
        event_id: format!("{task}-{action}-{created_at_ms}"),
        task,
        backend,
        action,
        created_at_ms,
        detail,
    }
}
