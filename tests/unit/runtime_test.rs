//! Tests for the API request/response helpers

use serde_json::json;
use unified_scheduler::config::SchedulerConfig;
use unified_scheduler::core::{
    BackendSelection, DeadLetterInput, ErrorRecord, SubmissionHandle, UnifiedScheduler,
};
use unified_scheduler::runtime::{TaskSubmissionRequest, dead_letter_stats, health, submit_task};

fn request(json: serde_json::Value) -> TaskSubmissionRequest {
    serde_json::from_value(json).unwrap()
}

fn pipeline_request() -> TaskSubmissionRequest {
    request(json!({
        "name": "nightly-etl",
        "characteristics": {
            "frequency": "low",
            "visibility": "user-facing",
            "complexity": "multi-step",
            "durability": "ephemeral",
            "infrastructure": "requires-external-workers"
        },
        "payload": {"region": "eu"},
        "trigger": {"kind": "cron", "expression": "0 2 * * *"}
    }))
}

#[tokio::test]
async fn test_submit_task_reports_handle() {
    let scheduler = UnifiedScheduler::builder(SchedulerConfig::default())
        .build()
        .unwrap();
    scheduler.start().await;

    let response = submit_task(&scheduler, pipeline_request()).await;
    assert_eq!(response.backend, BackendSelection::DagOrchestrator);
    assert!(response.error.is_none());
    assert!(matches!(
        response.handle,
        Some(SubmissionHandle::DagOrchestrator { .. })
    ));
    scheduler.stop().await;
}

#[tokio::test]
async fn test_submit_task_reports_error_in_body() {
    let scheduler = UnifiedScheduler::builder(SchedulerConfig::default())
        .build()
        .unwrap();

    let response = submit_task(&scheduler, pipeline_request()).await;
    assert!(response.handle.is_none());
    assert_eq!(
        response.error.as_deref(),
        Some("backend unavailable: dag-orchestrator")
    );
}

#[tokio::test]
async fn test_health_payload() {
    let scheduler = UnifiedScheduler::builder(SchedulerConfig::default())
        .build()
        .unwrap();
    assert!(!health(&scheduler).ok);

    scheduler.start().await;
    let payload = health(&scheduler);
    assert!(payload.ok);
    assert!(payload.running);
    assert_eq!(payload.backends.len(), 3);
    assert!((payload.health_score - 1.0).abs() < f64::EPSILON);
    scheduler.stop().await;
}

#[test]
fn test_dead_letter_stats_payload() {
    let scheduler = UnifiedScheduler::builder(SchedulerConfig::default())
        .build()
        .unwrap();
    scheduler
        .recovery()
        .dead_letter_queue()
        .enqueue(DeadLetterInput::new(
            "durable_queue.enqueue",
            ErrorRecord::new("Backend", "down"),
        ))
        .unwrap();

    let stats = dead_letter_stats(&scheduler);
    assert_eq!(stats.total, 1);
    assert_eq!(stats.by_operation["durable_queue.enqueue"], 1);
    assert_eq!(stats.by_error_type["Backend"], 1);
    assert_eq!(stats.oldest_age_secs, Some(0));
}
