//! Tests for builder modules

use std::sync::Arc;

use unified_scheduler::builders::SchedulerBuilder;
use unified_scheduler::config::SchedulerConfig;
use unified_scheduler::core::{
    CircuitBreakerConfig, DeadLetterPolicy, DeadLetterQueue, ErrorRecoveryManager, SchedulerError,
    UnifiedScheduler,
};

#[test]
fn test_builder_defaults() {
    let scheduler = SchedulerBuilder::default().build().unwrap();
    assert!(!scheduler.is_running());
    assert_eq!(scheduler.config(), &SchedulerConfig::default());
    assert_eq!(
        scheduler.recovery().dead_letter_queue().max_size(),
        SchedulerConfig::default().resilience.dead_letter_max_size
    );
}

#[test]
fn test_builder_rejects_invalid_config() {
    let mut config = SchedulerConfig::default();
    config.resilience.failure_threshold = 0;
    let err = UnifiedScheduler::builder(config).build().unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidInput(ref m) if m.contains("failure_threshold")));
}

#[test]
fn test_builder_shares_recovery_manager() {
    let recovery = Arc::new(ErrorRecoveryManager::new(
        CircuitBreakerConfig::default(),
        DeadLetterQueue::new(7),
        DeadLetterPolicy::Never,
    ));
    let scheduler = SchedulerBuilder::new(SchedulerConfig::default())
        .recovery(Arc::clone(&recovery))
        .build()
        .unwrap();
    assert!(Arc::ptr_eq(scheduler.recovery(), &recovery));
}
