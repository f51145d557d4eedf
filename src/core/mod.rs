//! Core scheduling abstractions: classification, resilience primitives,
//! backend contracts and the unified scheduler.

pub mod audit;
pub mod backend;
pub mod circuit_breaker;
pub mod classifier;
pub mod dead_letter;
pub mod error;
pub mod executor;
pub mod recovery;
pub mod scheduler;

pub use audit::{AuditEvent, AuditSink, InMemoryAuditSink, build_audit_event};
pub use backend::{
    CompiledTrigger, DagOrchestratorBackend, DeploymentSchedule, DurableQueueBackend,
    ScheduledTaskHandle, TaskFn, TimerBackend, Trigger, task_fn,
};
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics, CircuitBreakerSnapshot,
    CircuitState,
};
pub use classifier::{
    BackendSelection, Complexity, Durability, Frequency, Infrastructure, TaskCharacteristics,
    Visibility, classify,
};
pub use dead_letter::{
    DEFAULT_DEAD_LETTER_CAPACITY, DeadLetterContext, DeadLetterEntry, DeadLetterInput,
    DeadLetterQueue, DeadLetterStats,
};
pub use error::{AppResult, CircuitBreakerError, DeadLetterError, ErrorRecord, SchedulerError};
pub use executor::{MaintenanceHooks, NoopMaintenanceHooks, TaskExecutor};
pub use recovery::{DeadLetterPolicy, DeadLetterProcessResult, ErrorRecoveryManager};
pub use scheduler::{
    BackendStatus, HealthReport, MetricsSnapshot, ReplayableSubmission, StartReport,
    SubmissionHandle, TaskSubmission, UnifiedScheduler,
};
