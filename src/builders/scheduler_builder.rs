//! Builder wiring configuration, backends and collaborators into a
//! [`UnifiedScheduler`].

use std::sync::Arc;

use crate::config::SchedulerConfig;
use crate::core::scheduler::SchedulerComponents;
use crate::core::{
    AuditSink, DagOrchestratorBackend, DeadLetterQueue, DurableQueueBackend,
    ErrorRecoveryManager, MaintenanceHooks, NoopMaintenanceHooks, SchedulerError, TaskExecutor,
    TimerBackend, UnifiedScheduler,
};
use crate::infra::{InMemoryDagOrchestrator, InMemoryDurableQueue, TokioTimerBackend};

/// Assembles a [`UnifiedScheduler`].
///
/// Backends left unset default to [`TokioTimerBackend`],
/// [`InMemoryDurableQueue`] and [`InMemoryDagOrchestrator`].
///
/// ```rust,ignore
/// let scheduler = SchedulerBuilder::new(SchedulerConfig::from_env()?)
///     .durable_queue(Arc::new(FileDurableQueue::new("/var/lib/sched", "workflows")))
///     .executor(Arc::new(RepoSync))
///     .build()?;
/// let report = scheduler.start().await;
/// ```
#[derive(Default)]
pub struct SchedulerBuilder {
    config: SchedulerConfig,
    timer: Option<Arc<dyn TimerBackend>>,
    durable: Option<Arc<dyn DurableQueueBackend>>,
    dag: Option<Arc<dyn DagOrchestratorBackend>>,
    recovery: Option<Arc<ErrorRecoveryManager>>,
    executor: Option<Arc<dyn TaskExecutor>>,
    hooks: Option<Arc<dyn MaintenanceHooks>>,
    audit: Option<Box<dyn AuditSink>>,
}

impl SchedulerBuilder {
    /// Start from a configuration.
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Timer backend.
    #[must_use]
    pub fn timer(mut self, timer: Arc<dyn TimerBackend>) -> Self {
        self.timer = Some(timer);
        self
    }

    /// Durable queue backend.
    #[must_use]
    pub fn durable_queue(mut self, durable: Arc<dyn DurableQueueBackend>) -> Self {
        self.durable = Some(durable);
        self
    }

    /// DAG orchestrator backend.
    #[must_use]
    pub fn dag_orchestrator(mut self, dag: Arc<dyn DagOrchestratorBackend>) -> Self {
        self.dag = Some(dag);
        self
    }

    /// Share an existing recovery manager instead of building one from
    /// `config.resilience`.
    #[must_use]
    pub fn recovery(mut self, recovery: Arc<ErrorRecoveryManager>) -> Self {
        self.recovery = Some(recovery);
        self
    }

    /// Executor for timer-class submissions.
    #[must_use]
    pub fn executor(mut self, executor: Arc<dyn TaskExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Maintenance hooks.
    #[must_use]
    pub fn hooks(mut self, hooks: Arc<dyn MaintenanceHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Audit sink for routing decisions.
    #[must_use]
    pub fn audit_sink(mut self, sink: impl AuditSink + 'static) -> Self {
        self.audit = Some(Box::new(sink));
        self
    }

    /// Validate the configuration and build the scheduler.
    pub fn build(self) -> Result<UnifiedScheduler, SchedulerError> {
        self.config
            .validate()
            .map_err(|e| SchedulerError::InvalidInput(format!("config invalid: {e}")))?;

        let resilience = &self.config.resilience;
        let recovery = self.recovery.unwrap_or_else(|| {
            Arc::new(ErrorRecoveryManager::new(
                resilience.circuit_breaker(),
                DeadLetterQueue::new(resilience.dead_letter_max_size),
                resilience.dead_letter_policy,
            ))
        });
        let timer = self.timer.unwrap_or_else(|| {
            Arc::new(TokioTimerBackend::new(self.config.timer_max_concurrency))
        });

        Ok(UnifiedScheduler::from_components(SchedulerComponents {
            config: self.config,
            timer,
            durable: self
                .durable
                .unwrap_or_else(|| Arc::new(InMemoryDurableQueue::default())),
            dag: self
                .dag
                .unwrap_or_else(|| Arc::new(InMemoryDagOrchestrator::new())),
            recovery,
            executor: self.executor,
            hooks: self.hooks.unwrap_or_else(|| Arc::new(NoopMaintenanceHooks)),
            audit: self.audit,
        }))
    }
}

impl UnifiedScheduler {
    /// Builder starting from `config`.
    pub fn builder(config: SchedulerConfig) -> SchedulerBuilder {
        SchedulerBuilder::new(config)
    }
}
