//! Collaborator traits the scheduler calls out to.

use async_trait::async_trait;
use serde_json::Value;

use crate::core::AppResult;

/// Runs the payload of a task routed to the in-process timer.
///
/// This is the seam to the worker-pool executor: the scheduler decides
/// *when* a timer-class task runs, the executor decides *what* running it
/// means.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use unified_scheduler::core::{AppResult, TaskExecutor};
///
/// struct RepoSync;
///
/// #[async_trait]
/// impl TaskExecutor for RepoSync {
///     async fn execute(&self, name: &str, payload: serde_json::Value) -> AppResult<()> {
///         tracing::info!(task = name, %payload, "syncing");
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait TaskExecutor: Send + Sync + 'static {
    /// Execute one run of the named task.
    ///
    /// Errors count as failures against the task's circuit breaker
    /// (`task.<name>`).
    async fn execute(&self, name: &str, payload: Value) -> AppResult<()>;
}

/// External pieces of the scheduler's maintenance tasks.
///
/// Every method defaults to a no-op so collaborators only implement what
/// they own. Each call already runs under its maintenance task's circuit
/// breaker; returning an error counts as a failure against it.
#[async_trait]
pub trait MaintenanceHooks: Send + Sync + 'static {
    /// Extra checks run by the health probe after backend checks.
    async fn probe_health(&self) -> AppResult<()> {
        Ok(())
    }

    /// Cache and scratch cleanup run by the hourly sweep.
    async fn cleanup(&self) -> AppResult<()> {
        Ok(())
    }

    /// Credential and secret rotation check, run daily.
    async fn check_credential_rotation(&self) -> AppResult<()> {
        Ok(())
    }
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMaintenanceHooks;

impl MaintenanceHooks for NoopMaintenanceHooks {}
