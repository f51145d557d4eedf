//! Error types for scheduler and resilience operations.

use std::any::Any;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::core::BackendSelection;

/// Errors produced by the scheduler and its backend adapters.
#[derive(Debug, Clone, Error)]
pub enum SchedulerError {
    /// A backend failed to start or is not reachable.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(BackendSelection),
    /// A backend did not answer within its time budget.
    #[error("backend timed out: {0}")]
    Timeout(BackendSelection),
    /// Backend-specific failure with context.
    #[error("backend error: {0}")]
    Backend(String),
    /// Caller supplied an undeclared or malformed value.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Trigger specification could not be compiled.
    #[error("invalid trigger: {0}")]
    InvalidTrigger(String),
    /// The protecting circuit breaker rejected the call without trying it.
    #[error("circuit open for `{operation}`; retry after {retry_after:?}")]
    CircuitOpen {
        /// Operation name of the breaker.
        operation: String,
        /// Time left until a probe is allowed.
        retry_after: Duration,
    },
}

impl SchedulerError {
    /// Variant name, used as the archived error type.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::BackendUnavailable(_) => "BackendUnavailable",
            Self::Timeout(_) => "Timeout",
            Self::Backend(_) => "Backend",
            Self::InvalidInput(_) => "InvalidInput",
            Self::InvalidTrigger(_) => "InvalidTrigger",
            Self::CircuitOpen { .. } => "CircuitOpen",
        }
    }
}

/// Outcome of a breaker-protected call that did not succeed.
///
/// `CircuitOpen` means the operation was never invoked; `OperationFailed`
/// carries the operation's own error.
#[derive(Debug, Error)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open, the call was rejected without invoking the operation.
    #[error("circuit breaker `{name}` is open; retry after {retry_after:?}")]
    CircuitOpen {
        /// Breaker name.
        name: String,
        /// Time left until a probe is allowed.
        retry_after: Duration,
    },
    /// Operation ran and failed.
    #[error("operation failed: {0}")]
    OperationFailed(E),
}

impl<E> CircuitBreakerError<E> {
    /// True if the breaker rejected the call.
    pub const fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    /// The wrapped operation's error, if it ran.
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            Self::OperationFailed(err) => Some(err),
            Self::CircuitOpen { .. } => None,
        }
    }
}

impl From<CircuitBreakerError<SchedulerError>> for SchedulerError {
    fn from(err: CircuitBreakerError<SchedulerError>) -> Self {
        match err {
            CircuitBreakerError::CircuitOpen { name, retry_after } => Self::CircuitOpen {
                operation: name,
                retry_after,
            },
            CircuitBreakerError::OperationFailed(inner) => inner,
        }
    }
}

/// Errors from dead-letter retry attempts.
#[derive(Debug, Error)]
pub enum DeadLetterError<E> {
    /// No entry with this id is (still) in the queue.
    #[error("dead-letter entry {0} not found")]
    NotFound(Uuid),
    /// The retried operation failed; the entry stays in the queue.
    #[error("retry failed: {0}")]
    OperationFailed(E),
}

/// Serialized form of a failure archived in the dead-letter queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Error kind: the variant name for scheduler errors, otherwise the
    /// short type name.
    pub error_type: String,
    /// Rendered error message.
    pub message: String,
}

impl ErrorRecord {
    /// Build a record from explicit parts.
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
        }
    }

    /// Capture an error value with its kind and `Display` output.
    ///
    /// A [`SchedulerError`] is labelled with [`SchedulerError::kind`]. An
    /// `anyhow::Error` is labelled by the first error in its chain that has
    /// a known kind (scheduler, I/O or JSON errors), or `Other`. Any other
    /// type is labelled with its short type name.
    pub fn of<E: fmt::Display + 'static>(err: &E) -> Self {
        let any: &dyn Any = err;
        let error_type = if let Some(err) = any.downcast_ref::<SchedulerError>() {
            err.kind().to_string()
        } else if let Some(err) = any.downcast_ref::<anyhow::Error>() {
            anyhow_kind(err).to_string()
        } else {
            short_type_name::<E>()
        };
        Self::new(error_type, err.to_string())
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error_type, self.message)
    }
}

fn anyhow_kind(err: &anyhow::Error) -> &'static str {
    err.chain()
        .find_map(|cause| {
            if let Some(err) = cause.downcast_ref::<SchedulerError>() {
                Some(err.kind())
            } else if cause.is::<std::io::Error>() {
                Some("Io")
            } else if cause.is::<serde_json::Error>() {
                Some("Json")
            } else {
                None
            }
        })
        .unwrap_or("Other")
}

/// Last path segment of a type name, generics stripped.
fn short_type_name<T>() -> String {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_record_labels_by_kind() {
        let record = ErrorRecord::of(&SchedulerError::Backend("boom".into()));
        assert_eq!(record.error_type, "Backend");
        assert_eq!(record.message, "backend error: boom");

        let record = ErrorRecord::of(&SchedulerError::Timeout(BackendSelection::Timer));
        assert_eq!(record.error_type, "Timeout");

        let record = ErrorRecord::of(&"plain");
        assert_eq!(record.error_type, "&str");
    }

    #[test]
    fn anyhow_errors_are_labelled_by_their_chain() {
        let wrapped = anyhow::Error::new(SchedulerError::BackendUnavailable(
            BackendSelection::DurableQueue,
        ))
        .context("health probe");
        assert_eq!(ErrorRecord::of(&wrapped).error_type, "BackendUnavailable");
        assert_eq!(ErrorRecord::of(&wrapped).message, "health probe");

        let io = anyhow::Error::new(std::io::Error::other("disk full")).context("cleanup");
        assert_eq!(ErrorRecord::of(&io).error_type, "Io");

        assert_eq!(ErrorRecord::of(&anyhow::anyhow!("vault sealed")).error_type, "Other");
    }

    #[test]
    fn circuit_open_converts_to_scheduler_error() {
        let err: SchedulerError = CircuitBreakerError::<SchedulerError>::CircuitOpen {
            name: "dag".into(),
            retry_after: Duration::from_secs(3),
        }
        .into();
        assert!(matches!(err, SchedulerError::CircuitOpen { ref operation, .. } if operation == "dag"));
    }
}
