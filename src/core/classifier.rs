//! Task classification: maps declared task characteristics to a backend.
//!
//! Rules are priority-ordered, first match wins:
//!
//! 1. external workers + multi-step work goes to the DAG orchestrator
//! 2. work that must survive a restart goes to the durable queue
//! 3. high-frequency internal work goes to the in-process timer
//! 4. everything else goes to the durable queue

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::SchedulerError;

/// How often a task runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Frequency {
    /// Runs often (seconds to minutes).
    High,
    /// Runs rarely.
    Low,
    /// Runs once.
    OneShot,
}

/// Who observes the task's outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Visibility {
    /// Platform-internal housekeeping.
    Internal,
    /// Outcome is visible to users.
    UserFacing,
}

/// Shape of the work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Complexity {
    /// A single step.
    Simple,
    /// A graph of dependent steps.
    MultiStep,
}

/// Whether the task must outlive this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Durability {
    /// Losing the task on restart is acceptable.
    Ephemeral,
    /// The task must not be lost on restart.
    MustSurviveRestart,
}

/// Where the task executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Infrastructure {
    /// Runs in this process.
    Local,
    /// Needs workers outside this process.
    RequiresExternalWorkers,
}

/// Execution backend chosen for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendSelection {
    /// In-process timer scheduler.
    Timer,
    /// Durable external queue.
    DurableQueue,
    /// DAG-deployment orchestrator.
    DagOrchestrator,
}

impl BackendSelection {
    /// All backends, in startup order.
    pub const ALL: [Self; 3] = [Self::Timer, Self::DurableQueue, Self::DagOrchestrator];

    /// Stable lowercase identifier.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Timer => "timer",
            Self::DurableQueue => "durable-queue",
            Self::DagOrchestrator => "dag-orchestrator",
        }
    }
}

impl fmt::Display for BackendSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable descriptor of a unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskCharacteristics {
    /// How often the task runs.
    pub frequency: Frequency,
    /// Who sees the outcome.
    pub visibility: Visibility,
    /// Single step or graph.
    pub complexity: Complexity,
    /// Restart survival requirement.
    pub durability: Durability,
    /// Where the work runs.
    pub infrastructure: Infrastructure,
}

impl TaskCharacteristics {
    /// Construct from the five attributes.
    pub const fn new(
        frequency: Frequency,
        visibility: Visibility,
        complexity: Complexity,
        durability: Durability,
        infrastructure: Infrastructure,
    ) -> Self {
        Self {
            frequency,
            visibility,
            complexity,
            durability,
            infrastructure,
        }
    }

    /// Parse from the wire spelling of each attribute.
    ///
    /// Undeclared values are rejected with `SchedulerError::InvalidInput`.
    pub fn parse(
        frequency: &str,
        visibility: &str,
        complexity: &str,
        durability: &str,
        infrastructure: &str,
    ) -> Result<Self, SchedulerError> {
        Ok(Self {
            frequency: frequency.parse()?,
            visibility: visibility.parse()?,
            complexity: complexity.parse()?,
            durability: durability.parse()?,
            infrastructure: infrastructure.parse()?,
        })
    }
}

macro_rules! impl_from_str {
    ($ty:ty, $field:literal, { $($text:literal => $variant:expr),+ $(,)? }) => {
        impl FromStr for $ty {
            type Err = SchedulerError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($variant),)+
                    other => Err(SchedulerError::InvalidInput(format!(
                        "unknown {}: `{other}`",
                        $field
                    ))),
                }
            }
        }
    };
}

impl_from_str!(Frequency, "frequency", {
    "high" => Frequency::High,
    "low" => Frequency::Low,
    "one-shot" => Frequency::OneShot,
});
impl_from_str!(Visibility, "visibility", {
    "internal" => Visibility::Internal,
    "user-facing" => Visibility::UserFacing,
});
impl_from_str!(Complexity, "complexity", {
    "simple" => Complexity::Simple,
    "multi-step" => Complexity::MultiStep,
});
impl_from_str!(Durability, "durability", {
    "ephemeral" => Durability::Ephemeral,
    "must-survive-restart" => Durability::MustSurviveRestart,
});
impl_from_str!(Infrastructure, "infrastructure", {
    "local" => Infrastructure::Local,
    "requires-external-workers" => Infrastructure::RequiresExternalWorkers,
});
impl_from_str!(BackendSelection, "backend", {
    "timer" => BackendSelection::Timer,
    "durable-queue" => BackendSelection::DurableQueue,
    "dag-orchestrator" => BackendSelection::DagOrchestrator,
});

/// Pick the backend for a task. Pure and total.
pub const fn classify(characteristics: &TaskCharacteristics) -> BackendSelection {
    match characteristics {
        TaskCharacteristics {
            infrastructure: Infrastructure::RequiresExternalWorkers,
            complexity: Complexity::MultiStep,
            ..
        } => BackendSelection::DagOrchestrator,
        TaskCharacteristics {
            durability: Durability::MustSurviveRestart,
            ..
        } => BackendSelection::DurableQueue,
        TaskCharacteristics {
            frequency: Frequency::High,
            visibility: Visibility::Internal,
            ..
        } => BackendSelection::Timer,
        _ => BackendSelection::DurableQueue,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_multi_step_wins_over_durability() {
        let c = TaskCharacteristics::new(
            Frequency::High,
            Visibility::Internal,
            Complexity::MultiStep,
            Durability::MustSurviveRestart,
            Infrastructure::RequiresExternalWorkers,
        );
        assert_eq!(classify(&c), BackendSelection::DagOrchestrator);
    }

    #[test]
    fn local_multi_step_is_not_orchestrated() {
        let c = TaskCharacteristics::new(
            Frequency::High,
            Visibility::Internal,
            Complexity::MultiStep,
            Durability::Ephemeral,
            Infrastructure::Local,
        );
        assert_eq!(classify(&c), BackendSelection::Timer);
    }

    #[test]
    fn parse_rejects_unknown_values() {
        let err = TaskCharacteristics::parse("often", "internal", "simple", "ephemeral", "local")
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidInput(msg) if msg.contains("frequency")));
    }

    #[test]
    fn backend_round_trips_through_display() {
        for backend in BackendSelection::ALL {
            assert_eq!(backend.to_string().parse::<BackendSelection>().unwrap(), backend);
        }
    }
}
