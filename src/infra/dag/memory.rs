//! In-memory DAG orchestrator that records deployments.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::core::{DagOrchestratorBackend, DeploymentSchedule, SchedulerError};

/// A deployment accepted by [`InMemoryDagOrchestrator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedDeployment {
    /// Orchestrator-assigned id.
    pub deployment_id: String,
    /// Deployment name.
    pub name: String,
    /// Schedule and parameters.
    pub schedule: DeploymentSchedule,
    /// When it was created.
    pub created_at: DateTime<Utc>,
}

/// Records deployments instead of talking to an orchestrator.
#[derive(Debug, Default)]
pub struct InMemoryDagOrchestrator {
    deployments: Mutex<Vec<RecordedDeployment>>,
}

impl InMemoryDagOrchestrator {
    /// Empty orchestrator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Deployments created so far, in creation order.
    pub fn deployments(&self) -> Vec<RecordedDeployment> {
        self.deployments.lock().clone()
    }

    /// Look up one deployment.
    pub fn get(&self, deployment_id: &str) -> Option<RecordedDeployment> {
        self.deployments
            .lock()
            .iter()
            .find(|d| d.deployment_id == deployment_id)
            .cloned()
    }
}

#[async_trait]
impl DagOrchestratorBackend for InMemoryDagOrchestrator {
    async fn create_deployment(
        &self,
        name: &str,
        schedule: &DeploymentSchedule,
    ) -> Result<String, SchedulerError> {
        let deployment_id = Uuid::new_v4().to_string();
        self.deployments.lock().push(RecordedDeployment {
            deployment_id: deployment_id.clone(),
            name: name.to_string(),
            schedule: schedule.clone(),
            created_at: Utc::now(),
        });
        debug!(deployment_id = %deployment_id, deployment = name, "deployment created");
        Ok(deployment_id)
    }
}
