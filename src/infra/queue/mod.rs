//! Durable queue backends.

pub mod file;
pub mod memory;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use file::FileDurableQueue;
pub use memory::InMemoryDurableQueue;

/// A workflow job as held by a durable queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedJob {
    /// Queue-assigned id.
    pub job_id: String,
    /// Workflow name.
    pub name: String,
    /// Workflow payload.
    pub payload: Value,
    /// Provider hint.
    #[serde(default)]
    pub provider: Option<String>,
    /// When the job was accepted.
    pub enqueued_at: DateTime<Utc>,
}

impl QueuedJob {
    pub(crate) fn new(name: &str, payload: &Value, provider: Option<&str>) -> Self {
        Self {
            job_id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            payload: payload.clone(),
            provider: provider.map(str::to_string),
            enqueued_at: Utc::now(),
        }
    }
}
