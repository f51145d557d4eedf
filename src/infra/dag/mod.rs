//! DAG orchestrator backends.

pub mod memory;

pub use memory::{InMemoryDagOrchestrator, RecordedDeployment};
