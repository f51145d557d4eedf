//! Infrastructure adapters for the timer, durable queue and DAG backends.

pub mod dag;
pub mod queue;
pub mod timer;

pub use dag::{InMemoryDagOrchestrator, RecordedDeployment};
pub use queue::{FileDurableQueue, InMemoryDurableQueue, QueuedJob};
pub use timer::TokioTimerBackend;
