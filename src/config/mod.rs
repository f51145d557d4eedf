//! Configuration models for the scheduler, its resilience layer and its
//! maintenance tasks.

pub mod scheduler;

pub use scheduler::{MaintenanceConfig, ResilienceConfig, SchedulerConfig};
