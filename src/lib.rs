//! # Unified Scheduler
//!
//! One scheduling front door over three execution backends, with a
//! resilience layer that keeps a failing dependency from taking the rest of
//! the platform down with it.
//!
//! ## Core Problem Solved
//!
//! Platform work comes in very different shapes:
//!
//! - **Housekeeping ticks**: frequent, internal, cheap to lose on restart
//! - **User-facing jobs**: must survive a restart once accepted
//! - **Multi-step pipelines**: run as DAGs on external workers
//!
//! Callers describe a task by five characteristics; the
//! [`core::classify`] function maps them to the in-process timer, the
//! durable queue or the DAG orchestrator, and [`core::UnifiedScheduler`]
//! hands the task to that backend.
//!
//! ## Key Features
//!
//! - **Deterministic routing**: a pure, total classifier with priority-ordered rules
//! - **Circuit breakers**: per-operation CLOSED → OPEN → HALF_OPEN state machines,
//!   with OPEN → HALF_OPEN evaluated lazily at call time, not proactively
//! - **Dead-letter queue**: bounded FIFO archive of failed hand-offs, replayed by a
//!   bounded maintenance pass
//! - **Degraded startup**: a backend that fails to start is reported and skipped
//! - **Self-maintenance**: health probe, metrics snapshot, cleanup sweep,
//!   dead-letter drain and credential rotation check registered on the timer
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use serde_json::json;
//! use unified_scheduler::builders::SchedulerBuilder;
//! use unified_scheduler::config::SchedulerConfig;
//! use unified_scheduler::core::{TaskCharacteristics, TaskSubmission};
//!
//! let scheduler = SchedulerBuilder::new(SchedulerConfig::from_env()?).build()?;
//! let report = scheduler.start().await;
//! if report.is_degraded() {
//!     tracing::warn!(unavailable = ?report.unavailable, "running degraded");
//! }
//!
//! let characteristics = TaskCharacteristics::parse(
//!     "low", "user-facing", "simple", "must-survive-restart", "local",
//! )?;
//! let handle = scheduler
//!     .submit(&characteristics, TaskSubmission::new("send-digest", json!({"user": 42})))
//!     .await?;
//!
//! scheduler.stop().await;
//! ```
//!
//! For complete examples, see:
//! - `tests/unified_scheduler_test.rs` - lifecycle, routing and replay
//! - `tests/circuit_breaker_test.rs` - breaker state machine

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling abstractions, resilience primitives and the scheduler.
pub mod core;
/// Configuration models for the scheduler, breakers and maintenance.
pub mod config;
/// Builders to construct a scheduler from configuration.
pub mod builders;
/// Infrastructure adapters for the timer, durable queue and DAG backends.
pub mod infra;
/// API surface: request/response models.
pub mod runtime;
/// Shared utilities.
pub mod util;
