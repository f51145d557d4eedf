//! API surface consumed by status endpoints and submission front-ends.

pub mod api;

pub use api::{
    DeadLetterStatsResponse, Health, SubmissionResponse, TaskSubmissionRequest,
    dead_letter_stats, health, submit_task,
};
