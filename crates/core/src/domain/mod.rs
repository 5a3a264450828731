// Domain Layer - Job state machine and retry configuration

pub mod error;
pub mod job;

pub use error::DomainError;
pub use job::{BackoffKind, Job, JobId, JobState, RetryConfig};
