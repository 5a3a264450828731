// Port Layer - Interfaces for external dependencies

pub mod feed_task;
pub mod id_provider; // For deterministic testing
pub mod job_repository;
pub mod time_provider;

// Re-exports
pub use feed_task::{FeedTask, TaskError};
pub use id_provider::IdProvider;
pub use job_repository::JobRepository;
pub use time_provider::TimeProvider;
