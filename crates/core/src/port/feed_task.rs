// Feed Task Port
// Abstraction for the task body executed per job. The worker treats the
// payload as opaque: fetch/parse semantics live behind this trait.

use async_trait::async_trait;
use thiserror::Error;

/// Task execution errors
///
/// Timeout is produced by the worker when the body exceeds its deadline;
/// both variants follow the same retry path.
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Task failed: {0}")]
    Failed(String),

    #[error("Task timed out after {0}ms")]
    Timeout(i64),
}

/// Feed Task trait
///
/// Implementations:
/// - FeedProbeTask in the daemon (placeholder body)
/// - mocks below for tests
#[async_trait]
pub trait FeedTask: Send + Sync {
    /// Execute the task body for one job payload
    async fn run(&self, payload: &str) -> Result<(), TaskError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Mock task behavior
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Always succeed
        Success,
        /// Always fail with message
        Fail(String),
        /// Fail the first N calls, then succeed
        FailFirst(usize, String),
        /// Sleep forever (for timeout testing)
        Hang,
        /// Panic with message (for worker containment testing)
        Panic(String),
    }

    /// Mock Feed Task for testing
    pub struct MockFeedTask {
        behavior: Arc<Mutex<MockBehavior>>,
        call_count: Arc<Mutex<usize>>,
    }

    impl MockFeedTask {
        pub fn new(behavior: MockBehavior) -> Self {
            Self {
                behavior: Arc::new(Mutex::new(behavior)),
                call_count: Arc::new(Mutex::new(0)),
            }
        }

        pub fn new_success() -> Self {
            Self::new(MockBehavior::Success)
        }

        pub fn new_fail(message: impl Into<String>) -> Self {
            Self::new(MockBehavior::Fail(message.into()))
        }

        pub fn new_hang() -> Self {
            Self::new(MockBehavior::Hang)
        }

        pub fn new_panic(message: impl Into<String>) -> Self {
            Self::new(MockBehavior::Panic(message.into()))
        }

        pub fn call_count(&self) -> usize {
            *self.call_count.lock().unwrap()
        }
    }

    #[async_trait]
    impl FeedTask for MockFeedTask {
        async fn run(&self, _payload: &str) -> Result<(), TaskError> {
            let calls = {
                let mut count = self.call_count.lock().unwrap();
                *count += 1;
                *count
            };

            let behavior = self.behavior.lock().unwrap().clone();

            match behavior {
                MockBehavior::Success => Ok(()),
                MockBehavior::Fail(msg) => Err(TaskError::Failed(msg)),
                MockBehavior::FailFirst(n, msg) => {
                    if calls <= n {
                        Err(TaskError::Failed(msg))
                    } else {
                        Ok(())
                    }
                }
                MockBehavior::Hang => {
                    // Outlives any reasonable test timeout
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(())
                }
                MockBehavior::Panic(msg) => panic!("{}", msg),
            }
        }
    }
}
