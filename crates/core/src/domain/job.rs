// Job Domain Model

use serde::{Deserialize, Serialize};

/// Job ID (UUID v4 in production, injected via IdProvider)
pub type JobId = String;

/// Job State
///
/// Transitions are monotone along
/// `Pending -> Active -> { Completed | Pending (retry) | Failed }`.
/// `Completed` and `Failed` are terminal and never revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Pending,
    Active,
    Completed,
    Failed,
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Pending => write!(f, "PENDING"),
            JobState::Active => write!(f, "ACTIVE"),
            JobState::Completed => write!(f, "COMPLETED"),
            JobState::Failed => write!(f, "FAILED"),
        }
    }
}

/// Backoff flavor for retry delays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackoffKind {
    Fixed,
    Exponential,
}

impl std::fmt::Display for BackoffKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackoffKind::Fixed => write!(f, "FIXED"),
            BackoffKind::Exponential => write!(f, "EXPONENTIAL"),
        }
    }
}

/// Per-enqueue retry configuration surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: i32,
    pub backoff: BackoffKind,
    pub base_delay_ms: i64,
    pub max_delay_ms: Option<i64>,
    /// Spread retry delays by a deterministic per-job factor
    pub jitter: bool,
    pub remove_on_complete: bool,
    pub remove_on_fail: bool,
}

impl Default for RetryConfig {
    /// Producer defaults: 8 attempts, exponential backoff from 60s,
    /// terminal jobs purged immediately
    fn default() -> Self {
        Self {
            max_attempts: 8,
            backoff: BackoffKind::Exponential,
            base_delay_ms: 60_000,
            max_delay_ms: None,
            jitter: false,
            remove_on_complete: true,
            remove_on_fail: true,
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> crate::domain::error::Result<()> {
        if self.max_attempts < 1 {
            return Err(crate::domain::error::DomainError::InvalidRetryConfig(
                format!("max_attempts must be >= 1, got {}", self.max_attempts),
            ));
        }
        if self.base_delay_ms < 0 {
            return Err(crate::domain::error::DomainError::InvalidRetryConfig(
                format!("base_delay_ms must be >= 0, got {}", self.base_delay_ms),
            ));
        }
        Ok(())
    }
}

/// Job Entity
///
/// Immutable description of one unit of work (the payload) plus the
/// scheduling metadata the queue store mutates on claim/succeed/fail.
/// All timestamps are epoch milliseconds injected via TimeProvider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub payload: String,
    pub state: JobState,

    pub attempts: i32,
    pub max_attempts: i32,
    pub backoff: BackoffKind,
    pub base_delay_ms: i64,
    pub max_delay_ms: Option<i64>,
    pub jitter: bool,
    pub remove_on_complete: bool,
    pub remove_on_fail: bool,

    /// Timestamp before which the job must not be claimed (None = now)
    pub next_eligible_at: Option<i64>,
    /// Most recent failure reason, cleared on success
    pub last_error: Option<String>,
    /// Lease deadline set on claim; expired Active jobs are recoverable
    pub lease_expires_at: Option<i64>,

    pub created_at: i64,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
}

impl Job {
    /// Create a new Pending job
    ///
    /// # Arguments
    ///
    /// * `id` - Unique job ID (injected, not generated)
    /// * `created_at` - Creation timestamp in epoch ms (injected, not system time)
    /// * `payload` - Opaque task input (e.g. a feed URL)
    /// * `retry` - Per-job retry configuration
    pub fn new(
        id: impl Into<String>,
        created_at: i64,
        payload: impl Into<String>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            id: id.into(),
            payload: payload.into(),
            state: JobState::Pending,

            attempts: 0,
            max_attempts: retry.max_attempts,
            backoff: retry.backoff,
            base_delay_ms: retry.base_delay_ms,
            max_delay_ms: retry.max_delay_ms,
            jitter: retry.jitter,
            remove_on_complete: retry.remove_on_complete,
            remove_on_fail: retry.remove_on_fail,

            next_eligible_at: None,
            last_error: None,
            lease_expires_at: None,

            created_at,
            started_at: None,
            finished_at: None,
        }
    }

    /// Whether the job may be handed to a worker at `now_millis`
    pub fn is_eligible(&self, now_millis: i64) -> bool {
        self.state == JobState::Pending
            && self.next_eligible_at.map_or(true, |t| t <= now_millis)
    }

    /// Claim the job for a worker: Pending -> Active
    ///
    /// Increments the attempt counter and stamps the lease deadline.
    pub fn claim(
        &mut self,
        now_millis: i64,
        lease_ttl_ms: i64,
    ) -> crate::domain::error::Result<()> {
        if self.state != JobState::Pending {
            return Err(crate::domain::error::DomainError::InvalidStateTransition {
                from: self.state.to_string(),
                to: "ACTIVE".to_string(),
            });
        }
        self.state = JobState::Active;
        self.attempts += 1;
        self.started_at = Some(now_millis);
        self.lease_expires_at = Some(now_millis + lease_ttl_ms);
        Ok(())
    }

    /// Retire the job successfully: Active -> Completed
    pub fn complete(&mut self, now_millis: i64) -> crate::domain::error::Result<()> {
        if self.state != JobState::Active {
            return Err(crate::domain::error::DomainError::InvalidStateTransition {
                from: self.state.to_string(),
                to: "COMPLETED".to_string(),
            });
        }
        self.state = JobState::Completed;
        self.finished_at = Some(now_millis);
        self.last_error = None;
        self.lease_expires_at = None;
        Ok(())
    }

    /// Return the job to the pool after a recoverable failure:
    /// Active -> Pending, eligible again at `next_eligible_at`
    pub fn reschedule(
        &mut self,
        next_eligible_at: i64,
        error: impl Into<String>,
    ) -> crate::domain::error::Result<()> {
        if self.state != JobState::Active {
            return Err(crate::domain::error::DomainError::InvalidStateTransition {
                from: self.state.to_string(),
                to: "PENDING".to_string(),
            });
        }
        self.state = JobState::Pending;
        self.next_eligible_at = Some(next_eligible_at);
        self.last_error = Some(error.into());
        self.started_at = None;
        self.lease_expires_at = None;
        Ok(())
    }

    /// Retire the job after exhausting retries: Active -> Failed (terminal)
    pub fn fail(
        &mut self,
        now_millis: i64,
        error: impl Into<String>,
    ) -> crate::domain::error::Result<()> {
        if self.state != JobState::Active {
            return Err(crate::domain::error::DomainError::InvalidStateTransition {
                from: self.state.to_string(),
                to: "FAILED".to_string(),
            });
        }
        self.state = JobState::Failed;
        self.finished_at = Some(now_millis);
        self.last_error = Some(error.into());
        self.lease_expires_at = None;
        Ok(())
    }

    /// Recover an abandoned lease: Active -> Pending
    ///
    /// Attempts stay as they were; the next claim increments again.
    pub fn release_lease(&mut self) -> crate::domain::error::Result<()> {
        if self.state != JobState::Active {
            return Err(crate::domain::error::DomainError::InvalidStateTransition {
                from: self.state.to_string(),
                to: "PENDING".to_string(),
            });
        }
        self.state = JobState::Pending;
        self.started_at = None;
        self.lease_expires_at = None;
        Ok(())
    }

    /// Whether retries are exhausted (attempts have reached the ceiling)
    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

impl Job {
    /// Create a test job with deterministic ID and timestamp.
    ///
    /// Uses a simple counter for deterministic test IDs (test-1, test-2, ...).
    /// Timestamps start at 1000 and increment by 1000.
    ///
    /// **Note**: This method should only be used in tests. For production code,
    /// always inject ID and time via providers.
    pub fn new_test(payload: impl Into<String>, retry: RetryConfig) -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static TEST_COUNTER: AtomicU64 = AtomicU64::new(1);

        let counter = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let id = format!("test-{}", counter);
        let created_at = (counter * 1000) as i64;

        Self::new(id, created_at, payload, retry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::DomainError;

    #[test]
    fn test_new_job_is_pending_and_eligible() {
        let job = Job::new("j-1", 1000, "http://a.com/feed", RetryConfig::default());

        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.attempts, 0);
        assert_eq!(job.max_attempts, 8);
        assert!(job.next_eligible_at.is_none());
        assert!(job.is_eligible(1000));
    }

    #[test]
    fn test_claim_increments_attempts_and_stamps_lease() {
        let mut job = Job::new("j-1", 1000, "http://a.com/feed", RetryConfig::default());

        job.claim(2000, 60_000).unwrap();

        assert_eq!(job.state, JobState::Active);
        assert_eq!(job.attempts, 1);
        assert_eq!(job.started_at, Some(2000));
        assert_eq!(job.lease_expires_at, Some(62_000));
    }

    #[test]
    fn test_double_claim_is_rejected() {
        let mut job = Job::new("j-1", 1000, "http://a.com/feed", RetryConfig::default());
        job.claim(2000, 60_000).unwrap();

        let err = job.claim(2100, 60_000).unwrap_err();
        assert!(matches!(
            err,
            DomainError::InvalidStateTransition { .. }
        ));
    }

    #[test]
    fn test_complete_clears_last_error() {
        let mut job = Job::new("j-1", 1000, "http://a.com/feed", RetryConfig::default());
        job.claim(2000, 60_000).unwrap();
        job.reschedule(3000, "boom").unwrap();
        job.claim(3000, 60_000).unwrap();
        job.complete(4000).unwrap();

        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.finished_at, Some(4000));
        assert!(job.last_error.is_none());
    }

    #[test]
    fn test_terminal_states_never_revisited() {
        let mut job = Job::new("j-1", 1000, "http://a.com/feed", RetryConfig::default());
        job.claim(2000, 60_000).unwrap();
        job.fail(3000, "exhausted").unwrap();

        assert!(job.claim(4000, 60_000).is_err());
        assert!(job.complete(4000).is_err());
        assert!(job.reschedule(4000, "again").is_err());
    }

    #[test]
    fn test_release_lease_keeps_attempts() {
        let mut job = Job::new("j-1", 1000, "http://a.com/feed", RetryConfig::default());
        job.claim(2000, 60_000).unwrap();
        job.release_lease().unwrap();

        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.attempts, 1);
        assert!(job.started_at.is_none());
        assert!(job.lease_expires_at.is_none());
    }

    #[test]
    fn test_retry_config_validation() {
        let mut cfg = RetryConfig::default();
        cfg.max_attempts = 0;
        assert!(cfg.validate().is_err());

        cfg.max_attempts = 1;
        assert!(cfg.validate().is_ok());
    }
}
