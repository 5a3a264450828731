// Queue Store - owns every job state transition

use crate::application::backoff;
use crate::domain::{Job, JobId, JobState, RetryConfig};
use crate::error::{AppError, Result};
use crate::port::{IdProvider, JobRepository, TimeProvider};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Default lease TTL: an Active job whose worker vanishes becomes
/// claimable again after this long (5 minutes)
pub const DEFAULT_LEASE_TTL_MS: i64 = 5 * 60 * 1000;

/// Read-only counts by state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    pub pending: i64,
    pub active: i64,
    pub completed: i64,
    pub failed: i64,
}

/// Durable job queue with retry/backoff semantics.
///
/// Composed from the repository port plus injected clock and id providers;
/// the repository guarantees claim atomicity, the store decides what each
/// outcome means (retire, reschedule with backoff, or exhaust).
pub struct QueueStore {
    repo: Arc<dyn JobRepository>,
    time_provider: Arc<dyn TimeProvider>,
    id_provider: Arc<dyn IdProvider>,
    lease_ttl_ms: i64,
}

impl QueueStore {
    pub fn new(
        repo: Arc<dyn JobRepository>,
        time_provider: Arc<dyn TimeProvider>,
        id_provider: Arc<dyn IdProvider>,
    ) -> Self {
        Self::with_lease_ttl(repo, time_provider, id_provider, DEFAULT_LEASE_TTL_MS)
    }

    pub fn with_lease_ttl(
        repo: Arc<dyn JobRepository>,
        time_provider: Arc<dyn TimeProvider>,
        id_provider: Arc<dyn IdProvider>,
        lease_ttl_ms: i64,
    ) -> Self {
        Self {
            repo,
            time_provider,
            id_provider,
            lease_ttl_ms,
        }
    }

    pub fn repository(&self) -> Arc<dyn JobRepository> {
        Arc::clone(&self.repo)
    }

    /// Admit a new job: Pending, attempts = 0, eligible immediately.
    /// Never blocks on consumers.
    pub async fn enqueue(&self, payload: impl Into<String>, retry: RetryConfig) -> Result<JobId> {
        let payload = payload.into();
        if payload.is_empty() {
            return Err(AppError::Enqueue("empty payload".to_string()));
        }
        retry.validate().map_err(|e| AppError::Enqueue(e.to_string()))?;

        let job_id = self.id_provider.generate_id();
        let created_at = self.time_provider.now_millis();
        let job = Job::new(job_id.clone(), created_at, payload, retry);

        self.repo
            .insert(&job)
            .await
            .map_err(|e| AppError::Enqueue(e.to_string()))?;

        info!(job_id = %job_id, payload = %job.payload, "Job enqueued");
        Ok(job_id)
    }

    /// Atomically claim the next eligible job for a worker.
    ///
    /// FIFO among equally-eligible Pending jobs; the claim increments the
    /// attempt counter and stamps the lease deadline.
    pub async fn claim_next(&self) -> Result<Option<Job>> {
        let now = self.time_provider.now_millis();
        let claimed = self.repo.claim_next(now, self.lease_ttl_ms).await?;

        if let Some(job) = &claimed {
            debug!(
                job_id = %job.id,
                attempt = %job.attempts,
                max_attempts = %job.max_attempts,
                "Job claimed"
            );
        }
        Ok(claimed)
    }

    /// Retire a job successfully. Idempotent: a second report (or a report
    /// after a lost lease) is a logged no-op.
    pub async fn report_success(&self, id: &JobId) -> Result<()> {
        let now = self.time_provider.now_millis();

        // Read first so the retention flag survives the purge decision
        let job = match self.repo.find_by_id(id).await? {
            Some(job) => job,
            None => {
                debug!(job_id = %id, "Success reported for unknown job (already purged)");
                return Ok(());
            }
        };

        if !self.repo.mark_completed(id, now).await? {
            debug!(job_id = %id, state = %job.state, "Success report ignored (job not active)");
            return Ok(());
        }

        info!(job_id = %id, attempts = %job.attempts, "Job completed");

        if job.remove_on_complete {
            self.repo.delete(id).await?;
        }
        Ok(())
    }

    /// Report a failed execution attempt.
    ///
    /// Below the attempt ceiling the job is rescheduled to Pending with a
    /// backoff delay computed from its own configuration; at the ceiling it
    /// transitions to Failed (terminal). No-op when the job is not Active.
    pub async fn report_failure(&self, id: &JobId, error: &str) -> Result<()> {
        let now = self.time_provider.now_millis();

        let job = match self.repo.find_by_id(id).await? {
            Some(job) => job,
            None => {
                debug!(job_id = %id, "Failure reported for unknown job (already purged)");
                return Ok(());
            }
        };

        if job.is_exhausted() {
            if !self.repo.mark_failed(id, now, error).await? {
                debug!(job_id = %id, state = %job.state, "Failure report ignored (job not active)");
                return Ok(());
            }

            warn!(
                job_id = %id,
                attempts = %job.attempts,
                max_attempts = %job.max_attempts,
                error = %error,
                "Job failed permanently, max attempts reached"
            );

            if job.remove_on_fail {
                self.repo.delete(id).await?;
            }
            return Ok(());
        }

        // The attempt that just failed is the current counter value
        let mut delay = backoff::delay_ms(
            job.backoff,
            job.base_delay_ms,
            job.max_delay_ms,
            job.attempts,
        );
        if job.jitter {
            delay = backoff::with_jitter(delay, &job.id);
        }
        let next_eligible_at = now + delay;

        if !self.repo.reschedule(id, next_eligible_at, error).await? {
            debug!(job_id = %id, state = %job.state, "Failure report ignored (job not active)");
            return Ok(());
        }

        info!(
            job_id = %id,
            attempt = %job.attempts,
            max_attempts = %job.max_attempts,
            delay_ms = %delay,
            error = %error,
            "Job rescheduled for retry"
        );
        Ok(())
    }

    /// Read-only counts by state; never mutates.
    pub async fn stats(&self) -> Result<QueueStats> {
        Ok(QueueStats {
            pending: self.repo.count_by_state(JobState::Pending).await?,
            active: self.repo.count_by_state(JobState::Active).await?,
            completed: self.repo.count_by_state(JobState::Completed).await?,
            failed: self.repo.count_by_state(JobState::Failed).await?,
        })
    }
}
