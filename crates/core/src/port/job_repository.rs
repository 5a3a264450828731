// Job Repository Port (Interface)

use crate::domain::{Job, JobId, JobState};
use crate::error::Result;
use async_trait::async_trait;

/// Repository interface for Job persistence
///
/// The guarded transition methods (`mark_completed`, `mark_failed`,
/// `reschedule`) only touch rows still in `Active` state and report whether
/// a row transitioned. The queue store builds its idempotence on that.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Insert a new job
    async fn insert(&self, job: &Job) -> Result<()>;

    /// Find job by ID
    async fn find_by_id(&self, id: &JobId) -> Result<Option<Job>>;

    /// Update job (full record)
    async fn update(&self, job: &Job) -> Result<()>;

    /// Atomically claim the next eligible Pending job (FIFO tie-break)
    ///
    /// Transitions it to Active, increments attempts, stamps started_at and
    /// the lease deadline. Exactly one concurrent caller wins a given job.
    async fn claim_next(&self, now_millis: i64, lease_ttl_ms: i64) -> Result<Option<Job>>;

    /// Active -> Completed; returns false if the job was not Active
    async fn mark_completed(&self, id: &JobId, now_millis: i64) -> Result<bool>;

    /// Active -> Failed (terminal); returns false if the job was not Active
    async fn mark_failed(&self, id: &JobId, now_millis: i64, error: &str) -> Result<bool>;

    /// Active -> Pending with a new eligibility time; returns false if the
    /// job was not Active
    async fn reschedule(&self, id: &JobId, next_eligible_at: i64, error: &str) -> Result<bool>;

    /// Remove a job record (retention policy purge)
    async fn delete(&self, id: &JobId) -> Result<()>;

    /// Count jobs by state
    async fn count_by_state(&self, state: JobState) -> Result<i64>;

    /// Find all jobs in a state, oldest first
    async fn find_by_state(&self, state: JobState) -> Result<Vec<Job>>;

    /// Return Active jobs whose lease expired before `now_millis` to
    /// Pending, attempts untouched. Returns the number released.
    async fn release_expired_leases(&self, now_millis: i64) -> Result<u64>;
}

// ============================================================================
// In-memory implementation (tests and embedded use)
// ============================================================================

pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct Inner {
        jobs: HashMap<JobId, Job>,
        /// Insertion order, for the FIFO tie-break among eligible jobs
        order: Vec<JobId>,
    }

    /// Mutex-backed repository. A single lock per operation gives the same
    /// atomicity the SQLite adapter gets from transactional UPDATEs.
    pub struct InMemoryJobRepository {
        inner: Mutex<Inner>,
    }

    impl InMemoryJobRepository {
        pub fn new() -> Self {
            Self {
                inner: Mutex::new(Inner {
                    jobs: HashMap::new(),
                    order: Vec::new(),
                }),
            }
        }
    }

    impl Default for InMemoryJobRepository {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl JobRepository for InMemoryJobRepository {
        async fn insert(&self, job: &Job) -> Result<()> {
            let mut inner = self.inner.lock().unwrap();
            if inner.jobs.contains_key(&job.id) {
                return Err(crate::error::AppError::Database(format!(
                    "duplicate job id: {}",
                    job.id
                )));
            }
            inner.order.push(job.id.clone());
            inner.jobs.insert(job.id.clone(), job.clone());
            Ok(())
        }

        async fn find_by_id(&self, id: &JobId) -> Result<Option<Job>> {
            let inner = self.inner.lock().unwrap();
            Ok(inner.jobs.get(id).cloned())
        }

        async fn update(&self, job: &Job) -> Result<()> {
            let mut inner = self.inner.lock().unwrap();
            match inner.jobs.get_mut(&job.id) {
                Some(slot) => {
                    *slot = job.clone();
                    Ok(())
                }
                None => Err(crate::error::AppError::NotFound(format!(
                    "Job {} not found",
                    job.id
                ))),
            }
        }

        async fn claim_next(&self, now_millis: i64, lease_ttl_ms: i64) -> Result<Option<Job>> {
            let mut inner = self.inner.lock().unwrap();
            let candidate = inner
                .order
                .iter()
                .find(|id| {
                    inner
                        .jobs
                        .get(*id)
                        .map_or(false, |j| j.is_eligible(now_millis))
                })
                .cloned();

            match candidate {
                Some(id) => {
                    let job = inner.jobs.get_mut(&id).ok_or_else(|| {
                        crate::error::AppError::NotFound(format!("Job {} not found", id))
                    })?;
                    job.claim(now_millis, lease_ttl_ms)?;
                    Ok(Some(job.clone()))
                }
                None => Ok(None),
            }
        }

        async fn mark_completed(&self, id: &JobId, now_millis: i64) -> Result<bool> {
            let mut inner = self.inner.lock().unwrap();
            match inner.jobs.get_mut(id) {
                Some(job) if job.state == JobState::Active => {
                    job.complete(now_millis)?;
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn mark_failed(&self, id: &JobId, now_millis: i64, error: &str) -> Result<bool> {
            let mut inner = self.inner.lock().unwrap();
            match inner.jobs.get_mut(id) {
                Some(job) if job.state == JobState::Active => {
                    job.fail(now_millis, error)?;
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn reschedule(
            &self,
            id: &JobId,
            next_eligible_at: i64,
            error: &str,
        ) -> Result<bool> {
            let mut inner = self.inner.lock().unwrap();
            match inner.jobs.get_mut(id) {
                Some(job) if job.state == JobState::Active => {
                    job.reschedule(next_eligible_at, error)?;
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn delete(&self, id: &JobId) -> Result<()> {
            let mut inner = self.inner.lock().unwrap();
            inner.jobs.remove(id);
            inner.order.retain(|existing| existing != id);
            Ok(())
        }

        async fn count_by_state(&self, state: JobState) -> Result<i64> {
            let inner = self.inner.lock().unwrap();
            Ok(inner.jobs.values().filter(|j| j.state == state).count() as i64)
        }

        async fn find_by_state(&self, state: JobState) -> Result<Vec<Job>> {
            let inner = self.inner.lock().unwrap();
            let mut jobs: Vec<Job> = inner
                .jobs
                .values()
                .filter(|j| j.state == state)
                .cloned()
                .collect();
            jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
            Ok(jobs)
        }

        async fn release_expired_leases(&self, now_millis: i64) -> Result<u64> {
            let mut inner = self.inner.lock().unwrap();
            let mut released = 0u64;
            for job in inner.jobs.values_mut() {
                if job.state == JobState::Active
                    && job.lease_expires_at.map_or(false, |t| t < now_millis)
                {
                    job.release_lease()?;
                    released += 1;
                }
            }
            Ok(released)
        }
    }
}
