// SQLite JobRepository Implementation

use async_trait::async_trait;
use feedrelay_core::domain::{BackoffKind, Job, JobId, JobState};
use feedrelay_core::error::{AppError, Result};
use feedrelay_core::port::JobRepository;
use sqlx::SqlitePool;

// Helper to convert sqlx::Error to AppError with structured information
fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => {
            if let Some(code) = db_err.code() {
                let code_str = code.as_ref();

                // SQLite error codes: https://www.sqlite.org/rescode.html
                match code_str {
                    "2067" | "1555" => AppError::Database(format!(
                        "Unique constraint violation: {} ({})",
                        db_err.message(),
                        code_str
                    )),
                    "5" => AppError::Database(format!(
                        "Database locked (SQLITE_BUSY): {}",
                        db_err.message()
                    )),
                    "13" => AppError::Database(format!("Database full: {}", db_err.message())),
                    _ => AppError::Database(format!(
                        "Database error [{}]: {}",
                        code_str,
                        db_err.message()
                    )),
                }
            } else {
                AppError::Database(format!("Database error: {}", db_err.message()))
            }
        }
        sqlx::Error::RowNotFound => AppError::Database("Row not found".to_string()),
        sqlx::Error::ColumnNotFound(col) => {
            AppError::Database(format!("Column not found: {}", col))
        }
        _ => AppError::Database(err.to_string()),
    }
}

pub struct SqliteJobRepository {
    pool: SqlitePool,
}

impl SqliteJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRepository for SqliteJobRepository {
    async fn insert(&self, job: &Job) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, payload, state,
                attempts, max_attempts, backoff, base_delay_ms, max_delay_ms,
                jitter, remove_on_complete, remove_on_fail,
                next_eligible_at, last_error, lease_expires_at,
                created_at, started_at, finished_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(&job.payload)
        .bind(job.state.to_string())
        .bind(job.attempts)
        .bind(job.max_attempts)
        .bind(job.backoff.to_string())
        .bind(job.base_delay_ms)
        .bind(job.max_delay_ms)
        .bind(if job.jitter { 1 } else { 0 })
        .bind(if job.remove_on_complete { 1 } else { 0 })
        .bind(if job.remove_on_fail { 1 } else { 0 })
        .bind(job.next_eligible_at)
        .bind(&job.last_error)
        .bind(job.lease_expires_at)
        .bind(job.created_at)
        .bind(job.started_at)
        .bind(job.finished_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn find_by_id(&self, id: &JobId) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(|r| r.into_job()))
    }

    async fn update(&self, job: &Job) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = ?, attempts = ?,
                next_eligible_at = ?, last_error = ?, lease_expires_at = ?,
                started_at = ?, finished_at = ?
            WHERE id = ?
            "#,
        )
        .bind(job.state.to_string())
        .bind(job.attempts)
        .bind(job.next_eligible_at)
        .bind(&job.last_error)
        .bind(job.lease_expires_at)
        .bind(job.started_at)
        .bind(job.finished_at)
        .bind(&job.id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Job {} not found", job.id)));
        }
        Ok(())
    }

    async fn claim_next(&self, now_millis: i64, lease_ttl_ms: i64) -> Result<Option<Job>> {
        // Single transactional UPDATE: concurrent callers never win the
        // same row. FIFO tie-break among equally-eligible pending jobs.
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE jobs
            SET state = 'ACTIVE',
                attempts = attempts + 1,
                started_at = ?,
                lease_expires_at = ?
            WHERE id = (
                SELECT j.id FROM jobs j
                WHERE j.state = 'PENDING'
                  AND (j.next_eligible_at IS NULL OR j.next_eligible_at <= ?)
                ORDER BY j.created_at ASC, j.id ASC
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .bind(now_millis)
        .bind(now_millis + lease_ttl_ms)
        .bind(now_millis)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(|r| r.into_job()))
    }

    async fn mark_completed(&self, id: &JobId, now_millis: i64) -> Result<bool> {
        // Conditional update: only an Active job can complete. A zero row
        // count means a duplicate or stale report and is not an error.
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'COMPLETED', finished_at = ?, last_error = NULL,
                lease_expires_at = NULL
            WHERE id = ? AND state = 'ACTIVE'
            "#,
        )
        .bind(now_millis)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_failed(&self, id: &JobId, now_millis: i64, error: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'FAILED', finished_at = ?, last_error = ?,
                lease_expires_at = NULL
            WHERE id = ? AND state = 'ACTIVE'
            "#,
        )
        .bind(now_millis)
        .bind(error)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn reschedule(&self, id: &JobId, next_eligible_at: i64, error: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'PENDING', next_eligible_at = ?, last_error = ?,
                started_at = NULL, lease_expires_at = NULL
            WHERE id = ? AND state = 'ACTIVE'
            "#,
        )
        .bind(next_eligible_at)
        .bind(error)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: &JobId) -> Result<()> {
        sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn count_by_state(&self, state: JobState) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE state = ?")
            .bind(state.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(count)
    }

    async fn find_by_state(&self, state: JobState) -> Result<Vec<Job>> {
        let rows: Vec<JobRow> = sqlx::query_as(
            r#"
            SELECT * FROM jobs
            WHERE state = ?
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(state.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(|row| row.into_job()).collect())
    }

    async fn release_expired_leases(&self, now_millis: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'PENDING', started_at = NULL, lease_expires_at = NULL
            WHERE state = 'ACTIVE' AND lease_expires_at < ?
            "#,
        )
        .bind(now_millis)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }
}

/// SQLite row representation
#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: String,
    payload: String,
    state: String,

    attempts: i32,
    max_attempts: i32,
    backoff: String,
    base_delay_ms: i64,
    max_delay_ms: Option<i64>,
    jitter: i32,             // SQLite boolean as integer
    remove_on_complete: i32, // SQLite boolean as integer
    remove_on_fail: i32,     // SQLite boolean as integer

    next_eligible_at: Option<i64>,
    last_error: Option<String>,
    lease_expires_at: Option<i64>,

    created_at: i64,
    started_at: Option<i64>,
    finished_at: Option<i64>,
}

impl JobRow {
    fn into_job(self) -> Job {
        let state = match self.state.as_str() {
            "PENDING" => JobState::Pending,
            "ACTIVE" => JobState::Active,
            "COMPLETED" => JobState::Completed,
            _ => JobState::Failed, // Default fallback
        };

        let backoff = match self.backoff.as_str() {
            "FIXED" => BackoffKind::Fixed,
            _ => BackoffKind::Exponential,
        };

        Job {
            id: self.id,
            payload: self.payload,
            state,

            attempts: self.attempts,
            max_attempts: self.max_attempts,
            backoff,
            base_delay_ms: self.base_delay_ms,
            max_delay_ms: self.max_delay_ms,
            jitter: self.jitter != 0,
            remove_on_complete: self.remove_on_complete != 0,
            remove_on_fail: self.remove_on_fail != 0,

            next_eligible_at: self.next_eligible_at,
            last_error: self.last_error,
            lease_expires_at: self.lease_expires_at,

            created_at: self.created_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};
    use feedrelay_core::domain::RetryConfig;

    async fn setup_test_db() -> SqlitePool {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    fn retained(payload: &str, created_at: i64) -> Job {
        let retry = RetryConfig {
            remove_on_complete: false,
            remove_on_fail: false,
            ..RetryConfig::default()
        };
        Job::new(
            format!("id-{}-{}", payload.len(), created_at),
            created_at,
            payload,
            retry,
        )
    }

    #[tokio::test]
    async fn test_insert_and_find_roundtrip() {
        let pool = setup_test_db().await;
        let repo = SqliteJobRepository::new(pool);

        let job = Job::new_test("http://a.com/feed", RetryConfig::default());
        repo.insert(&job).await.unwrap();

        let found = repo.find_by_id(&job.id).await.unwrap().unwrap();
        assert_eq!(found.id, job.id);
        assert_eq!(found.payload, "http://a.com/feed");
        assert_eq!(found.state, JobState::Pending);
        assert_eq!(found.max_attempts, 8);
        assert_eq!(found.backoff, BackoffKind::Exponential);
        assert!(found.remove_on_complete);
        assert!(found.remove_on_fail);
    }

    #[tokio::test]
    async fn test_claim_next_is_fifo_and_increments_attempts() {
        let pool = setup_test_db().await;
        let repo = SqliteJobRepository::new(pool);

        repo.insert(&retained("http://a.com", 1000)).await.unwrap();
        repo.insert(&retained("http://b.com", 2000)).await.unwrap();

        let first = repo.claim_next(5000, 60_000).await.unwrap().unwrap();
        assert_eq!(first.payload, "http://a.com");
        assert_eq!(first.attempts, 1);
        assert_eq!(first.state, JobState::Active);
        assert_eq!(first.lease_expires_at, Some(65_000));

        let second = repo.claim_next(5000, 60_000).await.unwrap().unwrap();
        assert_eq!(second.payload, "http://b.com");

        assert!(repo.claim_next(5000, 60_000).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claim_next_skips_ineligible_jobs() {
        let pool = setup_test_db().await;
        let repo = SqliteJobRepository::new(pool);

        let mut job = retained("http://a.com", 1000);
        job.next_eligible_at = Some(10_000);
        repo.insert(&job).await.unwrap();

        assert!(repo.claim_next(9_999, 60_000).await.unwrap().is_none());
        assert!(repo.claim_next(10_000, 60_000).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_guarded_transitions() {
        let pool = setup_test_db().await;
        let repo = SqliteJobRepository::new(pool);

        let job = retained("http://a.com", 1000);
        let id = job.id.clone();
        repo.insert(&job).await.unwrap();

        // Pending: no guarded transition applies
        assert!(!repo.mark_completed(&id, 2000).await.unwrap());
        assert!(!repo.mark_failed(&id, 2000, "x").await.unwrap());
        assert!(!repo.reschedule(&id, 3000, "x").await.unwrap());

        repo.claim_next(2000, 60_000).await.unwrap().unwrap();
        assert!(repo.reschedule(&id, 3000, "first failure").await.unwrap());

        let rescheduled = repo.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(rescheduled.state, JobState::Pending);
        assert_eq!(rescheduled.next_eligible_at, Some(3000));
        assert_eq!(rescheduled.last_error.as_deref(), Some("first failure"));
        assert!(rescheduled.started_at.is_none());

        repo.claim_next(3000, 60_000).await.unwrap().unwrap();
        assert!(repo.mark_completed(&id, 4000).await.unwrap());
        // Idempotent: second completion reports false
        assert!(!repo.mark_completed(&id, 5000).await.unwrap());

        let done = repo.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(done.state, JobState::Completed);
        assert!(done.last_error.is_none());
    }

    #[tokio::test]
    async fn test_release_expired_leases() {
        let pool = setup_test_db().await;
        let repo = SqliteJobRepository::new(pool);

        repo.insert(&retained("http://a.com", 1000)).await.unwrap();
        repo.claim_next(2000, 1_000).await.unwrap().unwrap();

        assert_eq!(repo.release_expired_leases(2_500).await.unwrap(), 0);
        assert_eq!(repo.release_expired_leases(3_500).await.unwrap(), 1);

        let jobs = repo.find_by_state(JobState::Pending).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].attempts, 1);
        assert!(jobs[0].lease_expires_at.is_none());
    }

    #[tokio::test]
    async fn test_delete_and_count() {
        let pool = setup_test_db().await;
        let repo = SqliteJobRepository::new(pool);

        let job = retained("http://a.com", 1000);
        let id = job.id.clone();
        repo.insert(&job).await.unwrap();

        assert_eq!(repo.count_by_state(JobState::Pending).await.unwrap(), 1);
        repo.delete(&id).await.unwrap();
        assert_eq!(repo.count_by_state(JobState::Pending).await.unwrap(), 0);
        assert!(repo.find_by_id(&id).await.unwrap().is_none());
    }
}
