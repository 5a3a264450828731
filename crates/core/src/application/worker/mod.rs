// Worker - Job execution loop

pub mod constants;
mod shutdown;

use constants::*;
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::application::queue::QueueStore;
use crate::error::Result;
use crate::port::{FeedTask, TaskError};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info};

/// Per-worker tunables
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum execution time per job; overruns count as failures
    pub task_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            task_timeout: DEFAULT_TASK_TIMEOUT,
        }
    }
}

/// Worker claims eligible jobs and drives the task body to an outcome.
/// Workers are symmetric: any number of them can share one queue store.
pub struct Worker {
    store: Arc<QueueStore>,
    task: Arc<dyn FeedTask>,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(store: Arc<QueueStore>, task: Arc<dyn FeedTask>, config: WorkerConfig) -> Self {
        Self {
            store,
            task,
            config,
        }
    }

    /// Run worker loop with graceful shutdown support
    pub async fn run(&self, mut shutdown: ShutdownToken) -> Result<()> {
        info!("Worker started");
        loop {
            // Check for shutdown signal
            if shutdown.is_shutdown() {
                info!("Worker shutting down");
                break;
            }
            match self.process_next_job().await {
                Ok(processed) => {
                    if !processed {
                        // No job available, sleep briefly (or wait for shutdown)
                        tokio::select! {
                            _ = sleep(IDLE_SLEEP_DURATION) => {},
                            _ = shutdown.wait() => {
                                info!("Worker interrupted during idle");
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    error!("Worker error: {}", e);
                    tokio::select! {
                        _ = sleep(ERROR_RECOVERY_SLEEP_DURATION) => {},
                        _ = shutdown.wait() => {
                            info!("Worker interrupted during error recovery");
                            break;
                        }
                    }
                }
            }
        }
        info!("Worker stopped");
        Ok(())
    }

    /// Process next job from the queue (returns true if a job was claimed)
    pub async fn process_next_job(&self) -> Result<bool> {
        let job = match self.store.claim_next().await? {
            Some(j) => j,
            None => return Ok(false), // No job available
        };

        info!(
            job_id = %job.id,
            attempt = %job.attempts,
            payload = %job.payload,
            "Processing job"
        );

        let timeout_ms = self.config.task_timeout.as_millis() as i64;

        // The body runs on its own task so a panic inside it is caught at
        // the join boundary and charged as a failed attempt; the worker
        // loop itself must survive any task body.
        let task = Arc::clone(&self.task);
        let payload = job.payload.clone();
        let mut body = tokio::spawn(async move { task.run(&payload).await });

        match tokio::time::timeout(self.config.task_timeout, &mut body).await {
            Ok(Ok(Ok(()))) => {
                debug!(job_id = %job.id, "Task body succeeded");
                self.store.report_success(&job.id).await?;
            }
            Ok(Ok(Err(e))) => {
                self.store.report_failure(&job.id, &e.to_string()).await?;
            }
            Ok(Err(join_err)) => {
                let msg = panic_message(join_err);
                error!(job_id = %job.id, panic = %msg, "Task body panicked");
                let e = TaskError::Failed(format!("task body panicked: {}", msg));
                self.store.report_failure(&job.id, &e.to_string()).await?;
            }
            Err(_elapsed) => {
                body.abort();
                let e = TaskError::Timeout(timeout_ms);
                self.store.report_failure(&job.id, &e.to_string()).await?;
            }
        }
        Ok(true)
    }
}

/// Extract a readable message from a panicked task-body join
fn panic_message(err: tokio::task::JoinError) -> String {
    match err.try_into_panic() {
        Ok(payload) => {
            if let Some(s) = payload.downcast_ref::<&str>() {
                (*s).to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic".to_string()
            }
        }
        Err(join_err) => join_err.to_string(),
    }
}

/// N symmetric workers sharing one queue store and one task body
pub struct WorkerPool {
    handles: Vec<tokio::task::JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `size` workers, each on its own tokio task
    pub fn spawn(
        store: Arc<QueueStore>,
        task: Arc<dyn FeedTask>,
        config: WorkerConfig,
        size: usize,
        shutdown: ShutdownToken,
    ) -> Self {
        let mut handles = Vec::with_capacity(size);
        for worker_index in 0..size {
            let worker = Worker::new(Arc::clone(&store), Arc::clone(&task), config.clone());
            let token = shutdown.clone();
            handles.push(tokio::spawn(async move {
                if let Err(e) = worker.run(token).await {
                    error!(worker = worker_index, error = %e, "Worker failed");
                }
            }));
        }
        info!(size = size, "Worker pool spawned");
        Self { handles }
    }

    /// Await every worker; call after signaling shutdown
    pub async fn join(self) {
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::queue::QueueStore;
    use crate::domain::{BackoffKind, JobState, RetryConfig};
    use crate::port::feed_task::mocks::MockFeedTask;
    use crate::port::id_provider::SequentialIdProvider;
    use crate::port::job_repository::memory::InMemoryJobRepository;
    use crate::port::time_provider::SystemTimeProvider;
    use crate::port::JobRepository;

    fn test_store() -> Arc<QueueStore> {
        Arc::new(QueueStore::new(
            Arc::new(InMemoryJobRepository::new()),
            Arc::new(SystemTimeProvider),
            Arc::new(SequentialIdProvider::new()),
        ))
    }

    fn retained(max_attempts: i32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            backoff: BackoffKind::Fixed,
            base_delay_ms: 0,
            max_delay_ms: None,
            jitter: false,
            remove_on_complete: false,
            remove_on_fail: false,
        }
    }

    #[tokio::test]
    async fn test_worker_completes_successful_job() {
        let store = test_store();
        let task = Arc::new(MockFeedTask::new_success());
        let worker = Worker::new(store.clone(), task.clone(), WorkerConfig::default());

        let id = store.enqueue("http://a.com", retained(3)).await.unwrap();
        assert!(worker.process_next_job().await.unwrap());

        let job = store.repository().find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(task.call_count(), 1);
    }

    #[tokio::test]
    async fn test_worker_reports_failure_for_failing_task() {
        let store = test_store();
        let task = Arc::new(MockFeedTask::new_fail("fetch refused"));
        let worker = Worker::new(store.clone(), task, WorkerConfig::default());

        let id = store.enqueue("http://a.com", retained(3)).await.unwrap();
        worker.process_next_job().await.unwrap();

        let job = store.repository().find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Pending);
        assert!(job.last_error.as_deref().unwrap().contains("fetch refused"));
    }

    #[tokio::test]
    async fn test_worker_times_out_hanging_task() {
        let store = test_store();
        let task = Arc::new(MockFeedTask::new_hang());
        let worker = Worker::new(
            store.clone(),
            task,
            WorkerConfig {
                task_timeout: Duration::from_millis(20),
            },
        );

        let id = store.enqueue("http://a.com", retained(3)).await.unwrap();
        worker.process_next_job().await.unwrap();

        let job = store.repository().find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Pending);
        assert!(job.last_error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_worker_survives_panicking_task() {
        let store = test_store();
        let task = Arc::new(MockFeedTask::new_panic("feed parser blew up"));
        let worker = Worker::new(store.clone(), task.clone(), WorkerConfig::default());

        let id = store.enqueue("http://a.com", retained(3)).await.unwrap();
        assert!(worker.process_next_job().await.unwrap());

        // The panic was charged as a failed attempt, not a dead worker
        let job = store.repository().find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.attempts, 1);
        let err = job.last_error.as_deref().unwrap();
        assert!(err.contains("panicked"));
        assert!(err.contains("feed parser blew up"));
    }

    #[tokio::test]
    async fn test_pool_keeps_processing_after_panics() {
        let store = test_store();
        let task = Arc::new(MockFeedTask::new_panic("boom"));
        for i in 0..2 {
            store
                .enqueue(format!("http://feed{}.com", i), retained(2))
                .await
                .unwrap();
        }

        let (tx, rx) = shutdown_channel();
        let pool = WorkerPool::spawn(store.clone(), task.clone(), WorkerConfig::default(), 1, rx);

        // A single worker must outlive every panic and exhaust both jobs
        for _ in 0..100 {
            let stats = store.stats().await.unwrap();
            if stats.failed == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        tx.shutdown();
        pool.join().await;

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.active, 0);
        assert_eq!(task.call_count(), 4);
    }

    #[tokio::test]
    async fn test_worker_drives_job_to_exhaustion() {
        let store = test_store();
        let task = Arc::new(MockFeedTask::new_fail("always"));
        let worker = Worker::new(store.clone(), task.clone(), WorkerConfig::default());

        let id = store.enqueue("http://a.com", retained(3)).await.unwrap();
        for _ in 0..3 {
            assert!(worker.process_next_job().await.unwrap());
        }
        // Queue is drained: the job is terminal
        assert!(!worker.process_next_job().await.unwrap());

        let job = store.repository().find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.attempts, 3);
        assert_eq!(task.call_count(), 3);
    }

    #[tokio::test]
    async fn test_pool_drains_queue_and_shuts_down() {
        let store = test_store();
        let task = Arc::new(MockFeedTask::new_success());
        for i in 0..10 {
            store
                .enqueue(format!("http://feed{}.com", i), retained(3))
                .await
                .unwrap();
        }

        let (tx, rx) = shutdown_channel();
        let pool = WorkerPool::spawn(
            store.clone(),
            task.clone(),
            WorkerConfig::default(),
            3,
            rx,
        );

        // Wait for the queue to drain
        for _ in 0..100 {
            let stats = store.stats().await.unwrap();
            if stats.pending == 0 && stats.active == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        tx.shutdown();
        pool.join().await;

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.completed, 10);
        assert_eq!(task.call_count(), 10);
    }
}
