// Producer - converts raw feed list input into enqueued jobs

use crate::application::queue::QueueStore;
use crate::domain::{JobId, RetryConfig};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

/// Outcome of one producer run
#[derive(Debug, Default)]
pub struct ProducerReport {
    pub enqueued: Vec<JobId>,
    /// Lines rejected by the admission filter
    pub dropped: usize,
    /// Enqueue attempts the store rejected
    pub failed: usize,
}

/// Split raw input into feed URLs, dropping anything that does not look
/// like one. Dropped lines are counted by the caller and logged at debug.
pub fn parse_feed_lines(input: &str) -> (Vec<String>, usize) {
    let mut urls = Vec::new();
    let mut dropped = 0usize;

    for line in input.split(['\n', '\r']) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with("http") {
            urls.push(line.to_string());
        } else {
            debug!(line = %line, "Dropping line without a recognized scheme prefix");
            dropped += 1;
        }
    }

    (urls, dropped)
}

/// Builds one job per surviving input line and enqueues them all with a
/// fixed retry configuration. Enqueues fan out as independent tasks whose
/// completion is awaited; one failure never aborts the rest.
pub struct Producer {
    store: Arc<QueueStore>,
    retry: RetryConfig,
}

impl Producer {
    pub fn new(store: Arc<QueueStore>, retry: RetryConfig) -> Self {
        Self { store, retry }
    }

    /// Enqueue every surviving line of `input`, preserving input order for
    /// the jobs that are admitted.
    pub async fn enqueue_all(&self, input: &str) -> ProducerReport {
        let (urls, dropped) = parse_feed_lines(input);
        let total = urls.len();

        let mut tasks = JoinSet::new();
        for (index, url) in urls.into_iter().enumerate() {
            let store = Arc::clone(&self.store);
            let retry = self.retry.clone();
            tasks.spawn(async move {
                info!(url = %url, "Enqueuing job");
                (index, url.clone(), store.enqueue(url, retry).await)
            });
        }

        // Await the whole fan-out so completion and errors are observable
        let mut results: Vec<(usize, Option<JobId>)> = Vec::with_capacity(total);
        let mut failed = 0usize;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, _, Ok(job_id))) => results.push((index, Some(job_id))),
                Ok((index, url, Err(e))) => {
                    error!(url = %url, error = %e, "Failed to enqueue job");
                    failed += 1;
                    results.push((index, None));
                }
                Err(join_err) => {
                    error!(error = %join_err, "Enqueue task panicked");
                    failed += 1;
                }
            }
        }

        // Restore input order for the report
        results.sort_by_key(|(index, _)| *index);
        let enqueued: Vec<JobId> = results.into_iter().filter_map(|(_, id)| id).collect();

        info!(
            enqueued = enqueued.len(),
            dropped = dropped,
            failed = failed,
            "Producer run complete"
        );

        ProducerReport {
            enqueued,
            dropped,
            failed,
        }
    }
}
