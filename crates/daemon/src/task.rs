// Placeholder task body wired into the worker pool.
// Real fetch/parse logic plugs in behind the same FeedTask port.

use async_trait::async_trait;
use feedrelay_core::port::{FeedTask, TaskError};
use tracing::info;

/// Probes the payload shape and logs it. Stands in for the actual feed
/// fetcher, which lives outside this process's scope.
pub struct FeedProbeTask;

#[async_trait]
impl FeedTask for FeedProbeTask {
    async fn run(&self, payload: &str) -> Result<(), TaskError> {
        let rest = payload
            .strip_prefix("https://")
            .or_else(|| payload.strip_prefix("http://"))
            .ok_or_else(|| TaskError::Failed(format!("not an http(s) url: {}", payload)))?;

        if rest.is_empty() || rest.starts_with('/') {
            return Err(TaskError::Failed(format!("missing host: {}", payload)));
        }

        info!(url = %payload, "Feed probe ok");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_accepts_http_and_https() {
        let task = FeedProbeTask;
        assert!(task.run("http://a.com/feed").await.is_ok());
        assert!(task.run("https://b.com/rss.xml").await.is_ok());
    }

    #[tokio::test]
    async fn test_rejects_hostless_and_foreign_schemes() {
        let task = FeedProbeTask;
        assert!(task.run("ftp://a.com").await.is_err());
        assert!(task.run("http:///path-only").await.is_err());
        assert!(task.run("http://").await.is_err());
    }
}
