// Lease recovery - returns abandoned Active jobs to the pool

use crate::application::worker::constants::DEFAULT_REAP_INTERVAL;
use crate::application::worker::ShutdownToken;
use crate::port::{JobRepository, TimeProvider};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Lease reaper
///
/// A worker that crashes after claiming but before reporting leaves its job
/// stuck in Active. Each claim stamps a lease deadline; the reaper releases
/// jobs whose deadline passed back to Pending, attempts untouched. The
/// daemon runs one sweep at startup (crash recovery) and then periodically.
pub struct LeaseReaper {
    repo: Arc<dyn JobRepository>,
    time_provider: Arc<dyn TimeProvider>,
    interval: Duration,
}

impl LeaseReaper {
    pub fn new(repo: Arc<dyn JobRepository>, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self::with_interval(repo, time_provider, DEFAULT_REAP_INTERVAL)
    }

    pub fn with_interval(
        repo: Arc<dyn JobRepository>,
        time_provider: Arc<dyn TimeProvider>,
        interval: Duration,
    ) -> Self {
        Self {
            repo,
            time_provider,
            interval,
        }
    }

    /// Release every Active job whose lease expired. Returns the number
    /// released.
    pub async fn recover_expired(&self) -> crate::error::Result<u64> {
        let now = self.time_provider.now_millis();
        let released = self.repo.release_expired_leases(now).await?;

        if released > 0 {
            info!(released = %released, "Released expired job leases");
        }
        Ok(released)
    }

    /// Sweep on a fixed interval until shutdown
    pub async fn run(&self, mut shutdown: ShutdownToken) {
        info!(interval_ms = %self.interval.as_millis(), "Lease reaper started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    if let Err(e) = self.recover_expired().await {
                        error!(error = %e, "Lease recovery sweep failed");
                    }
                }
                _ = shutdown.wait() => {
                    info!("Lease reaper shutting down");
                    break;
                }
            }
        }
    }
}
