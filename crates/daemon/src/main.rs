//! Feedrelay - Main Entry Point
//! Reads the feed list, enqueues one job per feed URL, and drives the
//! durable retry queue with a pool of workers.

mod task;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use feedrelay_core::application::recovery::LeaseReaper;
use feedrelay_core::application::worker::constants::DEFAULT_POOL_SIZE;
use feedrelay_core::application::worker::{shutdown_channel, WorkerConfig, WorkerPool};
use feedrelay_core::application::{Producer, QueueStore};
use feedrelay_core::domain::RetryConfig;
use feedrelay_core::port::id_provider::UuidProvider;
use feedrelay_core::AppError;
use feedrelay_core::port::time_provider::SystemTimeProvider;
use feedrelay_infra_sqlite::{create_pool, run_migrations, SqliteJobRepository};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_DB_PATH: &str = "~/.feedrelay/queue.db";
const DEFAULT_FEEDS_PATH: &str = "feeds.txt";
const DEFAULT_TASK_TIMEOUT_SECS: u64 = 30;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize logging
    let log_format = std::env::var("FEEDRELAY_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("feedrelay=info"))
        .expect("Failed to create env filter");

    match log_format.as_str() {
        "json" => {
            // Production: JSON structured logging
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
        }
        _ => {
            // Development: Pretty formatting with colors
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }

    info!("Feedrelay v{} starting...", VERSION);

    // 2. Load configuration from environment
    let db_path = std::env::var("FEEDRELAY_DB_PATH")
        .unwrap_or_else(|_| shellexpand::tilde(DEFAULT_DB_PATH).into_owned());
    let feeds_path =
        std::env::var("FEEDRELAY_FEEDS_PATH").unwrap_or_else(|_| DEFAULT_FEEDS_PATH.to_string());
    let pool_size: usize = std::env::var("FEEDRELAY_WORKERS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_POOL_SIZE);
    let task_timeout_secs: u64 = std::env::var("FEEDRELAY_TASK_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_TASK_TIMEOUT_SECS);

    // 3. Read the initial feed list. An unreadable or empty list is the
    //    only process-fatal error: every later failure stays contained at
    //    the job boundary.
    let feed_input = match tokio::fs::read_to_string(&feeds_path).await {
        Ok(contents) => contents,
        Err(e) => {
            error!(path = %feeds_path, error = %e, "Unable to read initial list of feeds");
            std::process::exit(1);
        }
    };
    if let Err(e) = validate_feed_input(&feeds_path, &feed_input) {
        error!(path = %feeds_path, error = %e, "Unable to read initial list of feeds");
        std::process::exit(1);
    }

    info!(db_path = %db_path, "Initializing database...");

    // 4. Initialize database
    let pool = create_pool(&db_path)
        .await
        .map_err(|e| anyhow::anyhow!("DB pool creation failed: {}", e))?;
    run_migrations(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;

    // 5. Setup dependencies (DI wiring)
    let time_provider = Arc::new(SystemTimeProvider);
    let id_provider = Arc::new(UuidProvider);
    let repo = Arc::new(SqliteJobRepository::new(pool));
    let store = Arc::new(QueueStore::new(
        repo.clone(),
        time_provider.clone(),
        id_provider,
    ));

    // 6. Recover leases abandoned by a previous crash, then keep sweeping
    let reaper = Arc::new(LeaseReaper::new(repo.clone(), time_provider));
    match reaper.recover_expired().await {
        Ok(count) => info!(released = count, "Startup lease recovery completed"),
        Err(e) => error!(error = %e, "Startup lease recovery failed"),
    }

    let (shutdown_tx, shutdown_rx) = shutdown_channel();

    let reaper_token = shutdown_rx.clone();
    let reaper_handle = {
        let reaper = reaper.clone();
        tokio::spawn(async move {
            reaper.run(reaper_token).await;
        })
    };

    // 7. Enqueue one job per surviving feed line
    let producer = Producer::new(store.clone(), RetryConfig::default());
    let report = producer.enqueue_all(&feed_input).await;
    info!(
        enqueued = report.enqueued.len(),
        dropped = report.dropped,
        failed = report.failed,
        "Feed list processed"
    );

    // 8. Start the worker pool
    info!(workers = pool_size, "Starting worker pool...");
    let worker_config = WorkerConfig {
        task_timeout: Duration::from_secs(task_timeout_secs),
    };
    let workers = WorkerPool::spawn(
        store.clone(),
        Arc::new(task::FeedProbeTask),
        worker_config,
        pool_size,
        shutdown_rx,
    );

    info!("System ready. Press Ctrl+C to shutdown");

    // 9. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received. Exiting gracefully...");

    // 10. Graceful shutdown
    shutdown_tx.shutdown();
    let _ = tokio::time::timeout(Duration::from_secs(5), workers.join()).await;
    let _ = tokio::time::timeout(Duration::from_secs(1), reaper_handle).await;

    let stats = store.stats().await?;
    info!(
        pending = stats.pending,
        active = stats.active,
        completed = stats.completed,
        failed = stats.failed,
        "Shutdown complete"
    );

    Ok(())
}

/// A feed list with no content at all means a misconfigured deployment,
/// not an empty work day; refuse to start on it.
fn validate_feed_input(feeds_path: &str, contents: &str) -> Result<(), AppError> {
    if contents.trim().is_empty() {
        return Err(AppError::Input(format!(
            "feed list at {} is empty",
            feeds_path
        )));
    }
    Ok(())
}
