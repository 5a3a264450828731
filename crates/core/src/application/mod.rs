// Application Layer - Services composed from domain + ports

pub mod backoff;
pub mod producer;
pub mod queue;
pub mod recovery;
pub mod worker;

pub use backoff::{delay_ms, with_jitter};
pub use producer::{parse_feed_lines, Producer, ProducerReport};
pub use queue::{QueueStats, QueueStore};
pub use recovery::LeaseReaper;
pub use worker::{shutdown_channel, Worker, WorkerConfig, WorkerPool};
