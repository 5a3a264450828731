// Feedrelay SQLite Infrastructure
// Durable JobRepository backend

mod connection;
mod job_repository;
mod migration;

pub use connection::create_pool;
pub use job_repository::SqliteJobRepository;
pub use migration::run_migrations;
