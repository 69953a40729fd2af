//! Infrastructure layer: job queue, result store, configuration and the
//! worker loop that ties them to the sandbox.
//!
//! Redis adapters live behind the `redis` feature; the in-memory
//! implementations back the tests and local development.

pub mod config;
pub mod queue;
pub mod results;
pub mod retry;
pub mod workers;

#[cfg(feature = "redis")]
mod redis_conn;


pub use config::{ConfigError, WorkerConfig};
pub use queue::{InMemoryJobQueue, JobQueue, QueueError};
pub use results::{InMemoryResultStore, PublishError, ResultPublisher, ResultStore, StoreError};
pub use retry::RetryPolicy;
pub use workers::{InvocationWorker, Tick, WorkerHandle, WorkerOptions, WorkerStats};
