//! Job queue client.
//!
//! One list per runtime under `execution_queue:<runtime>`. Producers push on
//! the left, workers block-pop from the right, so a single consumer sees
//! jobs in FIFO order and competing consumers each get distinct jobs.

mod in_memory;
#[cfg(feature = "redis")]
mod redis_list;

use std::time::Duration;

use lambdabox_core::{Job, RuntimeName};

pub use in_memory::InMemoryJobQueue;
#[cfg(feature = "redis")]
pub use redis_list::RedisJobQueue;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// Transport or connection failure. The caller backs off and retries.
    #[error("queue unavailable: {0}")]
    Unavailable(String),
}

pub trait JobQueue: Send + Sync {
    /// Append a raw payload to the runtime's queue.
    fn push(&self, runtime: &RuntimeName, payload: &str) -> Result<(), QueueError>;

    /// Wait up to `timeout` for the oldest payload. `Ok(None)` means the
    /// window passed with nothing to do.
    fn blocking_pop(&self, runtime: &RuntimeName, timeout: Duration) -> Result<Option<String>, QueueError>;

    /// Park a payload the worker could not parse.
    fn push_dead_letter(&self, runtime: &RuntimeName, payload: &str) -> Result<(), QueueError>;

    fn push_job(&self, runtime: &RuntimeName, job: &Job) -> Result<(), QueueError> {
        self.push(runtime, &job.to_payload())
    }
}

impl<Q: JobQueue + ?Sized> JobQueue for std::sync::Arc<Q> {
    fn push(&self, runtime: &RuntimeName, payload: &str) -> Result<(), QueueError> {
        (**self).push(runtime, payload)
    }

    fn blocking_pop(&self, runtime: &RuntimeName, timeout: Duration) -> Result<Option<String>, QueueError> {
        (**self).blocking_pop(runtime, timeout)
    }

    fn push_dead_letter(&self, runtime: &RuntimeName, payload: &str) -> Result<(), QueueError> {
        (**self).push_dead_letter(runtime, payload)
    }
}
