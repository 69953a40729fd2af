//! Result store and publisher.
//!
//! Results live under `result:<invocationId>` with a fixed TTL. Writes are
//! plain overwrites: publishing the same invocation twice leaves the last
//! record in place and is not an error.

mod in_memory;
#[cfg(feature = "redis")]
mod redis_kv;

use std::time::Duration;

use tracing::{instrument, warn};

use lambdabox_core::keys::result_key;
use lambdabox_core::{ExecutionResult, InvocationId};

use crate::config::RESULT_TTL;
use crate::retry::RetryPolicy;

pub use in_memory::InMemoryResultStore;
#[cfg(feature = "redis")]
pub use redis_kv::RedisResultStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("result store unavailable: {0}")]
    Unavailable(String),
}

/// String key/value store with per-key expiry.
pub trait ResultStore: Send + Sync {
    /// Unconditionally set `key`, replacing any previous value and TTL.
    fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
}

impl<S: ResultStore + ?Sized> ResultStore for std::sync::Arc<S> {
    fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        (**self).put(key, value, ttl)
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("failed to encode result: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("stored result is not valid: {0}")]
    Decode(#[source] serde_json::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct ResultPublisher<S> {
    store: S,
    ttl: Duration,
    retry: RetryPolicy,
}

impl<S: ResultStore> ResultPublisher<S> {
    /// Publisher with the standard TTL and retry policy.
    pub fn new(store: S) -> Self {
        Self {
            store,
            ttl: RESULT_TTL,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Write `result` under its result key, retrying transport failures.
    #[instrument(skip(self, result), fields(invocation_id = %result.invocation_id, status = %result.status), err)]
    pub fn publish(&self, result: &ExecutionResult) -> Result<(), PublishError> {
        let payload = result.to_json().map_err(PublishError::Encode)?;
        let key = result_key(result.invocation_id);

        self.retry
            .run(|attempt| {
                self.store.put(&key, &payload, self.ttl).inspect_err(|e| {
                    warn!(attempt, error = %e, "result write failed");
                })
            })
            .map_err(PublishError::from)
    }

    /// Read back a published result, if it exists and has not expired.
    pub fn fetch(&self, invocation_id: InvocationId) -> Result<Option<ExecutionResult>, PublishError> {
        match self.store.get(&result_key(invocation_id))? {
            Some(raw) => ExecutionResult::from_json(&raw).map(Some).map_err(PublishError::Decode),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use lambdabox_core::Outcome;
    use serde_json::json;

    use super::*;

    fn result(id: i64, outcome: Outcome) -> ExecutionResult {
        ExecutionResult::from_outcome(InvocationId::new(id), outcome, Duration::from_millis(3))
    }

    #[test]
    fn publish_then_fetch() {
        let publisher = ResultPublisher::new(InMemoryResultStore::new());
        publisher.publish(&result(42, Outcome::success(r#"{"score":10}"#, "doubling"))).unwrap();

        let fetched = publisher.fetch(InvocationId::new(42)).unwrap().unwrap();
        assert_eq!(fetched.output, Some(json!({"score": 10})));
        assert_eq!(fetched.logs, "doubling");
        assert_eq!(publisher.store().ttl_of("result:42"), Some(RESULT_TTL));
    }

    #[test]
    fn republish_overwrites() {
        let publisher = ResultPublisher::new(InMemoryResultStore::new());
        publisher.publish(&result(1, Outcome::error("first", ""))).unwrap();
        publisher.publish(&result(1, Outcome::success("2", ""))).unwrap();

        let fetched = publisher.fetch(InvocationId::new(1)).unwrap().unwrap();
        assert_eq!(fetched.output, Some(json!(2)));
        assert!(fetched.error_message.is_empty());
    }

    #[test]
    fn transient_write_failures_are_retried() {
        let store = InMemoryResultStore::new();
        store.fail_next_writes(2);
        let publisher = ResultPublisher::new(store).with_retry(RetryPolicy::fixed(3, Duration::from_millis(1)));

        publisher.publish(&result(5, Outcome::success("1", ""))).unwrap();
        assert!(publisher.fetch(InvocationId::new(5)).unwrap().is_some());
    }

    #[test]
    fn persistent_write_failure_is_reported() {
        let store = InMemoryResultStore::new();
        store.fail_next_writes(10);
        let publisher = ResultPublisher::new(store).with_retry(RetryPolicy::fixed(3, Duration::from_millis(1)));

        let err = publisher.publish(&result(5, Outcome::success("1", ""))).unwrap_err();
        assert!(matches!(err, PublishError::Store(StoreError::Unavailable(_))));
    }

    #[test]
    fn missing_and_corrupt_entries() {
        let publisher = ResultPublisher::new(InMemoryResultStore::new());
        assert!(publisher.fetch(InvocationId::new(9)).unwrap().is_none());

        publisher.store().put("result:9", "not json", RESULT_TTL).unwrap();
        assert!(matches!(publisher.fetch(InvocationId::new(9)), Err(PublishError::Decode(_))));
    }
}
