use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use lambdabox_core::RuntimeName;
use lambdabox_core::keys::{dead_letter_key, queue_key};

use super::{JobQueue, QueueError};

/// In-process queue for tests and local runs.
///
/// Lists are keyed exactly like the Redis ones. `set_unavailable` makes
/// every call fail with [`QueueError::Unavailable`], which lets tests drive
/// the worker's backoff path.
#[derive(Debug, Default)]
pub struct InMemoryJobQueue {
    lists: Mutex<HashMap<String, VecDeque<String>>>,
    ready: Condvar,
    unavailable: AtomicBool,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
        self.ready.notify_all();
    }

    /// Number of entries under `key`.
    pub fn len(&self, key: &str) -> usize {
        self.lock().get(key).map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self, key: &str) -> bool {
        self.len(key) == 0
    }

    /// Dead-lettered payloads for `runtime`, oldest first.
    pub fn dead_letters(&self, runtime: &RuntimeName) -> Vec<String> {
        self.lock()
            .get(&dead_letter_key(runtime))
            .map(|list| list.iter().rev().cloned().collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, VecDeque<String>>> {
        self.lists.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check(&self) -> Result<(), QueueError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(QueueError::Unavailable("in-memory queue marked unavailable".to_string()));
        }
        Ok(())
    }

    fn lpush(&self, key: String, payload: &str) -> Result<(), QueueError> {
        self.check()?;
        self.lock().entry(key).or_default().push_front(payload.to_string());
        self.ready.notify_all();
        Ok(())
    }
}

impl JobQueue for InMemoryJobQueue {
    fn push(&self, runtime: &RuntimeName, payload: &str) -> Result<(), QueueError> {
        self.lpush(queue_key(runtime), payload)
    }

    fn blocking_pop(&self, runtime: &RuntimeName, timeout: Duration) -> Result<Option<String>, QueueError> {
        self.check()?;
        let key = queue_key(runtime);
        let deadline = Instant::now() + timeout;
        let mut lists = self.lock();

        loop {
            if let Some(payload) = lists.get_mut(&key).and_then(VecDeque::pop_back) {
                return Ok(Some(payload));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            lists = self
                .ready
                .wait_timeout(lists, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0);
            self.check()?;
        }
    }

    fn push_dead_letter(&self, runtime: &RuntimeName, payload: &str) -> Result<(), QueueError> {
        self.lpush(dead_letter_key(runtime), payload)
    }
}
