use std::time::Duration;

use tracing::instrument;

use lambdabox_core::RuntimeName;
use lambdabox_core::keys::{dead_letter_key, queue_key};

use crate::redis_conn::{BLOCKING_SLACK, LazyConnection};

use super::{JobQueue, QueueError};

/// Redis list-backed queue (`LPUSH` / `BRPOP`).
///
/// Each instance owns one connection; give every worker loop its own.
#[derive(Debug)]
pub struct RedisJobQueue {
    conn: LazyConnection,
}

impl RedisJobQueue {
    /// `redis_url` like `redis://localhost:6379/`. Connects on first use.
    pub fn new(redis_url: impl AsRef<str>) -> Result<Self, QueueError> {
        let conn = LazyConnection::open(redis_url.as_ref()).map_err(unavailable)?;
        Ok(Self { conn })
    }

    fn lpush(&self, key: String, payload: &str) -> Result<(), QueueError> {
        self.conn
            .with(|conn| redis::cmd("LPUSH").arg(&key).arg(payload).query::<i64>(conn))
            .map(|_| ())
            .map_err(unavailable)
    }
}

fn unavailable(e: redis::RedisError) -> QueueError {
    QueueError::Unavailable(e.to_string())
}

/// Payload bytes are not trusted to be UTF-8. Invalid sequences are replaced
/// so the item still reaches the parser and is dropped there.
fn decode_payload(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

impl JobQueue for RedisJobQueue {
    #[instrument(skip(self, payload), fields(runtime = %runtime), err)]
    fn push(&self, runtime: &RuntimeName, payload: &str) -> Result<(), QueueError> {
        self.lpush(queue_key(runtime), payload)
    }

    fn blocking_pop(&self, runtime: &RuntimeName, timeout: Duration) -> Result<Option<String>, QueueError> {
        let key = queue_key(runtime);
        // BRPOP treats 0 as "forever"; never ask for that.
        let secs = timeout.as_secs_f64().max(0.01);
        self.conn
            .with_read_timeout(timeout + BLOCKING_SLACK, |conn| {
                redis::cmd("BRPOP")
                    .arg(&key)
                    .arg(secs)
                    .query::<Option<(Vec<u8>, Vec<u8>)>>(conn)
            })
            .map(|popped| popped.map(|(_, payload)| decode_payload(payload)))
            .map_err(unavailable)
    }

    #[instrument(skip(self, payload), fields(runtime = %runtime), err)]
    fn push_dead_letter(&self, runtime: &RuntimeName, payload: &str) -> Result<(), QueueError> {
        self.lpush(dead_letter_key(runtime), payload)
    }
}
