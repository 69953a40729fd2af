use std::time::Duration;

use crate::redis_conn::LazyConnection;

use super::{ResultStore, StoreError};

/// Results as plain Redis strings written with `SET key value EX ttl`.
#[derive(Debug)]
pub struct RedisResultStore {
    conn: LazyConnection,
}

impl RedisResultStore {
    pub fn new(redis_url: impl AsRef<str>) -> Result<Self, StoreError> {
        let conn = LazyConnection::open(redis_url.as_ref()).map_err(unavailable)?;
        Ok(Self { conn })
    }
}

fn unavailable(e: redis::RedisError) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

impl ResultStore for RedisResultStore {
    fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let secs = ttl.as_secs().max(1);
        self.conn
            .with(|conn| redis::cmd("SET").arg(key).arg(value).arg("EX").arg(secs).query::<()>(conn))
            .map_err(unavailable)
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.conn
            .with(|conn| redis::cmd("GET").arg(key).query::<Option<String>>(conn))
            .map_err(unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ignore = "requires a running Redis (REDIS_URL)"]
    fn set_with_expiry_and_read_back() {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379/".to_string());
        let store = RedisResultStore::new(url).unwrap();
        let key = format!("result:{}", std::process::id());

        store.put(&key, "{\"a\":1}", Duration::from_secs(5)).unwrap();
        store.put(&key, "{\"a\":2}", Duration::from_secs(5)).unwrap();
        assert_eq!(store.get(&key).unwrap().as_deref(), Some("{\"a\":2}"));
    }
}
