//! A lazily (re)established Redis connection shared by the adapters.

use std::sync::Mutex;
use std::time::Duration;

use tracing::{debug, warn};

/// Bound on establishing the TCP connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Read/write bound for ordinary commands.
pub(crate) const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Extra read time a blocking command gets beyond its own server-side timeout.
pub(crate) const BLOCKING_SLACK: Duration = Duration::from_secs(2);

/// One connection per owner, opened on first use and discarded after any
/// command error so the next call reconnects.
pub(crate) struct LazyConnection {
    client: redis::Client,
    conn: Mutex<Option<redis::Connection>>,
}

impl LazyConnection {
    /// Validates the URL; no network traffic happens here.
    pub(crate) fn open(url: &str) -> redis::RedisResult<Self> {
        Ok(Self {
            client: redis::Client::open(url)?,
            conn: Mutex::new(None),
        })
    }

    pub(crate) fn with<T, F>(&self, f: F) -> redis::RedisResult<T>
    where
        F: FnOnce(&mut redis::Connection) -> redis::RedisResult<T>,
    {
        self.with_read_timeout(COMMAND_TIMEOUT, f)
    }

    /// Like [`LazyConnection::with`], but replies may take up to
    /// `read_timeout`. A socket that stays silent longer is treated as dead.
    pub(crate) fn with_read_timeout<T, F>(&self, read_timeout: Duration, f: F) -> redis::RedisResult<T>
    where
        F: FnOnce(&mut redis::Connection) -> redis::RedisResult<T>,
    {
        let mut slot = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let mut conn = match slot.take() {
            Some(conn) => conn,
            None => {
                let conn = self.client.get_connection_with_timeout(CONNECT_TIMEOUT)?;
                conn.set_write_timeout(Some(COMMAND_TIMEOUT))?;
                debug!("redis connection established");
                conn
            }
        };

        let result = conn.set_read_timeout(Some(read_timeout)).and_then(|()| f(&mut conn));
        match &result {
            Ok(_) => *slot = Some(conn),
            Err(e) => warn!(error = %e, "dropping redis connection after error"),
        }
        result
    }
}

impl std::fmt::Debug for LazyConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyConnection")
            .field("addr", &self.client.get_connection_info().addr)
            .finish_non_exhaustive()
    }
}
