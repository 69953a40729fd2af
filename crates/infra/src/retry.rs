//! Fixed-delay retry for transport calls.

use std::thread;
use std::time::Duration;


/// Retry policy: up to `max_attempts` tries with `delay` between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first (0 behaves like 1).
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(3, Duration::from_secs(1))
    }
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self { max_attempts, delay }
    }

    /// A single attempt.
    pub fn no_retry() -> Self {
        Self::fixed(1, Duration::ZERO)
    }

    /// Delay before attempt `attempt` (1-indexed); the first attempt is immediate.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 { Duration::ZERO } else { self.delay }
    }

    /// Run `op` until it succeeds or attempts run out, returning the last error.
    ///
    /// `op` receives the 1-indexed attempt number.
    pub fn run<T, E, F>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Result<T, E>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= attempts => return Err(e),
                Err(_) => {
                    attempt += 1;
                    thread::sleep(self.delay_for_attempt(attempt));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_attempt_is_immediate() {
        let policy = RetryPolicy::fixed(3, Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(1), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(1));
    }

    #[test]
    fn retries_until_success() {
        let policy = RetryPolicy::fixed(3, Duration::from_millis(1));
        let mut seen = Vec::new();
        let result: Result<u32, &str> = policy.run(|attempt| {
            seen.push(attempt);
            if attempt < 3 { Err("down") } else { Ok(attempt) }
        });
        assert_eq!(result, Ok(3));
        assert_eq!(seen, [1, 2, 3]);
    }

    #[test]
    fn gives_up_with_last_error() {
        let policy = RetryPolicy::fixed(2, Duration::from_millis(1));
        let mut calls = 0;
        let result: Result<(), String> = policy.run(|attempt| {
            calls += 1;
            Err(format!("attempt {attempt}"))
        });
        assert_eq!(result, Err("attempt 2".to_string()));
        assert_eq!(calls, 2);
    }

    #[test]
    fn no_retry_runs_once() {
        let mut calls = 0;
        let _: Result<(), ()> = RetryPolicy::no_retry().run(|_| {
            calls += 1;
            Err(())
        });
        assert_eq!(calls, 1);
    }
}
