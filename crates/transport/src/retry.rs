//! Retrier - exponential backoff executor
//!
//! Wraps a fallible async operation in a retry loop: each failure doubles the
//! delay (clamped at `max_delay`), invokes the error callback with the
//! attempt number and next delay, and optionally bounds each attempt and the
//! total retry duration.

use std::future::Future;
use std::io;
use std::time::Duration;

use tokio::time::{sleep, timeout, Instant};

/// Retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Delay before the second attempt; doubles on each failure
    pub initial_delay: Duration,

    /// Ceiling for the per-attempt delay
    pub max_delay: Duration,

    /// Bound on a single attempt; an attempt exceeding it counts as failed
    pub attempt_timeout: Option<Duration>,

    /// Bound on the total retry duration; exceeding it aborts with the
    /// last error
    pub timeout: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(300),
            attempt_timeout: None,
            timeout: None,
        }
    }
}

impl RetryConfig {
    /// Set the total retry budget
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Exponential-backoff executor.
pub struct Retrier {
    config: RetryConfig,
}

impl Retrier {
    /// Create a retrier with the given behavior
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Run `op` until it succeeds or the retry budget is exhausted.
    ///
    /// `on_error` is invoked for every failed attempt that will be retried,
    /// with the 1-based attempt number, the error, and the delay before the
    /// next attempt. When the total budget runs out the last error is
    /// returned instead.
    pub async fn run<T, E, F, Fut>(
        &self,
        mut op: F,
        mut on_error: impl FnMut(u32, &E, Duration),
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<io::Error>,
    {
        let started = Instant::now();
        let mut delay = self.config.initial_delay;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let result = match self.config.attempt_timeout {
                Some(bound) => match timeout(bound, op()).await {
                    Ok(result) => result,
                    Err(_) => Err(E::from(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "attempt timed out",
                    ))),
                },
                None => op().await,
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) => {
                    let exhausted = self
                        .config
                        .timeout
                        .is_some_and(|budget| started.elapsed() + delay >= budget);
                    if exhausted {
                        return Err(e);
                    }

                    on_error(attempt, &e, delay);
                    sleep(delay).await;
                    delay = (delay * 2).min(self.config.max_delay);
                }
            }
        }
    }
}
