//! Fixed-delay retry for blocking driver calls.

use std::thread;
use std::time::Duration;

/// How many times to attempt an operation and how long to wait in between.
///
/// `max_attempts` counts every call, including the first. A policy of
/// `{ max_attempts: 5, backoff_delay: 500ms }` calls the operation at most
/// five times and sleeps at most four times.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total calls, including the first
    pub max_attempts: u32,
    /// Sleep between attempts
    pub backoff_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_delay: Duration::from_millis(500),
        }
    }
}

/// The last error of a retry loop and how many attempts were made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exhausted<E> {
    /// Error from the final attempt
    pub error: E,
    /// Attempts made
    pub attempts: u32,
}

impl RetryPolicy {
    /// Policy making at most `max_attempts` calls, `backoff_delay` apart.
    pub const fn new(max_attempts: u32, backoff_delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff_delay,
        }
    }

    /// A policy that calls the operation exactly once.
    pub const fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Run `op` until it succeeds, returns an error `retryable` rejects, or
    /// the attempt budget runs out. `op` receives the 1-based attempt number.
    ///
    /// Sleeps happen on the calling thread and never after the final attempt.
    pub fn run<T, E>(
        &self,
        retryable: impl Fn(&E) -> bool,
        mut op: impl FnMut(u32) -> Result<T, E>,
    ) -> Result<T, Exhausted<E>> {
        let max = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if attempt >= max || !retryable(&error) {
                        return Err(Exhausted {
                            error,
                            attempts: attempt,
                        });
                    }
                    if !self.backoff_delay.is_zero() {
                        thread::sleep(self.backoff_delay);
                    }
                    attempt += 1;
                }
            }
        }
    }
}
