//! Bounded exponential backoff for collaborator probes.

use std::time::Duration;

use stepwise_core::config::RetryConfig;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay before retry number `retry` (1-based): base, 2×base, 4×base, … capped.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Call `op` until it succeeds or the attempts run out.
    ///
    /// On exhaustion returns the last error with the number of attempts made.
    pub fn run<T, E: std::fmt::Display>(
        &self,
        mut op: impl FnMut() -> Result<T, E>,
    ) -> Result<T, (u32, E)> {
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= self.attempts => return Err((attempt, e)),
                Err(e) => {
                    let delay = self.delay_for(attempt);
                    debug!(attempt, error = %e, ?delay, "probe failed, retrying");
                    std::thread::sleep(delay);
                    attempt += 1;
                }
            }
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(
            config.attempts,
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
        )
    }
}
