use crate::quotes::error::RetryExhausted;
use std::future::Future;
use std::time::Duration;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

// 2^MAX_BACKOFF_SHIFT * base is the longest single wait.
const MAX_BACKOFF_SHIFT: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Wait between attempt `attempt` (0-indexed) and the next one.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay
            .checked_mul(1u32 << attempt.min(MAX_BACKOFF_SHIFT))
            .unwrap_or(Duration::MAX)
    }

    /// Runs `op` until it succeeds or `max_attempts` calls have failed, sleeping
    /// `base_delay * 2^i` after failed attempt `i`. No sleep follows the final attempt.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, RetryExhausted<E>>
    where
        E: std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(err) => {
                    if attempt + 1 >= max_attempts {
                        tracing::warn!(%label, attempt, error = %err, "attempt failed; retries exhausted");
                        return Err(RetryExhausted {
                            attempts: attempt + 1,
                            last: err,
                        });
                    }
                    let backoff = self.backoff(attempt);
                    tracing::warn!(%label, attempt, ?backoff, error = %err, "attempt failed; retrying");
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }
}
