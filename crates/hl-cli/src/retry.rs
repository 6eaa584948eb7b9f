//! Retry with jittered exponential backoff for store operations.
//!
//! Only conflicts and busy/locked database errors are retried. The engine
//! never retries on its own; callers at the process boundary wrap whole
//! operations here so every attempt starts from a fresh read.

use std::time::Duration;

use hl_core::config::RetryConfig;
use hl_store::StoreError;
use rand::Rng;

const MAX_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    max_attempts: u32,
    base_delay: Duration,
}

impl Backoff {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
        }
    }

    /// Upper bound of the wait after failed attempt `attempt` (1-based).
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(factor).min(MAX_DELAY)
    }

    /// A random wait in `[ceiling / 2, ceiling]`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let ceiling = self.ceiling(attempt).as_millis() as u64;
        if ceiling == 0 {
            return Duration::ZERO;
        }
        let millis = rand::rng().random_range(ceiling / 2..=ceiling);
        Duration::from_millis(millis)
    }

    fn should_retry(&self, attempt: u32, err: &StoreError) -> bool {
        attempt < self.max_attempts && err.is_retryable()
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or runs
/// out of attempts. Blocks the thread between attempts.
pub fn retry_blocking<T>(
    backoff: &Backoff,
    mut op: impl FnMut() -> Result<T, StoreError>,
) -> Result<T, StoreError> {
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if backoff.should_retry(attempt, &e) => {
                let delay = backoff.delay(attempt);
                tracing::debug!(attempt, ?delay, error = %e, "retrying");
                std::thread::sleep(delay);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Async variant of [`retry_blocking`]; the wait yields to the runtime.
pub async fn retry_async<T, F, Fut>(backoff: &Backoff, mut op: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if backoff.should_retry(attempt, &e) => {
                let delay = backoff.delay(attempt);
                tracing::debug!(attempt, ?delay, error = %e, "retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
