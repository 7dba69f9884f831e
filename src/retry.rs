//! Retry with exponential backoff and jitter
//!
//! Transient transport failures against the ledger are retried with a
//! capped exponential delay; everything else surfaces immediately.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::types::Result;

/// Backoff parameters for retried RPC calls.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay_ms: u64,
    /// Ceiling on the exponential delay (pre-jitter).
    pub max_delay_ms: u64,
    /// Exponential growth factor.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 8_000,
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Delay before retry `attempt` (0-indexed): the capped exponential
    /// base plus a uniform 10-30% jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = (self.initial_delay_ms as f64 * self.multiplier.powi(attempt as i32))
            .min(self.max_delay_ms as f64);
        let jitter = base * rand::thread_rng().gen_range(0.10..0.30);
        Duration::from_millis((base + jitter) as u64)
    }
}

/// Run `op` until it succeeds, retrying transient errors up to
/// `config.max_retries` times. The last observed error is returned when
/// retries are exhausted; non-transient errors surface immediately.
pub async fn retry_with_backoff<T, F, Fut>(config: &RetryConfig, op_name: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(op = op_name, attempt, "succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if e.is_transient() && attempt < config.max_retries => {
                let delay = config.delay_for_attempt(attempt);
                warn!(
                    op = op_name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient error, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
