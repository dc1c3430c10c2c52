use crate::providers::ProviderError;
use bon::Builder;
use log::warn;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Exponential backoff applied uniformly around every provider call.
///
/// Only errors for which [`ProviderError::is_retryable`] holds are retried.
/// The delay doubles after each failed attempt, capped at `max_delay`, with up
/// to 50% random extra delay when `jitter` is on.
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
pub struct RetryPolicy {
    #[builder(default = 3)]
    pub max_attempts: u32,
    #[builder(default = Duration::from_millis(500))]
    pub initial_delay: Duration,
    #[builder(default = Duration::from_secs(8))]
    pub max_delay: Duration,
    #[builder(default = true)]
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt.
    pub fn none() -> Self {
        Self::builder().max_attempts(1).build()
    }

    /// Delay before retry number `retry` (0-based), without jitter.
    pub fn base_delay(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    fn delay(&self, retry: u32) -> Duration {
        let base = self.base_delay(retry);
        if !self.jitter {
            return base;
        }
        let extra = rand::thread_rng().gen_range(0.0..=0.5);
        base.mul_f64(1.0 + extra)
    }

    /// Runs `operation` until it succeeds, fails permanently, or attempts run out.
    pub async fn run<F, Fut, T>(&self, provider: &str, mut operation: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < attempts && e.is_retryable() => {
                    let delay = self.delay(attempt - 1);
                    warn!(
                        "Provider '{provider}' attempt {attempt}/{attempts} failed: {e}. Retrying in {delay:?}"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
