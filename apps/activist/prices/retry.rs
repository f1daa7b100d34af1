use std::{future::Future, sync::Mutex, time::Duration};
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

use crate::{
    config::{JitterConfig, SourceConfig},
    errors::SourceError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed,
    Exponential,
}

/// Attempt cap and delay schedule shared by every call against one source.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Wait after a 429 that carried no `Retry-After`.
    pub rate_limit_delay: Duration,
    pub backoff: Backoff,
    /// Retry `Permanent` errors too instead of returning them at once.
    pub retry_permanent: bool,
}

impl RetryPolicy {
    pub fn from_source(config: &SourceConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_backoff_ms),
            max_delay: Duration::from_millis(config.max_backoff_ms),
            rate_limit_delay: Duration::from_millis(config.rate_limit_backoff_ms),
            backoff: Backoff::Exponential,
            retry_permanent: false,
        }
    }

    /// `max_attempts` tries spaced by the same `delay`.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: delay,
            max_delay: delay,
            rate_limit_delay: delay,
            backoff: Backoff::Fixed,
            retry_permanent: false,
        }
    }

    /// Spends the remaining attempts on every error class.
    pub fn retrying_permanent(mut self) -> Self {
        self.retry_permanent = true;
        self
    }

    /// Wait before the attempt following failed attempt number `attempt` (1-based).
    /// A server `Retry-After` is capped at the larger of `max_delay` and
    /// `rate_limit_delay`.
    pub fn delay_for(&self, attempt: u32, err: &SourceError) -> Duration {
        match err {
            SourceError::RateLimited { retry_after } => retry_after
                .unwrap_or(self.rate_limit_delay)
                .min(self.max_delay.max(self.rate_limit_delay)),
            _ => match self.backoff {
                Backoff::Fixed => self.base_delay,
                Backoff::Exponential => {
                    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                    self.base_delay.saturating_mul(factor).min(self.max_delay)
                }
            },
        }
    }

    /// Runs `op` until it succeeds, fails permanently, or the attempts run out.
    /// The last error is returned on failure.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, SourceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SourceError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_retryable() && !self.retry_permanent => {
                    warn!(label, attempt, error = %err, "Permanent failure, not retrying");
                    return Err(err);
                }
                Err(err) if attempt >= self.max_attempts => {
                    warn!(
                        label,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %err,
                        "Max attempts reached"
                    );
                    return Err(err);
                }
                Err(err) => {
                    let delay = self.delay_for(attempt, &err);
                    warn!(
                        label,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay = ?delay,
                        error = %err,
                        "Request failed, retrying"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// Spaces requests to one source by a minimum interval plus random jitter.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    jitter_min: Duration,
    jitter_max: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration, jitter: &JitterConfig) -> Self {
        Self {
            min_interval,
            jitter_min: Duration::from_millis(jitter.min_ms),
            jitter_max: Duration::from_millis(jitter.max_ms.max(jitter.min_ms)),
            last_request: Mutex::new(None),
        }
    }

    /// Waits until the next request may go out, then claims the slot.
    pub async fn acquire(&self) {
        let since_last = {
            let last = self.last_request.lock().unwrap_or_else(|e| e.into_inner());
            last.map(|at| at.elapsed())
        };

        let pacing = since_last
            .map(|elapsed| self.min_interval.saturating_sub(elapsed))
            .unwrap_or_default();
        let wait = pacing + self.jitter();
        if !wait.is_zero() {
            debug!(wait = ?wait, "Waiting before request");
            sleep(wait).await;
        }

        let mut last = self.last_request.lock().unwrap_or_else(|e| e.into_inner());
        *last = Some(Instant::now());
    }

    fn jitter(&self) -> Duration {
        let spread = self.jitter_max.saturating_sub(self.jitter_min);
        self.jitter_min + spread.mul_f64(rand::random::<f64>())
    }
}
