//! Retry policies: the caller's tool for recovering from transient
//! failures, distinct from the rate limiter's 429 back-off (spec.md §5,
//! §9 "Retries vs. back-off" — they compose but do not interchange).

use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryStrategy {
    None,
    Fixed { delay: Duration },
    Linear { base: Duration, increment: Duration },
    Exponential { base: Duration, factor: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub strategy: RetryStrategy,
    pub max_retries: u32,
    pub max_delay: Duration,
    /// Half-amplitude random jitter applied to the computed delay.
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn none() -> Self {
        RetryPolicy {
            strategy: RetryStrategy::None,
            max_retries: 0,
            max_delay: Duration::ZERO,
            jitter: false,
        }
    }

    /// The default for LLM calls per spec.md §5: exponential, 3 retries,
    /// 1-30s, jitter on.
    pub fn default_llm() -> Self {
        RetryPolicy {
            strategy: RetryStrategy::Exponential {
                base: Duration::from_secs(1),
                factor: 2.0,
            },
            max_retries: 3,
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }

    pub fn fixed(delay: Duration, max_retries: u32) -> Self {
        RetryPolicy {
            strategy: RetryStrategy::Fixed { delay },
            max_retries,
            max_delay: delay,
            jitter: false,
        }
    }

    /// Base delay before jitter for the given 0-indexed attempt number.
    fn base_delay(&self, attempt: u32) -> Duration {
        match self.strategy {
            RetryStrategy::None => Duration::ZERO,
            RetryStrategy::Fixed { delay } => delay,
            RetryStrategy::Linear { base, increment } => base + increment * attempt,
            RetryStrategy::Exponential { base, factor } => {
                let multiplier = factor.powi(attempt as i32);
                Duration::from_secs_f64(base.as_secs_f64() * multiplier)
            }
        }
    }

    /// The delay to wait before retrying after the `attempt`-th failure
    /// (0-indexed), clamped to `max_delay` and optionally jittered by
    /// +/- 50% of the clamped value.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt).min(self.max_delay);
        if !self.jitter || base.is_zero() {
            return base;
        }
        let half = base.as_secs_f64() / 2.0;
        let jittered = rand::thread_rng().gen_range((half)..=(base.as_secs_f64() + half));
        Duration::from_secs_f64(jittered.max(0.0))
    }
}

/// Runs `operation` under `policy`, retrying while `is_retryable(&err)` is
/// true and the retry budget isn't exhausted. Sleeps happen between
/// attempts, never while holding any lock the caller might have.
pub async fn execute_with_retry<T, E, Op, Fut>(
    policy: &RetryPolicy,
    is_retryable: impl Fn(&E) -> bool,
    mut operation: Op,
) -> Result<T, E>
where
    Op: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                if attempt >= policy.max_retries || !is_retryable(&e) {
                    return Err(e);
                }
                let delay = policy.delay_for(attempt);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
        }
    }
}
