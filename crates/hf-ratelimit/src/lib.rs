//! Rate Limiter: one limiter per `(provider, model)`, each owning a token
//! bucket, a concurrency semaphore, a rolling-minute token window, and a
//! daily request counter (spec.md §4.6).

use hf_error::HiveForgeError;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
    /// 0 = unlimited.
    pub requests_per_day: u32,
    pub tokens_per_minute: u32,
    pub max_concurrent: usize,
    pub retry_after_429: Duration,
    pub burst_limit: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        RateLimitConfig {
            requests_per_minute: 60,
            requests_per_day: 0,
            tokens_per_minute: 90_000,
            max_concurrent: 10,
            retry_after_429: Duration::from_secs(60),
            burst_limit: 10,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct RateLimitState {
    tokens: f64,
    last_refill: Instant,
    request_count_minute: u32,
    request_count_day: u32,
    token_count_minute: u32,
    minute_start: Instant,
    day_start: Instant,
}

impl RateLimitState {
    fn new(burst_limit: u32) -> Self {
        let now = Instant::now();
        RateLimitState {
            tokens: burst_limit as f64,
            last_refill: now,
            request_count_minute: 0,
            request_count_day: 0,
            token_count_minute: 0,
            minute_start: now,
            day_start: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitStats {
    pub tokens_available: f64,
    pub requests_this_minute: u32,
    pub requests_today: u32,
    pub tokens_this_minute: u32,
    pub max_concurrent: usize,
}

/// A held concurrency slot. Releases automatically on drop.
pub struct RateLimitLease {
    _permit: OwnedSemaphorePermit,
}

pub struct RateLimiter {
    config: RateLimitConfig,
    state: Mutex<RateLimitState>,
    semaphore: Arc<Semaphore>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        RateLimiter {
            state: Mutex::new(RateLimitState::new(config.burst_limit)),
            semaphore: Arc::new(Semaphore::new(config.max_concurrent)),
            config,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn refill_tokens(&self, state: &mut RateLimitState) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        let refill_rate = self.config.requests_per_minute as f64 / 60.0;
        state.tokens = (state.tokens + elapsed * refill_rate).min(self.config.burst_limit as f64);
        state.last_refill = now;
    }

    fn reset_minute_window(&self, state: &mut RateLimitState) {
        let now = Instant::now();
        if now.saturating_duration_since(state.minute_start) >= Duration::from_secs(60) {
            state.request_count_minute = 0;
            state.token_count_minute = 0;
            state.minute_start = now;
        }
    }

    fn reset_day_window(&self, state: &mut RateLimitState) {
        let now = Instant::now();
        if now.saturating_duration_since(state.day_start) >= Duration::from_secs(86_400) {
            state.request_count_day = 0;
            state.day_start = now;
        }
    }

    fn seconds_until_day_reset(&self, state: &RateLimitState) -> Duration {
        let elapsed = Instant::now().saturating_duration_since(state.day_start);
        Duration::from_secs(86_400).saturating_sub(elapsed)
    }

    /// Suspends the caller until `tokens` bucket tokens are available. The
    /// sleep duration is computed under the lock, which is then released
    /// before sleeping; the check is re-run on wake (spec.md §4.6, §9 open
    /// question: zero-then-sleep ordering, both under the mutex).
    pub async fn wait(&self, tokens: u32) -> Result<(), HiveForgeError> {
        loop {
            let wait_time = {
                let mut state = self.state.lock().await;
                self.reset_minute_window(&mut state);
                self.reset_day_window(&mut state);
                self.refill_tokens(&mut state);

                if self.config.requests_per_day > 0
                    && state.request_count_day >= self.config.requests_per_day
                {
                    let retry_after = self.seconds_until_day_reset(&state);
                    return Err(HiveForgeError::transient_io(format!(
                        "daily request limit exceeded, retry after {:.0}s",
                        retry_after.as_secs_f64()
                    )));
                }

                let needed = tokens as f64 - state.tokens;
                let refill_rate = self.config.requests_per_minute as f64 / 60.0;
                let wait_time = if needed > 0.0 && refill_rate > 0.0 {
                    Duration::from_secs_f64(needed / refill_rate)
                } else {
                    Duration::ZERO
                };

                if wait_time.is_zero() {
                    state.tokens -= tokens as f64;
                    state.request_count_minute += 1;
                    state.request_count_day += 1;
                    return Ok(());
                }
                wait_time
            };
            tokio::time::sleep(wait_time).await;
        }
    }

    /// `wait(1)` then a concurrency-semaphore acquire. The returned lease
    /// releases the slot when dropped.
    pub async fn acquire(&self) -> Result<RateLimitLease, HiveForgeError> {
        self.wait(1).await?;
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| HiveForgeError::internal("rate limiter semaphore closed"))?;
        Ok(RateLimitLease { _permit: permit })
    }

    /// Charges both the request bucket and the tokens-per-minute window
    /// before acquiring a concurrency slot.
    pub async fn acquire_with_tokens(&self, llm_tokens: u32) -> Result<RateLimitLease, HiveForgeError> {
        loop {
            let wait_time = {
                let mut state = self.state.lock().await;
                self.reset_minute_window(&mut state);

                if state.token_count_minute + llm_tokens > self.config.tokens_per_minute {
                    let wait = Duration::from_secs(60)
                        .saturating_sub(Instant::now().saturating_duration_since(state.minute_start));
                    if wait.is_zero() {
                        self.reset_minute_window(&mut state);
                        state.token_count_minute += llm_tokens;
                        Duration::ZERO
                    } else {
                        wait
                    }
                } else {
                    state.token_count_minute += llm_tokens;
                    Duration::ZERO
                }
            };
            if wait_time.is_zero() {
                break;
            }
            tokio::time::sleep(wait_time).await;
        }
        self.acquire().await
    }

    pub async fn stats(&self) -> RateLimitStats {
        let state = self.state.lock().await;
        RateLimitStats {
            tokens_available: state.tokens,
            requests_this_minute: state.request_count_minute,
            requests_today: state.request_count_day,
            tokens_this_minute: state.token_count_minute,
            max_concurrent: self.config.max_concurrent,
        }
    }

    /// Handles an HTTP 429: zeroes the bucket under the lock, then sleeps
    /// for `retry_after` (default `retry_after_429`). Both the zero and the
    /// read of the configured default happen while the mutex is held, so a
    /// concurrent caller can never observe a half-reset state.
    pub async fn handle_429(&self, retry_after: Option<Duration>) {
        let wait_time = {
            let mut state = self.state.lock().await;
            state.tokens = 0.0;
            retry_after.unwrap_or(self.config.retry_after_429)
        };
        tracing::warn!(wait_secs = wait_time.as_secs_f64(), "rate limiter handling 429");
        tokio::time::sleep(wait_time).await;
    }
}

/// Calibrated defaults, matching the reference system's per-provider
/// tables exactly (spec.md §4.6).
pub fn openai_rate_limit(model: &str) -> RateLimitConfig {
    if model.starts_with("gpt-4") {
        RateLimitConfig {
            requests_per_minute: 500,
            tokens_per_minute: 30_000,
            max_concurrent: 10,
            ..RateLimitConfig::default()
        }
    } else if model.starts_with("gpt-3.5") {
        RateLimitConfig {
            requests_per_minute: 3_500,
            tokens_per_minute: 90_000,
            max_concurrent: 20,
            ..RateLimitConfig::default()
        }
    } else {
        RateLimitConfig {
            requests_per_minute: 60,
            tokens_per_minute: 10_000,
            max_concurrent: 5,
            ..RateLimitConfig::default()
        }
    }
}

pub fn anthropic_rate_limit(tier: &str) -> RateLimitConfig {
    let (rpm, tpm, concurrency) = match tier {
        "1" => (50, 40_000, 5),
        "2" => (1_000, 80_000, 10),
        "3" => (2_000, 160_000, 20),
        "4" => (4_000, 400_000, 40),
        _ => (50, 40_000, 5),
    };
    RateLimitConfig {
        requests_per_minute: rpm,
        tokens_per_minute: tpm,
        max_concurrent: concurrency,
        ..RateLimitConfig::default()
    }
}

/// Keyed registry returning a singleton limiter per `provider:model`.
#[derive(Default)]
pub struct RateLimiterRegistry {
    limiters: Mutex<HashMap<String, Arc<RateLimiter>>>,
}

impl RateLimiterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_insert(&self, key: &str, config: RateLimitConfig) -> Arc<RateLimiter> {
        let mut limiters = self.limiters.lock().await;
        limiters
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(RateLimiter::new(config)))
            .clone()
    }

    pub async fn for_openai(&self, model: &str) -> Arc<RateLimiter> {
        self.get_or_insert(&format!("openai:{model}"), openai_rate_limit(model)).await
    }

    pub async fn for_anthropic(&self, tier: &str) -> Arc<RateLimiter> {
        self.get_or_insert(&format!("anthropic:tier{tier}"), anthropic_rate_limit(tier))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn burst_capacity_is_available_immediately() {
        let limiter = RateLimiter::new(RateLimitConfig {
            requests_per_minute: 60,
            burst_limit: 3,
            ..Default::default()
        });
        for _ in 0..3 {
            limiter.wait(1).await.unwrap();
        }
        let stats = limiter.stats().await;
        assert!(stats.tokens_available < 1.0);
    }

    #[tokio::test]
    async fn fourth_request_waits_for_refill() {
        let limiter = RateLimiter::new(RateLimitConfig {
            requests_per_minute: 600, // 10/sec refill
            burst_limit: 1,
            ..Default::default()
        });
        limiter.wait(1).await.unwrap();
        let start = Instant::now();
        limiter.wait(1).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn daily_limit_is_enforced() {
        let limiter = RateLimiter::new(RateLimitConfig {
            requests_per_day: 1,
            burst_limit: 10,
            ..Default::default()
        });
        limiter.wait(1).await.unwrap();
        let result = limiter.wait(1).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn handle_429_zeroes_bucket_then_sleeps() {
        let limiter = RateLimiter::new(RateLimitConfig {
            burst_limit: 5,
            ..Default::default()
        });
        let start = Instant::now();
        limiter.handle_429(Some(Duration::from_millis(50))).await;
        assert!(start.elapsed() >= Duration::from_millis(50));
        let stats = limiter.stats().await;
        assert!(stats.tokens_available < 1.0);
    }

    #[tokio::test]
    async fn concurrency_semaphore_caps_in_flight() {
        let limiter = Arc::new(RateLimiter::new(RateLimitConfig {
            max_concurrent: 1,
            burst_limit: 10,
            ..Default::default()
        }));
        let lease1 = limiter.acquire().await.unwrap();
        let limiter2 = limiter.clone();
        let handle = tokio::spawn(async move {
            let _lease2 = limiter2.acquire().await.unwrap();
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());
        drop(lease1);
        handle.await.unwrap();
    }

    #[test]
    fn provider_defaults_match_spec_figures() {
        let gpt4 = openai_rate_limit("gpt-4-turbo");
        assert_eq!(gpt4.requests_per_minute, 500);
        assert_eq!(gpt4.tokens_per_minute, 30_000);

        let tier1 = anthropic_rate_limit("1");
        assert_eq!(tier1.requests_per_minute, 50);
        assert_eq!(tier1.tokens_per_minute, 40_000);

        let unknown = openai_rate_limit("some-future-model");
        assert_eq!(unknown.requests_per_minute, 60);
        assert_eq!(unknown.tokens_per_minute, 10_000);
    }
}
