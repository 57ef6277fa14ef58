use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::{EngineError, Result};

/// Request-weight budget shared by every fetch task.
///
/// Weight is counted per fixed window. A caller that would overflow the window
/// waits for the next one. After the upstream reports a rate limit the limiter
/// is penalized and refuses all requests until the penalty expires.
#[derive(Clone)]
pub struct GlobalRateLimiter {
    inner: Arc<Mutex<InnerLimiter>>,
}

struct InnerLimiter {
    used_weight: u32,
    window_start: Instant,
    window: Duration,
    limit: u32,
    exhausted_until: Option<Instant>,
}

impl InnerLimiter {
    fn roll_window(&mut self, now: Instant) {
        if now >= self.window_start + self.window {
            self.used_weight = 0;
            self.window_start = now;
        }
    }

    fn remaining_penalty(&mut self, now: Instant) -> Option<Duration> {
        match self.exhausted_until {
            Some(until) if until > now => Some(until - now),
            Some(_) => {
                self.exhausted_until = None;
                None
            }
            None => None,
        }
    }
}

impl GlobalRateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(InnerLimiter {
                used_weight: 0,
                window_start: Instant::now(),
                window,
                limit,
                exhausted_until: None,
            })),
        }
    }

    /// Acquires permission to use `cost` weight, waiting for the next window if needed.
    /// Fails immediately while a penalty is active.
    pub async fn acquire(&self, cost: u32, context: &str) -> Result<()> {
        loop {
            let (wait_duration, stats) = {
                let mut guard = self.inner.lock().await;
                let now = Instant::now();

                if let Some(remaining) = guard.remaining_penalty(now) {
                    return Err(EngineError::RateLimitExhausted { remaining });
                }

                guard.roll_window(now);

                // A single request larger than the whole budget still has to go through.
                let cost = cost.min(guard.limit);
                if guard.used_weight + cost <= guard.limit {
                    guard.used_weight += cost;
                    return Ok(());
                }

                let wait = (guard.window_start + guard.window).saturating_duration_since(now);
                (wait, (guard.used_weight, guard.limit))
            };

            log::warn!(
                "🛑 Rate Limit Saturated for [{}]. Used: {}/{}. Waiting {:.1}s for the next window...",
                context,
                stats.0,
                stats.1,
                wait_duration.as_secs_f64()
            );

            tokio::time::sleep(wait_duration).await;
        }
    }

    /// Marks the budget as exhausted after an upstream rate-limit response.
    /// Without an explicit retry-after the penalty lasts one full window.
    pub async fn penalize(&self, retry_after: Option<Duration>) {
        let mut guard = self.inner.lock().await;
        let now = Instant::now();
        let penalty = retry_after.unwrap_or(guard.window);
        let until = now + penalty;
        // Never shorten a penalty that is already running.
        guard.exhausted_until = Some(match guard.exhausted_until {
            Some(existing) if existing > until => existing,
            _ => until,
        });
        guard.used_weight = guard.limit;
        log::warn!(
            "Rate limiter penalized for {:.1}s",
            (guard.exhausted_until.unwrap_or(until) - now).as_secs_f64()
        );
    }

    /// Remaining penalty, if the limiter is currently refusing requests.
    pub async fn exhausted_for(&self) -> Option<Duration> {
        let mut guard = self.inner.lock().await;
        guard.remaining_penalty(Instant::now())
    }

    pub async fn used_weight(&self) -> (u32, u32) {
        let mut guard = self.inner.lock().await;
        guard.roll_window(Instant::now());
        (guard.used_weight, guard.limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn saturated_window_waits_for_next() {
        let limiter = GlobalRateLimiter::new(10, Duration::from_secs(60));
        let start = Instant::now();
        limiter.acquire(4, "a").await.unwrap();
        limiter.acquire(4, "b").await.unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);

        limiter.acquire(4, "c").await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(60));
        assert_eq!(limiter.used_weight().await, (4, 10));
    }

    #[tokio::test(start_paused = true)]
    async fn penalty_refuses_until_expiry() {
        let limiter = GlobalRateLimiter::new(100, Duration::from_secs(60));
        limiter.penalize(Some(Duration::from_secs(5))).await;

        let err = limiter.acquire(1, "x").await.unwrap_err();
        assert!(matches!(err, EngineError::RateLimitExhausted { remaining } if remaining <= Duration::from_secs(5)));
        assert!(limiter.exhausted_for().await.is_some());

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(limiter.exhausted_for().await.is_none());
        // Penalized weight is still charged against the window it was set in.
        let start = Instant::now();
        limiter.acquire(1, "x").await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(50));
    }

    #[tokio::test(start_paused = true)]
    async fn shorter_penalty_does_not_override_longer() {
        let limiter = GlobalRateLimiter::new(100, Duration::from_secs(60));
        limiter.penalize(Some(Duration::from_secs(30))).await;
        limiter.penalize(Some(Duration::from_secs(1))).await;
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(limiter.exhausted_for().await.unwrap() > Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_cost_is_clamped() {
        let limiter = GlobalRateLimiter::new(5, Duration::from_secs(60));
        limiter.acquire(50, "huge").await.unwrap();
        assert_eq!(limiter.used_weight().await, (5, 5));
    }
}
