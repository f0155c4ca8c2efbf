use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

/// Request-weight budget shared by every REST caller, reset on each wall-clock minute.
#[derive(Clone)]
pub struct GlobalRateLimiter {
    inner: Arc<Mutex<InnerLimiter>>,
}

struct InnerLimiter {
    used_weight: u32,
    // Minutes since the epoch for the window being counted
    current_minute_idx: u64,
    limit: u32,
}

impl GlobalRateLimiter {
    pub fn new(limit: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(InnerLimiter {
                used_weight: 0,
                current_minute_idx: Self::current_minute_idx(),
                limit,
            })),
        }
    }

    /// Waits until `cost` fits in the current minute's budget, then spends it.
    pub async fn acquire(&self, cost: u32, context: &str) {
        loop {
            let wait = match self.try_acquire(cost).await {
                Ok(()) => return,
                Err(wait) => wait,
            };

            log::warn!(
                "🛑 Rate limit saturated for [{}]. Waiting {:.1}s (until :00)...",
                context,
                wait.as_secs_f64()
            );

            tokio::time::sleep(wait).await;
        }
    }

    /// Spends `cost` if it fits, otherwise returns how long until the next minute.
    async fn try_acquire(&self, cost: u32) -> Result<(), Duration> {
        let mut guard = self.inner.lock().await;
        let now_idx = Self::current_minute_idx();

        if now_idx > guard.current_minute_idx {
            guard.used_weight = 0;
            guard.current_minute_idx = now_idx;
        }

        // A single request larger than the budget is let through on a fresh minute.
        if guard.used_weight + cost <= guard.limit || guard.used_weight == 0 {
            guard.used_weight += cost;
            return Ok(());
        }

        let seconds_into_minute = Self::now_secs() % 60;
        // Small buffer to land inside the next minute
        Err(Duration::from_secs(60 - seconds_into_minute) + Duration::from_millis(100))
    }

    pub async fn used_weight(&self) -> u32 {
        self.inner.lock().await.used_weight
    }

    fn now_secs() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs()
    }

    fn current_minute_idx() -> u64 {
        Self::now_secs() / 60
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spends_weight_until_budget_is_gone() {
        let limiter = GlobalRateLimiter::new(5);
        assert!(limiter.try_acquire(2).await.is_ok());
        assert!(limiter.try_acquire(2).await.is_ok());
        match limiter.try_acquire(2).await {
            Err(wait) => {
                assert_eq!(limiter.used_weight().await, 4);
                assert!(wait <= Duration::from_millis(60_100));
            }
            // Only possible if the wall-clock minute rolled over mid-test.
            Ok(()) => assert!(limiter.used_weight().await <= 4),
        }
    }

    #[tokio::test]
    async fn oversized_request_passes_on_empty_budget() {
        let limiter = GlobalRateLimiter::new(1);
        assert!(limiter.try_acquire(3).await.is_ok());
    }
}
