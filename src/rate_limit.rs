use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;

/// Minimum-interval limiter shared by concurrent requests
pub struct RateLimiter {
    min_interval: Option<Duration>,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Create a limiter, a non-positive or NaN rate disables it
    pub fn new(rate_limit_rps: f64) -> Self {
        let min_interval = if rate_limit_rps > 0.0 {
            Some(Duration::try_from_secs_f64(1.0 / rate_limit_rps).unwrap_or(Duration::MAX))
        } else {
            None
        };

        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    /// Wait until the next request is allowed
    pub async fn acquire(&self) {
        let Some(min_interval) = self.min_interval else {
            return;
        };

        // Held across the sleep so waiting callers are spaced out one by one.
        let mut last_request = self.last_request.lock().await;
        if let Some(last_time) = *last_request {
            let elapsed = last_time.elapsed();
            if elapsed < min_interval {
                sleep(min_interval - elapsed).await;
            }
        }

        *last_request = Some(Instant::now());
    }
}
