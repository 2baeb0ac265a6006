use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

/// Process-wide limit on chat requests that reach the generation service.
///
/// Requests are scheduled one `1 / rps` slot apart, with up to `rps` slots of burst. A
/// rejected request learns how long until its slot opens, which the HTTP layer reports as
/// `Retry-After`.
#[derive(Clone)]
pub struct RateLimiter {
    rps: u32,
    interval: Duration,
    burst: Duration,
    next_slot: Arc<Mutex<Instant>>,
}

impl RateLimiter {
    /// Enabled only when `RATE_LIMIT_RPS` is a positive integer.
    pub fn from_env() -> Option<Self> {
        let rps = std::env::var("RATE_LIMIT_RPS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())?;
        Self::new(rps)
    }

    pub fn new(rps: u32) -> Option<Self> {
        if rps == 0 {
            return None;
        }
        let interval = Duration::from_secs(1) / rps;
        Some(Self {
            rps,
            interval,
            burst: interval * (rps - 1),
            next_slot: Arc::new(Mutex::new(Instant::now())),
        })
    }

    pub fn rps(&self) -> u32 {
        self.rps
    }

    /// Claim a slot, or return how long until one is free.
    pub async fn check(&self) -> Result<(), Duration> {
        let mut next_slot = self.next_slot.lock().await;
        let now = Instant::now();
        let slot = (*next_slot).max(now);

        let ahead = slot.saturating_duration_since(now);
        if ahead > self.burst {
            return Err(ahead - self.burst);
        }
        *next_slot = slot + self.interval;
        Ok(())
    }
}

/// Whole seconds for a `Retry-After` header, never zero.
pub fn retry_after_secs(wait: Duration) -> u64 {
    (wait.as_secs_f64().ceil() as u64).max(1)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{retry_after_secs, RateLimiter};

    #[test]
    fn zero_rps_disables_limiting() {
        assert!(RateLimiter::new(0).is_none());
    }

    #[tokio::test]
    async fn burst_is_bounded_by_rps() {
        let limiter = RateLimiter::new(2).unwrap();
        assert!(limiter.check().await.is_ok());
        assert!(limiter.check().await.is_ok());
        let wait = limiter.check().await.unwrap_err();
        assert!(wait > Duration::ZERO);
        assert!(wait <= Duration::from_millis(500));
    }

    #[tokio::test]
    async fn rejection_does_not_consume_a_slot() {
        let limiter = RateLimiter::new(1).unwrap();
        assert!(limiter.check().await.is_ok());
        let first = limiter.check().await.unwrap_err();
        let second = limiter.check().await.unwrap_err();
        assert!(second <= first);
    }

    #[test]
    fn retry_after_rounds_up_to_whole_seconds() {
        assert_eq!(retry_after_secs(Duration::from_millis(1)), 1);
        assert_eq!(retry_after_secs(Duration::from_millis(999)), 1);
        assert_eq!(retry_after_secs(Duration::from_millis(1_001)), 2);
        assert_eq!(retry_after_secs(Duration::ZERO), 1);
    }
}
