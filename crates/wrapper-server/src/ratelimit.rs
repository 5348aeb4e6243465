//! Token bucket limiting requests to the upstream API server.
//!
//! The bucket holds up to `burst` tokens and refills at `qps` tokens per
//! second. A non-positive `qps` disables limiting.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug)]
struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: u32, refill_rate: f64) -> Self {
        let capacity = f64::from(capacity.max(1));
        Self {
            capacity,
            tokens: capacity,
            refill_rate,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    /// Take a token, or return how long until one is available.
    fn try_consume(&mut self) -> Result<(), Duration> {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            Err(Duration::from_secs_f64((1.0 - self.tokens) / self.refill_rate))
        }
    }
}

/// QPS/burst limiter shared by all upstream requests.
#[derive(Debug)]
pub struct RateLimiter {
    bucket: Option<Mutex<TokenBucket>>,
}

impl RateLimiter {
    /// Create a limiter allowing `qps` requests per second with bursts of
    /// up to `burst`.
    pub fn new(qps: f32, burst: u32) -> Self {
        let bucket = (qps > 0.0).then(|| Mutex::new(TokenBucket::new(burst, f64::from(qps))));
        Self { bucket }
    }

    /// A limiter that never waits.
    pub fn unlimited() -> Self {
        Self { bucket: None }
    }

    /// Take a token without waiting.
    pub async fn try_acquire(&self) -> bool {
        match &self.bucket {
            Some(bucket) => bucket.lock().await.try_consume().is_ok(),
            None => true,
        }
    }

    /// Wait until a token is available and take it.
    pub async fn acquire(&self) {
        let Some(bucket) = &self.bucket else {
            return;
        };
        loop {
            let wait = match bucket.lock().await.try_consume() {
                Ok(()) => return,
                Err(wait) => wait,
            };
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_refill() {
        let limiter = RateLimiter::new(2.0, 3);
        for _ in 0..3 {
            assert!(limiter.try_acquire().await);
        }
        assert!(!limiter.try_acquire().await);

        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(limiter.try_acquire().await);
        assert!(!limiter.try_acquire().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits() {
        let limiter = RateLimiter::new(1.0, 1);
        limiter.acquire().await;

        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(900));
    }

    #[tokio::test]
    async fn test_unlimited() {
        let limiter = RateLimiter::new(0.0, 0);
        for _ in 0..1000 {
            assert!(limiter.try_acquire().await);
        }
        assert!(RateLimiter::unlimited().try_acquire().await);
    }
}
