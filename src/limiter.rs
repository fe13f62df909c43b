// src/limiter.rs

use std::sync::{Arc, Mutex, PoisonError};
use tokio::time::{Duration, Instant};

/// Token bucket pacing byte throughput, shared by clones.
#[derive(Debug, Clone)]
pub struct SpeedLimiter {
    bucket: Arc<Mutex<Bucket>>,
}

#[derive(Debug)]
struct Bucket {
    /// Bytes per second; also the burst size.
    rate: u64,
    tokens: u64,
    last_refill: Instant,
}

impl SpeedLimiter {
    /// A rate of 0 disables pacing.
    pub fn new(rate_bytes_per_sec: u64) -> Self {
        Self {
            bucket: Arc::new(Mutex::new(Bucket {
                rate: rate_bytes_per_sec,
                tokens: rate_bytes_per_sec,
                last_refill: Instant::now(),
            })),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(0)
    }

    pub fn rate(&self) -> u64 {
        self.lock().rate
    }

    /// Waits until `amount` bytes may pass.
    ///
    /// Requests larger than the burst size are let through once the bucket
    /// is full, so they never wait forever.
    pub async fn take(&self, amount: u64) {
        loop {
            let wait = self.lock().try_take(amount, Instant::now());
            match wait {
                None => return,
                Some(wait) => tokio::time::sleep(wait).await,
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Bucket> {
        self.bucket.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Bucket {
    /// Takes the tokens, or returns how long to wait before retrying.
    fn try_take(&mut self, amount: u64, now: Instant) -> Option<Duration> {
        if self.rate == 0 || amount == 0 {
            return None;
        }
        self.refill(now);

        let needed = amount.min(self.rate);
        if self.tokens >= needed {
            self.tokens -= needed;
            return None;
        }
        let missing = needed - self.tokens;
        Some(Duration::from_secs_f64(missing as f64 / self.rate as f64))
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        let earned = (elapsed.as_secs_f64() * self.rate as f64) as u64;
        if earned > 0 {
            self.tokens = self.tokens.saturating_add(earned).min(self.rate);
            self.last_refill = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn paces_to_the_configured_rate() {
        let limiter = SpeedLimiter::new(1000);
        assert_eq!(limiter.rate(), 1000);
        let start = Instant::now();

        // First second is covered by the initial burst.
        limiter.take(1000).await;
        limiter.take(500).await;
        limiter.take(500).await;

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(990), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(1500), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn unlimited_never_waits() {
        let limiter = SpeedLimiter::unlimited();
        assert_eq!(limiter.rate(), 0);
        let start = Instant::now();
        limiter.take(u64::MAX).await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_requests_do_not_stall() {
        let limiter = SpeedLimiter::new(100);
        limiter.take(100).await;
        limiter.take(10_000).await;
        assert!(limiter.lock().tokens <= 100);
    }
}
