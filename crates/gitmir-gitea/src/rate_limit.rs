use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Simple token-bucket rate limiter guarding outbound Gitea API calls.
/// Refills continuously; a call that finds no tokens available fails the
/// caller with `ErrRateLimited` rather than blocking.
pub struct TokenBucket {
    inner: Mutex<Inner>,
    capacity: f64,
    refill_per_sec: f64,
}

struct Inner {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(capacity: u32, refill_per_sec: u32) -> Self {
        Self {
            inner: Mutex::new(Inner {
                tokens: capacity as f64,
                last_refill: Instant::now(),
            }),
            capacity: capacity as f64,
            refill_per_sec: refill_per_sec as f64,
        }
    }

    /// Attempt to take one token. Returns `false` (and no retry-after hint
    /// beyond a full refill interval) if the bucket is empty.
    pub fn try_acquire(&self) -> bool {
        let mut inner = self.inner.lock().expect("rate limiter mutex poisoned");
        let now = Instant::now();
        let elapsed = now.duration_since(inner.last_refill).as_secs_f64();
        inner.tokens = (inner.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        inner.last_refill = now;

        if inner.tokens >= 1.0 {
            inner.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    pub fn retry_after(&self) -> Duration {
        Duration::from_secs_f64((1.0 / self.refill_per_sec).max(1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_exhausts_and_refills() {
        let bucket = TokenBucket::new(2, 1000);
        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());

        std::thread::sleep(Duration::from_millis(10));
        assert!(bucket.try_acquire());
    }
}
