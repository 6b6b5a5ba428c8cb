// src/limiter.rs

use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

/// Paces outgoing requests with a token bucket, one token per request.
///
/// Cloned handles share the same bucket.
#[derive(Clone)]
pub struct RequestLimiter {
    state: Arc<Mutex<TokenBucket>>,
}

struct TokenBucket {
    /// Burst size.
    capacity: f64,
    tokens: f64,
    /// Tokens added per second. Zero disables limiting.
    rate: u64,
    last_refill: Instant,
}

impl RequestLimiter {
    /// A rate of 0 means unlimited.
    pub fn new(requests_per_sec: u64) -> Self {
        let capacity = requests_per_sec.max(1) as f64;
        Self {
            state: Arc::new(Mutex::new(TokenBucket {
                capacity,
                tokens: capacity,
                rate: requests_per_sec,
                last_refill: Instant::now(),
            })),
        }
    }

    /// Waits until one more request may be sent.
    pub async fn acquire(&self) {
        loop {
            let mut bucket = self.state.lock().await;
            if bucket.rate == 0 {
                return;
            }

            bucket.refill();
            if bucket.tokens >= 1.0 {
                bucket.tokens -= 1.0;
                return;
            }

            let wait_time = Duration::from_secs_f64((1.0 - bucket.tokens) / bucket.rate as f64);
            // Never sleep while holding the lock.
            drop(bucket);
            tokio::time::sleep(wait_time).await;
        }
    }
}

impl TokenBucket {
    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill);
        let added = elapsed.as_secs_f64() * self.rate as f64;
        if added > 0.0 {
            self.tokens = (self.tokens + added).min(self.capacity);
            self.last_refill = now;
        }
    }
}
