//! Token Bucket Module
//!
//! FIFO-fair token bucket gating outbound calls.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

// == Cancelled ==
/// Returned when an acquisition was abandoned before a token was granted.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("throttle acquisition cancelled")]
pub struct Cancelled;

// == Bucket State ==
#[derive(Debug)]
struct BucketState {
    /// Available tokens, always within `[0, capacity]`
    tokens: f64,
    last_refill: Instant,
}

impl BucketState {
    /// Credits tokens accrued since the last refill.
    fn refill(&mut self, now: Instant, capacity: f64, refill_per_sec: f64) {
        if refill_per_sec.is_infinite() {
            self.tokens = capacity;
        } else {
            let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
            self.tokens = (self.tokens + elapsed * refill_per_sec).min(capacity);
        }
        self.last_refill = now;
    }
}

// == Token Bucket Throttle ==
/// Admits callers at a steady rate with a fixed burst allowance.
///
/// The bucket starts full. Waiters queue on a fair async mutex, so tokens are
/// granted in arrival order; the head of the queue sleeps while holding the
/// lock until its token has accrued.
#[derive(Debug)]
pub struct TokenBucketThrottle {
    bucket: Mutex<BucketState>,
    capacity: f64,
    refill_per_sec: f64,
}

impl TokenBucketThrottle {
    // == Constructor ==
    /// Creates a throttle allowing `capacity` back-to-back calls, refilled at
    /// `refill_per_sec` tokens per second.
    ///
    /// A capacity of zero is raised to one. A non-positive or NaN rate means
    /// the bucket never refills; an infinite rate never throttles.
    pub fn new(capacity: u32, refill_per_sec: f64) -> Self {
        let capacity = f64::from(capacity.max(1));
        let refill_per_sec = if refill_per_sec > 0.0 {
            refill_per_sec
        } else {
            0.0
        };

        Self {
            bucket: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            capacity,
            refill_per_sec,
        }
    }

    /// Creates a throttle granting `capacity` calls per `period`.
    pub fn per_period(capacity: u32, period: Duration) -> Self {
        let rate = if period.is_zero() {
            f64::INFINITY
        } else {
            1.0 / period.as_secs_f64()
        };
        Self::new(capacity, rate)
    }

    // == Acquire ==
    /// Waits for a token, or until `cancel` completes.
    ///
    /// On cancellation no token is consumed. Dropping the returned future has
    /// the same effect.
    pub async fn acquire<C>(&self, cancel: C) -> Result<(), Cancelled>
    where
        C: Future<Output = ()>,
    {
        tokio::pin!(cancel);

        let mut bucket = tokio::select! {
            biased;
            _ = &mut cancel => return Err(Cancelled),
            guard = self.bucket.lock() => guard,
        };

        loop {
            bucket.refill(Instant::now(), self.capacity, self.refill_per_sec);
            if bucket.tokens >= 1.0 {
                bucket.tokens -= 1.0;
                return Ok(());
            }

            if self.refill_per_sec == 0.0 {
                cancel.await;
                return Err(Cancelled);
            }

            // A tiny rate can put the next token beyond what a Duration holds
            let wait = Duration::try_from_secs_f64((1.0 - bucket.tokens) / self.refill_per_sec)
                .unwrap_or(Duration::MAX);
            debug!(wait_ms = wait.as_millis() as u64, "Throttle: waiting for token");

            tokio::select! {
                biased;
                _ = &mut cancel => return Err(Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    // == Try Acquire ==
    /// Takes a token only if one is available right now and nobody is queued.
    pub fn try_acquire(&self) -> bool {
        let Ok(mut bucket) = self.bucket.try_lock() else {
            return false;
        };

        bucket.refill(Instant::now(), self.capacity, self.refill_per_sec);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    // == Run ==
    /// Runs `operation` once a token is granted.
    ///
    /// If `cancel` fires first, `operation` is never invoked.
    pub async fn run<C, F, Fut, T>(&self, cancel: C, operation: F) -> Result<T, Cancelled>
    where
        C: Future<Output = ()>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.acquire(cancel).await?;
        Ok(operation().await)
    }

    pub fn capacity(&self) -> u32 {
        self.capacity as u32
    }

    pub fn refill_per_sec(&self) -> f64 {
        self.refill_per_sec
    }
}
