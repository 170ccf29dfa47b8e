//! Cooperative token-bucket rate limiter.
//!
//! One bucket per (service, provider) pair, shared by all tasks of a
//! replica. Limiters are process-local: replicas do not share quota, so the
//! configured rate must be conservative relative to replica count times the
//! provider ceiling.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::debug;

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Snapshot of limiter state for `/status` and logs.
#[derive(Debug, Clone, Serialize)]
pub struct BucketStats {
    pub available_tokens: f64,
    pub capacity: f64,
    pub refill_per_sec: f64,
    pub acquired: u64,
    pub rejected: u64,
}

/// Token bucket with cooperative blocking acquire.
pub struct TokenBucket {
    state: Mutex<BucketState>,
    capacity: f64,
    refill_per_sec: f64,
    acquired: AtomicU64,
    rejected: AtomicU64,
}

impl TokenBucket {
    /// Bucket holding at most `capacity` tokens, refilled continuously at
    /// `refill_per_sec`. Starts full.
    pub fn new(capacity: f64, refill_per_sec: f64) -> Self {
        Self {
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            capacity,
            refill_per_sec,
            acquired: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Bucket sized for a per-minute quota: capacity = per_min, refill
    /// spread evenly across the minute.
    pub fn per_minute(per_min: u32) -> Self {
        let per_min = per_min.max(1) as f64;
        Self::new(per_min, per_min / 60.0)
    }

    /// Bucket sized for an hourly quota.
    pub fn per_hour(per_hour: u32) -> Self {
        let per_hour = per_hour.max(1) as f64;
        Self::new(per_hour, per_hour / 3600.0)
    }

    fn refill(&self, state: &mut BucketState) {
        let elapsed = state.last_refill.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
            state.last_refill = Instant::now();
        }
    }

    /// Acquire `tokens`, waiting cooperatively up to `deadline`.
    ///
    /// Returns `false` on deadline miss instead of erroring, so callers can
    /// degrade gracefully.
    pub async fn acquire(&self, tokens: f64, deadline: Duration) -> bool {
        let started = Instant::now();
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                self.refill(&mut state);
                if state.tokens >= tokens {
                    state.tokens -= tokens;
                    self.acquired.fetch_add(1, Ordering::Relaxed);
                    return true;
                }
                // Time until enough tokens have dripped in. A bucket with
                // no refill can never satisfy the request.
                let deficit = tokens - state.tokens;
                if self.refill_per_sec > 0.0 {
                    Duration::from_secs_f64((deficit / self.refill_per_sec).min(86_400.0))
                } else {
                    Duration::from_secs(86_400)
                }
            };

            let remaining = deadline.saturating_sub(started.elapsed());
            if remaining.is_zero() || wait > remaining {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                debug!(?deadline, "token acquire missed deadline");
                return false;
            }
            tokio::time::sleep(wait.min(remaining)).await;
        }
    }

    /// Non-blocking acquire.
    pub async fn try_acquire(&self, tokens: f64) -> bool {
        let mut state = self.state.lock().await;
        self.refill(&mut state);
        if state.tokens >= tokens {
            state.tokens -= tokens;
            self.acquired.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    pub async fn stats(&self) -> BucketStats {
        let mut state = self.state.lock().await;
        self.refill(&mut state);
        BucketStats {
            available_tokens: state.tokens,
            capacity: self.capacity,
            refill_per_sec: self.refill_per_sec,
            acquired: self.acquired.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}
