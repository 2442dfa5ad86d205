use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::provider_policy::ProviderPolicy;

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Per-provider FIFO queue that runs one task at a time and spaces task
/// starts so that at most `limit` begin within any `window`.
///
/// Tasks are never failed by the queue; a task's own error is returned as-is.
#[derive(Clone)]
pub struct RateLimitedQueue {
    limiter: Arc<DirectRateLimiter>,
    // tokio's Mutex hands the lock out in acquisition order. Holds the
    // previous task's start.
    turn: Arc<Mutex<Option<Instant>>>,
    spacing: Duration,
}

impl RateLimitedQueue {
    pub fn new(limit: u32, window: Duration) -> Self {
        let (quota, spacing) = quota_from_window(window, limit);
        Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
            turn: Arc::new(Mutex::new(None)),
            spacing,
        }
    }

    pub fn per_minute(requests_per_minute: u32) -> Self {
        Self::new(requests_per_minute, Duration::from_secs(60))
    }

    pub fn from_policy(policy: &ProviderPolicy) -> Self {
        Self::new(policy.requests_per_minute, policy.quota_window)
    }

    /// Minimum gap between consecutive task starts.
    pub const fn spacing(&self) -> Duration {
        self.spacing
    }

    /// Waits for this task's turn and rate budget, then runs it to completion.
    pub async fn enqueue<F, Fut, T>(&self, task: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let mut last_start = self.turn.lock().await;
        if self.limiter.check().is_err() {
            tracing::debug!(spacing_ms = self.spacing.as_millis() as u64, "queue pacing");
            self.limiter.until_ready().await;
        }
        // governor paces on its own clock; this holds the gap on tokio's.
        if let Some(previous) = *last_start {
            tokio::time::sleep_until(previous + self.spacing).await;
        }
        *last_start = Some(Instant::now());
        task().await
    }
}

fn quota_from_window(window: Duration, limit: u32) -> (Quota, Duration) {
    let safe_limit = u128::from(limit.max(1));
    // Rounded up, so `limit` gaps never add up to less than `window`.
    let nanos_per_cell = window.as_nanos().div_ceil(safe_limit).max(1_000_000);
    let period = Duration::from_nanos(u64::try_from(nanos_per_cell).unwrap_or(u64::MAX));

    // Burst of one: starts are evenly spaced rather than front-loaded.
    let quota = Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
        .allow_burst(NonZeroU32::MIN);
    (quota, period)
}
