//! Periodic eviction of expired nonces and elapsed rate windows.
//!
//! Runs as a background task owned by the [`ShutdownCoordinator`]. A panic
//! inside one pass is logged and the next pass runs on schedule.
//!
//! [`ShutdownCoordinator`]: crate::shutdown::ShutdownCoordinator

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error};

use crate::observability::GateMetrics;
use crate::rate_limiter::RateLimiter;
use crate::replay::ReplayGuard;

/// What one sweep pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Expired nonces evicted
    pub nonces: usize,
    /// Elapsed rate windows evicted
    pub windows: usize,
}

/// State the sweeper cleans.
#[derive(Clone)]
pub struct Sweeper {
    replay: Arc<dyn ReplayGuard>,
    rate_limiter: Arc<dyn RateLimiter>,
    metrics: GateMetrics,
}

impl Sweeper {
    /// Creates a sweeper over the given stores.
    pub fn new(
        replay: Arc<dyn ReplayGuard>,
        rate_limiter: Arc<dyn RateLimiter>,
        metrics: GateMetrics,
    ) -> Self {
        Self {
            replay,
            rate_limiter,
            metrics,
        }
    }

    /// Runs one pass as of `now` (unix seconds).
    pub async fn sweep_once(&self, now: i64) -> SweepStats {
        let nonces = self.replay.sweep(now).await;
        let windows = self.rate_limiter.sweep().await;
        let tracked = self.replay.len().await;
        self.metrics
            .tracked_nonces
            .set(i64::try_from(tracked).unwrap_or(i64::MAX));
        SweepStats { nonces, windows }
    }

    /// Sweeps every `interval` until the task is cancelled.
    pub async fn run(self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let now = chrono::Utc::now().timestamp();
            match AssertUnwindSafe(self.sweep_once(now)).catch_unwind().await {
                Ok(stats) => debug!(
                    nonces = stats.nonces,
                    windows = stats.windows,
                    "Sweep pass complete"
                ),
                Err(_) => error!("Sweep pass panicked, continuing"),
            }
        }
    }
}
