//! Fixed-Window Rate Limiter
//!
//! Hard per-subject caps on token issuance. A window opens at the first
//! request for a subject and the count resets once it elapses.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::config::RatePolicy;

/// Rate limit decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// Request admitted and counted
    Admitted,
    /// Request denied; whole seconds until the window resets (at least 1)
    Denied {
        /// Seconds until retry
        retry_after_seconds: u64,
    },
}

/// Per-subject admission control.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Decides every `(subject_key, policy)` pair as one unit.
    ///
    /// Each subject is counted only when all of them admit; otherwise none
    /// is charged. The returned decisions line up with `subjects`, so a
    /// caller can see every subject that denied, not just the first.
    async fn admit_all(&self, subjects: &[(&str, RatePolicy)]) -> Vec<RateDecision>;

    /// Drops windows that have elapsed. Returns how many were removed.
    async fn sweep(&self) -> usize;
}

/// Window state for one subject
#[derive(Debug, Clone)]
struct WindowState {
    request_count: u32,
    window_start: Instant,
    window: Duration,
}

impl WindowState {
    fn elapsed(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.window_start) >= self.window
    }
}

/// Per-process rate limiter.
#[derive(Debug, Default)]
pub struct InMemoryRateLimiter {
    windows: Mutex<HashMap<String, WindowState>>,
}

impl InMemoryRateLimiter {
    /// Creates an empty limiter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-subject admission at an explicit instant.
    pub fn admit_at(&self, subject_key: &str, policy: RatePolicy, now: Instant) -> RateDecision {
        self.admit_all_at(&[(subject_key, policy)], now)
            .pop()
            .unwrap_or(RateDecision::Admitted)
    }

    /// All-or-nothing admission at an explicit instant.
    pub fn admit_all_at(&self, subjects: &[(&str, RatePolicy)], now: Instant) -> Vec<RateDecision> {
        let mut windows = self.windows.lock();

        let decisions: Vec<RateDecision> = subjects
            .iter()
            .map(|(key, policy)| match windows.get(*key) {
                Some(state) if !state.elapsed(now) && state.request_count >= policy.limit => {
                    let remaining = state
                        .window
                        .saturating_sub(now.saturating_duration_since(state.window_start));
                    RateDecision::Denied {
                        retry_after_seconds: ceil_secs(remaining).max(1),
                    }
                }
                _ => RateDecision::Admitted,
            })
            .collect();

        if decisions.iter().all(|d| *d == RateDecision::Admitted) {
            for (key, policy) in subjects {
                let state = windows.entry((*key).to_string()).or_insert(WindowState {
                    request_count: 0,
                    window_start: now,
                    window: policy.window,
                });

                // Reset window if expired
                if state.elapsed(now) {
                    state.request_count = 0;
                    state.window_start = now;
                    state.window = policy.window;
                }
                state.request_count += 1;
            }
        }
        decisions
    }

    /// Sweep at an explicit instant.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut windows = self.windows.lock();
        let before = windows.len();
        windows.retain(|_, state| !state.elapsed(now));
        before - windows.len()
    }

    /// Number of tracked subjects.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.windows.lock().len()
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn admit_all(&self, subjects: &[(&str, RatePolicy)]) -> Vec<RateDecision> {
        self.admit_all_at(subjects, Instant::now())
    }

    async fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_request_in_window_denied() {
        let limiter = InMemoryRateLimiter::new();
        let policy = RatePolicy::per_seconds(1, 60);
        let start = Instant::now();

        assert_eq!(limiter.admit_at("a", policy, start), RateDecision::Admitted);
        assert_eq!(
            limiter.admit_at("a", policy, start + Duration::from_millis(250)),
            RateDecision::Denied {
                retry_after_seconds: 60
            }
        );
        assert_eq!(
            limiter.admit_at("a", policy, start + Duration::from_secs(59)),
            RateDecision::Denied {
                retry_after_seconds: 1
            }
        );
    }

    #[test]
    fn test_window_resets() {
        let limiter = InMemoryRateLimiter::new();
        let policy = RatePolicy::per_seconds(1, 60);
        let start = Instant::now();

        limiter.admit_at("a", policy, start);
        assert_eq!(
            limiter.admit_at("a", policy, start + Duration::from_secs(60)),
            RateDecision::Admitted
        );
    }

    #[test]
    fn test_subjects_are_independent() {
        let limiter = InMemoryRateLimiter::new();
        let policy = RatePolicy::per_seconds(1, 60);
        let now = Instant::now();

        assert_eq!(limiter.admit_at("a", policy, now), RateDecision::Admitted);
        assert_eq!(limiter.admit_at("b", policy, now), RateDecision::Admitted);
    }

    #[test]
    fn test_limit_counts() {
        let limiter = InMemoryRateLimiter::new();
        let policy = RatePolicy::per_seconds(10, 3600);
        let now = Instant::now();

        for _ in 0..10 {
            assert_eq!(limiter.admit_at("r", policy, now), RateDecision::Admitted);
        }
        assert!(matches!(
            limiter.admit_at("r", policy, now),
            RateDecision::Denied {
                retry_after_seconds: 3600
            }
        ));
    }

    #[test]
    fn test_sweep_drops_elapsed_windows() {
        let limiter = InMemoryRateLimiter::new();
        let start = Instant::now();
        limiter.admit_at("short", RatePolicy::per_seconds(1, 60), start);
        limiter.admit_at("long", RatePolicy::per_seconds(1, 3600), start);

        assert_eq!(limiter.sweep_at(start + Duration::from_secs(61)), 1);
        assert_eq!(limiter.tracked(), 1);
    }

    #[test]
    fn test_denial_charges_no_subject() {
        let limiter = InMemoryRateLimiter::new();
        let pii = RatePolicy::per_seconds(1, 60);
        let requester = RatePolicy::per_seconds(1, 3600);
        let now = Instant::now();

        assert_eq!(limiter.admit_at("requester:x", requester, now), RateDecision::Admitted);

        let decisions = limiter.admit_all_at(&[("pii:2", pii), ("requester:x", requester)], now);
        assert_eq!(
            decisions,
            vec![
                RateDecision::Admitted,
                RateDecision::Denied {
                    retry_after_seconds: 3600
                }
            ]
        );

        // pii:2 was not counted by the denied attempt
        assert_eq!(limiter.admit_at("pii:2", pii, now), RateDecision::Admitted);
    }

    #[test]
    fn test_all_denials_reported() {
        let limiter = InMemoryRateLimiter::new();
        let pii = RatePolicy::per_seconds(1, 60);
        let requester = RatePolicy::per_seconds(1, 3600);
        let now = Instant::now();
        let subjects = [("pii:1", pii), ("requester:x", requester)];

        assert!(limiter
            .admit_all_at(&subjects, now)
            .iter()
            .all(|d| *d == RateDecision::Admitted));
        assert_eq!(
            limiter.admit_all_at(&subjects, now + Duration::from_secs(1)),
            vec![
                RateDecision::Denied {
                    retry_after_seconds: 59
                },
                RateDecision::Denied {
                    retry_after_seconds: 3599
                }
            ]
        );
    }

    #[test]
    fn test_ceil_secs() {
        assert_eq!(ceil_secs(Duration::from_millis(59_001)), 60);
        assert_eq!(ceil_secs(Duration::from_secs(60)), 60);
        assert_eq!(ceil_secs(Duration::ZERO), 0);
    }
}
