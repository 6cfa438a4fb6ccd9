//! Replay Guard
//!
//! Tracks consumed nonces until their token would have expired anyway.
//! Check and insert happen under a single lock acquisition, so two
//! concurrent verifications of one token can never both see `FirstUse`.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

/// Result of consuming a nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayOutcome {
    /// Nonce recorded now
    FirstUse,
    /// Nonce was already recorded
    AlreadyUsed,
}

/// Store of consumed single-use identifiers.
///
/// Implementations must make `check_and_consume` atomic. Entries may be
/// dropped by `sweep` once `expires_at` has passed.
#[async_trait]
pub trait ReplayGuard: Send + Sync {
    /// Records `nonce` unless already present.
    async fn check_and_consume(&self, nonce: &str, expires_at: i64) -> ReplayOutcome;

    /// Read-only probe.
    async fn is_consumed(&self, nonce: &str) -> bool;

    /// Removes entries with `expires_at <= now`. Returns how many were removed.
    async fn sweep(&self, now: i64) -> usize;

    /// Number of tracked nonces.
    async fn len(&self) -> usize;
}

/// Per-process replay guard.
#[derive(Debug, Default)]
pub struct InMemoryReplayGuard {
    consumed: Mutex<HashMap<String, i64>>,
}

impl InMemoryReplayGuard {
    /// Creates an empty guard.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReplayGuard for InMemoryReplayGuard {
    async fn check_and_consume(&self, nonce: &str, expires_at: i64) -> ReplayOutcome {
        let mut consumed = self.consumed.lock();
        if consumed.contains_key(nonce) {
            return ReplayOutcome::AlreadyUsed;
        }
        consumed.insert(nonce.to_string(), expires_at);
        ReplayOutcome::FirstUse
    }

    async fn is_consumed(&self, nonce: &str) -> bool {
        self.consumed.lock().contains_key(nonce)
    }

    async fn sweep(&self, now: i64) -> usize {
        let mut consumed = self.consumed.lock();
        let before = consumed.len();
        consumed.retain(|_, expires_at| *expires_at > now);
        before - consumed.len()
    }

    async fn len(&self) -> usize {
        self.consumed.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_second_consume_is_replay() {
        let guard = InMemoryReplayGuard::new();
        assert_eq!(guard.check_and_consume("n1", 100).await, ReplayOutcome::FirstUse);
        assert_eq!(guard.check_and_consume("n1", 100).await, ReplayOutcome::AlreadyUsed);
        assert!(guard.is_consumed("n1").await);
        assert!(!guard.is_consumed("n2").await);
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let guard = InMemoryReplayGuard::new();
        guard.check_and_consume("old", 10).await;
        guard.check_and_consume("edge", 20).await;
        guard.check_and_consume("fresh", 30).await;

        assert_eq!(guard.sweep(20).await, 2);
        assert_eq!(guard.len().await, 1);
        assert!(guard.is_consumed("fresh").await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_consume_admits_exactly_one() {
        let guard = Arc::new(InMemoryReplayGuard::new());
        let mut handles = Vec::new();
        for _ in 0..32 {
            let guard = Arc::clone(&guard);
            handles.push(tokio::spawn(async move {
                guard.check_and_consume("shared", 100).await
            }));
        }

        let mut first_uses = 0;
        for handle in handles {
            if handle.await.unwrap() == ReplayOutcome::FirstUse {
                first_uses += 1;
            }
        }
        assert_eq!(first_uses, 1);
    }
}
