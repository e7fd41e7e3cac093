// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Admission Guard
//!
//! Sliding-window rate limiting keyed by client IP.
//!
//! Each key keeps a log of the timestamps of its admitted requests. On every
//! check, entries at or before `now - window` are dropped; the request is
//! admitted while fewer than `limit` entries remain, and only admitted
//! requests are logged. `reset` is when the oldest logged entry leaves the
//! window.
//!
//! Logs live behind [`RateLimitStore`]. [`RedisRateLimitStore`] shares them
//! across instances; [`MemoryRateLimitStore`] keeps them in process for
//! single-instance deployments and tests.

pub mod middleware;
pub mod redis_store;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::RateLimitConfig;

pub use middleware::{admission_guard, client_ip};
pub use redis_store::RedisRateLimitStore;

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// When the oldest counted request leaves the window, epoch milliseconds.
    pub reset_ms: u64,
}

#[derive(Debug, thiserror::Error)]
#[error("rate limit store unavailable: {0}")]
pub struct RateLimitStoreError(pub String);

/// Counter storage. `hit` must prune, evaluate and record atomically per key.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn hit(
        &self,
        key: &str,
        limit: u32,
        window_ms: u64,
        now_ms: u64,
    ) -> Result<RateLimitDecision, RateLimitStoreError>;
}

// =============================================================================
// Sliding log
// =============================================================================

/// Admitted-request timestamps for one key, oldest first.
type RequestLog = VecDeque<u64>;

fn evaluate(log: &mut RequestLog, limit: u32, window_ms: u64, now_ms: u64) -> RateLimitDecision {
    let cutoff = now_ms.saturating_sub(window_ms);
    while log.front().is_some_and(|&at| at <= cutoff) {
        log.pop_front();
    }

    let allowed = log.len() < limit as usize;
    if allowed {
        let at = log.partition_point(|&t| t <= now_ms);
        log.insert(at, now_ms);
    }

    let count = u32::try_from(log.len()).unwrap_or(u32::MAX);
    RateLimitDecision {
        allowed,
        limit,
        remaining: limit.saturating_sub(count),
        reset_ms: log.front().map_or(now_ms + window_ms, |&oldest| oldest + window_ms),
    }
}

/// Every entry has left the window.
fn is_stale(log: &RequestLog, window_ms: u64, now_ms: u64) -> bool {
    log.back()
        .is_none_or(|&newest| newest <= now_ms.saturating_sub(window_ms))
}

// =============================================================================
// In-process store
// =============================================================================

/// Request logs held in process memory.
#[derive(Default)]
pub struct MemoryRateLimitStore {
    entries: Mutex<HashMap<String, RequestLog>>,
}

impl MemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop keys whose entries have all expired. Returns how many went.
    pub async fn purge(&self, window_ms: u64, now_ms: u64) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, log| !is_stale(log, window_ms, now_ms));
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Periodically purge stale keys until `shutdown` fires.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        window: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let store = Arc::clone(self);
        let window_ms = window.as_millis() as u64;
        tokio::spawn(async move {
            info!(interval_secs = window.as_secs(), "Rate-limit sweeper starting");
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(window) => {},
                    _ = shutdown.cancelled() => {
                        info!("Rate-limit sweeper shutting down");
                        return;
                    }
                }
                let purged = store.purge(window_ms, now_ms()).await;
                if purged > 0 {
                    debug!(purged, "Rate-limit sweeper dropped stale keys");
                }
            }
        })
    }
}

#[async_trait]
impl RateLimitStore for MemoryRateLimitStore {
    async fn hit(
        &self,
        key: &str,
        limit: u32,
        window_ms: u64,
        now_ms: u64,
    ) -> Result<RateLimitDecision, RateLimitStoreError> {
        let mut entries = self.entries.lock().await;
        let log = entries.entry(key.to_string()).or_default();
        Ok(evaluate(log, limit, window_ms, now_ms))
    }
}

// =============================================================================
// Limiter
// =============================================================================

/// Policy (limit, window) bound to a counter store.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    /// Count one request for `key` at the current time.
    ///
    /// Fails open: if the store errors, the request is admitted and the
    /// failure logged.
    pub async fn check(&self, key: &str) -> RateLimitDecision {
        self.check_at(key, now_ms()).await
    }

    pub async fn check_at(&self, key: &str, now_ms: u64) -> RateLimitDecision {
        let limit = self.config.max_requests;
        let window_ms = self.config.window.as_millis() as u64;
        match self.store.hit(key, limit, window_ms, now_ms).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!(key, error = %e, "Rate-limit store failed; admitting request");
                RateLimitDecision {
                    allowed: true,
                    limit,
                    remaining: limit,
                    reset_ms: now_ms + window_ms,
                }
            }
        }
    }
}

pub(crate) fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW_MS: u64 = 60_000;
    const T0: u64 = 1_700_000_000_000;

    fn limiter(store: Arc<dyn RateLimitStore>) -> RateLimiter {
        RateLimiter::new(store, RateLimitConfig::default())
    }

    #[tokio::test]
    async fn fourth_request_in_window_is_rejected() {
        let limiter = limiter(Arc::new(MemoryRateLimitStore::new()));

        let remaining: Vec<u32> = {
            let mut out = Vec::new();
            for i in 0..3 {
                let d = limiter.check_at("ip:1", T0 + i * 1_000).await;
                assert!(d.allowed);
                out.push(d.remaining);
            }
            out
        };
        assert_eq!(remaining, vec![2, 1, 0]);

        let rejected = limiter.check_at("ip:1", T0 + 5_000).await;
        assert!(!rejected.allowed);
        assert_eq!(rejected.limit, 3);
        assert_eq!(rejected.remaining, 0);
        assert_eq!(rejected.reset_ms, T0 + WINDOW_MS);
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let limiter = limiter(Arc::new(MemoryRateLimitStore::new()));
        for _ in 0..3 {
            assert!(limiter.check_at("ip:1", T0).await.allowed);
        }
        assert!(!limiter.check_at("ip:1", T0).await.allowed);
        assert!(limiter.check_at("ip:2", T0).await.allowed);
    }

    #[tokio::test]
    async fn window_slides_with_the_oldest_request() {
        let limiter = limiter(Arc::new(MemoryRateLimitStore::new()));
        for _ in 0..3 {
            assert!(limiter.check_at("ip:1", T0 + 50_000).await.allowed);
        }

        // Eleven seconds later all three are still inside the window.
        let d = limiter.check_at("ip:1", T0 + 61_000).await;
        assert!(!d.allowed);
        assert_eq!(d.remaining, 0);
        assert_eq!(d.reset_ms, T0 + 110_000);

        // Just before the oldest expires, still closed; at expiry, open again.
        assert!(!limiter.check_at("ip:1", T0 + 109_999).await.allowed);
        let d = limiter.check_at("ip:1", T0 + 110_000).await;
        assert!(d.allowed);
        assert_eq!(d.remaining, 2);
        assert_eq!(d.reset_ms, T0 + 170_000);
    }

    #[tokio::test]
    async fn staggered_requests_expire_one_at_a_time() {
        let limiter = limiter(Arc::new(MemoryRateLimitStore::new()));
        for offset in [0, 20_000, 40_000] {
            assert!(limiter.check_at("ip:1", T0 + offset).await.allowed);
        }
        assert!(!limiter.check_at("ip:1", T0 + 59_000).await.allowed);

        // Only the first request has left the window.
        let d = limiter.check_at("ip:1", T0 + 60_000).await;
        assert!(d.allowed);
        assert_eq!(d.remaining, 0);
        assert_eq!(d.reset_ms, T0 + 80_000);
        assert!(!limiter.check_at("ip:1", T0 + 79_000).await.allowed);
    }

    #[tokio::test]
    async fn rejected_requests_are_not_counted() {
        let limiter = limiter(Arc::new(MemoryRateLimitStore::new()));
        for _ in 0..10 {
            limiter.check_at("ip:1", T0).await;
        }
        // Once the three admitted requests expire the key starts fresh.
        let d = limiter.check_at("ip:1", T0 + WINDOW_MS).await;
        assert!(d.allowed);
        assert_eq!(d.remaining, 2);
    }

    #[tokio::test]
    async fn concurrent_hits_never_exceed_limit() {
        let limiter = limiter(Arc::new(MemoryRateLimitStore::new()));
        let handles: Vec<_> = (0..20)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.check_at("ip:1", T0).await.allowed })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 3);
    }

    #[tokio::test]
    async fn purge_drops_only_stale_keys() {
        let store = MemoryRateLimitStore::new();
        store.hit("old", 3, WINDOW_MS, T0).await.unwrap();
        store.hit("recent", 3, WINDOW_MS, T0 + 30_000).await.unwrap();

        let purged = store.purge(WINDOW_MS, T0 + WINDOW_MS).await;
        assert_eq!(purged, 1);
        assert_eq!(store.len().await, 1);
    }

    struct BrokenStore;

    #[async_trait]
    impl RateLimitStore for BrokenStore {
        async fn hit(
            &self,
            _key: &str,
            _limit: u32,
            _window_ms: u64,
            _now_ms: u64,
        ) -> Result<RateLimitDecision, RateLimitStoreError> {
            Err(RateLimitStoreError("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn store_failure_fails_open() {
        let limiter = limiter(Arc::new(BrokenStore));
        assert!(limiter.check_at("ip:1", T0).await.allowed);
    }

    #[tokio::test]
    async fn sweeper_stops_on_shutdown() {
        let store = Arc::new(MemoryRateLimitStore::new());
        let shutdown = CancellationToken::new();
        let handle = store.spawn_sweeper(Duration::from_secs(60), shutdown.clone());
        shutdown.cancel();
        handle.await.unwrap();
    }
}
