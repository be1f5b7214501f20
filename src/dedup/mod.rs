// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The Dedup Cache (§4.4): a bounded `fingerprint -> last-seen timestamp`
//! map shared across the driver and dispatcher. Two eviction rules apply
//! on every insert — age > window and size > capacity — and lookup is a
//! single check-and-insert critical section (SPEC_FULL §10.6) so two
//! concurrent dispatch calls for the same fingerprint never both observe
//! "absent".

use std::time::{Duration, Instant};

use lru::LruCache;
use tokio::sync::Mutex;

use crate::model::change_event::Fingerprint;

/// Default window and capacity from §4.4.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(5);
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Bounded recent-change set keyed by fingerprint, used to suppress
/// redundant writes within a short time window.
///
/// A single `tokio::sync::Mutex` guards the `LruCache` rather than a
/// readers-writer lock: every operation here is "check and maybe insert"
/// in one step, so there is no pure-read path that would benefit from
/// shared access, and holding the mutex is never held across I/O.
pub struct DedupCache {
    window: Duration,
    inner: Mutex<LruCache<Fingerprint, Instant>>,
}

impl DedupCache {
    pub fn new(window: Duration, capacity: usize) -> Self {
        let capacity = std::num::NonZeroUsize::new(capacity.max(1))
            .unwrap_or(std::num::NonZeroUsize::new(DEFAULT_CAPACITY).expect("nonzero"));
        Self { window, inner: Mutex::new(LruCache::new(capacity)) }
    }

    /// Checks whether `fp` was seen within the window and, if not, records
    /// it as seen now. Returns `true` if the event should be **dropped**
    /// (a duplicate within the window), `false` if it should proceed.
    ///
    /// This is the one-locked-critical-section contract: the check and the
    /// insert happen while holding the same lock guard.
    pub async fn check_and_insert(&self, fp: Fingerprint) -> bool {
        let now = Instant::now();
        let mut guard = self.inner.lock().await;

        if let Some(seen_at) = guard.get(&fp) {
            if now.duration_since(*seen_at) <= self.window {
                return true;
            }
        }

        guard.put(fp, now);
        false
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;

    use super::*;
    use crate::model::change_event::Fingerprint;

    fn fp(tag: &str) -> Fingerprint {
        Fingerprint::compute(b"k", tag, Bytes::from_static(b"v").as_ref())
    }

    #[tokio::test]
    async fn first_sighting_is_not_a_duplicate() {
        let cache = DedupCache::new(Duration::from_secs(5), 100);
        assert!(!cache.check_and_insert(fp("string")).await);
    }

    #[tokio::test]
    async fn repeat_within_window_is_dropped() {
        let cache = DedupCache::new(Duration::from_secs(5), 100);
        let f = fp("string");
        assert!(!cache.check_and_insert(f).await);
        assert!(cache.check_and_insert(f).await);
    }

    #[tokio::test]
    async fn repeat_after_window_elapses_is_not_dropped() {
        let cache = DedupCache::new(Duration::from_millis(20), 100);
        let f = fp("string");
        assert!(!cache.check_and_insert(f).await);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(!cache.check_and_insert(f).await);
    }

    #[tokio::test]
    async fn capacity_evicts_oldest_entries() {
        let cache = DedupCache::new(Duration::from_secs(60), 2);
        assert!(!cache.check_and_insert(fp("a")).await);
        assert!(!cache.check_and_insert(fp("b")).await);
        assert!(!cache.check_and_insert(fp("c")).await);
        assert_eq!(cache.len().await, 2);
    }
}
