//! Cache statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for cache mutations and derived-view recomputation.
///
/// All counters are atomic and can be safely read from any thread.
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Informer notifications applied.
    mutations_applied: AtomicU64,
    /// Updates or deletes for unknown objects, ignored.
    mutations_ignored: AtomicU64,
    /// Derived objects recomputed because of a node, service or health change.
    recomputed: AtomicU64,
    /// Events handed to broadcasters.
    events_emitted: AtomicU64,
}

impl CacheStats {
    /// Create zeroed statistics.
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn record_applied(&self) {
        self.mutations_applied.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_ignored(&self) {
        self.mutations_ignored.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_recomputed(&self, count: u64) {
        self.recomputed.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_emitted(&self, count: u64) {
        self.events_emitted.fetch_add(count, Ordering::Relaxed);
    }

    /// Total notifications applied.
    #[inline]
    pub fn mutations_applied(&self) -> u64 {
        self.mutations_applied.load(Ordering::Relaxed)
    }

    /// Total notifications ignored.
    #[inline]
    pub fn mutations_ignored(&self) -> u64 {
        self.mutations_ignored.load(Ordering::Relaxed)
    }

    /// Total derived objects recomputed.
    #[inline]
    pub fn recomputed(&self) -> u64 {
        self.recomputed.load(Ordering::Relaxed)
    }

    /// Total events emitted.
    #[inline]
    pub fn events_emitted(&self) -> u64 {
        self.events_emitted.load(Ordering::Relaxed)
    }
}
