//! Tracking of open watch streams.
//!
//! Every watch registers itself for its lifetime. The registration keeps
//! shutdown waiting for the stream, records its duration and shows up in
//! `/debug/pprof/watchers`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use serde::Serialize;
use tracing::debug;

use crate::metrics::{WatchTimer, WrapperMetrics};
use crate::negotiate::MediaType;
use crate::shutdown::{OperationGuard, ShutdownController};

/// Unique identifier for a watch stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchId(u64);

impl WatchId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric value.
    #[inline]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for WatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "watch-{}", self.0)
    }
}

/// Information about an open watch.
#[derive(Debug, Clone)]
pub struct WatchInfo {
    /// Watch identifier.
    pub id: WatchId,
    /// Resource being watched.
    pub resource: &'static str,
    /// Node unit for ingress-filtered watches.
    pub node_unit: Option<String>,
    /// Serializer used for frames.
    pub media: MediaType,
    /// When the watch was opened.
    pub started: Instant,
}

/// Serializable view of a [`WatchInfo`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchReport {
    /// Watch identifier.
    pub id: u64,
    /// Resource being watched.
    pub resource: &'static str,
    /// Node unit for ingress-filtered watches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_unit: Option<String>,
    /// Frame content type.
    pub content_type: &'static str,
    /// Seconds since the watch was opened.
    pub age_seconds: f64,
}

impl From<&WatchInfo> for WatchReport {
    fn from(info: &WatchInfo) -> Self {
        Self {
            id: info.id.as_u64(),
            resource: info.resource,
            node_unit: info.node_unit.clone(),
            content_type: info.media.stream_content_type(),
            age_seconds: info.started.elapsed().as_secs_f64(),
        }
    }
}

/// Registry of open watch streams.
#[derive(Debug, Clone, Default)]
pub struct WatchTracker {
    watches: Arc<DashMap<WatchId, WatchInfo>>,
}

impl WatchTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a watch. It stays registered until the guard is dropped.
    pub fn register(
        &self,
        resource: &'static str,
        node_unit: Option<String>,
        media: MediaType,
        shutdown: &ShutdownController,
        metrics: &WrapperMetrics,
    ) -> WatchGuard {
        let id = WatchId::next();
        self.watches.insert(
            id,
            WatchInfo {
                id,
                resource,
                node_unit,
                media,
                started: Instant::now(),
            },
        );
        debug!(watch = %id, resource, "watch opened");

        WatchGuard {
            id,
            tracker: self.clone(),
            _operation: shutdown.register_operation(),
            _timer: WatchTimer::new(metrics.clone(), resource),
        }
    }

    /// Number of open watches.
    pub fn len(&self) -> usize {
        self.watches.len()
    }

    /// Whether no watch is open.
    pub fn is_empty(&self) -> bool {
        self.watches.is_empty()
    }

    /// Snapshot of open watches, oldest first.
    pub fn list(&self) -> Vec<WatchInfo> {
        let mut watches: Vec<WatchInfo> =
            self.watches.iter().map(|entry| entry.value().clone()).collect();
        watches.sort_by_key(|w| w.id);
        watches
    }
}

/// Keeps a watch registered while alive.
#[derive(Debug)]
pub struct WatchGuard {
    id: WatchId,
    tracker: WatchTracker,
    _operation: OperationGuard,
    _timer: WatchTimer,
}

impl WatchGuard {
    /// The watch's identifier.
    pub fn id(&self) -> WatchId {
        self.id
    }
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        if let Some((id, info)) = self.tracker.watches.remove(&self.id) {
            debug!(
                watch = %id,
                resource = info.resource,
                duration = ?info.started.elapsed(),
                "watch closed"
            );
        }
    }
}
