//! Metrics for the wrapper HTTP layer.
//!
//! Recorded through the `metrics` facade; the binary decides whether and
//! where they are exported.
//!
//! - Request counters per resource and verb
//! - List size and latency
//! - Watch streams opened/closed, their duration and events sent
//! - Proxied request counters per upstream status

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};

/// Metrics for the wrapper server.
#[derive(Debug, Clone, Default)]
pub struct WrapperMetrics {
    inner: Arc<WrapperMetricsInner>,
}

#[derive(Debug, Default)]
struct WrapperMetricsInner {
    active_watches: AtomicU64,
}

impl WrapperMetrics {
    /// Create a new metrics instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request served from the cache.
    pub fn record_request(&self, resource: &'static str, verb: &'static str) {
        counter!("wrapper_requests_total", "resource" => resource, "verb" => verb).increment(1);
    }

    /// Record a list response.
    pub fn record_list(&self, resource: &'static str, items: usize, latency: Duration) {
        histogram!("wrapper_list_items", "resource" => resource).record(items as f64);
        histogram!("wrapper_list_latency_seconds", "resource" => resource)
            .record(latency.as_secs_f64());
    }

    /// Record a request forwarded upstream.
    pub fn record_proxied(&self, status: u16) {
        counter!("wrapper_proxied_requests_total", "status" => status.to_string()).increment(1);
    }

    /// Record events written to a watch stream.
    pub fn events_sent(&self, resource: &'static str, count: usize) {
        counter!("wrapper_watch_events_sent_total", "resource" => resource)
            .increment(count as u64);
    }

    /// Record a watch stream opened.
    pub fn watch_opened(&self, resource: &'static str) {
        let count = self.inner.active_watches.fetch_add(1, Ordering::Relaxed) + 1;
        counter!("wrapper_watches_opened_total", "resource" => resource).increment(1);
        gauge!("wrapper_active_watches").set(count as f64);
    }

    /// Record a watch stream closed.
    pub fn watch_closed(&self, resource: &'static str, duration: Duration) {
        let count = self.inner.active_watches.fetch_sub(1, Ordering::Relaxed) - 1;
        counter!("wrapper_watches_closed_total", "resource" => resource).increment(1);
        gauge!("wrapper_active_watches").set(count as f64);
        histogram!("wrapper_watch_duration_seconds", "resource" => resource)
            .record(duration.as_secs_f64());
    }

    /// Current number of open watch streams.
    pub fn active_watches(&self) -> u64 {
        self.inner.active_watches.load(Ordering::Relaxed)
    }
}

/// Records watch stream duration when dropped.
#[derive(Debug)]
pub struct WatchTimer {
    start: Instant,
    resource: &'static str,
    metrics: WrapperMetrics,
}

impl WatchTimer {
    /// Start timing a watch stream.
    pub fn new(metrics: WrapperMetrics, resource: &'static str) -> Self {
        metrics.watch_opened(resource);
        Self {
            start: Instant::now(),
            resource,
            metrics,
        }
    }
}

impl Drop for WatchTimer {
    fn drop(&mut self) {
        self.metrics
            .watch_closed(self.resource, self.start.elapsed());
    }
}
