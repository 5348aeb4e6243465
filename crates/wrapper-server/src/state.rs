//! Shared state handed to every request handler.

use std::sync::Arc;

use wrapper_cache::ResourceCache;

use crate::config::ServerConfig;
use crate::metrics::WrapperMetrics;
use crate::shutdown::ShutdownController;
use crate::upstream::UpstreamClient;
use crate::watches::WatchTracker;

/// Handler state: the cache plus the server's bookkeeping.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Cache served by the handlers.
    pub cache: Arc<ResourceCache>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Metrics recorder.
    pub metrics: WrapperMetrics,
    /// Shutdown coordination for watch streams.
    pub shutdown: ShutdownController,
    /// Open watch streams.
    pub watches: WatchTracker,
    /// Upstream for requests the cache does not serve.
    pub upstream: Option<UpstreamClient>,
}

impl AppState {
    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        Self::with_cache(Arc::new(ResourceCache::new(
            wrapper_cache::CacheConfig::new("edge-1"),
        )))
    }

    #[cfg(test)]
    pub(crate) fn with_cache(cache: Arc<ResourceCache>) -> Self {
        Self {
            cache,
            config: Arc::new(ServerConfig {
                debug: true,
                enable_endpoint_slice_v1beta1: true,
                ..Default::default()
            }),
            metrics: WrapperMetrics::new(),
            shutdown: ShutdownController::new(),
            watches: WatchTracker::new(),
            upstream: None,
        }
    }
}
