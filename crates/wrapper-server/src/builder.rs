//! Server builder for configuring and creating the wrapper server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use wrapper_cache::ResourceCache;
use wrapper_core::{Result, WrapperError};

use crate::config::ServerConfig;
use crate::metrics::WrapperMetrics;
use crate::shutdown::ShutdownController;
use crate::state::AppState;
use crate::upstream::UpstreamClient;
use crate::watches::WatchTracker;
use crate::WrapperServer;

/// Builder for creating a [`WrapperServer`].
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use wrapper_cache::{CacheConfig, ResourceCache};
/// use wrapper_server::WrapperServerBuilder;
///
/// let cache = Arc::new(ResourceCache::new(CacheConfig::new("edge-1")));
/// let server = WrapperServerBuilder::new()
///     .cache(cache)
///     .bind_address("127.0.0.1:51006".parse().unwrap())
///     .debug(true)
///     .build()
///     .unwrap();
/// assert!(server.config().debug);
/// ```
#[derive(Debug, Default)]
pub struct WrapperServerBuilder {
    cache: Option<Arc<ResourceCache>>,
    upstream: Option<UpstreamClient>,
    metrics: Option<WrapperMetrics>,
    config: ServerConfig,
}

impl WrapperServerBuilder {
    /// Create a new server builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cache to serve.
    ///
    /// This is required.
    pub fn cache(mut self, cache: Arc<ResourceCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Set the upstream used for requests the cache does not serve.
    ///
    /// Without one, such requests are answered with 502.
    pub fn upstream(mut self, upstream: UpstreamClient) -> Self {
        self.upstream = Some(upstream);
        self
    }

    /// Share a metrics instance.
    pub fn metrics(mut self, metrics: WrapperMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the listen address.
    pub fn bind_address(mut self, addr: SocketAddr) -> Self {
        self.config.bind_address = addr;
        self
    }

    /// Serve the `/debug/pprof/` endpoints.
    pub fn debug(mut self, enabled: bool) -> Self {
        self.config.debug = enabled;
        self
    }

    /// Serve `discovery.k8s.io/v1` EndpointSlices.
    pub fn enable_endpoint_slice_v1(mut self, enabled: bool) -> Self {
        self.config.enable_endpoint_slice_v1 = enabled;
        self
    }

    /// Serve `discovery.k8s.io/v1beta1` EndpointSlices.
    pub fn enable_endpoint_slice_v1beta1(mut self, enabled: bool) -> Self {
        self.config.enable_endpoint_slice_v1beta1 = enabled;
        self
    }

    /// Watch timeout when the request does not set one.
    pub fn default_watch_timeout(mut self, timeout: Duration) -> Self {
        self.config.default_watch_timeout = timeout;
        self
    }

    /// Largest request body forwarded upstream.
    pub fn max_proxy_body_bytes(mut self, bytes: usize) -> Self {
        self.config.max_proxy_body_bytes = bytes;
        self
    }

    /// How long shutdown waits for open watches.
    pub fn grace_period(mut self, grace: Duration) -> Self {
        self.config.grace_period = grace;
        self
    }

    /// Build the server.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No cache was provided
    /// - The default watch timeout is zero
    /// - The proxy body limit is zero
    pub fn build(self) -> Result<WrapperServer> {
        let cache = self
            .cache
            .ok_or_else(|| WrapperError::Configuration("cache is required".into()))?;

        if self.config.default_watch_timeout.is_zero() {
            return Err(WrapperError::Configuration(
                "default watch timeout must be positive".into(),
            ));
        }
        if self.config.max_proxy_body_bytes == 0 {
            return Err(WrapperError::Configuration(
                "proxy body limit must be positive".into(),
            ));
        }

        Ok(WrapperServer {
            state: AppState {
                cache,
                config: Arc::new(self.config),
                metrics: self.metrics.unwrap_or_default(),
                shutdown: ShutdownController::new(),
                watches: WatchTracker::new(),
                upstream: self.upstream,
            },
        })
    }
}
