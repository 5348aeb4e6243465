//! Server configuration.

use std::net::SocketAddr;
use std::time::Duration;

/// Default watch timeout when the request has no `timeoutSeconds`.
pub const DEFAULT_WATCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Configuration for the wrapper HTTP server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on.
    pub bind_address: SocketAddr,
    /// Serve the `/debug/pprof/` diagnostics endpoints.
    pub debug: bool,
    /// Serve `discovery.k8s.io/v1` EndpointSlices from the cache.
    pub enable_endpoint_slice_v1: bool,
    /// Serve `discovery.k8s.io/v1beta1` EndpointSlices from the cache.
    pub enable_endpoint_slice_v1beta1: bool,
    /// Watch timeout used when the request does not set one.
    pub default_watch_timeout: Duration,
    /// Largest request body forwarded to the upstream, in bytes.
    pub max_proxy_body_bytes: usize,
    /// How long shutdown waits for open watches to finish.
    pub grace_period: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 51006)),
            debug: false,
            enable_endpoint_slice_v1: true,
            enable_endpoint_slice_v1beta1: false,
            default_watch_timeout: DEFAULT_WATCH_TIMEOUT,
            max_proxy_body_bytes: 4 * 1024 * 1024, // 4MB
            grace_period: Duration::from_secs(10),
        }
    }
}
