//! # wrapper-server
//!
//! HTTP front end for the node-local resource cache.
//!
//! This crate serves the cached collections with the API server's list and
//! watch protocol and forwards everything else upstream:
//!
//! - [`WrapperServer`] - Main server type
//! - [`WrapperServerBuilder`] - Builder for configuring the server
//! - `Accept` negotiation between JSON and YAML
//! - Chunked watch streams with batched flushes
//! - `/superedge-ingress/<unit>/` node-unit filtered Endpoints
//! - Passthrough proxy with QPS-limited upstream client
//! - Graceful shutdown draining open watches
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use wrapper_cache::{CacheConfig, ResourceCache};
//! use wrapper_server::{UpstreamClient, UpstreamConfig, WrapperServer};
//!
//! let cache = Arc::new(ResourceCache::new(CacheConfig::new("edge-1")));
//! let upstream = UpstreamClient::new(UpstreamConfig::new("https://10.0.0.1:6443"))?;
//! let server = WrapperServer::builder()
//!     .cache(cache)
//!     .upstream(upstream)
//!     .build()?;
//!
//! // Serves until SIGTERM/SIGINT, then drains watches.
//! server.serve().await?;
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod builder;
mod config;
pub mod codec;
pub mod error;
pub mod handlers;
pub mod ingress;
pub mod metrics;
pub mod negotiate;
pub mod params;
pub mod proxy;
pub mod ratelimit;
pub mod router;
pub mod shutdown;
pub mod state;
pub mod stream;
pub mod upstream;
pub mod watches;

pub use builder::WrapperServerBuilder;
pub use config::{ServerConfig, DEFAULT_WATCH_TIMEOUT};
pub use error::ApiError;
pub use metrics::WrapperMetrics;
pub use negotiate::MediaType;
pub use shutdown::{ShutdownController, ShutdownSignal};
pub use state::AppState;
pub use upstream::{UpstreamClient, UpstreamConfig};
pub use watches::{WatchId, WatchTracker};

use std::future::{Future, IntoFuture};
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};
use wrapper_cache::ResourceCache;
use wrapper_core::{Result, WrapperError};

/// The wrapper HTTP server.
#[derive(Debug, Clone)]
pub struct WrapperServer {
    state: AppState,
}

impl WrapperServer {
    /// Create a new builder for configuring the server.
    pub fn builder() -> WrapperServerBuilder {
        WrapperServerBuilder::new()
    }

    /// Get a reference to the cache.
    #[inline]
    pub fn cache(&self) -> &Arc<ResourceCache> {
        &self.state.cache
    }

    /// Get the server configuration.
    #[inline]
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }

    /// Get the metrics instance.
    #[inline]
    pub fn metrics(&self) -> &WrapperMetrics {
        &self.state.metrics
    }

    /// Get the shutdown controller.
    #[inline]
    pub fn shutdown_controller(&self) -> &ShutdownController {
        &self.state.shutdown
    }

    /// Get the open watch tracker.
    #[inline]
    pub fn watches(&self) -> &WatchTracker {
        &self.state.watches
    }

    /// The application router, for serving or for in-process testing.
    pub fn app(&self) -> Router {
        router::app(self.state.clone())
    }

    /// Listen on the configured address until SIGTERM/SIGINT.
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(shutdown::wait_for_signal()).await
    }

    /// Listen on the configured address until `signal` resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let addr = self.state.config.bind_address;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| WrapperError::internal(format!("binding {addr}"), e))?;
        self.serve_listener(listener, signal).await
    }

    /// Serve on an existing listener until `signal` resolves.
    ///
    /// On shutdown the cache feeds are closed, open watches are signalled
    /// and the server waits up to the grace period for them to finish.
    pub async fn serve_listener<F>(self, listener: TcpListener, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let local = listener.local_addr().ok();
        info!(addr = ?local, "starting wrapper server");

        let stop_accepting = self.state.shutdown.shutdown_signal().wait();
        let mut serve = tokio::spawn(
            axum::serve(listener, self.app())
                .with_graceful_shutdown(stop_accepting)
                .into_future(),
        );

        tokio::select! {
            result = &mut serve => return join_result(result),
            _ = signal => {}
        }

        info!("shutting down wrapper server");
        let grace = self.state.config.grace_period;
        self.state.cache.shutdown();
        let drained = self.state.shutdown.shutdown(grace).await;

        match tokio::time::timeout(grace, &mut serve).await {
            Ok(result) => join_result(result)?,
            Err(_) => {
                warn!("connections still open after grace period, aborting");
                serve.abort();
            }
        }

        info!(drained, "wrapper server stopped");
        Ok(())
    }
}

fn join_result(
    result: std::result::Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<()> {
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(WrapperError::internal("http server failed", e)),
        Err(e) => Err(WrapperError::internal("http server task failed", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wrapper_cache::CacheConfig;

    #[tokio::test]
    async fn test_serve_and_shutdown() {
        let cache = Arc::new(ResourceCache::new(CacheConfig::new("edge-1")));
        let server = WrapperServer::builder()
            .cache(Arc::clone(&cache))
            .grace_period(Duration::from_secs(2))
            .build()
            .unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(server.serve_listener(listener, async {
            let _ = rx.await;
        }));

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(()).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        // Feeds are closed with the server.
        let mut watch = cache.watch_services(false);
        assert!(watch.recv().await.is_none());
    }
}
