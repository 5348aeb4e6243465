//! # grid-wrapper
//!
//! Node-local Kubernetes service discovery for edge nodes.
//!
//! The wrapper lists and watches Nodes, Services, Endpoints and
//! EndpointSlices from the API server, derives the view each edge node
//! should see (topology-aware, node-local and health-aware), and serves it
//! to local consumers through a subset of the Kubernetes list/watch API.
//! Anything it does not serve itself is forwarded to the API server.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use clap::Parser;
//! use grid_wrapper::{app, cli::Cli, logging};
//!
//! let cli = Cli::parse();
//! logging::init(&cli.log_level)?;
//! app::run(cli).await?;
//! ```
//!
//! ## Architecture
//!
//! - `wrapper-core` - error type, object keys, kinds and annotations
//! - `wrapper-cache` - the cache, the derivation passes and event fan-out
//! - `wrapper-server` - the HTTP surface, streaming watches and the proxy
//! - this crate - informers, configuration, health polling and the binary
//!
//! The sub-crates are re-exported as [`core`], [`cache`] and [`server`].

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod app;
pub mod autonomy;
pub mod cli;
pub mod informer;
pub mod kubeconfig;
pub mod logging;

pub use wrapper_cache as cache;
pub use wrapper_core as core;
pub use wrapper_server as server;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use grid_wrapper::prelude::*;
/// ```
pub mod prelude {
    pub use wrapper_core::{
        AutonomyOptions, EventType, ObjectKey, ResourceKind, Result, WrapperError,
    };

    pub use wrapper_cache::{
        CacheConfig, CacheStats, Event, ResourceCache, ResourceEventHandler, Subscription,
    };

    pub use wrapper_server::{
        ServerConfig, ShutdownController, UpstreamClient, UpstreamConfig, WrapperServer,
        WrapperServerBuilder,
    };

    pub use crate::autonomy::{HealthPoller, HealthSource};
    pub use crate::informer::{wait_for_sync, Informer, SyncHandle};
}

/// Version information for this crate.
pub mod version {
    /// Crate version.
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");

    /// Minimum supported Rust version.
    pub const MSRV: &str = "1.75";

    /// Get version info as a string.
    pub fn version_string() -> String {
        format!("grid-wrapper {} (MSRV {})", VERSION, MSRV)
    }
}

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use std::sync::Arc;

    #[test]
    fn prelude_imports_work() {
        let cache = Arc::new(ResourceCache::new(CacheConfig::new("edge-1")));
        assert_eq!(cache.host_name(), "edge-1");

        let server = WrapperServer::builder().cache(cache).build();
        assert!(server.is_ok());
    }

    #[test]
    fn version_info() {
        let version = super::version::version_string();
        assert!(version.contains("grid-wrapper"));
        assert!(version.contains(super::version::MSRV));
    }
}
