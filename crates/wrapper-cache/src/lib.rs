//! # wrapper-cache
//!
//! Node-local cache of cluster service discovery state.
//!
//! This crate provides the caching layer behind the edge API wrapper:
//!
//! - [`ResourceCache`] - Nodes, Services, Endpoints and EndpointSlices, with
//!   the node-local derived views kept current under one lock
//! - [`ResourceEventHandler`] - typed informer adapters feeding the cache
//! - [`Broadcaster`] / [`Subscription`] - bounded, non-blocking event fan-out
//! - [`prune`] - the derivation passes (topology, local endpoint, health,
//!   node unit)
//!
//! ## Key Design Decisions
//!
//! - Derived views are recomputed under the write lock and compared by deep
//!   equality; only changed views produce events
//! - Events are broadcast after the write lock is released
//! - A full subscriber queue drops the event for that subscriber only
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use wrapper_cache::{CacheConfig, ResourceCache, ResourceEventHandler};
//! use k8s_openapi::api::core::v1::Service;
//!
//! let cache = Arc::new(ResourceCache::new(CacheConfig::new("edge-1")));
//! let mut watch = cache.watch_services(true);
//!
//! let mut svc = Service::default();
//! svc.metadata.namespace = Some("default".to_string());
//! svc.metadata.name = Some("web".to_string());
//! cache.service_event_handler().on_add(svc);
//!
//! assert_eq!(cache.get_services().len(), 1);
//! assert!(watch.try_recv().is_ok());
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod broadcast;
mod config;
mod handler;
pub mod prune;
mod stats;
mod store;

pub use broadcast::{BroadcastStats, Broadcaster, Event, Subscription, SubscriptionId};
pub use config::{CacheConfig, DEFAULT_NOTIFY_CHANNEL_SIZE};
pub use handler::{
    EndpointSliceV1Beta1EventHandler, EndpointSliceV1EventHandler, EndpointsEventHandler,
    NodeEventHandler, ResourceEventHandler, ServiceEventHandler,
};
pub use prune::{EndpointView, PruneContext};
pub use stats::CacheStats;
pub use store::{CacheSummary, CachedService, EndpointSliceV1, EndpointSliceV1Beta1, ResourceCache};
