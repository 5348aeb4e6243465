//! Informer notification handlers.
//!
//! Each resource kind has a handler bound to a shared [`ResourceCache`]. The
//! informer calls `on_add`, `on_update` and `on_delete` with the object from
//! the API server; an update or delete for an object the cache does not know
//! is logged and ignored.

use std::sync::Arc;

use k8s_openapi::api::core::v1::{Endpoints, Node, Service};

use crate::store::{EndpointSliceV1, EndpointSliceV1Beta1, Mutation, ResourceCache};

/// Receives informer notifications for objects of type `K`.
pub trait ResourceEventHandler<K>: Send + Sync {
    /// The object was created, or first seen after a re-list.
    fn on_add(&self, object: K);

    /// The object changed.
    fn on_update(&self, object: K);

    /// The object was removed. `object` is its last known state.
    fn on_delete(&self, object: K);
}

macro_rules! event_handler {
    ($(#[$doc:meta])* $handler:ident, $kind:ty, $apply:ident, $ctor:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone)]
        pub struct $handler {
            cache: Arc<ResourceCache>,
        }

        impl ResourceEventHandler<$kind> for $handler {
            fn on_add(&self, object: $kind) {
                self.cache.$apply(Mutation::Add, object);
            }

            fn on_update(&self, object: $kind) {
                self.cache.$apply(Mutation::Update, object);
            }

            fn on_delete(&self, object: $kind) {
                self.cache.$apply(Mutation::Delete, object);
            }
        }

        impl ResourceCache {
            #[doc = concat!("Handler feeding `", stringify!($kind), "` notifications into this cache.")]
            pub fn $ctor(self: &Arc<Self>) -> $handler {
                $handler {
                    cache: Arc::clone(self),
                }
            }
        }
    };
}

event_handler!(
    /// Applies Node notifications.
    NodeEventHandler,
    Node,
    apply_node,
    node_event_handler
);
event_handler!(
    /// Applies Service notifications.
    ServiceEventHandler,
    Service,
    apply_service,
    service_event_handler
);
event_handler!(
    /// Applies Endpoints notifications.
    EndpointsEventHandler,
    Endpoints,
    apply_endpoints,
    endpoints_event_handler
);
event_handler!(
    /// Applies `discovery.k8s.io/v1` EndpointSlice notifications.
    EndpointSliceV1EventHandler,
    EndpointSliceV1,
    apply_endpoint_slice_v1,
    endpoint_slice_v1_event_handler
);
event_handler!(
    /// Applies `discovery.k8s.io/v1beta1` EndpointSlice notifications.
    EndpointSliceV1Beta1EventHandler,
    EndpointSliceV1Beta1,
    apply_endpoint_slice_v1beta1,
    endpoint_slice_v1beta1_event_handler
);
