//! Generic list/watch handler for cached collections.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use http::header::CONTENT_TYPE;
use http::HeaderMap;
use k8s_openapi::api::core::v1::{Endpoints, Service};
use k8s_openapi::ListableResource;
use serde::Serialize;
use tracing::debug;
use wrapper_cache::{EndpointSliceV1, EndpointSliceV1Beta1, ResourceCache, Subscription};
use wrapper_core::ResourceKind;

use crate::codec::encode_list;
use crate::error::ApiError;
use crate::negotiate::{negotiate_headers, MediaType};
use crate::params::ListParams;
use crate::state::AppState;
use crate::stream::{subscription_stream, watch_response, WatchRequest};

/// A collection served from the cache.
pub trait Served: ListableResource + Serialize + Send + Sync + 'static {
    /// The kind, for paths, logs and metrics.
    const RESOURCE: ResourceKind;

    /// Current snapshot.
    fn list(cache: &ResourceCache) -> Vec<Arc<Self>>;

    /// Live changes.
    fn watch(cache: &ResourceCache) -> Subscription<Arc<Self>>;
}

impl Served for Service {
    const RESOURCE: ResourceKind = ResourceKind::Services;

    fn list(cache: &ResourceCache) -> Vec<Arc<Self>> {
        cache.get_services()
    }

    fn watch(cache: &ResourceCache) -> Subscription<Arc<Self>> {
        cache.watch_services(false)
    }
}

impl Served for Endpoints {
    const RESOURCE: ResourceKind = ResourceKind::Endpoints;

    fn list(cache: &ResourceCache) -> Vec<Arc<Self>> {
        cache.get_endpoints()
    }

    fn watch(cache: &ResourceCache) -> Subscription<Arc<Self>> {
        cache.watch_endpoints(false)
    }
}

impl Served for EndpointSliceV1 {
    const RESOURCE: ResourceKind = ResourceKind::EndpointSliceV1;

    fn list(cache: &ResourceCache) -> Vec<Arc<Self>> {
        cache.get_endpoint_slices_v1()
    }

    fn watch(cache: &ResourceCache) -> Subscription<Arc<Self>> {
        cache.watch_endpoint_slices_v1(false)
    }
}

impl Served for EndpointSliceV1Beta1 {
    const RESOURCE: ResourceKind = ResourceKind::EndpointSliceV1Beta1;

    fn list(cache: &ResourceCache) -> Vec<Arc<Self>> {
        cache.get_endpoint_slices_v1beta1()
    }

    fn watch(cache: &ResourceCache) -> Subscription<Arc<Self>> {
        cache.watch_endpoint_slices_v1beta1(false)
    }
}

/// `GET <collection>[?watch=&timeoutSeconds=]`.
pub async fn list_or_watch<T: Served>(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
    headers: HeaderMap,
) -> Response {
    let media = match negotiate_headers(&headers) {
        Ok(media) => media,
        Err(e) => return ApiError::from(e).into_response(),
    };

    let resource = T::RESOURCE.short_name();
    if params.is_watch() {
        state.metrics.record_request(resource, "watch");
        let request = WatchRequest {
            resource,
            media,
            timeout: params.timeout(state.config.default_watch_timeout),
            node_unit: None,
        };
        let events = subscription_stream(T::watch(&state.cache));
        return watch_response(&state, request, events);
    }

    state.metrics.record_request(resource, "list");
    list_response(&state, resource, media, &T::list(&state.cache))
}

/// Encode a list response and record its metrics.
pub(crate) fn list_response<T>(
    state: &AppState,
    resource: &'static str,
    media: MediaType,
    items: &[Arc<T>],
) -> Response
where
    T: ListableResource + Serialize,
{
    let started = Instant::now();
    match encode_list(media, items) {
        Ok(body) => {
            state
                .metrics
                .record_list(resource, items.len(), started.elapsed());
            debug!(resource, items = items.len(), "served list");
            ([(CONTENT_TYPE, media.content_type())], body).into_response()
        }
        Err(e) => ApiError::new(e, media).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names<T: Served>() -> (&'static str, &'static str) {
        (T::RESOURCE.short_name(), T::KIND)
    }

    #[test]
    fn served_kinds_alongside_object_kinds() {
        assert_eq!(names::<Service>(), ("services", "Service"));
        assert_eq!(names::<Endpoints>(), ("endpoints", "Endpoints"));
        assert_eq!(
            <EndpointSliceV1 as Served>::RESOURCE.collection_path(),
            "/apis/discovery.k8s.io/v1/endpointslices"
        );
        assert_eq!(
            <EndpointSliceV1Beta1 as Served>::RESOURCE,
            ResourceKind::EndpointSliceV1Beta1
        );
    }
}
