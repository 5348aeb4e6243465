//! Endpoints, with the node-unit view for ingress requests.
//!
//! Requests tagged with a node unit get raw Endpoints filtered to the unit's
//! nodes instead of the topology-pruned view. The ingress watch is seeded
//! with the current raw objects and also follows node changes: when a node
//! referenced by a cached Endpoints object changes, that object's filtered
//! view is re-sent as `MODIFIED`, since unit membership may have changed.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use futures::stream::{self, StreamExt};
use http::HeaderMap;
use k8s_openapi::api::core::v1::{Endpoints, Node};
use tracing::trace;
use wrapper_cache::prune::{filter_by_node_unit, references_node};
use wrapper_cache::{Event, ResourceCache};
use wrapper_core::ResourceKind;

use crate::error::ApiError;
use crate::handlers::resource::{list_or_watch, list_response};
use crate::ingress::node_unit;
use crate::negotiate::negotiate_headers;
use crate::params::ListParams;
use crate::state::AppState;
use crate::stream::{subscription_stream, watch_response, EventStream, WatchRequest};

/// `GET /api/v1/endpoints[?watch=&timeoutSeconds=]`.
pub async fn endpoints(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
    headers: HeaderMap,
) -> Response {
    match node_unit(&headers).map(str::to_string) {
        Some(unit) => ingress_endpoints(state, params, &headers, unit),
        None => list_or_watch::<Endpoints>(State(state), Query(params), headers).await,
    }
}

fn ingress_endpoints(
    state: AppState,
    params: ListParams,
    headers: &HeaderMap,
    unit: String,
) -> Response {
    let media = match negotiate_headers(headers) {
        Ok(media) => media,
        Err(e) => return ApiError::from(e).into_response(),
    };
    let resource = ResourceKind::Endpoints.short_name();

    if params.is_watch() {
        state.metrics.record_request(resource, "ingress-watch");
        let request = WatchRequest {
            resource,
            media,
            timeout: params.timeout(state.config.default_watch_timeout),
            node_unit: Some(unit.clone()),
        };
        let events = ingress_stream(Arc::clone(&state.cache), unit);
        return watch_response(&state, request, events);
    }

    state.metrics.record_request(resource, "ingress-list");
    let members = state.cache.nodes_in_unit(&unit);
    let items: Vec<Arc<Endpoints>> = state
        .cache
        .get_raw_endpoints()
        .iter()
        .map(|endpoints| Arc::new(filter_by_node_unit(endpoints, &members)))
        .collect();
    list_response(&state, resource, media, &items)
}

enum Change {
    Endpoints(Event<Arc<Endpoints>>),
    Node(Event<Arc<Node>>),
}

/// Unit-filtered Endpoints events for `unit`.
pub fn ingress_stream(cache: Arc<ResourceCache>, unit: String) -> EventStream<Endpoints> {
    let raw = subscription_stream(cache.watch_raw_endpoints(true)).map(Change::Endpoints);
    let nodes = subscription_stream(cache.watch_nodes(false)).map(Change::Node);

    stream::select(raw, nodes)
        .flat_map(move |change| stream::iter(unit_events(&cache, &unit, change)))
        .boxed()
}

fn unit_events(cache: &ResourceCache, unit: &str, change: Change) -> Vec<Event<Arc<Endpoints>>> {
    let members = cache.nodes_in_unit(unit);
    match change {
        Change::Endpoints(event) => {
            let filtered = filter_by_node_unit(&event.object, &members);
            vec![Event::new(event.kind, Arc::new(filtered))]
        }
        Change::Node(event) => {
            let Some(node) = event.object.metadata.name.as_deref() else {
                return Vec::new();
            };
            let affected: Vec<_> = cache
                .get_raw_endpoints()
                .iter()
                .filter(|endpoints| references_node(endpoints, node))
                .map(|endpoints| Event::modified(Arc::new(filter_by_node_unit(endpoints, &members))))
                .collect();
            trace!(node, unit, affected = affected.len(), "node change in ingress watch");
            affected
        }
    }
}
