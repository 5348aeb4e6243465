//! Request routing.
//!
//! Layering, outermost first: request tracing, the ingress prefix rewrite,
//! then the cached routes. Anything no cached route claims (unknown paths,
//! other methods, disabled kinds, debug paths without `--debug`) falls
//! through to the passthrough proxy.

use axum::routing::get;
use axum::Router;
use k8s_openapi::api::core::v1::Service;
use tower::Layer;
use tower::util::MapRequestLayer;
use tower_http::trace::TraceLayer;
use wrapper_cache::{EndpointSliceV1, EndpointSliceV1Beta1};
use wrapper_core::ResourceKind;

use crate::handlers::{debug, endpoints, nodes, resource::list_or_watch};
use crate::ingress::rewrite_ingress;
use crate::proxy::proxy;
use crate::state::AppState;

/// Build the application router for `state`.
pub fn app(state: AppState) -> Router {
    let config = state.config.clone();

    let mut routes = Router::new()
        .route("/api/v1/nodes/:name", get(nodes::get_node).fallback(proxy))
        .route(
            ResourceKind::Services.collection_path(),
            get(list_or_watch::<Service>).fallback(proxy),
        )
        .route(
            ResourceKind::Endpoints.collection_path(),
            get(endpoints::endpoints).fallback(proxy),
        );

    if config.enable_endpoint_slice_v1 {
        routes = routes.route(
            ResourceKind::EndpointSliceV1.collection_path(),
            get(list_or_watch::<EndpointSliceV1>).fallback(proxy),
        );
    }
    if config.enable_endpoint_slice_v1beta1 {
        routes = routes.route(
            ResourceKind::EndpointSliceV1Beta1.collection_path(),
            get(list_or_watch::<EndpointSliceV1Beta1>).fallback(proxy),
        );
    }
    if config.debug {
        routes = routes
            .route("/debug/pprof/", get(debug::index))
            .route("/debug/pprof/cache", get(debug::cache))
            .route("/debug/pprof/watchers", get(debug::watchers));
    }

    let routes = routes.fallback(proxy).with_state(state);
    let rewritten = MapRequestLayer::new(rewrite_ingress).layer(routes);

    Router::new()
        .fallback_service(rewritten)
        .layer(TraceLayer::new_for_http())
}
