//! Passthrough reverse proxy for requests the cache does not serve.
//!
//! Request bodies are buffered up to `max_proxy_body_bytes`; responses are
//! streamed back as they arrive. The wrapper's own upstream credentials
//! replace whatever the client sent.

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::response::{IntoResponse, Response};
use http::header::{
    AUTHORIZATION, CONNECTION, HOST, PROXY_AUTHENTICATE, PROXY_AUTHORIZATION, TE, TRAILER,
    TRANSFER_ENCODING, UPGRADE,
};
use http::{HeaderMap, HeaderName, StatusCode};
use tracing::{debug, warn};
use wrapper_core::WrapperError;

use crate::error::ApiError;
use crate::ingress::NODE_UNIT_HEADER;
use crate::state::AppState;

const HOP_BY_HOP: [HeaderName; 8] = [
    CONNECTION,
    HeaderName::from_static("keep-alive"),
    PROXY_AUTHENTICATE,
    PROXY_AUTHORIZATION,
    TE,
    TRAILER,
    TRANSFER_ENCODING,
    UPGRADE,
];

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in &HOP_BY_HOP {
        headers.remove(name);
    }
}

/// Forward a request to the upstream API server.
pub async fn proxy(State(state): State<AppState>, request: Request) -> Response {
    let Some(upstream) = state.upstream.as_ref() else {
        debug!(uri = %request.uri(), "no upstream configured for unserved request");
        return ApiError::from(WrapperError::Upstream {
            message: format!("no upstream configured for {}", request.uri().path()),
            source: None,
        })
        .into_response();
    };

    let (parts, body) = request.into_parts();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    let body = match to_bytes(body, state.config.max_proxy_body_bytes).await {
        Ok(body) => body,
        Err(e) => {
            warn!(path = path_and_query, error = %e, "rejecting proxied request body");
            return (StatusCode::PAYLOAD_TOO_LARGE, e.to_string()).into_response();
        }
    };

    let mut headers = parts.headers;
    strip_hop_by_hop(&mut headers);
    headers.remove(HOST);
    headers.remove(AUTHORIZATION);
    headers.remove(NODE_UNIT_HEADER);

    let result = upstream
        .request(parts.method.clone(), path_and_query)
        .headers(headers)
        .body(body)
        .send()
        .await;

    let upstream_response = match result {
        Ok(response) => response,
        Err(e) => {
            state.metrics.record_proxied(StatusCode::BAD_GATEWAY.as_u16());
            return ApiError::from(WrapperError::upstream(
                format!("{} {}", parts.method, path_and_query),
                e,
            ))
            .into_response();
        }
    };

    let status = upstream_response.status();
    state.metrics.record_proxied(status.as_u16());
    debug!(method = %parts.method, path = path_and_query, status = status.as_u16(), "proxied");

    let mut response_headers = upstream_response.headers().clone();
    strip_hop_by_hop(&mut response_headers);

    let mut response = Response::new(Body::from_stream(upstream_response.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = response_headers;
    response
}
