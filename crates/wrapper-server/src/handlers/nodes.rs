//! Single node lookup.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use http::header::CONTENT_TYPE;
use http::HeaderMap;
use wrapper_core::{ResourceKind, WrapperError};

use crate::codec::encode_object;
use crate::error::ApiError;
use crate::negotiate::negotiate_headers;
use crate::state::AppState;

/// `GET /api/v1/nodes/<name>`.
pub async fn get_node(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Response {
    let media = match negotiate_headers(&headers) {
        Ok(media) => media,
        Err(e) => return ApiError::from(e).into_response(),
    };
    state
        .metrics
        .record_request(ResourceKind::Nodes.short_name(), "get");

    let Some(node) = state.cache.get_node(&name) else {
        let err = WrapperError::NotFound {
            kind: ResourceKind::Nodes.short_name().to_string(),
            name,
        };
        return ApiError::new(err, media).into_response();
    };

    match encode_object(media, node.as_ref()) {
        Ok(body) => ([(CONTENT_TYPE, media.content_type())], body).into_response(),
        Err(e) => ApiError::new(e, media).into_response(),
    }
}
