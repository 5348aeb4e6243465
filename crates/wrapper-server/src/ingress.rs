//! `/superedge-ingress/<unit>/` prefix handling.
//!
//! Ingress controllers running in a node unit reach the wrapper through a
//! path prefix naming their unit. The prefix is stripped before routing and
//! the unit is carried in [`NODE_UNIT_HEADER`], which the endpoints handler
//! uses to switch to the unit-filtered view. The header is never accepted
//! from clients directly.

use axum::extract::Request;
use http::uri::PathAndQuery;
use http::{HeaderValue, Uri};
use tracing::{trace, warn};

/// Path prefix of ingress requests.
pub const INGRESS_PREFIX: &str = "/superedge-ingress/";

/// Header carrying the node unit of an ingress request.
pub const NODE_UNIT_HEADER: &str = "x-superedge-ingress-nodeunit";

/// Split `/superedge-ingress/<unit>/<rest>` into `(unit, /<rest>)`.
pub fn split_ingress_path(path: &str) -> Option<(&str, &str)> {
    let rest = path.strip_prefix(INGRESS_PREFIX)?;
    let (unit, remainder) = match rest.find('/') {
        Some(idx) => rest.split_at(idx),
        None => (rest, ""),
    };
    if unit.is_empty() {
        return None;
    }
    Some((unit, remainder))
}

/// Strip the ingress prefix and tag the request with its node unit.
pub fn rewrite_ingress(mut request: Request) -> Request {
    request.headers_mut().remove(NODE_UNIT_HEADER);

    let Some((unit, remainder)) = split_ingress_path(request.uri().path()) else {
        return request;
    };

    let path = if remainder.is_empty() { "/" } else { remainder };
    let path_and_query = match request.uri().query() {
        Some(query) => format!("{path}?{query}"),
        None => path.to_string(),
    };

    let header = match HeaderValue::from_str(unit) {
        Ok(header) => header,
        Err(e) => {
            warn!(unit, error = %e, "ignoring ingress prefix with invalid unit name");
            return request;
        }
    };

    let mut parts = request.uri().clone().into_parts();
    parts.path_and_query = match PathAndQuery::try_from(path_and_query.as_str()) {
        Ok(pq) => Some(pq),
        Err(e) => {
            warn!(path = %path_and_query, error = %e, "ignoring unparsable ingress path");
            return request;
        }
    };
    let uri = match Uri::from_parts(parts) {
        Ok(uri) => uri,
        Err(e) => {
            warn!(error = %e, "ignoring unparsable ingress uri");
            return request;
        }
    };

    trace!(unit = ?header, uri = %uri, "rewrote ingress request");
    *request.uri_mut() = uri;
    request.headers_mut().insert(NODE_UNIT_HEADER, header);
    request
}

/// Node unit of a request that came through the ingress prefix.
pub fn node_unit(headers: &http::HeaderMap) -> Option<&str> {
    headers
        .get(NODE_UNIT_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|unit| !unit.is_empty())
}
