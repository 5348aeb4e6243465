//! HTTP error responses.

use axum::body::Body;
use axum::response::{IntoResponse, Response};
use http::header::CONTENT_TYPE;
use tracing::{debug, warn};
use wrapper_core::WrapperError;

use crate::codec::{encode_object, status_for};
use crate::negotiate::MediaType;

/// A [`WrapperError`] rendered as a Kubernetes `Status` response.
#[derive(Debug)]
pub struct ApiError {
    error: WrapperError,
    media: MediaType,
}

impl ApiError {
    /// Render `error` with the negotiated serializer.
    pub fn new(error: WrapperError, media: MediaType) -> Self {
        Self { error, media }
    }

    /// The underlying error.
    pub fn error(&self) -> &WrapperError {
        &self.error
    }
}

impl From<WrapperError> for ApiError {
    fn from(error: WrapperError) -> Self {
        Self::new(error, MediaType::Json)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.error.status_code();
        if status.is_server_error() {
            warn!(error = %self.error, status = status.as_u16(), "request failed");
        } else {
            debug!(error = %self.error, status = status.as_u16(), "request rejected");
        }

        let body = status_for(&self.error);
        match encode_object(self.media, &body) {
            Ok(bytes) => Response::builder()
                .status(status)
                .header(CONTENT_TYPE, self.media.content_type())
                .body(Body::from(bytes))
                .unwrap_or_else(|_| status.into_response()),
            Err(e) => {
                warn!(error = %e, "failed to encode status body");
                (status, self.error.to_string()).into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_not_found_renders_status() {
        let response = ApiError::new(
            WrapperError::NotFound {
                kind: "nodes".to_string(),
                name: "edge-9".to_string(),
            },
            MediaType::Json,
        )
        .into_response();

        assert_eq!(response.status(), http::StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["kind"], "Status");
        assert_eq!(value["code"], 404);
        assert_eq!(value["details"]["name"], "edge-9");
    }

    #[tokio::test]
    async fn test_yaml_status() {
        let response = ApiError::new(WrapperError::Shutdown, MediaType::Yaml).into_response();
        assert_eq!(response.status(), http::StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/yaml");
    }
}
