//! Error types for wrapper operations.
//!
//! This module provides [`WrapperError`], the error type shared by the cache,
//! the HTTP layer and the upstream plumbing. Every variant maps to an HTTP
//! status code and a Kubernetes `Status` reason.

use http::StatusCode;

/// Comprehensive error type for wrapper operations.
///
/// This error type is designed to:
/// - Cover all failure modes without using panics
/// - Map to an HTTP status code for API responses
/// - Carry a Kubernetes `Status` reason string
/// - Support error chaining via the `source` field
///
/// # Example
///
/// ```rust
/// use wrapper_core::WrapperError;
/// use http::StatusCode;
///
/// let err = WrapperError::NotFound {
///     kind: "nodes".to_string(),
///     name: "edge-1".to_string(),
/// };
/// assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
/// ```
#[derive(Debug, thiserror::Error)]
pub enum WrapperError {
    /// No supported serializer matches the request's `Accept` header.
    #[error("no serializer matches accept header {accept:?}")]
    NotAcceptable {
        /// The raw `Accept` header value.
        accept: String,
    },

    /// Requested object doesn't exist in the cache.
    #[error("{kind} \"{name}\" not found")]
    NotFound {
        /// Resource kind (plural, e.g. `nodes`).
        kind: String,
        /// Object name.
        name: String,
    },

    /// Encoding a response object failed.
    #[error("encoding error for {media_type}: {message}")]
    Encoding {
        /// The negotiated media type.
        media_type: String,
        /// Error message.
        message: String,
    },

    /// Decoding an upstream payload failed.
    #[error("decoding error for {what}: {message}")]
    Decoding {
        /// What was being decoded.
        what: String,
        /// Error message.
        message: String,
    },

    /// Upstream API server request failed.
    #[error("upstream error: {message}")]
    Upstream {
        /// Error message.
        message: String,
        /// Optional underlying error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Upstream answered with a non-success status.
    #[error("upstream returned {status} for {path}")]
    UpstreamStatus {
        /// HTTP status returned by the upstream.
        status: u16,
        /// Request path.
        path: String,
    },

    /// Watch subscription was closed.
    #[error("watch closed: watch_id={watch_id}")]
    WatchClosed {
        /// ID of the closed watch.
        watch_id: u64,
    },

    /// Informers did not sync before the deadline.
    #[error("caches not synced: {pending:?}")]
    SyncTimeout {
        /// Resource kinds that were still pending.
        pending: Vec<String>,
    },

    /// A well-known annotation carried an unparsable value.
    #[error("invalid annotation {key}: {reason}")]
    InvalidAnnotation {
        /// Annotation key.
        key: String,
        /// Reason for the failure.
        reason: String,
    },

    /// A structured command line option could not be parsed.
    #[error("invalid option {option}: {reason}")]
    InvalidOption {
        /// Option name.
        option: String,
        /// Reason for the failure.
        reason: String,
    },

    /// Server is shutting down.
    #[error("server is shutting down")]
    Shutdown,

    /// Unexpected internal error.
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
        /// Optional underlying error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl WrapperError {
    /// Create an internal error from any error type.
    pub fn internal<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Internal {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an upstream error from any error type.
    pub fn upstream<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Upstream {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an encoding error.
    pub fn encoding(media_type: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Encoding {
            media_type: media_type.into(),
            message: err.to_string(),
        }
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            WrapperError::NotAcceptable { .. } | WrapperError::InvalidOption { .. } => {
                StatusCode::BAD_REQUEST
            }
            WrapperError::NotFound { .. } => StatusCode::NOT_FOUND,
            WrapperError::Encoding { .. }
            | WrapperError::InvalidAnnotation { .. }
            | WrapperError::Internal { .. }
            | WrapperError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            WrapperError::Decoding { .. }
            | WrapperError::Upstream { .. }
            | WrapperError::UpstreamStatus { .. } => StatusCode::BAD_GATEWAY,
            WrapperError::WatchClosed { .. }
            | WrapperError::SyncTimeout { .. }
            | WrapperError::Shutdown => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Kubernetes `Status.reason` for this error.
    pub fn reason(&self) -> &'static str {
        match self.status_code() {
            StatusCode::BAD_REQUEST => "BadRequest",
            StatusCode::NOT_FOUND => "NotFound",
            StatusCode::SERVICE_UNAVAILABLE => "ServiceUnavailable",
            StatusCode::BAD_GATEWAY => "BadGateway",
            _ => "InternalError",
        }
    }

    /// Whether the error indicates the upstream resourceVersion expired
    /// and a fresh list is required.
    pub fn is_gone(&self) -> bool {
        matches!(self, WrapperError::UpstreamStatus { status: 410, .. })
    }
}
