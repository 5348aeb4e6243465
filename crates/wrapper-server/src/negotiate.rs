//! `Accept` header negotiation.
//!
//! Clauses are matched in three passes: an exact `type/subtype` match, then a
//! `type/*` wildcard, then `*/*`. The first clause satisfied by the earliest
//! pass wins. Media type parameters (`q`, `stream`, ...) are ignored. A
//! missing or empty header selects the first supported serializer.

use http::HeaderMap;
use wrapper_core::WrapperError;

/// A serializer the server can produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MediaType {
    /// `application/json`
    Json,
    /// `application/yaml`
    Yaml,
}

impl MediaType {
    /// Supported serializers, in preference order.
    pub const SUPPORTED: [MediaType; 2] = [MediaType::Json, MediaType::Yaml];

    /// Top-level type.
    pub const fn type_(&self) -> &'static str {
        "application"
    }

    /// Subtype.
    pub const fn subtype(&self) -> &'static str {
        match self {
            MediaType::Json => "json",
            MediaType::Yaml => "yaml",
        }
    }

    /// Content type for a single object or list.
    pub const fn content_type(&self) -> &'static str {
        match self {
            MediaType::Json => "application/json",
            MediaType::Yaml => "application/yaml",
        }
    }

    /// Content type for a watch stream.
    pub const fn stream_content_type(&self) -> &'static str {
        match self {
            MediaType::Json => "application/json;stream=watch",
            MediaType::Yaml => "application/yaml;stream=watch",
        }
    }
}

/// Pick a serializer for an `Accept` header value.
///
/// # Example
///
/// ```rust
/// use wrapper_server::negotiate::{negotiate, MediaType};
///
/// let accept = "application/vnd.kubernetes.protobuf, application/json";
/// assert_eq!(negotiate(Some(accept)).unwrap(), MediaType::Json);
/// assert_eq!(negotiate(None).unwrap(), MediaType::Json);
/// assert!(negotiate(Some("text/html")).is_err());
/// ```
pub fn negotiate(accept: Option<&str>) -> Result<MediaType, WrapperError> {
    let Some(accept) = accept.map(str::trim).filter(|a| !a.is_empty()) else {
        return Ok(MediaType::SUPPORTED[0]);
    };

    let clauses: Vec<(&str, &str)> = accept
        .split(',')
        .filter_map(|clause| {
            let essence = clause.split(';').next()?.trim();
            let (type_, subtype) = essence.split_once('/')?;
            Some((type_.trim(), subtype.trim()))
        })
        .collect();

    // Exact match.
    for (type_, subtype) in &clauses {
        if let Some(media) = MediaType::SUPPORTED.into_iter().find(|m| {
            m.type_().eq_ignore_ascii_case(type_) && m.subtype().eq_ignore_ascii_case(subtype)
        }) {
            return Ok(media);
        }
    }

    // Wildcard subtype.
    for (type_, subtype) in &clauses {
        if *subtype != "*" || *type_ == "*" {
            continue;
        }
        if let Some(media) = MediaType::SUPPORTED
            .into_iter()
            .find(|m| m.type_().eq_ignore_ascii_case(type_))
        {
            return Ok(media);
        }
    }

    // Wildcard everything.
    if clauses.iter().any(|(t, s)| *t == "*" && *s == "*") {
        return Ok(MediaType::SUPPORTED[0]);
    }

    Err(WrapperError::NotAcceptable {
        accept: accept.to_string(),
    })
}

/// Negotiate from request headers.
pub fn negotiate_headers(headers: &HeaderMap) -> Result<MediaType, WrapperError> {
    match headers.get(http::header::ACCEPT) {
        None => negotiate(None),
        Some(value) => match value.to_str() {
            Ok(accept) => negotiate(Some(accept)),
            Err(_) => Err(WrapperError::NotAcceptable {
                accept: String::from_utf8_lossy(value.as_bytes()).into_owned(),
            }),
        },
    }
}
