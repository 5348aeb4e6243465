//! # wrapper-core
//!
//! Core types, annotation parsing and error handling for the edge grid wrapper.
//!
//! This crate provides the foundational types used across the other wrapper crates:
//!
//! - [`WrapperError`] - Error taxonomy with HTTP status code mapping
//! - [`ObjectKey`] - Namespace/name identity of cached objects
//! - [`ResourceKind`] - The resource kinds served from the cache and their API paths
//! - [`EventType`] - Added/Modified/Deleted watch event kinds
//! - [`annotations`] - Well-known annotations and labels (topology keys, local endpoint, node units)
//! - [`AutonomyOptions`] - The `service-autonomy-enhancement` option value
//!
//! ## Example
//!
//! ```rust
//! use wrapper_core::{annotations, ObjectKey};
//!
//! let key = ObjectKey::new("default", "nginx");
//! assert_eq!(key.to_string(), "default/nginx");
//!
//! let keys = annotations::parse_topology_keys(r#"["zone", "region"]"#).unwrap();
//! assert_eq!(keys, vec!["zone".to_string(), "region".to_string()]);
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod annotations;
mod error;
mod event;
mod key;
mod kind;
mod options;

pub use error::WrapperError;
pub use event::EventType;
pub use key::ObjectKey;
pub use kind::ResourceKind;
pub use options::AutonomyOptions;

/// Re-export of the Kubernetes object model used throughout the workspace.
pub use k8s_openapi;

/// Result type alias using [`WrapperError`].
pub type Result<T> = std::result::Result<T, WrapperError>;
