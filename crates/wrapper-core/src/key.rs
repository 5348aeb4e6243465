//! Object identity for cached Kubernetes objects.
//!
//! This module provides [`ObjectKey`], the `namespace/name` identity used to
//! key every namespaced map in the cache and to correlate Endpoints and
//! EndpointSlices with their Service.

use std::fmt;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// Namespace + name identity of a namespaced object.
///
/// # Example
///
/// ```rust
/// use wrapper_core::ObjectKey;
///
/// let key = ObjectKey::new("kube-system", "kube-dns");
/// assert_eq!(key.namespace(), "kube-system");
/// assert_eq!(key.name(), "kube-dns");
/// assert_eq!(format!("{key}"), "kube-system/kube-dns");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    namespace: String,
    name: String,
}

impl ObjectKey {
    /// Create a key from a namespace and a name.
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Build a key from object metadata.
    ///
    /// Missing namespace or name are treated as empty strings, matching how
    /// the API server keys cluster-scoped objects.
    #[must_use]
    pub fn from_meta(meta: &ObjectMeta) -> Self {
        Self::new(
            meta.namespace.clone().unwrap_or_default(),
            meta.name.clone().unwrap_or_default(),
        )
    }

    /// The namespace component.
    #[inline]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The name component.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
