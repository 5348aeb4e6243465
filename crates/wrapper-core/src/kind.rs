//! Resource kinds served from the cache.
//!
//! This module provides [`ResourceKind`], which names each cached resource
//! kind and knows the API collection path it is served under.

use std::fmt;

/// A resource kind owned by the cache.
///
/// # Example
///
/// ```rust
/// use wrapper_core::ResourceKind;
///
/// assert_eq!(ResourceKind::Endpoints.collection_path(), "/api/v1/endpoints");
/// assert_eq!(
///     ResourceKind::from_collection_path("/apis/discovery.k8s.io/v1/endpointslices"),
///     Some(ResourceKind::EndpointSliceV1)
/// );
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// `v1` Node.
    Nodes,
    /// `v1` Service.
    Services,
    /// `v1` Endpoints.
    Endpoints,
    /// `discovery.k8s.io/v1` EndpointSlice.
    EndpointSliceV1,
    /// `discovery.k8s.io/v1beta1` EndpointSlice.
    EndpointSliceV1Beta1,
}

impl ResourceKind {
    /// All kinds, in informer start order.
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Nodes,
        ResourceKind::Services,
        ResourceKind::Endpoints,
        ResourceKind::EndpointSliceV1,
        ResourceKind::EndpointSliceV1Beta1,
    ];

    /// Cluster-wide collection path for list and watch.
    pub const fn collection_path(&self) -> &'static str {
        match self {
            ResourceKind::Nodes => "/api/v1/nodes",
            ResourceKind::Services => "/api/v1/services",
            ResourceKind::Endpoints => "/api/v1/endpoints",
            ResourceKind::EndpointSliceV1 => "/apis/discovery.k8s.io/v1/endpointslices",
            ResourceKind::EndpointSliceV1Beta1 => "/apis/discovery.k8s.io/v1beta1/endpointslices",
        }
    }

    /// Short name used in logs and metrics labels.
    pub const fn short_name(&self) -> &'static str {
        match self {
            ResourceKind::Nodes => "nodes",
            ResourceKind::Services => "services",
            ResourceKind::Endpoints => "endpoints",
            ResourceKind::EndpointSliceV1 => "endpointslices.v1",
            ResourceKind::EndpointSliceV1Beta1 => "endpointslices.v1beta1",
        }
    }

    /// Look a kind up by its collection path.
    pub fn from_collection_path(path: &str) -> Option<Self> {
        let path = path.trim_end_matches('/');
        Self::ALL
            .into_iter()
            .find(|kind| kind.collection_path() == path)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}
