//! Derivation of the node-local endpoint views.
//!
//! Each Endpoints or EndpointSlice object is stored as received and as a
//! derived copy. Derivation runs, in order:
//!
//! 1. Local endpoint substitution for `default/kubernetes` Endpoints carrying
//!    both `superedge.io/local-endpoint` and `superedge.io/local-port`. The
//!    result is final.
//! 2. Topology filtering: when the owning Service declares topology keys,
//!    only addresses on nodes sharing a key's label value with the host node
//!    are kept. The `*` key keeps any address on a known node.
//! 3. Health override: addresses on nodes reported unhealthy are marked not
//!    ready.
//!
//! Derivation is a pure function of the raw object and a [`PruneContext`],
//! so recomputing against unchanged inputs yields an equal object.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use k8s_openapi::api::core::v1::{
    EndpointAddress, EndpointPort, EndpointSubset, Endpoints, Node,
};
use k8s_openapi::api::discovery::{v1 as discovery_v1, v1beta1 as discovery_v1beta1};
use wrapper_core::annotations::{self, LocalEndpoint, ANY_TOPOLOGY_KEY};
use wrapper_core::ObjectKey;

use crate::store::CachedService;

/// Port name used for the substituted local API endpoint.
const LOCAL_ENDPOINT_PORT_NAME: &str = "https";

/// Inputs the derived views depend on besides the raw object.
#[derive(Clone, Copy)]
pub struct PruneContext<'a> {
    host_name: &'a str,
    nodes: &'a BTreeMap<String, Arc<Node>>,
    services: &'a BTreeMap<ObjectKey, CachedService>,
    node_health: &'a HashMap<String, bool>,
}

impl<'a> PruneContext<'a> {
    /// Create a context.
    pub fn new(
        host_name: &'a str,
        nodes: &'a BTreeMap<String, Arc<Node>>,
        services: &'a BTreeMap<ObjectKey, CachedService>,
        node_health: &'a HashMap<String, bool>,
    ) -> Self {
        Self {
            host_name,
            nodes,
            services,
            node_health,
        }
    }

    /// Topology keys of a cached service, if it has any.
    fn topology_keys(&self, service: Option<&ObjectKey>) -> Option<&'a [String]> {
        let service = self.services.get(service?)?;
        if service.topology_keys.is_empty() {
            None
        } else {
            Some(service.topology_keys.as_slice())
        }
    }

    /// Whether an address on `node_name` survives the topology filter.
    fn in_topology(&self, node_name: Option<&str>, keys: &[String]) -> bool {
        let Some(node_name) = node_name else {
            return false;
        };
        let (Some(node), Some(host)) = (self.nodes.get(node_name), self.nodes.get(self.host_name))
        else {
            return false;
        };

        let node_labels = node.metadata.labels.as_ref();
        let host_labels = host.metadata.labels.as_ref();

        keys.iter().any(|key| {
            if key == ANY_TOPOLOGY_KEY {
                return true;
            }
            match (
                host_labels.and_then(|l| l.get(key)),
                node_labels.and_then(|l| l.get(key)),
            ) {
                (Some(host_value), Some(node_value)) => host_value == node_value,
                _ => false,
            }
        })
    }

    fn is_unhealthy(&self, node_name: Option<&str>) -> bool {
        node_name
            .and_then(|name| self.node_health.get(name))
            .is_some_and(|healthy| !healthy)
    }
}

/// An endpoint-bearing object with a node-local derived view.
pub trait EndpointView: Clone + PartialEq + Send + Sync + 'static {
    /// Identity of this object.
    fn object_key(&self) -> ObjectKey;

    /// Identity of the Service this object belongs to.
    fn service_key(&self) -> Option<ObjectKey>;

    /// Compute the node-local view of this object.
    fn prune(&self, ctx: &PruneContext<'_>) -> Self;
}

impl EndpointView for Endpoints {
    fn object_key(&self) -> ObjectKey {
        ObjectKey::from_meta(&self.metadata)
    }

    fn service_key(&self) -> Option<ObjectKey> {
        Some(self.object_key())
    }

    fn prune(&self, ctx: &PruneContext<'_>) -> Self {
        if annotations::is_master_endpoints(&self.metadata) {
            if let Some(local) = annotations::local_endpoint(&self.metadata) {
                return with_local_endpoint(self, &local);
            }
        }

        let mut out = self.clone();
        let key = self.object_key();

        if let Some(keys) = ctx.topology_keys(Some(&key)) {
            retain_addresses(&mut out, |addr| ctx.in_topology(addr.node_name.as_deref(), keys));
        }

        for subset in out.subsets.iter_mut().flatten() {
            let Some(addresses) = subset.addresses.as_mut() else {
                continue;
            };
            if !addresses.iter().any(|a| ctx.is_unhealthy(a.node_name.as_deref())) {
                continue;
            }
            let (unhealthy, healthy): (Vec<_>, Vec<_>) = addresses
                .drain(..)
                .partition(|a| ctx.is_unhealthy(a.node_name.as_deref()));
            *addresses = healthy;
            subset
                .not_ready_addresses
                .get_or_insert_with(Vec::new)
                .extend(unhealthy);
        }

        out
    }
}

fn with_local_endpoint(endpoints: &Endpoints, local: &LocalEndpoint) -> Endpoints {
    Endpoints {
        metadata: endpoints.metadata.clone(),
        subsets: Some(vec![EndpointSubset {
            addresses: Some(vec![EndpointAddress {
                ip: local.ip.clone(),
                ..Default::default()
            }]),
            not_ready_addresses: None,
            ports: Some(vec![EndpointPort {
                name: Some(LOCAL_ENDPOINT_PORT_NAME.to_string()),
                port: local.port,
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
        }]),
    }
}

fn retain_addresses(endpoints: &mut Endpoints, keep: impl Fn(&EndpointAddress) -> bool) {
    for subset in endpoints.subsets.iter_mut().flatten() {
        if let Some(addresses) = subset.addresses.as_mut() {
            addresses.retain(&keep);
        }
        if let Some(addresses) = subset.not_ready_addresses.as_mut() {
            addresses.retain(&keep);
        }
    }
}

macro_rules! endpoint_slice_view {
    ($version:ident) => {
        impl EndpointView for $version::EndpointSlice {
            fn object_key(&self) -> ObjectKey {
                ObjectKey::from_meta(&self.metadata)
            }

            fn service_key(&self) -> Option<ObjectKey> {
                annotations::owning_service(&self.metadata)
            }

            fn prune(&self, ctx: &PruneContext<'_>) -> Self {
                let mut out = self.clone();

                if let Some(keys) = ctx.topology_keys(self.service_key().as_ref()) {
                    out.endpoints
                        .retain(|ep| ctx.in_topology(ep.node_name.as_deref(), keys));
                }

                for ep in out.endpoints.iter_mut() {
                    if ctx.is_unhealthy(ep.node_name.as_deref()) {
                        ep.conditions
                            .get_or_insert_with(Default::default)
                            .ready = Some(false);
                    }
                }

                out
            }
        }
    };
}

endpoint_slice_view!(discovery_v1);
endpoint_slice_view!(discovery_v1beta1);

/// Keep only the addresses of `endpoints` that sit on one of `unit_nodes`.
///
/// Used for the node-unit scoped endpoints feed. Works on the raw object: no
/// topology filtering or local endpoint substitution applies.
pub fn filter_by_node_unit(endpoints: &Endpoints, unit_nodes: &BTreeSet<String>) -> Endpoints {
    let mut out = endpoints.clone();
    retain_addresses(&mut out, |addr| {
        addr.node_name
            .as_deref()
            .is_some_and(|node| unit_nodes.contains(node))
    });
    out
}

/// Whether any address of `endpoints` sits on `node`.
pub fn references_node(endpoints: &Endpoints, node: &str) -> bool {
    endpoints.subsets.iter().flatten().any(|subset| {
        subset
            .addresses
            .iter()
            .chain(subset.not_ready_addresses.iter())
            .flatten()
            .any(|addr| addr.node_name.as_deref() == Some(node))
    })
}
