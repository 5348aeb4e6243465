//! Well-known annotations and labels.
//!
//! The cache reads a handful of annotations and labels to decide how to
//! derive the node-local view of endpoint data:
//!
//! - `topologyKeys` on a Service: a JSON array of node label names
//! - `superedge.io/local-endpoint` / `superedge.io/local-port` on the
//!   `default/kubernetes` Endpoints: the edge-local API entrypoint
//! - `<unit>: nodeunits.superedge.io` node labels: node unit membership
//! - `kubernetes.io/service-name` on an EndpointSlice: its owning Service

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::warn;

use crate::{ObjectKey, Result, WrapperError};

/// Service annotation listing the topology keys, as a JSON array.
pub const TOPOLOGY_KEYS: &str = "topologyKeys";

/// Topology key that matches every node.
pub const ANY_TOPOLOGY_KEY: &str = "*";

/// Endpoints annotation carrying the edge-local API endpoint IP.
pub const LOCAL_ENDPOINT_IP: &str = "superedge.io/local-endpoint";

/// Endpoints annotation carrying the edge-local API endpoint port.
pub const LOCAL_ENDPOINT_PORT: &str = "superedge.io/local-port";

/// Node label value marking the label key as a node unit name.
pub const NODE_UNIT_LABEL_VALUE: &str = "nodeunits.superedge.io";

/// EndpointSlice label naming the owning Service.
pub const SERVICE_NAME_LABEL: &str = "kubernetes.io/service-name";

/// Namespace of the API server's own Endpoints object.
pub const MASTER_ENDPOINTS_NAMESPACE: &str = "default";

/// Name of the API server's own Endpoints object.
pub const MASTER_ENDPOINTS_NAME: &str = "kubernetes";

/// Parse a `topologyKeys` annotation value.
///
/// An empty value yields no keys. Blank entries are skipped.
///
/// # Example
///
/// ```rust
/// use wrapper_core::annotations::parse_topology_keys;
///
/// assert!(parse_topology_keys("").unwrap().is_empty());
/// assert_eq!(parse_topology_keys(r#"["zone"]"#).unwrap(), vec!["zone"]);
/// assert!(parse_topology_keys("zone").is_err());
/// ```
pub fn parse_topology_keys(value: &str) -> Result<Vec<String>> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(Vec::new());
    }

    let keys: Vec<String> =
        serde_json::from_str(value).map_err(|e| WrapperError::InvalidAnnotation {
            key: TOPOLOGY_KEYS.to_string(),
            reason: e.to_string(),
        })?;

    Ok(keys
        .into_iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect())
}

/// Topology keys declared on a Service.
///
/// A malformed annotation is logged and treated as "no topology filtering".
pub fn topology_keys(meta: &ObjectMeta) -> Vec<String> {
    let Some(value) = annotation(meta, TOPOLOGY_KEYS) else {
        return Vec::new();
    };

    match parse_topology_keys(value) {
        Ok(keys) => keys,
        Err(e) => {
            warn!(service = %ObjectKey::from_meta(meta), error = %e, "ignoring topology keys");
            Vec::new()
        }
    }
}

/// Edge-local API endpoint override.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalEndpoint {
    /// Override IP address.
    pub ip: String,
    /// Override port.
    pub port: i32,
}

/// Read the local endpoint override from an Endpoints object's annotations.
///
/// Both annotations must be present and the port must be a valid TCP port.
pub fn local_endpoint(meta: &ObjectMeta) -> Option<LocalEndpoint> {
    let ip = annotation(meta, LOCAL_ENDPOINT_IP)?.trim();
    let port = annotation(meta, LOCAL_ENDPOINT_PORT)?.trim();

    if ip.is_empty() {
        return None;
    }

    match port.parse::<i32>() {
        Ok(port) if (1..=65535).contains(&port) => Some(LocalEndpoint {
            ip: ip.to_string(),
            port,
        }),
        _ => {
            warn!(port = %port, "ignoring invalid local endpoint port");
            None
        }
    }
}

/// Whether the metadata names the API server's own Endpoints object.
pub fn is_master_endpoints(meta: &ObjectMeta) -> bool {
    meta.namespace.as_deref() == Some(MASTER_ENDPOINTS_NAMESPACE)
        && meta.name.as_deref() == Some(MASTER_ENDPOINTS_NAME)
}

/// Key of the Service owning an EndpointSlice, from its service-name label.
pub fn owning_service(meta: &ObjectMeta) -> Option<ObjectKey> {
    let name = meta.labels.as_ref()?.get(SERVICE_NAME_LABEL)?;
    Some(ObjectKey::new(
        meta.namespace.clone().unwrap_or_default(),
        name.clone(),
    ))
}

/// Node unit names a node belongs to, from its labels.
pub fn node_units(labels: Option<&BTreeMap<String, String>>) -> impl Iterator<Item = &str> {
    labels
        .into_iter()
        .flatten()
        .filter(|(_, value)| value.as_str() == NODE_UNIT_LABEL_VALUE)
        .map(|(key, _)| key.as_str())
}

fn annotation<'a>(meta: &'a ObjectMeta, key: &str) -> Option<&'a str> {
    meta.annotations.as_ref()?.get(key).map(String::as_str)
}
