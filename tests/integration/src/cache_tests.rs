//! Cache integration tests.
//!
//! Drive the cache through the informer handlers the way the binary does
//! and check the node-local views and the events watchers observe.

use std::collections::HashMap;
use std::sync::Arc;

use grid_wrapper::prelude::*;
use k8s_openapi::api::core::v1::{EndpointAddress, EndpointSubset, Endpoints, Node, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use wrapper_core::annotations::{LOCAL_ENDPOINT_IP, LOCAL_ENDPOINT_PORT, TOPOLOGY_KEYS};

fn meta(namespace: Option<&str>, name: &str) -> ObjectMeta {
    ObjectMeta {
        namespace: namespace.map(str::to_string),
        name: Some(name.to_string()),
        ..Default::default()
    }
}

fn node(name: &str, zone: &str) -> Node {
    let mut metadata = meta(None, name);
    metadata.labels = Some([("zone".to_string(), zone.to_string())].into_iter().collect());
    Node {
        metadata,
        ..Default::default()
    }
}

fn service(name: &str, topology: Option<&str>) -> Service {
    let mut metadata = meta(Some("default"), name);
    metadata.annotations = topology.map(|keys| {
        [(TOPOLOGY_KEYS.to_string(), keys.to_string())]
            .into_iter()
            .collect()
    });
    Service {
        metadata,
        ..Default::default()
    }
}

fn endpoints(name: &str, addrs: &[(&str, &str)]) -> Endpoints {
    Endpoints {
        metadata: meta(Some("default"), name),
        subsets: Some(vec![EndpointSubset {
            addresses: Some(
                addrs
                    .iter()
                    .map(|(ip, node)| EndpointAddress {
                        ip: ip.to_string(),
                        node_name: Some(node.to_string()),
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        }]),
    }
}

fn ready(ep: &Endpoints) -> Vec<String> {
    ep.subsets
        .iter()
        .flatten()
        .flat_map(|s| s.addresses.iter().flatten())
        .map(|a| a.ip.clone())
        .collect()
}

fn not_ready(ep: &Endpoints) -> Vec<String> {
    ep.subsets
        .iter()
        .flatten()
        .flat_map(|s| s.not_ready_addresses.iter().flatten())
        .map(|a| a.ip.clone())
        .collect()
}

fn drain<T>(sub: &mut Subscription<T>) -> Vec<Event<T>> {
    std::iter::from_fn(|| sub.try_recv().ok()).collect()
}

/// Host edge-1 in zone a, edge-2 in zone b.
fn edge_cache() -> Arc<ResourceCache> {
    let cache = Arc::new(ResourceCache::new(CacheConfig::new("edge-1")));
    let nodes = cache.node_event_handler();
    nodes.on_add(node("edge-1", "a"));
    nodes.on_add(node("edge-2", "b"));
    cache
}

#[test]
fn topology_follows_service_and_node_changes() {
    let cache = edge_cache();
    cache
        .service_event_handler()
        .on_add(service("web", Some(r#"["zone"]"#)));
    cache
        .endpoints_event_handler()
        .on_add(endpoints("web", &[("10.0.0.1", "edge-1"), ("10.0.0.2", "edge-2")]));

    assert_eq!(ready(&cache.get_endpoints()[0]), vec!["10.0.0.1"]);

    let mut watch = cache.watch_endpoints(false);

    // edge-2 moves into zone a: its address becomes visible.
    cache.node_event_handler().on_update(node("edge-2", "a"));
    let events = drain(&mut watch);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EventType::Modified);
    assert_eq!(ready(&events[0].object), vec!["10.0.0.1", "10.0.0.2"]);

    // Dropping the annotation keeps everything; nothing to emit.
    cache.service_event_handler().on_update(service("web", None));
    assert!(drain(&mut watch).is_empty());

    // Wildcard keeps any known node, so the unknown node's address goes.
    cache
        .service_event_handler()
        .on_update(service("web", Some(r#"["*"]"#)));
    cache
        .endpoints_event_handler()
        .on_update(endpoints("web", &[("10.0.0.1", "edge-1"), ("10.0.0.3", "edge-9")]));
    assert_eq!(ready(&cache.get_endpoints()[0]), vec!["10.0.0.1"]);
}

#[test]
fn unhealthy_nodes_move_to_not_ready() {
    let cache = edge_cache();
    cache.service_event_handler().on_add(service("web", None));
    cache
        .endpoints_event_handler()
        .on_add(endpoints("web", &[("10.0.0.1", "edge-1"), ("10.0.0.2", "edge-2")]));
    let mut watch = cache.watch_endpoints(false);

    cache.set_node_health(HashMap::from([
        ("edge-1".to_string(), true),
        ("edge-2".to_string(), false),
    ]));
    let ep = &cache.get_endpoints()[0];
    assert_eq!(ready(ep), vec!["10.0.0.1"]);
    assert_eq!(not_ready(ep), vec!["10.0.0.2"]);
    assert_eq!(drain(&mut watch).len(), 1);

    // Same report again changes nothing.
    cache.set_node_health(cache.node_health());
    assert!(drain(&mut watch).is_empty());

    cache.set_node_health(HashMap::new());
    assert!(not_ready(&cache.get_endpoints()[0]).is_empty());
    assert_eq!(drain(&mut watch).len(), 1);
}

#[test]
fn master_endpoints_use_local_override() {
    let cache = edge_cache();
    let mut master = endpoints("kubernetes", &[("192.168.0.10", "edge-2")]);
    master.metadata.annotations = Some(
        [
            (LOCAL_ENDPOINT_IP.to_string(), "169.254.0.1".to_string()),
            (LOCAL_ENDPOINT_PORT.to_string(), "51003".to_string()),
        ]
        .into_iter()
        .collect(),
    );
    cache.endpoints_event_handler().on_add(master);

    let view = &cache.get_endpoints()[0];
    assert_eq!(ready(view), vec!["169.254.0.1"]);
    let port = view.subsets.as_ref().unwrap()[0].ports.as_ref().unwrap()[0].port;
    assert_eq!(port, 51003);

    // The raw object is untouched.
    assert_eq!(ready(&cache.get_raw_endpoints()[0]), vec!["192.168.0.10"]);
}

#[test]
fn seeded_watch_replays_then_follows() {
    let cache = edge_cache();
    cache.service_event_handler().on_add(service("web", None));
    cache.service_event_handler().on_add(service("api", None));

    let mut watch = cache.watch_services(true);
    let seeded = drain(&mut watch);
    assert_eq!(seeded.len(), 2);
    assert!(seeded.iter().all(|e| e.kind == EventType::Added));

    cache.service_event_handler().on_delete(service("web", None));
    let events = drain(&mut watch);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EventType::Deleted);
    assert_eq!(cache.get_services().len(), 1);
}

#[test]
fn delete_then_re_add_endpoints() {
    let cache = edge_cache();
    let handler = cache.endpoints_event_handler();
    let mut watch = cache.watch_endpoints(false);

    handler.on_add(endpoints("web", &[("10.0.0.1", "edge-1")]));
    handler.on_delete(endpoints("web", &[("10.0.0.1", "edge-1")]));
    handler.on_add(endpoints("web", &[("10.0.0.5", "edge-1")]));

    let kinds: Vec<_> = drain(&mut watch).into_iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![EventType::Added, EventType::Deleted, EventType::Added]
    );
    assert_eq!(ready(&cache.get_endpoints()[0]), vec!["10.0.0.5"]);
}

#[test]
fn shutdown_closes_subscriptions() {
    let cache = edge_cache();
    let mut watch = cache.watch_nodes(false);

    cache.shutdown();

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    assert!(rt.block_on(watch.recv()).is_none());
}

#[test]
fn nodes_arriving_after_endpoints() {
    let cache = Arc::new(ResourceCache::new(CacheConfig::new("n1")));
    cache
        .service_event_handler()
        .on_add(service("svc", Some(r#"["zone"]"#)));
    cache
        .endpoints_event_handler()
        .on_add(endpoints("svc", &[("10.0.0.1", "n1"), ("10.0.0.2", "n2")]));

    // Neither node is known yet, so nothing survives the filter.
    assert!(ready(&cache.get_endpoints()[0]).is_empty());

    cache.node_event_handler().on_add(node("n1", "a"));
    cache.node_event_handler().on_add(node("n2", "b"));
    assert_eq!(ready(&cache.get_endpoints()[0]), vec!["10.0.0.1"]);

    // n2's address was already filtered out: removing it changes nothing.
    let mut watch = cache.watch_endpoints(false);
    cache.node_event_handler().on_delete(node("n2", "b"));
    assert!(drain(&mut watch).is_empty());
    assert_eq!(ready(&cache.get_endpoints()[0]), vec!["10.0.0.1"]);
}
