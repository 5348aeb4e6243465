//! Load tests for the resource cache.
//!
//! These tests check behavior under volume:
//! - thousands of Endpoints across many nodes
//! - many concurrent watchers
//! - slow watchers overflowing their queues
//!
//! Run with: `cargo test --package integration-tests --test load_tests -- --nocapture`

use std::sync::Arc;
use std::time::Instant;

use k8s_openapi::api::core::v1::{EndpointAddress, EndpointSubset, Endpoints, Node, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tokio::sync::Barrier;
use wrapper_cache::{CacheConfig, ResourceCache, ResourceEventHandler};
use wrapper_core::annotations::TOPOLOGY_KEYS;

const NODES: usize = 100;

fn node(i: usize) -> Node {
    Node {
        metadata: ObjectMeta {
            name: Some(format!("edge-{i}")),
            labels: Some(
                [("zone".to_string(), format!("z{}", i % 4))]
                    .into_iter()
                    .collect(),
            ),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn service(i: usize) -> Service {
    Service {
        metadata: ObjectMeta {
            namespace: Some("load".to_string()),
            name: Some(format!("svc-{i}")),
            annotations: Some(
                [(TOPOLOGY_KEYS.to_string(), r#"["zone"]"#.to_string())]
                    .into_iter()
                    .collect(),
            ),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// One address per node, so a quarter of them share the host's zone.
fn endpoints(i: usize, version: usize) -> Endpoints {
    Endpoints {
        metadata: ObjectMeta {
            namespace: Some("load".to_string()),
            name: Some(format!("svc-{i}")),
            resource_version: Some(version.to_string()),
            ..Default::default()
        },
        subsets: Some(vec![EndpointSubset {
            addresses: Some(
                (0..NODES)
                    .map(|n| EndpointAddress {
                        ip: format!("10.{}.{}.{}", i / 256, i % 256, n),
                        node_name: Some(format!("edge-{n}")),
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        }]),
    }
}

fn loaded_cache(services: usize, queue: usize) -> Arc<ResourceCache> {
    let cache = Arc::new(ResourceCache::new(
        CacheConfig::new("edge-0").with_notify_channel_size(queue),
    ));
    for i in 0..NODES {
        cache.node_event_handler().on_add(node(i));
    }
    for i in 0..services {
        cache.service_event_handler().on_add(service(i));
        cache.endpoints_event_handler().on_add(endpoints(i, 1));
    }
    cache
}

#[test]
fn test_2000_endpoints() {
    let start = Instant::now();
    let cache = loaded_cache(2000, 16);
    println!("loaded 2000 endpoints in {:?}", start.elapsed());

    let views = cache.get_endpoints();
    assert_eq!(views.len(), 2000);
    for view in &views {
        let count = view.subsets.as_ref().unwrap()[0]
            .addresses
            .as_ref()
            .map_or(0, Vec::len);
        assert_eq!(count, NODES / 4);
    }
}

#[test]
fn test_node_relabel_recomputes_everything() {
    let cache = loaded_cache(500, 1024);
    let mut watch = cache.watch_endpoints(false);

    // edge-1 joins the host's zone: every view gains one address.
    let mut moved = node(1);
    moved
        .metadata
        .labels
        .as_mut()
        .unwrap()
        .insert("zone".to_string(), "z0".to_string());

    let start = Instant::now();
    cache.node_event_handler().on_update(moved);
    println!("relabel recompute over 500 endpoints took {:?}", start.elapsed());

    let mut modified = 0;
    while watch.try_recv().is_ok() {
        modified += 1;
    }
    assert_eq!(modified, 500);
}

#[test]
fn test_slow_watcher_drops_only_its_own_events() {
    let cache = loaded_cache(0, 8);
    let mut slow = cache.watch_endpoints(false);
    let mut fast = cache.watch_endpoints(false);

    let mut seen_fast = 0;
    for i in 0..100 {
        cache.service_event_handler().on_add(service(i));
        cache.endpoints_event_handler().on_add(endpoints(i, 1));
        while fast.try_recv().is_ok() {
            seen_fast += 1;
        }
    }

    let mut seen_slow = 0;
    while slow.try_recv().is_ok() {
        seen_slow += 1;
    }

    assert_eq!(seen_fast, 100);
    assert_eq!(seen_slow, 8);
    assert_eq!(cache.get_endpoints().len(), 100);

    let dropped: u64 = cache.dropped_counts().iter().map(|(_, n)| n).sum();
    assert_eq!(dropped, 92);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writers_and_watchers() {
    let cache = loaded_cache(0, 4096);
    let watchers = 50;
    let writers = 8;
    let per_writer = 50;

    let subs: Vec<_> = (0..watchers).map(|_| cache.watch_endpoints(false)).collect();

    for i in 0..writers * per_writer {
        cache.service_event_handler().on_add(service(i));
    }

    let barrier = Arc::new(Barrier::new(writers));
    let mut handles = Vec::new();
    for w in 0..writers {
        let cache = Arc::clone(&cache);
        let barrier = Arc::clone(&barrier);
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            for j in 0..per_writer {
                let i = w * per_writer + j;
                cache.endpoints_event_handler().on_add(endpoints(i, 1));
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(cache.get_endpoints().len(), writers * per_writer);
    for mut sub in subs {
        let mut count = 0;
        while sub.try_recv().is_ok() {
            count += 1;
        }
        assert_eq!(count, writers * per_writer);
    }
}
