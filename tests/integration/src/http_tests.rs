//! End-to-end tests: informers fed by a fake API server, the wrapper's
//! router in front of the cache, and the passthrough proxy.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::routing::get;
use axum::Router;
use bytes::BytesMut;
use futures::StreamExt;
use grid_wrapper::informer::{wait_for_sync, Informer};
use k8s_openapi::api::core::v1::{Node, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde_json::Value;
use tokio::net::TcpListener;
use tower::ServiceExt;
use wrapper_cache::{CacheConfig, ResourceCache, ResourceEventHandler};
use wrapper_core::{EventType, ResourceKind};
use wrapper_server::codec::{encode_list, encode_watch_event};
use wrapper_server::{MediaType, ShutdownController, UpstreamClient, UpstreamConfig, WrapperServer};

fn service(name: &str) -> Service {
    Service {
        metadata: ObjectMeta {
            namespace: Some("default".to_string()),
            name: Some(name.to_string()),
            resource_version: Some("1".to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// What the fake API server saw.
#[derive(Clone, Default)]
struct Seen {
    watches: Arc<Mutex<Vec<String>>>,
    authorization: Arc<Mutex<Vec<String>>>,
}

#[derive(serde::Deserialize)]
struct WatchQuery {
    watch: Option<String>,
    #[serde(rename = "resourceVersion")]
    resource_version: Option<String>,
}

async fn services(
    State(seen): State<Seen>,
    Query(query): Query<WatchQuery>,
) -> axum::response::Response {
    if query.watch.is_none() {
        let body = encode_list(MediaType::Json, &[Arc::new(service("web"))]).unwrap();
        return axum::response::Response::builder()
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap();
    }

    seen.watches
        .lock()
        .unwrap()
        .push(query.resource_version.unwrap_or_default());

    let mut frame = BytesMut::new();
    encode_watch_event(MediaType::Json, EventType::Added, &service("api"), &mut frame).unwrap();
    let first = futures::stream::iter([Ok::<Bytes, Infallible>(frame.freeze())]);
    axum::response::Response::builder()
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from_stream(first.chain(futures::stream::pending())))
        .unwrap()
}

async fn pods(State(seen): State<Seen>, headers: HeaderMap) -> &'static str {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    seen.authorization.lock().unwrap().push(auth);
    r#"{"kind":"PodList","apiVersion":"v1","items":[]}"#
}

async fn fake_api_server() -> (SocketAddr, Seen) {
    let seen = Seen::default();
    let app = Router::new()
        .route("/api/v1/services", get(services))
        .route("/api/v1/namespaces/default/pods", get(pods))
        .with_state(seen.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, seen)
}

fn client(addr: SocketAddr) -> UpstreamClient {
    let mut config = UpstreamConfig::new(format!("http://{addr}"));
    config.token = Some("wrapper-token".to_string());
    config.qps = 0.0;
    UpstreamClient::new(config).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn informer_lists_then_watches() {
    let (addr, seen) = fake_api_server().await;
    let cache = Arc::new(ResourceCache::new(CacheConfig::new("edge-1")));
    let tasks = ShutdownController::new();

    let (informer, sync) =
        Informer::<Service, _>::new(ResourceKind::Services, client(addr), cache.service_event_handler());
    let handle = tokio::spawn(informer.run(tasks.shutdown_signal()));

    wait_for_sync(&[sync], Duration::from_secs(5)).await.unwrap();

    // The watch delivers the second service shortly after the list.
    for _ in 0..100 {
        if cache.get_services().len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(cache.get_services().len(), 2);
    assert_eq!(seen.watches.lock().unwrap().len(), 1);

    tasks.shutdown(Duration::from_secs(1)).await;
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn sync_times_out_when_upstream_is_down() {
    // Nothing listens on this port once the listener is dropped.
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let cache = Arc::new(ResourceCache::new(CacheConfig::new("edge-1")));
    let tasks = ShutdownController::new();

    let (informer, sync) =
        Informer::<Node, _>::new(ResourceKind::Nodes, client(addr), cache.node_event_handler());
    tokio::spawn(informer.run(tasks.shutdown_signal()));

    let err = wait_for_sync(&[sync], Duration::from_millis(300))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("nodes"));

    tasks.shutdown(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn wrapper_serves_cache_and_proxies_the_rest() {
    let (addr, seen) = fake_api_server().await;
    let cache = Arc::new(ResourceCache::new(CacheConfig::new("edge-1")));
    cache.service_event_handler().on_add(service("web"));

    let server = WrapperServer::builder()
        .cache(Arc::clone(&cache))
        .upstream(client(addr))
        .build()
        .unwrap();
    let app = server.app();

    // Served from the cache.
    let response = app
        .clone()
        .oneshot(
            Request::get("/api/v1/services")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let list = body_json(response).await;
    assert_eq!(list["kind"], "ServiceList");
    assert_eq!(list["items"][0]["metadata"]["name"], "web");

    // Forwarded upstream with the wrapper's own credentials.
    let response = app
        .oneshot(
            Request::get("/api/v1/namespaces/default/pods")
                .header(header::AUTHORIZATION, "Bearer client-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["kind"], "PodList");
    assert_eq!(
        seen.authorization.lock().unwrap().as_slice(),
        ["Bearer wrapper-token".to_string()]
    );
}

#[tokio::test]
async fn watch_over_tcp_ends_on_shutdown() {
    let cache = Arc::new(ResourceCache::new(CacheConfig::new("edge-1")));
    cache.service_event_handler().on_add(service("web"));

    let server = WrapperServer::builder()
        .cache(Arc::clone(&cache))
        .grace_period(Duration::from_secs(1))
        .build()
        .unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
    let serving = tokio::spawn(server.serve_listener(listener, async {
        let _ = stopped.await;
    }));

    let http = reqwest::Client::new();
    let response = http
        .get(format!("http://{addr}/api/v1/services?watch=true&timeoutSeconds=30"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let mut body = response.bytes_stream();

    cache.service_event_handler().on_add(service("api"));
    let chunk = tokio::time::timeout(Duration::from_secs(2), body.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let frame: Value = serde_json::from_slice(chunk.split(|b| *b == b'\n').next().unwrap()).unwrap();
    assert_eq!(frame["type"], "ADDED");
    assert_eq!(frame["object"]["metadata"]["name"], "api");

    stop.send(()).unwrap();
    // The stream finishes once the server drains.
    let rest = tokio::time::timeout(Duration::from_secs(3), async {
        while let Some(chunk) = body.next().await {
            if chunk.is_err() {
                break;
            }
        }
    })
    .await;
    assert!(rest.is_ok());
    tokio::time::timeout(Duration::from_secs(3), serving)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}
