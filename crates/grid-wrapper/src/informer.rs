//! List/watch informers feeding the cache from the API server.
//!
//! Each informer lists its collection, reconciles the result against the
//! objects it already knows (adds, updates and deletes), then watches from
//! the list's resourceVersion. A closed watch is resumed from the last seen
//! resourceVersion; an expired one (410) or any failure triggers a re-list
//! after a backoff. Retrying the upstream is the informer's job alone.

use std::collections::HashMap;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, WatchEvent};
use k8s_openapi::{List, ListableResource, Metadata};
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};
use wrapper_cache::ResourceEventHandler;
use wrapper_core::{ObjectKey, ResourceKind, Result, WrapperError};
use wrapper_server::{ShutdownSignal, UpstreamClient};

/// Server-side timeout requested for each watch.
const WATCH_TIMEOUT_SECS: u64 = 300;
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// An object type an informer can follow.
pub trait Watched:
    ListableResource + Metadata<Ty = ObjectMeta> + DeserializeOwned + Clone + Send + Sync + 'static
{
}

impl<K> Watched for K where
    K: ListableResource + Metadata<Ty = ObjectMeta> + DeserializeOwned + Clone + Send + Sync + 'static
{
}

/// Reports whether an informer has completed its first list.
#[derive(Debug, Clone)]
pub struct SyncHandle {
    kind: ResourceKind,
    rx: watch::Receiver<bool>,
}

impl SyncHandle {
    /// The informer's resource kind.
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Whether the first list has been delivered.
    pub fn is_synced(&self) -> bool {
        *self.rx.borrow()
    }

    async fn wait(&mut self) {
        // An informer that exits before syncing leaves this pending; the
        // caller's timeout reports it.
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Wait until every informer has synced.
///
/// # Errors
///
/// Returns [`WrapperError::SyncTimeout`] naming the kinds still pending
/// after `timeout`.
pub async fn wait_for_sync(handles: &[SyncHandle], timeout: Duration) -> Result<()> {
    let mut waiting: Vec<SyncHandle> = handles.to_vec();
    let all = futures::future::join_all(waiting.iter_mut().map(SyncHandle::wait));
    if tokio::time::timeout(timeout, all).await.is_ok() {
        info!(kinds = handles.len(), "caches synced");
        return Ok(());
    }

    let pending: Vec<String> = handles
        .iter()
        .filter(|h| !h.is_synced())
        .map(|h| h.kind.to_string())
        .collect();
    Err(WrapperError::SyncTimeout { pending })
}

/// Objects an informer has delivered, for reconciling re-lists.
pub(crate) struct KnownObjects<K> {
    objects: HashMap<ObjectKey, K>,
}

impl<K: Watched> KnownObjects<K> {
    pub(crate) fn new() -> Self {
        Self {
            objects: HashMap::new(),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.objects.len()
    }

    /// Reconcile a full list against what was delivered before.
    pub(crate) fn replace<H>(&mut self, items: Vec<K>, handler: &H)
    where
        H: ResourceEventHandler<K> + ?Sized,
    {
        let mut previous = std::mem::take(&mut self.objects);
        for item in items {
            let key = ObjectKey::from_meta(item.metadata());
            match previous.remove(&key) {
                Some(old) if same_version(&old, &item) => {}
                Some(_) => handler.on_update(item.clone()),
                None => handler.on_add(item.clone()),
            }
            self.objects.insert(key, item);
        }
        for (_, gone) in previous {
            handler.on_delete(gone);
        }
    }

    /// Apply one watch event. Returns the event's resourceVersion, if any.
    pub(crate) fn apply<H>(&mut self, event: WatchEvent<K>, handler: &H) -> Result<Option<String>>
    where
        H: ResourceEventHandler<K> + ?Sized,
    {
        match event {
            WatchEvent::Added(item) | WatchEvent::Modified(item) => {
                let key = ObjectKey::from_meta(item.metadata());
                let version = item.metadata().resource_version.clone();
                match self.objects.get(&key) {
                    Some(old) if same_version(old, &item) => {}
                    Some(_) => handler.on_update(item.clone()),
                    None => handler.on_add(item.clone()),
                }
                self.objects.insert(key, item);
                Ok(version)
            }
            WatchEvent::Deleted(item) => {
                let key = ObjectKey::from_meta(item.metadata());
                let version = item.metadata().resource_version.clone();
                let last = self.objects.remove(&key).unwrap_or(item);
                handler.on_delete(last);
                Ok(version)
            }
            WatchEvent::Bookmark {
                resource_version, ..
            } => Ok(Some(resource_version)),
            WatchEvent::ErrorStatus(status) => Err(WrapperError::UpstreamStatus {
                status: status
                    .code
                    .and_then(|c| u16::try_from(c).ok())
                    .unwrap_or(500),
                path: status.message.unwrap_or_default(),
            }),
            WatchEvent::ErrorOther(_) => Err(WrapperError::Decoding {
                what: "watch event".to_string(),
                message: "unrecognized error object".to_string(),
            }),
        }
    }
}

fn same_version<K: Watched>(a: &K, b: &K) -> bool {
    match (
        a.metadata().resource_version.as_deref(),
        b.metadata().resource_version.as_deref(),
    ) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

enum WatchEnd {
    Closed,
    Shutdown,
}

/// Follows one collection and feeds a handler.
pub struct Informer<K, H> {
    kind: ResourceKind,
    client: UpstreamClient,
    handler: H,
    known: KnownObjects<K>,
    synced: watch::Sender<bool>,
}

impl<K, H> Informer<K, H>
where
    K: Watched,
    H: ResourceEventHandler<K> + 'static,
{
    /// Create an informer for `kind`, delivering to `handler`.
    pub fn new(kind: ResourceKind, client: UpstreamClient, handler: H) -> (Self, SyncHandle) {
        let (synced, rx) = watch::channel(false);
        let informer = Self {
            kind,
            client,
            handler,
            known: KnownObjects::new(),
            synced,
        };
        (informer, SyncHandle { kind, rx })
    }

    /// Run until `shutdown` fires.
    pub async fn run(mut self, mut shutdown: ShutdownSignal) {
        let mut backoff = INITIAL_BACKOFF;
        let mut version: Option<String> = None;

        loop {
            let result = match version.take() {
                Some(from) => self.watch(from, &mut version, &mut shutdown).await,
                None => match self.list().await {
                    Ok(listed) => {
                        backoff = INITIAL_BACKOFF;
                        self.watch(listed, &mut version, &mut shutdown).await
                    }
                    Err(e) => Err(e),
                },
            };

            match result {
                Ok(WatchEnd::Shutdown) => {
                    debug!(kind = %self.kind, "informer stopped");
                    return;
                }
                Ok(WatchEnd::Closed) => {
                    trace!(kind = %self.kind, "watch closed, resuming");
                }
                Err(e) => {
                    version = None;
                    if e.is_gone() {
                        debug!(kind = %self.kind, "resource version expired, re-listing");
                    } else {
                        warn!(kind = %self.kind, error = %e, backoff = ?backoff, "informer failed, re-listing");
                    }
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = shutdown.changed() => return,
                    }
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    }

    async fn list(&mut self) -> Result<String> {
        let list: List<K> = self.client.get_json(self.kind.collection_path()).await?;
        let version = list.metadata.resource_version.clone().unwrap_or_default();
        let count = list.items.len();

        self.known.replace(list.items, &self.handler);
        self.synced.send_replace(true);
        debug!(kind = %self.kind, items = count, version = %version, "listed");
        Ok(version)
    }

    /// Watch from `from`, recording the newest seen version in `latest`.
    async fn watch(
        &mut self,
        from: String,
        latest: &mut Option<String>,
        shutdown: &mut ShutdownSignal,
    ) -> Result<WatchEnd> {
        let path = format!(
            "{}?watch=1&allowWatchBookmarks=true&timeoutSeconds={}&resourceVersion={}",
            self.kind.collection_path(),
            WATCH_TIMEOUT_SECS,
            from
        );
        *latest = Some(from);

        let mut body = tokio::select! {
            opened = self.client.stream(&path) => opened?,
            _ = shutdown.changed() => return Ok(WatchEnd::Shutdown),
        };

        let mut buf: Vec<u8> = Vec::new();
        loop {
            let chunk = tokio::select! {
                chunk = body.next() => chunk,
                _ = shutdown.changed() => return Ok(WatchEnd::Shutdown),
            };
            let Some(chunk) = chunk else {
                return Ok(WatchEnd::Closed);
            };
            buf.extend_from_slice(&chunk?);

            while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buf.drain(..=pos).collect();
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                let event: WatchEvent<K> =
                    serde_json::from_slice(&line).map_err(|e| WrapperError::Decoding {
                        what: format!("{} watch event", self.kind),
                        message: e.to_string(),
                    })?;
                if let Some(version) = self.known.apply(event, &self.handler)? {
                    *latest = Some(version);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use k8s_openapi::api::core::v1::Service;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Status;

    #[derive(Default, Clone)]
    struct Recorder {
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl Recorder {
        fn take(&self) -> Vec<String> {
            std::mem::take(&mut *self.calls.lock().unwrap())
        }
    }

    impl ResourceEventHandler<Service> for Recorder {
        fn on_add(&self, object: Service) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("add {}", object.metadata.name.unwrap_or_default()));
        }

        fn on_update(&self, object: Service) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("update {}", object.metadata.name.unwrap_or_default()));
        }

        fn on_delete(&self, object: Service) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("delete {}", object.metadata.name.unwrap_or_default()));
        }
    }

    fn svc(name: &str, version: &str) -> Service {
        let mut svc = Service::default();
        svc.metadata.namespace = Some("default".to_string());
        svc.metadata.name = Some(name.to_string());
        svc.metadata.resource_version = Some(version.to_string());
        svc
    }

    #[test]
    fn test_relist_reconciles() {
        let recorder = Recorder::default();
        let mut known = KnownObjects::new();

        known.replace(vec![svc("a", "1"), svc("b", "1")], &recorder);
        assert_eq!(recorder.take(), vec!["add a", "add b"]);

        known.replace(vec![svc("a", "1"), svc("b", "2"), svc("c", "1")], &recorder);
        assert_eq!(recorder.take(), vec!["update b", "add c"]);

        known.replace(vec![svc("c", "1")], &recorder);
        let mut calls = recorder.take();
        calls.sort();
        assert_eq!(calls, vec!["delete a", "delete b"]);
        assert_eq!(known.len(), 1);
    }

    #[test]
    fn test_watch_events() {
        let recorder = Recorder::default();
        let mut known = KnownObjects::new();
        known.replace(vec![svc("a", "1")], &recorder);
        recorder.take();

        let version = known
            .apply(WatchEvent::Modified(svc("a", "2")), &recorder)
            .unwrap();
        assert_eq!(version.as_deref(), Some("2"));
        // Same version again is not re-delivered.
        known.apply(WatchEvent::Added(svc("a", "2")), &recorder).unwrap();
        known.apply(WatchEvent::Modified(svc("b", "3")), &recorder).unwrap();
        known.apply(WatchEvent::Deleted(svc("a", "4")), &recorder).unwrap();
        assert_eq!(recorder.take(), vec!["update a", "add b", "delete a"]);
    }

    #[test]
    fn test_expired_watch() {
        let recorder = Recorder::default();
        let mut known: KnownObjects<Service> = KnownObjects::new();
        let err = known
            .apply(
                WatchEvent::ErrorStatus(Status {
                    code: Some(410),
                    ..Default::default()
                }),
                &recorder,
            )
            .unwrap_err();
        assert!(err.is_gone());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_timeout_names_pending() {
        let (_tx, rx) = watch::channel(false);
        let (done_tx, done_rx) = watch::channel(true);
        let handles = vec![
            SyncHandle {
                kind: ResourceKind::Services,
                rx,
            },
            SyncHandle {
                kind: ResourceKind::Nodes,
                rx: done_rx,
            },
        ];

        let err = wait_for_sync(&handles, Duration::from_secs(1))
            .await
            .unwrap_err();
        match err {
            WrapperError::SyncTimeout { pending } => assert_eq!(pending, vec!["services"]),
            other => panic!("unexpected error {other}"),
        }
        drop(done_tx);
    }
}
