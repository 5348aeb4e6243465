//! The resource cache.
//!
//! [`ResourceCache`] holds the latest Nodes and Services, plus every
//! Endpoints and EndpointSlice object both as received and as derived for
//! this node. Informer notifications mutate it through the handlers in
//! [`crate::handler`]; the HTTP layer reads snapshots and subscribes to
//! per-kind event feeds.
//!
//! ## Consistency
//!
//! All state sits behind one `RwLock`. A writer computes the events of its
//! mutation while holding the write lock, then takes the emit lock before
//! releasing it and broadcasts while holding only the emit lock. A seeded
//! watch snapshots under the read lock and registers while holding the emit
//! lock. Lock order is always state, then emit. As a result:
//!
//! - events reach every feed in mutation order
//! - a seeded watch sees each mutation exactly once, either in its initial
//!   snapshot or as a live event
//!
//! Broadcasting never blocks (see [`Broadcaster::action_or_drop`]), so a
//! stalled watcher cannot hold up mutations.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use k8s_openapi::api::core::v1::{Endpoints, Node, Service};
use k8s_openapi::api::discovery::{v1 as discovery_v1, v1beta1 as discovery_v1beta1};
use metrics::counter;
use parking_lot::{Mutex, RwLock, RwLockWriteGuard};
use tracing::{debug, info, trace, warn};
use wrapper_core::annotations;
use wrapper_core::{EventType, ObjectKey, ResourceKind};

use crate::broadcast::{Broadcaster, Event, Subscription};
use crate::config::CacheConfig;
use crate::prune::{EndpointView, PruneContext};
use crate::stats::CacheStats;

/// `discovery.k8s.io/v1` EndpointSlice.
pub type EndpointSliceV1 = discovery_v1::EndpointSlice;

/// `discovery.k8s.io/v1beta1` EndpointSlice.
pub type EndpointSliceV1Beta1 = discovery_v1beta1::EndpointSlice;

/// A cached Service with its parsed topology keys.
#[derive(Clone, Debug, PartialEq)]
pub struct CachedService {
    /// The Service as received.
    pub service: Arc<Service>,
    /// Parsed `topologyKeys` annotation. Empty means no filtering.
    pub topology_keys: Vec<String>,
}

/// Kind of informer notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Mutation {
    Add,
    Update,
    Delete,
}

impl Mutation {
    fn as_str(&self) -> &'static str {
        match self {
            Mutation::Add => "add",
            Mutation::Update => "update",
            Mutation::Delete => "delete",
        }
    }
}

/// Object counts, for diagnostics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheSummary {
    /// Node this cache derives views for.
    pub host_name: String,
    /// Cached Nodes.
    pub nodes: usize,
    /// Cached Services.
    pub services: usize,
    /// Cached Endpoints.
    pub endpoints: usize,
    /// Cached v1 EndpointSlices.
    pub endpoint_slices_v1: usize,
    /// Cached v1beta1 EndpointSlices.
    pub endpoint_slices_v1beta1: usize,
    /// Known node units and their member count.
    pub node_units: BTreeMap<String, usize>,
    /// Nodes currently reported unhealthy.
    pub unhealthy_nodes: Vec<String>,
}

struct Derived<T> {
    raw: Arc<T>,
    view: Arc<T>,
}

/// Everything derivation depends on.
#[derive(Default)]
struct Topology {
    nodes: BTreeMap<String, Arc<Node>>,
    node_units: BTreeMap<String, BTreeSet<String>>,
    services: BTreeMap<ObjectKey, CachedService>,
    node_health: HashMap<String, bool>,
}

impl Topology {
    fn prune_context<'a>(&'a self, host_name: &'a str) -> PruneContext<'a> {
        PruneContext::new(host_name, &self.nodes, &self.services, &self.node_health)
    }

    fn reindex_units(&mut self, node_name: &str) {
        self.node_units.retain(|_, members| {
            members.remove(node_name);
            !members.is_empty()
        });

        let Some(node) = self.nodes.get(node_name) else {
            return;
        };
        for unit in annotations::node_units(node.metadata.labels.as_ref()) {
            self.node_units
                .entry(unit.to_string())
                .or_default()
                .insert(node_name.to_string());
        }
    }
}

#[derive(Default)]
struct Views {
    endpoints: BTreeMap<ObjectKey, Derived<Endpoints>>,
    slices_v1: BTreeMap<ObjectKey, Derived<EndpointSliceV1>>,
    slices_v1beta1: BTreeMap<ObjectKey, Derived<EndpointSliceV1Beta1>>,
}

#[derive(Default)]
struct CacheState {
    topology: Topology,
    views: Views,
}

/// Events produced by one mutation, broadcast after the state lock is released.
#[derive(Default)]
struct Pending {
    nodes: Vec<Event<Arc<Node>>>,
    services: Vec<Event<Arc<Service>>>,
    endpoints: Vec<Event<Arc<Endpoints>>>,
    raw_endpoints: Vec<Event<Arc<Endpoints>>>,
    slices_v1: Vec<Event<Arc<EndpointSliceV1>>>,
    slices_v1beta1: Vec<Event<Arc<EndpointSliceV1Beta1>>>,
}

impl Pending {
    fn len(&self) -> usize {
        self.nodes.len()
            + self.services.len()
            + self.endpoints.len()
            + self.raw_endpoints.len()
            + self.slices_v1.len()
            + self.slices_v1beta1.len()
    }
}

struct Feeds {
    nodes: Broadcaster<Arc<Node>>,
    services: Broadcaster<Arc<Service>>,
    endpoints: Broadcaster<Arc<Endpoints>>,
    raw_endpoints: Broadcaster<Arc<Endpoints>>,
    slices_v1: Broadcaster<Arc<EndpointSliceV1>>,
    slices_v1beta1: Broadcaster<Arc<EndpointSliceV1Beta1>>,
}

impl Feeds {
    fn new(queue_length: usize) -> Self {
        Self {
            nodes: Broadcaster::new("nodes", queue_length),
            services: Broadcaster::new("services", queue_length),
            endpoints: Broadcaster::new("endpoints", queue_length),
            raw_endpoints: Broadcaster::new("endpoints.raw", queue_length),
            slices_v1: Broadcaster::new("endpointslices.v1", queue_length),
            slices_v1beta1: Broadcaster::new("endpointslices.v1beta1", queue_length),
        }
    }
}

/// Storage hooks for each endpoint-bearing kind.
trait Stored: EndpointView {
    const KIND: ResourceKind;

    fn entries(views: &Views) -> &BTreeMap<ObjectKey, Derived<Self>>;

    fn entries_mut(views: &mut Views) -> &mut BTreeMap<ObjectKey, Derived<Self>>;

    fn pending(pending: &mut Pending) -> &mut Vec<Event<Arc<Self>>>;

    /// Record a change of the raw object. Only Endpoints has a raw feed.
    fn raw_changed(_pending: &mut Pending, _kind: EventType, _raw: &Arc<Self>) {}
}

impl Stored for Endpoints {
    const KIND: ResourceKind = ResourceKind::Endpoints;

    fn entries(views: &Views) -> &BTreeMap<ObjectKey, Derived<Self>> {
        &views.endpoints
    }

    fn entries_mut(views: &mut Views) -> &mut BTreeMap<ObjectKey, Derived<Self>> {
        &mut views.endpoints
    }

    fn pending(pending: &mut Pending) -> &mut Vec<Event<Arc<Self>>> {
        &mut pending.endpoints
    }

    fn raw_changed(pending: &mut Pending, kind: EventType, raw: &Arc<Self>) {
        pending.raw_endpoints.push(Event::new(kind, Arc::clone(raw)));
    }
}

impl Stored for EndpointSliceV1 {
    const KIND: ResourceKind = ResourceKind::EndpointSliceV1;

    fn entries(views: &Views) -> &BTreeMap<ObjectKey, Derived<Self>> {
        &views.slices_v1
    }

    fn entries_mut(views: &mut Views) -> &mut BTreeMap<ObjectKey, Derived<Self>> {
        &mut views.slices_v1
    }

    fn pending(pending: &mut Pending) -> &mut Vec<Event<Arc<Self>>> {
        &mut pending.slices_v1
    }
}

impl Stored for EndpointSliceV1Beta1 {
    const KIND: ResourceKind = ResourceKind::EndpointSliceV1Beta1;

    fn entries(views: &Views) -> &BTreeMap<ObjectKey, Derived<Self>> {
        &views.slices_v1beta1
    }

    fn entries_mut(views: &mut Views) -> &mut BTreeMap<ObjectKey, Derived<Self>> {
        &mut views.slices_v1beta1
    }

    fn pending(pending: &mut Pending) -> &mut Vec<Event<Arc<Self>>> {
        &mut pending.slices_v1beta1
    }
}

/// Re-derive stored objects, optionally only those owned by `scope`.
///
/// Returns the number of objects re-derived. Only objects whose view changed
/// produce a `MODIFIED` event.
fn recompute<T: Stored>(
    ctx: &PruneContext<'_>,
    views: &mut Views,
    scope: Option<&ObjectKey>,
    pending: &mut Pending,
) -> u64 {
    let mut count = 0;
    for entry in T::entries_mut(views).values_mut() {
        if let Some(service) = scope {
            if entry.raw.service_key().as_ref() != Some(service) {
                continue;
            }
        }
        count += 1;
        let view = entry.raw.prune(ctx);
        if view != *entry.view {
            entry.view = Arc::new(view);
            T::pending(pending).push(Event::modified(Arc::clone(&entry.view)));
        }
    }
    count
}

/// Node-local cache of cluster service discovery state.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use wrapper_cache::{CacheConfig, ResourceCache, ResourceEventHandler};
/// use k8s_openapi::api::core::v1::Node;
///
/// let cache = Arc::new(ResourceCache::new(CacheConfig::new("edge-1")));
/// let mut node = Node::default();
/// node.metadata.name = Some("edge-1".to_string());
/// cache.node_event_handler().on_add(node);
///
/// assert!(cache.get_node("edge-1").is_some());
/// ```
pub struct ResourceCache {
    host_name: String,
    state: RwLock<CacheState>,
    emit: Mutex<()>,
    feeds: Feeds,
    stats: CacheStats,
}

impl fmt::Debug for ResourceCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceCache")
            .field("host_name", &self.host_name)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl ResourceCache {
    /// Create an empty cache.
    pub fn new(config: CacheConfig) -> Self {
        info!(
            host = %config.host_name,
            queue_length = config.notify_channel_size,
            "creating resource cache"
        );
        Self {
            host_name: config.host_name,
            state: RwLock::new(CacheState::default()),
            emit: Mutex::new(()),
            feeds: Feeds::new(config.notify_channel_size),
            stats: CacheStats::new(),
        }
    }

    /// Node this cache derives views for.
    pub fn host_name(&self) -> &str {
        &self.host_name
    }

    /// Mutation and emission counters.
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    // ---- snapshots ----

    /// The named Node, if cached.
    pub fn get_node(&self, name: &str) -> Option<Arc<Node>> {
        self.state.read().topology.nodes.get(name).cloned()
    }

    /// All cached Services, ordered by namespace and name.
    pub fn get_services(&self) -> Vec<Arc<Service>> {
        let state = self.state.read();
        services_snapshot(&state)
    }

    /// The derived view of all Endpoints.
    pub fn get_endpoints(&self) -> Vec<Arc<Endpoints>> {
        views_snapshot::<Endpoints>(&self.state.read())
    }

    /// All Endpoints as received from the API server.
    pub fn get_raw_endpoints(&self) -> Vec<Arc<Endpoints>> {
        raw_snapshot(&self.state.read())
    }

    /// The derived view of all v1 EndpointSlices.
    pub fn get_endpoint_slices_v1(&self) -> Vec<Arc<EndpointSliceV1>> {
        views_snapshot::<EndpointSliceV1>(&self.state.read())
    }

    /// The derived view of all v1beta1 EndpointSlices.
    pub fn get_endpoint_slices_v1beta1(&self) -> Vec<Arc<EndpointSliceV1Beta1>> {
        views_snapshot::<EndpointSliceV1Beta1>(&self.state.read())
    }

    /// Names of the nodes labelled as members of `unit`.
    pub fn nodes_in_unit(&self, unit: &str) -> BTreeSet<String> {
        self.state
            .read()
            .topology
            .node_units
            .get(unit)
            .cloned()
            .unwrap_or_default()
    }

    /// Current node health overrides.
    pub fn node_health(&self) -> HashMap<String, bool> {
        self.state.read().topology.node_health.clone()
    }

    /// Object counts and derived indexes.
    pub fn summary(&self) -> CacheSummary {
        let state = self.state.read();
        let mut unhealthy_nodes: Vec<String> = state
            .topology
            .node_health
            .iter()
            .filter(|(_, healthy)| !**healthy)
            .map(|(name, _)| name.clone())
            .collect();
        unhealthy_nodes.sort();

        CacheSummary {
            host_name: self.host_name.clone(),
            nodes: state.topology.nodes.len(),
            services: state.topology.services.len(),
            endpoints: state.views.endpoints.len(),
            endpoint_slices_v1: state.views.slices_v1.len(),
            endpoint_slices_v1beta1: state.views.slices_v1beta1.len(),
            node_units: state
                .topology
                .node_units
                .iter()
                .map(|(unit, members)| (unit.clone(), members.len()))
                .collect(),
            unhealthy_nodes,
        }
    }

    // ---- watches ----

    /// Subscribe to Node changes.
    ///
    /// A seeded subscription first yields an `ADDED` event per cached object.
    pub fn watch_nodes(&self, seeded: bool) -> Subscription<Arc<Node>> {
        self.subscribe(&self.feeds.nodes, seeded, |state| {
            state.topology.nodes.values().cloned().collect()
        })
    }

    /// Subscribe to Service changes.
    pub fn watch_services(&self, seeded: bool) -> Subscription<Arc<Service>> {
        self.subscribe(&self.feeds.services, seeded, services_snapshot)
    }

    /// Subscribe to changes of the derived Endpoints view.
    pub fn watch_endpoints(&self, seeded: bool) -> Subscription<Arc<Endpoints>> {
        self.subscribe(&self.feeds.endpoints, seeded, views_snapshot::<Endpoints>)
    }

    /// Subscribe to changes of Endpoints as received.
    pub fn watch_raw_endpoints(&self, seeded: bool) -> Subscription<Arc<Endpoints>> {
        self.subscribe(&self.feeds.raw_endpoints, seeded, raw_snapshot)
    }

    /// Subscribe to changes of the derived v1 EndpointSlice view.
    pub fn watch_endpoint_slices_v1(&self, seeded: bool) -> Subscription<Arc<EndpointSliceV1>> {
        self.subscribe(
            &self.feeds.slices_v1,
            seeded,
            views_snapshot::<EndpointSliceV1>,
        )
    }

    /// Subscribe to changes of the derived v1beta1 EndpointSlice view.
    pub fn watch_endpoint_slices_v1beta1(
        &self,
        seeded: bool,
    ) -> Subscription<Arc<EndpointSliceV1Beta1>> {
        self.subscribe(
            &self.feeds.slices_v1beta1,
            seeded,
            views_snapshot::<EndpointSliceV1Beta1>,
        )
    }

    /// Registered subscribers per feed.
    pub fn subscriber_counts(&self) -> Vec<(&'static str, usize)> {
        let feeds = &self.feeds;
        vec![
            (feeds.nodes.name(), feeds.nodes.subscriber_count()),
            (feeds.services.name(), feeds.services.subscriber_count()),
            (feeds.endpoints.name(), feeds.endpoints.subscriber_count()),
            (feeds.raw_endpoints.name(), feeds.raw_endpoints.subscriber_count()),
            (feeds.slices_v1.name(), feeds.slices_v1.subscriber_count()),
            (feeds.slices_v1beta1.name(), feeds.slices_v1beta1.subscriber_count()),
        ]
    }

    /// Events dropped per feed because a subscriber's queue was full.
    pub fn dropped_counts(&self) -> Vec<(&'static str, u64)> {
        let feeds = &self.feeds;
        vec![
            (feeds.nodes.name(), feeds.nodes.stats().dropped()),
            (feeds.services.name(), feeds.services.stats().dropped()),
            (feeds.endpoints.name(), feeds.endpoints.stats().dropped()),
            (feeds.raw_endpoints.name(), feeds.raw_endpoints.stats().dropped()),
            (feeds.slices_v1.name(), feeds.slices_v1.stats().dropped()),
            (feeds.slices_v1beta1.name(), feeds.slices_v1beta1.stats().dropped()),
        ]
    }

    fn subscribe<T: Clone + Send + 'static>(
        &self,
        feed: &Broadcaster<T>,
        seeded: bool,
        snapshot: impl FnOnce(&CacheState) -> Vec<T>,
    ) -> Subscription<T> {
        if !seeded {
            return feed.watch();
        }

        let state = self.state.read();
        // Held until registration completes so no mutation is published in between.
        let _emit = self.emit.lock();
        let initial: Vec<_> = snapshot(&state).into_iter().map(Event::added).collect();
        drop(state);

        trace!(feed = feed.name(), initial = initial.len(), "seeded watch");
        feed.watch_with_prefix(initial)
    }

    // ---- mutations ----

    /// Replace the node health overrides and re-derive every view.
    pub fn set_node_health(&self, health: HashMap<String, bool>) {
        let mut state = self.state.write();
        if state.topology.node_health == health {
            return;
        }

        debug!(
            nodes = health.len(),
            unhealthy = health.values().filter(|h| !**h).count(),
            "node health changed"
        );
        state.topology.node_health = health;

        let mut pending = Pending::default();
        let CacheState { topology, views } = &mut *state;
        self.recompute_views(topology, views, None, &mut pending);
        self.publish(state, pending);
    }

    pub(crate) fn apply_node(&self, mutation: Mutation, node: Node) {
        let name = node.metadata.name.clone().unwrap_or_default();
        let mut state = self.state.write();
        let CacheState { topology, views } = &mut *state;
        let mut pending = Pending::default();

        let labels_changed = match mutation {
            Mutation::Add | Mutation::Update => {
                if mutation == Mutation::Update && !topology.nodes.contains_key(&name) {
                    self.ignore(ResourceKind::Nodes, mutation, &name);
                    return;
                }
                let node = Arc::new(node);
                match topology.nodes.insert(name.clone(), Arc::clone(&node)) {
                    Some(old) => {
                        if *old != *node {
                            pending.nodes.push(Event::modified(Arc::clone(&node)));
                        }
                        old.metadata.labels != node.metadata.labels
                    }
                    None => {
                        pending.nodes.push(Event::added(node));
                        true
                    }
                }
            }
            Mutation::Delete => {
                let Some(old) = topology.nodes.remove(&name) else {
                    self.ignore(ResourceKind::Nodes, mutation, &name);
                    return;
                };
                pending.nodes.push(Event::deleted(old));
                true
            }
        };

        if labels_changed {
            topology.reindex_units(&name);
            self.recompute_views(topology, views, None, &mut pending);
        }

        trace!(node = %name, op = mutation.as_str(), labels_changed, "node applied");
        self.stats.record_applied();
        self.publish(state, pending);
    }

    pub(crate) fn apply_service(&self, mutation: Mutation, service: Service) {
        let key = ObjectKey::from_meta(&service.metadata);
        let mut state = self.state.write();
        let CacheState { topology, views } = &mut *state;
        let mut pending = Pending::default();

        let keys_changed = match mutation {
            Mutation::Add | Mutation::Update => {
                let previous = topology.services.get(&key);
                if mutation == Mutation::Update && previous.is_none() {
                    self.ignore(ResourceKind::Services, mutation, &key);
                    return;
                }

                let topology_keys = annotations::topology_keys(&service.metadata);
                let service = Arc::new(service);
                let keys_changed = match previous {
                    Some(old) => {
                        if *old.service != *service {
                            pending.services.push(Event::modified(Arc::clone(&service)));
                        }
                        old.topology_keys != topology_keys
                    }
                    None => {
                        pending.services.push(Event::added(Arc::clone(&service)));
                        !topology_keys.is_empty()
                    }
                };
                topology.services.insert(
                    key.clone(),
                    CachedService {
                        service,
                        topology_keys,
                    },
                );
                keys_changed
            }
            Mutation::Delete => {
                let Some(old) = topology.services.remove(&key) else {
                    self.ignore(ResourceKind::Services, mutation, &key);
                    return;
                };
                pending.services.push(Event::deleted(old.service));
                !old.topology_keys.is_empty()
            }
        };

        if keys_changed {
            self.recompute_views(topology, views, Some(&key), &mut pending);
        }

        trace!(service = %key, op = mutation.as_str(), keys_changed, "service applied");
        self.stats.record_applied();
        self.publish(state, pending);
    }

    pub(crate) fn apply_endpoints(&self, mutation: Mutation, endpoints: Endpoints) {
        self.apply_view(mutation, endpoints);
    }

    pub(crate) fn apply_endpoint_slice_v1(&self, mutation: Mutation, slice: EndpointSliceV1) {
        self.apply_view(mutation, slice);
    }

    pub(crate) fn apply_endpoint_slice_v1beta1(
        &self,
        mutation: Mutation,
        slice: EndpointSliceV1Beta1,
    ) {
        self.apply_view(mutation, slice);
    }

    fn apply_view<T: Stored>(&self, mutation: Mutation, object: T) {
        let key = object.object_key();
        let mut state = self.state.write();
        let CacheState { topology, views } = &mut *state;
        let entries = T::entries_mut(views);
        let mut pending = Pending::default();

        match mutation {
            Mutation::Add | Mutation::Update => {
                if mutation == Mutation::Update && !entries.contains_key(&key) {
                    self.ignore(T::KIND, mutation, &key);
                    return;
                }

                let ctx = topology.prune_context(&self.host_name);
                let raw = Arc::new(object);
                let view = Arc::new(raw.prune(&ctx));
                let entry = Derived {
                    raw: Arc::clone(&raw),
                    view: Arc::clone(&view),
                };

                match entries.insert(key.clone(), entry) {
                    Some(old) => {
                        if *old.view != *view {
                            T::pending(&mut pending).push(Event::modified(view));
                        }
                        if *old.raw != *raw {
                            T::raw_changed(&mut pending, EventType::Modified, &raw);
                        }
                    }
                    None => {
                        T::pending(&mut pending).push(Event::added(view));
                        T::raw_changed(&mut pending, EventType::Added, &raw);
                    }
                }
            }
            Mutation::Delete => {
                let Some(old) = entries.remove(&key) else {
                    self.ignore(T::KIND, mutation, &key);
                    return;
                };
                T::pending(&mut pending).push(Event::deleted(old.view));
                T::raw_changed(&mut pending, EventType::Deleted, &old.raw);
            }
        }

        trace!(kind = %T::KIND, key = %key, op = mutation.as_str(), "object applied");
        self.stats.record_applied();
        self.publish(state, pending);
    }

    fn recompute_views(
        &self,
        topology: &Topology,
        views: &mut Views,
        scope: Option<&ObjectKey>,
        pending: &mut Pending,
    ) {
        let ctx = topology.prune_context(&self.host_name);
        let count = recompute::<Endpoints>(&ctx, views, scope, pending)
            + recompute::<EndpointSliceV1>(&ctx, views, scope, pending)
            + recompute::<EndpointSliceV1Beta1>(&ctx, views, scope, pending);
        self.stats.record_recomputed(count);
    }

    fn ignore(&self, kind: ResourceKind, mutation: Mutation, key: &dyn fmt::Display) {
        warn!(kind = %kind, key = %key, op = mutation.as_str(), "ignoring notification for unknown object");
        self.stats.record_ignored();
        counter!("wrapper_cache_ignored_notifications_total", "kind" => kind.short_name())
            .increment(1);
    }

    /// Release the state lock and broadcast the collected events.
    fn publish(&self, state: RwLockWriteGuard<'_, CacheState>, pending: Pending) {
        let count = pending.len();
        if count == 0 {
            return;
        }

        let _emit = self.emit.lock();
        drop(state);

        let Pending {
            nodes,
            services,
            endpoints,
            raw_endpoints,
            slices_v1,
            slices_v1beta1,
        } = pending;
        broadcast(&self.feeds.nodes, nodes);
        broadcast(&self.feeds.services, services);
        broadcast(&self.feeds.endpoints, endpoints);
        broadcast(&self.feeds.raw_endpoints, raw_endpoints);
        broadcast(&self.feeds.slices_v1, slices_v1);
        broadcast(&self.feeds.slices_v1beta1, slices_v1beta1);

        self.stats.record_emitted(count as u64);
    }

    // ---- lifecycle ----

    /// Close every feed. Open subscriptions end after draining their queues.
    pub fn shutdown(&self) {
        let _emit = self.emit.lock();
        self.feeds.nodes.shutdown();
        self.feeds.services.shutdown();
        self.feeds.endpoints.shutdown();
        self.feeds.raw_endpoints.shutdown();
        self.feeds.slices_v1.shutdown();
        self.feeds.slices_v1beta1.shutdown();
        info!("resource cache shut down");
    }

    /// Wait for `shutdown` to resolve, then close every feed.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        shutdown.await;
        self.shutdown();
    }
}

fn broadcast<T: Clone + Send + 'static>(feed: &Broadcaster<T>, events: Vec<Event<T>>) {
    for event in events {
        feed.action_or_drop(event.kind, event.object);
    }
}

fn services_snapshot(state: &CacheState) -> Vec<Arc<Service>> {
    state
        .topology
        .services
        .values()
        .map(|cached| Arc::clone(&cached.service))
        .collect()
}

fn views_snapshot<T: Stored>(state: &CacheState) -> Vec<Arc<T>> {
    T::entries(&state.views)
        .values()
        .map(|entry| Arc::clone(&entry.view))
        .collect()
}

fn raw_snapshot(state: &CacheState) -> Vec<Arc<Endpoints>> {
    state
        .views
        .endpoints
        .values()
        .map(|entry| Arc::clone(&entry.raw))
        .collect()
}
