//! `/debug/pprof/` diagnostics. Only routed when debugging is enabled.

use std::collections::BTreeMap;

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use wrapper_cache::CacheSummary;

use crate::state::AppState;
use crate::watches::WatchReport;

/// Available diagnostics.
#[derive(Debug, Serialize)]
pub struct Index {
    endpoints: &'static [&'static str],
}

/// `GET /debug/pprof/`.
pub async fn index() -> Json<Index> {
    Json(Index {
        endpoints: &["/debug/pprof/cache", "/debug/pprof/watchers"],
    })
}

/// Cache contents and counters.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheReport {
    host_name: String,
    objects: BTreeMap<&'static str, usize>,
    node_units: BTreeMap<String, usize>,
    unhealthy_nodes: Vec<String>,
    mutations_applied: u64,
    mutations_ignored: u64,
    recomputed: u64,
    events_emitted: u64,
    subscribers: BTreeMap<&'static str, usize>,
    dropped: BTreeMap<&'static str, u64>,
}

/// `GET /debug/pprof/cache`.
pub async fn cache(State(state): State<AppState>) -> Json<CacheReport> {
    let CacheSummary {
        host_name,
        nodes,
        services,
        endpoints,
        endpoint_slices_v1,
        endpoint_slices_v1beta1,
        node_units,
        unhealthy_nodes,
    } = state.cache.summary();
    let stats = state.cache.stats();

    Json(CacheReport {
        host_name,
        objects: BTreeMap::from([
            ("nodes", nodes),
            ("services", services),
            ("endpoints", endpoints),
            ("endpointslices.v1", endpoint_slices_v1),
            ("endpointslices.v1beta1", endpoint_slices_v1beta1),
        ]),
        node_units,
        unhealthy_nodes,
        mutations_applied: stats.mutations_applied(),
        mutations_ignored: stats.mutations_ignored(),
        recomputed: stats.recomputed(),
        events_emitted: stats.events_emitted(),
        subscribers: state.cache.subscriber_counts().into_iter().collect(),
        dropped: state.cache.dropped_counts().into_iter().collect(),
    })
}

/// Open watch streams.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchersReport {
    active: usize,
    watches: Vec<WatchReport>,
}

/// `GET /debug/pprof/watchers`.
pub async fn watchers(State(state): State<AppState>) -> Json<WatchersReport> {
    let watches: Vec<WatchReport> = state.watches.list().iter().map(WatchReport::from).collect();
    Json(WatchersReport {
        active: watches.len(),
        watches,
    })
}
