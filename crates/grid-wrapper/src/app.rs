//! Process lifecycle: wire the informers, the cache and the server.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::{Endpoints, Node, Service};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use wrapper_cache::{EndpointSliceV1, EndpointSliceV1Beta1, ResourceCache, ResourceEventHandler};
use wrapper_core::ResourceKind;
use wrapper_server::{ShutdownController, UpstreamClient, UpstreamConfig, WrapperServer};

use crate::autonomy::HealthPoller;
use crate::cli::Cli;
use crate::informer::{wait_for_sync, Informer, SyncHandle, Watched};
use crate::kubeconfig;

/// How long background tasks get to stop after the server has.
const TASK_GRACE: Duration = Duration::from_secs(5);

/// Upstream settings from the flags: kubeconfig or in-cluster, plus overrides.
pub fn upstream_config(cli: &Cli) -> Result<UpstreamConfig> {
    let mut config = match &cli.kubeconfig {
        Some(path) => kubeconfig::load(path)?,
        None => kubeconfig::in_cluster().context("no --kubeconfig and not running in a pod")?,
    };
    if let Some(master) = &cli.master {
        config.server = master.clone();
    }
    if cli.insecure_skip_tls_verify {
        config.insecure_skip_tls_verify = true;
    }
    config.qps = cli.kube_api_qps;
    config.burst = cli.kube_api_burst;
    Ok(config)
}

/// Background informers and their sync handles.
#[derive(Default)]
pub struct Informers {
    handles: Vec<SyncHandle>,
    tasks: Vec<JoinHandle<()>>,
}

impl Informers {
    /// Start an informer for `kind` feeding `handler`.
    pub fn spawn<K, H>(
        &mut self,
        kind: ResourceKind,
        client: &UpstreamClient,
        handler: H,
        tasks: &ShutdownController,
    ) where
        K: Watched,
        H: ResourceEventHandler<K> + 'static,
    {
        let (informer, sync) = Informer::<K, H>::new(kind, client.clone(), handler);
        self.handles.push(sync);
        self.tasks
            .push(tokio::spawn(informer.run(tasks.shutdown_signal())));
    }

    /// Sync handles of every started informer.
    pub fn sync_handles(&self) -> &[SyncHandle] {
        &self.handles
    }

    /// Wait for the informer tasks, aborting any still running after `grace`.
    pub async fn join(self, grace: Duration) {
        for task in self.tasks {
            let abort = task.abort_handle();
            if tokio::time::timeout(grace, task).await.is_err() {
                abort.abort();
            }
        }
    }
}

/// Start an informer per enabled kind.
pub fn start_informers(
    cli: &Cli,
    client: &UpstreamClient,
    cache: &Arc<ResourceCache>,
    tasks: &ShutdownController,
) -> Informers {
    let mut informers = Informers::default();
    informers.spawn::<Node, _>(ResourceKind::Nodes, client, cache.node_event_handler(), tasks);
    informers.spawn::<Service, _>(
        ResourceKind::Services,
        client,
        cache.service_event_handler(),
        tasks,
    );
    informers.spawn::<Endpoints, _>(
        ResourceKind::Endpoints,
        client,
        cache.endpoints_event_handler(),
        tasks,
    );
    if cli.enable_endpointslice_v1 {
        informers.spawn::<EndpointSliceV1, _>(
            ResourceKind::EndpointSliceV1,
            client,
            cache.endpoint_slice_v1_event_handler(),
            tasks,
        );
    }
    if cli.enable_endpointslice_v1beta1 {
        informers.spawn::<EndpointSliceV1Beta1, _>(
            ResourceKind::EndpointSliceV1Beta1,
            client,
            cache.endpoint_slice_v1beta1_event_handler(),
            tasks,
        );
    }
    informers
}

/// Run the wrapper until SIGTERM/SIGINT.
///
/// # Errors
///
/// Fails if the upstream cannot be configured, the informers do not sync
/// within `--sync-timeout`, or the server cannot start.
pub async fn run(cli: Cli) -> Result<()> {
    info!(
        version = crate::version::VERSION,
        hostname = %cli.hostname,
        bind = %cli.bind_address,
        "starting grid-wrapper"
    );

    let upstream = UpstreamClient::new(upstream_config(&cli)?)?;
    let cache = Arc::new(ResourceCache::new(cli.cache_config()));
    let tasks = ShutdownController::new();

    let informers = start_informers(&cli, &upstream, &cache, &tasks);
    if let Err(e) = wait_for_sync(informers.sync_handles(), cli.sync_timeout).await {
        tasks.shutdown(TASK_GRACE).await;
        informers.join(TASK_GRACE).await;
        return Err(e).context("initial cache sync failed");
    }

    let poller = if cli.service_autonomy_enhancement.enabled {
        let poller = HealthPoller::from_options(&cli.service_autonomy_enhancement, Arc::clone(&cache))?;
        info!(options = %cli.service_autonomy_enhancement, "service autonomy enhancement enabled");
        Some(tokio::spawn(poller.run(tasks.shutdown_signal())))
    } else {
        None
    };

    let server = WrapperServer::builder()
        .cache(Arc::clone(&cache))
        .upstream(upstream)
        .config(cli.server_config())
        .build()?;
    let served = server.serve().await;

    tasks.shutdown(TASK_GRACE).await;
    informers.join(TASK_GRACE).await;
    if let Some(poller) = poller {
        if let Err(e) = poller.await {
            warn!(error = %e, "health poller task failed");
        }
    }

    served.context("serving")?;
    info!("grid-wrapper stopped");
    Ok(())
}
