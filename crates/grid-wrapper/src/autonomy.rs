//! Service autonomy enhancement: polling local node health.
//!
//! A local agent reports which nodes it can reach as a JSON object of node
//! name to health. The map is pushed into the cache, which moves endpoints
//! on unhealthy nodes to not-ready. A failed poll keeps the previous map.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};
use wrapper_cache::ResourceCache;
use wrapper_core::{AutonomyOptions, Result, WrapperError};
use wrapper_server::ShutdownSignal;

/// Source of node health reports.
#[async_trait]
pub trait HealthSource: Send + Sync {
    /// Fetch the current node name to health map.
    async fn fetch(&self) -> Result<HashMap<String, bool>>;
}

/// Fetches health from an HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpHealthSource {
    client: reqwest::Client,
    address: String,
}

impl HttpHealthSource {
    /// Poll `address`, giving up on each request after `timeout`.
    pub fn new(address: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WrapperError::Configuration(format!("building health client: {e}")))?;
        Ok(Self {
            client,
            address: address.into(),
        })
    }
}

#[async_trait]
impl HealthSource for HttpHealthSource {
    async fn fetch(&self) -> Result<HashMap<String, bool>> {
        let response = self
            .client
            .get(&self.address)
            .send()
            .await
            .map_err(|e| WrapperError::upstream(format!("GET {}", self.address), e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(WrapperError::UpstreamStatus {
                status: status.as_u16(),
                path: self.address.clone(),
            });
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| WrapperError::upstream(format!("reading {}", self.address), e))?;
        serde_json::from_slice(&body).map_err(|e| WrapperError::Decoding {
            what: "node health".to_string(),
            message: e.to_string(),
        })
    }
}

/// Periodically pushes node health into the cache.
pub struct HealthPoller<S> {
    source: S,
    cache: Arc<ResourceCache>,
    interval: Duration,
}

impl HealthPoller<HttpHealthSource> {
    /// Poller configured from the command line option.
    pub fn from_options(options: &AutonomyOptions, cache: Arc<ResourceCache>) -> Result<Self> {
        let source = HttpHealthSource::new(options.address.clone(), options.interval)?;
        Ok(Self::new(source, cache, options.interval))
    }
}

impl<S: HealthSource> HealthPoller<S> {
    /// Poll `source` every `interval`.
    pub fn new(source: S, cache: Arc<ResourceCache>, interval: Duration) -> Self {
        Self {
            source,
            cache,
            interval,
        }
    }

    /// Poll once and apply the result.
    pub async fn poll_once(&self) -> Result<()> {
        let health = self.source.fetch().await?;
        debug!(
            nodes = health.len(),
            unhealthy = health.values().filter(|healthy| !**healthy).count(),
            "node health polled"
        );
        self.cache.set_node_health(health);
        Ok(())
    }

    /// Poll until `shutdown` fires.
    pub async fn run(self, mut shutdown: ShutdownSignal) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        warn!(error = %e, "node health poll failed, keeping previous state");
                    }
                }
                _ = shutdown.changed() => return,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use wrapper_cache::CacheConfig;

    struct Scripted {
        responses: Mutex<Vec<Result<HashMap<String, bool>>>>,
    }

    #[async_trait]
    impl HealthSource for Scripted {
        async fn fetch(&self) -> Result<HashMap<String, bool>> {
            self.responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(Err(WrapperError::Shutdown))
        }
    }

    #[tokio::test]
    async fn test_failure_keeps_previous_map() {
        let cache = Arc::new(ResourceCache::new(CacheConfig::new("edge-1")));
        let poller = HealthPoller::new(
            Scripted {
                // Popped from the back.
                responses: Mutex::new(vec![
                    Err(WrapperError::Shutdown),
                    Ok(HashMap::from([("edge-2".to_string(), false)])),
                ]),
            },
            Arc::clone(&cache),
            Duration::from_secs(1),
        );

        poller.poll_once().await.unwrap();
        assert_eq!(cache.node_health().get("edge-2"), Some(&false));

        assert!(poller.poll_once().await.is_err());
        assert_eq!(cache.node_health().get("edge-2"), Some(&false));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let cache = Arc::new(ResourceCache::new(CacheConfig::new("edge-1")));
        let poller = HealthPoller::new(
            Scripted {
                responses: Mutex::new(Vec::new()),
            },
            cache,
            Duration::from_millis(10),
        );
        let controller = wrapper_server::ShutdownController::new();
        let handle = tokio::spawn(poller.run(controller.shutdown_signal()));

        tokio::time::sleep(Duration::from_millis(30)).await;
        controller.shutdown(Duration::from_millis(10)).await;
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
