//! Command line flags.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};
use wrapper_cache::{CacheConfig, DEFAULT_NOTIFY_CHANNEL_SIZE};
use wrapper_core::AutonomyOptions;
use wrapper_server::ServerConfig;

/// Node-local Kubernetes service discovery cache.
#[derive(Parser, Debug, Clone)]
#[command(name = "grid-wrapper", version)]
#[command(about = "Serves node-local Services, Endpoints and EndpointSlices to edge workloads", long_about = None)]
pub struct Cli {
    /// Address the wrapper listens on
    #[arg(long, env = "WRAPPER_BIND_ADDRESS", default_value = "127.0.0.1:51006")]
    pub bind_address: SocketAddr,

    /// Kubeconfig used to reach the API server; in-cluster config when unset
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// API server URL, overriding the kubeconfig
    #[arg(long)]
    pub master: Option<String>,

    /// Skip API server certificate verification
    #[arg(long, default_value_t = false)]
    pub insecure_skip_tls_verify: bool,

    /// Sustained QPS towards the API server
    #[arg(long, default_value_t = 5.0)]
    pub kube_api_qps: f32,

    /// Burst towards the API server
    #[arg(long, default_value_t = 10)]
    pub kube_api_burst: u32,

    /// Node whose view is served
    #[arg(long, env = "NODE_NAME")]
    pub hostname: String,

    /// Events buffered per watcher before drops
    #[arg(long, default_value_t = DEFAULT_NOTIFY_CHANNEL_SIZE)]
    pub notify_channel_size: usize,

    /// Serve /debug/pprof/ diagnostics
    #[arg(long, default_value_t = false)]
    pub debug: bool,

    /// Seconds to wait for the initial cache sync
    #[arg(long, default_value = "60", value_parser = parse_seconds)]
    pub sync_timeout: Duration,

    /// Cache and serve discovery.k8s.io/v1 EndpointSlices
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub enable_endpointslice_v1: bool,

    /// Cache and serve discovery.k8s.io/v1beta1 EndpointSlices
    #[arg(long, default_value_t = false, action = ArgAction::Set)]
    pub enable_endpointslice_v1beta1: bool,

    /// Local node health override, as enabled=<bool>,address=<url>,interval=<secs>
    #[arg(long, default_value_t = AutonomyOptions::default())]
    pub service_autonomy_enhancement: AutonomyOptions,

    /// Default log filter; RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Cli {
    /// Cache settings derived from the flags.
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new(self.hostname.clone()).with_notify_channel_size(self.notify_channel_size)
    }

    /// Server settings derived from the flags.
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            bind_address: self.bind_address,
            debug: self.debug,
            enable_endpoint_slice_v1: self.enable_endpointslice_v1,
            enable_endpoint_slice_v1beta1: self.enable_endpointslice_v1beta1,
            ..Default::default()
        }
    }
}

fn parse_seconds(value: &str) -> Result<Duration, String> {
    let secs: u64 = value
        .trim()
        .parse()
        .map_err(|e| format!("expected whole seconds: {e}"))?;
    if secs == 0 {
        return Err("must be positive".to_string());
    }
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["grid-wrapper", "--hostname", "edge-1"]).unwrap();
        assert_eq!(cli.bind_address, "127.0.0.1:51006".parse().unwrap());
        assert_eq!(cli.sync_timeout, Duration::from_secs(60));
        assert!(cli.enable_endpointslice_v1);
        assert!(!cli.enable_endpointslice_v1beta1);
        assert!(!cli.service_autonomy_enhancement.enabled);
        assert_eq!(cli.cache_config().host_name, "edge-1");
        assert_eq!(cli.cache_config().notify_channel_size, DEFAULT_NOTIFY_CHANNEL_SIZE);
    }

    #[test]
    fn test_structured_option() {
        let cli = Cli::try_parse_from([
            "grid-wrapper",
            "--hostname",
            "edge-1",
            "--service-autonomy-enhancement",
            "enabled=true,interval=3",
            "--enable-endpointslice-v1",
            "false",
        ])
        .unwrap();
        assert!(cli.service_autonomy_enhancement.enabled);
        assert_eq!(cli.service_autonomy_enhancement.interval, Duration::from_secs(3));
        assert!(!cli.server_config().enable_endpoint_slice_v1);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(Cli::try_parse_from([
            "grid-wrapper",
            "--hostname",
            "edge-1",
            "--service-autonomy-enhancement",
            "enabled=maybe",
        ])
        .is_err());
        assert!(Cli::try_parse_from([
            "grid-wrapper",
            "--hostname",
            "edge-1",
            "--sync-timeout",
            "0",
        ])
        .is_err());
    }
}
