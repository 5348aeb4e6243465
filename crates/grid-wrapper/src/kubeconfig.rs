//! Upstream connection settings from a kubeconfig or the in-cluster
//! service account.
//!
//! Only what the wrapper needs is read: the current context's cluster
//! (server, CA, insecure flag) and user (token, token file, client
//! certificate and key). File references are resolved relative to the
//! kubeconfig's directory.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use tracing::debug;
use wrapper_core::{Result, WrapperError};
use wrapper_server::UpstreamConfig;

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct Kubeconfig {
    #[serde(default)]
    current_context: Option<String>,
    #[serde(default)]
    clusters: Vec<Named<Cluster>>,
    #[serde(default)]
    contexts: Vec<Named<Context>>,
    #[serde(default)]
    users: Vec<Named<User>>,
}

#[derive(Debug, Deserialize)]
struct Named<T> {
    name: String,
    #[serde(alias = "cluster", alias = "context", alias = "user")]
    value: T,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct Cluster {
    server: String,
    #[serde(default)]
    certificate_authority: Option<PathBuf>,
    #[serde(default)]
    certificate_authority_data: Option<String>,
    #[serde(default)]
    insecure_skip_tls_verify: bool,
}

#[derive(Debug, Default, Deserialize)]
struct Context {
    cluster: String,
    #[serde(default)]
    user: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct User {
    #[serde(default)]
    token: Option<String>,
    #[serde(default, rename = "tokenFile")]
    token_file: Option<PathBuf>,
    #[serde(default)]
    client_certificate: Option<PathBuf>,
    #[serde(default)]
    client_certificate_data: Option<String>,
    #[serde(default)]
    client_key: Option<PathBuf>,
    #[serde(default)]
    client_key_data: Option<String>,
}

/// Load upstream settings from a kubeconfig file.
pub fn load(path: &Path) -> Result<UpstreamConfig> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        WrapperError::Configuration(format!("reading kubeconfig {}: {e}", path.display()))
    })?;
    from_yaml(&text, path.parent())
}

/// Parse kubeconfig text. Relative paths resolve against `base_dir`.
pub fn from_yaml(text: &str, base_dir: Option<&Path>) -> Result<UpstreamConfig> {
    let kubeconfig: Kubeconfig = serde_yaml::from_str(text)
        .map_err(|e| WrapperError::Configuration(format!("parsing kubeconfig: {e}")))?;

    let context = match kubeconfig.current_context.as_deref() {
        Some(name) => find(&kubeconfig.contexts, name, "context")?,
        None => kubeconfig
            .contexts
            .first()
            .map(|c| &c.value)
            .ok_or_else(|| WrapperError::Configuration("kubeconfig has no contexts".into()))?,
    };
    let cluster = find(&kubeconfig.clusters, &context.cluster, "cluster")?;
    let user = match context.user.as_deref() {
        Some(name) => Some(find(&kubeconfig.users, name, "user")?),
        None => None,
    };

    let resolve = |p: &Path| match base_dir {
        Some(dir) if p.is_relative() => dir.join(p),
        _ => p.to_path_buf(),
    };

    let mut config = UpstreamConfig::new(cluster.server.clone());
    config.insecure_skip_tls_verify = cluster.insecure_skip_tls_verify;
    config.ca_pem = material(
        cluster.certificate_authority_data.as_deref(),
        cluster.certificate_authority.as_deref().map(resolve).as_deref(),
        "certificate-authority",
    )?;

    if let Some(user) = user {
        config.token = match (&user.token, &user.token_file) {
            (Some(token), _) => Some(token.trim().to_string()),
            (None, Some(file)) => Some(read_string(&resolve(file))?.trim().to_string()),
            (None, None) => None,
        };

        let cert = material(
            user.client_certificate_data.as_deref(),
            user.client_certificate.as_deref().map(resolve).as_deref(),
            "client-certificate",
        )?;
        let key = material(
            user.client_key_data.as_deref(),
            user.client_key.as_deref().map(resolve).as_deref(),
            "client-key",
        )?;
        config.identity_pem = match (cert, key) {
            (Some(mut cert), Some(key)) => {
                if !cert.ends_with(b"\n") {
                    cert.push(b'\n');
                }
                cert.extend_from_slice(&key);
                Some(cert)
            }
            (None, None) => None,
            _ => {
                return Err(WrapperError::Configuration(
                    "client certificate and key must be set together".into(),
                ))
            }
        };
    }

    debug!(server = %config.server, "loaded kubeconfig");
    Ok(config)
}

/// Upstream settings from the pod's service account.
pub fn in_cluster() -> Result<UpstreamConfig> {
    let host = std::env::var("KUBERNETES_SERVICE_HOST")
        .map_err(|_| WrapperError::Configuration("KUBERNETES_SERVICE_HOST is not set".into()))?;
    let port = std::env::var("KUBERNETES_SERVICE_PORT").unwrap_or_else(|_| "443".to_string());
    let server = if host.contains(':') {
        format!("https://[{host}]:{port}")
    } else {
        format!("https://{host}:{port}")
    };

    let dir = Path::new(SERVICE_ACCOUNT_DIR);
    let mut config = UpstreamConfig::new(server);
    config.token = Some(read_string(&dir.join("token"))?.trim().to_string());
    config.ca_pem = Some(read_bytes(&dir.join("ca.crt"))?);
    Ok(config)
}

fn find<'a, T>(items: &'a [Named<T>], name: &str, what: &str) -> Result<&'a T> {
    items
        .iter()
        .find(|item| item.name == name)
        .map(|item| &item.value)
        .ok_or_else(|| WrapperError::Configuration(format!("kubeconfig {what} {name:?} not found")))
}

fn material(data: Option<&str>, file: Option<&Path>, what: &str) -> Result<Option<Vec<u8>>> {
    if let Some(data) = data {
        let decoded = STANDARD
            .decode(data.trim())
            .map_err(|e| WrapperError::Configuration(format!("decoding {what}-data: {e}")))?;
        return Ok(Some(decoded));
    }
    file.map(read_bytes).transpose()
}

fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path)
        .map_err(|e| WrapperError::Configuration(format!("reading {}: {e}", path.display())))
}

fn read_string(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| WrapperError::Configuration(format!("reading {}: {e}", path.display())))
}
