//! HTTP client for the real API server.
//!
//! Used by the passthrough proxy and by the informers. Informer requests go
//! through the QPS/burst limiter; proxied requests do not.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use http::header::{ACCEPT, AUTHORIZATION};
use http::Method;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};
use wrapper_core::{Result, WrapperError};

use crate::ratelimit::RateLimiter;

/// Default upstream QPS.
pub const DEFAULT_QPS: f32 = 5.0;

/// Default upstream burst.
pub const DEFAULT_BURST: u32 = 10;

/// Connection settings for the upstream API server.
#[derive(Clone, Default)]
pub struct UpstreamConfig {
    /// Base URL, e.g. `https://10.0.0.1:6443`.
    pub server: String,
    /// Bearer token.
    pub token: Option<String>,
    /// PEM encoded CA bundle.
    pub ca_pem: Option<Vec<u8>>,
    /// PEM encoded client certificate followed by its private key.
    pub identity_pem: Option<Vec<u8>>,
    /// Skip server certificate verification.
    pub insecure_skip_tls_verify: bool,
    /// Sustained request rate for informer requests.
    pub qps: f32,
    /// Burst for informer requests.
    pub burst: u32,
}

impl UpstreamConfig {
    /// Settings for `server` with default limits and no credentials.
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            qps: DEFAULT_QPS,
            burst: DEFAULT_BURST,
            ..Default::default()
        }
    }
}

impl std::fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("server", &self.server)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("ca_pem", &self.ca_pem.is_some())
            .field("identity_pem", &self.identity_pem.is_some())
            .field("insecure_skip_tls_verify", &self.insecure_skip_tls_verify)
            .field("qps", &self.qps)
            .field("burst", &self.burst)
            .finish()
    }
}

/// Client for the upstream API server.
#[derive(Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    server: Arc<str>,
    token: Option<Arc<str>>,
    limiter: Arc<RateLimiter>,
}

impl std::fmt::Debug for UpstreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamClient")
            .field("server", &self.server)
            .finish_non_exhaustive()
    }
}

impl UpstreamClient {
    /// Build a client.
    ///
    /// # Errors
    ///
    /// Returns [`WrapperError::Configuration`] if the server URL is empty or
    /// the TLS material cannot be parsed.
    pub fn new(config: UpstreamConfig) -> Result<Self> {
        let server = config.server.trim_end_matches('/');
        if server.is_empty() {
            return Err(WrapperError::Configuration(
                "upstream server URL is required".into(),
            ));
        }

        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .connect_timeout(Duration::from_secs(10))
            .tcp_keepalive(Duration::from_secs(30));

        if let Some(ca) = &config.ca_pem {
            let certs = reqwest::Certificate::from_pem_bundle(ca).map_err(|e| {
                WrapperError::Configuration(format!("invalid certificate authority: {e}"))
            })?;
            if certs.is_empty() {
                return Err(WrapperError::Configuration(
                    "certificate authority contains no certificates".into(),
                ));
            }
            for cert in certs {
                builder = builder.add_root_certificate(cert);
            }
        }
        if let Some(identity) = &config.identity_pem {
            let identity = reqwest::Identity::from_pem(identity).map_err(|e| {
                WrapperError::Configuration(format!("invalid client certificate: {e}"))
            })?;
            builder = builder.identity(identity);
        }
        if config.insecure_skip_tls_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let http = builder
            .build()
            .map_err(|e| WrapperError::Configuration(format!("building http client: {e}")))?;

        debug!(server, qps = config.qps, burst = config.burst, "upstream client configured");

        Ok(Self {
            http,
            server: Arc::from(server),
            token: config.token.map(Arc::from),
            limiter: Arc::new(RateLimiter::new(config.qps, config.burst)),
        })
    }

    /// Base URL of the upstream.
    pub fn server(&self) -> &str {
        &self.server
    }

    /// Absolute URL for a path (with optional query).
    pub fn url(&self, path_and_query: &str) -> String {
        if path_and_query.starts_with('/') {
            format!("{}{}", self.server, path_and_query)
        } else {
            format!("{}/{}", self.server, path_and_query)
        }
    }

    /// A request to the upstream carrying the configured credentials.
    pub fn request(&self, method: Method, path_and_query: &str) -> reqwest::RequestBuilder {
        let builder = self.http.request(method, self.url(path_and_query));
        match &self.token {
            Some(token) => builder.header(AUTHORIZATION, format!("Bearer {token}")),
            None => builder,
        }
    }

    /// GET a JSON document, rate limited.
    pub async fn get_json<T: DeserializeOwned>(&self, path_and_query: &str) -> Result<T> {
        let response = self.send_limited(path_and_query).await?;
        let body = response
            .bytes()
            .await
            .map_err(|e| WrapperError::upstream(format!("reading {path_and_query}"), e))?;
        serde_json::from_slice(&body).map_err(|e| WrapperError::Decoding {
            what: path_and_query.to_string(),
            message: e.to_string(),
        })
    }

    /// Open a streaming GET (a watch), rate limited.
    pub async fn stream(
        &self,
        path_and_query: &str,
    ) -> Result<BoxStream<'static, Result<Bytes>>> {
        let response = self.send_limited(path_and_query).await?;
        let path = path_and_query.to_string();
        Ok(response
            .bytes_stream()
            .map_err(move |e| WrapperError::upstream(format!("streaming {path}"), e))
            .boxed())
    }

    async fn send_limited(&self, path_and_query: &str) -> Result<reqwest::Response> {
        self.limiter.acquire().await;
        trace!(path = path_and_query, "upstream request");

        let response = self
            .request(Method::GET, path_and_query)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| WrapperError::upstream(format!("GET {path_and_query}"), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(WrapperError::UpstreamStatus {
                status: status.as_u16(),
                path: path_and_query.to_string(),
            });
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joining() {
        let client = UpstreamClient::new(UpstreamConfig::new("https://10.0.0.1:6443/")).unwrap();
        assert_eq!(client.server(), "https://10.0.0.1:6443");
        assert_eq!(
            client.url("/api/v1/nodes?watch=1"),
            "https://10.0.0.1:6443/api/v1/nodes?watch=1"
        );
        assert_eq!(client.url("api"), "https://10.0.0.1:6443/api");
    }

    #[test]
    fn test_empty_server_rejected() {
        let err = UpstreamClient::new(UpstreamConfig::new("")).unwrap_err();
        assert!(matches!(err, WrapperError::Configuration(_)));
    }

    #[test]
    fn test_invalid_ca_rejected() {
        let mut config = UpstreamConfig::new("https://example.invalid");
        config.ca_pem = Some(b"not a certificate".to_vec());
        assert!(UpstreamClient::new(config).is_err());
    }

    #[test]
    fn test_debug_redacts_token() {
        let mut config = UpstreamConfig::new("https://example.invalid");
        config.token = Some("secret".to_string());
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("secret"));
    }
}
