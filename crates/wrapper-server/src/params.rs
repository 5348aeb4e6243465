//! List/watch query parameters.

use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

/// Query parameters understood by the cached collection handlers.
///
/// Anything else on the query string (`resourceVersion`, `labelSelector`,
/// ...) is accepted and ignored: the cache always answers from its current
/// state.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    /// `watch`: any non-empty value other than `false`/`0` requests a watch.
    #[serde(default)]
    pub watch: Option<String>,
    /// `timeoutSeconds`: watch duration.
    #[serde(default)]
    pub timeout_seconds: Option<String>,
}

impl ListParams {
    /// Whether the request asks for a watch stream.
    pub fn is_watch(&self) -> bool {
        match self.watch.as_deref().map(str::trim) {
            None | Some("") => false,
            Some(value) => !(value.eq_ignore_ascii_case("false") || value == "0"),
        }
    }

    /// Watch duration, falling back to `default` when the parameter is
    /// absent, zero or not a number.
    pub fn timeout(&self, default: Duration) -> Duration {
        let Some(raw) = self.timeout_seconds.as_deref() else {
            return default;
        };
        match raw.trim().parse::<u64>() {
            Ok(0) => default,
            Ok(secs) => Duration::from_secs(secs),
            Err(e) => {
                debug!(value = %raw, error = %e, "ignoring invalid timeoutSeconds");
                default
            }
        }
    }
}
