//! Structured option values parsed from a single command line flag.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::WrapperError;

const OPTION_NAME: &str = "service-autonomy-enhancement";

/// Options for the service autonomy enhancement (local node-health override).
///
/// Parsed from a comma separated `key=value` list:
///
/// ```rust
/// use std::time::Duration;
/// use wrapper_core::AutonomyOptions;
///
/// let opts: AutonomyOptions = "enabled=true,address=http://127.0.0.1:51005/localinfo,interval=10"
///     .parse()
///     .unwrap();
/// assert!(opts.enabled);
/// assert_eq!(opts.interval, Duration::from_secs(10));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AutonomyOptions {
    /// Whether the health override is active.
    pub enabled: bool,
    /// URL answering with a JSON map of node name to health.
    pub address: String,
    /// Poll interval.
    pub interval: Duration,
}

impl Default for AutonomyOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "http://127.0.0.1:51005/localinfo".to_string(),
            interval: Duration::from_secs(5),
        }
    }
}

impl FromStr for AutonomyOptions {
    type Err = WrapperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut opts = Self::default();

        for pair in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').ok_or_else(|| invalid(format!(
                "expected key=value, got {pair:?}"
            )))?;

            match key.trim() {
                "enabled" => {
                    opts.enabled = value
                        .trim()
                        .parse()
                        .map_err(|_| invalid(format!("enabled must be a bool, got {value:?}")))?;
                }
                "address" => opts.address = value.trim().to_string(),
                "interval" => {
                    let secs: u64 = value
                        .trim()
                        .parse()
                        .map_err(|_| invalid(format!("interval must be seconds, got {value:?}")))?;
                    if secs == 0 {
                        return Err(invalid("interval must be positive".to_string()));
                    }
                    opts.interval = Duration::from_secs(secs);
                }
                other => return Err(invalid(format!("unknown key {other:?}"))),
            }
        }

        if opts.enabled && opts.address.is_empty() {
            return Err(invalid("address is required when enabled".to_string()));
        }

        Ok(opts)
    }
}

impl fmt::Display for AutonomyOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "enabled={},address={},interval={}",
            self.enabled,
            self.address,
            self.interval.as_secs()
        )
    }
}

fn invalid(reason: String) -> WrapperError {
    WrapperError::InvalidOption {
        option: OPTION_NAME.to_string(),
        reason,
    }
}
