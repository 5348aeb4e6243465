//! Cache configuration.

/// Default per-subscriber queue length.
pub const DEFAULT_NOTIFY_CHANNEL_SIZE: usize = 100;

/// Configuration for a [`ResourceCache`](crate::ResourceCache).
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Name of the node this process runs on. Topology filtering compares
    /// every endpoint's node against this node's labels.
    pub host_name: String,
    /// Number of events each watch subscriber may buffer before further
    /// events are dropped for it.
    pub notify_channel_size: usize,
}

impl CacheConfig {
    /// Configuration for `host_name` with default settings.
    pub fn new(host_name: impl Into<String>) -> Self {
        Self {
            host_name: host_name.into(),
            notify_channel_size: DEFAULT_NOTIFY_CHANNEL_SIZE,
        }
    }

    /// Set the per-subscriber queue length.
    #[must_use]
    pub fn with_notify_channel_size(mut self, size: usize) -> Self {
        self.notify_channel_size = size.max(1);
        self
    }
}
