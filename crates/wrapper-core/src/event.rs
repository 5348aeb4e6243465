//! Watch event kinds.

use std::fmt;

/// The kind of change a watch event reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventType {
    /// Object was created (or is part of an initial snapshot).
    Added,
    /// Object was changed.
    Modified,
    /// Object was removed.
    Deleted,
}

impl EventType {
    /// Wire name used by the Kubernetes watch protocol.
    pub const fn as_str(&self) -> &'static str {
        match self {
            EventType::Added => "ADDED",
            EventType::Modified => "MODIFIED",
            EventType::Deleted => "DELETED",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
