//! Stream configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default coalescing window between the first raw event and dispatch.
pub const DEFAULT_LATENCY: Duration = Duration::from_millis(10);

/// Configuration for an event stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Report individual file paths instead of containing directories.
    pub file_events: bool,

    /// How long to keep collecting raw events after the first one before
    /// dispatching the batch.
    pub latency: Duration,
}

impl StreamConfig {
    /// Create a config with the documented defaults.
    pub fn new() -> Self {
        Self {
            file_events: false,
            latency: DEFAULT_LATENCY,
        }
    }

    /// Set file-level granularity.
    pub fn with_file_events(mut self, file_events: bool) -> Self {
        self.file_events = file_events;
        self
    }

    /// Set the coalescing window.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self::new()
    }
}
