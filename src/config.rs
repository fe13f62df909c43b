// src/config.rs

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default pause between two render passes.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(100);
/// Default capacity of each tracked line's message queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 20;

/// Tuning knobs for a [`crate::manager::Manager`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerOptions {
    pub refresh_interval: Duration,
    /// Intermediate progress is dropped once this many messages are pending.
    pub queue_capacity: usize,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl ManagerOptions {
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Clamps values that would stall the ticker or the queues.
    pub(crate) fn normalized(mut self) -> Self {
        self.refresh_interval = self.refresh_interval.max(Duration::from_millis(1));
        self.queue_capacity = self.queue_capacity.max(1);
        self
    }
}
