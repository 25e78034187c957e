//! Session timing policy.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default TCP port of the eISCP service.
pub const DEFAULT_PORT: u16 = 60128;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Minimum spacing between commands issued by macros and status
    /// refreshes. Sending faster than ~200 ms desyncs most receivers.
    pub command_interval_ms: u64,
    /// Time budget shared by all steps of one macro.
    pub macro_timeout_ms: u64,
    /// Depth of the outbound frame queue.
    pub write_queue: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            command_interval_ms: 200,
            macro_timeout_ms: 10_000,
            write_queue: 64,
        }
    }
}

impl SessionConfig {
    pub fn command_interval(&self) -> Duration {
        Duration::from_millis(self.command_interval_ms)
    }

    pub fn macro_timeout(&self) -> Duration {
        Duration::from_millis(self.macro_timeout_ms)
    }
}
