//! Background persistence settings

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for the optimistic write pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Upper bound for a single persistence call, in milliseconds.
    /// A call that exceeds it is treated as failed and reconciled.
    #[serde(default = "default_persist_timeout_ms")]
    pub persist_timeout_ms: u64,

    /// Number of sync notices buffered for slow subscribers
    #[serde(default = "default_notice_capacity")]
    pub notice_capacity: usize,
}

fn default_persist_timeout_ms() -> u64 {
    5_000
}

fn default_notice_capacity() -> usize {
    64
}

impl SyncConfig {
    /// Persistence timeout as a `Duration`
    pub fn persist_timeout(&self) -> Duration {
        Duration::from_millis(self.persist_timeout_ms)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            persist_timeout_ms: default_persist_timeout_ms(),
            notice_capacity: default_notice_capacity(),
        }
    }
}
