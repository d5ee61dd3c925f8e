//! Confirmation gate configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the confirm-before-upload handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationConfig {
    /// Park every pipeline at the upload step until a human approves it.
    #[serde(default)]
    pub enabled: bool,

    /// How long a pending upload waits for a decision (seconds).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// How often a waiting pipeline re-reads the shared store (milliseconds).
    /// Decisions made in another process are only seen through this poll.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_timeout_secs() -> u64 {
    300 // 5 minutes
}

fn default_poll_interval_ms() -> u64 {
    1000
}

impl ConfirmationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_secs: default_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}
