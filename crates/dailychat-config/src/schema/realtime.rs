//! Realtime socket tuning.

use serde::{Deserialize, Serialize};

/// WebSocket heartbeat and reconnect settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeSettings {
    pub heartbeat_interval_secs: u64,
    pub reconnect_delay_secs: u64,
    pub max_reconnect_delay_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 25,
            reconnect_delay_secs: 1,
            max_reconnect_delay_secs: 30,
            connect_timeout_secs: 15,
        }
    }
}
