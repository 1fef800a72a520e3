use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const MAX_PEERS: usize = 4095;
pub const MIN_CHANNEL_COUNT: usize = 1;
pub const MAX_CHANNEL_COUNT: usize = 255;
/// Datagrams one `service` pass reads before returning.
pub const MAX_RECEIVES_PER_SERVICE: usize = 256;

/// Per-peer tuning a host applies to every slot, and restores on reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub ping_interval_ms: u32,
    pub timeout_limit: u32,
    pub timeout_min_ms: u32,
    pub timeout_max_ms: u32,
    pub throttle_interval_ms: u32,
    pub throttle_acceleration: u32,
    pub throttle_deceleration: u32,
    /// Unacknowledged datagrams remembered per peer.
    pub ack_window: usize,
    pub max_receives_per_service: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            ping_interval_ms: 500,
            timeout_limit: 32,
            timeout_min_ms: 5000,
            timeout_max_ms: 30000,
            throttle_interval_ms: 5000,
            throttle_acceleration: 2,
            throttle_deceleration: 2,
            ack_window: 256,
            max_receives_per_service: MAX_RECEIVES_PER_SERVICE,
        }
    }
}

impl HostConfig {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms as u64)
    }
}

/// `0` lifts the limit to the maximum.
pub(crate) fn clamp_channel_limit(count: usize) -> usize {
    if count == 0 {
        return MAX_CHANNEL_COUNT;
    }
    count.clamp(MIN_CHANNEL_COUNT, MAX_CHANNEL_COUNT)
}
