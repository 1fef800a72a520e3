use serde::{Deserialize, Serialize};
use udplink::HostConfig;

use crate::packet::PACKET_FLAG_RELIABLE;

/// Defaults the binding fills in for omitted trailing arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindingConfig {
    /// Name the namespace is registered under.
    pub namespace: String,
    pub default_channel: u8,
    pub default_flag: i64,
    pub default_data: u32,
    pub connect_channel_count: usize,
    pub peer_count: usize,
    pub channel_limit: usize,
    pub incoming_bandwidth: u32,
    pub outgoing_bandwidth: u32,
    /// Engine tuning applied to every host the factory creates.
    pub host: HostConfig,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            namespace: "udp".to_string(),
            default_channel: 0,
            default_flag: PACKET_FLAG_RELIABLE,
            default_data: 0,
            connect_channel_count: 1,
            peer_count: 64,
            channel_limit: 1,
            incoming_bandwidth: 0,
            outgoing_bandwidth: 0,
            host: HostConfig::default(),
        }
    }
}
