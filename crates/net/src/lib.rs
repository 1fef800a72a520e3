//! A thin connection-oriented UDP engine: hosts with a fixed peer table,
//! numbered channels, and polled events.
//!
//! Delivery is at most once. Sequenced traffic drops stale payloads per
//! channel; nothing is retransmitted.

pub mod address;
pub mod config;
pub mod event;
pub mod host;
pub mod packet;
pub mod peer;
pub mod protocol;
mod tracking;

pub use address::{Address, HOST_ANY, PORT_ANY, ResolveError};
pub use config::{
    HostConfig, MAX_CHANNEL_COUNT, MAX_PEERS, MAX_RECEIVES_PER_SERVICE, MIN_CHANNEL_COUNT,
};
pub use event::{Event, EventType};
pub use host::{Host, HostError};
pub use packet::{MAX_PACKET_PAYLOAD, Packet, PacketError, PacketFlags};
pub use peer::{Peer, PeerId, PeerState, SendError, Throttle};
pub use protocol::ProtocolError;
pub use tracking::{DEFAULT_ROUND_TRIP_TIME_MS, PACKET_LOSS_SCALE};
