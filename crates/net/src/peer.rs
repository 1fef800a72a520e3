use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::config::HostConfig;
use crate::packet::{Packet, PacketFlags};
use crate::protocol::{Command, DatagramHeader, PEER_ID_UNASSIGNED, sequence_greater_than};
use crate::tracking::{AckWindow, ReceiveWindow};

/// Slot of a peer in its host's peer table.
pub type PeerId = u16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Disconnected,
    Connecting,
    Connected,
    DisconnectLater,
    Disconnecting,
}

impl PeerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeerState::Disconnected => "disconnected",
            PeerState::Connecting => "connecting",
            PeerState::Connected => "connected",
            PeerState::DisconnectLater => "disconnect_later",
            PeerState::Disconnecting => "disconnecting",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Throttle {
    pub interval_ms: u32,
    pub acceleration: u32,
    pub deceleration: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("peer is {0}, not connected")]
    NotConnected(&'static str),
    #[error("channel {channel} is out of range for {channel_count} channels")]
    InvalidChannel { channel: u8, channel_count: usize },
}

#[derive(Debug, Clone, Copy, Default)]
struct Channel {
    outgoing_sequence: u32,
    incoming_sequence: Option<u32>,
}

/// One slot of a host's peer table.
///
/// Slots are allocated when the host is created and reused across
/// connections; a `PeerId` stays valid for the lifetime of its host.
#[derive(Debug)]
pub struct Peer {
    id: PeerId,
    config: HostConfig,
    state: PeerState,
    address: Option<SocketAddr>,
    remote_id: u16,
    session: u32,
    channels: Vec<Channel>,
    incoming_bandwidth: u32,
    outgoing_bandwidth: u32,
    outgoing: VecDeque<Command>,
    send_sequence: u32,
    acks: AckWindow,
    received: ReceiveWindow,
    ping_interval: Duration,
    timeout_limit: u32,
    timeout_min: Duration,
    timeout_max: Duration,
    throttle: Throttle,
    last_send: Instant,
    last_receive: Instant,
    disconnect_data: u32,
}

impl Peer {
    pub(crate) fn new(id: PeerId, config: HostConfig) -> Self {
        let now = Instant::now();
        Self {
            id,
            config,
            state: PeerState::Disconnected,
            address: None,
            remote_id: PEER_ID_UNASSIGNED,
            session: 0,
            channels: Vec::new(),
            incoming_bandwidth: 0,
            outgoing_bandwidth: 0,
            outgoing: VecDeque::new(),
            send_sequence: 0,
            acks: AckWindow::new(config.ack_window),
            received: ReceiveWindow::new(),
            ping_interval: config.ping_interval(),
            timeout_limit: config.timeout_limit,
            timeout_min: Duration::from_millis(config.timeout_min_ms as u64),
            timeout_max: Duration::from_millis(config.timeout_max_ms as u64),
            throttle: Throttle {
                interval_ms: config.throttle_interval_ms,
                acceleration: config.throttle_acceleration,
                deceleration: config.throttle_deceleration,
            },
            last_send: now,
            last_receive: now,
            disconnect_data: 0,
        }
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn state(&self) -> PeerState {
        self.state
    }

    pub fn address(&self) -> Option<SocketAddr> {
        self.address
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Downstream bandwidth the remote announced, in bytes/second. 0 is unlimited.
    pub fn incoming_bandwidth(&self) -> u32 {
        self.incoming_bandwidth
    }

    /// Upstream bandwidth the remote announced, in bytes/second. 0 is unlimited.
    pub fn outgoing_bandwidth(&self) -> u32 {
        self.outgoing_bandwidth
    }

    /// Mean datagram loss in units of `PACKET_LOSS_SCALE`.
    pub fn packet_loss(&self) -> u32 {
        self.acks.packet_loss()
    }

    /// Smoothed round-trip time in milliseconds.
    pub fn round_trip_time(&self) -> u32 {
        self.acks.round_trip_time()
    }

    pub fn round_trip_time_variance(&self) -> u32 {
        self.acks.round_trip_variance()
    }

    pub fn ping_interval_ms(&self) -> u32 {
        self.ping_interval.as_millis() as u32
    }

    pub fn throttle(&self) -> Throttle {
        self.throttle
    }

    pub fn timeouts(&self) -> (u32, Duration, Duration) {
        (self.timeout_limit, self.timeout_min, self.timeout_max)
    }

    pub fn is_connected(&self) -> bool {
        self.state == PeerState::Connected
    }

    /// Queues `packet` on `channel`. The packet is consumed either way.
    pub fn send(&mut self, channel: u8, packet: Packet) -> Result<(), SendError> {
        if self.state != PeerState::Connected {
            return Err(SendError::NotConnected(self.state.as_str()));
        }

        let channel_count = self.channels.len();
        let Some(state) = self.channels.get_mut(channel as usize) else {
            return Err(SendError::InvalidChannel {
                channel,
                channel_count,
            });
        };

        let flags = packet.flags();
        let channel_sequence = if flags.is_sequenced() {
            state.outgoing_sequence = state.outgoing_sequence.wrapping_add(1);
            state.outgoing_sequence
        } else {
            0
        };

        self.outgoing.push_back(Command::Send {
            channel,
            flags: flags.bits(),
            channel_sequence,
            payload: packet.into_data(),
        });
        Ok(())
    }

    /// Asks the remote to disconnect. A `Disconnect` event follows once the
    /// remote acknowledges, or the peer times out.
    pub fn disconnect(&mut self, data: u32) {
        match self.state {
            PeerState::Disconnected | PeerState::Disconnecting => {}
            PeerState::Connecting | PeerState::Connected | PeerState::DisconnectLater => {
                self.outgoing.clear();
                self.outgoing.push_back(Command::Disconnect { data });
                self.state = PeerState::Disconnecting;
            }
        }
    }

    /// Disconnects once every queued command has been sent.
    pub fn disconnect_later(&mut self, data: u32) {
        if self.state == PeerState::Connected && !self.outgoing.is_empty() {
            self.state = PeerState::DisconnectLater;
            self.disconnect_data = data;
        } else {
            self.disconnect(data);
        }
    }

    pub fn ping(&mut self) {
        if self.state == PeerState::Connected {
            self.outgoing.push_back(Command::Ping);
        }
    }

    /// `0` restores the default interval.
    pub fn ping_interval(&mut self, interval_ms: u32) {
        self.ping_interval = if interval_ms == 0 {
            self.config.ping_interval()
        } else {
            Duration::from_millis(interval_ms as u64)
        };
    }

    /// Any `0` argument restores that default.
    pub fn timeout(&mut self, limit: u32, min_ms: u32, max_ms: u32) {
        let or_default = |value: u32, default: u32| if value == 0 { default } else { value };

        self.timeout_limit = or_default(limit, self.config.timeout_limit);
        self.timeout_min =
            Duration::from_millis(or_default(min_ms, self.config.timeout_min_ms) as u64);
        self.timeout_max =
            Duration::from_millis(or_default(max_ms, self.config.timeout_max_ms) as u64);
    }

    pub fn throttle_configure(&mut self, interval_ms: u32, acceleration: u32, deceleration: u32) {
        self.throttle = Throttle {
            interval_ms,
            acceleration,
            deceleration,
        };

        if self.state == PeerState::Connected {
            self.outgoing.push_back(Command::ThrottleConfigure {
                interval_ms,
                acceleration,
                deceleration,
            });
        }
    }

    /// Drops the connection without notifying the remote or raising an event.
    pub fn reset(&mut self) {
        if self.state != PeerState::Disconnected {
            log::debug!("peer {} reset ({})", self.id, self.state.as_str());
        }
        *self = Peer::new(self.id, self.config);
    }

    pub(crate) fn begin_connect(
        &mut self,
        address: SocketAddr,
        session: u32,
        channel_count: usize,
        data: u32,
        host_bandwidth: (u32, u32),
    ) {
        self.reset();
        self.state = PeerState::Connecting;
        self.address = Some(address);
        self.session = session;
        self.channels = vec![Channel::default(); channel_count];
        self.outgoing.push_back(Command::Connect {
            peer_id: self.id,
            channel_count: channel_count as u32,
            incoming_bandwidth: host_bandwidth.0,
            outgoing_bandwidth: host_bandwidth.1,
            data,
        });
    }

    pub(crate) fn accept(
        &mut self,
        address: SocketAddr,
        session: u32,
        remote_id: u16,
        channel_count: usize,
        remote_bandwidth: (u32, u32),
        host_bandwidth: (u32, u32),
    ) {
        self.reset();
        self.state = PeerState::Connected;
        self.address = Some(address);
        self.session = session;
        self.remote_id = remote_id;
        self.channels = vec![Channel::default(); channel_count];
        (self.incoming_bandwidth, self.outgoing_bandwidth) = remote_bandwidth;
        self.outgoing.push_back(Command::VerifyConnect {
            peer_id: self.id,
            channel_count: channel_count as u32,
            incoming_bandwidth: host_bandwidth.0,
            outgoing_bandwidth: host_bandwidth.1,
        });
    }

    pub(crate) fn complete_connect(
        &mut self,
        remote_id: u16,
        channel_count: usize,
        remote_bandwidth: (u32, u32),
    ) {
        self.state = PeerState::Connected;
        self.remote_id = remote_id;
        self.channels.truncate(channel_count.max(1));
        (self.incoming_bandwidth, self.outgoing_bandwidth) = remote_bandwidth;
    }

    pub(crate) fn set_remote_bandwidth(&mut self, incoming: u32, outgoing: u32) {
        self.incoming_bandwidth = incoming;
        self.outgoing_bandwidth = outgoing;
    }

    pub(crate) fn matches(&self, address: SocketAddr, session: u32) -> bool {
        self.state != PeerState::Disconnected
            && self.address == Some(address)
            && self.session == session
    }

    pub(crate) fn queue(&mut self, command: Command) {
        self.outgoing.push_back(command);
    }

    pub(crate) fn take_outgoing(&mut self) -> Option<Command> {
        self.outgoing.pop_front()
    }

    /// Stamps the next outgoing datagram and starts tracking its ack.
    pub(crate) fn next_header(&mut self) -> DatagramHeader {
        let sequence = self.send_sequence;
        self.send_sequence = self.send_sequence.wrapping_add(1);

        let (ack, ack_bitfield) = self.received.ack_data();
        self.acks.on_sent(sequence);
        self.last_send = Instant::now();

        DatagramHeader::new(self.remote_id, self.session, sequence, ack, ack_bitfield)
    }

    /// Returns false for a duplicate datagram.
    pub(crate) fn on_datagram(&mut self, header: &DatagramHeader) -> bool {
        if !self.received.record(header.sequence) {
            return false;
        }
        self.acks.on_ack(header.ack, header.ack_bitfield);
        self.last_receive = Instant::now();
        true
    }

    /// Returns false if the payload should be dropped: unknown channel, or a
    /// sequenced payload older than one already delivered on its channel.
    pub(crate) fn admit(&mut self, channel: u8, flags: PacketFlags, channel_sequence: u32) -> bool {
        let Some(state) = self.channels.get_mut(channel as usize) else {
            return false;
        };

        if !flags.is_sequenced() {
            return true;
        }

        match state.incoming_sequence {
            Some(last) if !sequence_greater_than(channel_sequence, last) => false,
            _ => {
                state.incoming_sequence = Some(channel_sequence);
                true
            }
        }
    }

    /// Moves a `DisconnectLater` peer on once its queue has drained.
    pub(crate) fn settle_disconnect_later(&mut self) {
        if self.state == PeerState::DisconnectLater && self.outgoing.is_empty() {
            self.state = PeerState::Connected;
            self.disconnect(self.disconnect_data);
        }
    }

    pub(crate) fn needs_ping(&self, now: Instant) -> bool {
        self.state == PeerState::Connected
            && self.outgoing.is_empty()
            && now.duration_since(self.last_send) >= self.ping_interval
    }

    pub(crate) fn is_timed_out(&self, now: Instant) -> bool {
        if self.state == PeerState::Disconnected {
            return false;
        }

        let silent = now.duration_since(self.last_receive);
        let limit = Duration::from_millis(self.round_trip_time() as u64 * self.timeout_limit as u64);

        silent >= self.timeout_max || (silent >= self.timeout_min && silent >= limit)
    }
}
