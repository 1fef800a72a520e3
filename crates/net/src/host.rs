use std::collections::VecDeque;
use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hasher};
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::address::Address;
use crate::config::{
    HostConfig, MAX_CHANNEL_COUNT, MAX_PEERS, MIN_CHANNEL_COUNT, clamp_channel_limit,
};
use crate::event::Event;
use crate::packet::{Packet, PacketFlags};
use crate::peer::{Peer, PeerId, PeerState};
use crate::protocol::{self, Command, DatagramHeader, MAX_DATAGRAM_SIZE, PEER_ID_UNASSIGNED};

const SERVICE_POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("failed to bind socket: {0}")]
    Bind(io::Error),
    #[error("socket error: {0}")]
    Io(io::Error),
    #[error("peer count {0} is outside 1..={max}", max = MAX_PEERS)]
    PeerCount(usize),
    #[error("all {0} peer slots are in use")]
    PeerLimit(usize),
    #[error("no peer in slot {0}")]
    InvalidPeer(PeerId),
    #[error("host failed after an earlier socket error")]
    Failed,
}

/// An endpoint with a fixed peer table over one non-blocking UDP socket.
///
/// Nothing happens in the background: queued commands go out on `flush` or
/// `service`, and datagrams are only read by `service`.
pub struct Host {
    socket: UdpSocket,
    local_addr: SocketAddr,
    accepts_incoming: bool,
    peers: Vec<Peer>,
    channel_limit: usize,
    incoming_bandwidth: u32,
    outgoing_bandwidth: u32,
    compress: bool,
    events: VecDeque<Event>,
    receive_budget: usize,
    recv_buffer: [u8; MAX_DATAGRAM_SIZE],
    failed: bool,
}

impl Host {
    /// Binds a host. With no address the host binds an ephemeral port and
    /// refuses inbound connections.
    pub fn create(
        address: Option<Address>,
        peer_count: usize,
        channel_limit: usize,
        incoming_bandwidth: u32,
        outgoing_bandwidth: u32,
    ) -> Result<Self, HostError> {
        Self::with_config(
            address,
            peer_count,
            channel_limit,
            (incoming_bandwidth, outgoing_bandwidth),
            HostConfig::default(),
        )
    }

    pub fn with_config(
        address: Option<Address>,
        peer_count: usize,
        channel_limit: usize,
        bandwidth: (u32, u32),
        config: HostConfig,
    ) -> Result<Self, HostError> {
        if peer_count == 0 || peer_count > MAX_PEERS {
            return Err(HostError::PeerCount(peer_count));
        }

        let accepts_incoming = address.is_some();
        let bind_addr = address.unwrap_or(Address::any()).to_socket_addr();

        let socket = UdpSocket::bind(bind_addr).map_err(HostError::Bind)?;
        socket.set_nonblocking(true).map_err(HostError::Io)?;
        let local_addr = socket.local_addr().map_err(HostError::Io)?;

        let channel_limit = clamp_channel_limit(channel_limit);
        log::debug!(
            "host bound to {} ({} peers, {} channels{})",
            local_addr,
            peer_count,
            channel_limit,
            if accepts_incoming { "" } else { ", client only" }
        );

        Ok(Self {
            socket,
            local_addr,
            accepts_incoming,
            peers: (0..peer_count)
                .map(|id| Peer::new(id as PeerId, config))
                .collect(),
            channel_limit,
            incoming_bandwidth: bandwidth.0,
            outgoing_bandwidth: bandwidth.1,
            compress: false,
            events: VecDeque::new(),
            receive_budget: config.max_receives_per_service.max(1),
            recv_buffer: [0u8; MAX_DATAGRAM_SIZE],
            failed: false,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn peers(&self) -> &[Peer] {
        &self.peers
    }

    pub fn peer(&self, id: PeerId) -> Option<&Peer> {
        self.peers.get(id as usize)
    }

    pub fn peer_mut(&mut self, id: PeerId) -> Option<&mut Peer> {
        self.peers.get_mut(id as usize)
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn channel_limit(&self) -> usize {
        self.channel_limit
    }

    pub fn bandwidth(&self) -> (u32, u32) {
        (self.incoming_bandwidth, self.outgoing_bandwidth)
    }

    pub fn is_compressing(&self) -> bool {
        self.compress
    }

    /// Starts a handshake with `address` in the first free slot. The
    /// `Connect` command leaves on the next flush or service.
    pub fn connect(
        &mut self,
        address: Address,
        channel_count: usize,
        data: u32,
    ) -> Result<PeerId, HostError> {
        if self.failed {
            return Err(HostError::Failed);
        }

        let slot = self
            .peers
            .iter()
            .position(|peer| peer.state() == PeerState::Disconnected)
            .ok_or(HostError::PeerLimit(self.peers.len()))?;

        let channel_count = channel_count.clamp(MIN_CHANNEL_COUNT, MAX_CHANNEL_COUNT);
        let bandwidth = self.bandwidth();
        self.peers[slot].begin_connect(
            address.to_socket_addr(),
            random_session(),
            channel_count,
            data,
            bandwidth,
        );

        log::debug!("peer {} connecting to {}", slot, address);
        Ok(slot as PeerId)
    }

    /// Queues a copy of `packet` to every connected peer.
    pub fn broadcast(&mut self, channel: u8, packet: Packet) {
        for peer in self.peers.iter_mut().filter(|peer| peer.is_connected()) {
            if let Err(err) = peer.send(channel, packet.clone()) {
                log::debug!("broadcast skipped peer {}: {}", peer.id(), err);
            }
        }
    }

    pub fn bandwidth_limit(&mut self, incoming_bandwidth: u32, outgoing_bandwidth: u32) {
        self.incoming_bandwidth = incoming_bandwidth;
        self.outgoing_bandwidth = outgoing_bandwidth;

        for peer in self.peers.iter_mut().filter(|peer| peer.is_connected()) {
            peer.queue(Command::BandwidthLimit {
                incoming_bandwidth,
                outgoing_bandwidth,
            });
        }
    }

    /// Compresses every datagram body this host sends from now on.
    pub fn compress_with_range_coder(&mut self) -> Result<(), HostError> {
        if self.failed {
            return Err(HostError::Failed);
        }
        self.compress = true;
        Ok(())
    }

    /// Sends a `Disconnect` right away and frees the slot. No event is raised
    /// locally.
    pub fn disconnect_now(&mut self, id: PeerId, data: u32) -> Result<(), HostError> {
        let peer = self.peers.get_mut(id as usize).ok_or(HostError::InvalidPeer(id))?;
        if peer.state() == PeerState::Disconnected {
            return Ok(());
        }

        peer.disconnect(data);
        let result = self.flush_peer(id);
        self.peers[id as usize].reset();
        self.check(result)
    }

    /// Pops one already-dispatched event without touching the socket.
    pub fn check_events(&mut self) -> Result<Option<Event>, HostError> {
        if self.failed {
            return Err(HostError::Failed);
        }
        Ok(self.events.pop_front())
    }

    /// Sends queued commands, reads the socket and dispatches at most one
    /// event, waiting up to `timeout` for one to arrive.
    pub fn service(&mut self, timeout: Duration) -> Result<Option<Event>, HostError> {
        if self.failed {
            return Err(HostError::Failed);
        }
        if let Some(event) = self.events.pop_front() {
            return Ok(Some(event));
        }

        let deadline = Instant::now() + timeout;
        loop {
            let result = self.pump();
            self.check(result)?;

            if let Some(event) = self.events.pop_front() {
                return Ok(Some(event));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            std::thread::sleep((deadline - now).min(SERVICE_POLL_INTERVAL));
        }
    }

    /// Sends every queued command without reading the socket.
    pub fn flush(&mut self) -> Result<(), HostError> {
        if self.failed {
            return Err(HostError::Failed);
        }
        let result = self.flush_all();
        self.check(result)
    }

    /// Puts the host into the failed state a socket error leaves behind.
    #[cfg(any(test, feature = "test-util"))]
    pub fn fail(&mut self) {
        self.failed = true;
    }

    fn check(&mut self, result: Result<(), HostError>) -> Result<(), HostError> {
        if let Err(err) = &result {
            log::warn!("host {} failed: {}", self.local_addr, err);
            self.failed = true;
        }
        result
    }

    fn pump(&mut self) -> Result<(), HostError> {
        self.flush_all()?;
        self.keepalive(Instant::now());
        self.receive()?;
        self.flush_all()
    }

    fn flush_all(&mut self) -> Result<(), HostError> {
        for id in 0..self.peers.len() {
            self.flush_peer(id as PeerId)?;
        }
        Ok(())
    }

    fn flush_peer(&mut self, id: PeerId) -> Result<(), HostError> {
        let peer = &mut self.peers[id as usize];
        let Some(address) = peer.address() else {
            return Ok(());
        };

        loop {
            while let Some(command) = peer.take_outgoing() {
                let header = peer.next_header();
                match protocol::encode(header, &command, self.compress) {
                    Ok(data) => send_datagram(&self.socket, &data, address)?,
                    Err(err) => log::warn!("dropped command for peer {}: {}", id, err),
                }
            }

            if peer.state() != PeerState::DisconnectLater {
                return Ok(());
            }
            peer.settle_disconnect_later();
        }
    }

    fn keepalive(&mut self, now: Instant) {
        for peer in &mut self.peers {
            if peer.is_timed_out(now) {
                log::debug!("peer {} timed out ({})", peer.id(), peer.state().as_str());
                let id = peer.id();
                peer.reset();
                self.events.push_back(Event::Disconnect { peer: id, data: 0 });
            } else if peer.needs_ping(now) {
                peer.ping();
            }
        }
    }

    fn receive(&mut self) -> Result<(), HostError> {
        for _ in 0..self.receive_budget {
            match self.socket.recv_from(&mut self.recv_buffer) {
                Ok((size, from)) => {
                    let decoded = protocol::decode(&self.recv_buffer[..size]);
                    match decoded {
                        Ok((header, command)) => self.dispatch(from, header, command)?,
                        Err(err) => log::debug!("dropped datagram from {}: {}", from, err),
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                // ICMP unreachable from an earlier send, on platforms that report it
                Err(ref e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionRefused
                    ) =>
                {
                    continue;
                }
                Err(e) => return Err(HostError::Io(e)),
            }
        }
        Ok(())
    }

    fn dispatch(
        &mut self,
        from: SocketAddr,
        header: DatagramHeader,
        command: Command,
    ) -> Result<(), HostError> {
        if header.peer_id == PEER_ID_UNASSIGNED {
            if let Command::Connect {
                peer_id,
                channel_count,
                incoming_bandwidth,
                outgoing_bandwidth,
                data,
            } = command
            {
                self.accept(
                    from,
                    &header,
                    peer_id,
                    channel_count as usize,
                    (incoming_bandwidth, outgoing_bandwidth),
                    data,
                );
            }
            return Ok(());
        }

        let id = header.peer_id;
        let Some(peer) = self.peers.get_mut(id as usize) else {
            return Ok(());
        };
        if !peer.matches(from, header.session) {
            log::debug!("dropped datagram from {} for stale slot {}", from, id);
            return Ok(());
        }
        if !peer.on_datagram(&header) {
            return Ok(());
        }

        match command {
            Command::VerifyConnect {
                peer_id,
                channel_count,
                incoming_bandwidth,
                outgoing_bandwidth,
            } => {
                if peer.state() == PeerState::Connecting {
                    peer.complete_connect(
                        peer_id,
                        channel_count as usize,
                        (incoming_bandwidth, outgoing_bandwidth),
                    );
                    log::debug!("peer {} connected to {}", id, from);
                    self.events.push_back(Event::Connect { peer: id, data: 0 });
                }
            }
            Command::Disconnect { data } => {
                peer.queue(Command::DisconnectAck);
                let result = self.flush_peer(id);
                self.peers[id as usize].reset();
                log::debug!("peer {} disconnected by remote", id);
                self.events.push_back(Event::Disconnect { peer: id, data });
                return result;
            }
            Command::DisconnectAck => {
                if peer.state() == PeerState::Disconnecting {
                    peer.reset();
                    log::debug!("peer {} disconnected", id);
                    self.events.push_back(Event::Disconnect { peer: id, data: 0 });
                }
            }
            Command::Ping => peer.queue(Command::Pong),
            Command::Pong => {}
            Command::BandwidthLimit {
                incoming_bandwidth,
                outgoing_bandwidth,
            } => peer.set_remote_bandwidth(incoming_bandwidth, outgoing_bandwidth),
            Command::ThrottleConfigure {
                interval_ms,
                acceleration,
                deceleration,
            } => log::trace!(
                "peer {} throttle {}ms +{} -{}",
                id,
                interval_ms,
                acceleration,
                deceleration
            ),
            Command::Send {
                channel,
                flags,
                channel_sequence,
                payload,
            } => {
                if !matches!(
                    peer.state(),
                    PeerState::Connected | PeerState::DisconnectLater
                ) {
                    return Ok(());
                }

                let flags = PacketFlags::from_bits_truncate(flags);
                if !peer.admit(channel, flags, channel_sequence) {
                    log::trace!("dropped stale payload on channel {} from peer {}", channel, id);
                    return Ok(());
                }

                match Packet::from_vec(payload, flags) {
                    Ok(packet) => self.events.push_back(Event::Receive {
                        peer: id,
                        channel,
                        packet,
                    }),
                    Err(err) => log::debug!("dropped payload from peer {}: {}", id, err),
                }
            }
            Command::Connect { .. } => {}
        }

        Ok(())
    }

    fn accept(
        &mut self,
        from: SocketAddr,
        header: &DatagramHeader,
        remote_id: u16,
        channel_count: usize,
        remote_bandwidth: (u32, u32),
        data: u32,
    ) {
        if !self.accepts_incoming {
            log::debug!("refused connect from {}: client-only host", from);
            return;
        }
        if self
            .peers
            .iter()
            .any(|peer| peer.matches(from, header.session))
        {
            return;
        }

        let Some(slot) = self
            .peers
            .iter()
            .position(|peer| peer.state() == PeerState::Disconnected)
        else {
            log::debug!("refused connect from {}: peer table full", from);
            return;
        };

        let channel_count = channel_count
            .clamp(MIN_CHANNEL_COUNT, MAX_CHANNEL_COUNT)
            .min(self.channel_limit);
        let bandwidth = self.bandwidth();

        let peer = &mut self.peers[slot];
        peer.accept(
            from,
            header.session,
            remote_id,
            channel_count,
            remote_bandwidth,
            bandwidth,
        );
        peer.on_datagram(header);

        log::debug!("peer {} connected from {}", slot, from);
        self.events.push_back(Event::Connect {
            peer: slot as PeerId,
            data,
        });
    }
}

fn send_datagram(socket: &UdpSocket, data: &[u8], address: SocketAddr) -> Result<(), HostError> {
    match socket.send_to(data, address) {
        Ok(_) => Ok(()),
        Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
            log::debug!("socket busy, dropped datagram to {}", address);
            Ok(())
        }
        Err(e) => Err(HostError::Io(e)),
    }
}

fn random_session() -> u32 {
    let mut hasher = RandomState::new().build_hasher();
    hasher.write_u128(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos())
            .unwrap_or_default(),
    );
    hasher.finish() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn loopback() -> Option<Address> {
        Some(Address::new(Ipv4Addr::LOCALHOST, 0))
    }

    #[test]
    fn test_peer_count_bounds() {
        assert!(matches!(
            Host::create(loopback(), 0, 1, 0, 0),
            Err(HostError::PeerCount(0))
        ));
        assert!(matches!(
            Host::create(loopback(), MAX_PEERS + 1, 1, 0, 0),
            Err(HostError::PeerCount(_))
        ));
    }

    #[test]
    fn test_channel_limit_zero_means_max() {
        let host = Host::create(loopback(), 1, 0, 0, 0).unwrap();
        assert_eq!(host.channel_limit(), MAX_CHANNEL_COUNT);
    }

    #[test]
    fn test_connect_fills_peer_table() {
        let mut host = Host::create(None, 2, 1, 0, 0).unwrap();
        let target = Address::new(Ipv4Addr::LOCALHOST, 9);

        assert_eq!(host.connect(target, 1, 0).unwrap(), 0);
        assert_eq!(host.connect(target, 1, 0).unwrap(), 1);
        assert!(matches!(
            host.connect(target, 1, 0),
            Err(HostError::PeerLimit(2))
        ));
        assert_eq!(host.peer(0).unwrap().state(), PeerState::Connecting);
    }

    #[test]
    fn test_connect_clamps_channel_count() {
        let mut host = Host::create(None, 2, 1, 0, 0).unwrap();
        let target = Address::new(Ipv4Addr::LOCALHOST, 9);

        let low = host.connect(target, 0, 0).unwrap();
        let high = host.connect(target, 1000, 0).unwrap();
        assert_eq!(host.peer(low).unwrap().channel_count(), MIN_CHANNEL_COUNT);
        assert_eq!(host.peer(high).unwrap().channel_count(), MAX_CHANNEL_COUNT);
    }

    #[test]
    fn test_idle_host_has_no_events() {
        let mut host = Host::create(loopback(), 4, 1, 0, 0).unwrap();

        let start = Instant::now();
        for _ in 0..50 {
            assert!(host.check_events().unwrap().is_none());
            assert!(host.service(Duration::ZERO).unwrap().is_none());
        }
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_disconnect_now_frees_slot_silently() {
        let mut host = Host::create(None, 1, 1, 0, 0).unwrap();
        let target = Address::new(Ipv4Addr::LOCALHOST, 9);

        let peer = host.connect(target, 1, 0).unwrap();
        host.disconnect_now(peer, 3).unwrap();

        assert_eq!(host.peer(peer).unwrap().state(), PeerState::Disconnected);
        assert!(host.check_events().unwrap().is_none());
        assert!(matches!(
            host.disconnect_now(7, 0),
            Err(HostError::InvalidPeer(7))
        ));
    }

    #[test]
    fn test_bandwidth_limit_updates_host() {
        let mut host = Host::create(None, 1, 1, 0, 0).unwrap();
        host.bandwidth_limit(57_600, 14_400);
        assert_eq!(host.bandwidth(), (57_600, 14_400));
    }

    fn connected_pair(config: HostConfig) -> (Host, Host, PeerId) {
        let mut server = Host::with_config(loopback(), 1, 1, (0, 0), config).unwrap();
        let mut client = Host::create(None, 1, 1, 0, 0).unwrap();
        let target = match server.local_addr() {
            SocketAddr::V4(v4) => Address::from(v4),
            SocketAddr::V6(v6) => panic!("unexpected IPv6 bind {}", v6),
        };

        let peer = client.connect(target, 1, 0).unwrap();
        let start = Instant::now();
        while !client.peer(peer).unwrap().is_connected() {
            assert!(start.elapsed() < Duration::from_secs(1), "handshake timed out");
            client.flush().unwrap();
            server.service(Duration::ZERO).unwrap();
            client.service(Duration::ZERO).unwrap();
            std::thread::sleep(Duration::from_millis(1));
        }
        server.events.clear();
        (server, client, peer)
    }

    #[test]
    fn test_service_reads_a_bounded_batch() {
        let config = HostConfig {
            max_receives_per_service: 8,
            ..HostConfig::default()
        };
        let (mut server, mut client, peer) = connected_pair(config);

        for _ in 0..20 {
            let packet = Packet::create(b"x", PacketFlags::UNSEQUENCED).unwrap();
            client.peer_mut(peer).unwrap().send(0, packet).unwrap();
        }
        client.flush().unwrap();
        std::thread::sleep(Duration::from_millis(20));

        assert!(server.service(Duration::ZERO).unwrap().is_some());
        assert_eq!(server.events.len(), 7);

        let mut received = 1;
        let start = Instant::now();
        while received < 20 && start.elapsed() < Duration::from_secs(1) {
            if server.service(Duration::ZERO).unwrap().is_some() {
                received += 1;
            }
        }
        assert_eq!(received, 20);
    }

    #[test]
    fn test_failure_is_sticky() {
        let mut host = Host::create(None, 1, 1, 0, 0).unwrap();
        host.fail();

        assert!(matches!(host.check_events(), Err(HostError::Failed)));
        assert!(matches!(host.service(Duration::ZERO), Err(HostError::Failed)));
        assert!(matches!(host.flush(), Err(HostError::Failed)));
        assert!(host.compress_with_range_coder().is_err());
    }

    #[test]
    fn test_compression_toggle() {
        let mut host = Host::create(None, 1, 1, 0, 0).unwrap();
        assert!(!host.is_compressing());
        host.compress_with_range_coder().unwrap();
        assert!(host.is_compressing());
    }
}
