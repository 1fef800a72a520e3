use std::net::{Ipv4Addr, SocketAddr};
use std::thread;
use std::time::{Duration, Instant};

use udplink::{Address, Event, Host, Packet, PacketFlags, PeerId, PeerState};

fn address_of(host: &Host) -> Address {
    match host.local_addr() {
        SocketAddr::V4(v4) => Address::from(v4),
        SocketAddr::V6(v6) => panic!("unexpected IPv6 bind {}", v6),
    }
}

fn server() -> Host {
    Host::create(Some(Address::new(Ipv4Addr::LOCALHOST, 0)), 8, 4, 0, 0).unwrap()
}

fn client() -> Host {
    Host::create(None, 1, 4, 0, 0).unwrap()
}

/// Services `host` until it yields an event, flushing `other` in between so
/// its queued commands reach `host`.
fn wait_for_event(host: &mut Host, other: &mut Host, timeout_ms: u64) -> Option<Event> {
    let start = Instant::now();
    while start.elapsed() < Duration::from_millis(timeout_ms) {
        other.flush().unwrap();
        if let Some(event) = host.service(Duration::ZERO).unwrap() {
            return Some(event);
        }
        thread::sleep(Duration::from_millis(1));
    }
    None
}

fn connect_pair(server: &mut Host, client: &mut Host, data: u32) -> (PeerId, PeerId) {
    let client_peer = client.connect(address_of(server), 4, data).unwrap();

    let server_peer = match wait_for_event(server, client, 500) {
        Some(Event::Connect { peer, data: received }) => {
            assert_eq!(received, data);
            peer
        }
        other => panic!("expected connect on server, got {:?}", other),
    };

    match wait_for_event(client, server, 500) {
        Some(Event::Connect { peer, data: 0 }) => assert_eq!(peer, client_peer),
        other => panic!("expected connect on client, got {:?}", other),
    }

    (client_peer, server_peer)
}

#[test]
fn test_handshake_connects_both_sides() {
    let mut server = server();
    let mut client = client();

    let (client_peer, server_peer) = connect_pair(&mut server, &mut client, 42);

    assert_eq!(client.peer(client_peer).unwrap().state(), PeerState::Connected);
    assert_eq!(server.peer(server_peer).unwrap().state(), PeerState::Connected);
    assert_eq!(server.peer(server_peer).unwrap().channel_count(), 4);
}

#[test]
fn test_unsequenced_send_on_channel_two() {
    let mut server = server();
    let mut client = client();
    let (client_peer, server_peer) = connect_pair(&mut server, &mut client, 0);

    let packet = Packet::create(b"hello", PacketFlags::UNSEQUENCED).unwrap();
    client.peer_mut(client_peer).unwrap().send(2, packet).unwrap();

    match wait_for_event(&mut server, &mut client, 500) {
        Some(Event::Receive {
            peer,
            channel,
            packet,
        }) => {
            assert_eq!(peer, server_peer);
            assert_eq!(channel, 2);
            assert_eq!(packet.data(), b"hello");
            assert_eq!(packet.flags(), PacketFlags::UNSEQUENCED);
        }
        other => panic!("expected receive, got {:?}", other),
    }

    assert!(wait_for_event(&mut server, &mut client, 50).is_none());
}

#[test]
fn test_broadcast_reaches_every_peer() {
    let mut server = server();
    let mut first = client();
    let mut second = client();
    connect_pair(&mut server, &mut first, 1);
    connect_pair(&mut server, &mut second, 2);

    let packet = Packet::create(b"all", PacketFlags::RELIABLE).unwrap();
    server.broadcast(0, packet);

    for host in [&mut first, &mut second] {
        match wait_for_event(host, &mut server, 500) {
            Some(Event::Receive { packet, .. }) => assert_eq!(packet.into_data(), b"all"),
            other => panic!("expected receive, got {:?}", other),
        }
    }
}

#[test]
fn test_graceful_disconnect() {
    let mut server = server();
    let mut client = client();
    let (client_peer, server_peer) = connect_pair(&mut server, &mut client, 0);

    client.peer_mut(client_peer).unwrap().disconnect(7);

    match wait_for_event(&mut server, &mut client, 500) {
        Some(Event::Disconnect { peer, data }) => {
            assert_eq!(peer, server_peer);
            assert_eq!(data, 7);
        }
        other => panic!("expected disconnect on server, got {:?}", other),
    }

    match wait_for_event(&mut client, &mut server, 500) {
        Some(Event::Disconnect { peer, data: 0 }) => assert_eq!(peer, client_peer),
        other => panic!("expected disconnect on client, got {:?}", other),
    }

    assert_eq!(
        server.peer(server_peer).unwrap().state(),
        PeerState::Disconnected
    );
}

#[test]
fn test_compressed_traffic_round_trips() {
    let mut server = server();
    let mut client = client();
    client.compress_with_range_coder().unwrap();
    let (client_peer, _) = connect_pair(&mut server, &mut client, 0);

    let payload = vec![b'z'; 1000];
    let packet = Packet::create(&payload, PacketFlags::RELIABLE).unwrap();
    client.peer_mut(client_peer).unwrap().send(0, packet).unwrap();

    match wait_for_event(&mut server, &mut client, 500) {
        Some(Event::Receive { packet, .. }) => assert_eq!(packet.data(), &payload[..]),
        other => panic!("expected receive, got {:?}", other),
    }
}

#[test]
fn test_client_only_host_refuses_connect() {
    let mut target = client();
    let mut caller = client();

    let port = target.local_addr().port();
    caller
        .connect(Address::new(Ipv4Addr::LOCALHOST, port), 1, 0)
        .unwrap();

    assert!(wait_for_event(&mut target, &mut caller, 100).is_none());
}

#[test]
fn test_bound_port_cannot_be_reused() {
    let first = server();
    let taken = Address::new(Ipv4Addr::LOCALHOST, first.local_addr().port());
    assert!(Host::create(Some(taken), 1, 1, 0, 0).is_err());
}
