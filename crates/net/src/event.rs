use crate::packet::Packet;
use crate::peer::PeerId;

/// Numeric event kinds, as exposed to callers that cannot match on `Event`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EventType {
    None = 0,
    Connect = 1,
    Disconnect = 2,
    Receive = 3,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::None => "none",
            EventType::Connect => "connect",
            EventType::Disconnect => "disconnect",
            EventType::Receive => "receive",
        }
    }
}

/// A one-shot notification produced by polling a host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Connect { peer: PeerId, data: u32 },
    Disconnect { peer: PeerId, data: u32 },
    Receive {
        peer: PeerId,
        channel: u8,
        packet: Packet,
    },
}

impl Event {
    pub fn peer(&self) -> PeerId {
        match self {
            Event::Connect { peer, .. }
            | Event::Disconnect { peer, .. }
            | Event::Receive { peer, .. } => *peer,
        }
    }

    pub fn kind(&self) -> EventType {
        match self {
            Event::Connect { .. } => EventType::Connect,
            Event::Disconnect { .. } => EventType::Disconnect,
            Event::Receive { .. } => EventType::Receive,
        }
    }
}
