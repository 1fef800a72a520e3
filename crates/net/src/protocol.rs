use std::io;

use rkyv::util::AlignedVec;
use rkyv::{Archive, Deserialize, Serialize, rancor};

pub const MAX_DATAGRAM_SIZE: usize = 1400;
pub const PROTOCOL_VERSION: u32 = 1;
pub const PROTOCOL_MAGIC: u32 = 0x55444C4B;
/// Target slot of a datagram sent before the remote assigned one (`Connect`).
pub const PEER_ID_UNASSIGNED: u16 = u16::MAX;

const SEQUENCE_WRAP_THRESHOLD: u32 = u32::MAX / 2;
const COMPRESSION_LEVEL: i32 = 3;
const MAX_BODY_SIZE: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize)]
#[rkyv(compare(PartialEq), derive(Debug))]
pub struct DatagramHeader {
    pub magic: u32,
    pub version: u32,
    pub peer_id: u16,
    pub session: u32,
    pub sequence: u32,
    pub ack: u32,
    pub ack_bitfield: u32,
    pub compressed: bool,
}

impl DatagramHeader {
    pub fn new(peer_id: u16, session: u32, sequence: u32, ack: u32, ack_bitfield: u32) -> Self {
        Self {
            magic: PROTOCOL_MAGIC,
            version: PROTOCOL_VERSION,
            peer_id,
            session,
            sequence,
            ack,
            ack_bitfield,
            compressed: false,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.magic == PROTOCOL_MAGIC && self.version == PROTOCOL_VERSION
    }
}

#[inline]
pub fn sequence_greater_than(s1: u32, s2: u32) -> bool {
    ((s1 > s2) && (s1 - s2 <= SEQUENCE_WRAP_THRESHOLD))
        || ((s1 < s2) && (s2 - s1 > SEQUENCE_WRAP_THRESHOLD))
}

#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub enum Command {
    Connect {
        peer_id: u16,
        channel_count: u32,
        incoming_bandwidth: u32,
        outgoing_bandwidth: u32,
        data: u32,
    },
    VerifyConnect {
        peer_id: u16,
        channel_count: u32,
        incoming_bandwidth: u32,
        outgoing_bandwidth: u32,
    },
    Disconnect {
        data: u32,
    },
    DisconnectAck,
    Ping,
    Pong,
    BandwidthLimit {
        incoming_bandwidth: u32,
        outgoing_bandwidth: u32,
    },
    ThrottleConfigure {
        interval_ms: u32,
        acceleration: u32,
        deceleration: u32,
    },
    Send {
        channel: u8,
        flags: u32,
        channel_sequence: u32,
        payload: Vec<u8>,
    },
}

#[derive(Debug, Archive, Serialize, Deserialize)]
struct Datagram {
    header: DatagramHeader,
    body: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("serialization failed: {0}")]
    Serialize(rancor::Error),
    #[error("deserialization failed: {0}")]
    Deserialize(rancor::Error),
    #[error("compression failed: {0}")]
    Compress(io::Error),
    #[error("decompression failed: {0}")]
    Decompress(io::Error),
    #[error("datagram of {0} bytes exceeds the MTU")]
    TooLarge(usize),
    #[error("bad magic or protocol version")]
    BadHeader,
}

/// Serializes one command into a datagram, compressing the body on request.
pub fn encode(
    mut header: DatagramHeader,
    command: &Command,
    compress: bool,
) -> Result<Vec<u8>, ProtocolError> {
    let mut body = rkyv::to_bytes::<rancor::Error>(command)
        .map(|aligned| aligned.into_vec())
        .map_err(ProtocolError::Serialize)?;

    if compress {
        body = zstd::bulk::compress(&body, COMPRESSION_LEVEL).map_err(ProtocolError::Compress)?;
    }
    header.compressed = compress;

    let data = rkyv::to_bytes::<rancor::Error>(&Datagram { header, body })
        .map(|aligned| aligned.into_vec())
        .map_err(ProtocolError::Serialize)?;

    if data.len() > MAX_DATAGRAM_SIZE {
        return Err(ProtocolError::TooLarge(data.len()));
    }

    Ok(data)
}

pub fn decode(data: &[u8]) -> Result<(DatagramHeader, Command), ProtocolError> {
    let datagram = rkyv::from_bytes::<Datagram, rancor::Error>(&aligned(data))
        .map_err(ProtocolError::Deserialize)?;
    if !datagram.header.is_valid() {
        return Err(ProtocolError::BadHeader);
    }

    let body = if datagram.header.compressed {
        zstd::bulk::decompress(&datagram.body, MAX_BODY_SIZE).map_err(ProtocolError::Decompress)?
    } else {
        datagram.body
    };

    let command = rkyv::from_bytes::<Command, rancor::Error>(&aligned(&body))
        .map_err(ProtocolError::Deserialize)?;

    Ok((datagram.header, command))
}

// Socket buffers carry no alignment guarantee, archived data needs one.
fn aligned(data: &[u8]) -> AlignedVec {
    let mut buffer = AlignedVec::with_capacity(data.len());
    buffer.extend_from_slice(data);
    buffer
}
