use udplink::{Packet, PacketFlags};

use crate::error::ScriptError;

pub const PACKET_FLAG_UNRELIABLE: i64 = 0;
pub const PACKET_FLAG_RELIABLE: i64 = 1;
pub const PACKET_FLAG_UNSEQUENCED: i64 = 2;

pub fn packet_flags(flag: i64) -> Result<PacketFlags, ScriptError> {
    match flag {
        PACKET_FLAG_UNRELIABLE => Ok(PacketFlags::empty()),
        PACKET_FLAG_RELIABLE => Ok(PacketFlags::RELIABLE),
        PACKET_FLAG_UNSEQUENCED => Ok(PacketFlags::UNSEQUENCED),
        other => Err(ScriptError::InvalidFlag(other)),
    }
}

/// Builds an owned packet. The flag is checked before anything is allocated.
pub fn build_packet(data: &[u8], flag: i64) -> Result<Packet, ScriptError> {
    let flags = packet_flags(flag)?;
    Packet::create(data, flags).map_err(ScriptError::AllocationFailure)
}
