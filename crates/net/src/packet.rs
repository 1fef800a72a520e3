use bitflags::bitflags;

/// Largest payload a single packet may carry. The engine does not fragment.
pub const MAX_PACKET_PAYLOAD: usize = 1024;

bitflags! {
    /// Delivery mode of a packet. No flags means unreliable, sequenced.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PacketFlags: u32 {
        const RELIABLE = 1 << 0;
        const UNSEQUENCED = 1 << 1;
    }
}

impl PacketFlags {
    pub fn is_sequenced(&self) -> bool {
        self.contains(Self::RELIABLE) || !self.contains(Self::UNSEQUENCED)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PacketError {
    #[error("payload of {len} bytes exceeds the {max} byte packet limit")]
    TooLarge { len: usize, max: usize },
}

/// An immutable payload plus its delivery flags.
///
/// Handing a packet to `Peer::send` or `Host::broadcast` moves it into the
/// engine; dropping it anywhere else destroys it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    data: Box<[u8]>,
    flags: PacketFlags,
}

impl Packet {
    pub fn create(data: &[u8], flags: PacketFlags) -> Result<Self, PacketError> {
        Self::from_vec(data.to_vec(), flags)
    }

    pub(crate) fn from_vec(data: Vec<u8>, flags: PacketFlags) -> Result<Self, PacketError> {
        if data.len() > MAX_PACKET_PAYLOAD {
            return Err(PacketError::TooLarge {
                len: data.len(),
                max: MAX_PACKET_PAYLOAD,
            });
        }

        Ok(Self {
            data: data.into_boxed_slice(),
            flags,
        })
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn flags(&self) -> PacketFlags {
        self.flags
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Consumes the packet, handing its payload to the caller.
    pub fn into_data(self) -> Vec<u8> {
        self.data.into_vec()
    }
}
