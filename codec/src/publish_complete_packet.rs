use crate::base::{DecodePacket, EncodePacket, FixedHeader, PacketId, PacketType};
use crate::byte_array::ByteArray;
use crate::error::{DecodeError, EncodeError};

/// Closes out the QoS 2 handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishCompletePacket {
    packet_id: PacketId,
}

impl PublishCompletePacket {
    #[must_use]
    pub const fn new(packet_id: PacketId) -> Self {
        Self { packet_id }
    }

    #[must_use]
    pub const fn packet_id(&self) -> PacketId {
        self.packet_id
    }
}

impl DecodePacket for PublishCompletePacket {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        if fixed_header.packet_type != PacketType::PublishComplete {
            return Err(DecodeError::InvalidPacketType);
        }
        let packet_id = ba.read_u16()?;
        Ok(Self { packet_id })
    }
}

impl EncodePacket for PublishCompletePacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let fixed_header = FixedHeader {
            packet_type: PacketType::PublishComplete,
            remaining_length: 2,
        };
        let mut n_bytes = fixed_header.encode(buf)?;
        buf.extend_from_slice(&self.packet_id.to_be_bytes());
        n_bytes += 2;
        Ok(n_bytes)
    }
}
