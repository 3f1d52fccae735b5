use crate::base::{DecodePacket, EncodePacket, FixedHeader, PacketType};
use crate::byte_array::ByteArray;
use crate::error::{DecodeError, EncodeError};

/// DISCONNECT, the client's graceful goodbye.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DisconnectPacket;

impl DecodePacket for DisconnectPacket {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        if fixed_header.packet_type != PacketType::Disconnect {
            return Err(DecodeError::InvalidPacketType);
        }
        Ok(Self)
    }
}

impl EncodePacket for DisconnectPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let fixed_header = FixedHeader {
            packet_type: PacketType::Disconnect,
            remaining_length: 0,
        };
        fixed_header.encode(buf)
    }
}
