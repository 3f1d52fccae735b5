use crate::base::{DecodePacket, EncodePacket, FixedHeader, PacketType};
use crate::byte_array::ByteArray;
use crate::error::{DecodeError, EncodeError};

/// PINGREQ, sent by the client to keep the connection alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PingRequestPacket;

impl DecodePacket for PingRequestPacket {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        if fixed_header.packet_type != PacketType::PingRequest {
            return Err(DecodeError::InvalidPacketType);
        }
        Ok(Self)
    }
}

impl EncodePacket for PingRequestPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let fixed_header = FixedHeader {
            packet_type: PacketType::PingRequest,
            remaining_length: 0,
        };
        fixed_header.encode(buf)
    }
}
