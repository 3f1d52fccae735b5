use crate::base::{ConnectReturnCode, DecodePacket, EncodePacket, FixedHeader, PacketType};
use crate::byte_array::ByteArray;
use crate::error::{DecodeError, EncodeError};

/// CONNACK, the server's reply to CONNECT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectAckPacket {
    session_present: bool,
    return_code: ConnectReturnCode,
}

impl ConnectAckPacket {
    #[must_use]
    pub const fn new(return_code: ConnectReturnCode, session_present: bool) -> Self {
        Self {
            session_present,
            return_code,
        }
    }

    #[must_use]
    pub const fn return_code(&self) -> ConnectReturnCode {
        self.return_code
    }

    #[must_use]
    pub const fn session_present(&self) -> bool {
        self.session_present
    }
}

impl DecodePacket for ConnectAckPacket {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        if fixed_header.packet_type != PacketType::ConnectAck {
            return Err(DecodeError::InvalidPacketType);
        }
        let flags = ba.read_byte()?;
        let session_present = flags & 0x01 != 0;
        let return_code_byte = ba.read_byte()?;
        let return_code =
            ConnectReturnCode::from_u8(return_code_byte).ok_or(DecodeError::InvalidPacketType)?;
        Ok(Self {
            session_present,
            return_code,
        })
    }
}

impl EncodePacket for ConnectAckPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let fixed_header = FixedHeader {
            packet_type: PacketType::ConnectAck,
            remaining_length: 2,
        };
        let mut n_bytes = fixed_header.encode(buf)?;
        buf.push(u8::from(self.session_present));
        buf.push(self.return_code.into());
        n_bytes += 2;
        Ok(n_bytes)
    }
}
