use crate::base::{DecodePacket, EncodePacket, FixedHeader, PacketId, PacketType, QoS};
use crate::byte_array::ByteArray;
use crate::error::{DecodeError, EncodeError};

/// Per-topic-filter grant or failure (0x80) result carried in a SUBACK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeAck {
    QoS(QoS),
    Failed,
}

impl SubscribeAck {
    fn to_byte(self) -> u8 {
        match self {
            Self::QoS(qos) => qos.into(),
            Self::Failed => 0x80,
        }
    }

    fn from_byte(byte: u8) -> Self {
        if byte == 0x80 {
            Self::Failed
        } else {
            QoS::from_u8(byte & 0x03).map_or(Self::Failed, Self::QoS)
        }
    }
}

/// SUBACK, the server's reply to SUBSCRIBE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeAckPacket {
    packet_id: PacketId,
    codes: Vec<SubscribeAck>,
}

impl SubscribeAckPacket {
    #[must_use]
    pub const fn new(packet_id: PacketId, codes: Vec<SubscribeAck>) -> Self {
        Self { packet_id, codes }
    }

    #[must_use]
    pub const fn packet_id(&self) -> PacketId {
        self.packet_id
    }

    #[must_use]
    pub fn codes(&self) -> &[SubscribeAck] {
        &self.codes
    }
}

impl DecodePacket for SubscribeAckPacket {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        if fixed_header.packet_type != PacketType::SubscribeAck {
            return Err(DecodeError::InvalidPacketType);
        }
        let packet_id = ba.read_u16()?;
        let n_codes = fixed_header.remaining_length as usize - 2;
        let mut codes = Vec::with_capacity(n_codes);
        for _ in 0..n_codes {
            codes.push(SubscribeAck::from_byte(ba.read_byte()?));
        }
        Ok(Self { packet_id, codes })
    }
}

impl EncodePacket for SubscribeAckPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let remaining_length = 2 + self.codes.len();
        let fixed_header = FixedHeader {
            packet_type: PacketType::SubscribeAck,
            remaining_length: remaining_length as u32,
        };
        let mut n_bytes = fixed_header.encode(buf)?;
        buf.extend_from_slice(&self.packet_id.to_be_bytes());
        for code in &self.codes {
            buf.push(code.to_byte());
        }
        n_bytes += 2 + self.codes.len();
        Ok(n_bytes)
    }
}
