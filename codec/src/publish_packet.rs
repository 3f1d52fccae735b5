use bytes::Bytes;

use crate::base::{DecodePacket, EncodePacket, FixedHeader, PacketId, PacketType, QoS};
use crate::byte_array::ByteArray;
use crate::error::{DecodeError, EncodeError};
use crate::utils::write_string;

/// A PUBLISH packet carries an application payload to a topic.
///
/// `retain` asks the broker to keep this message as the last known good value
/// for the topic, to be delivered to future subscribers. `dup` marks a
/// retransmission of a packet the server already attempted to send; it does
/// not change delivery semantics, it is informational only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishPacket {
    dup: bool,
    qos: QoS,
    retain: bool,
    topic: String,
    packet_id: Option<PacketId>,
    payload: Bytes,
}

impl PublishPacket {
    #[must_use]
    pub fn new(topic: &str, qos: QoS, payload: impl Into<Bytes>) -> Self {
        Self {
            dup: false,
            qos,
            retain: false,
            topic: topic.to_string(),
            packet_id: None,
            payload: payload.into(),
        }
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    #[must_use]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    #[must_use]
    pub const fn qos(&self) -> QoS {
        self.qos
    }

    pub fn set_qos(&mut self, qos: QoS) -> &mut Self {
        self.qos = qos;
        self
    }

    #[must_use]
    pub const fn retain(&self) -> bool {
        self.retain
    }

    pub fn set_retain(&mut self, retain: bool) -> &mut Self {
        self.retain = retain;
        self
    }

    #[must_use]
    pub const fn dup(&self) -> bool {
        self.dup
    }

    pub fn set_dup(&mut self, dup: bool) -> &mut Self {
        self.dup = dup;
        self
    }

    #[must_use]
    pub const fn packet_id(&self) -> Option<PacketId> {
        self.packet_id
    }

    pub fn set_packet_id(&mut self, packet_id: PacketId) -> &mut Self {
        self.packet_id = Some(packet_id);
        self
    }
}

impl DecodePacket for PublishPacket {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        let (dup, qos, retain) = match fixed_header.packet_type {
            PacketType::Publish { dup, qos, retain } => (dup, qos, retain),
            _ => return Err(DecodeError::InvalidPacketType),
        };

        let topic_start = ba.offset();
        let topic = ba.read_string()?;
        let mut consumed = ba.offset() - topic_start;

        let packet_id = if qos == QoS::AtMostOnce {
            None
        } else {
            let id = ba.read_u16()?;
            consumed += 2;
            Some(id)
        };

        let payload_len = (fixed_header.remaining_length as usize)
            .checked_sub(consumed)
            .ok_or(DecodeError::InvalidRemainingLength)?;
        let payload = ba.read_bytes(payload_len)?;

        Ok(Self {
            dup,
            qos,
            retain,
            topic,
            packet_id,
            payload: Bytes::copy_from_slice(payload),
        })
    }
}

impl EncodePacket for PublishPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let mut remaining_length = 2 + self.topic.len() + self.payload.len();
        if self.qos != QoS::AtMostOnce {
            remaining_length += 2;
        }

        let fixed_header = FixedHeader {
            packet_type: PacketType::Publish {
                dup: self.dup,
                qos: self.qos,
                retain: self.retain,
            },
            remaining_length: remaining_length as u32,
        };
        let mut n_bytes = fixed_header.encode(buf)?;
        n_bytes += write_string(buf, &self.topic)?;
        if let Some(packet_id) = self.packet_id {
            buf.extend_from_slice(&packet_id.to_be_bytes());
            n_bytes += 2;
        }
        buf.extend_from_slice(&self.payload);
        n_bytes += self.payload.len();
        Ok(n_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qos0_round_trip_has_no_packet_id() {
        let packet = PublishPacket::new("a/b", QoS::AtMostOnce, Bytes::from_static(b"hi"));
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let mut ba = ByteArray::new(&buf);
        let decoded = PublishPacket::decode(&mut ba).unwrap();
        assert_eq!(decoded, packet);
        assert!(decoded.packet_id().is_none());
    }

    #[test]
    fn qos2_round_trip_carries_packet_id() {
        let mut packet = PublishPacket::new("a/b", QoS::ExactlyOnce, Bytes::from_static(b"hi"));
        packet.set_packet_id(42).set_dup(true).set_retain(true);
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let mut ba = ByteArray::new(&buf);
        let decoded = PublishPacket::decode(&mut ba).unwrap();
        assert_eq!(decoded.packet_id(), Some(42));
        assert!(decoded.dup());
        assert!(decoded.retain());
    }
}
