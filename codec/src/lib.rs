//! Packet codec for MQTT 3.1.1.
//!
//! Every control packet has its own type implementing [`EncodePacket`] and
//! [`DecodePacket`]; [`Packet`] wraps all of them and [`read_packet`] peeks
//! the fixed header to pick the right decoder.

mod base;
mod byte_array;
mod connect_ack_packet;
mod connect_packet;
mod disconnect_packet;
mod error;
mod ping_request_packet;
mod ping_response_packet;
mod publish_ack_packet;
mod publish_complete_packet;
mod publish_packet;
mod publish_received_packet;
mod publish_release_packet;
mod subscribe_ack_packet;
mod subscribe_packet;
mod unsubscribe_ack_packet;
mod unsubscribe_packet;
mod utils;

pub use base::{ConnectReturnCode, DecodePacket, EncodePacket, FixedHeader, PacketId, PacketType, QoS};
pub use byte_array::ByteArray;
pub use connect_ack_packet::ConnectAckPacket;
pub use connect_packet::{ConnectPacket, ConnectWill};
pub use disconnect_packet::DisconnectPacket;
pub use error::{DecodeError, EncodeError};
pub use ping_request_packet::PingRequestPacket;
pub use ping_response_packet::PingResponsePacket;
pub use publish_ack_packet::PublishAckPacket;
pub use publish_complete_packet::PublishCompletePacket;
pub use publish_packet::PublishPacket;
pub use publish_received_packet::PublishReceivedPacket;
pub use publish_release_packet::PublishReleasePacket;
pub use subscribe_ack_packet::{SubscribeAck, SubscribeAckPacket};
pub use subscribe_packet::{SubscribePacket, SubscribeTopic};
pub use unsubscribe_ack_packet::UnsubscribeAckPacket;
pub use unsubscribe_packet::UnsubscribePacket;

/// A decoded control packet of any kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Connect(ConnectPacket),
    ConnectAck(ConnectAckPacket),
    Publish(PublishPacket),
    PublishAck(PublishAckPacket),
    PublishReceived(PublishReceivedPacket),
    PublishRelease(PublishReleasePacket),
    PublishComplete(PublishCompletePacket),
    Subscribe(SubscribePacket),
    SubscribeAck(SubscribeAckPacket),
    Unsubscribe(UnsubscribePacket),
    UnsubscribeAck(UnsubscribeAckPacket),
    PingRequest(PingRequestPacket),
    PingResponse(PingResponsePacket),
    Disconnect(DisconnectPacket),
}

impl Packet {
    /// The packet identifier carried by this packet, if any.
    ///
    /// Mirrors the `details().message_id` accessor an external codec would
    /// expose: only PUBLISH-family and SUBSCRIBE-family packets carry one.
    #[must_use]
    pub const fn packet_id(&self) -> Option<PacketId> {
        match self {
            Self::Publish(p) => p.packet_id(),
            Self::PublishAck(p) => Some(p.packet_id()),
            Self::PublishReceived(p) => Some(p.packet_id()),
            Self::PublishRelease(p) => Some(p.packet_id()),
            Self::PublishComplete(p) => Some(p.packet_id()),
            Self::Subscribe(p) => Some(p.packet_id()),
            Self::SubscribeAck(p) => Some(p.packet_id()),
            Self::Unsubscribe(p) => Some(p.packet_id()),
            Self::UnsubscribeAck(p) => Some(p.packet_id()),
            Self::Connect(_)
            | Self::ConnectAck(_)
            | Self::PingRequest(_)
            | Self::PingResponse(_)
            | Self::Disconnect(_) => None,
        }
    }
}

/// Peeks the fixed header in `buf` and decodes the matching packet type.
///
/// Returns the decoded packet and the number of bytes of `buf` it consumed,
/// so callers can advance past a complete frame in a streaming read buffer.
/// Returns `Ok(None)` if `buf` does not yet contain a complete packet.
pub fn read_packet(buf: &[u8]) -> Result<Option<(Packet, usize)>, DecodeError> {
    if buf.is_empty() {
        return Ok(None);
    }
    let mut probe = ByteArray::new(buf);
    let fixed_header = match FixedHeader::decode(&mut probe) {
        Ok(header) => header,
        Err(DecodeError::OutOfRangeError) => return Ok(None),
        Err(err) => return Err(err),
    };
    let header_len = probe.offset();
    let total_len = header_len + fixed_header.remaining_length as usize;
    if buf.len() < total_len {
        return Ok(None);
    }

    let mut ba = ByteArray::new(&buf[..total_len]);
    let packet = match fixed_header.packet_type {
        PacketType::Connect => Packet::Connect(ConnectPacket::decode(&mut ba)?),
        PacketType::ConnectAck => Packet::ConnectAck(ConnectAckPacket::decode(&mut ba)?),
        PacketType::Publish { .. } => Packet::Publish(PublishPacket::decode(&mut ba)?),
        PacketType::PublishAck => Packet::PublishAck(PublishAckPacket::decode(&mut ba)?),
        PacketType::PublishReceived => {
            Packet::PublishReceived(PublishReceivedPacket::decode(&mut ba)?)
        }
        PacketType::PublishRelease => {
            Packet::PublishRelease(PublishReleasePacket::decode(&mut ba)?)
        }
        PacketType::PublishComplete => {
            Packet::PublishComplete(PublishCompletePacket::decode(&mut ba)?)
        }
        PacketType::Subscribe => Packet::Subscribe(SubscribePacket::decode(&mut ba)?),
        PacketType::SubscribeAck => Packet::SubscribeAck(SubscribeAckPacket::decode(&mut ba)?),
        PacketType::Unsubscribe => Packet::Unsubscribe(UnsubscribePacket::decode(&mut ba)?),
        PacketType::UnsubscribeAck => {
            Packet::UnsubscribeAck(UnsubscribeAckPacket::decode(&mut ba)?)
        }
        PacketType::PingRequest => Packet::PingRequest(PingRequestPacket::decode(&mut ba)?),
        PacketType::PingResponse => Packet::PingResponse(PingResponsePacket::decode(&mut ba)?),
        PacketType::Disconnect => Packet::Disconnect(DisconnectPacket::decode(&mut ba)?),
    };
    Ok(Some((packet, total_len)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_packet_reports_incomplete_frames() {
        let packet = PingRequestPacket;
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        assert!(read_packet(&buf[..0]).unwrap().is_none());
        let (decoded, consumed) = read_packet(&buf).unwrap().unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(decoded, Packet::PingRequest(PingRequestPacket));
    }

    #[test]
    fn read_packet_waits_for_full_publish_payload() {
        let packet = PublishPacket::new("a/b", QoS::AtMostOnce, bytes::Bytes::from_static(b"hello"));
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        assert!(read_packet(&buf[..buf.len() - 1]).unwrap().is_none());
        let (decoded, consumed) = read_packet(&buf).unwrap().unwrap();
        assert_eq!(consumed, buf.len());
        match decoded {
            Packet::Publish(p) => assert_eq!(p.topic(), "a/b"),
            _ => panic!("expected Publish"),
        }
    }
}
