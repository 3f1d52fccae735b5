use bytes::Bytes;

use crate::base::{ConnectReturnCode, DecodePacket, EncodePacket, FixedHeader, PacketType, QoS};
use crate::byte_array::ByteArray;
use crate::error::{DecodeError, EncodeError};
use crate::utils::{write_bytes, write_string};

const PROTOCOL_NAME: &str = "MQTT";
const PROTOCOL_LEVEL: u8 = 4;

/// CONNECT, the first packet any client must send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectPacket {
    protocol_name: String,
    protocol_level: u8,
    clean_session: bool,
    keep_alive: u16,
    client_id: String,

    will: Option<ConnectWill>,
    username: Option<String>,
    password: Option<Bytes>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectWill {
    pub topic: String,
    pub message: Bytes,
    pub qos: QoS,
    pub retain: bool,
}

impl ConnectPacket {
    #[must_use]
    pub fn new(client_id: &str, keep_alive: u16) -> Self {
        Self {
            protocol_name: PROTOCOL_NAME.to_string(),
            protocol_level: PROTOCOL_LEVEL,
            clean_session: true,
            keep_alive,
            client_id: client_id.to_string(),
            will: None,
            username: None,
            password: None,
        }
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn set_client_id(&mut self, client_id: String) -> &mut Self {
        self.client_id = client_id;
        self
    }

    #[must_use]
    pub const fn clean_session(&self) -> bool {
        self.clean_session
    }

    pub fn set_clean_session(&mut self, clean_session: bool) -> &mut Self {
        self.clean_session = clean_session;
        self
    }

    #[must_use]
    pub const fn keep_alive(&self) -> u16 {
        self.keep_alive
    }

    #[must_use]
    pub const fn protocol_level(&self) -> u8 {
        self.protocol_level
    }

    #[must_use]
    pub fn will(&self) -> Option<&ConnectWill> {
        self.will.as_ref()
    }

    pub fn set_will(&mut self, will: ConnectWill) -> &mut Self {
        self.will = Some(will);
        self
    }

    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn set_username(&mut self, username: String) -> &mut Self {
        self.username = Some(username);
        self
    }

    #[must_use]
    pub fn password(&self) -> Option<&Bytes> {
        self.password.as_ref()
    }

    pub fn set_password(&mut self, password: Bytes) -> &mut Self {
        self.password = Some(password);
        self
    }

    /// Validates CONNECT against MQTT 3.1.1 section 3.1. Returns the
    /// CONNACK return code the server must send on failure.
    pub fn validate(&self) -> Result<(), ConnectReturnCode> {
        if self.protocol_name != PROTOCOL_NAME {
            return Err(ConnectReturnCode::UnacceptableProtocolVersion);
        }
        if self.protocol_level != PROTOCOL_LEVEL {
            return Err(ConnectReturnCode::UnacceptableProtocolVersion);
        }
        Ok(())
    }
}

impl DecodePacket for ConnectPacket {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        if fixed_header.packet_type != PacketType::Connect {
            return Err(DecodeError::InvalidPacketType);
        }

        let protocol_name = ba.read_string()?;
        let protocol_level = ba.read_byte()?;
        let connect_flags = ba.read_byte()?;
        if connect_flags & 0x01 != 0 {
            return Err(DecodeError::InvalidConnectFlags);
        }
        let clean_session = connect_flags & 0b0000_0010 != 0;
        let will_flag = connect_flags & 0b0000_0100 != 0;
        let will_qos_bits = (connect_flags & 0b0001_1000) >> 3;
        let will_retain = connect_flags & 0b0010_0000 != 0;
        let password_flag = connect_flags & 0b0100_0000 != 0;
        let username_flag = connect_flags & 0b1000_0000 != 0;

        let keep_alive = ba.read_u16()?;
        let client_id = ba.read_string()?;

        let will = if will_flag {
            let will_qos = QoS::from_u8(will_qos_bits).ok_or(DecodeError::InvalidQoS)?;
            let topic = ba.read_string()?;
            let message_len = ba.read_u16()? as usize;
            let message = Bytes::copy_from_slice(ba.read_bytes(message_len)?);
            Some(ConnectWill {
                topic,
                message,
                qos: will_qos,
                retain: will_retain,
            })
        } else {
            None
        };

        let username = if username_flag {
            Some(ba.read_string()?)
        } else {
            None
        };
        let password = if password_flag {
            let len = ba.read_u16()? as usize;
            Some(Bytes::copy_from_slice(ba.read_bytes(len)?))
        } else {
            None
        };

        Ok(Self {
            protocol_name,
            protocol_level,
            clean_session,
            keep_alive,
            client_id,
            will,
            username,
            password,
        })
    }
}

impl EncodePacket for ConnectPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let mut payload = Vec::new();
        write_string(&mut payload, &self.client_id)?;

        let mut connect_flags = 0u8;
        if self.clean_session {
            connect_flags |= 0b0000_0010;
        }
        if let Some(will) = &self.will {
            connect_flags |= 0b0000_0100;
            connect_flags |= u8::from(will.qos) << 3;
            if will.retain {
                connect_flags |= 0b0010_0000;
            }
            write_string(&mut payload, &will.topic)?;
            write_bytes(&mut payload, &will.message)?;
        }
        if let Some(username) = &self.username {
            connect_flags |= 0b1000_0000;
            write_string(&mut payload, username)?;
        }
        if let Some(password) = &self.password {
            connect_flags |= 0b0100_0000;
            write_bytes(&mut payload, password)?;
        }

        let mut variable_header = Vec::new();
        write_string(&mut variable_header, &self.protocol_name)?;
        variable_header.push(self.protocol_level);
        variable_header.push(connect_flags);
        variable_header.extend_from_slice(&self.keep_alive.to_be_bytes());

        let remaining_length = variable_header.len() + payload.len();
        let fixed_header = FixedHeader {
            packet_type: PacketType::Connect,
            remaining_length: remaining_length as u32,
        };
        let mut n_bytes = fixed_header.encode(buf)?;
        buf.extend_from_slice(&variable_header);
        buf.extend_from_slice(&payload);
        n_bytes += variable_header.len() + payload.len();
        Ok(n_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_connect_round_trips() {
        let packet = ConnectPacket::new("client-1", 60);
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let mut ba = ByteArray::new(&buf);
        let decoded = ConnectPacket::decode(&mut ba).unwrap();
        assert_eq!(decoded, packet);
        assert!(decoded.validate().is_ok());
    }

    #[test]
    fn connect_with_will_round_trips() {
        let mut packet = ConnectPacket::new("client-1", 30);
        packet.set_clean_session(false).set_will(ConnectWill {
            topic: "last/will".to_string(),
            message: Bytes::from_static(b"bye"),
            qos: QoS::AtLeastOnce,
            retain: true,
        });
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let mut ba = ByteArray::new(&buf);
        let decoded = ConnectPacket::decode(&mut ba).unwrap();
        assert_eq!(decoded.will().unwrap().topic, "last/will");
        assert!(decoded.will().unwrap().retain);
    }

    #[test]
    fn wrong_protocol_name_fails_validation() {
        let mut packet = ConnectPacket::new("client-1", 60);
        packet.protocol_name = "bogus".to_string();
        assert_eq!(
            packet.validate(),
            Err(ConnectReturnCode::UnacceptableProtocolVersion)
        );
    }
}
