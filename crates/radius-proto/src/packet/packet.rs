use super::Code;
use crate::attributes::{Attribute, AttributeType};
use std::io::{self, Write};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PacketError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Attribute error: {0}")]
    AttributeError(String),
    #[error("Packet too large: {0} bytes")]
    PacketTooLarge(usize),
}

/// RADIUS Packet structure as defined in RFC 2865 Section 3
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |     Code      |  Identifier   |            Length             |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                         Authenticator                         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |  Attributes ...
/// +-+-+-+-+-+-+-+-+-+-+-+-+-
/// ```
///
/// The access point never parses raw datagrams itself; the transport hands
/// over replies already split into this structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Packet type (1 byte)
    pub code: Code,
    /// Packet identifier for matching requests/responses (1 byte)
    pub identifier: u8,
    /// Request or Response Authenticator (16 bytes)
    pub authenticator: [u8; 16],
    /// List of attributes
    pub attributes: Vec<Attribute>,
}

impl Packet {
    /// Header size (1 code + 1 id + 2 length + 16 authenticator)
    pub const HEADER_SIZE: usize = 20;
    /// Maximum RADIUS packet size (4096 bytes as per RFC 2865)
    pub const MAX_PACKET_SIZE: usize = 4096;

    pub fn new(code: Code, identifier: u8, authenticator: [u8; 16]) -> Self {
        Packet {
            code,
            identifier,
            authenticator,
            attributes: Vec::new(),
        }
    }

    pub fn add_attribute(&mut self, attribute: Attribute) {
        self.attributes.push(attribute);
    }

    /// Encode packet to bytes
    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        let total_length = self.length();
        if total_length > Self::MAX_PACKET_SIZE {
            return Err(PacketError::PacketTooLarge(total_length));
        }

        let mut buffer = Vec::with_capacity(total_length);
        buffer.write_all(&[self.code.as_u8(), self.identifier])?;
        buffer.write_all(&(total_length as u16).to_be_bytes())?;
        buffer.write_all(&self.authenticator)?;

        for attr in &self.attributes {
            buffer.write_all(&attr.encode()?)?;
        }

        Ok(buffer)
    }

    /// Get the length of the encoded packet
    pub fn length(&self) -> usize {
        Self::HEADER_SIZE
            + self
                .attributes
                .iter()
                .map(Attribute::encoded_length)
                .sum::<usize>()
    }

    /// Find first attribute by type
    pub fn find_attribute(&self, attr_type: u8) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.attr_type == attr_type)
    }

    /// Find all attributes by type
    pub fn find_all_attributes(&self, attr_type: u8) -> Vec<&Attribute> {
        self.attributes
            .iter()
            .filter(|a| a.attr_type == attr_type)
            .collect()
    }

    /// Byte offset of the Message-Authenticator value inside the encoded packet
    pub fn message_authenticator_offset(&self) -> Option<usize> {
        let mut offset = Self::HEADER_SIZE;
        for attr in &self.attributes {
            if attr.attr_type == AttributeType::MessageAuthenticator as u8 {
                return Some(offset + Attribute::MIN_LENGTH);
            }
            offset += attr.encoded_length();
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_encode_header() {
        let mut packet = Packet::new(Code::AccessRequest, 42, [1u8; 16]);
        packet.add_attribute(Attribute::string(AttributeType::UserName as u8, "ab").unwrap());
        let encoded = packet.encode().unwrap();

        assert_eq!(encoded[0], 1);
        assert_eq!(encoded[1], 42);
        assert_eq!(u16::from_be_bytes([encoded[2], encoded[3]]) as usize, 24);
        assert_eq!(&encoded[4..20], &[1u8; 16]);
        assert_eq!(&encoded[20..], &[1, 4, b'a', b'b']);
    }

    #[test]
    fn test_packet_too_large() {
        let mut packet = Packet::new(Code::AccessRequest, 1, [0u8; 16]);
        for _ in 0..20 {
            packet.add_attribute(Attribute::new(26, vec![0u8; 253]).unwrap());
        }
        assert!(matches!(packet.encode(), Err(PacketError::PacketTooLarge(_))));
    }

    #[test]
    fn test_message_authenticator_offset() {
        let mut packet = Packet::new(Code::AccessAccept, 1, [0u8; 16]);
        packet.add_attribute(Attribute::string(AttributeType::UserName as u8, "abc").unwrap());
        assert_eq!(packet.message_authenticator_offset(), None);

        packet.add_attribute(
            Attribute::new(AttributeType::MessageAuthenticator as u8, vec![0u8; 16]).unwrap(),
        );
        // header + User-Name (2 + 3) + type/length of Message-Authenticator
        assert_eq!(packet.message_authenticator_offset(), Some(20 + 5 + 2));
    }
}
