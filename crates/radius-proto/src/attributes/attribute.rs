use crate::packet::PacketError;
use std::io::Write;

/// RADIUS Attribute structure as defined in RFC 2865 Section 5
///
/// ```text
///  0                   1                   2
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |     Type      |    Length     |  Value ...
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Attribute type (1 byte)
    pub attr_type: u8,
    /// Attribute value (0-253 bytes)
    pub value: Vec<u8>,
}

impl Attribute {
    /// Minimum attribute length (type + length fields = 2 bytes)
    pub const MIN_LENGTH: usize = 2;
    /// Maximum attribute length (255 bytes including type and length)
    pub const MAX_LENGTH: usize = 255;
    /// Maximum value length (253 bytes)
    pub const MAX_VALUE_LENGTH: usize = 253;
    /// Highest valid RFC 2868 tag; larger leading octets belong to the value
    pub const MAX_TAG: u8 = 0x1f;

    pub fn new(attr_type: u8, value: Vec<u8>) -> Result<Self, PacketError> {
        if value.len() > Self::MAX_VALUE_LENGTH {
            return Err(PacketError::AttributeError(format!(
                "Attribute value too long: {} bytes (max {})",
                value.len(),
                Self::MAX_VALUE_LENGTH
            )));
        }
        Ok(Attribute { attr_type, value })
    }

    /// Create a string attribute
    pub fn string(attr_type: u8, value: impl Into<String>) -> Result<Self, PacketError> {
        Self::new(attr_type, value.into().into_bytes())
    }

    /// Create an integer attribute (32-bit big-endian)
    pub fn integer(attr_type: u8, value: u32) -> Result<Self, PacketError> {
        Self::new(attr_type, value.to_be_bytes().to_vec())
    }

    /// Create a tagged integer attribute (RFC 2868 Section 3.1)
    ///
    /// The tag replaces the most significant octet of the 32-bit value.
    pub fn tagged_integer(attr_type: u8, tag: u8, value: u32) -> Result<Self, PacketError> {
        let mut bytes = (value & 0x00ff_ffff).to_be_bytes();
        bytes[0] = tag;
        Self::new(attr_type, bytes.to_vec())
    }

    /// Create a tagged string attribute (RFC 2868 Section 3.6)
    pub fn tagged_string(attr_type: u8, tag: u8, value: &str) -> Result<Self, PacketError> {
        let mut bytes = Vec::with_capacity(value.len() + 1);
        bytes.push(tag);
        bytes.extend_from_slice(value.as_bytes());
        Self::new(attr_type, bytes)
    }

    /// Create a Vendor-Specific attribute carrying one vendor sub-attribute
    pub fn vendor_specific(vendor_id: u32, vendor_type: u8, data: &[u8]) -> Result<Self, PacketError> {
        if data.len() + 6 > Self::MAX_VALUE_LENGTH {
            return Err(PacketError::AttributeError(format!(
                "Vendor attribute too long: {} bytes",
                data.len()
            )));
        }
        let mut value = Vec::with_capacity(data.len() + 6);
        value.extend_from_slice(&vendor_id.to_be_bytes());
        value.push(vendor_type);
        value.push((data.len() + 2) as u8);
        value.extend_from_slice(data);
        Self::new(crate::AttributeType::VendorSpecific as u8, value)
    }

    /// Encode attribute to bytes
    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        let length = self.encoded_length();
        if length > Self::MAX_LENGTH {
            return Err(PacketError::AttributeError(format!(
                "Encoded attribute too long: {} bytes",
                length
            )));
        }

        let mut buffer = Vec::with_capacity(length);
        buffer.write_all(&[self.attr_type, length as u8])?;
        buffer.write_all(&self.value)?;

        Ok(buffer)
    }

    /// Get the encoded length of this attribute
    pub fn encoded_length(&self) -> usize {
        Self::MIN_LENGTH + self.value.len()
    }

    /// Try to interpret value as a string
    pub fn as_string(&self) -> Result<String, std::string::FromUtf8Error> {
        String::from_utf8(self.value.clone())
    }

    /// Try to interpret value as an integer (32-bit big-endian)
    pub fn as_integer(&self) -> Result<u32, PacketError> {
        let bytes: [u8; 4] = self.value.as_slice().try_into().map_err(|_| {
            PacketError::AttributeError(format!(
                "Expected 4 bytes for integer, got {}",
                self.value.len()
            ))
        })?;
        Ok(u32::from_be_bytes(bytes))
    }

    /// Split a tagged integer into `(tag, value)`
    pub fn as_tagged_integer(&self) -> Result<(u8, u32), PacketError> {
        let raw = self.as_integer()?;
        Ok(((raw >> 24) as u8, raw & 0x00ff_ffff))
    }

    /// Split an optionally tagged string into `(tag, bytes)`
    ///
    /// A first octet above [`Self::MAX_TAG`] is part of the string and the tag is 0.
    pub fn as_tagged_bytes(&self) -> (u8, &[u8]) {
        match self.value.first() {
            Some(&tag) if tag <= Self::MAX_TAG => (tag, &self.value[1..]),
            _ => (0, &self.value[..]),
        }
    }
}
