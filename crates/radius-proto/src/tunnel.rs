//! Tunnel attribute helpers (RFC 2868, RFC 3580, RFC 4675)
//!
//! Access-Accept messages assign VLANs through tagged tunnel attributes and
//! hand out per-station pre-shared keys through salt-encrypted
//! Tunnel-Password attributes.

use crate::attributes::{
    Attribute, AttributeType, EGRESS_VLAN_TAGGED, TUNNEL_MEDIUM_TYPE_802, TUNNEL_TYPE_VLAN,
};
use crate::packet::{Packet, PacketError};

/// Highest VLAN id usable on an 802.1Q link
pub const MAX_VLAN_ID: u16 = 4094;

/// VLAN assignment carried by a reply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TunnelVlan {
    /// Untagged VLAN from the lowest-tagged complete VLAN tunnel group
    pub untagged: Option<u16>,
    /// Tagged VLANs from Egress-VLANID, sorted and deduplicated
    pub tagged: Vec<u16>,
}

impl TunnelVlan {
    pub fn is_empty(&self) -> bool {
        self.untagged.is_none() && self.tagged.is_empty()
    }
}

#[derive(Default, Clone, Copy)]
struct TunnelGroup {
    tunnel_type: Option<u32>,
    medium_type: Option<u32>,
    vlan_id: Option<u16>,
}

fn parse_vlan_id(bytes: &[u8]) -> Option<u16> {
    let text = std::str::from_utf8(bytes).ok()?;
    let id: u16 = text.trim().parse().ok()?;
    (1..=MAX_VLAN_ID).contains(&id).then_some(id)
}

/// Extract the VLAN assignment from a reply
pub fn extract_vlan(packet: &Packet) -> TunnelVlan {
    let mut groups = [TunnelGroup::default(); (Attribute::MAX_TAG as usize) + 1];

    for attr in &packet.attributes {
        match AttributeType::from_u8(attr.attr_type) {
            Some(AttributeType::TunnelType) => {
                if let Ok((tag, value)) = attr.as_tagged_integer()
                    && tag <= Attribute::MAX_TAG
                {
                    groups[tag as usize].tunnel_type = Some(value);
                }
            }
            Some(AttributeType::TunnelMediumType) => {
                if let Ok((tag, value)) = attr.as_tagged_integer()
                    && tag <= Attribute::MAX_TAG
                {
                    groups[tag as usize].medium_type = Some(value);
                }
            }
            Some(AttributeType::TunnelPrivateGroupId) => {
                let (tag, bytes) = attr.as_tagged_bytes();
                if let Some(id) = parse_vlan_id(bytes) {
                    groups[tag as usize].vlan_id = Some(id);
                }
            }
            _ => {}
        }
    }

    let untagged = groups.iter().find_map(|group| {
        match (group.tunnel_type, group.medium_type, group.vlan_id) {
            (Some(TUNNEL_TYPE_VLAN), Some(TUNNEL_MEDIUM_TYPE_802), Some(id)) => Some(id),
            _ => None,
        }
    });

    let mut tagged: Vec<u16> = packet
        .find_all_attributes(AttributeType::EgressVlanId as u8)
        .into_iter()
        .filter_map(|attr| attr.as_integer().ok())
        .filter(|raw| (raw >> 24) as u8 == EGRESS_VLAN_TAGGED)
        .map(|raw| (raw & 0x0fff) as u16)
        .filter(|id| (1..=MAX_VLAN_ID).contains(id))
        .collect();
    tagged.sort_unstable();
    tagged.dedup();

    TunnelVlan { untagged, tagged }
}

fn keystream_block(secret: &[u8], first: &[u8], second: &[u8]) -> [u8; 16] {
    let mut data = Vec::with_capacity(secret.len() + first.len() + second.len());
    data.extend_from_slice(secret);
    data.extend_from_slice(first);
    data.extend_from_slice(second);
    md5::compute(&data).0
}

/// Decrypt a Tunnel-Password value (RFC 2868 Section 3.5)
///
/// `value` is the full attribute value: tag, two salt octets and the
/// encrypted string. Returns the password with its length prefix and
/// padding removed.
pub fn decrypt_tunnel_password(
    value: &[u8],
    secret: &[u8],
    request_authenticator: &[u8; 16],
) -> Result<Vec<u8>, PacketError> {
    if value.len() < 3 + 16 || (value.len() - 3) % 16 != 0 {
        return Err(PacketError::AttributeError(format!(
            "Invalid Tunnel-Password length: {}",
            value.len()
        )));
    }

    let salt = &value[1..3];
    if salt[0] & 0x80 == 0 {
        return Err(PacketError::AttributeError(
            "Tunnel-Password salt without high bit".to_string(),
        ));
    }

    let mut plain = Vec::with_capacity(value.len() - 3);
    let mut key = keystream_block(secret, request_authenticator, salt);
    for chunk in value[3..].chunks(16) {
        plain.extend(chunk.iter().zip(key.iter()).map(|(c, k)| c ^ k));
        key = keystream_block(secret, chunk, &[]);
    }

    let len = plain[0] as usize;
    if len + 1 > plain.len() {
        return Err(PacketError::AttributeError(format!(
            "Tunnel-Password length {} exceeds payload",
            len
        )));
    }

    Ok(plain[1..=len].to_vec())
}

/// Encrypt a Tunnel-Password value (RFC 2868 Section 3.5)
///
/// The high bit of the salt is forced on as the RFC requires.
pub fn encrypt_tunnel_password(
    tag: u8,
    salt: [u8; 2],
    password: &[u8],
    secret: &[u8],
    request_authenticator: &[u8; 16],
) -> Result<Vec<u8>, PacketError> {
    let mut plain = Vec::with_capacity(password.len() + 16);
    plain.push(password.len() as u8);
    plain.extend_from_slice(password);
    let blocks = plain.len().div_ceil(16);
    plain.resize(blocks * 16, 0);

    if 3 + plain.len() > Attribute::MAX_VALUE_LENGTH {
        return Err(PacketError::AttributeError(format!(
            "Tunnel-Password too long: {} bytes",
            password.len()
        )));
    }

    let salt = [salt[0] | 0x80, salt[1]];
    let mut value = vec![tag, salt[0], salt[1]];
    let mut key = keystream_block(secret, request_authenticator, &salt);
    for chunk in plain.chunks(16) {
        let cipher: Vec<u8> = chunk.iter().zip(key.iter()).map(|(p, k)| p ^ k).collect();
        key = keystream_block(secret, &cipher, &[]);
        value.extend_from_slice(&cipher);
    }

    Ok(value)
}

/// Decrypt every Tunnel-Password in a reply, skipping malformed ones
pub fn tunnel_passwords(
    packet: &Packet,
    secret: &[u8],
    request_authenticator: &[u8; 16],
) -> Vec<Result<Vec<u8>, PacketError>> {
    packet
        .find_all_attributes(AttributeType::TunnelPassword as u8)
        .into_iter()
        .map(|attr| decrypt_tunnel_password(&attr.value, secret, request_authenticator))
        .collect()
}
