//! Message-Authenticator Support (RFC 2869, RFC 3579)
//!
//! Message-Authenticator provides integrity protection using HMAC-MD5 over
//! the whole packet, with the attribute's own value zeroed during
//! calculation. For replies the Request Authenticator of the original
//! Access-Request takes the place of the Response Authenticator.

use crate::attributes::AttributeType;
use crate::packet::Packet;
use hmac::{Hmac, Mac};
use md5_digest::Md5;

type HmacMd5 = Hmac<Md5>;

/// Calculate Message-Authenticator over encoded packet bytes
pub fn calculate_message_authenticator(packet_bytes: &[u8], secret: &[u8]) -> [u8; 16] {
    let mut mac = HmacMd5::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(packet_bytes);

    let mut output = [0u8; 16];
    output.copy_from_slice(&mac.finalize().into_bytes());
    output
}

/// Verify the Message-Authenticator of a reply
///
/// Returns false when the attribute is absent or malformed.
pub fn verify_response_message_authenticator(
    response: &Packet,
    request_authenticator: &[u8; 16],
    secret: &[u8],
) -> bool {
    let Some(received) = response.find_attribute(AttributeType::MessageAuthenticator as u8) else {
        return false;
    };
    if received.value.len() != 16 {
        return false;
    }

    let mut copy = response.clone();
    copy.authenticator = *request_authenticator;
    for attr in copy
        .attributes
        .iter_mut()
        .filter(|a| a.attr_type == AttributeType::MessageAuthenticator as u8)
    {
        attr.value.fill(0);
    }

    let Ok(bytes) = copy.encode() else {
        return false;
    };

    calculate_message_authenticator(&bytes, secret)[..] == received.value[..]
}
