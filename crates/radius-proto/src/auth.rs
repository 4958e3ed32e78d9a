use crate::attributes::AttributeType;
use crate::message_auth::verify_response_message_authenticator;
use crate::packet::Packet;
use rand::Rng;

/// Generate a random Request Authenticator (16 bytes) per RFC 2865 Section 3
pub fn generate_request_authenticator() -> [u8; 16] {
    let mut rng = rand::rng();
    let mut authenticator = [0u8; 16];
    rng.fill(&mut authenticator);
    authenticator
}

/// Calculate Response Authenticator per RFC 2865 Section 3
///
/// Response Authenticator = MD5(Code + ID + Length + Request Authenticator + Attributes + Secret)
pub fn calculate_response_authenticator(
    packet: &Packet,
    request_authenticator: &[u8; 16],
    secret: &[u8],
) -> [u8; 16] {
    let length = packet.length();
    let mut data = Vec::with_capacity(length + secret.len());

    data.push(packet.code.as_u8());
    data.push(packet.identifier);
    data.extend_from_slice(&(length as u16).to_be_bytes());
    data.extend_from_slice(request_authenticator);

    for attr in &packet.attributes {
        data.push(attr.attr_type);
        data.push(attr.encoded_length() as u8);
        data.extend_from_slice(&attr.value);
    }

    data.extend_from_slice(secret);

    md5::compute(&data).0
}

/// Verify Response Authenticator
pub fn verify_response_authenticator(
    response: &Packet,
    request_authenticator: &[u8; 16],
    secret: &[u8],
) -> bool {
    let calculated = calculate_response_authenticator(response, request_authenticator, secret);
    response.authenticator == calculated
}

/// Full integrity check of a reply against the request it answers
///
/// The identifier must match, the Response Authenticator must be valid and,
/// when the reply carries a Message-Authenticator, its HMAC-MD5 must be valid
/// too (RFC 3579 Section 3.2).
pub fn verify_response(response: &Packet, request: &Packet, secret: &[u8]) -> bool {
    if response.identifier != request.identifier {
        return false;
    }

    if !verify_response_authenticator(response, &request.authenticator, secret) {
        return false;
    }

    if response
        .find_attribute(AttributeType::MessageAuthenticator as u8)
        .is_some()
    {
        return verify_response_message_authenticator(response, &request.authenticator, secret);
    }

    true
}

/// Hide User-Password attribute per RFC 2865 Section 5.2
///
/// The password is padded to a multiple of 16 bytes, then XORed with
/// MD5(secret + request_authenticator) for the first block and
/// MD5(secret + previous_block) for subsequent blocks.
pub fn encrypt_user_password(password: &str, secret: &[u8], authenticator: &[u8; 16]) -> Vec<u8> {
    let mut padded = password.as_bytes().to_vec();
    let blocks = padded.len().div_ceil(16).max(1);
    padded.resize(blocks * 16, 0);

    let mut result = Vec::with_capacity(padded.len());
    let mut previous_block = authenticator.to_vec();

    for chunk in padded.chunks(16) {
        let mut data = Vec::with_capacity(secret.len() + 16);
        data.extend_from_slice(secret);
        data.extend_from_slice(&previous_block);
        let hash = md5::compute(&data);

        let encrypted_block: Vec<u8> = chunk.iter().zip(hash.0.iter()).map(|(p, h)| p ^ h).collect();
        result.extend_from_slice(&encrypted_block);
        previous_block = encrypted_block;
    }

    result
}
