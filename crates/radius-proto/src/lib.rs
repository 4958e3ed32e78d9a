//! RADIUS vocabulary for access-point MAC ACL queries
//!
//! This crate covers the client side of RFC 2865 Access-Request / Access-Accept
//! exchanges as an 802.11 access point uses them:
//!
//! - Packet and attribute construction
//! - Request authenticators and User-Password hiding
//! - Response Authenticator and Message-Authenticator verification
//! - Tagged tunnel attributes for VLAN assignment (RFC 3580, RFC 4675)
//! - Tunnel-Password salt decryption (RFC 2868)
//!
//! # Example
//!
//! ```rust
//! use radius_proto::{Attribute, AttributeType, Code, Packet};
//! use radius_proto::auth::{encrypt_user_password, generate_request_authenticator};
//!
//! let req_auth = generate_request_authenticator();
//! let mut packet = Packet::new(Code::AccessRequest, 1, req_auth);
//!
//! packet.add_attribute(
//!     Attribute::string(AttributeType::UserName as u8, "02-00-00-00-00-01").unwrap()
//! );
//! let hidden = encrypt_user_password("02-00-00-00-00-01", b"secret", &req_auth);
//! packet.add_attribute(
//!     Attribute::new(AttributeType::UserPassword as u8, hidden).unwrap()
//! );
//!
//! let bytes = packet.encode().unwrap();
//! assert_eq!(bytes[0], 1);
//! ```

pub mod attributes;
pub mod auth;
pub mod message_auth;
pub mod packet;
pub mod tunnel;

pub use attributes::{Attribute, AttributeType};
pub use auth::{
    calculate_response_authenticator, encrypt_user_password, generate_request_authenticator,
    verify_response, verify_response_authenticator,
};
pub use message_auth::{calculate_message_authenticator, verify_response_message_authenticator};
pub use packet::{Code, Packet, PacketError};
pub use tunnel::{
    MAX_VLAN_ID, TunnelVlan, decrypt_tunnel_password, encrypt_tunnel_password, extract_vlan,
    tunnel_passwords,
};
