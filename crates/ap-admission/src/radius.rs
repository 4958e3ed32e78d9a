//! Access-Request construction and reply dispatch

use crate::error::TransportError;
use crate::mac::MacAddr;
use radius_proto::attributes::{
    FREERADIUS_802_1X_ANONCE, FREERADIUS_802_1X_EAPOL_KEY_MSG, NAS_PORT_TYPE_IEEE_802_11,
    SERVICE_TYPE_FRAMED, VENDOR_FREERADIUS,
};
use radius_proto::{
    Attribute, AttributeType, Code, Packet, calculate_message_authenticator, encrypt_user_password,
};
use std::time::Instant;
use tracing::debug;

/// Which RADIUS exchange a reply belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RadiusMessageClass {
    Auth,
    Acct,
}

/// Result of offering a reply to a handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyDisposition {
    /// Reply consumed
    Handled,
    /// Identifier unknown to this handler; try the next one
    NotMine,
    /// Reply matched a request but failed verification
    InvalidAuthenticator,
}

/// Consumer of RADIUS replies
pub trait RadiusReplyHandler {
    fn message_class(&self) -> RadiusMessageClass;

    fn handle_reply(&mut self, reply: &Packet, now: Instant) -> ReplyDisposition;
}

/// Offer a reply to each handler of `class` until one claims it
pub fn dispatch_reply(
    handlers: &mut [&mut dyn RadiusReplyHandler],
    class: RadiusMessageClass,
    reply: &Packet,
    now: Instant,
) -> ReplyDisposition {
    for handler in handlers.iter_mut() {
        if handler.message_class() != class {
            continue;
        }
        match handler.handle_reply(reply, now) {
            ReplyDisposition::NotMine => continue,
            disposition => return disposition,
        }
    }

    debug!(radius_id = reply.identifier, "No handler claimed RADIUS reply");
    ReplyDisposition::NotMine
}

/// Contents of a MAC ACL Access-Request
#[derive(Debug, Clone)]
pub struct AccessRequest<'a> {
    pub addr: MacAddr,
    pub bssid: MacAddr,
    pub ssid: &'a str,
    pub nas_identifier: &'a str,
    /// RFC 7268 AKM suite selector
    pub akm_suite: Option<u32>,
    /// ANonce and EAPOL-Key message 2 for RADIUS-assisted PSK lookups
    pub psk_material: Option<(&'a [u8], &'a [u8])>,
}

impl AccessRequest<'_> {
    /// Encode into a packet with a valid Message-Authenticator
    pub fn build(
        &self,
        identifier: u8,
        authenticator: [u8; 16],
        secret: &[u8],
    ) -> Result<Packet, TransportError> {
        let mut packet = Packet::new(Code::AccessRequest, identifier, authenticator);
        let station = self.addr.radius_format();

        packet.add_attribute(Attribute::string(AttributeType::UserName as u8, station.clone())?);
        packet.add_attribute(Attribute::new(
            AttributeType::UserPassword as u8,
            encrypt_user_password(&station, secret, &authenticator),
        )?);
        packet.add_attribute(Attribute::string(
            AttributeType::CallingStationId as u8,
            station,
        )?);
        packet.add_attribute(Attribute::string(
            AttributeType::CalledStationId as u8,
            format!("{}:{}", self.bssid.radius_format(), self.ssid),
        )?);
        if !self.nas_identifier.is_empty() {
            packet.add_attribute(Attribute::string(
                AttributeType::NasIdentifier as u8,
                self.nas_identifier,
            )?);
        }
        packet.add_attribute(Attribute::integer(
            AttributeType::ServiceType as u8,
            SERVICE_TYPE_FRAMED,
        )?);
        packet.add_attribute(Attribute::integer(
            AttributeType::NasPortType as u8,
            NAS_PORT_TYPE_IEEE_802_11,
        )?);
        if let Some(suite) = self.akm_suite {
            packet.add_attribute(Attribute::integer(AttributeType::WlanAkmSuite as u8, suite)?);
        }
        if let Some((anonce, eapol)) = self.psk_material {
            packet.add_attribute(Attribute::vendor_specific(
                VENDOR_FREERADIUS,
                FREERADIUS_802_1X_ANONCE,
                anonce,
            )?);
            packet.add_attribute(Attribute::vendor_specific(
                VENDOR_FREERADIUS,
                FREERADIUS_802_1X_EAPOL_KEY_MSG,
                eapol,
            )?);
        }

        sign(&mut packet, secret)?;
        Ok(packet)
    }
}

/// Append a Message-Authenticator covering the whole request
fn sign(packet: &mut Packet, secret: &[u8]) -> Result<(), TransportError> {
    packet.add_attribute(Attribute::new(
        AttributeType::MessageAuthenticator as u8,
        vec![0u8; 16],
    )?);
    let bytes = packet.encode()?;
    let mac = calculate_message_authenticator(&bytes, secret);
    if let Some(attr) = packet.attributes.last_mut() {
        attr.value.copy_from_slice(&mac);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use radius_proto::verify_response_message_authenticator;

    fn request() -> AccessRequest<'static> {
        AccessRequest {
            addr: MacAddr::new([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]),
            bssid: MacAddr::new([0x02, 0x00, 0x00, 0x00, 0x01, 0x00]),
            ssid: "corp",
            nas_identifier: "ap1",
            akm_suite: None,
            psk_material: None,
        }
    }

    #[test]
    fn test_request_attributes() {
        let packet = request().build(9, [7u8; 16], b"secret").unwrap();
        assert_eq!(packet.code, Code::AccessRequest);
        assert_eq!(packet.identifier, 9);

        let user = packet.find_attribute(AttributeType::UserName as u8).unwrap();
        assert_eq!(user.as_string().unwrap(), "02-00-00-00-00-01");
        let called = packet
            .find_attribute(AttributeType::CalledStationId as u8)
            .unwrap();
        assert_eq!(called.as_string().unwrap(), "02-00-00-00-01-00:corp");
        let port = packet.find_attribute(AttributeType::NasPortType as u8).unwrap();
        assert_eq!(port.as_integer().unwrap(), 19);
        assert!(packet.find_attribute(AttributeType::WlanAkmSuite as u8).is_none());
        assert!(packet.find_attribute(AttributeType::VendorSpecific as u8).is_none());
    }

    #[test]
    fn test_psk_request_carries_vendor_attributes() {
        let anonce = [0x11u8; 32];
        let eapol = [0x22u8; 99];
        let mut req = request();
        req.akm_suite = Some(0x000f_ac02);
        req.psk_material = Some((&anonce, &eapol));

        let packet = req.build(1, [0u8; 16], b"secret").unwrap();
        assert_eq!(
            packet
                .find_all_attributes(AttributeType::VendorSpecific as u8)
                .len(),
            2
        );
        assert_eq!(
            packet
                .find_attribute(AttributeType::WlanAkmSuite as u8)
                .unwrap()
                .as_integer()
                .unwrap(),
            0x000f_ac02
        );
    }

    #[test]
    fn test_message_authenticator_is_last_and_valid() {
        let auth = [3u8; 16];
        let packet = request().build(2, auth, b"secret").unwrap();
        let last = packet.attributes.last().unwrap();
        assert_eq!(last.attr_type, AttributeType::MessageAuthenticator as u8);
        assert!(verify_response_message_authenticator(&packet, &auth, b"secret"));
        assert!(!verify_response_message_authenticator(&packet, &auth, b"other"));
    }

    struct Fixed(RadiusMessageClass, ReplyDisposition, usize);

    impl RadiusReplyHandler for Fixed {
        fn message_class(&self) -> RadiusMessageClass {
            self.0
        }
        fn handle_reply(&mut self, _reply: &Packet, _now: Instant) -> ReplyDisposition {
            self.2 += 1;
            self.1
        }
    }

    #[test]
    fn test_dispatch_stops_at_first_claim() {
        let reply = Packet::new(Code::AccessAccept, 1, [0u8; 16]);
        let mut acct = Fixed(RadiusMessageClass::Acct, ReplyDisposition::Handled, 0);
        let mut other = Fixed(RadiusMessageClass::Auth, ReplyDisposition::NotMine, 0);
        let mut owner = Fixed(RadiusMessageClass::Auth, ReplyDisposition::Handled, 0);
        let mut after = Fixed(RadiusMessageClass::Auth, ReplyDisposition::Handled, 0);

        let disposition = dispatch_reply(
            &mut [&mut acct, &mut other, &mut owner, &mut after],
            RadiusMessageClass::Auth,
            &reply,
            Instant::now(),
        );
        assert_eq!(disposition, ReplyDisposition::Handled);
        assert_eq!((acct.2, other.2, owner.2, after.2), (0, 1, 1, 0));
    }

    #[test]
    fn test_dispatch_unclaimed() {
        let reply = Packet::new(Code::AccessAccept, 1, [0u8; 16]);
        let mut other = Fixed(RadiusMessageClass::Auth, ReplyDisposition::NotMine, 0);
        assert_eq!(
            dispatch_reply(&mut [&mut other], RadiusMessageClass::Auth, &reply, Instant::now()),
            ReplyDisposition::NotMine
        );
    }
}
