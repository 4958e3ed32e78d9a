//! Collaborators that only trace what they are asked to do
//!
//! The daemon runs the engine against these when no real driver or RADIUS
//! client is attached, which is enough to exercise configuration, timers
//! and the ACL path end to end.

use crate::error::{DriverError, TransportError};
use crate::external::{
    Accounting, Backends, Driver, EapolHandle, Ieee8021x, RadiusTransport, WpaAuthenticator,
    WpaHandle,
};
use crate::mac::{MacAddr, ReasonCode};
use crate::random::OsRandom;
use radius_proto::Packet;
use tracing::{debug, info};

/// Driver that reports every station as just active
#[derive(Debug, Default)]
pub struct DryRunDriver;

impl Driver for DryRunDriver {
    fn poll_idle_seconds(&mut self, addr: MacAddr) -> Result<u32, DriverError> {
        debug!(addr = %addr, "dry-run: idle query");
        Ok(0)
    }

    fn poll_client(&mut self, addr: MacAddr, qos: bool) {
        debug!(addr = %addr, qos = qos, "dry-run: poll client");
    }

    fn disassociate(&mut self, addr: MacAddr, reason: ReasonCode) -> Result<(), DriverError> {
        info!(addr = %addr, reason = %reason, "dry-run: disassociate");
        Ok(())
    }

    fn deauthenticate(&mut self, addr: MacAddr, reason: ReasonCode) -> Result<(), DriverError> {
        info!(addr = %addr, reason = %reason, "dry-run: deauthenticate");
        Ok(())
    }

    fn remove_station_entry(&mut self, addr: MacAddr) -> Result<(), DriverError> {
        debug!(addr = %addr, "dry-run: remove station entry");
        Ok(())
    }

    fn set_vlan_binding(&mut self, ifname: &str, addr: MacAddr, vlan_id: u16) -> Result<(), DriverError> {
        debug!(addr = %addr, ifname = %ifname, vlan_id = vlan_id, "dry-run: bind VLAN");
        Ok(())
    }

    fn send_sa_query(&mut self, addr: MacAddr, trans_id: [u8; 2]) -> Result<(), DriverError> {
        debug!(addr = %addr, trans_id = %hex::encode(trans_id), "dry-run: SA Query request");
        Ok(())
    }

    fn add_vlan_interface(&mut self, ifname: &str, vlan_id: u16) -> Result<(), DriverError> {
        info!(ifname = %ifname, vlan_id = vlan_id, "dry-run: add VLAN interface");
        Ok(())
    }

    fn remove_vlan_interface(&mut self, ifname: &str) -> Result<(), DriverError> {
        info!(ifname = %ifname, "dry-run: remove VLAN interface");
        Ok(())
    }

    fn release_acl_entry(&mut self, addr: MacAddr) {
        debug!(addr = %addr, "dry-run: release ACL entry");
    }
}

/// Hands out sequential handles for both authenticators
#[derive(Debug, Default)]
pub struct DryRunAuthenticator {
    next_handle: u64,
}

impl DryRunAuthenticator {
    fn next(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }
}

impl Ieee8021x for DryRunAuthenticator {
    fn init_station(&mut self, addr: MacAddr) -> Option<EapolHandle> {
        let handle = EapolHandle(self.next());
        debug!(addr = %addr, handle = handle.0, "dry-run: 802.1X station init");
        Some(handle)
    }

    fn notify_port_enabled(&mut self, handle: EapolHandle, enabled: bool) {
        debug!(handle = handle.0, enabled = enabled, "dry-run: 802.1X port enabled");
    }

    fn notify_port_valid(&mut self, handle: EapolHandle, valid: bool) {
        debug!(handle = handle.0, valid = valid, "dry-run: 802.1X port valid");
    }

    fn free_station(&mut self, handle: EapolHandle) {
        debug!(handle = handle.0, "dry-run: 802.1X station freed");
    }

    fn key_material(&self, _handle: EapolHandle) -> Option<Vec<u8>> {
        None
    }
}

impl WpaAuthenticator for DryRunAuthenticator {
    fn init_station(&mut self, addr: MacAddr) -> Option<WpaHandle> {
        let handle = WpaHandle(self.next());
        debug!(addr = %addr, handle = handle.0, "dry-run: WPA station init");
        Some(handle)
    }

    fn deinit_station(&mut self, handle: WpaHandle) {
        debug!(handle = handle.0, "dry-run: WPA station deinit");
    }

    fn set_vlan(&mut self, handle: WpaHandle, vlan_id: u16) -> Result<(), DriverError> {
        debug!(handle = handle.0, vlan_id = vlan_id, "dry-run: WPA VLAN");
        Ok(())
    }

    fn resume_psk_flow(&mut self, handle: WpaHandle, success: bool) {
        info!(handle = handle.0, success = success, "dry-run: resume PSK handshake");
    }

    fn pmk(&self, _handle: WpaHandle) -> Option<Vec<u8>> {
        None
    }
}

#[derive(Debug, Default)]
pub struct DryRunAccounting;

impl Accounting for DryRunAccounting {
    fn station_start(&mut self, addr: MacAddr) {
        info!(addr = %addr, "dry-run: accounting start");
    }

    fn station_stop(&mut self, addr: MacAddr) {
        info!(addr = %addr, "dry-run: accounting stop");
    }
}

/// RADIUS client that logs requests instead of sending them
#[derive(Debug)]
pub struct DryRunRadius {
    secret: Vec<u8>,
    next_id: u8,
}

impl DryRunRadius {
    pub fn new(secret: &str) -> Self {
        DryRunRadius {
            secret: secret.as_bytes().to_vec(),
            next_id: 0,
        }
    }
}

impl RadiusTransport for DryRunRadius {
    fn next_identifier(&mut self) -> u8 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        id
    }

    fn send_access_request(&mut self, request: &Packet) -> Result<(), TransportError> {
        let bytes = request.encode()?;
        info!(
            radius_id = request.identifier,
            length = bytes.len(),
            attributes = request.attributes.len(),
            "dry-run: Access-Request"
        );
        Ok(())
    }

    fn shared_secret(&self) -> &[u8] {
        &self.secret
    }
}

/// Dry-run collaborators, with a RADIUS client when a secret is configured
pub fn backends(radius_secret: Option<&str>) -> Backends {
    Backends {
        driver: Box::new(DryRunDriver),
        ieee8021x: Box::new(DryRunAuthenticator::default()),
        wpa: Box::new(DryRunAuthenticator::default()),
        accounting: Box::new(DryRunAccounting),
        radius: radius_secret.map(|secret| Box::new(DryRunRadius::new(secret)) as Box<dyn RadiusTransport>),
        random: Box::new(OsRandom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifiers_wrap() {
        let mut radius = DryRunRadius::new("secret");
        radius.next_id = 255;
        assert_eq!(radius.next_identifier(), 255);
        assert_eq!(radius.next_identifier(), 0);
        assert_eq!(radius.shared_secret(), b"secret");
    }

    #[test]
    fn test_backends_without_radius() {
        assert!(backends(None).radius.is_none());
        assert!(backends(Some("s")).radius.is_some());
    }
}
