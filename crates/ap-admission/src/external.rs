//! Collaborator interfaces
//!
//! The engine drives the driver, the 802.1X authenticator, the WPA
//! authenticator, accounting and the RADIUS client only through these traits.
//! Each call is synchronous; asynchronous completions come back through the
//! `on_*` entry points of [`crate::AccessPoint`].

use crate::error::{DriverError, TransportError};
use crate::mac::{MacAddr, ReasonCode};
use crate::random::RandomSource;
use radius_proto::Packet;

/// Opaque handle to 802.1X per-station state
#[derive(PartialEq, Eq, Hash, Debug, Copy, Clone)]
pub struct EapolHandle(pub u64);

/// Opaque handle to WPA per-station state
#[derive(PartialEq, Eq, Hash, Debug, Copy, Clone)]
pub struct WpaHandle(pub u64);

/// Kernel or firmware driver
pub trait Driver {
    /// Seconds since the station was last heard from
    fn poll_idle_seconds(&mut self, addr: MacAddr) -> Result<u32, DriverError>;

    /// Send a null data frame; the outcome arrives via `on_poll_result`
    fn poll_client(&mut self, addr: MacAddr, qos: bool);

    fn disassociate(&mut self, addr: MacAddr, reason: ReasonCode) -> Result<(), DriverError>;

    fn deauthenticate(&mut self, addr: MacAddr, reason: ReasonCode) -> Result<(), DriverError>;

    fn remove_station_entry(&mut self, addr: MacAddr) -> Result<(), DriverError>;

    fn set_vlan_binding(&mut self, ifname: &str, addr: MacAddr, vlan_id: u16) -> Result<(), DriverError>;

    fn send_sa_query(&mut self, addr: MacAddr, trans_id: [u8; 2]) -> Result<(), DriverError>;

    fn add_vlan_interface(&mut self, ifname: &str, vlan_id: u16) -> Result<(), DriverError>;

    fn remove_vlan_interface(&mut self, ifname: &str) -> Result<(), DriverError>;

    /// Drop any driver-side state kept for an expired ACL cache entry
    fn release_acl_entry(&mut self, _addr: MacAddr) {}
}

/// 802.1X/EAP authenticator
pub trait Ieee8021x {
    fn init_station(&mut self, addr: MacAddr) -> Option<EapolHandle>;
    fn notify_port_enabled(&mut self, handle: EapolHandle, enabled: bool);
    fn notify_port_valid(&mut self, handle: EapolHandle, valid: bool);
    fn free_station(&mut self, handle: EapolHandle);
    fn key_material(&self, handle: EapolHandle) -> Option<Vec<u8>>;
}

/// WPA key management authenticator
pub trait WpaAuthenticator {
    fn init_station(&mut self, addr: MacAddr) -> Option<WpaHandle>;
    fn deinit_station(&mut self, handle: WpaHandle);
    fn set_vlan(&mut self, handle: WpaHandle, vlan_id: u16) -> Result<(), DriverError>;
    /// Continue a handshake that waited for a RADIUS PSK decision
    fn resume_psk_flow(&mut self, handle: WpaHandle, success: bool);
    fn pmk(&self, handle: WpaHandle) -> Option<Vec<u8>>;
}

/// RADIUS accounting client
pub trait Accounting {
    fn station_start(&mut self, addr: MacAddr);
    fn station_stop(&mut self, addr: MacAddr);
}

/// RADIUS authentication client
pub trait RadiusTransport {
    /// Identifier for the next Access-Request
    fn next_identifier(&mut self) -> u8;

    fn send_access_request(&mut self, request: &Packet) -> Result<(), TransportError>;

    fn shared_secret(&self) -> &[u8];

    /// Check a reply against the request it claims to answer
    fn verify_response_integrity(&self, response: &Packet, request: &Packet) -> bool {
        radius_proto::verify_response(response, request, self.shared_secret())
    }
}

/// Every collaborator the engine talks to
pub struct Backends {
    pub driver: Box<dyn Driver>,
    pub ieee8021x: Box<dyn Ieee8021x>,
    pub wpa: Box<dyn WpaAuthenticator>,
    pub accounting: Box<dyn Accounting>,
    /// `None` when no RADIUS authentication server is configured
    pub radius: Option<Box<dyn RadiusTransport>>,
    pub random: Box<dyn RandomSource>,
}
