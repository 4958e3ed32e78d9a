//! Recording collaborators shared by the integration tests

#![allow(dead_code)]

use ap_admission::{
    AccessPoint, Accounting, Backends, Config, Driver, DriverError, EapolHandle, FixedRandom,
    Ieee8021x, MacAddr, RadiusTransport, ReasonCode, TransportError, WpaAuthenticator, WpaHandle,
};
use radius_proto::{Attribute, Code, Packet, calculate_response_authenticator};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

pub const SECRET: &[u8] = b"testing123";

/// Everything the engine asked a collaborator to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    PollClient(MacAddr, bool),
    Disassociate(MacAddr, ReasonCode),
    Deauthenticate(MacAddr, ReasonCode),
    RemoveEntry(MacAddr),
    BindVlan(String, MacAddr, u16),
    SaQuery(MacAddr, [u8; 2]),
    AddVlanInterface(String, u16),
    RemoveVlanInterface(String),
    ReleaseAclEntry(MacAddr),
    PortEnabled(EapolHandle, bool),
    PortValid(EapolHandle, bool),
    FreeEapol(EapolHandle),
    WpaDeinit(WpaHandle),
    WpaSetVlan(WpaHandle, u16),
    ResumePsk(WpaHandle, bool),
    AccountingStart(MacAddr),
    AccountingStop(MacAddr),
}

#[derive(Debug, Default)]
pub struct Log {
    pub calls: Vec<Call>,
    /// Idle seconds reported by the driver, 0 when absent
    pub idle: HashMap<MacAddr, u32>,
    /// Stations the driver has no entry for
    pub missing: HashSet<MacAddr>,
    /// Stations whose idle time the driver cannot report
    pub idle_unavailable: HashSet<MacAddr>,
    /// Access-Requests handed to the transport
    pub sent: Vec<Packet>,
    pub next_radius_id: u8,
    pub next_handle: u64,
    pub fail_send: bool,
}

impl Log {
    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    pub fn position(&self, call: &Call) -> Option<usize> {
        self.calls.iter().position(|c| c == call)
    }
}

pub type SharedLog = Rc<RefCell<Log>>;

pub struct MockDriver(pub SharedLog);

impl Driver for MockDriver {
    fn poll_idle_seconds(&mut self, addr: MacAddr) -> Result<u32, DriverError> {
        let log = self.0.borrow();
        if log.missing.contains(&addr) {
            return Err(DriverError::EntryMissing);
        }
        if log.idle_unavailable.contains(&addr) {
            return Err(DriverError::QueryFailed("busy".to_string()));
        }
        Ok(log.idle.get(&addr).copied().unwrap_or(0))
    }

    fn poll_client(&mut self, addr: MacAddr, qos: bool) {
        self.0.borrow_mut().calls.push(Call::PollClient(addr, qos));
    }

    fn disassociate(&mut self, addr: MacAddr, reason: ReasonCode) -> Result<(), DriverError> {
        self.0.borrow_mut().calls.push(Call::Disassociate(addr, reason));
        Ok(())
    }

    fn deauthenticate(&mut self, addr: MacAddr, reason: ReasonCode) -> Result<(), DriverError> {
        self.0.borrow_mut().calls.push(Call::Deauthenticate(addr, reason));
        Ok(())
    }

    fn remove_station_entry(&mut self, addr: MacAddr) -> Result<(), DriverError> {
        self.0.borrow_mut().calls.push(Call::RemoveEntry(addr));
        Ok(())
    }

    fn set_vlan_binding(&mut self, ifname: &str, addr: MacAddr, vlan_id: u16) -> Result<(), DriverError> {
        self.0
            .borrow_mut()
            .calls
            .push(Call::BindVlan(ifname.to_string(), addr, vlan_id));
        Ok(())
    }

    fn send_sa_query(&mut self, addr: MacAddr, trans_id: [u8; 2]) -> Result<(), DriverError> {
        self.0.borrow_mut().calls.push(Call::SaQuery(addr, trans_id));
        Ok(())
    }

    fn add_vlan_interface(&mut self, ifname: &str, vlan_id: u16) -> Result<(), DriverError> {
        self.0
            .borrow_mut()
            .calls
            .push(Call::AddVlanInterface(ifname.to_string(), vlan_id));
        Ok(())
    }

    fn remove_vlan_interface(&mut self, ifname: &str) -> Result<(), DriverError> {
        self.0
            .borrow_mut()
            .calls
            .push(Call::RemoveVlanInterface(ifname.to_string()));
        Ok(())
    }

    fn release_acl_entry(&mut self, addr: MacAddr) {
        self.0.borrow_mut().calls.push(Call::ReleaseAclEntry(addr));
    }
}

pub struct MockAuthenticator(pub SharedLog);

impl MockAuthenticator {
    fn next_handle(&self) -> u64 {
        let mut log = self.0.borrow_mut();
        log.next_handle += 1;
        log.next_handle
    }
}

impl Ieee8021x for MockAuthenticator {
    fn init_station(&mut self, _addr: MacAddr) -> Option<EapolHandle> {
        Some(EapolHandle(self.next_handle()))
    }

    fn notify_port_enabled(&mut self, handle: EapolHandle, enabled: bool) {
        self.0.borrow_mut().calls.push(Call::PortEnabled(handle, enabled));
    }

    fn notify_port_valid(&mut self, handle: EapolHandle, valid: bool) {
        self.0.borrow_mut().calls.push(Call::PortValid(handle, valid));
    }

    fn free_station(&mut self, handle: EapolHandle) {
        self.0.borrow_mut().calls.push(Call::FreeEapol(handle));
    }

    fn key_material(&self, handle: EapolHandle) -> Option<Vec<u8>> {
        Some(handle.0.to_be_bytes().to_vec())
    }
}

impl WpaAuthenticator for MockAuthenticator {
    fn init_station(&mut self, _addr: MacAddr) -> Option<WpaHandle> {
        Some(WpaHandle(self.next_handle()))
    }

    fn deinit_station(&mut self, handle: WpaHandle) {
        self.0.borrow_mut().calls.push(Call::WpaDeinit(handle));
    }

    fn set_vlan(&mut self, handle: WpaHandle, vlan_id: u16) -> Result<(), DriverError> {
        self.0.borrow_mut().calls.push(Call::WpaSetVlan(handle, vlan_id));
        Ok(())
    }

    fn resume_psk_flow(&mut self, handle: WpaHandle, success: bool) {
        self.0.borrow_mut().calls.push(Call::ResumePsk(handle, success));
    }

    fn pmk(&self, _handle: WpaHandle) -> Option<Vec<u8>> {
        None
    }
}

pub struct MockAccounting(pub SharedLog);

impl Accounting for MockAccounting {
    fn station_start(&mut self, addr: MacAddr) {
        self.0.borrow_mut().calls.push(Call::AccountingStart(addr));
    }

    fn station_stop(&mut self, addr: MacAddr) {
        self.0.borrow_mut().calls.push(Call::AccountingStop(addr));
    }
}

pub struct MockRadius(pub SharedLog);

impl RadiusTransport for MockRadius {
    fn next_identifier(&mut self) -> u8 {
        let mut log = self.0.borrow_mut();
        let id = log.next_radius_id;
        log.next_radius_id = id.wrapping_add(1);
        id
    }

    fn send_access_request(&mut self, request: &Packet) -> Result<(), TransportError> {
        let mut log = self.0.borrow_mut();
        if log.fail_send {
            return Err(TransportError::Send("socket closed".to_string()));
        }
        log.sent.push(request.clone());
        Ok(())
    }

    fn shared_secret(&self) -> &[u8] {
        SECRET
    }
}

pub fn addr(n: u8) -> MacAddr {
    MacAddr::new([0x02, 0, 0, 0, 0, n])
}

/// Engine wired to recording collaborators
///
/// `random` feeds both timer jitter and SA Query transaction ids.
pub fn access_point(config: Config, random: FixedRandom) -> (AccessPoint, SharedLog) {
    let log = SharedLog::default();
    let backends = Backends {
        driver: Box::new(MockDriver(log.clone())),
        ieee8021x: Box::new(MockAuthenticator(log.clone())),
        wpa: Box::new(MockAuthenticator(log.clone())),
        accounting: Box::new(MockAccounting(log.clone())),
        radius: Some(Box::new(MockRadius(log.clone()))),
        random: Box::new(random),
    };
    (AccessPoint::new(config, backends), log)
}

/// Engine with no jitter
pub fn quiet_access_point(config: Config) -> (AccessPoint, SharedLog) {
    access_point(config, FixedRandom::new(0))
}

/// Reply to `request` signed with the shared secret
pub fn reply(request: &Packet, code: Code, attributes: Vec<Attribute>) -> Packet {
    let mut packet = Packet::new(code, request.identifier, [0u8; 16]);
    for attr in attributes {
        packet.add_attribute(attr);
    }
    packet.authenticator = calculate_response_authenticator(&packet, &request.authenticator, SECRET);
    packet
}

/// The most recent Access-Request
pub fn last_request(log: &SharedLog) -> Packet {
    log.borrow()
        .sent
        .last()
        .cloned()
        .expect("no Access-Request sent")
}
