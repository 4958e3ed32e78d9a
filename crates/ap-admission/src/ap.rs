//! Access point admission engine
//!
//! [`AccessPoint`] owns every piece of per-AP state: the station registry, the
//! ACL cache and pending RADIUS queries, the VLAN table and the timer queue.
//! All operations run on one thread and take the current time explicitly.
//!
//! The lifecycle timers live in `lifecycle.rs`, the SA Query procedure in
//! `sa_query.rs` and VLAN handling in `vlan.rs`; all of them extend this type.

use crate::acl::{
    AclDecision, AclManager, AclRequest, AclResolution, AclStats, AclVerdict, PskFlow,
    QueryKind, RadiusStaInfo, ReplyOutcome,
};
use crate::audit::{AuditEntry, AuditEventType, AuditLogger};
use crate::config::{Config, PskRadius};
use crate::error::{AdmissionError, Result, VlanError};
use crate::external::{Backends, RadiusTransport, WpaHandle};
use crate::mac::{MacAddr, ReasonCode};
use crate::radius::{RadiusMessageClass, RadiusReplyHandler, ReplyDisposition};
use crate::station::{RegistryStats, Station, StationFlags, StationRegistry, TimeoutPhase, TimerSlot};
use crate::timer::TimerQueue;
use crate::vlan::VlanTable;
use radius_proto::Packet;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Indication for the layer above the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApEvent {
    DisassociateIndication { addr: MacAddr, reason: ReasonCode },
    DeauthenticateIndication { addr: MacAddr, reason: ReasonCode },
    /// Feed this authentication frame through the normal path again; its
    /// ACL decision is now cached
    ReplayAuthFrame { addr: MacAddr, frame: Vec<u8> },
    SaQueryTimedOut { addr: MacAddr },
    StationRemoved { addr: MacAddr },
}

/// A scheduled per-station timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TimerEvent {
    pub slot: TimerSlot,
    pub addr: MacAddr,
}

/// Parameters of an accepted (re)association request
#[derive(Debug, Clone, Copy, Default)]
pub struct AssocParams {
    pub aid: u16,
    pub wmm: bool,
    /// Management frame protection negotiated
    pub mfp: bool,
    /// Reassociation using FT
    pub reassoc_ft: bool,
    /// BSS max idle period in units of 1000 TU
    pub max_idle_period: Option<u16>,
    pub no_short_preamble: bool,
    pub no_short_slot_time: bool,
}

/// Answer to a (re)association request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssocStatus {
    Associated,
    /// An SA Query must confirm the existing association first
    RejectedTemporarily,
}

pub struct AccessPoint {
    pub(crate) config: Config,
    pub(crate) stations: StationRegistry,
    pub(crate) acl: AclManager,
    pub(crate) vlans: VlanTable,
    pub(crate) timers: TimerQueue<TimerEvent>,
    pub(crate) backends: Backends,
    pub(crate) audit: AuditLogger,
    pub(crate) events: Vec<ApEvent>,
}

impl AccessPoint {
    pub fn new(config: Config, backends: Backends) -> Self {
        let ap = AccessPoint {
            stations: StationRegistry::new(config.max_num_sta),
            acl: AclManager::new(&config),
            vlans: VlanTable::from_config(&config),
            timers: TimerQueue::new(),
            backends,
            audit: AuditLogger::disabled(),
            events: Vec::new(),
            config,
        };
        info!(
            interface = %ap.config.interface,
            ssid = %ap.config.ssid,
            policy = ?ap.config.macaddr_acl,
            max_stations = ap.config.max_num_sta,
            "Admission engine initialized"
        );
        ap
    }

    pub fn with_audit(mut self, audit: AuditLogger) -> Self {
        self.audit = audit;
        self.audit
            .log(AuditEntry::new(AuditEventType::EngineStart).with_details(self.config.interface.clone()));
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn station(&self, addr: MacAddr) -> Option<&Station> {
        self.stations.get(addr)
    }

    pub fn stations(&self) -> &StationRegistry {
        &self.stations
    }

    pub fn acl(&self) -> &AclManager {
        &self.acl
    }

    pub fn acl_mut(&mut self) -> &mut AclManager {
        &mut self.acl
    }

    pub fn vlans(&self) -> &VlanTable {
        &self.vlans
    }

    pub fn registry_stats(&self) -> RegistryStats {
        self.stations.stats()
    }

    pub fn acl_stats(&self) -> AclStats {
        self.acl.stats()
    }

    /// Drain queued indications
    pub fn take_events(&mut self) -> Vec<ApEvent> {
        std::mem::take(&mut self.events)
    }

    pub(crate) fn emit(&mut self, event: ApEvent) {
        debug!(event = ?event, "Queued upstream indication");
        self.events.push(event);
    }

    /// Earliest pending timer, if any
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// Run the static ACL, the RADIUS cache and, if needed, a RADIUS query
    pub fn allowed_address(&mut self, req: &AclRequest<'_>, now: Instant) -> AclResolution {
        let resolution = {
            let transport = match self.backends.radius.as_mut() {
                Some(transport) => Some(transport.as_mut() as &mut dyn RadiusTransport),
                None => None,
            };
            self.acl.resolve(req, transport, now)
        };

        if !req.is_probe {
            let event_type = match resolution.decision() {
                AclDecision::Accept => AuditEventType::AclAccept,
                AclDecision::Reject => AuditEventType::AclReject,
                AclDecision::Pending => AuditEventType::AclPending,
            };
            self.audit.log(AuditEntry::new(event_type).with_station(req.addr));
        }
        resolution
    }

    /// ACL gate for probe requests
    pub fn on_probe_request(&mut self, addr: MacAddr, now: Instant) -> AclDecision {
        self.allowed_address(&AclRequest::probe(addr), now).decision()
    }

    /// ACL gate for an authentication frame
    ///
    /// An accepted address gets a station entry carrying whatever the
    /// decision assigned. A pending decision is answered later through
    /// [`ApEvent::ReplayAuthFrame`].
    pub fn on_authentication_frame(&mut self, addr: MacAddr, frame: &[u8], now: Instant) -> AclDecision {
        let resolution = self.allowed_address(&AclRequest::auth_frame(addr, frame), now);
        match resolution {
            AclResolution::Pending => AclDecision::Pending,
            AclResolution::Reject => {
                info!(addr = %addr, "Authentication rejected by MAC ACL");
                AclDecision::Reject
            }
            AclResolution::Accept(info) | AclResolution::AcceptWithTimeout(info) => {
                self.admit(addr, &info, now)
            }
        }
    }

    fn admit(&mut self, addr: MacAddr, info: &RadiusStaInfo, now: Instant) -> AclDecision {
        let added = !self.stations.contains(addr);
        if let Err(e) = self.add_station(addr, now) {
            warn!(addr = %addr, error = %e, "Could not add station");
            return AclDecision::Reject;
        }

        if let Err(e) = self.set_radius_info(addr, info, now) {
            warn!(addr = %addr, error = %e, "Could not apply RADIUS attributes");
            if added && let Err(e) = self.remove_station(addr, now) {
                warn!(addr = %addr, error = %e, "Failed to remove rejected station");
            }
            return AclDecision::Reject;
        }

        if let Some(station) = self.stations.get_mut(addr) {
            station.set_authenticated(true);
        }
        debug!(addr = %addr, "Station authenticated");
        AclDecision::Accept
    }

    /// Ask RADIUS for a PSK while the 4-way handshake waits
    pub fn request_radius_psk(
        &mut self,
        addr: MacAddr,
        akm_suite: Option<u32>,
        anonce: &[u8],
        eapol: &[u8],
        now: Instant,
    ) -> Result<AclDecision> {
        let station = self
            .stations
            .get(addr)
            .ok_or(AdmissionError::UnknownStation(addr))?;
        let wpa = station
            .wpa
            .ok_or(AdmissionError::InvalidState(addr, "no WPA state"))?;

        let req = AclRequest {
            addr,
            frame: &[],
            is_probe: false,
            akm_suite,
            psk_flow: Some(PskFlow { wpa, anonce, eapol }),
        };
        let resolution = self.allowed_address(&req, now);
        if let Some(info) = resolution.info() {
            let info = info.clone();
            self.set_radius_info(addr, &info, now)?;
        }
        Ok(resolution.decision())
    }

    /// Look up or create a station and start its inactivity timer
    pub(crate) fn add_station(&mut self, addr: MacAddr, now: Instant) -> Result<()> {
        let exists = self.stations.contains(addr);
        self.stations.add(addr, now)?;
        if !exists {
            let after = Duration::from_secs(u64::from(self.config.ap_max_inactivity));
            self.arm_timer(addr, TimerSlot::Inactivity, now + after);
        }
        Ok(())
    }

    /// Apply the parameters of an accept to a station
    ///
    /// A VLAN that cannot be served fails the whole operation.
    pub fn set_radius_info(&mut self, addr: MacAddr, info: &RadiusStaInfo, now: Instant) -> Result<()> {
        if !self.stations.contains(addr) {
            return Err(AdmissionError::UnknownStation(addr));
        }

        if !info.vlan.is_empty() && !self.vlans.is_valid(&info.vlan) {
            warn!(addr = %addr, vlan = %info.vlan, "Invalid VLAN received from RADIUS server");
            return Err(VlanError::Invalid(info.vlan.clone()).into());
        }
        self.set_station_vlan(addr, &info.vlan)?;

        let psk_radius = self.config.wpa_psk_radius;
        let configured_interval = self.config.acct_interim_interval;
        let session_deadline = info
            .session_timeout
            .map(|secs| now + Duration::from_secs(u64::from(secs)));

        let Some(station) = self.stations.get_mut(addr) else {
            return Err(AdmissionError::UnknownStation(addr));
        };
        if station.vlan_id != 0 {
            debug!(addr = %addr, vlan_id = station.vlan_id, "Station assigned VLAN");
        }
        station.psk = match psk_radius {
            PskRadius::Ignored => None,
            _ => info.psk.clone(),
        };
        station.identity = info.identity.clone();
        station.radius_cui = info.radius_cui.clone();
        if configured_interval == 0 && info.acct_interim_interval != 0 {
            station.acct_interim_interval = info.acct_interim_interval;
        }
        station.session_timeout = session_deadline;

        match session_deadline {
            Some(deadline) => {
                debug!(addr = %addr, "Setting session timeout");
                self.arm_timer(addr, TimerSlot::Session, deadline);
            }
            None => self.cancel_timer(addr, TimerSlot::Session),
        }
        Ok(())
    }

    /// Handle a (re)association request from an authenticated station
    pub fn associate_station(&mut self, addr: MacAddr, params: AssocParams, now: Instant) -> Result<AssocStatus> {
        let station = self
            .stations
            .get(addr)
            .ok_or(AdmissionError::UnknownStation(addr))?;
        if !station.is_authenticated() {
            return Err(AdmissionError::InvalidState(addr, "not authenticated"));
        }

        if self.check_sa_query(addr, params.reassoc_ft, now) {
            info!(addr = %addr, "Association rejected temporarily, SA Query in progress");
            return Ok(AssocStatus::RejectedTemporarily);
        }

        let max_inactivity = {
            let Some(station) = self.stations.get_mut(addr) else {
                return Err(AdmissionError::UnknownStation(addr));
            };
            station.aid = params.aid;
            station.set_associated(true);
            station.remove_flags(
                StationFlags::WMM | StationFlags::MFP | StationFlags::PENDING_POLL | StationFlags::POLL_ACKED,
            );
            if params.wmm {
                station.insert_flags(StationFlags::WMM);
            }
            if params.mfp {
                station.insert_flags(StationFlags::MFP);
            }
            if params.reassoc_ft {
                station.insert_flags(StationFlags::FT_AUTH);
            }
            station.max_idle_period = params.max_idle_period;
            station.sa_query.timed_out = false;
            station.phase = TimeoutPhase::Nullfunc;
            station.max_inactivity(self.config.ap_max_inactivity)
        };
        self.stations
            .set_capabilities(addr, params.no_short_preamble, params.no_short_slot_time);

        self.init_collaborators(addr);
        self.arm_timer(
            addr,
            TimerSlot::Inactivity,
            now + Duration::from_secs(u64::from(max_inactivity)),
        );

        self.bind_station_vlan(addr)?;

        if let Some(handle) = self.stations.get(addr).and_then(|s| s.eapol) {
            self.backends.ieee8021x.notify_port_enabled(handle, true);
        }
        info!(addr = %addr, aid = params.aid, "Station associated");
        Ok(AssocStatus::Associated)
    }

    fn init_collaborators(&mut self, addr: MacAddr) {
        let Some(station) = self.stations.get(addr) else {
            return;
        };
        let needs_wpa = station.wpa.is_none();
        let needs_eapol = station.eapol.is_none();

        let wpa = if needs_wpa {
            self.backends.wpa.init_station(addr)
        } else {
            None
        };
        let eapol = if needs_eapol {
            self.backends.ieee8021x.init_station(addr)
        } else {
            None
        };

        if let Some(station) = self.stations.get_mut(addr) {
            if wpa.is_some() {
                station.wpa = wpa;
            }
            if eapol.is_some() {
                station.eapol = eapol;
            }
        }
    }

    /// Open the controlled port once key management has completed
    pub fn authorize_station(&mut self, addr: MacAddr) -> Result<()> {
        let station = self
            .stations
            .get_mut(addr)
            .ok_or(AdmissionError::UnknownStation(addr))?;
        if !station.is_associated() {
            return Err(AdmissionError::InvalidState(addr, "not associated"));
        }
        if station.is_authorized() {
            return Ok(());
        }
        station.set_authorized(true);
        let eapol = station.eapol;

        if let Some(handle) = eapol {
            self.backends.ieee8021x.notify_port_valid(handle, true);
        }
        self.backends.accounting.station_start(addr);
        info!(addr = %addr, "Station authorized");
        Ok(())
    }

    /// Record that `partner` is a link of the multi-link association owned by `owner`
    pub fn link_mld_station(&mut self, owner: MacAddr, partner: MacAddr) -> Result<()> {
        if !self.stations.contains(partner) {
            return Err(AdmissionError::UnknownStation(partner));
        }
        let station = self
            .stations
            .get_mut(owner)
            .ok_or(AdmissionError::UnknownStation(owner))?;
        station.mld_assoc_link = Some(owner);
        if owner != partner && !station.mld_partners.contains(&partner) {
            station.mld_partners.push(partner);
        }
        if let Some(station) = self.stations.get_mut(partner) {
            station.mld_assoc_link = Some(owner);
        }
        Ok(())
    }

    /// Driver TX status for the liveness poll
    pub fn on_poll_result(&mut self, addr: MacAddr, acked: bool) {
        let Some(station) = self.stations.get_mut(addr) else {
            debug!(addr = %addr, "Poll result for unknown station");
            return;
        };
        if !station.has(StationFlags::PENDING_POLL) {
            debug!(addr = %addr, "Poll result without pending poll");
            return;
        }
        if acked {
            debug!(addr = %addr, "Station ACKed data poll");
            station.remove_flags(StationFlags::PENDING_POLL);
            station.insert_flags(StationFlags::POLL_ACKED);
        } else {
            debug!(addr = %addr, "Data poll not acknowledged");
        }
    }

    /// Entry point for RADIUS authentication replies
    pub fn on_radius_message(&mut self, reply: &Packet, now: Instant) -> ReplyDisposition {
        let Some(transport) = self.backends.radius.as_deref() else {
            return ReplyDisposition::NotMine;
        };

        match self.acl.handle_reply(reply, transport, &self.vlans, now) {
            ReplyOutcome::NotMine => ReplyDisposition::NotMine,
            ReplyOutcome::InvalidAuthenticator { addr, error } => {
                self.audit.log(
                    AuditEntry::new(AuditEventType::RadiusReplyDropped)
                        .with_station(addr)
                        .with_radius_id(reply.identifier)
                        .with_details(error.to_string()),
                );
                ReplyDisposition::InvalidAuthenticator
            }
            ReplyOutcome::Dropped { addr, code } => {
                self.audit.log(
                    AuditEntry::new(AuditEventType::RadiusReplyDropped)
                        .with_station(addr)
                        .with_radius_id(reply.identifier)
                        .with_details(format!("unexpected code {:?}", code)),
                );
                ReplyDisposition::Handled
            }
            ReplyOutcome::Decided {
                addr,
                verdict,
                kind,
                waiting_psk,
            } => {
                let event_type = if verdict.is_accept() {
                    AuditEventType::AclAccept
                } else {
                    AuditEventType::AclReject
                };
                self.audit.log(
                    AuditEntry::new(event_type)
                        .with_station(addr)
                        .with_radius_id(reply.identifier),
                );
                self.finish_query(addr, verdict, kind, now);
                if let Some(handle) = waiting_psk {
                    self.resume_psk_flow(addr, handle, verdict, now);
                }
                ReplyDisposition::Handled
            }
        }
    }

    fn finish_query(&mut self, addr: MacAddr, verdict: AclVerdict, kind: QueryKind, now: Instant) {
        match kind {
            QueryKind::AuthFrame(frame) => self.emit(ApEvent::ReplayAuthFrame { addr, frame }),
            QueryKind::Psk(handle) => self.resume_psk_flow(addr, handle, verdict, now),
        }
    }

    fn resume_psk_flow(&mut self, addr: MacAddr, handle: WpaHandle, verdict: AclVerdict, now: Instant) {
        let Some(station) = self.stations.get(addr) else {
            warn!(addr = %addr, "No station entry for the RADIUS PSK response");
            return;
        };
        if station.wpa != Some(handle) {
            warn!(addr = %addr, "WPA state changed while waiting for RADIUS PSK");
            return;
        }

        let psk = self
            .acl
            .cached(addr, now)
            .and_then(|decision| decision.info.psk.clone());
        let success = verdict.is_accept() && psk.is_some();
        if success && let Some(station) = self.stations.get_mut(addr) {
            station.psk = psk;
        }
        debug!(addr = %addr, success = success, "Resuming handshake after RADIUS PSK lookup");
        self.backends.wpa.resume_psk_flow(handle, success);
    }

    /// Periodic expiry of cached decisions and stale queries
    pub fn sweep_expired(&mut self, now: Instant) {
        for addr in self.acl.sweep(now) {
            self.backends.driver.release_acl_entry(addr);
        }
    }

    /// Stop accounting and release 802.1X state of a departing station
    pub(crate) fn stop_station_services(&mut self, addr: MacAddr) {
        let Some(station) = self.stations.get_mut(addr) else {
            return;
        };
        let was_authorized = station.is_authorized();
        station.set_authorized(false);
        let eapol = station.eapol.take();

        if let Some(handle) = eapol {
            self.backends.ieee8021x.notify_port_enabled(handle, false);
            self.backends.ieee8021x.free_station(handle);
        }
        if was_authorized {
            self.backends.accounting.station_stop(addr);
        }
    }

    /// Destroy a station and everything it holds
    ///
    /// Safe to call from any timer handler of the same station; its other
    /// timers are cancelled first and any that already fired are ignored.
    pub fn remove_station(&mut self, addr: MacAddr, _now: Instant) -> Result<()> {
        let station = self
            .stations
            .get(addr)
            .ok_or(AdmissionError::UnknownStation(addr))?;
        let timer_ids: Vec<_> = station.timers.all().collect();
        let (vlan_id, bound) = (station.vlan_id, station.vlan_id_bound);
        let wpa = station.wpa;

        for id in timer_ids {
            self.timers.cancel(id);
        }
        self.release_station_vlans(vlan_id, bound);
        if let Some(handle) = wpa {
            self.backends.wpa.deinit_station(handle);
        }
        self.stop_station_services(addr);

        if let Err(e) = self.backends.driver.remove_station_entry(addr) {
            debug!(addr = %addr, error = %e, "Could not remove station from driver");
        }
        self.unlink_mld(addr);

        let Some(station) = self.stations.remove(addr) else {
            error!(addr = %addr, "Station vanished during removal");
            return Err(AdmissionError::UnknownStation(addr));
        };
        drop(station);

        info!(addr = %addr, "Station removed");
        self.audit
            .log(AuditEntry::new(AuditEventType::StationRemoved).with_station(addr));
        self.emit(ApEvent::StationRemoved { addr });
        Ok(())
    }

    fn unlink_mld(&mut self, addr: MacAddr) {
        let Some(station) = self.stations.get_mut(addr) else {
            return;
        };
        let owner = station.mld_assoc_link.take();
        let partners = std::mem::take(&mut station.mld_partners);

        match owner {
            Some(owner) if owner != addr => {
                if let Some(owner) = self.stations.get_mut(owner) {
                    owner.mld_partners.retain(|p| *p != addr);
                }
            }
            _ => {
                for partner in partners {
                    if let Some(partner) = self.stations.get_mut(partner) {
                        partner.mld_assoc_link = None;
                    }
                }
            }
        }
    }

    /// Authenticator key material of a station's 802.1X session
    pub fn station_key_material(&self, addr: MacAddr) -> Option<Vec<u8>> {
        let handle = self.stations.get(addr)?.eapol?;
        self.backends.ieee8021x.key_material(handle)
    }

    /// PMK the WPA authenticator uses for a station
    pub fn station_pmk(&self, addr: MacAddr) -> Option<Vec<u8>> {
        let handle = self.stations.get(addr)?.wpa?;
        self.backends.wpa.pmk(handle)
    }

    /// Tear everything down
    pub fn shutdown(&mut self, now: Instant) {
        let addrs = self.stations.addresses();
        let count = addrs.len();
        for addr in addrs {
            if let Err(e) = self.remove_station(addr, now) {
                warn!(addr = %addr, error = %e, "Failed to remove station during shutdown");
            }
        }
        self.acl.flush();
        self.timers.cancel_all();
        self.vlans.release_all(self.backends.driver.as_mut());

        info!(stations = count, "Admission engine stopped");
        self.audit.log(
            AuditEntry::new(AuditEventType::EngineStop).with_details(format!("{} stations removed", count)),
        );
    }
}

impl RadiusReplyHandler for AccessPoint {
    fn message_class(&self) -> RadiusMessageClass {
        RadiusMessageClass::Auth
    }

    fn handle_reply(&mut self, reply: &Packet, now: Instant) -> ReplyDisposition {
        self.on_radius_message(reply, now)
    }
}
