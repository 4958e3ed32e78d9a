//! Station lifecycle timers and disconnects
//!
//! An associated station walks NULLFUNC -> DISASSOC -> DEAUTH -> removal
//! while it stays idle. Each step is one inactivity timer firing; activity
//! reported by the driver, or an acknowledged poll, drops it back to
//! NULLFUNC.

use crate::ap::{AccessPoint, ApEvent, TimerEvent};
use crate::audit::{AuditEntry, AuditEventType};
use crate::error::{AdmissionError, DriverError, Result};
use crate::mac::{MacAddr, ReasonCode};
use crate::station::{StationFlags, TimeoutPhase, TimerSlot};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Which teardown a driver completion refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectKind {
    Disassoc,
    Deauth,
}

impl DisconnectKind {
    fn pending_flag(self) -> StationFlags {
        match self {
            DisconnectKind::Disassoc => StationFlags::PENDING_DISASSOC_CB,
            DisconnectKind::Deauth => StationFlags::PENDING_DEAUTH_CB,
        }
    }

    fn slot(self) -> TimerSlot {
        match self {
            DisconnectKind::Disassoc => TimerSlot::DisassocCallback,
            DisconnectKind::Deauth => TimerSlot::DeauthCallback,
        }
    }
}

fn secs(value: u32) -> Duration {
    Duration::from_secs(u64::from(value))
}

impl AccessPoint {
    /// Replace whatever timer occupies `slot` with one firing at `deadline`
    pub(crate) fn arm_timer(&mut self, addr: MacAddr, slot: TimerSlot, deadline: Instant) {
        let Some(station) = self.stations.get_mut(addr) else {
            return;
        };
        let entry = station.timers.slot_mut(slot);
        if let Some(old) = entry.take() {
            self.timers.cancel(old);
        }
        *entry = Some(self.timers.schedule(deadline, TimerEvent { slot, addr }));
    }

    pub(crate) fn cancel_timer(&mut self, addr: MacAddr, slot: TimerSlot) {
        if let Some(station) = self.stations.get_mut(addr)
            && let Some(id) = station.timers.slot_mut(slot).take()
        {
            self.timers.cancel(id);
        }
    }

    /// Fire every timer due at `now`
    pub fn handle_timers(&mut self, now: Instant) {
        while let Some((id, event)) = self.timers.pop_expired(now) {
            let Some(station) = self.stations.get_mut(event.addr) else {
                debug!(addr = %event.addr, slot = ?event.slot, "Timer for removed station ignored");
                continue;
            };
            let entry = station.timers.slot_mut(event.slot);
            if *entry != Some(id) {
                debug!(addr = %event.addr, slot = ?event.slot, "Stale timer ignored");
                continue;
            }
            *entry = None;

            match event.slot {
                TimerSlot::Inactivity => self.handle_inactivity_timer(event.addr, now),
                TimerSlot::Session => self.handle_session_timeout(event.addr, now),
                TimerSlot::DisassocCallback => {
                    debug!(addr = %event.addr, "Disassociation callback timed out");
                    self.complete_disconnect(event.addr, DisconnectKind::Disassoc);
                }
                TimerSlot::DeauthCallback => {
                    debug!(addr = %event.addr, "Deauthentication callback timed out");
                    self.complete_disconnect(event.addr, DisconnectKind::Deauth);
                }
                TimerSlot::SaQuery => self.handle_sa_query_timer(event.addr, now),
            }
        }
    }

    fn jitter(&mut self) -> u32 {
        let bound = self.config.inactivity_jitter;
        self.backends
            .random
            .next_u32()
            .map(|value| value % bound.saturating_add(1))
            .unwrap_or(0)
    }

    /// One step of the inactivity state machine
    pub(crate) fn handle_inactivity_timer(&mut self, addr: MacAddr, now: Instant) {
        let Some(station) = self.stations.get(addr) else {
            return;
        };

        if station.phase == TimeoutPhase::Remove {
            info!(addr = %addr, "Deauthenticated due to local deauth request");
            if let Err(e) = self.remove_station(addr, now) {
                warn!(addr = %addr, error = %e, "Failed to remove station");
            }
            return;
        }

        let max_inactivity = station.max_inactivity(self.config.ap_max_inactivity);
        let associated = station.is_associated();
        let mut phase = station.phase;
        let mut skip_poll = false;

        if associated && matches!(phase, TimeoutPhase::Nullfunc | TimeoutPhase::Disassoc) {
            match self.idle_seconds(addr) {
                Err(AdmissionError::DriverEntryMissing(_)) => {
                    info!(addr = %addr, "Station has lost its driver entry");
                    phase = TimeoutPhase::Disassoc;
                    skip_poll = true;
                }
                Err(e) => {
                    debug!(addr = %addr, error = %e, "Could not get station idle time from driver");
                    self.arm_timer(addr, TimerSlot::Inactivity, now + secs(max_inactivity));
                    return;
                }
                Ok(idle) if idle < max_inactivity => {
                    let next = max_inactivity - idle + self.jitter();
                    debug!(addr = %addr, idle = idle, next = next, "Station has been active");
                    if let Some(station) = self.stations.get_mut(addr) {
                        station.phase = TimeoutPhase::Nullfunc;
                        station.remove_flags(StationFlags::PENDING_POLL | StationFlags::POLL_ACKED);
                    }
                    self.arm_timer(addr, TimerSlot::Inactivity, now + secs(next));
                    return;
                }
                Ok(idle) => {
                    debug!(
                        addr = %addr,
                        idle = idle,
                        max = max_inactivity,
                        "Station has been inactive too long"
                    );
                    if self.config.skip_inactivity_poll {
                        phase = TimeoutPhase::Disassoc;
                        skip_poll = true;
                    }
                }
            }
        }

        if associated && phase == TimeoutPhase::Disassoc && !skip_poll {
            let Some(station) = self.stations.get_mut(addr) else {
                return;
            };
            if station.has(StationFlags::POLL_ACKED) {
                debug!(addr = %addr, "Station has ACKed data poll");
                station.phase = TimeoutPhase::Nullfunc;
                station.remove_flags(StationFlags::PENDING_POLL | StationFlags::POLL_ACKED);
                self.arm_timer(addr, TimerSlot::Inactivity, now + secs(max_inactivity));
                return;
            }
            if !station.has(StationFlags::PENDING_POLL) {
                debug!(addr = %addr, "Polling station");
                station.phase = TimeoutPhase::Disassoc;
                station.insert_flags(StationFlags::PENDING_POLL);
                let qos = station.has(StationFlags::WMM);
                self.backends.driver.poll_client(addr, qos);
                self.arm_timer(addr, TimerSlot::Inactivity, now + secs(self.config.disassoc_delay));
                return;
            }
        }

        if !associated
            && matches!(
                phase,
                TimeoutPhase::Nullfunc | TimeoutPhase::Disassoc | TimeoutPhase::DisassocFromCli
            )
        {
            phase = TimeoutPhase::Deauth;
        }

        self.advance_phase(addr, phase, now);
    }

    fn advance_phase(&mut self, addr: MacAddr, phase: TimeoutPhase, now: Instant) {
        match phase {
            TimeoutPhase::Nullfunc => {
                if let Some(station) = self.stations.get_mut(addr) {
                    station.phase = TimeoutPhase::Disassoc;
                }
                self.arm_timer(addr, TimerSlot::Inactivity, now + secs(self.config.disassoc_delay));
            }
            TimeoutPhase::Disassoc | TimeoutPhase::DisassocFromCli => {
                let reason = if phase == TimeoutPhase::Disassoc {
                    ReasonCode::REASON_INACTIVITY
                } else {
                    ReasonCode::INVALID_AUTHENTICATION
                };
                if phase == TimeoutPhase::Disassoc {
                    info!(addr = %addr, "Timeout, sending disassociation");
                    if let Err(e) = self.backends.driver.disassociate(addr, reason) {
                        warn!(addr = %addr, error = %e, "Failed to send disassociation");
                    }
                }

                self.stop_station_services(addr);
                self.end_session(addr);
                if let Some(station) = self.stations.get_mut(addr) {
                    station.set_associated(false);
                    station.remove_flags(StationFlags::PENDING_POLL | StationFlags::POLL_ACKED);
                    station.phase = TimeoutPhase::Deauth;
                }
                self.arm_timer(addr, TimerSlot::Inactivity, now + secs(self.config.deauth_delay));

                info!(addr = %addr, reason = %reason, "Station disassociated due to inactivity");
                self.audit.log(
                    AuditEntry::new(AuditEventType::StationDisassociated)
                        .with_station(addr)
                        .with_reason(reason)
                        .with_details("inactivity"),
                );
                self.emit(ApEvent::DisassociateIndication { addr, reason });
            }
            TimeoutPhase::Deauth | TimeoutPhase::Remove => {
                let reason = ReasonCode::INVALID_AUTHENTICATION;
                let sent = if self.config.dmg {
                    self.backends.driver.disassociate(addr, reason)
                } else {
                    self.backends.driver.deauthenticate(addr, reason)
                };
                if let Err(e) = sent {
                    warn!(addr = %addr, error = %e, "Failed to send deauthentication");
                }

                info!(addr = %addr, "Station deauthenticated due to inactivity");
                self.audit.log(
                    AuditEntry::new(AuditEventType::StationDeauthenticated)
                        .with_station(addr)
                        .with_reason(reason)
                        .with_details("inactivity"),
                );
                self.emit(ApEvent::DeauthenticateIndication { addr, reason });
                if let Err(e) = self.remove_station(addr, now) {
                    warn!(addr = %addr, error = %e, "Failed to remove station");
                }
            }
        }
    }

    /// Idle time from the driver, with failures mapped to admission errors
    fn idle_seconds(&mut self, addr: MacAddr) -> Result<u32> {
        self.backends
            .driver
            .poll_idle_seconds(addr)
            .map_err(|e| match e {
                DriverError::EntryMissing => AdmissionError::DriverEntryMissing(addr),
                DriverError::QueryFailed(_) => AdmissionError::DriverQueryFailed(addr),
                other => AdmissionError::Driver(other),
            })
    }

    /// A station on its way out keeps no session deadline
    fn end_session(&mut self, addr: MacAddr) {
        if let Some(station) = self.stations.get_mut(addr) {
            station.session_timeout = None;
        }
        self.cancel_timer(addr, TimerSlot::Session);
    }

    fn handle_session_timeout(&mut self, addr: MacAddr, now: Instant) {
        info!(addr = %addr, "Deauthenticating station due to session timeout");
        self.end_session(addr);
        if let Err(e) = self.deauthenticate(addr, ReasonCode::INVALID_AUTHENTICATION, now) {
            warn!(addr = %addr, error = %e, "Session timeout deauthentication failed");
        }
    }

    fn arm_disconnect_callback(&mut self, addr: MacAddr, kind: DisconnectKind, now: Instant) {
        let timeout = self.config.disconnect_callback_timeout();
        if let Some(station) = self.stations.get_mut(addr) {
            station.insert_flags(kind.pending_flag());
        }
        self.arm_timer(addr, kind.slot(), now + timeout);
    }

    /// Disassociate a station and wait for the driver to confirm
    pub fn disassociate(&mut self, addr: MacAddr, reason: ReasonCode, now: Instant) -> Result<()> {
        if !self.stations.contains(addr) {
            return Err(AdmissionError::UnknownStation(addr));
        }
        info!(addr = %addr, reason = %reason, "Disassociating station");
        if let Err(e) = self.backends.driver.disassociate(addr, reason) {
            warn!(addr = %addr, error = %e, "Failed to send disassociation");
        }

        self.stop_station_services(addr);
        self.end_session(addr);
        if let Some(station) = self.stations.get_mut(addr) {
            station.set_associated(false);
            station.phase = TimeoutPhase::Deauth;
            station.disassoc_reason = reason;
        }
        self.arm_timer(
            addr,
            TimerSlot::Inactivity,
            now + secs(self.config.inactivity_after_disassoc),
        );
        self.arm_disconnect_callback(addr, DisconnectKind::Disassoc, now);
        Ok(())
    }

    /// Deauthenticate a station and wait for the driver to confirm
    ///
    /// Directional multi-gigabit links have no deauthentication, so the
    /// station is disassociated instead.
    pub fn deauthenticate(&mut self, addr: MacAddr, reason: ReasonCode, now: Instant) -> Result<()> {
        if self.config.dmg {
            return self.disassociate(addr, reason, now);
        }
        if !self.stations.contains(addr) {
            return Err(AdmissionError::UnknownStation(addr));
        }
        info!(addr = %addr, reason = %reason, "Deauthenticating station");
        if let Err(e) = self.backends.driver.deauthenticate(addr, reason) {
            warn!(addr = %addr, error = %e, "Failed to send deauthentication");
        }

        self.stop_station_services(addr);
        self.end_session(addr);
        if let Some(station) = self.stations.get_mut(addr) {
            station.set_authenticated(false);
            station.phase = TimeoutPhase::Remove;
            station.deauth_reason = reason;
        }
        self.arm_timer(
            addr,
            TimerSlot::Inactivity,
            now + secs(self.config.inactivity_after_deauth),
        );
        self.arm_disconnect_callback(addr, DisconnectKind::Deauth, now);
        Ok(())
    }

    /// Administrative disconnect
    ///
    /// The disassociation frame goes out now; the inactivity machinery then
    /// finishes the teardown from the DISASSOC_FROM_CLI phase.
    pub fn disconnect_from_cli(&mut self, addr: MacAddr, reason: ReasonCode, now: Instant) -> Result<()> {
        if !self.stations.contains(addr) {
            return Err(AdmissionError::UnknownStation(addr));
        }
        info!(addr = %addr, reason = %reason, "Disconnect requested");
        if let Err(e) = self.backends.driver.disassociate(addr, reason) {
            warn!(addr = %addr, error = %e, "Failed to send disassociation");
        }
        if let Some(station) = self.stations.get_mut(addr) {
            station.phase = TimeoutPhase::DisassocFromCli;
            station.disassoc_reason = reason;
        }
        self.arm_timer(addr, TimerSlot::Inactivity, now);
        Ok(())
    }

    /// Disconnect every link of a multi-link association
    ///
    /// Partner links go first; the owning link holds the shared state and is
    /// torn down last.
    pub fn disconnect_mld(
        &mut self,
        addr: MacAddr,
        kind: DisconnectKind,
        reason: ReasonCode,
        now: Instant,
    ) -> Result<()> {
        let station = self
            .stations
            .get(addr)
            .ok_or(AdmissionError::UnknownStation(addr))?;
        let owner = station.mld_assoc_link.unwrap_or(addr);
        let partners: Vec<MacAddr> = self
            .stations
            .get(owner)
            .map(|s| s.mld_partners.iter().copied().filter(|p| *p != owner).collect())
            .unwrap_or_default();

        for link in partners.into_iter().chain(std::iter::once(owner)) {
            if !self.stations.contains(link) {
                continue;
            }
            match kind {
                DisconnectKind::Disassoc => self.disassociate(link, reason, now)?,
                DisconnectKind::Deauth => self.deauthenticate(link, reason, now)?,
            }
        }
        Ok(())
    }

    /// Driver confirmed transmission of a disconnect frame
    pub fn on_disconnect_callback(&mut self, addr: MacAddr, kind: DisconnectKind) {
        let Some(station) = self.stations.get(addr) else {
            debug!(addr = %addr, kind = ?kind, "Disconnect callback for unknown station");
            return;
        };
        if !station.has(kind.pending_flag()) {
            debug!(addr = %addr, kind = ?kind, "Ignoring disconnect callback without pending teardown");
            return;
        }
        self.cancel_timer(addr, kind.slot());
        self.complete_disconnect(addr, kind);
    }

    fn complete_disconnect(&mut self, addr: MacAddr, kind: DisconnectKind) {
        let Some(station) = self.stations.get_mut(addr) else {
            return;
        };
        if !station.has(kind.pending_flag()) {
            return;
        }
        station.remove_flags(kind.pending_flag());
        let reason = match kind {
            DisconnectKind::Disassoc => station.disassoc_reason,
            DisconnectKind::Deauth => station.deauth_reason,
        };

        if let Err(e) = self.backends.driver.remove_station_entry(addr) {
            debug!(addr = %addr, error = %e, "Could not remove station from driver");
        }

        let (event_type, event) = match kind {
            DisconnectKind::Disassoc => (
                AuditEventType::StationDisassociated,
                ApEvent::DisassociateIndication { addr, reason },
            ),
            DisconnectKind::Deauth => (
                AuditEventType::StationDeauthenticated,
                ApEvent::DeauthenticateIndication { addr, reason },
            ),
        };
        self.audit.log(
            AuditEntry::new(event_type)
                .with_station(addr)
                .with_reason(reason),
        );
        self.emit(event);
    }
}
