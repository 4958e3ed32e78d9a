//! SA Query procedure (IEEE 802.11w)
//!
//! Before an MFP station may replace its association, the access point
//! checks that the current one is still alive by sending SA Query requests.
//! The window is bounded by wall time since the first attempt, not by the
//! number of attempts.

use crate::ap::{AccessPoint, ApEvent};
use crate::audit::{AuditEntry, AuditEventType};
use crate::error::{AdmissionError, Result};
use crate::mac::MacAddr;
use crate::station::{StationFlags, TimerSlot};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Upper bound on attempts in one procedure
pub const SA_QUERY_MAX_ATTEMPTS: usize = 1000;

/// Transaction id used when no randomness is available
pub const FALLBACK_TRANS_ID: [u8; 2] = [0x12, 0x34];

impl AccessPoint {
    /// Send the next SA Query request, starting a procedure if none runs
    pub fn start_sa_query(&mut self, addr: MacAddr, now: Instant) -> Result<()> {
        let station = self
            .stations
            .get(addr)
            .ok_or(AdmissionError::UnknownStation(addr))?;
        let count = station.sa_query.count();

        if count > 0 && self.check_sa_query_timeout(addr, now) {
            return Ok(());
        }
        if count >= SA_QUERY_MAX_ATTEMPTS {
            warn!(addr = %addr, attempts = count, "SA Query attempt limit reached");
            self.abort_sa_query(addr);
            return Ok(());
        }

        let mut trans_id = [0u8; 2];
        if !self.backends.random.fill(&mut trans_id) {
            trans_id = FALLBACK_TRANS_ID;
        }

        let retry = self.config.sa_query_retry_timeout();
        let Some(station) = self.stations.get_mut(addr) else {
            return Err(AdmissionError::UnknownStation(addr));
        };
        if count == 0 {
            station.sa_query.start = Some(now);
        }
        station.sa_query.trans_ids.push(trans_id);
        let attempt = station.sa_query.count();

        self.arm_timer(addr, TimerSlot::SaQuery, now + retry);
        debug!(addr = %addr, attempt = attempt, "Association SA Query attempt");
        if let Err(e) = self.backends.driver.send_sa_query(addr, trans_id) {
            warn!(addr = %addr, error = %e, "Failed to send SA Query request");
        }
        Ok(())
    }

    pub(crate) fn handle_sa_query_timer(&mut self, addr: MacAddr, now: Instant) {
        if let Err(e) = self.start_sa_query(addr, now) {
            debug!(addr = %addr, error = %e, "SA Query retry skipped");
        }
    }

    /// Whether the running procedure has exceeded its window
    ///
    /// Reports a timeout once: the procedure state is cleared and the station
    /// is marked as timed out.
    pub fn check_sa_query_timeout(&mut self, addr: MacAddr, now: Instant) -> bool {
        let max = self.config.sa_query_max_timeout();
        let Some(station) = self.stations.get_mut(addr) else {
            return false;
        };
        let Some(start) = station.sa_query.start else {
            return false;
        };
        if now.saturating_duration_since(start) <= max {
            return false;
        }
        self.abort_sa_query(addr);
        true
    }

    /// Give up on the running procedure and report the timeout once
    fn abort_sa_query(&mut self, addr: MacAddr) {
        let Some(station) = self.stations.get_mut(addr) else {
            return;
        };
        info!(addr = %addr, attempts = station.sa_query.count(), "Association SA Query timed out");
        station.sa_query.timed_out = true;
        station.sa_query.reset();
        self.cancel_timer(addr, TimerSlot::SaQuery);
        self.audit
            .log(AuditEntry::new(AuditEventType::SaQueryTimeout).with_station(addr));
        self.emit(ApEvent::SaQueryTimedOut { addr });
    }

    /// SA Query response from a station
    ///
    /// Returns true when `trans_id` answered one of the outstanding requests.
    pub fn on_sa_query_response(&mut self, addr: MacAddr, trans_id: [u8; 2]) -> bool {
        let Some(station) = self.stations.get_mut(addr) else {
            debug!(addr = %addr, "SA Query response from unknown station");
            return false;
        };
        if !station.sa_query.trans_ids.contains(&trans_id) {
            debug!(addr = %addr, "No matching SA Query transaction identifier found");
            return false;
        }

        debug!(addr = %addr, "Reply to pending SA Query received");
        station.sa_query.reset();
        self.cancel_timer(addr, TimerSlot::SaQuery);
        true
    }

    /// Association gate for MFP stations
    ///
    /// Returns true when a (re)association must be refused for now because
    /// the existing protected association has not been disproven yet. FT
    /// reassociation is exempt.
    pub fn check_sa_query(&mut self, addr: MacAddr, reassoc_ft: bool, now: Instant) -> bool {
        let Some(station) = self.stations.get(addr) else {
            return false;
        };
        let required = StationFlags::ASSOC | StationFlags::MFP | StationFlags::AUTHORIZED;
        if !station.has(required) {
            return false;
        }

        if !station.sa_query.timed_out && station.sa_query.is_running() {
            self.check_sa_query_timeout(addr, now);
        }

        let Some(station) = self.stations.get(addr) else {
            return false;
        };
        if station.sa_query.timed_out || reassoc_ft {
            return false;
        }

        if !station.sa_query.is_running()
            && let Err(e) = self.start_sa_query(addr, now)
        {
            warn!(addr = %addr, error = %e, "Could not start SA Query");
        }
        true
    }
}
