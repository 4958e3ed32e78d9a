//! Per-station state
//!
//! A [`Station`] is created on the first accepted authentication from an
//! address and lives in the [`StationRegistry`] until the engine destroys it.

mod registry;

pub use registry::{RegistryStats, StationRegistry};

use crate::acl::PskList;
use crate::external::{EapolHandle, WpaHandle};
use crate::mac::{MacAddr, ReasonCode};
use crate::timer::TimerId;
use crate::vlan::VlanDescription;
use bitflags::bitflags;
use std::sync::Arc;
use std::time::Instant;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StationFlags: u32 {
        const AUTH = 1 << 0;
        const ASSOC = 1 << 1;
        const AUTHORIZED = 1 << 2;
        /// Liveness poll sent, no ACK seen yet
        const PENDING_POLL = 1 << 3;
        /// Liveness poll acknowledged since it was sent
        const POLL_ACKED = 1 << 4;
        const PENDING_DISASSOC_CB = 1 << 5;
        const PENDING_DEAUTH_CB = 1 << 6;
        /// Management frame protection negotiated
        const MFP = 1 << 7;
        const WDS = 1 << 8;
        const WMM = 1 << 9;
        /// Authenticated with FT
        const FT_AUTH = 1 << 10;
    }
}

/// Next step the inactivity timer takes
///
/// A freshly added station starts in `Nullfunc`, which is also the active
/// state: it only advances once the station has been idle too long.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeoutPhase {
    #[default]
    Nullfunc,
    Disassoc,
    /// Administrative disconnect, disassociation frame already sent
    DisassocFromCli,
    Deauth,
    Remove,
}

/// SA Query procedure state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaQueryState {
    /// One id per attempt, oldest first
    pub trans_ids: Vec<[u8; 2]>,
    /// Start of the running procedure
    pub start: Option<Instant>,
    pub timed_out: bool,
}

impl SaQueryState {
    pub fn count(&self) -> usize {
        self.trans_ids.len()
    }

    pub fn is_running(&self) -> bool {
        !self.trans_ids.is_empty()
    }

    pub(crate) fn reset(&mut self) {
        self.trans_ids.clear();
        self.start = None;
    }
}

/// Per-station timer kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerSlot {
    Inactivity,
    Session,
    DisassocCallback,
    DeauthCallback,
    SaQuery,
}

/// Timer slots; each holds at most one outstanding timer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct StationTimers {
    pub inactivity: Option<TimerId>,
    pub session: Option<TimerId>,
    pub disassoc_cb: Option<TimerId>,
    pub deauth_cb: Option<TimerId>,
    pub sa_query: Option<TimerId>,
}

impl StationTimers {
    pub fn slot_mut(&mut self, slot: TimerSlot) -> &mut Option<TimerId> {
        match slot {
            TimerSlot::Inactivity => &mut self.inactivity,
            TimerSlot::Session => &mut self.session,
            TimerSlot::DisassocCallback => &mut self.disassoc_cb,
            TimerSlot::DeauthCallback => &mut self.deauth_cb,
            TimerSlot::SaQuery => &mut self.sa_query,
        }
    }

    pub fn slot(&self, slot: TimerSlot) -> Option<TimerId> {
        match slot {
            TimerSlot::Inactivity => self.inactivity,
            TimerSlot::Session => self.session,
            TimerSlot::DisassocCallback => self.disassoc_cb,
            TimerSlot::DeauthCallback => self.deauth_cb,
            TimerSlot::SaQuery => self.sa_query,
        }
    }

    pub fn all(&self) -> impl Iterator<Item = TimerId> {
        [
            self.inactivity,
            self.session,
            self.disassoc_cb,
            self.deauth_cb,
            self.sa_query,
        ]
        .into_iter()
        .flatten()
    }
}

#[derive(Debug)]
pub struct Station {
    pub addr: MacAddr,
    pub(crate) flags: StationFlags,
    pub aid: u16,
    /// Assigned VLAN, 0 for none
    pub vlan_id: u16,
    /// VLAN currently pushed to the driver
    pub vlan_id_bound: u16,
    pub vlan_desc: Option<VlanDescription>,
    pub phase: TimeoutPhase,
    pub disassoc_reason: ReasonCode,
    pub deauth_reason: ReasonCode,
    pub sa_query: SaQueryState,
    /// Absolute end of the RADIUS session, if limited
    pub session_timeout: Option<Instant>,
    pub eapol: Option<EapolHandle>,
    pub wpa: Option<WpaHandle>,
    pub psk: Option<Arc<PskList>>,
    pub identity: Option<String>,
    pub radius_cui: Option<String>,
    pub acct_interim_interval: u32,
    /// Negotiated BSS max idle period in units of 1000 TU
    pub max_idle_period: Option<u16>,
    pub no_short_preamble: bool,
    pub no_short_slot_time: bool,
    /// Owning link of a multi-link association
    pub mld_assoc_link: Option<MacAddr>,
    /// Partner links, set on the owning link only
    pub mld_partners: Vec<MacAddr>,
    pub added_at: Instant,
    pub(crate) timers: StationTimers,
}

impl Station {
    pub fn new(addr: MacAddr, now: Instant) -> Self {
        Station {
            addr,
            flags: StationFlags::empty(),
            aid: 0,
            vlan_id: 0,
            vlan_id_bound: 0,
            vlan_desc: None,
            phase: TimeoutPhase::default(),
            disassoc_reason: ReasonCode::default(),
            deauth_reason: ReasonCode::default(),
            sa_query: SaQueryState::default(),
            session_timeout: None,
            eapol: None,
            wpa: None,
            psk: None,
            identity: None,
            radius_cui: None,
            acct_interim_interval: 0,
            max_idle_period: None,
            no_short_preamble: false,
            no_short_slot_time: false,
            mld_assoc_link: None,
            mld_partners: Vec::new(),
            added_at: now,
            timers: StationTimers::default(),
        }
    }

    pub fn flags(&self) -> StationFlags {
        self.flags
    }

    pub fn has(&self, flags: StationFlags) -> bool {
        self.flags.contains(flags)
    }

    pub fn is_authenticated(&self) -> bool {
        self.has(StationFlags::AUTH)
    }

    pub fn is_associated(&self) -> bool {
        self.has(StationFlags::ASSOC)
    }

    pub fn is_authorized(&self) -> bool {
        self.has(StationFlags::AUTHORIZED)
    }

    /// Whether a timer of this kind is armed
    pub fn has_timer(&self, slot: TimerSlot) -> bool {
        self.timers.slot(slot).is_some()
    }

    /// Clearing authentication also clears association and authorization
    pub(crate) fn set_authenticated(&mut self, on: bool) {
        if on {
            self.flags.insert(StationFlags::AUTH);
        } else {
            self.flags
                .remove(StationFlags::AUTH | StationFlags::ASSOC | StationFlags::AUTHORIZED);
        }
    }

    pub(crate) fn set_associated(&mut self, on: bool) {
        if on {
            debug_assert!(self.is_authenticated(), "associating unauthenticated station");
            self.flags.insert(StationFlags::AUTH | StationFlags::ASSOC);
        } else {
            self.flags.remove(StationFlags::ASSOC | StationFlags::AUTHORIZED);
        }
    }

    pub(crate) fn set_authorized(&mut self, on: bool) {
        if on {
            debug_assert!(self.is_associated(), "authorizing unassociated station");
            self.flags.insert(StationFlags::AUTHORIZED);
        } else {
            self.flags.remove(StationFlags::AUTHORIZED);
        }
    }

    pub(crate) fn insert_flags(&mut self, flags: StationFlags) {
        self.flags.insert(flags);
    }

    pub(crate) fn remove_flags(&mut self, flags: StationFlags) {
        self.flags.remove(flags);
    }

    /// Inactivity limit in seconds
    ///
    /// A negotiated BSS max idle period overrides the configured default and
    /// is rounded up to whole seconds.
    pub fn max_inactivity(&self, default_secs: u32) -> u32 {
        match self.max_idle_period {
            Some(period) if period > 0 => (u32::from(period) * 1024).div_ceil(1000),
            _ => default_secs,
        }
    }

    pub fn is_mld_partner(&self) -> bool {
        self.mld_assoc_link.is_some_and(|owner| owner != self.addr)
    }
}
