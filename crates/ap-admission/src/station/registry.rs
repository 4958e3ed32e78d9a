//! Station table
//!
//! Keyed lookup plus insertion order. Both structures change together, so an
//! address is in the map exactly when it is in the order list.

use super::Station;
use crate::error::{AdmissionError, Result};
use crate::mac::MacAddr;
use std::collections::HashMap;
use std::ops::ControlFlow;
use std::time::Instant;
use tracing::debug;

/// Registry counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    pub stations: usize,
    pub max_stations: usize,
    pub no_short_preamble: usize,
    pub no_short_slot_time: usize,
}

#[derive(Debug)]
pub struct StationRegistry {
    stations: HashMap<MacAddr, Station>,
    order: Vec<MacAddr>,
    max_stations: usize,
    num_no_short_preamble: usize,
    num_no_short_slot_time: usize,
}

impl StationRegistry {
    pub fn new(max_stations: usize) -> Self {
        StationRegistry {
            stations: HashMap::new(),
            order: Vec::new(),
            max_stations,
            num_no_short_preamble: 0,
            num_no_short_slot_time: 0,
        }
    }

    /// Get or create the station for `addr`
    pub fn add(&mut self, addr: MacAddr, now: Instant) -> Result<&mut Station> {
        if !self.stations.contains_key(&addr) {
            if self.stations.len() >= self.max_stations {
                debug!(addr = %addr, max = self.max_stations, "Station table full");
                return Err(AdmissionError::CapacityExceeded(self.max_stations));
            }
            self.order.push(addr);
            self.stations.insert(addr, Station::new(addr, now));
            debug!(addr = %addr, stations = self.stations.len(), "Station added");
        }

        self.stations
            .get_mut(&addr)
            .ok_or(AdmissionError::UnknownStation(addr))
    }

    pub fn get(&self, addr: MacAddr) -> Option<&Station> {
        self.stations.get(&addr)
    }

    pub fn get_mut(&mut self, addr: MacAddr) -> Option<&mut Station> {
        self.stations.get_mut(&addr)
    }

    pub fn contains(&self, addr: MacAddr) -> bool {
        self.stations.contains_key(&addr)
    }

    /// Detach a station from the table
    ///
    /// Only bookkeeping happens here; timers, VLAN references and collaborator
    /// state are released by the engine before calling this.
    pub fn remove(&mut self, addr: MacAddr) -> Option<Station> {
        let station = self.stations.remove(&addr)?;
        if let Some(pos) = self.order.iter().position(|a| *a == addr) {
            self.order.remove(pos);
        }
        debug_assert_eq!(self.stations.len(), self.order.len());

        if station.no_short_preamble {
            self.num_no_short_preamble = self.num_no_short_preamble.saturating_sub(1);
        }
        if station.no_short_slot_time {
            self.num_no_short_slot_time = self.num_no_short_slot_time.saturating_sub(1);
        }
        Some(station)
    }

    /// Record the capability bits a station associated with
    pub fn set_capabilities(&mut self, addr: MacAddr, no_short_preamble: bool, no_short_slot_time: bool) {
        let Some(station) = self.stations.get_mut(&addr) else {
            return;
        };
        match (station.no_short_preamble, no_short_preamble) {
            (false, true) => self.num_no_short_preamble += 1,
            (true, false) => self.num_no_short_preamble -= 1,
            _ => {}
        }
        match (station.no_short_slot_time, no_short_slot_time) {
            (false, true) => self.num_no_short_slot_time += 1,
            (true, false) => self.num_no_short_slot_time -= 1,
            _ => {}
        }
        station.no_short_preamble = no_short_preamble;
        station.no_short_slot_time = no_short_slot_time;
    }

    /// Visit stations in insertion order until `f` breaks
    pub fn for_each<F>(&mut self, mut f: F)
    where
        F: FnMut(&mut Station) -> ControlFlow<()>,
    {
        for addr in &self.order {
            if let Some(station) = self.stations.get_mut(addr)
                && f(station).is_break()
            {
                break;
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Station> {
        self.order.iter().filter_map(|addr| self.stations.get(addr))
    }

    /// Snapshot of addresses in insertion order
    ///
    /// Callers that remove stations while walking the table iterate this.
    pub fn addresses(&self) -> Vec<MacAddr> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            stations: self.stations.len(),
            max_stations: self.max_stations,
            no_short_preamble: self.num_no_short_preamble,
            no_short_slot_time: self.num_no_short_slot_time,
        }
    }
}
