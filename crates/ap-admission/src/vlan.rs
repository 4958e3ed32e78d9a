//! VLAN assignment and binding
//!
//! The [`VlanTable`] holds the configured VLAN interfaces plus the dynamic
//! ones cloned from the wildcard template. Dynamic interfaces are reference
//! counted per station and torn down when the last station lets go.

use crate::ap::AccessPoint;
use crate::config::{Config, DynamicVlan, VlanSelector};
use crate::error::{AdmissionError, Result, VlanError};
use crate::external::Driver;
use crate::mac::MacAddr;
use radius_proto::{MAX_VLAN_ID, TunnelVlan};
use tracing::{debug, info, warn};

/// Untagged VLAN plus tagged VLANs
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct VlanDescription {
    /// 0 when no untagged VLAN is assigned
    pub untagged: u16,
    /// Sorted, without duplicates
    pub tagged: Vec<u16>,
}

impl VlanDescription {
    pub fn untagged(vlan_id: u16) -> Self {
        VlanDescription {
            untagged: vlan_id,
            tagged: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.untagged == 0 && self.tagged.is_empty()
    }

    fn in_range(&self) -> bool {
        self.untagged <= MAX_VLAN_ID && self.tagged.iter().all(|id| (1..=MAX_VLAN_ID).contains(id))
    }
}

impl From<TunnelVlan> for VlanDescription {
    fn from(vlan: TunnelVlan) -> Self {
        VlanDescription {
            untagged: vlan.untagged.unwrap_or(0),
            tagged: vlan.tagged,
        }
    }
}

impl std::fmt::Display for VlanDescription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.untagged)?;
        for (i, id) in self.tagged.iter().enumerate() {
            write!(f, "{}{}", if i == 0 { "+" } else { "," }, id)?;
        }
        Ok(())
    }
}

/// One VLAN interface known to the access point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VlanEntry {
    pub vlan_id: u16,
    pub desc: VlanDescription,
    pub ifname: String,
    /// Station references; 0 for configured (static) interfaces
    pub dynamic_refs: u32,
}

impl VlanEntry {
    pub fn is_dynamic(&self) -> bool {
        self.dynamic_refs > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum VlanTarget {
    None,
    Existing(u16),
    Wildcard(u16),
}

/// Configured and dynamic VLAN interfaces
#[derive(Debug, Clone)]
pub struct VlanTable {
    entries: Vec<VlanEntry>,
    /// Interface name template of the wildcard entry
    wildcard: Option<String>,
    default_ifname: String,
    dynamic_vlan: DynamicVlan,
    per_sta_vif: bool,
}

impl VlanTable {
    pub fn from_config(config: &Config) -> Self {
        let mut entries = Vec::new();
        let mut wildcard = None;

        for vlan in &config.vlans {
            match &vlan.vlan_id {
                VlanSelector::Id(id) => {
                    let mut tagged = vlan.tagged.clone();
                    tagged.sort_unstable();
                    tagged.dedup();
                    entries.push(VlanEntry {
                        vlan_id: *id,
                        desc: VlanDescription {
                            untagged: *id,
                            tagged,
                        },
                        ifname: vlan.ifname.clone(),
                        dynamic_refs: 0,
                    });
                }
                selector if selector.is_wildcard() => wildcard = Some(vlan.ifname.clone()),
                _ => {}
            }
        }

        VlanTable {
            entries,
            wildcard,
            default_ifname: config.interface.clone(),
            dynamic_vlan: config.dynamic_vlan,
            per_sta_vif: config.per_sta_vif,
        }
    }

    /// Whether a received VLAN assignment can be served
    ///
    /// It must be in range and either match a configured VLAN exactly or be
    /// coverable by the wildcard template.
    pub fn is_valid(&self, desc: &VlanDescription) -> bool {
        if desc.is_empty() || !desc.in_range() {
            return false;
        }
        self.wildcard.is_some() || self.entries.iter().any(|e| e.desc == *desc)
    }

    pub fn find(&self, vlan_id: u16) -> Option<&VlanEntry> {
        self.entries.iter().find(|e| e.vlan_id == vlan_id)
    }

    pub fn entries(&self) -> &[VlanEntry] {
        &self.entries
    }

    pub fn dynamic_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_dynamic()).count()
    }

    /// Interface a station on `vlan_id` is bound to
    pub fn ifname_for(&self, vlan_id: u16) -> Option<&str> {
        if vlan_id == 0 {
            return Some(&self.default_ifname);
        }
        self.find(vlan_id).map(|e| e.ifname.as_str())
    }

    /// Lowest unused id above the ordinary VLAN range
    pub fn free_vlan_id(&self) -> u16 {
        let mut vlan_id = MAX_VLAN_ID + 2;
        while self.find(vlan_id).is_some() {
            vlan_id += 1;
        }
        vlan_id
    }

    fn select(&self, desc: &VlanDescription) -> std::result::Result<VlanTarget, VlanError> {
        if self.per_sta_vif {
            if self.wildcard.is_none() {
                return Err(VlanError::NoWildcard);
            }
            return Ok(VlanTarget::Wildcard(self.free_vlan_id()));
        }

        if desc.is_empty() {
            return Ok(VlanTarget::None);
        }

        if let Some(entry) = self.entries.iter().find(|e| e.desc == *desc) {
            return Ok(VlanTarget::Existing(entry.vlan_id));
        }

        if self.wildcard.is_some() {
            let vlan_id = if desc.tagged.is_empty() {
                desc.untagged
            } else {
                self.free_vlan_id()
            };
            return Ok(VlanTarget::Wildcard(vlan_id));
        }

        Err(VlanError::Missing(desc.clone()))
    }

    fn add_dynamic(
        &mut self,
        vlan_id: u16,
        desc: &VlanDescription,
        driver: &mut dyn Driver,
    ) -> std::result::Result<(), VlanError> {
        let template = self.wildcard.as_deref().ok_or(VlanError::NoWildcard)?;
        let ifname = template.replace('#', &vlan_id.to_string());

        if let Err(source) = driver.add_vlan_interface(&ifname, vlan_id) {
            return Err(VlanError::AddInterface { ifname, source });
        }

        info!(vlan_id = vlan_id, ifname = %ifname, "Added dynamic VLAN interface");
        self.entries.push(VlanEntry {
            vlan_id,
            desc: desc.clone(),
            ifname,
            dynamic_refs: 1,
        });
        Ok(())
    }

    /// Take a reference on a VLAN, creating a dynamic interface if needed
    fn acquire(
        &mut self,
        target: &VlanTarget,
        desc: &VlanDescription,
        driver: &mut dyn Driver,
    ) -> std::result::Result<(), VlanError> {
        match *target {
            VlanTarget::None => Ok(()),
            VlanTarget::Existing(vlan_id) | VlanTarget::Wildcard(vlan_id) => {
                if let Some(entry) = self.entries.iter_mut().find(|e| e.vlan_id == vlan_id) {
                    if entry.is_dynamic() {
                        entry.dynamic_refs += 1;
                        debug!(vlan_id = vlan_id, refs = entry.dynamic_refs, "Updated dynamic VLAN interface");
                    }
                    Ok(())
                } else {
                    self.add_dynamic(vlan_id, desc, driver)
                }
            }
        }
    }

    /// Drop a reference; the last one removes a dynamic interface
    pub fn release(&mut self, vlan_id: u16, driver: &mut dyn Driver) {
        let Some(pos) = self.entries.iter().position(|e| e.vlan_id == vlan_id) else {
            return;
        };
        let entry = &mut self.entries[pos];
        if !entry.is_dynamic() {
            return;
        }

        entry.dynamic_refs -= 1;
        if entry.dynamic_refs == 0 {
            let entry = self.entries.remove(pos);
            if let Err(e) = driver.remove_vlan_interface(&entry.ifname) {
                warn!(ifname = %entry.ifname, error = %e, "Failed to remove dynamic VLAN interface");
            }
            info!(vlan_id = vlan_id, ifname = %entry.ifname, "Removed dynamic VLAN interface");
        }
    }

    /// Remove every dynamic interface regardless of references
    pub fn release_all(&mut self, driver: &mut dyn Driver) {
        for entry in self.entries.iter().filter(|e| e.is_dynamic()) {
            if let Err(e) = driver.remove_vlan_interface(&entry.ifname) {
                warn!(ifname = %entry.ifname, error = %e, "Failed to remove dynamic VLAN interface");
            }
        }
        self.entries.retain(|e| !e.is_dynamic());
    }
}

impl AccessPoint {
    /// Resolve and record a station's VLAN
    ///
    /// The reference on the previous VLAN is dropped only after the new one
    /// is held. A VLAN that is still bound in the driver keeps its reference
    /// until [`AccessPoint::bind_station_vlan`] has moved the station off it.
    pub fn set_station_vlan(&mut self, addr: MacAddr, desc: &VlanDescription) -> Result<()> {
        let station = self
            .stations
            .get(addr)
            .ok_or(AdmissionError::UnknownStation(addr))?;
        let old_vlan_id = station.vlan_id;
        let bound = station.vlan_id_bound;
        let current = station.vlan_desc.clone().unwrap_or_default();

        let needs_own_vif = self.vlans.per_sta_vif && old_vlan_id == 0;
        let needs_reset =
            self.vlans.dynamic_vlan == DynamicVlan::Disabled && !self.vlans.per_sta_vif && old_vlan_id != 0;
        if !needs_own_vif && !needs_reset && current == *desc {
            return Ok(());
        }

        let driver = self.backends.driver.as_mut();
        let outcome = self.vlans.select(desc).and_then(|target| {
            let vlan_id = match target {
                VlanTarget::None => 0,
                VlanTarget::Existing(id) | VlanTarget::Wildcard(id) => id,
            };
            if vlan_id != 0 && vlan_id != bound {
                self.vlans.acquire(&target, desc, driver)?;
            }
            Ok(vlan_id)
        });

        let (new_vlan_id, result) = match outcome {
            Ok(vlan_id) => (vlan_id, Ok(())),
            Err(e) => {
                warn!(addr = %addr, vlan = %desc, error = %e, "VLAN assignment failed");
                (0, Err(e.into()))
            }
        };

        let new_desc = (new_vlan_id != 0)
            .then(|| self.vlans.find(new_vlan_id).map(|e| e.desc.clone()))
            .flatten();
        if let Some(station) = self.stations.get_mut(addr) {
            station.vlan_id = new_vlan_id;
            station.vlan_desc = new_desc;
        }

        if old_vlan_id != 0 && old_vlan_id != new_vlan_id && old_vlan_id != bound {
            self.vlans.release(old_vlan_id, self.backends.driver.as_mut());
        }

        if new_vlan_id != 0 {
            info!(addr = %addr, vlan_id = new_vlan_id, "Station VLAN assigned");
        }
        result
    }

    /// Push the assigned VLAN to the driver and the WPA authenticator
    pub fn bind_station_vlan(&mut self, addr: MacAddr) -> Result<()> {
        let station = self
            .stations
            .get(addr)
            .ok_or(AdmissionError::UnknownStation(addr))?;
        let vlan_id = station.vlan_id;
        let old_bound = station.vlan_id_bound;
        let wpa = station.wpa;

        let Some(ifname) = self.vlans.ifname_for(vlan_id).map(str::to_string) else {
            warn!(addr = %addr, vlan_id = vlan_id, "Could not find VLAN for binding station");
            return Err(VlanError::Unknown(vlan_id).into());
        };

        if let Some(handle) = wpa
            && let Err(e) = self.backends.wpa.set_vlan(handle, vlan_id)
        {
            warn!(addr = %addr, vlan_id = vlan_id, error = %e, "Could not configure VLAN ID for WPA");
        }

        self.backends
            .driver
            .set_vlan_binding(&ifname, addr, vlan_id)
            .map_err(|source| {
                warn!(addr = %addr, vlan_id = vlan_id, error = %source, "Could not bind station to VLAN");
                VlanError::Bind { vlan_id, source }
            })?;

        debug!(addr = %addr, vlan_id = vlan_id, ifname = %ifname, "Station bound to VLAN");
        if let Some(station) = self.stations.get_mut(addr) {
            station.vlan_id_bound = vlan_id;
        }
        if old_bound != 0 && old_bound != vlan_id {
            self.vlans.release(old_bound, self.backends.driver.as_mut());
        }
        Ok(())
    }

    /// Drop every VLAN reference a departing station holds
    pub(crate) fn release_station_vlans(&mut self, vlan_id: u16, bound: u16) {
        let driver = self.backends.driver.as_mut();
        if vlan_id != 0 {
            self.vlans.release(vlan_id, driver);
        }
        if bound != 0 && bound != vlan_id {
            self.vlans.release(bound, driver);
        }
    }
}
