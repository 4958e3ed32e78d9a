//! RADIUS decision cache
//!
//! Entries expire a fixed time after they were created. Lookups ignore stale
//! entries; the periodic sweep removes them.

use super::{AclVerdict, RadiusStaInfo};
use crate::mac::MacAddr;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Cached RADIUS decision for one station address
#[derive(Debug, Clone)]
pub struct CachedDecision {
    /// When the reply was received
    pub created: Instant,
    pub verdict: AclVerdict,
    pub info: RadiusStaInfo,
}

impl CachedDecision {
    pub fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.created) > ttl
    }
}

#[derive(Debug)]
pub struct AclCache {
    entries: HashMap<MacAddr, CachedDecision>,
    ttl: Duration,
}

impl AclCache {
    pub fn new(ttl: Duration) -> Self {
        AclCache {
            entries: HashMap::new(),
            ttl,
        }
    }

    /// Fresh decision for `addr`, if any
    pub fn get(&self, addr: MacAddr, now: Instant) -> Option<&CachedDecision> {
        self.entries
            .get(&addr)
            .filter(|entry| !entry.is_expired(now, self.ttl))
    }

    /// Store a decision, replacing an older one for the same address
    pub fn insert(&mut self, addr: MacAddr, decision: CachedDecision) {
        if self.entries.insert(addr, decision).is_some() {
            debug!(addr = %addr, "Replaced cached RADIUS decision");
        }
    }

    pub fn remove(&mut self, addr: MacAddr) -> Option<CachedDecision> {
        self.entries.remove(&addr)
    }

    /// Remove expired entries and return their addresses
    pub fn sweep(&mut self, now: Instant) -> Vec<MacAddr> {
        let ttl = self.ttl;
        let expired: Vec<MacAddr> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now, ttl))
            .map(|(addr, _)| *addr)
            .collect();

        for addr in &expired {
            self.entries.remove(addr);
        }
        expired
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
