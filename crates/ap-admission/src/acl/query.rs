//! Outstanding Access-Requests
//!
//! Queries are indexed both by RADIUS identifier, to correlate replies, and
//! by station address, so one station never has two requests in flight.

use crate::external::WpaHandle;
use crate::mac::MacAddr;
use radius_proto::Packet;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{error, warn};

/// What to do once the reply is in
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryKind {
    /// Replay the saved authentication frame
    AuthFrame(Vec<u8>),
    /// Resume a 4-way handshake waiting for a PSK decision
    Psk(WpaHandle),
}

#[derive(Debug, Clone)]
pub struct PendingQuery {
    pub addr: MacAddr,
    pub radius_id: u8,
    pub created: Instant,
    /// The request as sent, kept for reply verification
    pub request: Packet,
    pub kind: QueryKind,
    /// Handshake that asked for a PSK while this query was already out
    pub waiting_psk: Option<WpaHandle>,
}

#[derive(Debug, Default)]
pub struct PendingQueries {
    by_id: HashMap<u8, PendingQuery>,
    by_addr: HashMap<MacAddr, u8>,
}

impl PendingQueries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, radius_id: u8) -> Option<&PendingQuery> {
        self.by_id.get(&radius_id)
    }

    pub fn contains_addr(&self, addr: MacAddr) -> bool {
        self.by_addr.contains_key(&addr)
    }

    /// Track a new query
    ///
    /// A query still holding the same identifier has outlived 256 newer
    /// requests; it is dropped and returned.
    pub fn insert(&mut self, query: PendingQuery) -> Option<PendingQuery> {
        if self.by_addr.contains_key(&query.addr) {
            error!(addr = %query.addr, "Second pending RADIUS query for station");
            debug_assert!(false, "two pending queries for {}", query.addr);
        }

        let displaced = self.remove(query.radius_id);
        if let Some(ref old) = displaced {
            warn!(
                radius_id = old.radius_id,
                addr = %old.addr,
                "RADIUS identifier reused, dropping stale query"
            );
        }

        self.by_addr.insert(query.addr, query.radius_id);
        self.by_id.insert(query.radius_id, query);
        displaced
    }

    /// Let a 4-way handshake wait on the query already in flight for `addr`
    ///
    /// Returns false when no query is pending for the station.
    pub fn attach_psk(&mut self, addr: MacAddr, handle: WpaHandle) -> bool {
        let Some(query) = self.by_addr.get(&addr).and_then(|id| self.by_id.get_mut(id)) else {
            return false;
        };
        if query.kind != QueryKind::Psk(handle) {
            query.waiting_psk = Some(handle);
        }
        true
    }

    pub fn remove(&mut self, radius_id: u8) -> Option<PendingQuery> {
        let query = self.by_id.remove(&radius_id)?;
        if self.by_addr.get(&query.addr) == Some(&radius_id) {
            self.by_addr.remove(&query.addr);
        }
        Some(query)
    }

    /// Drop queries older than `ttl` and return them
    pub fn sweep(&mut self, now: Instant, ttl: Duration) -> Vec<PendingQuery> {
        let expired: Vec<u8> = self
            .by_id
            .values()
            .filter(|q| now.saturating_duration_since(q.created) > ttl)
            .map(|q| q.radius_id)
            .collect();

        expired.into_iter().filter_map(|id| self.remove(id)).collect()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_id.clear();
        self.by_addr.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use radius_proto::Code;

    fn query(n: u8, radius_id: u8, created: Instant) -> PendingQuery {
        PendingQuery {
            addr: MacAddr::new([2, 0, 0, 0, 0, n]),
            radius_id,
            created,
            request: Packet::new(Code::AccessRequest, radius_id, [0u8; 16]),
            kind: QueryKind::AuthFrame(vec![0xb0]),
            waiting_psk: None,
        }
    }

    #[test]
    fn test_indexes_stay_in_step() {
        let now = Instant::now();
        let mut queries = PendingQueries::new();
        assert!(queries.insert(query(1, 10, now)).is_none());
        assert!(queries.contains_addr(MacAddr::new([2, 0, 0, 0, 0, 1])));
        assert_eq!(queries.get(10).unwrap().radius_id, 10);

        let removed = queries.remove(10).unwrap();
        assert_eq!(removed.addr, MacAddr::new([2, 0, 0, 0, 0, 1]));
        assert!(!queries.contains_addr(removed.addr));
        assert!(queries.is_empty());
    }

    #[test]
    fn test_identifier_reuse_displaces_old_query() {
        let now = Instant::now();
        let mut queries = PendingQueries::new();
        queries.insert(query(1, 7, now));
        let displaced = queries.insert(query(2, 7, now)).unwrap();

        assert_eq!(displaced.addr, MacAddr::new([2, 0, 0, 0, 0, 1]));
        assert!(!queries.contains_addr(displaced.addr));
        assert!(queries.contains_addr(MacAddr::new([2, 0, 0, 0, 0, 2])));
        assert_eq!(queries.len(), 1);
    }

    #[test]
    fn test_psk_waits_on_pending_query() {
        let now = Instant::now();
        let mut queries = PendingQueries::new();
        queries.insert(query(1, 3, now));

        assert!(queries.attach_psk(MacAddr::new([2, 0, 0, 0, 0, 1]), WpaHandle(4)));
        assert!(!queries.attach_psk(MacAddr::new([2, 0, 0, 0, 0, 2]), WpaHandle(5)));
        assert_eq!(queries.get(3).unwrap().waiting_psk, Some(WpaHandle(4)));

        let mut psk = query(2, 4, now);
        psk.kind = QueryKind::Psk(WpaHandle(6));
        queries.insert(psk);
        queries.attach_psk(MacAddr::new([2, 0, 0, 0, 0, 2]), WpaHandle(6));
        // the query already resumes that handshake
        assert_eq!(queries.get(4).unwrap().waiting_psk, None);
    }

    #[test]
    fn test_sweep_expired() {
        let start = Instant::now();
        let mut queries = PendingQueries::new();
        queries.insert(query(1, 1, start));
        queries.insert(query(2, 2, start + Duration::from_secs(20)));

        let swept = queries.sweep(start + Duration::from_secs(31), Duration::from_secs(30));
        assert_eq!(swept.len(), 1);
        assert_eq!(swept[0].radius_id, 1);
        assert_eq!(queries.len(), 1);
    }
}
