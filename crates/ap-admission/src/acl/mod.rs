//! MAC address access control
//!
//! Static accept and deny lists are consulted first. Addresses they do not
//! cover fall back to the configured policy, which may defer the decision to
//! a RADIUS server. RADIUS decisions are cached for a fixed time and
//! correlated with their requests through [`PendingQueries`].

mod cache;
mod psk;
mod query;

pub use cache::{AclCache, CachedDecision};
pub use psk::{PMK_LEN, PskCandidate, PskError, PskList};
pub use query::{PendingQueries, PendingQuery, QueryKind};

use crate::config::{AclPolicy, Config, DynamicVlan, PskRadius};
use crate::error::{AdmissionError, Result};
use crate::external::{RadiusTransport, WpaHandle};
use crate::mac::MacAddr;
use crate::radius::AccessRequest;
use crate::vlan::{VlanDescription, VlanTable};
use radius_proto::{AttributeType, Code, Packet, extract_vlan, generate_request_authenticator, tunnel_passwords};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Smallest accounting interim interval a server may impose
pub const MIN_ACCT_INTERIM_INTERVAL: u32 = 60;

/// One query per RADIUS identifier
pub const MAX_PENDING_QUERIES: usize = 256;

/// Outcome of the static lists and policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AclCheck {
    Accept { vlan_id: Option<u16> },
    Reject,
    /// Policy defers to RADIUS
    Radius,
}

/// Static accept/deny lists plus default policy
#[derive(Debug, Clone)]
pub struct MacAcl {
    accept: HashMap<MacAddr, Option<u16>>,
    deny: HashSet<MacAddr>,
    policy: AclPolicy,
}

impl MacAcl {
    pub fn new(policy: AclPolicy) -> Self {
        MacAcl {
            accept: HashMap::new(),
            deny: HashSet::new(),
            policy,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let mut acl = MacAcl::new(config.macaddr_acl);
        for entry in &config.accept_mac {
            acl.accept.insert(entry.addr, entry.vlan_id);
        }
        acl.deny.extend(config.deny_mac.iter().map(|e| e.addr));
        acl
    }

    pub fn allow(&mut self, addr: MacAddr, vlan_id: Option<u16>) {
        self.accept.insert(addr, vlan_id);
    }

    pub fn deny(&mut self, addr: MacAddr) {
        self.deny.insert(addr);
    }

    pub fn policy(&self) -> AclPolicy {
        self.policy
    }

    pub fn check(&self, addr: MacAddr) -> AclCheck {
        if let Some(vlan_id) = self.accept.get(&addr) {
            return AclCheck::Accept { vlan_id: *vlan_id };
        }
        if self.deny.contains(&addr) {
            return AclCheck::Reject;
        }
        match self.policy {
            AclPolicy::AcceptUnlessDenied => AclCheck::Accept { vlan_id: None },
            AclPolicy::DenyUnlessAccepted => AclCheck::Reject,
            AclPolicy::UseExternalRadius => AclCheck::Radius,
        }
    }
}

/// RADIUS decision as stored in the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AclVerdict {
    Accept,
    /// Accepted with a Session-Timeout
    AcceptWithTimeout,
    Reject,
}

impl AclVerdict {
    pub fn is_accept(self) -> bool {
        matches!(self, AclVerdict::Accept | AclVerdict::AcceptWithTimeout)
    }
}

/// Station parameters an accept carries
#[derive(Debug, Clone, Default)]
pub struct RadiusStaInfo {
    /// Empty when no VLAN was assigned
    pub vlan: VlanDescription,
    /// Seconds
    pub session_timeout: Option<u32>,
    /// Seconds, 0 when not set
    pub acct_interim_interval: u32,
    pub psk: Option<Arc<PskList>>,
    pub identity: Option<String>,
    pub radius_cui: Option<String>,
}

/// Three-way admission answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AclDecision {
    Accept,
    Reject,
    Pending,
}

/// Admission answer plus whatever came with an accept
#[derive(Debug, Clone)]
pub enum AclResolution {
    Accept(RadiusStaInfo),
    AcceptWithTimeout(RadiusStaInfo),
    Reject,
    Pending,
}

impl AclResolution {
    pub fn decision(&self) -> AclDecision {
        match self {
            AclResolution::Accept(_) | AclResolution::AcceptWithTimeout(_) => AclDecision::Accept,
            AclResolution::Reject => AclDecision::Reject,
            AclResolution::Pending => AclDecision::Pending,
        }
    }

    pub fn info(&self) -> Option<&RadiusStaInfo> {
        match self {
            AclResolution::Accept(info) | AclResolution::AcceptWithTimeout(info) => Some(info),
            _ => None,
        }
    }

    fn from_cached(decision: &CachedDecision) -> Self {
        match decision.verdict {
            AclVerdict::Accept => AclResolution::Accept(decision.info.clone()),
            AclVerdict::AcceptWithTimeout => AclResolution::AcceptWithTimeout(decision.info.clone()),
            AclVerdict::Reject => AclResolution::Reject,
        }
    }
}

/// Handshake waiting on a RADIUS PSK decision
#[derive(Debug, Clone, Copy)]
pub struct PskFlow<'a> {
    pub wpa: WpaHandle,
    pub anonce: &'a [u8],
    pub eapol: &'a [u8],
}

/// One admission question
#[derive(Debug, Clone, Copy)]
pub struct AclRequest<'a> {
    pub addr: MacAddr,
    /// Authentication frame to replay once RADIUS answers
    pub frame: &'a [u8],
    pub is_probe: bool,
    pub akm_suite: Option<u32>,
    pub psk_flow: Option<PskFlow<'a>>,
}

impl<'a> AclRequest<'a> {
    pub fn auth_frame(addr: MacAddr, frame: &'a [u8]) -> Self {
        AclRequest {
            addr,
            frame,
            is_probe: false,
            akm_suite: None,
            psk_flow: None,
        }
    }

    pub fn probe(addr: MacAddr) -> Self {
        AclRequest {
            addr,
            frame: &[],
            is_probe: true,
            akm_suite: None,
            psk_flow: None,
        }
    }
}

/// What a reply turned out to be
#[derive(Debug)]
pub enum ReplyOutcome {
    /// No query with this identifier
    NotMine,
    /// Matched a query but failed verification; the query stays
    InvalidAuthenticator { addr: MacAddr, error: AdmissionError },
    /// Matched a query with a code that decides nothing; the query is gone
    Dropped { addr: MacAddr, code: Code },
    Decided {
        addr: MacAddr,
        verdict: AclVerdict,
        kind: QueryKind,
        /// Handshake that joined the query while it was in flight
        waiting_psk: Option<WpaHandle>,
    },
}

/// ACL statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AclStats {
    pub cache_entries: usize,
    pub pending_queries: usize,
    pub ttl_seconds: u64,
}

/// Identity of this access point in Access-Requests
#[derive(Debug, Clone)]
struct NasIdentity {
    bssid: MacAddr,
    ssid: String,
    nas_identifier: String,
}

/// Static ACL, RADIUS cache and query correlation
#[derive(Debug)]
pub struct AclManager {
    acl: MacAcl,
    cache: AclCache,
    queries: PendingQueries,
    nas: NasIdentity,
    dynamic_vlan: DynamicVlan,
    psk_radius: PskRadius,
}

impl AclManager {
    pub fn new(config: &Config) -> Self {
        AclManager {
            acl: MacAcl::from_config(config),
            cache: AclCache::new(config.acl_cache_ttl()),
            queries: PendingQueries::new(),
            nas: NasIdentity {
                bssid: config.bssid,
                ssid: config.ssid.clone(),
                nas_identifier: config
                    .radius
                    .as_ref()
                    .map(|r| r.nas_identifier.clone())
                    .unwrap_or_default(),
            },
            dynamic_vlan: config.dynamic_vlan,
            psk_radius: config.wpa_psk_radius,
        }
    }

    pub fn acl(&self) -> &MacAcl {
        &self.acl
    }

    pub fn acl_mut(&mut self) -> &mut MacAcl {
        &mut self.acl
    }

    pub fn check(&self, addr: MacAddr) -> AclCheck {
        self.acl.check(addr)
    }

    pub fn cached(&self, addr: MacAddr, now: Instant) -> Option<&CachedDecision> {
        self.cache.get(addr, now)
    }

    pub fn has_pending_query(&self, addr: MacAddr) -> bool {
        self.queries.contains_addr(addr)
    }

    /// Decide whether `req.addr` may proceed
    ///
    /// Anything that prevents a RADIUS query from going out rejects the
    /// station.
    pub fn resolve(
        &mut self,
        req: &AclRequest<'_>,
        transport: Option<&mut dyn RadiusTransport>,
        now: Instant,
    ) -> AclResolution {
        match self.acl.check(req.addr) {
            AclCheck::Accept { vlan_id } => {
                let info = RadiusStaInfo {
                    vlan: vlan_id.map(VlanDescription::untagged).unwrap_or_default(),
                    ..RadiusStaInfo::default()
                };
                return AclResolution::Accept(info);
            }
            AclCheck::Reject => return AclResolution::Reject,
            AclCheck::Radius => {}
        }

        if req.is_probe {
            return AclResolution::Accept(RadiusStaInfo::default());
        }

        if req.psk_flow.is_none()
            && let Some(decision) = self.cache.get(req.addr, now)
        {
            debug!(addr = %req.addr, verdict = ?decision.verdict, "ACL cache hit");
            return AclResolution::from_cached(decision);
        }

        if self.queries.contains_addr(req.addr) {
            debug!(addr = %req.addr, "RADIUS query already pending");
            if let Some(flow) = req.psk_flow {
                self.queries.attach_psk(req.addr, flow.wpa);
            }
            return AclResolution::Pending;
        }

        let Some(transport) = transport else {
            warn!(addr = %req.addr, "No RADIUS server configured for MAC ACL");
            return AclResolution::Reject;
        };

        match self.send_query(req, transport, now) {
            Ok(radius_id) => {
                debug!(addr = %req.addr, radius_id = radius_id, "Sent RADIUS MAC ACL query");
                AclResolution::Pending
            }
            Err(e) => {
                warn!(addr = %req.addr, error = %e, "Failed to send RADIUS MAC ACL query");
                AclResolution::Reject
            }
        }
    }

    fn send_query(
        &mut self,
        req: &AclRequest<'_>,
        transport: &mut dyn RadiusTransport,
        now: Instant,
    ) -> Result<u8> {
        if self.queries.len() >= MAX_PENDING_QUERIES {
            return Err(AdmissionError::AllocationFailure(format!(
                "{} RADIUS queries already pending",
                self.queries.len()
            )));
        }

        let radius_id = transport.next_identifier();
        let request = AccessRequest {
            addr: req.addr,
            bssid: self.nas.bssid,
            ssid: &self.nas.ssid,
            nas_identifier: &self.nas.nas_identifier,
            akm_suite: req.akm_suite,
            psk_material: req.psk_flow.map(|flow| (flow.anonce, flow.eapol)),
        }
        .build(radius_id, generate_request_authenticator(), transport.shared_secret())?;

        transport.send_access_request(&request)?;

        let kind = match req.psk_flow {
            Some(flow) => QueryKind::Psk(flow.wpa),
            None => QueryKind::AuthFrame(req.frame.to_vec()),
        };
        self.queries.insert(PendingQuery {
            addr: req.addr,
            radius_id,
            created: now,
            request,
            kind,
            waiting_psk: None,
        });
        Ok(radius_id)
    }

    /// Correlate a reply with its query and cache the decision
    pub fn handle_reply(
        &mut self,
        reply: &Packet,
        transport: &dyn RadiusTransport,
        vlans: &VlanTable,
        now: Instant,
    ) -> ReplyOutcome {
        let Some(query) = self.queries.get(reply.identifier) else {
            return ReplyOutcome::NotMine;
        };
        let addr = query.addr;

        if !transport.verify_response_integrity(reply, &query.request) {
            let error = AdmissionError::RadiusAuthenticationFailure(reply.identifier);
            warn!(addr = %addr, error = %error, "Incoming RADIUS packet dropped");
            return ReplyOutcome::InvalidAuthenticator { addr, error };
        }

        let Some(query) = self.queries.remove(reply.identifier) else {
            return ReplyOutcome::NotMine;
        };

        let (verdict, info) = match reply.code {
            Code::AccessAccept => {
                self.parse_accept(addr, reply, transport.shared_secret(), &query.request.authenticator, vlans)
            }
            Code::AccessReject => (AclVerdict::Reject, RadiusStaInfo::default()),
            code => {
                warn!(
                    addr = %addr,
                    radius_id = reply.identifier,
                    code = ?code,
                    "Unknown RADIUS message code for MAC ACL query"
                );
                return ReplyOutcome::Dropped { addr, code };
            }
        };

        info!(addr = %addr, radius_id = reply.identifier, verdict = ?verdict, "RADIUS MAC ACL decision");
        self.cache.insert(
            addr,
            CachedDecision {
                created: now,
                verdict,
                info,
            },
        );

        ReplyOutcome::Decided {
            addr,
            verdict,
            waiting_psk: query.waiting_psk,
            kind: query.kind,
        }
    }

    fn parse_accept(
        &self,
        addr: MacAddr,
        reply: &Packet,
        secret: &[u8],
        request_authenticator: &[u8; 16],
        vlans: &VlanTable,
    ) -> (AclVerdict, RadiusStaInfo) {
        let mut verdict = AclVerdict::Accept;
        let mut info = RadiusStaInfo::default();

        if let Some(timeout) = int_attribute(reply, AttributeType::SessionTimeout) {
            info.session_timeout = Some(timeout);
            verdict = AclVerdict::AcceptWithTimeout;
        }

        if let Some(interval) = int_attribute(reply, AttributeType::AcctInterimInterval) {
            if interval < MIN_ACCT_INTERIM_INTERVAL {
                warn!(
                    addr = %addr,
                    interval = interval,
                    "Ignored too small Acct-Interim-Interval"
                );
            } else {
                info.acct_interim_interval = interval;
            }
        }

        if self.dynamic_vlan != DynamicVlan::Disabled {
            info.vlan = extract_vlan(reply).into();
        }

        if self.psk_radius != PskRadius::Ignored {
            let mut psks = PskList::default();
            for password in tunnel_passwords(reply, secret, request_authenticator) {
                match password.map_err(|e| e.to_string()).and_then(|p| {
                    PskCandidate::from_tunnel_password(&p).map_err(|e| e.to_string())
                }) {
                    Ok(candidate) => psks.push(candidate),
                    Err(e) => warn!(addr = %addr, error = %e, "Ignored Tunnel-Password"),
                }
            }
            if !psks.is_empty() {
                info.psk = Some(Arc::new(psks));
            }
        }

        info.identity = string_attribute(reply, AttributeType::UserName);
        info.radius_cui = string_attribute(reply, AttributeType::ChargeableUserIdentity);

        if self.psk_radius == PskRadius::Required && info.psk.is_none() {
            warn!(addr = %addr, "Missing Tunnel-Password for station");
            verdict = AclVerdict::Reject;
        }

        if !info.vlan.is_empty() && !vlans.is_valid(&info.vlan) {
            warn!(addr = %addr, vlan = %info.vlan, "Invalid VLAN received from RADIUS server");
            info.vlan = VlanDescription::default();
        }
        if self.dynamic_vlan == DynamicVlan::Required && info.vlan.is_empty() {
            warn!(addr = %addr, "Missing required VLAN in RADIUS accept");
            verdict = AclVerdict::Reject;
        }

        (verdict, info)
    }

    /// Drop expired cache entries and queries
    ///
    /// Returns the addresses whose cache entries expired.
    pub fn sweep(&mut self, now: Instant) -> Vec<MacAddr> {
        let expired = self.cache.sweep(now);
        for addr in &expired {
            debug!(addr = %addr, "Cached ACL entry expired");
        }

        for query in self.queries.sweep(now, self.cache.ttl()) {
            debug!(
                addr = %query.addr,
                radius_id = query.radius_id,
                "Timeout on a pending RADIUS query"
            );
        }
        expired
    }

    /// Forget every cached decision and pending query
    pub fn flush(&mut self) {
        self.cache.clear();
        self.queries.clear();
    }

    pub fn ttl(&self) -> Duration {
        self.cache.ttl()
    }

    pub fn stats(&self) -> AclStats {
        AclStats {
            cache_entries: self.cache.len(),
            pending_queries: self.queries.len(),
            ttl_seconds: self.cache.ttl().as_secs(),
        }
    }
}

fn int_attribute(packet: &Packet, attr_type: AttributeType) -> Option<u32> {
    packet
        .find_attribute(attr_type as u8)
        .and_then(|attr| attr.as_integer().ok())
}

fn string_attribute(packet: &Packet, attr_type: AttributeType) -> Option<String> {
    packet
        .find_attribute(attr_type as u8)
        .and_then(|attr| attr.as_string().ok())
        .filter(|s| !s.is_empty())
}
