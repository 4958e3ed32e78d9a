//! 802.11 Access Point Station Admission
//!
//! This crate decides which wireless stations may join an access point and
//! tracks them until they leave. It builds on the `radius-proto` crate for
//! RADIUS-backed MAC access control.
//!
//! # Features
//!
//! - Station registry with inactivity-driven lifecycle timers
//! - Static MAC ACLs with RADIUS fallback, decision cache and query correlation
//! - VLAN and pre-shared key assignment from RADIUS replies
//! - SA Query protection of existing MFP associations
//! - JSON configuration and JSON-lines audit log
//!
//! The engine is a plain state machine. It never blocks and never sleeps:
//! callers pass in the current time, ask [`AccessPoint::next_deadline`] when
//! to come back and drain upstream indications with
//! [`AccessPoint::take_events`].
//!
//! # Example
//!
//! ```rust
//! use ap_admission::{AccessPoint, AclDecision, Config, MacAddr, dry_run};
//! use std::time::Instant;
//!
//! let mut ap = AccessPoint::new(Config::default(), dry_run::backends(None));
//! let addr: MacAddr = "02:00:00:00:00:01".parse().unwrap();
//!
//! let decision = ap.on_authentication_frame(addr, &[0xb0], Instant::now());
//! assert_eq!(decision, AclDecision::Accept);
//! assert!(ap.station(addr).is_some());
//! ```

pub mod acl;
pub mod ap;
pub mod audit;
pub mod config;
pub mod dry_run;
pub mod error;
pub mod external;
pub mod lifecycle;
pub mod mac;
pub mod radius;
pub mod random;
pub mod sa_query;
pub mod station;
pub mod timer;
pub mod vlan;

pub use acl::{
    AclCheck, AclDecision, AclManager, AclRequest, AclResolution, AclStats, AclVerdict, MacAcl,
    PskCandidate, PskList, RadiusStaInfo,
};
pub use ap::{AccessPoint, ApEvent, AssocParams, AssocStatus};
pub use audit::{AuditEntry, AuditEventType, AuditLogger};
pub use config::{AclPolicy, Config, ConfigError, DynamicVlan, PskRadius};
pub use error::{AdmissionError, DriverError, Result, TransportError, VlanError};
pub use external::{
    Accounting, Backends, Driver, EapolHandle, Ieee8021x, RadiusTransport, WpaAuthenticator,
    WpaHandle,
};
pub use lifecycle::DisconnectKind;
pub use mac::{MacAddr, ReasonCode};
pub use radius::{RadiusMessageClass, RadiusReplyHandler, ReplyDisposition, dispatch_reply};
pub use random::{FixedRandom, OsRandom, RandomSource};
pub use station::{RegistryStats, Station, StationFlags, StationRegistry, TimeoutPhase};
pub use vlan::{VlanDescription, VlanTable};
