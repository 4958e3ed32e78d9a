//! Admission engine error types

use crate::mac::MacAddr;
use crate::vlan::VlanDescription;
use thiserror::Error;

/// Errors reported by driver collaborators
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// Idle-time or station information temporarily unavailable
    #[error("Driver query failed: {0}")]
    QueryFailed(String),

    /// The driver no longer has an entry for the station
    #[error("Station entry missing in driver")]
    EntryMissing,

    /// Any other driver operation failure
    #[error("Driver operation failed: {0}")]
    OperationFailed(String),
}

/// Errors reported by the RADIUS transport collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Message could not be constructed
    #[error("Failed to build RADIUS message: {0}")]
    Build(String),

    /// Message could not be sent
    #[error("Failed to send RADIUS message: {0}")]
    Send(String),
}

impl From<radius_proto::PacketError> for TransportError {
    fn from(err: radius_proto::PacketError) -> Self {
        TransportError::Build(err.to_string())
    }
}

/// VLAN selection, interface and binding failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VlanError {
    /// Dynamic or per-station interfaces need a wildcard template
    #[error("No wildcard VLAN interface configured")]
    NoWildcard,

    /// Neither a configured interface nor the wildcard covers the VLAN
    #[error("No interface for VLAN {0}")]
    Missing(VlanDescription),

    /// Outside the VLAN id range or otherwise unservable
    #[error("Invalid VLAN {0}")]
    Invalid(VlanDescription),

    /// No interface holds the assigned VLAN id
    #[error("Unknown VLAN {0}")]
    Unknown(u16),

    #[error("Could not add dynamic VLAN interface {ifname}: {source}")]
    AddInterface {
        ifname: String,
        #[source]
        source: DriverError,
    },

    #[error("Binding to VLAN {vlan_id} failed: {source}")]
    Bind {
        vlan_id: u16,
        #[source]
        source: DriverError,
    },
}

/// Admission engine errors
#[derive(Error, Debug)]
pub enum AdmissionError {
    /// Station table is full; new stations are rejected
    #[error("Station table full: {0} stations")]
    CapacityExceeded(usize),

    /// Idle-time probe unavailable
    #[error("Driver idle query failed for {0}")]
    DriverQueryFailed(MacAddr),

    /// Driver has already dropped the station
    #[error("Driver has no entry for {0}")]
    DriverEntryMissing(MacAddr),

    /// Access-Request construction or transmission failed
    #[error("RADIUS transport failure: {0}")]
    RadiusTransportFailure(#[from] TransportError),

    /// Reply failed its integrity check
    #[error("RADIUS reply with identifier {0} failed authentication")]
    RadiusAuthenticationFailure(u8),

    /// Query or cache entry could not be created
    #[error("Allocation failure: {0}")]
    AllocationFailure(String),

    /// Operation on a station that is not in the registry
    #[error("Unknown station {0}")]
    UnknownStation(MacAddr),

    /// Station is not in the state the operation requires
    #[error("Station {0} in wrong state: {1}")]
    InvalidState(MacAddr, &'static str),

    /// VLAN assignment or binding failed
    #[error("VLAN error: {0}")]
    Vlan(#[from] VlanError),

    /// Other driver failure
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),
}

pub type Result<T> = std::result::Result<T, AdmissionError>;
