//! Audit logging for station admission events
//!
//! Provides structured JSON-lines records of ACL decisions and station
//! teardown for security compliance and forensic analysis.

use crate::mac::{MacAddr, ReasonCode};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::error;

/// Audit event type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// Station admitted by ACL or RADIUS
    AclAccept,
    /// Station refused by ACL or RADIUS
    AclReject,
    /// Decision deferred to a RADIUS query
    AclPending,
    /// RADIUS reply failed verification or carried an unexpected code
    RadiusReplyDropped,
    StationDisassociated,
    StationDeauthenticated,
    StationRemoved,
    SaQueryTimeout,
    EngineStart,
    EngineStop,
}

/// Audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Timestamp (Unix epoch seconds)
    pub timestamp: u64,
    /// ISO 8601 formatted timestamp
    pub timestamp_iso: String,
    pub event_type: AuditEventType,
    /// Station address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub station: Option<String>,
    /// RADIUS identifier of the related query
    #[serde(skip_serializing_if = "Option::is_none")]
    pub radius_id: Option<u8>,
    /// 802.11 reason code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub engine_version: String,
}

impl AuditEntry {
    pub fn new(event_type: AuditEventType) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();

        let timestamp = now.as_secs();
        let timestamp_iso = chrono::DateTime::from_timestamp(timestamp as i64, 0)
            .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
            .unwrap_or_else(|| "unknown".to_string());

        AuditEntry {
            timestamp,
            timestamp_iso,
            event_type,
            station: None,
            radius_id: None,
            reason: None,
            details: None,
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn with_station(mut self, addr: MacAddr) -> Self {
        self.station = Some(addr.to_string());
        self
    }

    pub fn with_radius_id(mut self, id: u8) -> Self {
        self.radius_id = Some(id);
        self
    }

    pub fn with_reason(mut self, reason: ReasonCode) -> Self {
        self.reason = Some(reason.0);
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Audit logger
///
/// A logger without a path accepts entries and drops them.
#[derive(Debug, Default)]
pub struct AuditLogger {
    file_path: Option<String>,
    file: Option<Mutex<std::fs::File>>,
}

impl AuditLogger {
    pub fn new(file_path: Option<String>) -> std::io::Result<Self> {
        let file = if let Some(ref path) = file_path {
            let f = OpenOptions::new().create(true).append(true).open(path)?;
            Some(Mutex::new(f))
        } else {
            None
        };

        Ok(AuditLogger { file_path, file })
    }

    pub fn disabled() -> Self {
        AuditLogger::default()
    }

    pub fn log(&self, entry: AuditEntry) {
        let Some(ref file) = self.file else {
            return;
        };
        match serde_json::to_string(&entry) {
            Ok(json) => match file.lock() {
                Ok(mut f) => {
                    if let Err(e) = writeln!(f, "{}", json) {
                        error!("Failed to write audit log: {}", e);
                    }
                }
                Err(_) => error!("Audit log lock poisoned"),
            },
            Err(e) => {
                error!("Failed to serialize audit entry: {}", e);
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.file.is_some()
    }

    pub fn file_path(&self) -> Option<&str> {
        self.file_path.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::NamedTempFile;

    #[test]
    fn test_audit_entry_creation() {
        let addr = MacAddr::new([2, 0, 0, 0, 0, 1]);
        let entry = AuditEntry::new(AuditEventType::AclAccept)
            .with_station(addr)
            .with_radius_id(42);

        assert_eq!(entry.station, Some("02:00:00:00:00:01".to_string()));
        assert_eq!(entry.radius_id, Some(42));
        assert_eq!(entry.reason, None);
    }

    #[test]
    fn test_audit_entry_serialization() {
        let entry = AuditEntry::new(AuditEventType::StationDisassociated)
            .with_station(MacAddr::new([2, 0, 0, 0, 0, 2]))
            .with_reason(ReasonCode::REASON_INACTIVITY)
            .with_details("inactivity");

        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("station_disassociated"));
        assert!(json.contains("02:00:00:00:00:02"));
        assert!(json.contains("\"reason\":4"));
        assert!(!json.contains("radius_id"));
    }

    #[test]
    fn test_audit_logger() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_str().unwrap().to_string();

        let logger = AuditLogger::new(Some(path.clone())).unwrap();
        assert!(logger.is_enabled());
        assert_eq!(logger.file_path(), Some(path.as_str()));

        logger.log(AuditEntry::new(AuditEventType::EngineStart));
        logger.log(AuditEntry::new(AuditEventType::AclReject).with_station(MacAddr::new([2, 0, 0, 0, 0, 3])));

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.contains("engine_start"));
        assert!(contents.contains("acl_reject"));
    }

    #[test]
    fn test_audit_logger_disabled() {
        let logger = AuditLogger::disabled();
        assert!(!logger.is_enabled());
        logger.log(AuditEntry::new(AuditEventType::EngineStop));
    }
}
