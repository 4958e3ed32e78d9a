use crate::mac::MacAddr;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Default MAC address policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AclPolicy {
    /// Accept everything not on the deny list
    #[default]
    AcceptUnlessDenied,
    /// Reject everything not on the accept list
    DenyUnlessAccepted,
    /// Ask the RADIUS server about addresses on neither list
    UseExternalRadius,
}

/// Handling of VLAN assignments received from RADIUS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DynamicVlan {
    #[default]
    Disabled,
    Optional,
    /// Access-Accept without a VLAN is treated as Access-Reject
    Required,
}

/// Handling of Tunnel-Password PSKs received from RADIUS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PskRadius {
    #[default]
    Ignored,
    Optional,
    /// Access-Accept without a usable PSK is treated as Access-Reject
    Required,
    /// PSK is requested from RADIUS while the 4-way handshake runs
    #[serde(rename = "during_4way_handshake")]
    During4wayHandshake,
}

/// Static accept/deny list entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacAclEntry {
    pub addr: MacAddr,
    /// VLAN assigned to stations accepted through this entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vlan_id: Option<u16>,
}

/// VLAN id of a configured VLAN, or `"*"` for the wildcard template
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VlanSelector {
    Id(u16),
    Pattern(String),
}

impl VlanSelector {
    pub fn is_wildcard(&self) -> bool {
        matches!(self, VlanSelector::Pattern(p) if p == "*")
    }
}

/// Configured VLAN interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VlanConfig {
    pub vlan_id: VlanSelector,
    /// Interface name; for the wildcard entry `#` is replaced by the VLAN id
    pub ifname: String,
    /// Tagged VLANs carried on the interface
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tagged: Vec<u16>,
}

/// RADIUS client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadiusConfig {
    /// Authentication server address
    pub server: String,
    /// Shared secret
    pub secret: String,
    #[serde(default = "default_nas_identifier")]
    pub nas_identifier: String,
}

fn default_nas_identifier() -> String {
    "ap-admission".to_string()
}

/// Access point admission configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Wireless interface the BSS runs on
    #[serde(default = "default_interface")]
    pub interface: String,

    #[serde(default = "default_ssid")]
    pub ssid: String,

    #[serde(default)]
    pub bssid: MacAddr,

    /// Maximum number of stations (default: 2007)
    #[serde(default = "default_max_num_sta")]
    pub max_num_sta: usize,

    /// Seconds of inactivity before a station is polled (default: 300)
    #[serde(default = "default_ap_max_inactivity")]
    pub ap_max_inactivity: u32,

    /// Upper bound of the random seconds added to inactivity reschedules (default: 5)
    #[serde(default = "default_inactivity_jitter")]
    pub inactivity_jitter: u32,

    /// Disassociate idle stations without sending a liveness poll
    #[serde(default)]
    pub skip_inactivity_poll: bool,

    /// Seconds between the poll and disassociation (default: 3)
    #[serde(default = "default_disassoc_delay")]
    pub disassoc_delay: u32,

    /// Seconds between disassociation and deauthentication (default: 1)
    #[serde(default = "default_deauth_delay")]
    pub deauth_delay: u32,

    /// Seconds an explicitly disassociated station is kept (default: 5)
    #[serde(default = "default_after_disconnect")]
    pub inactivity_after_disassoc: u32,

    /// Seconds an explicitly deauthenticated station is kept (default: 5)
    #[serde(default = "default_after_disconnect")]
    pub inactivity_after_deauth: u32,

    /// Driver reports TX status for disconnect frames
    #[serde(default = "default_true")]
    pub driver_tx_status: bool,

    /// Directional multi-gigabit mode: no deauthentication, disassociation only
    #[serde(default)]
    pub dmg: bool,

    #[serde(default)]
    pub macaddr_acl: AclPolicy,

    #[serde(default)]
    pub accept_mac: Vec<MacAclEntry>,

    #[serde(default)]
    pub deny_mac: Vec<MacAclEntry>,

    /// Seconds a RADIUS verdict stays cached (default: 30)
    #[serde(default = "default_acl_cache_ttl")]
    pub acl_cache_ttl: u64,

    /// Seconds between cache sweeps (default: 10)
    #[serde(default = "default_acl_sweep_interval")]
    pub acl_sweep_interval: u64,

    #[serde(default)]
    pub radius: Option<RadiusConfig>,

    #[serde(default)]
    pub dynamic_vlan: DynamicVlan,

    /// Give every station its own VLAN interface
    #[serde(default)]
    pub per_sta_vif: bool,

    #[serde(default)]
    pub vlans: Vec<VlanConfig>,

    #[serde(default)]
    pub wpa_psk_radius: PskRadius,

    /// Accounting interim interval; 0 lets RADIUS decide
    #[serde(default)]
    pub acct_interim_interval: u32,

    /// SA Query window in TUs (default: 1000)
    #[serde(default = "default_sa_query_max_timeout")]
    pub sa_query_max_timeout: u32,

    /// SA Query retry interval in TUs (default: 201)
    #[serde(default = "default_sa_query_retry_timeout")]
    pub sa_query_retry_timeout: u32,

    /// Log level: "trace", "debug", "info", "warn", "error" (default: "info")
    #[serde(default)]
    pub log_level: Option<String>,

    /// Audit log file path (JSON lines, optional)
    #[serde(default)]
    pub audit_log_path: Option<String>,
}

fn default_interface() -> String {
    "wlan0".to_string()
}

fn default_ssid() -> String {
    "ap-admission".to_string()
}

fn default_max_num_sta() -> usize {
    2007
}

fn default_ap_max_inactivity() -> u32 {
    300
}

fn default_inactivity_jitter() -> u32 {
    5
}

fn default_disassoc_delay() -> u32 {
    3
}

fn default_deauth_delay() -> u32 {
    1
}

fn default_after_disconnect() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

fn default_acl_cache_ttl() -> u64 {
    30
}

fn default_acl_sweep_interval() -> u64 {
    10
}

fn default_sa_query_max_timeout() -> u32 {
    1000
}

fn default_sa_query_retry_timeout() -> u32 {
    201
}

/// Length of one 802.11 time unit
pub const TIME_UNIT: Duration = Duration::from_micros(1024);

impl Default for Config {
    fn default() -> Self {
        Config {
            interface: default_interface(),
            ssid: default_ssid(),
            bssid: MacAddr::default(),
            max_num_sta: default_max_num_sta(),
            ap_max_inactivity: default_ap_max_inactivity(),
            inactivity_jitter: default_inactivity_jitter(),
            skip_inactivity_poll: false,
            disassoc_delay: default_disassoc_delay(),
            deauth_delay: default_deauth_delay(),
            inactivity_after_disassoc: default_after_disconnect(),
            inactivity_after_deauth: default_after_disconnect(),
            driver_tx_status: true,
            dmg: false,
            macaddr_acl: AclPolicy::default(),
            accept_mac: vec![],
            deny_mac: vec![],
            acl_cache_ttl: default_acl_cache_ttl(),
            acl_sweep_interval: default_acl_sweep_interval(),
            radius: None,
            dynamic_vlan: DynamicVlan::default(),
            per_sta_vif: false,
            vlans: vec![],
            wpa_psk_radius: PskRadius::default(),
            acct_interim_interval: 0,
            sa_query_max_timeout: default_sa_query_max_timeout(),
            sa_query_retry_timeout: default_sa_query_retry_timeout(),
            log_level: None,
            audit_log_path: None,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    pub fn acl_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.acl_cache_ttl)
    }

    pub fn sa_query_max_timeout(&self) -> Duration {
        TIME_UNIT * self.sa_query_max_timeout
    }

    pub fn sa_query_retry_timeout(&self) -> Duration {
        TIME_UNIT * self.sa_query_retry_timeout
    }

    /// Time allowed for the driver to confirm a disconnect frame
    pub fn disconnect_callback_timeout(&self) -> Duration {
        if self.driver_tx_status {
            Duration::from_millis(2020)
        } else {
            Duration::from_millis(20)
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interface.is_empty() {
            return Err(ConfigError::Invalid("Interface cannot be empty".to_string()));
        }

        if self.ssid.is_empty() || self.ssid.len() > 32 {
            return Err(ConfigError::Invalid(format!(
                "SSID must be 1-32 bytes, got {}",
                self.ssid.len()
            )));
        }

        if self.max_num_sta == 0 {
            return Err(ConfigError::Invalid("max_num_sta cannot be 0".to_string()));
        }

        if self.ap_max_inactivity == 0 {
            return Err(ConfigError::Invalid("ap_max_inactivity cannot be 0".to_string()));
        }

        if self.acl_cache_ttl == 0 || self.acl_sweep_interval == 0 {
            return Err(ConfigError::Invalid(
                "ACL cache TTL and sweep interval must be positive".to_string(),
            ));
        }

        if self.macaddr_acl == AclPolicy::UseExternalRadius {
            match &self.radius {
                Some(radius) if !radius.server.is_empty() && !radius.secret.is_empty() => {}
                _ => {
                    return Err(ConfigError::Invalid(
                        "use_external_radius requires a RADIUS server and secret".to_string(),
                    ));
                }
            }
        }

        if self.sa_query_retry_timeout > self.sa_query_max_timeout {
            return Err(ConfigError::Invalid(format!(
                "SA Query retry timeout {} TU exceeds maximum {} TU",
                self.sa_query_retry_timeout, self.sa_query_max_timeout
            )));
        }

        if (self.dynamic_vlan != DynamicVlan::Disabled || self.per_sta_vif) && self.vlans.is_empty()
        {
            return Err(ConfigError::Invalid(
                "Dynamic VLAN requires at least one VLAN entry".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for vlan in &self.vlans {
            match &vlan.vlan_id {
                VlanSelector::Id(id) if *id == 0 || *id > radius_proto::MAX_VLAN_ID => {
                    return Err(ConfigError::Invalid(format!("Invalid VLAN id {}", id)));
                }
                VlanSelector::Pattern(p) if p != "*" => {
                    return Err(ConfigError::Invalid(format!("Invalid VLAN id {:?}", p)));
                }
                _ => {}
            }
            if !seen.insert(vlan.vlan_id.clone()) {
                return Err(ConfigError::Invalid(format!(
                    "Duplicate VLAN entry {:?}",
                    vlan.vlan_id
                )));
            }
            if vlan.ifname.is_empty() {
                return Err(ConfigError::Invalid("VLAN interface name cannot be empty".to_string()));
            }
        }

        let denied: HashSet<MacAddr> = self.deny_mac.iter().map(|e| e.addr).collect();
        if let Some(entry) = self.accept_mac.iter().find(|e| denied.contains(&e.addr)) {
            return Err(ConfigError::Invalid(format!(
                "{} is listed in both accept_mac and deny_mac",
                entry.addr
            )));
        }

        Ok(())
    }

    /// Create an example configuration file
    pub fn example() -> Self {
        Config {
            interface: "wlan0".to_string(),
            ssid: "corp-wifi".to_string(),
            bssid: MacAddr::new([0x02, 0x00, 0x00, 0x00, 0x01, 0x00]),
            macaddr_acl: AclPolicy::UseExternalRadius,
            accept_mac: vec![MacAclEntry {
                addr: MacAddr::new([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]),
                vlan_id: Some(10),
            }],
            deny_mac: vec![MacAclEntry {
                addr: MacAddr::new([0x02, 0x00, 0x00, 0x00, 0x00, 0x66]),
                vlan_id: None,
            }],
            radius: Some(RadiusConfig {
                server: "127.0.0.1:1812".to_string(),
                secret: "testing123".to_string(),
                nas_identifier: default_nas_identifier(),
            }),
            dynamic_vlan: DynamicVlan::Optional,
            vlans: vec![
                VlanConfig {
                    vlan_id: VlanSelector::Id(10),
                    ifname: "wlan0.10".to_string(),
                    tagged: vec![],
                },
                VlanConfig {
                    vlan_id: VlanSelector::Pattern("*".to_string()),
                    ifname: "vlan#".to_string(),
                    tagged: vec![],
                },
            ],
            wpa_psk_radius: PskRadius::Optional,
            log_level: Some("info".to_string()),
            audit_log_path: Some("/var/log/ap-admission/audit.log".to_string()),
            ..Config::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.max_num_sta, 2007);
        assert_eq!(config.ap_max_inactivity, 300);
        assert_eq!(config.acl_cache_ttl(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_example_is_valid() {
        assert!(Config::example().validate().is_ok());
    }

    #[test]
    fn test_time_units() {
        let config = Config::default();
        assert_eq!(config.sa_query_max_timeout(), Duration::from_micros(1_024_000));
        assert_eq!(config.sa_query_retry_timeout(), Duration::from_micros(205_824));
    }

    #[test]
    fn test_disconnect_callback_timeout() {
        let mut config = Config::default();
        assert_eq!(config.disconnect_callback_timeout(), Duration::from_millis(2020));
        config.driver_tx_status = false;
        assert_eq!(config.disconnect_callback_timeout(), Duration::from_millis(20));
    }

    #[test]
    fn test_radius_policy_requires_server() {
        let mut config = Config::default();
        config.macaddr_acl = AclPolicy::UseExternalRadius;
        assert!(config.validate().is_err());

        config.radius = Some(RadiusConfig {
            server: "127.0.0.1:1812".to_string(),
            secret: "".to_string(),
            nas_identifier: default_nas_identifier(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sa_query_retry_bound() {
        let mut config = Config::default();
        config.sa_query_retry_timeout = 2000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_dynamic_vlan_needs_entries() {
        let mut config = Config::default();
        config.dynamic_vlan = DynamicVlan::Required;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_vlan_rejected() {
        let mut config = Config::example();
        config.vlans.push(VlanConfig {
            vlan_id: VlanSelector::Id(10),
            ifname: "other".to_string(),
            tagged: vec![],
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_vlan_pattern_rejected() {
        let mut config = Config::example();
        config.vlans[1].vlan_id = VlanSelector::Pattern("any".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_conflicting_acl_lists() {
        let mut config = Config::default();
        let addr = MacAddr::new([2, 0, 0, 0, 0, 1]);
        config.accept_mac.push(MacAclEntry { addr, vlan_id: None });
        config.deny_mac.push(MacAclEntry { addr, vlan_id: None });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_file_round_trip() {
        let file = NamedTempFile::new().unwrap();
        Config::example().to_file(file.path()).unwrap();

        let loaded = Config::from_file(file.path()).unwrap();
        assert_eq!(loaded.ssid, "corp-wifi");
        assert_eq!(loaded.macaddr_acl, AclPolicy::UseExternalRadius);
        assert!(loaded.vlans[1].vlan_id.is_wildcard());
        assert_eq!(loaded.accept_mac[0].vlan_id, Some(10));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{"ssid": "lab", "macaddr_acl": "deny_unless_accepted"}"#).unwrap();
        assert_eq!(config.ssid, "lab");
        assert_eq!(config.macaddr_acl, AclPolicy::DenyUnlessAccepted);
        assert_eq!(config.disassoc_delay, 3);
        assert!(config.driver_tx_status);
    }
}
