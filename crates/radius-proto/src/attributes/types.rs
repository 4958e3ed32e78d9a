/// RADIUS attribute types used by an access point's MAC ACL client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AttributeType {
    /// User-Name (1) - RFC 2865
    UserName = 1,
    /// User-Password (2) - RFC 2865
    UserPassword = 2,
    /// NAS-IP-Address (4) - RFC 2865
    NasIpAddress = 4,
    /// Service-Type (6) - RFC 2865
    ServiceType = 6,
    /// Reply-Message (18) - RFC 2865
    ReplyMessage = 18,
    /// Class (25) - RFC 2865
    Class = 25,
    /// Vendor-Specific (26) - RFC 2865
    VendorSpecific = 26,
    /// Session-Timeout (27) - RFC 2865
    SessionTimeout = 27,
    /// Idle-Timeout (28) - RFC 2865
    IdleTimeout = 28,
    /// Called-Station-Id (30) - RFC 2865
    CalledStationId = 30,
    /// Calling-Station-Id (31) - RFC 2865
    CallingStationId = 31,
    /// NAS-Identifier (32) - RFC 2865
    NasIdentifier = 32,
    /// Egress-VLANID (56) - RFC 4675
    EgressVlanId = 56,
    /// NAS-Port-Type (61) - RFC 2865
    NasPortType = 61,
    /// Tunnel-Type (64) - RFC 2868
    TunnelType = 64,
    /// Tunnel-Medium-Type (65) - RFC 2868
    TunnelMediumType = 65,
    /// Tunnel-Password (69) - RFC 2868
    TunnelPassword = 69,
    /// EAP-Message (79) - RFC 3579
    EapMessage = 79,
    /// Message-Authenticator (80) - RFC 2869
    MessageAuthenticator = 80,
    /// Tunnel-Private-Group-ID (81) - RFC 2868
    TunnelPrivateGroupId = 81,
    /// Acct-Interim-Interval (85) - RFC 2869
    AcctInterimInterval = 85,
    /// Chargeable-User-Identity (89) - RFC 4372
    ChargeableUserIdentity = 89,
    /// WLAN-AKM-Suite (190) - RFC 7268
    WlanAkmSuite = 190,
}

impl AttributeType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(AttributeType::UserName),
            2 => Some(AttributeType::UserPassword),
            4 => Some(AttributeType::NasIpAddress),
            6 => Some(AttributeType::ServiceType),
            18 => Some(AttributeType::ReplyMessage),
            25 => Some(AttributeType::Class),
            26 => Some(AttributeType::VendorSpecific),
            27 => Some(AttributeType::SessionTimeout),
            28 => Some(AttributeType::IdleTimeout),
            30 => Some(AttributeType::CalledStationId),
            31 => Some(AttributeType::CallingStationId),
            32 => Some(AttributeType::NasIdentifier),
            56 => Some(AttributeType::EgressVlanId),
            61 => Some(AttributeType::NasPortType),
            64 => Some(AttributeType::TunnelType),
            65 => Some(AttributeType::TunnelMediumType),
            69 => Some(AttributeType::TunnelPassword),
            79 => Some(AttributeType::EapMessage),
            80 => Some(AttributeType::MessageAuthenticator),
            81 => Some(AttributeType::TunnelPrivateGroupId),
            85 => Some(AttributeType::AcctInterimInterval),
            89 => Some(AttributeType::ChargeableUserIdentity),
            190 => Some(AttributeType::WlanAkmSuite),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// RFC 2868 attributes that carry a leading tag octet
    pub fn is_tunnel(self) -> bool {
        matches!(
            self,
            AttributeType::TunnelType
                | AttributeType::TunnelMediumType
                | AttributeType::TunnelPassword
                | AttributeType::TunnelPrivateGroupId
        )
    }
}

/// Service-Type value Framed (2)
pub const SERVICE_TYPE_FRAMED: u32 = 2;

/// NAS-Port-Type value Wireless - IEEE 802.11 (19)
pub const NAS_PORT_TYPE_IEEE_802_11: u32 = 19;

/// Tunnel-Type value VLAN (13) - RFC 3580
pub const TUNNEL_TYPE_VLAN: u32 = 13;

/// Tunnel-Medium-Type value IEEE-802 (6) - RFC 3580
pub const TUNNEL_MEDIUM_TYPE_802: u32 = 6;

/// Egress-VLANID tag indication for tagged frames (0x31) - RFC 4675
pub const EGRESS_VLAN_TAGGED: u8 = 0x31;

/// Egress-VLANID tag indication for untagged frames (0x32) - RFC 4675
pub const EGRESS_VLAN_UNTAGGED: u8 = 0x32;

/// FreeRADIUS vendor id used for RADIUS-assisted PSK material
pub const VENDOR_FREERADIUS: u32 = 11344;

/// FreeRADIUS-802.1X-Anonce vendor attribute
pub const FREERADIUS_802_1X_ANONCE: u8 = 1;

/// FreeRADIUS-802.1X-EAPoL-Key-Msg vendor attribute
pub const FREERADIUS_802_1X_EAPOL_KEY_MSG: u8 = 2;
