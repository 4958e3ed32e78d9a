//! Pre-shared keys handed out by RADIUS
//!
//! A pass-phrase needs 4096 rounds of PBKDF2 before it is usable, so the PMK
//! is derived on first use and then kept with the candidate.

use pbkdf2::pbkdf2_hmac;
use sha1::Sha1;
use std::fmt;
use std::sync::OnceLock;

/// PMK length for WPA-PSK
pub const PMK_LEN: usize = 32;

const PBKDF2_ROUNDS: u32 = 4096;

/// Why a Tunnel-Password could not be used as a PSK
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PskError {
    /// Neither 8-63 characters nor 64 hex digits
    BadLength(usize),
    /// 64 characters that are not all hex digits
    BadHex,
}

impl fmt::Display for PskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PskError::BadLength(len) => write!(f, "invalid PSK length {}", len),
            PskError::BadHex => write!(f, "invalid hex PSK"),
        }
    }
}

/// One usable PSK
pub enum PskCandidate {
    Passphrase {
        passphrase: String,
        pmk: OnceLock<[u8; PMK_LEN]>,
    },
    Raw([u8; PMK_LEN]),
}

impl PskCandidate {
    /// Interpret a decrypted Tunnel-Password
    pub fn from_tunnel_password(password: &[u8]) -> Result<Self, PskError> {
        match password.len() {
            8..=63 => Ok(PskCandidate::Passphrase {
                passphrase: String::from_utf8_lossy(password).into_owned(),
                pmk: OnceLock::new(),
            }),
            64 => {
                let mut raw = [0u8; PMK_LEN];
                hex::decode_to_slice(password, &mut raw).map_err(|_| PskError::BadHex)?;
                Ok(PskCandidate::Raw(raw))
            }
            len => Err(PskError::BadLength(len)),
        }
    }

    pub fn is_passphrase(&self) -> bool {
        matches!(self, PskCandidate::Passphrase { .. })
    }

    /// Whether the PMK is already available without derivation
    pub fn is_derived(&self) -> bool {
        match self {
            PskCandidate::Passphrase { pmk, .. } => pmk.get().is_some(),
            PskCandidate::Raw(_) => true,
        }
    }

    /// PMK for `ssid`, deriving it from the pass-phrase on first use
    pub fn pmk(&self, ssid: &[u8]) -> [u8; PMK_LEN] {
        match self {
            PskCandidate::Passphrase { passphrase, pmk } => *pmk.get_or_init(|| {
                let mut out = [0u8; PMK_LEN];
                pbkdf2_hmac::<Sha1>(passphrase.as_bytes(), ssid, PBKDF2_ROUNDS, &mut out);
                out
            }),
            PskCandidate::Raw(raw) => *raw,
        }
    }
}

impl fmt::Debug for PskCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PskCandidate::Passphrase { pmk, .. } => f
                .debug_struct("Passphrase")
                .field("derived", &pmk.get().is_some())
                .finish_non_exhaustive(),
            PskCandidate::Raw(_) => f.write_str("Raw(..)"),
        }
    }
}

/// PSKs from one Access-Accept, shared by the cache entry and stations
#[derive(Debug, Default)]
pub struct PskList {
    candidates: Vec<PskCandidate>,
}

impl PskList {
    pub fn new(candidates: Vec<PskCandidate>) -> Self {
        PskList { candidates }
    }

    pub fn push(&mut self, candidate: PskCandidate) {
        self.candidates.push(candidate);
    }

    pub fn iter(&self) -> impl Iterator<Item = &PskCandidate> {
        self.candidates.iter()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passphrase_pmk_is_derived_once() {
        // IEEE 802.11i-2004 Annex H.4 test vector
        let psk = PskCandidate::from_tunnel_password(b"password").unwrap();
        assert!(psk.is_passphrase());
        assert!(!psk.is_derived());

        let pmk = psk.pmk(b"IEEE");
        assert_eq!(
            hex::encode(pmk),
            "f42c6fc52df0ebef9ebb4b90b38a5f902e83fe1b135a70e23aed762e9710a12e"
        );
        assert!(psk.is_derived());
        assert_eq!(psk.pmk(b"IEEE"), pmk);
    }

    #[test]
    fn test_raw_hex_psk() {
        let text = "00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff";
        let psk = PskCandidate::from_tunnel_password(text.as_bytes()).unwrap();
        assert!(!psk.is_passphrase());
        assert_eq!(psk.pmk(b"ignored")[1], 0x11);
    }

    #[test]
    fn test_rejected_lengths() {
        assert_eq!(
            PskCandidate::from_tunnel_password(b"short").unwrap_err(),
            PskError::BadLength(5)
        );
        assert_eq!(
            PskCandidate::from_tunnel_password(&[b'z'; 64]).unwrap_err(),
            PskError::BadHex
        );
        assert!(PskCandidate::from_tunnel_password(&[b'a'; 65]).is_err());
    }

    #[test]
    fn test_debug_hides_secrets() {
        let list = PskList::new(vec![PskCandidate::from_tunnel_password(b"hunter22").unwrap()]);
        let text = format!("{:?}", list);
        assert!(!text.contains("hunter22"));
        assert_eq!(list.len(), 1);
    }
}
