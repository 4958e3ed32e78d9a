//! Randomness sources for timer jitter and SA Query transaction ids

use rand::TryRngCore;
use rand::rngs::OsRng;

/// Source of random bytes
///
/// `fill` returns false when no randomness is available; callers then fall
/// back to fixed values.
pub trait RandomSource {
    fn fill(&mut self, buf: &mut [u8]) -> bool;

    fn next_u32(&mut self) -> Option<u32> {
        let mut buf = [0u8; 4];
        self.fill(&mut buf).then(|| u32::from_be_bytes(buf))
    }
}

/// Operating system randomness
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn fill(&mut self, buf: &mut [u8]) -> bool {
        OsRng.try_fill_bytes(buf).is_ok()
    }
}

/// Deterministic source repeating the big-endian bytes of one value
#[derive(Debug, Clone)]
pub struct FixedRandom {
    value: Option<u32>,
}

impl FixedRandom {
    pub fn new(value: u32) -> Self {
        FixedRandom { value: Some(value) }
    }

    /// A source that always reports exhaustion
    pub fn unavailable() -> Self {
        FixedRandom { value: None }
    }
}

impl RandomSource for FixedRandom {
    fn fill(&mut self, buf: &mut [u8]) -> bool {
        let Some(value) = self.value else {
            return false;
        };
        let bytes = value.to_be_bytes();
        for (i, b) in buf.iter_mut().enumerate() {
            *b = bytes[i % 4];
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_random() {
        let mut rng = FixedRandom::new(0x1234_5678);
        assert_eq!(rng.next_u32(), Some(0x1234_5678));

        let mut buf = [0u8; 2];
        assert!(rng.fill(&mut buf));
        assert_eq!(buf, [0x12, 0x34]);
    }

    #[test]
    fn test_unavailable() {
        let mut rng = FixedRandom::unavailable();
        assert_eq!(rng.next_u32(), None);
    }

    #[test]
    fn test_os_random_fills() {
        let mut rng = OsRandom;
        let mut a = [0u8; 16];
        let mut b = [0u8; 16];
        assert!(rng.fill(&mut a));
        assert!(rng.fill(&mut b));
        assert_ne!(a, b);
    }
}
