//! Device identity and addressing: device ID derivation, link-layer peer addresses, group IDs.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Group identifier. 0 means "not in a group".
pub type GroupId = u32;

/// Device ID: 32-bit, network-visible, stable for the lifetime of the process.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct DeviceId(pub u32);

impl DeviceId {
    /// Derive from the provisioned serial number, or fall back to a random ID when none is set.
    pub fn derive(serial: Option<&str>) -> Self {
        match serial.map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) => Self::from_serial(s),
            None => Self::random_fallback(),
        }
    }

    /// Hash a serial number down to 32 bits. Deterministic across restarts.
    pub fn from_serial(serial: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"ledsync-device-v1");
        hasher.update(serial.as_bytes());
        Self::from_digest(&hasher.finalize())
    }

    /// Pseudo-random ID mixed from OS entropy and clock jitter.
    /// Not checked for collisions with other devices.
    pub fn random_fallback() -> Self {
        let mut hasher = Sha256::new();
        hasher.update(jitter_nanos().to_le_bytes());
        let mut entropy = [0u8; 16];
        OsRng.fill_bytes(&mut entropy);
        hasher.update(entropy);
        hasher.update(jitter_nanos().to_le_bytes());
        Self::from_digest(&hasher.finalize())
    }

    fn from_digest(digest: &[u8]) -> Self {
        let id = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
        DeviceId(if id == 0 { 1 } else { id })
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

fn jitter_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0)
}

/// Transport-level (link-layer) address of a device. Natural key for the directories.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct PeerAddress(pub [u8; 6]);

impl PeerAddress {
    pub const BROADCAST: PeerAddress = PeerAddress([0xff; 6]);

    pub fn from_bytes(bytes: [u8; 6]) -> Self {
        PeerAddress(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

/// Random non-zero group ID for `create_group(0)`.
pub fn random_group_id() -> GroupId {
    rand::thread_rng().gen_range(1..=u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_derivation_is_stable() {
        let a = DeviceId::from_serial("LED-000123");
        let b = DeviceId::from_serial("LED-000123");
        assert_eq!(a, b);
        assert_ne!(a, DeviceId::from_serial("LED-000124"));
    }

    #[test]
    fn blank_serial_uses_fallback() {
        let id = DeviceId::derive(Some("   "));
        assert_ne!(id.as_u32(), 0);
        assert_eq!(
            DeviceId::derive(Some(" LED-7 ")),
            DeviceId::from_serial("LED-7")
        );
    }

    #[test]
    fn fallback_never_zero() {
        for _ in 0..64 {
            assert_ne!(DeviceId::random_fallback().as_u32(), 0);
        }
    }

    #[test]
    fn group_id_never_zero() {
        for _ in 0..256 {
            assert_ne!(random_group_id(), 0);
        }
    }

    #[test]
    fn address_display() {
        let addr = PeerAddress([0x24, 0x0a, 0xc4, 0x01, 0x02, 0xff]);
        assert_eq!(addr.to_string(), "24:0a:c4:01:02:ff");
        assert!(PeerAddress::BROADCAST.is_broadcast());
        assert!(!addr.is_broadcast());
    }
}
