//! Store-native 12-byte document identifiers.
//!
//! Layout: 4-byte big-endian unix seconds, 5 bytes of per-process
//! randomness, 3-byte big-endian counter. Identifiers generated by one
//! process therefore sort in creation order.

use crate::{error::Result, Error};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;

const COUNTER_MASK: u32 = 0x00ff_ffff;

static COUNTER: AtomicU32 = AtomicU32::new(0);
static PROCESS_UNIQUE: OnceLock<[u8; 5]> = OnceLock::new();

/// A 12-byte object identifier, rendered as 24 lowercase hex characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 12]);

impl ObjectId {
    /// Generate a new identifier stamped with the current time.
    pub fn new() -> Self {
        let seconds = chrono::Utc::now().timestamp() as u32;
        Self::from_parts(seconds, Self::next_counter())
    }

    /// Build an identifier from raw bytes.
    pub fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    /// Raw bytes of this identifier.
    pub fn bytes(&self) -> [u8; 12] {
        self.0
    }

    /// Seconds since the unix epoch encoded in the identifier.
    pub fn timestamp(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    /// Parse a 24-character hex string.
    pub fn parse_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.len() != 24 || !s.is_ascii() {
            return Err(Error::InvalidObjectId(s.to_string()));
        }

        let mut bytes = [0u8; 12];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(|_| Error::InvalidObjectId(s.to_string()))?;
        }
        Ok(Self(bytes))
    }

    fn from_parts(seconds: u32, counter: u32) -> Self {
        let unique = PROCESS_UNIQUE.get_or_init(|| {
            let random = uuid::Uuid::new_v4();
            let b = random.as_bytes();
            [b[0], b[1], b[2], b[3], b[4]]
        });

        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&seconds.to_be_bytes());
        bytes[4..9].copy_from_slice(unique);
        bytes[9..].copy_from_slice(&counter.to_be_bytes()[1..]);
        Self(bytes)
    }

    fn next_counter() -> u32 {
        COUNTER.fetch_add(1, Ordering::Relaxed).wrapping_add(1) & COUNTER_MASK
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl FromStr for ObjectId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_roundtrip() {
        let id = ObjectId::parse_str("65f1c0a2e4b0a1b2c3d4e5f6").unwrap();
        assert_eq!(id.to_string(), "65f1c0a2e4b0a1b2c3d4e5f6");
        assert_eq!(id.timestamp(), 0x65f1c0a2);
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!(ObjectId::parse_str("").is_err());
        assert!(ObjectId::parse_str("65f1c0a2e4b0a1b2c3d4e5").is_err());
        assert!(ObjectId::parse_str("zzf1c0a2e4b0a1b2c3d4e5f6").is_err());
        assert!(matches!(
            "not-an-id".parse::<ObjectId>(),
            Err(Error::InvalidObjectId(_))
        ));
    }

    #[test]
    fn generated_ids_are_unique_and_ordered() {
        let first = ObjectId::new();
        let second = ObjectId::new();
        assert_ne!(first, second);
        // Same second or later; counter breaks ties within a second.
        assert!(first.timestamp() <= second.timestamp());
    }
}
