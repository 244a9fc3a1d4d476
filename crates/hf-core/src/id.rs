//! Monotonic, lexicographically sortable 128-bit identifiers rendered as
//! 26 Crockford-base32 characters (the ULID shape spec.md §3 calls for).

use rand::RngCore;
use std::fmt;
use std::str::FromStr;

const ENCODING: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";
const ID_LEN: usize = 26;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId([u8; 16]);

impl EventId {
    /// Generates a fresh ID: 48 bits of millisecond Unix timestamp followed
    /// by 80 bits of randomness, matching ULID's layout.
    pub fn new() -> Self {
        let millis = chrono::Utc::now().timestamp_millis().max(0) as u64;
        Self::from_parts(millis, rand::thread_rng().next_u64(), rand::thread_rng().next_u64())
    }

    pub fn from_parts(millis: u64, rand_hi: u64, rand_lo: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[0] = (millis >> 40) as u8;
        bytes[1] = (millis >> 32) as u8;
        bytes[2] = (millis >> 24) as u8;
        bytes[3] = (millis >> 16) as u8;
        bytes[4] = (millis >> 8) as u8;
        bytes[5] = millis as u8;
        // 80 bits of randomness from the low bits of the two u64s.
        let rand_bytes = ((rand_hi as u128) << 16 | (rand_lo as u128 & 0xFFFF)).to_be_bytes();
        bytes[6..16].copy_from_slice(&rand_bytes[6..16]);
        EventId(bytes)
    }

    pub fn timestamp_millis(&self) -> u64 {
        (self.0[0] as u64) << 40
            | (self.0[1] as u64) << 32
            | (self.0[2] as u64) << 24
            | (self.0[3] as u64) << 16
            | (self.0[4] as u64) << 8
            | (self.0[5] as u64)
    }

    fn to_u128(self) -> u128 {
        u128::from_be_bytes(self.0)
    }

    fn from_u128(v: u128) -> Self {
        EventId(v.to_be_bytes())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut value = self.to_u128();
        let mut chars = [0u8; ID_LEN];
        for i in (0..ID_LEN).rev() {
            chars[i] = ENCODING[(value & 0x1F) as usize];
            value >>= 5;
        }
        f.write_str(std::str::from_utf8(&chars).expect("ascii"))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid event id: {0}")]
pub struct ParseEventIdError(String);

impl FromStr for EventId {
    type Err = ParseEventIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != ID_LEN {
            return Err(ParseEventIdError(s.to_string()));
        }
        let mut value: u128 = 0;
        let mut first_digit: Option<usize> = None;
        for (i, c) in s.chars().enumerate() {
            let c = c.to_ascii_uppercase();
            let digit = ENCODING
                .iter()
                .position(|&b| b == c as u8)
                .ok_or_else(|| ParseEventIdError(s.to_string()))?;
            if i == 0 {
                first_digit = Some(digit);
            }
            value = (value << 5) | digit as u128;
        }
        // The top 2 bits of a 26-char*5-bit=130-bit decode must be zero for
        // a valid 128-bit value; those bits live in the first digit.
        if first_digit.unwrap_or(0) >= 8 {
            return Err(ParseEventIdError(s.to_string()));
        }
        Ok(EventId::from_u128(value))
    }
}

impl serde::Serialize for EventId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for EventId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
