//! Canonical 32-byte words and the hex helpers built around them.

use std::{fmt, str::FromStr};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};
use thiserror::Error;

/// Number of hex digits in a canonical word.
pub const WORD_HEX_LEN: usize = 64;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HexWordError {
    #[error("invalid hex digits in '{0}'")]
    InvalidHex(String),
    #[error("hex value has {0} digits, a word holds at most 64")]
    TooLong(usize),
    #[error("byte value has {0} bytes, a word holds at most 32")]
    TooManyBytes(usize),
}

/// A fixed 32-byte big-endian value. Public inputs are compared in this form
/// regardless of how the portal encoded them.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Word32([u8; 32]);

impl Word32 {
    pub const ZERO: Word32 = Word32([0u8; 32]);

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn into_bytes(self) -> [u8; 32] {
        self.0
    }

    /// Parse a hex word, with or without `0x`, left-padding short values.
    ///
    /// Digits are case-insensitive, so two words that differ only in hex case
    /// parse to the same value.
    pub fn from_hex(input: &str) -> Result<Self, HexWordError> {
        let digits = strip_0x(input);
        if digits.len() > WORD_HEX_LEN {
            return Err(HexWordError::TooLong(digits.len()));
        }
        let padded = format!("{:0>width$}", digits, width = WORD_HEX_LEN);
        let mut out = [0u8; 32];
        hex::decode_to_slice(&padded, &mut out)
            .map_err(|_| HexWordError::InvalidHex(input.to_string()))?;
        Ok(Self(out))
    }

    /// Left-pad a big-endian byte string of at most 32 bytes.
    pub fn from_be_slice(bytes: &[u8]) -> Result<Self, HexWordError> {
        if bytes.len() > 32 {
            return Err(HexWordError::TooManyBytes(bytes.len()));
        }
        let mut out = [0u8; 32];
        out[32 - bytes.len()..].copy_from_slice(bytes);
        Ok(Self(out))
    }

    pub fn from_u64(value: u64) -> Self {
        let mut out = [0u8; 32];
        out[24..].copy_from_slice(&value.to_be_bytes());
        Self(out)
    }

    /// Final byte of the word; circuits that emit one value per slot keep it here.
    pub fn last_byte(&self) -> u8 {
        self.0[31]
    }

    /// `0x`-prefixed lowercase hex, always 64 digits.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for Word32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Word32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Word32({})", self.to_hex())
    }
}

impl FromStr for Word32 {
    type Err = HexWordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl From<[u8; 32]> for Word32 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl Serialize for Word32 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Word32 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Word32::from_hex(&s).map_err(de::Error::custom)
    }
}

/// Strip a leading `0x` / `0X` if present.
pub fn strip_0x(input: &str) -> &str {
    input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
        .unwrap_or(input)
}

/// Decode a hex byte string of any length. Odd-length input is left-padded
/// with a single `0`.
pub fn decode_hex_bytes(input: &str) -> Result<Vec<u8>, HexWordError> {
    let digits = strip_0x(input);
    let decoded = if digits.len() % 2 == 1 {
        hex::decode(format!("0{digits}"))
    } else {
        hex::decode(digits)
    };
    decoded.map_err(|_| HexWordError::InvalidHex(input.to_string()))
}

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

pub fn keccak_word(data: &[u8]) -> Word32 {
    Word32(keccak256(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_hex_left_pads_and_ignores_case() {
        let short = Word32::from_hex("0xABcd").unwrap();
        assert_eq!(short.as_bytes()[30..], [0xab, 0xcd]);
        assert_eq!(short, Word32::from_hex("abcd").unwrap());
        assert_eq!(short.to_hex().len(), 66);
        assert!(short.to_hex().ends_with("abcd"));
    }

    #[test]
    fn from_hex_rejects_overlong_and_garbage() {
        let overlong = format!("0x{}", "1".repeat(65));
        assert_eq!(Word32::from_hex(&overlong), Err(HexWordError::TooLong(65)));
        assert!(matches!(
            Word32::from_hex("0xzz"),
            Err(HexWordError::InvalidHex(_))
        ));
    }

    #[test]
    fn from_be_slice_left_pads() {
        let word = Word32::from_be_slice(&[1, 2]).unwrap();
        assert_eq!(word, Word32::from_u64(0x0102));
        assert!(Word32::from_be_slice(&[0u8; 33]).is_err());
    }

    #[test]
    fn decode_hex_bytes_pads_odd_length() {
        assert_eq!(decode_hex_bytes("0xabc").unwrap(), vec![0x0a, 0xbc]);
        assert_eq!(decode_hex_bytes("").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn keccak_matches_known_vector() {
        // keccak256("") is a well-known constant.
        assert_eq!(
            keccak_word(b"").to_hex(),
            "0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn serde_uses_hex_strings() {
        let word = Word32::from_u64(255);
        let json = serde_json::to_string(&word).unwrap();
        assert_eq!(json, format!("\"{}\"", word.to_hex()));
        let back: Word32 = serde_json::from_str(&json).unwrap();
        assert_eq!(back, word);
    }
}
