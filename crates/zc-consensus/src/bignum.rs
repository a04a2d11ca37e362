//! Arbitrary-precision integers for coin commitments, serials and
//! accumulator values.
//!
//! Hashing goes through a canonical fixed-width big-endian encoding so that
//! bucket placement does not depend on the in-memory limb layout.

use crate::{ConsensusError, ConsensusResult};
use num_bigint::BigUint;
use num_traits::{One, Zero};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Width in bytes of the canonical hashing encoding (2048-bit values).
pub const CANONICAL_WIDTH: usize = 256;

/// Non-negative big integer.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct BigNum(BigUint);

impl BigNum {
    /// Zero.
    pub fn zero() -> Self {
        Self(BigUint::zero())
    }

    /// One.
    pub fn one() -> Self {
        Self(BigUint::one())
    }

    /// Parse from big-endian bytes.
    pub fn from_bytes_be(bytes: &[u8]) -> Self {
        Self(BigUint::from_bytes_be(bytes))
    }

    /// Big-endian magnitude without leading zeros (empty for zero).
    pub fn to_bytes_be(&self) -> Vec<u8> {
        if self.0.is_zero() {
            return Vec::new();
        }
        self.0.to_bytes_be()
    }

    /// Parse a hexadecimal string, with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> ConsensusResult<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        if s.is_empty() {
            return Err(ConsensusError::InvalidEncoding("empty hex number".to_string()));
        }
        BigUint::parse_bytes(s.as_bytes(), 16)
            .map(Self)
            .ok_or_else(|| ConsensusError::InvalidEncoding(format!("invalid hex number: {s}")))
    }

    /// Lowercase hexadecimal representation.
    pub fn to_hex(&self) -> String {
        self.0.to_str_radix(16)
    }

    /// Whether the value is zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Number of significant bits.
    pub fn bits(&self) -> u64 {
        self.0.bits()
    }

    /// Access the underlying integer.
    pub fn as_biguint(&self) -> &BigUint {
        &self.0
    }

    /// `self ^ exponent mod modulus`.
    pub fn mod_exp(&self, exponent: &BigNum, modulus: &BigNum) -> BigNum {
        Self(self.0.modpow(&exponent.0, &modulus.0))
    }

    /// Fixed-width big-endian encoding used for hashing.
    ///
    /// Values wider than [`CANONICAL_WIDTH`] keep their full length.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let magnitude = self.to_bytes_be();
        if magnitude.len() >= CANONICAL_WIDTH {
            return magnitude;
        }
        let mut out = vec![0u8; CANONICAL_WIDTH - magnitude.len()];
        out.extend_from_slice(&magnitude);
        out
    }

    /// Length-prefixed little-endian encoding as written on the wire.
    ///
    /// A zero value encodes as an empty vector; a padding byte is appended when
    /// the most significant byte has its high bit set so the value stays
    /// non-negative. The prefix is a compact size.
    pub fn serialized_bytes(&self) -> Vec<u8> {
        let mut le = if self.0.is_zero() {
            Vec::new()
        } else {
            self.0.to_bytes_le()
        };
        if le.last().is_some_and(|b| b & 0x80 != 0) {
            le.push(0);
        }

        let mut out = Vec::with_capacity(le.len() + 3);
        write_compact_size(&mut out, le.len() as u64);
        out.extend_from_slice(&le);
        out
    }
}

fn write_compact_size(out: &mut Vec<u8>, n: u64) {
    if n < 253 {
        out.push(n as u8);
    } else if n <= u16::MAX as u64 {
        out.push(253);
        out.extend_from_slice(&(n as u16).to_le_bytes());
    } else if n <= u32::MAX as u64 {
        out.push(254);
        out.extend_from_slice(&(n as u32).to_le_bytes());
    } else {
        out.push(255);
        out.extend_from_slice(&n.to_le_bytes());
    }
}

impl Hash for BigNum {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write(&self.canonical_bytes());
    }
}

impl From<BigUint> for BigNum {
    fn from(value: BigUint) -> Self {
        Self(value)
    }
}

impl From<u64> for BigNum {
    fn from(value: u64) -> Self {
        Self(BigUint::from(value))
    }
}

impl FromStr for BigNum {
    type Err = ConsensusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Debug for BigNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BigNum(0x{})", self.to_hex())
    }
}

impl fmt::Display for BigNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for BigNum {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for BigNum {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(n: &BigNum) -> u64 {
        let mut h = DefaultHasher::new();
        n.hash(&mut h);
        h.finish()
    }

    #[test]
    fn test_hex_roundtrip() {
        let n = BigNum::from_hex("0xdeadbeef").unwrap();
        assert_eq!(n, BigNum::from(0xdead_beefu64));
        assert_eq!(n.to_hex(), "deadbeef");
        assert!(BigNum::from_hex("").is_err());
        assert!(BigNum::from_hex("xyz").is_err());
    }

    #[test]
    fn test_canonical_bytes_fixed_width() {
        let small = BigNum::from(1u64);
        let bytes = small.canonical_bytes();
        assert_eq!(bytes.len(), CANONICAL_WIDTH);
        assert_eq!(bytes[CANONICAL_WIDTH - 1], 1);
        assert!(bytes[..CANONICAL_WIDTH - 1].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_equal_values_hash_equal() {
        let a = BigNum::from_bytes_be(&[0, 0, 0x12, 0x34]);
        let b = BigNum::from(0x1234u64);
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn test_serialized_bytes_sign_padding() {
        assert_eq!(BigNum::zero().serialized_bytes(), vec![0]);
        assert_eq!(BigNum::from(0x7fu64).serialized_bytes(), vec![1, 0x7f]);
        assert_eq!(BigNum::from(0x80u64).serialized_bytes(), vec![2, 0x80, 0x00]);
        assert_eq!(BigNum::from(0x0102u64).serialized_bytes(), vec![2, 0x02, 0x01]);
    }

    #[test]
    fn test_mod_exp() {
        let base = BigNum::from(4u64);
        let exp = BigNum::from(13u64);
        let modulus = BigNum::from(497u64);
        assert_eq!(base.mod_exp(&exp, &modulus), BigNum::from(445u64));
    }

    #[test]
    fn test_serde_as_hex_string() {
        let n = BigNum::from(255u64);
        let json = serde_json::to_string(&n).unwrap();
        assert_eq!(json, "\"ff\"");
        let back: BigNum = serde_json::from_str(&json).unwrap();
        assert_eq!(back, n);
    }
}
