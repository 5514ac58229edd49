//! Opaque, fixed-width content identifiers.
//!
//! A [Hash] names a commit, a tree, or a blob. The three namespaces may
//! overlap; callers are expected to know from context which one they mean.
//! This crate never computes a hash itself — it only stores, compares, and
//! displays the bytes the object store and importer hand it.
use data_encoding::HEXLOWER;
use std::fmt;

/// Conventional digest length (e.g. a SHA-1 object id). The core treats this
/// as an opaque constant; it does not imply a particular hash function.
pub const HASH_LEN: usize = 20;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hash([u8; HASH_LEN]);

impl Hash {
    pub const fn from_bytes(bytes: [u8; HASH_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// The all-zero hash. Useful as a sentinel "no parent" / "not found" value
    /// in tests, mirroring the `0{39}1`-style hashes used in the source
    /// fixture scenarios.
    pub const fn zero() -> Self {
        Self([0u8; HASH_LEN])
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid hash length: {0}")]
pub struct InvalidHashLen(pub usize);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HashParseError {
    #[error("invalid hex encoding")]
    InvalidHex,
    #[error("invalid hash length: {0}")]
    InvalidLength(usize),
}

impl std::str::FromStr for Hash {
    type Err = HashParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = HEXLOWER
            .decode(s.to_ascii_lowercase().as_bytes())
            .map_err(|_| HashParseError::InvalidHex)?;
        Hash::try_from(bytes).map_err(|e| HashParseError::InvalidLength(e.0))
    }
}

impl TryFrom<&[u8]> for Hash {
    type Error = InvalidHashLen;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        if value.len() != HASH_LEN {
            return Err(InvalidHashLen(value.len()));
        }
        let mut buf = [0u8; HASH_LEN];
        buf.copy_from_slice(value);
        Ok(Self(buf))
    }
}

impl TryFrom<Vec<u8>> for Hash {
    type Error = InvalidHashLen;

    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        Self::try_from(value.as_slice())
    }
}

impl From<[u8; HASH_LEN]> for Hash {
    fn from(value: [u8; HASH_LEN]) -> Self {
        Self(value)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", HEXLOWER.encode(&self.0))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", HEXLOWER.encode(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_displays_as_forty_zeroes() {
        assert_eq!(Hash::zero().to_string(), "0".repeat(40));
    }

    #[test]
    fn ordering_is_total_and_byte_lexicographic() {
        let a = Hash::from_bytes([0u8; HASH_LEN]);
        let mut b = [0u8; HASH_LEN];
        b[HASH_LEN - 1] = 1;
        let b = Hash::from_bytes(b);
        assert!(a < b);
    }

    #[test]
    fn rejects_wrong_length() {
        assert_eq!(Hash::try_from(&[0u8; 19][..]), Err(InvalidHashLen(19)));
    }

    #[test]
    fn parses_its_own_display_output() {
        let h = Hash::from_bytes([7u8; HASH_LEN]);
        let parsed: Hash = h.to_string().parse().unwrap();
        assert_eq!(h, parsed);
    }

    #[test]
    fn parse_rejects_short_hex() {
        assert_eq!("00".parse::<Hash>(), Err(HashParseError::InvalidLength(1)));
    }
}
