//! SHA-256 digest primitive and hash combination.
//!
//! All hashing in the ticket pipeline goes through this module. Digests are
//! fixed 32-byte values; combination is defined as `sha256(left || right)`
//! with no separator, which is the node rule for Merkle tree construction.

use std::{fmt, str::FromStr};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest as Sha2Digest, Sha256};

/// A 32-byte SHA-256 digest.
///
/// Wraps the raw bytes to prevent mixing digests with arbitrary byte slices.
/// Serializes as a lowercase hex string for transport and storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest(pub [u8; 32]);

impl Digest {
    /// Returns the raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex rendering of the digest.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses a digest from a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] =
            bytes.try_into().map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Self(arr))
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for Digest {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(de::Error::custom)
    }
}

/// Hashing scheme applied when combining Merkle tree nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashScheme {
    /// Plain `sha256(left || right)`.
    #[default]
    Single,
    /// Bitcoin-style `sha256(sha256(left || right))`.
    Double,
}

/// Computes the SHA-256 digest of a byte slice.
pub fn sha256(data: &[u8]) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update(data);
    Digest(hasher.finalize().into())
}

/// Computes `sha256(sha256(data))`.
pub fn double_sha256(data: &[u8]) -> Digest {
    sha256(sha256(data).as_bytes())
}

/// Combines two digests into a parent node digest.
///
/// Concatenation order is left then right with no separator. The scheme
/// selects single or double SHA-256 for the outer hash.
pub fn combine(left: &Digest, right: &Digest, scheme: HashScheme) -> Digest {
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(left.as_bytes());
    buf[32..].copy_from_slice(right.as_bytes());
    match scheme {
        HashScheme::Single => sha256(&buf),
        HashScheme::Double => double_sha256(&buf),
    }
}
