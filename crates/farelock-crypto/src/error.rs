//! Error types for signing, key management, and Merkle tree operations.

use thiserror::Error;

/// Result type alias using [`CryptoError`].
pub type Result<T> = std::result::Result<T, CryptoError>;

/// Errors raised by cryptographic operations.
///
/// Note that a signature or proof that simply does not verify is not an
/// error; verification functions return `bool` and fail closed. These
/// variants cover malformed inputs and key-handling failures.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key material could not be parsed or is the wrong curve/format.
    #[error("invalid key material: {message}")]
    InvalidKey {
        /// What was wrong with the key material.
        message: String,
    },

    /// Signature bytes are not valid DER or the wrong length.
    #[error("malformed signature encoding")]
    MalformedSignature,

    /// Signing failed (should not happen with a well-formed key).
    #[error("signing failed: {message}")]
    SigningFailed {
        /// Underlying failure description.
        message: String,
    },

    /// Key file could not be read from disk.
    #[error("key file {path}: {source}")]
    KeyFile {
        /// Path that was being read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A Merkle tree was requested over zero leaves.
    #[error("cannot build a merkle tree over zero leaves")]
    EmptyTree,

    /// Proof requested for a leaf index outside the tree.
    #[error("leaf index {index} out of range for tree of {len} leaves")]
    IndexOutOfRange {
        /// The requested index.
        index: usize,
        /// Number of leaves in the tree.
        len: usize,
    },
}
