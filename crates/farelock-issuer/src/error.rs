//! Issuance-side error taxonomy.

use farelock_core::{CanonicalError, StorageError};
use farelock_crypto::CryptoError;

/// Errors surfaced to callers of ticket issuance and batch management.
///
/// Assignment races against a closing batch are recovered internally by
/// retrying a fresh batch and never appear here.
#[derive(Debug, thiserror::Error)]
pub enum IssuanceError {
    /// A required claim is absent from the claim map.
    #[error("missing required claim '{name}'")]
    MissingClaim {
        /// Name of the absent claim.
        name: String,
    },

    /// The validity window is inverted or lies in the past.
    #[error("invalid validity window: {detail}")]
    InvalidWindow {
        /// What made the window unacceptable.
        detail: String,
    },

    /// Claim map could not be canonically serialized.
    #[error("claim serialization failed")]
    Serialization(#[from] CanonicalError),

    /// Signing or Merkle construction failed.
    #[error("cryptographic operation failed")]
    Crypto(#[from] CryptoError),

    /// The record store rejected or lost an operation.
    #[error("storage operation failed")]
    Storage(#[from] StorageError),

    /// No open batch could be joined after repeated attempts.
    #[error("batch assignment exhausted after {attempts} attempts")]
    AssignmentExhausted {
        /// How many open batches were tried.
        attempts: u32,
    },
}

/// Result alias for issuance operations.
pub type Result<T> = std::result::Result<T, IssuanceError>;
