//! Verification-side errors.
//!
//! An invalid ticket is never an error here. Verification reports a result
//! with a reason code; only infrastructure failures surface as errors.

use farelock_core::StorageError;

/// Infrastructure failures during verification.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    /// The record store rejected or lost an operation.
    #[error("storage operation failed")]
    Storage(#[from] StorageError),
}

/// Result alias for verification operations.
pub type Result<T> = std::result::Result<T, VerifyError>;
