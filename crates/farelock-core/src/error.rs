//! Error types for canonical serialization and storage operations.
//!
//! Cryptographic and serialization failures are disclosed to the direct
//! caller; batch-state conflicts are recoverable and never surfaced to
//! issuing callers (the batch manager reroutes to a fresh batch instead).

use thiserror::Error;

use crate::models::{BatchId, BatchStatus, TicketId};

/// Result type alias using [`StorageError`].
pub type Result<T> = std::result::Result<T, StorageError>;

/// Claim-map canonicalization failures.
///
/// These are caller-fixable: the claim map itself is malformed. They reject
/// the issuance request before any ticket state is created.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CanonicalError {
    /// The root of a claim map must be a JSON object.
    #[error("claim map root must be an object")]
    NotAnObject,

    /// Number is NaN or infinite and has no canonical byte form.
    #[error("claim map contains a non-finite number")]
    NonFiniteNumber,

    /// Nesting exceeds the supported depth.
    #[error("claim map nesting exceeds maximum depth of {max}")]
    DepthExceeded {
        /// The depth limit that was exceeded.
        max: usize,
    },
}

/// Record-store operation failures.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Requested entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Attempted assignment into a batch that is no longer OPEN.
    ///
    /// Recovered internally by retrying against a newly opened batch;
    /// never surfaced to the issuing caller.
    #[error("batch {batch_id} is {status}, not open for assignment")]
    BatchNotOpen {
        /// The batch that rejected the assignment.
        batch_id: BatchId,
        /// Its status at the time of the attempt.
        status: BatchStatus,
    },

    /// A state transition was requested from an incompatible state.
    #[error("invalid transition for batch {batch_id}: {detail}")]
    InvalidBatchTransition {
        /// The batch whose transition was rejected.
        batch_id: BatchId,
        /// What was attempted and why it was rejected.
        detail: String,
    },

    /// A ticket transition was requested from an incompatible state.
    #[error("invalid transition for ticket {ticket_id}: {detail}")]
    InvalidTicketTransition {
        /// The ticket whose transition was rejected.
        ticket_id: TicketId,
        /// What was attempted and why it was rejected.
        detail: String,
    },

    /// A batch already has an active (non-failed) anchor.
    #[error("batch {batch_id} already has an active anchor")]
    AnchorConflict {
        /// The batch with the conflicting anchor.
        batch_id: BatchId,
    },

    /// Underlying store failure (connection, serialization, corruption).
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Whether the failed operation is safe to retry.
    ///
    /// Batch-not-open conflicts are retryable against a fresh batch;
    /// backend failures may be transient. Invalid transitions are not.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::BatchNotOpen { .. } | Self::Backend(_))
    }
}
