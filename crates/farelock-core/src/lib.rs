//! Core domain models, canonical serialization, and storage traits.
//!
//! Provides the foundational types for tamper-evident ticket issuance:
//! strongly-typed identifiers, lifecycle status machines, the canonical
//! claim serializer every hash and signature is computed over, the SHA-256
//! digest primitive, and the narrow storage interfaces the rest of the
//! pipeline talks to the record store through.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod canonical;
pub mod error;
pub mod hash;
pub mod models;
pub mod storage;
pub mod time;

pub use canonical::canonicalize;
pub use error::{CanonicalError, Result, StorageError};
pub use hash::{combine, double_sha256, sha256, Digest, HashScheme};
pub use models::{
    AnchorStatus, BatchId, BatchStatus, BlockchainAnchor, KeyId, MerkleBatch, MerkleProof,
    Position, ProofStep, ReasonCode, Ticket, TicketId, TicketStatus, VerificationId,
    VerificationMethod, VerificationRecord,
};
pub use storage::{
    Assignment, AnchorStore, BatchStore, MemoryStore, TicketStore, VerificationLogStore,
};
pub use time::{Clock, SystemClock, TestClock};
