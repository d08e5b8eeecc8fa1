//! Core domain models and strongly-typed identifiers.
//!
//! Defines tickets, Merkle batches, inclusion proofs, blockchain anchors,
//! and verification log entries, plus newtype ID wrappers for compile-time
//! type safety. State transition rules are documented on each status enum;
//! the storage layer enforces them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::hash::Digest;

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Creates a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

uuid_id! {
    /// Strongly-typed ticket identifier.
    ///
    /// Follows a ticket through its entire lifecycle from issuance to a
    /// terminal state.
    TicketId
}

uuid_id! {
    /// Strongly-typed Merkle batch identifier.
    BatchId
}

uuid_id! {
    /// Identifier of the signing key that produced a ticket's signature.
    ///
    /// Derived deterministically from the public key, so verifiers can select
    /// the right public key from a registry using only the ticket's metadata.
    /// Multiple valid keys may coexist during rotation.
    KeyId
}

uuid_id! {
    /// Identifier of an append-only verification log entry.
    VerificationId
}

/// Ticket lifecycle status.
///
/// ```text
/// Pending -> Valid -> Used
///        |        -> Expired
///        └-> Revoked <-┘ (admin action from Pending or Valid)
/// ```
///
/// `Used`, `Expired`, and `Revoked` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    /// Created and persisted, signature not yet confirmed durable.
    ///
    /// Pending tickets are never exposed to callers; issuance either
    /// completes the flip to `Valid` or fails as a whole.
    Pending,

    /// Issued, signed, and usable.
    Valid,

    /// Consumed by exactly one successful pickup-time verification.
    Used,

    /// Validity window elapsed without consumption.
    Expired,

    /// Administratively invalidated.
    Revoked,
}

impl TicketStatus {
    /// Whether this status is terminal (no further transitions).
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Used | Self::Expired | Self::Revoked)
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Valid => write!(f, "valid"),
            Self::Used => write!(f, "used"),
            Self::Expired => write!(f, "expired"),
            Self::Revoked => write!(f, "revoked"),
        }
    }
}

/// A tamper-evident ride ticket.
///
/// Business fields are immutable after issuance. `hash` and `signature` are
/// computed exactly once when the ticket is issued and never recomputed; a
/// later recomputation that disagrees with the stored value indicates the
/// stored claims were tampered with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    /// Unique identifier for this ticket.
    pub id: TicketId,

    /// Arbitrary claim map (subject, booking reference, route, ...).
    ///
    /// Always a JSON object; hashed via the canonical serializer.
    pub claims: Value,

    /// Caller-supplied idempotency key, if any.
    ///
    /// Reissuing with the same key returns the existing ticket instead of
    /// creating a duplicate.
    pub idempotency_key: Option<String>,

    /// When the ticket was issued.
    pub issued_at: DateTime<Utc>,

    /// Start of the validity window.
    pub valid_from: DateTime<Utc>,

    /// End of the validity window.
    pub valid_until: DateTime<Utc>,

    /// SHA-256 of the canonical claim payload. Computed once at issuance.
    pub hash: Digest,

    /// DER-encoded ECDSA signature over `hash`. Computed once at issuance.
    pub signature: Vec<u8>,

    /// Identifier of the key that produced `signature`.
    pub key_id: KeyId,

    /// Current lifecycle status.
    pub status: TicketStatus,

    /// Batch this ticket belongs to, once assigned.
    pub batch_id: Option<BatchId>,

    /// Leaf index within the frozen batch, once the batch is frozen.
    pub merkle_index: Option<u32>,

    /// When the ticket was consumed, if it has been.
    pub consumed_at: Option<DateTime<Utc>>,
}

/// Merkle batch lifecycle status.
///
/// ```text
/// Open -> Freezing -> Ready -> Anchoring -> Anchored
///             |                    |
///             └------> Failed <----┘
/// ```
///
/// Once a batch leaves `Open`, no further tickets may be assigned to it.
/// Leaf order is fixed at freeze time and never re-sorted afterwards,
/// because every persisted proof is computed against that order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Accepting ticket assignments.
    Open,

    /// Closed to assignment; Merkle tree under construction.
    Freezing,

    /// Tree built, proofs persisted, awaiting anchor submission.
    Ready,

    /// Anchor transaction submitted, awaiting confirmations.
    Anchoring,

    /// Anchor confirmed on chain. Terminal success state.
    Anchored,

    /// Freeze or anchoring failed; eligible for resubmission.
    Failed,
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Freezing => write!(f, "freezing"),
            Self::Ready => write!(f, "ready"),
            Self::Anchoring => write!(f, "anchoring"),
            Self::Anchored => write!(f, "anchored"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A bounded, ordered batch of ticket hashes anchored together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerkleBatch {
    /// Unique identifier for this batch.
    pub id: BatchId,

    /// Ordered leaf hashes, insertion order.
    ///
    /// This order defines leaf indices and must never be re-sorted once the
    /// batch leaves `Open`.
    pub leaves: Vec<Digest>,

    /// Tickets backing `leaves`, index-aligned.
    pub ticket_ids: Vec<TicketId>,

    /// Merkle root, present from freeze completion onwards.
    pub merkle_root: Option<Digest>,

    /// Current lifecycle status.
    pub status: BatchStatus,

    /// Capacity that triggers a freeze when reached.
    pub max_size: u32,

    /// When the batch was opened.
    pub opened_at: DateTime<Utc>,

    /// When the batch was frozen, if it has been.
    pub frozen_at: Option<DateTime<Utc>>,
}

impl MerkleBatch {
    /// Number of tickets assigned to the batch.
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    /// Whether the batch holds no tickets.
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }
}

/// Side on which a proof sibling sits relative to the current node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    /// Sibling is the left child; current node is the right.
    Left,
    /// Sibling is the right child; current node is the left.
    Right,
}

/// One level of a Merkle inclusion proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    /// Hash of the sibling node at this level.
    pub sibling: Digest,
    /// Which side the sibling sits on.
    pub position: Position,
}

/// Merkle inclusion proof for one ticket within a frozen batch.
///
/// Replaying the path against the ticket's hash must reconstruct exactly
/// the batch's Merkle root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerkleProof {
    /// Ticket this proof covers.
    pub ticket_id: TicketId,

    /// Batch whose root the proof resolves to.
    pub batch_id: BatchId,

    /// Leaf index of the ticket in the frozen batch.
    pub leaf_index: u32,

    /// Sibling path from leaf to root.
    pub path: Vec<ProofStep>,
}

/// Blockchain anchor attempt lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorStatus {
    /// Created but not yet handed to the chain.
    Pending,

    /// Transaction submitted, awaiting confirmations.
    Submitted,

    /// Required confirmation count reached. Terminal success state.
    Confirmed,

    /// Lost or timed out; superseded by a fresh attempt.
    Failed,

    /// Deferred past its usefulness window without submission.
    Expired,
}

impl AnchorStatus {
    /// Whether this anchor still counts as active for its batch.
    ///
    /// A batch has at most one active anchor at a time; a new attempt is
    /// only created after the previous one fails.
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Submitted | Self::Confirmed)
    }
}

impl fmt::Display for AnchorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Submitted => write!(f, "submitted"),
            Self::Confirmed => write!(f, "confirmed"),
            Self::Failed => write!(f, "failed"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

/// Record of one attempt to anchor a batch's Merkle root on chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockchainAnchor {
    /// Batch whose root this anchor carries.
    pub batch_id: BatchId,

    /// Transaction hash returned by the chain on submission.
    pub tx_hash: String,

    /// When the transaction was submitted.
    pub submitted_at: DateTime<Utc>,

    /// Confirmations observed so far.
    pub confirmations: u64,

    /// Current attempt status.
    pub status: AnchorStatus,

    /// Fee the submission paid, in the chain's configured unit.
    pub fee_paid: u64,

    /// How many failed attempts preceded this one.
    pub retry_count: u32,
}

/// Verification method recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMethod {
    /// Local signature check against the issuer public key.
    Signature,
    /// Merkle inclusion proof check against the batch root.
    MerkleProof,
    /// Merkle check plus confirmed on-chain anchor.
    Blockchain,
    /// Status-only lookup (revoked/expired/used).
    StatusOnly,
}

impl fmt::Display for VerificationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signature => write!(f, "signature"),
            Self::MerkleProof => write!(f, "merkle_proof"),
            Self::Blockchain => write!(f, "blockchain"),
            Self::StatusOnly => write!(f, "status_only"),
        }
    }
}

/// Reason a verification reported an invalid result.
///
/// An invalid ticket is an expected outcome, not a system fault, so these
/// travel inside a [`VerificationRecord`] rather than as errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    /// No ticket exists with the presented identifier.
    NotFound,
    /// Stored claims no longer hash to the stored digest.
    HashMismatch,
    /// Signature does not verify against the declared key.
    SignatureInvalid,
    /// Ticket declares a key the verifier does not recognize.
    UnknownKey,
    /// No Merkle proof has been persisted for the ticket yet.
    ProofMissing,
    /// Proof replay did not reconstruct the batch root.
    ProofInvalid,
    /// Batch is not yet frozen; no root exists to check against.
    NotYetFrozen,
    /// Batch root exists but is not confirmed on chain yet.
    NotYetAnchored,
    /// Ticket was administratively revoked.
    Revoked,
    /// Ticket validity window has elapsed.
    Expired,
    /// Ticket was already consumed.
    AlreadyUsed,
    /// Ticket is pending or its validity window has not started.
    NotYetActive,
}

/// Append-only audit record of a verification attempt.
///
/// Never mutated or deleted within the retention window; mutation is a
/// correctness violation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationRecord {
    /// Unique identifier for this entry.
    pub id: VerificationId,

    /// Ticket that was verified.
    pub ticket_id: TicketId,

    /// Identity of the party performing the verification.
    pub verifier_identity: String,

    /// Verification method used.
    pub method: VerificationMethod,

    /// Whether the ticket verified successfully.
    pub passed: bool,

    /// Reason the verification failed, if it did.
    pub reason: Option<ReasonCode>,

    /// When the verification occurred.
    pub timestamp: DateTime<Utc>,

    /// Free-form client metadata (device, gate, operator).
    pub client_metadata: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_ticket_states() {
        assert!(TicketStatus::Used.is_terminal());
        assert!(TicketStatus::Expired.is_terminal());
        assert!(TicketStatus::Revoked.is_terminal());
        assert!(!TicketStatus::Pending.is_terminal());
        assert!(!TicketStatus::Valid.is_terminal());
    }

    #[test]
    fn failed_anchor_is_not_active() {
        assert!(AnchorStatus::Submitted.is_active());
        assert!(AnchorStatus::Confirmed.is_active());
        assert!(!AnchorStatus::Failed.is_active());
        assert!(!AnchorStatus::Expired.is_active());
    }

    #[test]
    fn status_display_forms() {
        assert_eq!(TicketStatus::Valid.to_string(), "valid");
        assert_eq!(BatchStatus::Freezing.to_string(), "freezing");
        assert_eq!(AnchorStatus::Submitted.to_string(), "submitted");
        assert_eq!(VerificationMethod::MerkleProof.to_string(), "merkle_proof");
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(TicketId::new(), TicketId::new());
        assert_ne!(BatchId::new(), BatchId::new());
    }
}
