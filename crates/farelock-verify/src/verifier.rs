//! Ticket verification at three strengths.
//!
//! Signature verification is local and works offline against a cached
//! public key. Merkle verification additionally proves batch inclusion
//! against the frozen root. Blockchain strength further requires that root
//! to be anchored and confirmed on chain. Every composite verification
//! call appends an audit record, pass or fail.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use farelock_core::{
    canonicalize, sha256,
    storage::{BatchStore, TicketStore, VerificationLogStore},
    BatchStatus, Clock, HashScheme, ReasonCode, Ticket, TicketId, TicketStatus, VerificationId,
    VerificationMethod, VerificationRecord,
};
use farelock_crypto::{merkle, verify_digest, KeyRegistry};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

/// Guarantee level a caller asks for.
///
/// Each level implies the weaker ones: merkle verification also checks the
/// signature, blockchain verification also checks the proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strength {
    /// Local signature check only.
    Signature,
    /// Signature plus Merkle inclusion against the frozen batch root.
    Merkle,
    /// Signature, inclusion, and a chain-confirmed anchor for the root.
    Blockchain,
}

impl Strength {
    fn method(self) -> VerificationMethod {
        match self {
            Self::Signature => VerificationMethod::Signature,
            Self::Merkle => VerificationMethod::MerkleProof,
            Self::Blockchain => VerificationMethod::Blockchain,
        }
    }
}

/// One verification attempt.
#[derive(Debug, Clone)]
pub struct VerifyRequest {
    /// Ticket to verify.
    pub ticket_id: TicketId,
    /// Requested guarantee level.
    pub strength: Strength,
    /// Consume the ticket on success (pickup-time verification).
    pub consume: bool,
    /// Claim map the holder presents, compared against the sealed hash.
    ///
    /// `None` verifies the stored record alone.
    pub presented_claims: Option<serde_json::Value>,
    /// Signature bytes the holder presents, checked against the sealed
    /// digest under the key the ticket declares.
    pub presented_signature: Option<Vec<u8>>,
    /// Who is verifying, for the audit log.
    pub verifier_identity: String,
    /// Free-form client context for the audit log.
    pub client_metadata: Option<String>,
}

/// Outcome of a verification attempt.
///
/// `valid == false` is a definitive answer with a reason code, never an
/// error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    /// Ticket the result describes.
    pub ticket_id: TicketId,
    /// Whether the ticket passed at the requested strength.
    pub valid: bool,
    /// Method the result was established with.
    pub method: VerificationMethod,
    /// Why verification failed, when it did.
    pub reason: Option<ReasonCode>,
    /// Whether this call consumed the ticket.
    pub consumed: bool,
    /// When the verification happened.
    pub verified_at: DateTime<Utc>,
}

/// Reads ticket, batch, and anchor state; appends audit records.
///
/// Never mutates issuance state except the atomic single-use
/// `Valid` -> `Used` transition a consuming verification performs.
pub struct Verifier {
    tickets: Arc<dyn TicketStore>,
    batches: Arc<dyn BatchStore>,
    log: Arc<dyn VerificationLogStore>,
    keys: Arc<KeyRegistry>,
    clock: Arc<dyn Clock>,
    scheme: HashScheme,
}

impl Verifier {
    /// Creates a verifier over the given stores and trusted keys.
    pub fn new(
        tickets: Arc<dyn TicketStore>,
        batches: Arc<dyn BatchStore>,
        log: Arc<dyn VerificationLogStore>,
        keys: Arc<KeyRegistry>,
        clock: Arc<dyn Clock>,
        scheme: HashScheme,
    ) -> Self {
        Self { tickets, batches, log, keys, clock, scheme }
    }

    /// Verifies a ticket at the requested strength and logs the attempt.
    ///
    /// Checks run cheapest first: signature, then inclusion (and anchor
    /// confirmation at blockchain strength), then status. Consumption only
    /// happens when every requested check passed.
    pub async fn verify(&self, request: VerifyRequest) -> Result<VerificationResult> {
        let ticket = self.tickets.find_ticket(request.ticket_id).await?;
        // An unknown ticket never reaches a cryptographic check; the log
        // records a status-only lookup for it.
        let (method, reason, consumed) = match &ticket {
            None => (VerificationMethod::StatusOnly, Some(ReasonCode::NotFound), false),
            Some(ticket) => {
                let (reason, consumed) = self.check(ticket, &request).await?;
                (request.strength.method(), reason, consumed)
            }
        };

        let result = VerificationResult {
            ticket_id: request.ticket_id,
            valid: reason.is_none(),
            method,
            reason,
            consumed,
            verified_at: self.clock.now(),
        };

        self.log
            .append_verification(VerificationRecord {
                id: VerificationId::new(),
                ticket_id: request.ticket_id,
                verifier_identity: request.verifier_identity,
                method: result.method,
                passed: result.valid,
                reason: result.reason,
                timestamp: result.verified_at,
                client_metadata: request.client_metadata,
            })
            .await?;

        debug!(
            ticket_id = %result.ticket_id,
            valid = result.valid,
            reason = ?result.reason,
            consumed = result.consumed,
            "verification completed"
        );
        Ok(result)
    }

    async fn check(
        &self,
        ticket: &Ticket,
        request: &VerifyRequest,
    ) -> Result<(Option<ReasonCode>, bool)> {
        if let Some(reason) = self.check_signature(ticket) {
            return Ok((Some(reason), false));
        }
        if let Some(reason) = self.check_presented(ticket, request) {
            return Ok((Some(reason), false));
        }

        if request.strength >= Strength::Merkle {
            let require_anchor = request.strength >= Strength::Blockchain;
            if let Some(reason) = self.check_inclusion(ticket, require_anchor).await? {
                return Ok((Some(reason), false));
            }
        }

        self.check_status(ticket, request.consume).await
    }

    /// Recomputes the canonical hash and checks the stored signature.
    ///
    /// Pure and offline. Stored claims that no longer canonicalize, or
    /// that hash differently than at issuance, are the tamper signal.
    pub fn check_signature(&self, ticket: &Ticket) -> Option<ReasonCode> {
        let payload = match canonicalize(&ticket.claims) {
            Ok(payload) => payload,
            Err(_) => return Some(ReasonCode::HashMismatch),
        };
        if sha256(&payload) != ticket.hash {
            return Some(ReasonCode::HashMismatch);
        }

        let Some(key) = self.keys.get(&ticket.key_id) else {
            return Some(ReasonCode::UnknownKey);
        };
        if !verify_digest(key, &ticket.hash, &ticket.signature) {
            return Some(ReasonCode::SignatureInvalid);
        }
        None
    }

    /// Compares a holder's presented copy against the sealed record.
    ///
    /// Presented claims must canonicalize to the sealed hash; a presented
    /// signature must verify over that hash under the key the ticket
    /// declares. Either mismatch means the holder's copy was altered.
    fn check_presented(&self, ticket: &Ticket, request: &VerifyRequest) -> Option<ReasonCode> {
        if let Some(claims) = &request.presented_claims {
            let payload = match canonicalize(claims) {
                Ok(payload) => payload,
                Err(_) => return Some(ReasonCode::HashMismatch),
            };
            if sha256(&payload) != ticket.hash {
                return Some(ReasonCode::HashMismatch);
            }
        }

        if let Some(signature) = &request.presented_signature {
            let Some(key) = self.keys.get(&ticket.key_id) else {
                return Some(ReasonCode::UnknownKey);
            };
            if !verify_digest(key, &ticket.hash, signature) {
                return Some(ReasonCode::SignatureInvalid);
            }
        }
        None
    }

    /// Checks Merkle inclusion against the batch root.
    pub async fn check_inclusion(
        &self,
        ticket: &Ticket,
        require_anchor: bool,
    ) -> Result<Option<ReasonCode>> {
        let Some(batch_id) = ticket.batch_id else {
            return Ok(Some(ReasonCode::NotYetFrozen));
        };
        let Some(batch) = self.batches.find_batch(batch_id).await? else {
            return Ok(Some(ReasonCode::NotYetFrozen));
        };
        let Some(root) = batch.merkle_root else {
            return Ok(Some(ReasonCode::NotYetFrozen));
        };
        if require_anchor && batch.status != BatchStatus::Anchored {
            return Ok(Some(ReasonCode::NotYetAnchored));
        }

        let Some(proof) = self.batches.find_proof(ticket.id).await? else {
            return Ok(Some(ReasonCode::ProofMissing));
        };
        if !merkle::verify(ticket.hash, &proof.path, root, self.scheme) {
            return Ok(Some(ReasonCode::ProofInvalid));
        }
        Ok(None)
    }

    /// Checks lifecycle status, optionally consuming the ticket.
    ///
    /// Consumption is a compare-and-swap in the store, so concurrent
    /// consuming verifications of the same ticket admit exactly one.
    pub async fn check_status(
        &self,
        ticket: &Ticket,
        consume: bool,
    ) -> Result<(Option<ReasonCode>, bool)> {
        let now = self.clock.now();

        let reason = match ticket.status {
            TicketStatus::Revoked => Some(ReasonCode::Revoked),
            TicketStatus::Expired => Some(ReasonCode::Expired),
            TicketStatus::Used => Some(ReasonCode::AlreadyUsed),
            TicketStatus::Pending => Some(ReasonCode::NotYetActive),
            TicketStatus::Valid if now < ticket.valid_from => Some(ReasonCode::NotYetActive),
            // The sweeper may lag; an overdue ticket is already invalid.
            TicketStatus::Valid if now > ticket.valid_until => Some(ReasonCode::Expired),
            TicketStatus::Valid => None,
        };
        if let Some(reason) = reason {
            return Ok((Some(reason), false));
        }

        if consume {
            if self.tickets.consume_if_valid(ticket.id, now).await? {
                return Ok((None, true));
            }
            // Another verifier won the race between our read and the swap.
            return Ok((Some(ReasonCode::AlreadyUsed), false));
        }
        Ok((None, false))
    }
}

impl std::fmt::Debug for Verifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Verifier")
            .field("scheme", &self.scheme)
            .field("trusted_keys", &self.keys.len())
            .finish_non_exhaustive()
    }
}
