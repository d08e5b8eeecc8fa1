//! Ticket issuance: validate, canonicalize, hash, sign, persist, assign.

use std::sync::Arc;

use farelock_core::{
    canonicalize, sha256, storage::TicketStore, Clock, Ticket, TicketId, TicketStatus,
};
use farelock_crypto::IssuerKey;
use serde_json::Value;
use tracing::{debug, info};

use crate::{
    batch::BatchManager,
    error::{IssuanceError, Result},
};

/// Issuance-time validation settings.
#[derive(Debug, Clone)]
pub struct IssuerConfig {
    /// Claims that must be present in every claim map.
    pub required_claims: Vec<String>,
}

impl Default for IssuerConfig {
    fn default() -> Self {
        Self { required_claims: vec!["subject".to_string()] }
    }
}

/// A caller's request for a new ticket.
#[derive(Debug, Clone)]
pub struct IssueRequest {
    /// Business claims to be sealed into the ticket. Must be a JSON object.
    pub claims: Value,
    /// Start of the validity window.
    pub valid_from: chrono::DateTime<chrono::Utc>,
    /// End of the validity window.
    pub valid_until: chrono::DateTime<chrono::Utc>,
    /// Optional idempotency key; retries with the same key return the
    /// original ticket.
    pub idempotency_key: Option<String>,
}

/// Creates tickets and owns their hash and signature.
///
/// The hash and signature are computed exactly once here and never
/// recomputed in storage. A later recomputation that disagrees with the
/// stored values is the tamper signal verification looks for.
pub struct TicketIssuer {
    tickets: Arc<dyn TicketStore>,
    batches: Arc<BatchManager>,
    key: Arc<IssuerKey>,
    clock: Arc<dyn Clock>,
    config: IssuerConfig,
}

impl TicketIssuer {
    /// Creates an issuer over the given store, batch manager, and key.
    pub fn new(
        tickets: Arc<dyn TicketStore>,
        batches: Arc<BatchManager>,
        key: Arc<IssuerKey>,
        clock: Arc<dyn Clock>,
        config: IssuerConfig,
    ) -> Self {
        Self { tickets, batches, key, clock, config }
    }

    /// Issues a new ticket, or replays an existing one for a known
    /// idempotency key.
    ///
    /// The ticket becomes `Valid` only after signing and persistence both
    /// succeed; a failure at any step leaves no usable ticket behind.
    pub async fn issue(&self, request: IssueRequest) -> Result<Ticket> {
        if let Some(key) = request.idempotency_key.as_deref() {
            if let Some(existing) = self.tickets.find_by_idempotency_key(key).await? {
                debug!(ticket_id = %existing.id, idempotency_key = key, "replaying existing ticket");
                return self.finish(existing).await;
            }
        }

        self.validate(&request)?;

        let payload = canonicalize(&request.claims)?;
        let hash = sha256(&payload);
        let signature = self.key.sign_digest(&hash)?;

        let ticket = Ticket {
            id: TicketId::new(),
            claims: request.claims,
            idempotency_key: request.idempotency_key,
            issued_at: self.clock.now(),
            valid_from: request.valid_from,
            valid_until: request.valid_until,
            hash,
            signature,
            key_id: self.key.key_id(),
            status: TicketStatus::Pending,
            batch_id: None,
            merkle_index: None,
            consumed_at: None,
        };
        let ticket_id = ticket.id;

        self.tickets.insert_ticket(ticket.clone()).await?;
        let finished = self.finish(ticket).await?;

        info!(
            %ticket_id,
            batch_id = ?finished.batch_id,
            leaf_index = ?finished.merkle_index,
            "ticket issued"
        );
        Ok(finished)
    }

    /// Assigns the ticket to a batch and activates it, skipping whichever
    /// step already happened.
    ///
    /// A crash or assignment failure between persistence and activation
    /// leaves a ticket without a batch or still `Pending`; an idempotent
    /// replay lands here and completes the remaining steps instead of
    /// replaying a ticket that could never gain a proof.
    async fn finish(&self, ticket: Ticket) -> Result<Ticket> {
        let mut changed = false;

        if ticket.batch_id.is_none() {
            let assignment = self.batches.assign(ticket.id, ticket.hash).await?;
            debug!(
                ticket_id = %ticket.id,
                batch_id = %assignment.batch_id,
                leaf_index = assignment.leaf_index,
                "ticket assigned to batch"
            );
            changed = true;
        }
        if ticket.status == TicketStatus::Pending {
            self.tickets.activate_ticket(ticket.id).await?;
            changed = true;
        }

        if !changed {
            return Ok(ticket);
        }
        self.tickets
            .find_ticket(ticket.id)
            .await?
            .ok_or_else(|| farelock_core::StorageError::NotFound(format!("ticket {}", ticket.id)).into())
    }

    fn validate(&self, request: &IssueRequest) -> Result<()> {
        let claims = match request.claims.as_object() {
            Some(claims) => claims,
            None => return Err(farelock_core::CanonicalError::NotAnObject.into()),
        };

        for name in &self.config.required_claims {
            if !claims.contains_key(name) {
                return Err(IssuanceError::MissingClaim { name: name.clone() });
            }
        }

        if request.valid_until <= request.valid_from {
            return Err(IssuanceError::InvalidWindow {
                detail: "valid_until must be after valid_from".to_string(),
            });
        }
        // One minute of skew tolerance so callers may stamp valid_from
        // themselves without racing our clock.
        if request.valid_from < self.clock.now() - chrono::Duration::seconds(60) {
            return Err(IssuanceError::InvalidWindow {
                detail: "valid_from lies in the past".to_string(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for TicketIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketIssuer")
            .field("key_id", &self.key.key_id())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
