//! Storage abstraction for the ticket pipeline.
//!
//! The durable store is an external collaborator consumed through narrow
//! trait interfaces, so the pipeline can run against any backend that can
//! express the few atomic operations it needs: append-if-open batch
//! assignment and compare-and-swap ticket consumption. [`MemoryStore`]
//! is the reference implementation used by tests and single-node
//! deployments; a SQL backend would map the same operations onto row-level
//! locks or optimistic compare-and-swap updates.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};

use crate::{
    error::{Result, StorageError},
    hash::Digest,
    models::{
        AnchorStatus, BatchId, BatchStatus, BlockchainAnchor, MerkleBatch, MerkleProof, Ticket,
        TicketId, TicketStatus, VerificationRecord,
    },
};

/// Outcome of an atomic batch assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
    /// Batch the ticket was appended to.
    pub batch_id: BatchId,
    /// Leaf position the ticket took within the batch.
    pub leaf_index: u32,
    /// Whether this assignment filled the batch to capacity.
    ///
    /// The caller is responsible for triggering the freeze when this is
    /// set; assignment itself never changes batch status.
    pub reached_capacity: bool,
}

/// Ticket record operations.
#[async_trait]
pub trait TicketStore: Send + Sync + 'static {
    /// Persists a new ticket.
    async fn insert_ticket(&self, ticket: Ticket) -> Result<()>;

    /// Looks up a ticket by identifier.
    async fn find_ticket(&self, id: TicketId) -> Result<Option<Ticket>>;

    /// Looks up an existing ticket by caller-supplied idempotency key.
    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Ticket>>;

    /// Flips a ticket from `Pending` to `Valid`.
    ///
    /// Fails if the ticket is in any other state, so a half-issued ticket
    /// can never be activated twice or resurrected from a terminal state.
    async fn activate_ticket(&self, id: TicketId) -> Result<()>;

    /// Atomically consumes a ticket: `Valid` -> `Used`.
    ///
    /// Returns `true` iff this call performed the transition. Concurrent
    /// callers are serialized by the store; at most one observes `true`.
    async fn consume_if_valid(&self, id: TicketId, now: DateTime<Utc>) -> Result<bool>;

    /// Administratively revokes a `Pending` or `Valid` ticket.
    async fn revoke_ticket(&self, id: TicketId) -> Result<()>;

    /// Records the batch a ticket was assigned to.
    async fn set_ticket_batch(&self, id: TicketId, batch_id: BatchId) -> Result<()>;

    /// Records a ticket's leaf index once its batch is frozen.
    async fn set_merkle_index(&self, id: TicketId, index: u32) -> Result<()>;

    /// Expires every `Valid` ticket whose window has elapsed.
    ///
    /// Returns the number of tickets transitioned.
    async fn expire_due(&self, now: DateTime<Utc>) -> Result<u64>;
}

/// Merkle batch and proof operations.
#[async_trait]
pub trait BatchStore: Send + Sync + 'static {
    /// Opens a new batch accepting assignments.
    async fn open_batch(&self, max_size: u32, now: DateTime<Utc>) -> Result<MerkleBatch>;

    /// Returns the currently open batch, if one exists.
    async fn current_open_batch(&self) -> Result<Option<MerkleBatch>>;

    /// Atomically appends a leaf to a batch iff it is still `Open` and
    /// under capacity.
    ///
    /// Fails with [`StorageError::BatchNotOpen`] when the batch closed in
    /// the meantime; the caller retries against a fresh batch rather than
    /// losing the ticket.
    async fn try_assign(
        &self,
        batch_id: BatchId,
        ticket_id: TicketId,
        leaf: Digest,
    ) -> Result<Assignment>;

    /// Transitions `Open` -> `Freezing` and returns the fixed leaf order.
    ///
    /// After this call no further assignment into the batch can succeed.
    async fn begin_freeze(&self, batch_id: BatchId) -> Result<Vec<Digest>>;

    /// Completes a freeze: stores the root and per-ticket proofs, `Freezing`
    /// -> `Ready`.
    async fn complete_freeze(
        &self,
        batch_id: BatchId,
        root: Digest,
        proofs: Vec<MerkleProof>,
        now: DateTime<Utc>,
    ) -> Result<()>;

    /// Looks up a batch by identifier.
    async fn find_batch(&self, id: BatchId) -> Result<Option<MerkleBatch>>;

    /// Looks up the persisted inclusion proof for a ticket.
    async fn find_proof(&self, ticket_id: TicketId) -> Result<Option<MerkleProof>>;

    /// All batches currently `Open`.
    async fn open_batches(&self) -> Result<Vec<MerkleBatch>>;

    /// All batches awaiting anchor submission (`Ready`).
    async fn ready_batches(&self) -> Result<Vec<MerkleBatch>>;

    /// All batches whose freeze or anchoring failed.
    ///
    /// Operator-visible; a failed batch must always eventually retry.
    async fn failed_batches(&self) -> Result<Vec<MerkleBatch>>;

    /// Transitions `Ready` or `Failed` -> `Anchoring`.
    async fn mark_batch_anchoring(&self, id: BatchId) -> Result<()>;

    /// Transitions `Anchoring` -> `Anchored`.
    async fn mark_batch_anchored(&self, id: BatchId) -> Result<()>;

    /// Transitions `Freezing` or `Anchoring` -> `Failed`.
    async fn mark_batch_failed(&self, id: BatchId) -> Result<()>;
}

/// Blockchain anchor attempt operations.
#[async_trait]
pub trait AnchorStore: Send + Sync + 'static {
    /// Persists a new anchor attempt.
    ///
    /// Fails with [`StorageError::AnchorConflict`] if the batch already has
    /// an active (non-failed) anchor.
    async fn insert_anchor(&self, anchor: BlockchainAnchor) -> Result<()>;

    /// Returns the batch's active anchor attempt, if any.
    async fn active_anchor(&self, batch_id: BatchId) -> Result<Option<BlockchainAnchor>>;

    /// All anchors currently awaiting confirmations.
    async fn submitted_anchors(&self) -> Result<Vec<BlockchainAnchor>>;

    /// Updates the observed confirmation count for a batch's active anchor.
    async fn record_confirmations(&self, batch_id: BatchId, confirmations: u64) -> Result<()>;

    /// Marks the batch's active anchor `Confirmed`.
    async fn mark_anchor_confirmed(&self, batch_id: BatchId) -> Result<()>;

    /// Marks the batch's active anchor `Failed`.
    async fn mark_anchor_failed(&self, batch_id: BatchId) -> Result<()>;

    /// Number of failed anchor attempts recorded for a batch.
    async fn failed_attempts(&self, batch_id: BatchId) -> Result<u32>;
}

/// Append-only verification audit log.
#[async_trait]
pub trait VerificationLogStore: Send + Sync + 'static {
    /// Appends an audit entry. Entries are never mutated or deleted.
    async fn append_verification(&self, record: VerificationRecord) -> Result<()>;

    /// All audit entries for a ticket, oldest first.
    async fn verifications_for(&self, ticket_id: TicketId) -> Result<Vec<VerificationRecord>>;
}

#[derive(Debug, Default)]
struct BatchTable {
    batches: HashMap<BatchId, MerkleBatch>,
    open: Option<BatchId>,
    proofs: HashMap<TicketId, MerkleProof>,
}

/// In-memory reference store implementing every storage trait.
///
/// Batch state lives behind a single mutex so append-and-check-capacity is
/// one critical section; ticket consumption is a compare-and-swap under the
/// ticket table lock. Concurrency semantics match what a SQL backend would
/// provide with row-level locks.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tickets: RwLock<HashMap<TicketId, Ticket>>,
    idempotency: RwLock<HashMap<String, TicketId>>,
    batches: Mutex<BatchTable>,
    anchors: RwLock<HashMap<BatchId, Vec<BlockchainAnchor>>>,
    verifications: RwLock<Vec<VerificationRecord>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TicketStore for MemoryStore {
    async fn insert_ticket(&self, ticket: Ticket) -> Result<()> {
        if let Some(key) = &ticket.idempotency_key {
            self.idempotency.write().await.insert(key.clone(), ticket.id);
        }
        self.tickets.write().await.insert(ticket.id, ticket);
        Ok(())
    }

    async fn find_ticket(&self, id: TicketId) -> Result<Option<Ticket>> {
        Ok(self.tickets.read().await.get(&id).cloned())
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Ticket>> {
        let id = match self.idempotency.read().await.get(key) {
            Some(id) => *id,
            None => return Ok(None),
        };
        Ok(self.tickets.read().await.get(&id).cloned())
    }

    async fn activate_ticket(&self, id: TicketId) -> Result<()> {
        let mut tickets = self.tickets.write().await;
        let ticket = tickets
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("ticket {id}")))?;

        if ticket.status != TicketStatus::Pending {
            return Err(StorageError::InvalidTicketTransition {
                ticket_id: id,
                detail: format!("cannot activate from {}", ticket.status),
            });
        }

        ticket.status = TicketStatus::Valid;
        Ok(())
    }

    async fn consume_if_valid(&self, id: TicketId, now: DateTime<Utc>) -> Result<bool> {
        let mut tickets = self.tickets.write().await;
        let ticket = tickets
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("ticket {id}")))?;

        if ticket.status != TicketStatus::Valid {
            return Ok(false);
        }

        ticket.status = TicketStatus::Used;
        ticket.consumed_at = Some(now);
        Ok(true)
    }

    async fn revoke_ticket(&self, id: TicketId) -> Result<()> {
        let mut tickets = self.tickets.write().await;
        let ticket = tickets
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("ticket {id}")))?;

        match ticket.status {
            TicketStatus::Pending | TicketStatus::Valid => {
                ticket.status = TicketStatus::Revoked;
                Ok(())
            },
            status => Err(StorageError::InvalidTicketTransition {
                ticket_id: id,
                detail: format!("cannot revoke from {status}"),
            }),
        }
    }

    async fn set_ticket_batch(&self, id: TicketId, batch_id: BatchId) -> Result<()> {
        let mut tickets = self.tickets.write().await;
        let ticket = tickets
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("ticket {id}")))?;
        ticket.batch_id = Some(batch_id);
        Ok(())
    }

    async fn set_merkle_index(&self, id: TicketId, index: u32) -> Result<()> {
        let mut tickets = self.tickets.write().await;
        let ticket = tickets
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("ticket {id}")))?;
        ticket.merkle_index = Some(index);
        Ok(())
    }

    async fn expire_due(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut tickets = self.tickets.write().await;
        let mut expired = 0u64;
        for ticket in tickets.values_mut() {
            if ticket.status == TicketStatus::Valid && now > ticket.valid_until {
                ticket.status = TicketStatus::Expired;
                expired += 1;
            }
        }
        Ok(expired)
    }
}

#[async_trait]
impl BatchStore for MemoryStore {
    async fn open_batch(&self, max_size: u32, now: DateTime<Utc>) -> Result<MerkleBatch> {
        let mut table = self.batches.lock().await;

        // Reuse an existing open batch instead of stacking several; normally
        // at most one batch is open at a time.
        if let Some(open_id) = table.open {
            if let Some(batch) = table.batches.get(&open_id) {
                if batch.status == BatchStatus::Open {
                    return Ok(batch.clone());
                }
            }
        }

        let batch = MerkleBatch {
            id: BatchId::new(),
            leaves: Vec::new(),
            ticket_ids: Vec::new(),
            merkle_root: None,
            status: BatchStatus::Open,
            max_size,
            opened_at: now,
            frozen_at: None,
        };
        table.open = Some(batch.id);
        table.batches.insert(batch.id, batch.clone());
        Ok(batch)
    }

    async fn current_open_batch(&self) -> Result<Option<MerkleBatch>> {
        let table = self.batches.lock().await;
        Ok(table
            .open
            .and_then(|id| table.batches.get(&id))
            .filter(|b| b.status == BatchStatus::Open)
            .cloned())
    }

    async fn try_assign(
        &self,
        batch_id: BatchId,
        ticket_id: TicketId,
        leaf: Digest,
    ) -> Result<Assignment> {
        let mut table = self.batches.lock().await;
        let batch = table
            .batches
            .get_mut(&batch_id)
            .ok_or_else(|| StorageError::NotFound(format!("batch {batch_id}")))?;

        if batch.status != BatchStatus::Open {
            return Err(StorageError::BatchNotOpen { batch_id, status: batch.status });
        }
        if batch.leaves.len() >= batch.max_size as usize {
            // Full but not yet frozen; treat as closed for assignment.
            return Err(StorageError::BatchNotOpen { batch_id, status: batch.status });
        }

        let leaf_index = batch.leaves.len() as u32;
        batch.leaves.push(leaf);
        batch.ticket_ids.push(ticket_id);
        let reached_capacity = batch.leaves.len() >= batch.max_size as usize;

        Ok(Assignment { batch_id, leaf_index, reached_capacity })
    }

    async fn begin_freeze(&self, batch_id: BatchId) -> Result<Vec<Digest>> {
        let mut table = self.batches.lock().await;
        let batch = table
            .batches
            .get_mut(&batch_id)
            .ok_or_else(|| StorageError::NotFound(format!("batch {batch_id}")))?;

        if batch.status != BatchStatus::Open {
            return Err(StorageError::InvalidBatchTransition {
                batch_id,
                detail: format!("begin_freeze from {}", batch.status),
            });
        }

        batch.status = BatchStatus::Freezing;
        if table.open == Some(batch_id) {
            table.open = None;
        }

        let batch = &table.batches[&batch_id];
        Ok(batch.leaves.clone())
    }

    async fn complete_freeze(
        &self,
        batch_id: BatchId,
        root: Digest,
        proofs: Vec<MerkleProof>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut table = self.batches.lock().await;
        let batch = table
            .batches
            .get_mut(&batch_id)
            .ok_or_else(|| StorageError::NotFound(format!("batch {batch_id}")))?;

        if batch.status != BatchStatus::Freezing {
            return Err(StorageError::InvalidBatchTransition {
                batch_id,
                detail: format!("complete_freeze from {}", batch.status),
            });
        }

        batch.merkle_root = Some(root);
        batch.frozen_at = Some(now);
        batch.status = BatchStatus::Ready;

        for proof in proofs {
            table.proofs.insert(proof.ticket_id, proof);
        }
        Ok(())
    }

    async fn find_batch(&self, id: BatchId) -> Result<Option<MerkleBatch>> {
        Ok(self.batches.lock().await.batches.get(&id).cloned())
    }

    async fn find_proof(&self, ticket_id: TicketId) -> Result<Option<MerkleProof>> {
        Ok(self.batches.lock().await.proofs.get(&ticket_id).cloned())
    }

    async fn open_batches(&self) -> Result<Vec<MerkleBatch>> {
        Ok(self.collect_by_status(BatchStatus::Open).await)
    }

    async fn ready_batches(&self) -> Result<Vec<MerkleBatch>> {
        Ok(self.collect_by_status(BatchStatus::Ready).await)
    }

    async fn failed_batches(&self) -> Result<Vec<MerkleBatch>> {
        Ok(self.collect_by_status(BatchStatus::Failed).await)
    }

    async fn mark_batch_anchoring(&self, id: BatchId) -> Result<()> {
        self.transition_batch(id, &[BatchStatus::Ready, BatchStatus::Failed], BatchStatus::Anchoring)
            .await
    }

    async fn mark_batch_anchored(&self, id: BatchId) -> Result<()> {
        self.transition_batch(id, &[BatchStatus::Anchoring], BatchStatus::Anchored).await
    }

    async fn mark_batch_failed(&self, id: BatchId) -> Result<()> {
        self.transition_batch(id, &[BatchStatus::Freezing, BatchStatus::Anchoring], BatchStatus::Failed)
            .await
    }
}

impl MemoryStore {
    async fn collect_by_status(&self, status: BatchStatus) -> Vec<MerkleBatch> {
        let table = self.batches.lock().await;
        let mut found: Vec<MerkleBatch> =
            table.batches.values().filter(|b| b.status == status).cloned().collect();
        found.sort_by_key(|b| b.opened_at);
        found
    }

    async fn transition_batch(
        &self,
        id: BatchId,
        from: &[BatchStatus],
        to: BatchStatus,
    ) -> Result<()> {
        let mut table = self.batches.lock().await;
        let batch = table
            .batches
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("batch {id}")))?;

        if !from.contains(&batch.status) {
            return Err(StorageError::InvalidBatchTransition {
                batch_id: id,
                detail: format!("{} -> {to}", batch.status),
            });
        }
        batch.status = to;
        Ok(())
    }
}

#[async_trait]
impl AnchorStore for MemoryStore {
    async fn insert_anchor(&self, anchor: BlockchainAnchor) -> Result<()> {
        let mut anchors = self.anchors.write().await;
        let attempts = anchors.entry(anchor.batch_id).or_default();

        if attempts.last().is_some_and(|a| a.status.is_active()) {
            return Err(StorageError::AnchorConflict { batch_id: anchor.batch_id });
        }
        attempts.push(anchor);
        Ok(())
    }

    async fn active_anchor(&self, batch_id: BatchId) -> Result<Option<BlockchainAnchor>> {
        let anchors = self.anchors.read().await;
        Ok(anchors
            .get(&batch_id)
            .and_then(|attempts| attempts.last())
            .filter(|a| a.status.is_active())
            .cloned())
    }

    async fn submitted_anchors(&self) -> Result<Vec<BlockchainAnchor>> {
        let anchors = self.anchors.read().await;
        let mut found: Vec<BlockchainAnchor> = anchors
            .values()
            .filter_map(|attempts| attempts.last())
            .filter(|a| a.status == AnchorStatus::Submitted)
            .cloned()
            .collect();
        found.sort_by_key(|a| a.submitted_at);
        Ok(found)
    }

    async fn record_confirmations(&self, batch_id: BatchId, confirmations: u64) -> Result<()> {
        self.with_active_anchor(batch_id, |a| a.confirmations = confirmations).await
    }

    async fn mark_anchor_confirmed(&self, batch_id: BatchId) -> Result<()> {
        self.with_active_anchor(batch_id, |a| a.status = AnchorStatus::Confirmed).await
    }

    async fn mark_anchor_failed(&self, batch_id: BatchId) -> Result<()> {
        self.with_active_anchor(batch_id, |a| a.status = AnchorStatus::Failed).await
    }

    async fn failed_attempts(&self, batch_id: BatchId) -> Result<u32> {
        let anchors = self.anchors.read().await;
        let count = anchors
            .get(&batch_id)
            .map(|attempts| {
                attempts.iter().filter(|a| a.status == AnchorStatus::Failed).count()
            })
            .unwrap_or(0);
        Ok(count as u32)
    }
}

impl MemoryStore {
    async fn with_active_anchor(
        &self,
        batch_id: BatchId,
        update: impl FnOnce(&mut BlockchainAnchor),
    ) -> Result<()> {
        let mut anchors = self.anchors.write().await;
        let anchor = anchors
            .get_mut(&batch_id)
            .and_then(|attempts| attempts.last_mut())
            .filter(|a| a.status.is_active())
            .ok_or_else(|| StorageError::NotFound(format!("active anchor for batch {batch_id}")))?;
        update(anchor);
        Ok(())
    }
}

#[async_trait]
impl VerificationLogStore for MemoryStore {
    async fn append_verification(&self, record: VerificationRecord) -> Result<()> {
        self.verifications.write().await.push(record);
        Ok(())
    }

    async fn verifications_for(&self, ticket_id: TicketId) -> Result<Vec<VerificationRecord>> {
        Ok(self
            .verifications
            .read()
            .await
            .iter()
            .filter(|r| r.ticket_id == ticket_id)
            .cloned()
            .collect())
    }
}
