//! Batch lifecycle management: atomic assignment and freezing.
//!
//! Assignment appends a ticket's leaf hash to the open batch in one storage
//! call that also checks capacity. When a batch closes underneath a racing
//! issuer the append fails with a recoverable error and the ticket is routed
//! to a fresh batch instead of being lost. Freezing fixes the leaf order,
//! computes the Merkle root, and persists an inclusion proof per ticket.

use std::sync::Arc;

use farelock_core::{
    storage::{Assignment, BatchStore, TicketStore},
    BatchId, Clock, Digest, HashScheme, MerkleProof, StorageError, TicketId,
};
use farelock_crypto::merkle;
use tracing::{info, warn};

use crate::error::{IssuanceError, Result};

/// How many fresh batches an assignment will chase before giving up.
///
/// Each retry only happens when the targeted batch froze between lookup and
/// append, so more than a couple of iterations indicates a stuck store.
const ASSIGN_ATTEMPTS: u32 = 8;

/// Tunables for batch construction.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Capacity that triggers a freeze when reached.
    pub max_size: u32,
    /// Hash scheme used for interior tree nodes.
    pub scheme: HashScheme,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { max_size: 100, scheme: HashScheme::Single }
    }
}

/// Owns batch membership, leaf ordering, and the freeze transition.
pub struct BatchManager {
    tickets: Arc<dyn TicketStore>,
    batches: Arc<dyn BatchStore>,
    clock: Arc<dyn Clock>,
    config: BatchConfig,
}

impl BatchManager {
    /// Creates a manager over the given stores.
    pub fn new(
        tickets: Arc<dyn TicketStore>,
        batches: Arc<dyn BatchStore>,
        clock: Arc<dyn Clock>,
        config: BatchConfig,
    ) -> Self {
        Self { tickets, batches, clock, config }
    }

    /// Assigns a ticket's leaf hash to the open batch, opening one if needed.
    ///
    /// Records the batch id and leaf index on the ticket. When the
    /// assignment fills the batch to capacity the batch is frozen before
    /// returning, so the caller observes a `Ready` batch with proofs.
    pub async fn assign(&self, ticket_id: TicketId, leaf: Digest) -> Result<Assignment> {
        for attempt in 0..ASSIGN_ATTEMPTS {
            let batch = match self.batches.current_open_batch().await? {
                Some(batch) => batch,
                None => self.batches.open_batch(self.config.max_size, self.clock.now()).await?,
            };

            match self.batches.try_assign(batch.id, ticket_id, leaf).await {
                Ok(assignment) => {
                    self.tickets.set_ticket_batch(ticket_id, assignment.batch_id).await?;
                    self.tickets.set_merkle_index(ticket_id, assignment.leaf_index).await?;

                    if assignment.reached_capacity {
                        info!(
                            batch_id = %assignment.batch_id,
                            size = assignment.leaf_index + 1,
                            "batch reached capacity, freezing"
                        );
                        self.freeze(assignment.batch_id).await?;
                    }
                    return Ok(assignment);
                },
                Err(StorageError::BatchNotOpen { batch_id, status }) => {
                    // The batch closed between lookup and append. Re-route.
                    warn!(
                        %batch_id,
                        %status,
                        attempt,
                        %ticket_id,
                        "assignment raced a closing batch, retrying"
                    );
                },
                Err(other) => return Err(other.into()),
            }
        }

        Err(IssuanceError::AssignmentExhausted { attempts: ASSIGN_ATTEMPTS })
    }

    /// Freezes a batch: fixes leaf order, computes the root, stores proofs.
    ///
    /// The batch moves `Open` -> `Freezing` up front so concurrent assigners
    /// are rejected, then `Freezing` -> `Ready` once the root and every
    /// per-ticket proof are persisted together. A failure between the two
    /// transitions leaves the batch `Failed` for operator attention rather
    /// than half-frozen.
    pub async fn freeze(&self, batch_id: BatchId) -> Result<Digest> {
        let leaves = self.batches.begin_freeze(batch_id).await?;

        match self.build_proofs(batch_id, &leaves).await {
            Ok((root, proofs)) => {
                self.batches.complete_freeze(batch_id, root, proofs, self.clock.now()).await?;
                info!(%batch_id, root = %root, leaves = leaves.len(), "batch frozen");
                Ok(root)
            },
            Err(error) => {
                warn!(%batch_id, error = %error, "freeze failed, marking batch failed");
                self.batches.mark_batch_failed(batch_id).await?;
                Err(error)
            },
        }
    }

    async fn build_proofs(
        &self,
        batch_id: BatchId,
        leaves: &[Digest],
    ) -> Result<(Digest, Vec<MerkleProof>)> {
        let root = merkle::build(leaves, self.config.scheme)?;

        let batch = self
            .batches
            .find_batch(batch_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("batch {batch_id}")))?;

        let mut proofs = Vec::with_capacity(leaves.len());
        for (index, ticket_id) in batch.ticket_ids.iter().enumerate() {
            let path = merkle::prove(leaves, index, self.config.scheme)?;
            proofs.push(MerkleProof {
                ticket_id: *ticket_id,
                batch_id,
                leaf_index: index as u32,
                path,
            });
        }
        Ok((root, proofs))
    }
}

impl std::fmt::Debug for BatchManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchManager").field("config", &self.config).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use farelock_core::{sha256, BatchStatus, MemoryStore, TestClock};
    use farelock_crypto::merkle;

    use super::*;

    fn manager(store: &Arc<MemoryStore>, max_size: u32) -> BatchManager {
        BatchManager::new(
            store.clone(),
            store.clone(),
            Arc::new(TestClock::new()),
            BatchConfig { max_size, scheme: HashScheme::Single },
        )
    }

    async fn seed_ticket(store: &Arc<MemoryStore>) -> TicketId {
        use farelock_core::{KeyId, Ticket, TicketStatus};

        let ticket = Ticket {
            id: TicketId::new(),
            claims: serde_json::json!({"subject": "s"}),
            idempotency_key: None,
            issued_at: chrono::Utc::now(),
            valid_from: chrono::Utc::now(),
            valid_until: chrono::Utc::now() + chrono::Duration::hours(4),
            hash: sha256(b"t"),
            signature: Vec::new(),
            key_id: KeyId::new(),
            status: TicketStatus::Pending,
            batch_id: None,
            merkle_index: None,
            consumed_at: None,
        };
        let id = ticket.id;
        store.insert_ticket(ticket).await.unwrap();
        id
    }

    #[tokio::test]
    async fn filling_a_batch_leaves_it_ready_with_verifying_proofs() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager(&store, 3);

        let leaves: Vec<Digest> =
            (0..3u32).map(|i| sha256(format!("leaf-{i}").as_bytes())).collect();
        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(seed_ticket(&store).await);
        }

        let mut batch_id = None;
        for (id, leaf) in ids.iter().zip(&leaves) {
            let assignment = manager.assign(*id, *leaf).await.unwrap();
            batch_id = Some(assignment.batch_id);
        }
        let batch_id = batch_id.unwrap();

        let batch = store.find_batch(batch_id).await.unwrap().unwrap();
        assert_eq!(batch.status, BatchStatus::Ready);
        let root = batch.merkle_root.unwrap();
        assert_eq!(root, merkle::build(&leaves, HashScheme::Single).unwrap());

        for (id, leaf) in ids.iter().zip(&leaves) {
            let proof = store.find_proof(*id).await.unwrap().unwrap();
            assert!(merkle::verify(*leaf, &proof.path, root, HashScheme::Single));
        }

        // No open batch remains; the next assignment opens a fresh one.
        assert!(store.current_open_batch().await.unwrap().is_none());
        let next = manager.assign(seed_ticket(&store).await, sha256(b"next")).await.unwrap();
        assert_ne!(next.batch_id, batch_id);
    }

    #[tokio::test]
    async fn manual_freeze_of_partial_batch_produces_ready_batch() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager(&store, 100);

        let assignment = manager.assign(seed_ticket(&store).await, sha256(b"solo")).await.unwrap();
        let root = manager.freeze(assignment.batch_id).await.unwrap();

        // Single-leaf root equals the leaf.
        assert_eq!(root, sha256(b"solo"));
        let batch = store.find_batch(assignment.batch_id).await.unwrap().unwrap();
        assert_eq!(batch.status, BatchStatus::Ready);
    }

    #[tokio::test]
    async fn concurrent_assignments_fill_without_losing_tickets() {
        let store = Arc::new(MemoryStore::new());
        let manager = Arc::new(manager(&store, 10));

        let mut handles = Vec::new();
        for i in 0..25u32 {
            let manager = manager.clone();
            let id = seed_ticket(&store).await;
            handles.push(tokio::spawn(async move {
                manager.assign(id, sha256(&i.to_be_bytes())).await
            }));
        }

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        // 25 tickets across batches of 10: two frozen, one open with 5.
        let ready = store.ready_batches().await.unwrap();
        assert_eq!(ready.len(), 2);
        let open = store.current_open_batch().await.unwrap().unwrap();
        assert_eq!(open.len(), 5);
    }
}
