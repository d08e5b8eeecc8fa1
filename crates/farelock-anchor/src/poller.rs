//! Confirmation poller.
//!
//! Tracks every submitted anchor through the chain's confirmation depth.
//! An anchor is confirmed at the required depth (default 12); the batch
//! becomes `Anchored` at the same moment. A transaction the node has
//! forgotten, or one that sits under-confirmed past the timeout, is
//! declared lost: the anchor and batch are marked failed and the submitter
//! re-broadcasts the same root with a fresh fee on its next sweep.

use std::{sync::Arc, time::Duration};

use farelock_core::{
    storage::{AnchorStore, BatchStore},
    BlockchainAnchor, Clock,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{client::ChainClient, error::Result};

/// Tunables for confirmation polling.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// How often to poll submitted anchors.
    pub interval: Duration,
    /// Depth at which an anchor counts as confirmed.
    pub required_confirmations: u64,
    /// A submission older than this without enough confirmations is lost.
    pub confirmation_timeout: chrono::Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            required_confirmations: 12,
            confirmation_timeout: chrono::Duration::hours(2),
        }
    }
}

/// Periodically advances submitted anchors toward confirmation.
pub struct ConfirmationPoller {
    batches: Arc<dyn BatchStore>,
    anchors: Arc<dyn AnchorStore>,
    chain: Arc<dyn ChainClient>,
    clock: Arc<dyn Clock>,
    config: PollerConfig,
}

impl ConfirmationPoller {
    /// Creates a poller over the given stores and chain client.
    pub fn new(
        batches: Arc<dyn BatchStore>,
        anchors: Arc<dyn AnchorStore>,
        chain: Arc<dyn ChainClient>,
        clock: Arc<dyn Clock>,
        config: PollerConfig,
    ) -> Self {
        Self { batches, anchors, chain, clock, config }
    }

    /// Runs until cancelled, ticking on the configured interval.
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            required = self.config.required_confirmations,
            "confirmation poller starting"
        );
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                () = self.clock.sleep(self.config.interval) => {},
            }
            if let Err(e) = self.tick().await {
                error!(error = %e, "confirmation polling tick failed");
            }
        }
        info!("confirmation poller stopped");
    }

    /// Polls every submitted anchor once. Returns anchors confirmed.
    pub async fn tick(&self) -> Result<usize> {
        let mut confirmed = 0;
        for anchor in self.anchors.submitted_anchors().await? {
            match self.poll_one(&anchor).await {
                Ok(true) => confirmed += 1,
                Ok(false) => {},
                Err(e) => {
                    // Transient RPC trouble; the anchor stays submitted and
                    // the next tick tries again.
                    warn!(tx_hash = anchor.tx_hash, error = %e, "confirmation poll failed");
                },
            }
        }
        Ok(confirmed)
    }

    async fn poll_one(&self, anchor: &BlockchainAnchor) -> Result<bool> {
        let age = self.clock.now() - anchor.submitted_at;

        match self.chain.confirmations(&anchor.tx_hash).await? {
            Some(depth) if depth >= self.config.required_confirmations => {
                self.anchors.record_confirmations(anchor.batch_id, depth).await?;
                self.anchors.mark_anchor_confirmed(anchor.batch_id).await?;
                self.batches.mark_batch_anchored(anchor.batch_id).await?;
                info!(
                    batch_id = %anchor.batch_id,
                    tx_hash = anchor.tx_hash,
                    depth,
                    "anchor confirmed, batch anchored"
                );
                Ok(true)
            },
            Some(depth) => {
                self.anchors.record_confirmations(anchor.batch_id, depth).await?;
                if age > self.config.confirmation_timeout {
                    self.declare_lost(anchor, "under-confirmed past timeout").await?;
                } else {
                    debug!(tx_hash = anchor.tx_hash, depth, "anchor still confirming");
                }
                Ok(false)
            },
            None => {
                // The node no longer knows the transaction. Give it the
                // timeout window to reappear before declaring it lost.
                if age > self.config.confirmation_timeout {
                    self.declare_lost(anchor, "transaction unknown to node").await?;
                } else {
                    debug!(tx_hash = anchor.tx_hash, "transaction not yet visible");
                }
                Ok(false)
            },
        }
    }

    async fn declare_lost(&self, anchor: &BlockchainAnchor, reason: &str) -> Result<()> {
        warn!(
            batch_id = %anchor.batch_id,
            tx_hash = anchor.tx_hash,
            reason,
            "anchor lost, marking failed for resubmission"
        );
        self.anchors.mark_anchor_failed(anchor.batch_id).await?;
        self.batches.mark_batch_failed(anchor.batch_id).await?;
        Ok(())
    }
}

impl std::fmt::Debug for ConfirmationPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfirmationPoller").field("config", &self.config).finish_non_exhaustive()
    }
}
