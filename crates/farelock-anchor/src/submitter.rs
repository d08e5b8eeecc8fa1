//! Anchor submission scheduler.
//!
//! Each tick sweeps batches waiting for an anchor (`Ready`, plus `Failed`
//! ones being retried), estimates the fee, and broadcasts the Merkle root.
//! Fee spikes defer a batch rather than failing it; the next tick sees it
//! again. Submission is at-least-once: only a batch with no active anchor
//! attempt is submitted, so a still-pending transaction is never
//! re-broadcast blindly.

use std::{sync::Arc, time::Duration};

use farelock_core::{
    storage::{AnchorStore, BatchStore},
    AnchorStatus, BlockchainAnchor, Clock, MerkleBatch,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    client::ChainClient,
    error::{AnchorError, ChainError, Result},
    retry::RetryPolicy,
};

/// Tunables for submission.
#[derive(Debug, Clone)]
pub struct SubmitterConfig {
    /// How often to sweep for batches awaiting an anchor.
    pub interval: Duration,
    /// Maximum fee the service will pay; dearer estimates defer the batch.
    pub fee_ceiling: u64,
    /// Backoff for transient RPC failures within one submission.
    pub retry: RetryPolicy,
}

impl Default for SubmitterConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            fee_ceiling: u64::MAX,
            retry: RetryPolicy::default(),
        }
    }
}

/// Periodically anchors frozen batches to the chain.
pub struct AnchorSubmitter {
    batches: Arc<dyn BatchStore>,
    anchors: Arc<dyn AnchorStore>,
    chain: Arc<dyn ChainClient>,
    clock: Arc<dyn Clock>,
    config: SubmitterConfig,
}

impl AnchorSubmitter {
    /// Creates a submitter over the given stores and chain client.
    pub fn new(
        batches: Arc<dyn BatchStore>,
        anchors: Arc<dyn AnchorStore>,
        chain: Arc<dyn ChainClient>,
        clock: Arc<dyn Clock>,
        config: SubmitterConfig,
    ) -> Self {
        Self { batches, anchors, chain, clock, config }
    }

    /// Runs until cancelled, ticking on the configured interval.
    pub async fn run(self, cancel: CancellationToken) {
        info!(interval_secs = self.config.interval.as_secs(), "anchor submitter starting");
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                () = self.clock.sleep(self.config.interval) => {},
            }
            if let Err(e) = self.tick().await {
                error!(error = %e, "anchor submission tick failed");
            }
        }
        info!("anchor submitter stopped");
    }

    /// Submits every batch awaiting an anchor. Returns submissions made.
    ///
    /// A failure on one batch is logged and does not block the others.
    pub async fn tick(&self) -> Result<usize> {
        let mut candidates = self.batches.ready_batches().await?;
        candidates.extend(self.batches.failed_batches().await?);

        let mut submitted = 0;
        for batch in candidates {
            match self.submit(&batch).await {
                Ok(true) => submitted += 1,
                Ok(false) => {},
                Err(e) => {
                    error!(batch_id = %batch.id, error = %e, "anchor submission failed");
                },
            }
        }
        Ok(submitted)
    }

    /// Submits one batch. Returns false when the batch was deferred.
    async fn submit(&self, batch: &MerkleBatch) -> Result<bool> {
        let root = batch.merkle_root.ok_or(AnchorError::MissingRoot { batch_id: batch.id })?;

        // A still-active earlier attempt means the poller owns this batch.
        if self.anchors.active_anchor(batch.id).await?.is_some() {
            return Ok(false);
        }

        let fee = self.with_backoff(|| self.chain.estimate_fee()).await?;
        if fee > self.config.fee_ceiling {
            info!(
                batch_id = %batch.id,
                fee,
                ceiling = self.config.fee_ceiling,
                "fee above ceiling, deferring batch"
            );
            return Ok(false);
        }

        let retry_count = self.anchors.failed_attempts(batch.id).await?;
        self.batches.mark_batch_anchoring(batch.id).await?;

        let tx_hash = match self.with_backoff(|| self.chain.submit_root(batch.id, root, fee)).await
        {
            Ok(tx_hash) => tx_hash,
            Err(e) => {
                warn!(batch_id = %batch.id, error = %e, "broadcast failed, marking batch failed");
                self.batches.mark_batch_failed(batch.id).await?;
                return Err(e);
            },
        };

        self.anchors
            .insert_anchor(BlockchainAnchor {
                batch_id: batch.id,
                tx_hash: tx_hash.clone(),
                submitted_at: self.clock.now(),
                confirmations: 0,
                status: AnchorStatus::Submitted,
                fee_paid: fee,
                retry_count,
            })
            .await?;

        info!(batch_id = %batch.id, tx_hash, fee, retry_count, "anchor submitted");
        Ok(true)
    }

    /// Runs a chain call under the configured backoff policy.
    async fn with_backoff<T, F, Fut>(&self, call: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, ChainError>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && self.config.retry.allows(attempt) => {
                    let delay = self.config.retry.delay_before(attempt + 1);
                    warn!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "chain call failed, backing off");
                    self.clock.sleep(delay).await;
                    attempt += 1;
                },
                Err(e) if e.is_retryable() => {
                    return Err(AnchorError::RetriesExhausted { attempts: attempt, source: e });
                },
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl std::fmt::Debug for AnchorSubmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnchorSubmitter").field("config", &self.config).finish_non_exhaustive()
    }
}
