//! Periodic maintenance tasks: age-based batch close and ticket expiry.
//!
//! Each scheduler is an interval loop around an idempotent `tick`. Tests
//! drive `tick` directly with a controlled clock; production spawns `run`
//! under a cancellation token.

use std::{sync::Arc, time::Duration};

use farelock_core::{
    storage::{BatchStore, TicketStore},
    Clock,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{batch::BatchManager, error::Result};

/// Freezes open batches that have aged past a deadline.
///
/// Capacity closes most batches; this catches quiet periods where a batch
/// would otherwise sit open indefinitely, delaying anchoring for the
/// tickets already inside it.
pub struct BatchCloseScheduler {
    manager: Arc<BatchManager>,
    batches: Arc<dyn BatchStore>,
    clock: Arc<dyn Clock>,
    /// How often to scan for aged batches.
    pub interval: Duration,
    /// An open batch older than this is frozen regardless of fill level.
    pub max_age: chrono::Duration,
}

impl BatchCloseScheduler {
    /// Creates a scheduler with the given cadence and age limit.
    pub fn new(
        manager: Arc<BatchManager>,
        batches: Arc<dyn BatchStore>,
        clock: Arc<dyn Clock>,
        interval: Duration,
        max_age: chrono::Duration,
    ) -> Self {
        Self { manager, batches, clock, interval, max_age }
    }

    /// Runs until cancelled, ticking on the configured interval.
    pub async fn run(self, cancel: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "batch close scheduler starting");
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                () = self.clock.sleep(self.interval) => {},
            }
            if let Err(error) = self.tick().await {
                error!(error = %error, "batch close tick failed");
            }
        }
        info!("batch close scheduler stopped");
    }

    /// Freezes every non-empty open batch past the age limit.
    ///
    /// Returns how many batches were frozen.
    pub async fn tick(&self) -> Result<usize> {
        let now = self.clock.now();
        let mut frozen = 0;

        for batch in self.batches.open_batches().await? {
            if batch.is_empty() {
                continue;
            }
            if now - batch.opened_at >= self.max_age {
                info!(batch_id = %batch.id, size = batch.len(), "closing aged batch");
                self.manager.freeze(batch.id).await?;
                frozen += 1;
            }
        }
        Ok(frozen)
    }
}

/// Expires tickets whose validity window has ended.
pub struct ExpirySweeper {
    tickets: Arc<dyn TicketStore>,
    clock: Arc<dyn Clock>,
    /// How often to sweep.
    pub interval: Duration,
}

impl ExpirySweeper {
    /// Creates a sweeper with the given cadence.
    pub fn new(tickets: Arc<dyn TicketStore>, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self { tickets, clock, interval }
    }

    /// Runs until cancelled, ticking on the configured interval.
    pub async fn run(self, cancel: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "expiry sweeper starting");
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                () = self.clock.sleep(self.interval) => {},
            }
            if let Err(error) = self.tick().await {
                error!(error = %error, "expiry sweep failed");
            }
        }
        info!("expiry sweeper stopped");
    }

    /// Moves due tickets `Valid` -> `Expired`, returning the count.
    pub async fn tick(&self) -> Result<u64> {
        let expired = self.tickets.expire_due(self.clock.now()).await?;
        if expired > 0 {
            info!(expired, "tickets expired");
        }
        Ok(expired)
    }
}
