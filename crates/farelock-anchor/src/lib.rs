//! Blockchain anchoring for frozen Merkle batches.
//!
//! [`AnchorSubmitter`] broadcasts batch roots through a [`ChainClient`];
//! [`ConfirmationPoller`] tracks the transactions to the required
//! confirmation depth and recovers lost ones by flagging the batch for
//! resubmission.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod error;
pub mod poller;
pub mod retry;
pub mod submitter;

pub use client::{mock::MockChain, ChainClient, HttpChainClient};
pub use error::{AnchorError, ChainError, Result};
pub use poller::{ConfirmationPoller, PollerConfig};
pub use retry::RetryPolicy;
pub use submitter::{AnchorSubmitter, SubmitterConfig};
