//! Ticket issuance, Merkle batch management, and periodic maintenance.
//!
//! [`TicketIssuer`] seals claims into signed tickets; [`BatchManager`]
//! groups their hashes into freezable Merkle batches; the schedulers close
//! aged batches and expire overdue tickets on a cadence.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod batch;
pub mod error;
pub mod issuer;
pub mod scheduler;

pub use batch::{BatchConfig, BatchManager};
pub use error::{IssuanceError, Result};
pub use issuer::{IssueRequest, IssuerConfig, TicketIssuer};
pub use scheduler::{BatchCloseScheduler, ExpirySweeper};
