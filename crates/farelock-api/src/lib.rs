//! HTTP surface for the ticket service.
//!
//! Wires the issuer, verifier, and stores into an axum router with the
//! usual middleware stack, plus figment-backed configuration.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;

use farelock_core::{
    storage::{AnchorStore, BatchStore, TicketStore},
    Clock,
};
use farelock_crypto::IssuerKey;
use farelock_issuer::TicketIssuer;
use farelock_verify::Verifier;

pub mod config;
pub mod error;
pub mod handlers;
pub mod server;

pub use config::Config;
pub use error::ApiError;
pub use server::{create_router, start_server};

/// Shared state behind every handler.
#[derive(Clone)]
pub struct AppState {
    /// Ticket issuance service.
    pub issuer: Arc<TicketIssuer>,
    /// Verification service.
    pub verifier: Arc<Verifier>,
    /// Ticket records.
    pub tickets: Arc<dyn TicketStore>,
    /// Batch records and proofs.
    pub batches: Arc<dyn BatchStore>,
    /// Anchor attempts.
    pub anchors: Arc<dyn AnchorStore>,
    /// Issuer signing key, for the public-key endpoint.
    pub key: Arc<IssuerKey>,
    /// Service clock.
    pub clock: Arc<dyn Clock>,
}
