//! HTTP request handlers.
//!
//! Grouped by functionality: ticket issuance and lookup, verification,
//! and health probes. Handlers validate input, call into the service
//! layer, and map outcomes through [`crate::ApiError`].

pub mod health;
pub mod tickets;
pub mod verify;
