//! Ticket verification: signature, Merkle inclusion, on-chain anchoring,
//! and lifecycle status, with an append-only audit trail.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod verifier;

pub use error::{Result, VerifyError};
pub use verifier::{Strength, VerificationResult, Verifier, VerifyRequest};
