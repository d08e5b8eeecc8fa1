//! Cryptographic primitives for tamper-evident tickets.
//!
//! Provides ECDSA secp256k1 signing over precomputed SHA-256 digests, a
//! registry of trusted verifying keys, and binary Merkle trees with
//! standalone inclusion-proof verification.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod keys;
pub mod merkle;
pub mod signing;

pub use error::{CryptoError, Result};
pub use keys::KeyRegistry;
pub use signing::{
    key_id_for, signature_from_base64, signature_from_hex, signature_to_base64, signature_to_hex,
    verify_digest, verifying_key_from_pem, IssuerKey, ALGORITHM,
};
