//! ECDSA secp256k1 signing and verification of ticket digests.
//!
//! The curve is chosen for interoperability with common blockchain tooling.
//! Signing uses RFC 6979 deterministic nonces (the default prehash signing
//! path of the `k256` crate), which rules out the catastrophic key leakage
//! that nonce reuse causes. Verification is a pure function usable entirely
//! offline given only the digest, signature, and public key.

use std::path::Path;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use farelock_core::{hash::sha256, models::KeyId, Digest};
use k256::{
    ecdsa::{
        signature::hazmat::{PrehashSigner, PrehashVerifier},
        Signature, SigningKey, VerifyingKey,
    },
    pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding},
    PublicKey, SecretKey,
};
use uuid::Uuid;

use crate::error::{CryptoError, Result};

/// Algorithm identifier advertised alongside the public key.
pub const ALGORITHM: &str = "ecdsa-secp256k1";

/// Issuer signing key held in memory for the lifetime of the process.
///
/// Key material is loaded once at startup from a secured path (or generated
/// ephemerally for development) and never logged or serialized except
/// through the explicit PEM export methods.
#[derive(Clone)]
pub struct IssuerKey {
    secret: SecretKey,
    signing: SigningKey,
    verifying: VerifyingKey,
    key_id: KeyId,
}

impl std::fmt::Debug for IssuerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never expose private key material through Debug output.
        f.debug_struct("IssuerKey").field("key_id", &self.key_id).finish_non_exhaustive()
    }
}

impl IssuerKey {
    /// Generates a fresh random keypair.
    ///
    /// Suitable for development and tests; production keys should be loaded
    /// from secured storage with [`IssuerKey::from_pem_file`].
    pub fn generate() -> Self {
        let secret = SecretKey::random(&mut rand::rngs::OsRng);
        Self::from_secret(secret)
    }

    /// Parses a PKCS#8 PEM private key.
    pub fn from_pkcs8_pem(pem: &str) -> Result<Self> {
        let secret = SecretKey::from_pkcs8_pem(pem)
            .map_err(|e| CryptoError::InvalidKey { message: e.to_string() })?;
        Ok(Self::from_secret(secret))
    }

    /// Loads a PKCS#8 PEM private key from disk.
    pub fn from_pem_file(path: &Path) -> Result<Self> {
        let pem = std::fs::read_to_string(path).map_err(|source| CryptoError::KeyFile {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_pkcs8_pem(&pem)
    }

    fn from_secret(secret: SecretKey) -> Self {
        let signing = SigningKey::from(&secret);
        let verifying = *signing.verifying_key();
        let key_id = key_id_for(&verifying);
        Self { secret, signing, verifying, key_id }
    }

    /// Signs a 32-byte digest, returning the DER-encoded signature.
    ///
    /// Deterministic per RFC 6979: the same key and digest always produce
    /// the same signature bytes.
    pub fn sign_digest(&self, digest: &Digest) -> Result<Vec<u8>> {
        let signature: Signature = self
            .signing
            .sign_prehash(digest.as_bytes())
            .map_err(|e| CryptoError::SigningFailed { message: e.to_string() })?;
        Ok(signature.to_der().as_bytes().to_vec())
    }

    /// Exports the private key as PKCS#8 PEM.
    pub fn to_pkcs8_pem(&self) -> Result<String> {
        self.secret
            .to_pkcs8_pem(LineEnding::LF)
            .map(|pem| pem.to_string())
            .map_err(|e| CryptoError::InvalidKey { message: e.to_string() })
    }

    /// Exports the public key as SPKI PEM for the public-key endpoint.
    pub fn public_key_pem(&self) -> Result<String> {
        self.secret
            .public_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| CryptoError::InvalidKey { message: e.to_string() })
    }

    /// Returns the verifying half of the keypair.
    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying
    }

    /// Returns the deterministic identifier of this key.
    pub fn key_id(&self) -> KeyId {
        self.key_id
    }
}

/// Verifies a DER-encoded ECDSA signature over a digest.
///
/// Pure function with no side effects; malformed signature bytes simply
/// fail verification rather than erroring.
pub fn verify_digest(key: &VerifyingKey, digest: &Digest, signature_der: &[u8]) -> bool {
    match Signature::from_der(signature_der) {
        Ok(signature) => key.verify_prehash(digest.as_bytes(), &signature).is_ok(),
        Err(_) => false,
    }
}

/// Parses an SPKI PEM public key into a verifying key.
pub fn verifying_key_from_pem(pem: &str) -> Result<VerifyingKey> {
    let public = PublicKey::from_public_key_pem(pem)
        .map_err(|e| CryptoError::InvalidKey { message: e.to_string() })?;
    Ok(VerifyingKey::from(public))
}

/// Derives the deterministic key identifier for a verifying key.
///
/// SHA-256 of the compressed SEC1 point, truncated to 16 bytes and read as
/// a UUID. Stable across processes, so tickets issued by one instance name
/// a key any other instance can resolve.
pub fn key_id_for(key: &VerifyingKey) -> KeyId {
    let point = key.to_encoded_point(true);
    let digest = sha256(point.as_bytes());
    let mut uuid_bytes = [0u8; 16];
    uuid_bytes.copy_from_slice(&digest.as_bytes()[..16]);
    KeyId(Uuid::from_bytes(uuid_bytes))
}

/// Encodes signature bytes as base64 for transport.
pub fn signature_to_base64(signature: &[u8]) -> String {
    BASE64.encode(signature)
}

/// Decodes a base64 transport signature back to raw bytes.
pub fn signature_from_base64(encoded: &str) -> Result<Vec<u8>> {
    BASE64.decode(encoded).map_err(|_| CryptoError::MalformedSignature)
}

/// Encodes signature bytes as lowercase hex.
pub fn signature_to_hex(signature: &[u8]) -> String {
    hex::encode(signature)
}

/// Decodes a hex transport signature back to raw bytes.
pub fn signature_from_hex(encoded: &str) -> Result<Vec<u8>> {
    hex::decode(encoded).map_err(|_| CryptoError::MalformedSignature)
}
