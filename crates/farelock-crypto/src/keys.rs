//! Registry of trusted issuer public keys.
//!
//! Verification looks keys up by the [`KeyId`] recorded on each ticket, so
//! tickets signed under retired keys keep verifying after a rotation as long
//! as the old public key stays registered.

use std::collections::HashMap;

use farelock_core::models::KeyId;
use k256::ecdsa::VerifyingKey;

use crate::{
    error::Result,
    signing::{key_id_for, verifying_key_from_pem},
};

/// In-memory map from key id to verifying key.
#[derive(Debug, Clone, Default)]
pub struct KeyRegistry {
    keys: HashMap<KeyId, VerifyingKey>,
}

impl KeyRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a verifying key under its derived id, returning the id.
    pub fn insert(&mut self, key: VerifyingKey) -> KeyId {
        let id = key_id_for(&key);
        self.keys.insert(id, key);
        id
    }

    /// Parses a SPKI PEM public key and registers it.
    pub fn insert_pem(&mut self, pem: &str) -> Result<KeyId> {
        let key = verifying_key_from_pem(pem)?;
        Ok(self.insert(key))
    }

    /// Looks up a verifying key by id.
    pub fn get(&self, id: &KeyId) -> Option<&VerifyingKey> {
        self.keys.get(id)
    }

    /// Whether a key with this id is registered.
    pub fn contains(&self, id: &KeyId) -> bool {
        self.keys.contains_key(id)
    }

    /// Number of registered keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the registry holds no keys.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
