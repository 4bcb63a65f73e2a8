//! Known public keys of other devices

use crate::{Result, RoutingError};
use std::collections::HashMap;
use zrp_proto::{Identifier, PublicKey};

/// Maps device identifiers to their public keys
///
/// The first key recorded for an identifier wins; a different key for the
/// same identifier is rejected so a device cannot be impersonated by key
/// substitution.
#[derive(Debug, Default)]
pub struct CredentialsStore {
    keys: HashMap<Identifier, PublicKey>,
}

impl CredentialsStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the key of a device
    pub fn insert_key(&mut self, id: Identifier, key: PublicKey) -> Result<()> {
        match self.keys.get(&id) {
            Some(existing) if *existing == key => Ok(()),
            Some(_) => Err(RoutingError::MismatchingKeyExists(id)),
            None => {
                self.keys.insert(id, key);
                Ok(())
            }
        }
    }

    /// Get the key of a device
    pub fn get_key(&self, id: &Identifier) -> Result<PublicKey> {
        self.keys
            .get(id)
            .copied()
            .ok_or(RoutingError::KeyNotFound(*id))
    }

    /// Check whether a key is recorded
    pub fn contains(&self, id: &Identifier) -> bool {
        self.keys.contains_key(id)
    }

    /// Number of known devices
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Check if no keys are recorded
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
