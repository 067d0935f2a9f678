//! # Registry
//!
//! The Authority's record of who is registered and which pseudonym belongs
//! to whom. Three maps, one lock:
//!
//! - `real_id → public key`
//! - `real_id → pseudonym` (forward, current binding only)
//! - `pseudonym → real_id` (reverse, every pseudonym ever minted)
//!
//! All three live behind a single `parking_lot::RwLock`, so a bind updates
//! forward and reverse inside one critical section. No reader ever sees a
//! pseudonym that resolves without a forward binding having been written
//! with it.
//!
//! Rebinding a real id drops its old pseudonym from the forward map only.
//! The old pseudonym stays in the reverse map so submissions made under it
//! can still be de-anonymised.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::crypto::PublicKey;
use crate::error::ProtocolError;
use crate::types::{Pseudonym, RealId};

#[derive(Debug, Default)]
struct RegistryMaps {
    public_keys: HashMap<RealId, PublicKey>,
    forward: HashMap<RealId, Pseudonym>,
    reverse: HashMap<Pseudonym, RealId>,
}

/// Outcome of [`Registry::check_enrollment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enrollment {
    /// The real id is unseen and may be registered on commit.
    New,
    /// The real id is already registered with this exact key.
    Existing,
}

/// Registered principals and their pseudonym bindings.
#[derive(Debug, Default)]
pub struct Registry {
    maps: RwLock<RegistryMaps>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the public key stored for `real_id`.
    pub fn register(&self, real_id: RealId, public_key: PublicKey) {
        self.maps.write().public_keys.insert(real_id, public_key);
    }

    /// Read-only admission check for a pseudonym request.
    ///
    /// Unseen `real_id`: `New` when `allow_new`, otherwise `NotFound`.
    /// Seen `real_id`: the stored key must equal `public_key`, otherwise
    /// `KeyMismatch`. Callers hold the per-principal lock across this check
    /// and the matching [`commit_issuance`](Self::commit_issuance).
    pub fn check_enrollment(
        &self,
        real_id: &RealId,
        public_key: &PublicKey,
        allow_new: bool,
    ) -> Result<Enrollment, ProtocolError> {
        match self.maps.read().public_keys.get(real_id) {
            Some(stored) if stored == public_key => Ok(Enrollment::Existing),
            Some(_) => Err(ProtocolError::KeyMismatch),
            None if allow_new => Ok(Enrollment::New),
            None => Err(ProtocolError::NotFound(format!("principal {real_id}"))),
        }
    }

    /// Register `real_id` (if unseen) and bind `pseudonym` both ways, all
    /// under one write lock. Returns the previously current pseudonym.
    pub fn commit_issuance(
        &self,
        real_id: &RealId,
        public_key: &PublicKey,
        pseudonym: Pseudonym,
    ) -> Option<Pseudonym> {
        let mut maps = self.maps.write();
        maps.public_keys
            .entry(real_id.clone())
            .or_insert_with(|| public_key.clone());
        maps.reverse.insert(pseudonym.clone(), real_id.clone());
        maps.forward.insert(real_id.clone(), pseudonym)
    }

    pub fn lookup_public_key(&self, real_id: &RealId) -> Result<PublicKey, ProtocolError> {
        self.maps
            .read()
            .public_keys
            .get(real_id)
            .cloned()
            .ok_or_else(|| ProtocolError::NotFound(format!("principal {real_id}")))
    }

    pub fn is_registered(&self, real_id: &RealId) -> bool {
        self.maps.read().public_keys.contains_key(real_id)
    }

    /// Bind `pseudonym` to `real_id` in both directions at once.
    ///
    /// Returns the pseudonym that was previously current for `real_id`, if
    /// any. It remains resolvable through the reverse map.
    pub fn bind_pseudonym(&self, real_id: &RealId, pseudonym: Pseudonym) -> Option<Pseudonym> {
        let mut maps = self.maps.write();
        maps.reverse.insert(pseudonym.clone(), real_id.clone());
        maps.forward.insert(real_id.clone(), pseudonym)
    }

    /// Reverse lookup. Only the Authority may call this; it is the one
    /// operation that breaks anonymity.
    pub fn resolve_pseudonym(&self, pseudonym: &Pseudonym) -> Result<RealId, ProtocolError> {
        self.maps
            .read()
            .reverse
            .get(pseudonym)
            .cloned()
            .ok_or(ProtocolError::UnknownPseudonym)
    }

    /// Resolve a pseudonym and fetch its owner's registered key in one read.
    pub fn resolve_with_key(
        &self,
        pseudonym: &Pseudonym,
    ) -> Result<(RealId, PublicKey), ProtocolError> {
        let maps = self.maps.read();
        let real_id = maps
            .reverse
            .get(pseudonym)
            .ok_or(ProtocolError::UnknownPseudonym)?;
        let key = maps
            .public_keys
            .get(real_id)
            .ok_or_else(|| ProtocolError::NotFound(format!("principal {real_id}")))?;
        Ok((real_id.clone(), key.clone()))
    }

    /// The pseudonym currently bound to `real_id`.
    pub fn current_pseudonym(&self, real_id: &RealId) -> Option<Pseudonym> {
        self.maps.read().forward.get(real_id).cloned()
    }

    /// Snapshot of all current forward bindings, sorted by real id.
    pub fn forward_bindings(&self) -> Vec<(RealId, Pseudonym)> {
        let maps = self.maps.read();
        let mut out: Vec<_> = maps
            .forward
            .iter()
            .map(|(r, p)| (r.clone(), p.clone()))
            .collect();
        out.sort();
        out
    }

    pub fn registered_count(&self) -> usize {
        self.maps.read().public_keys.len()
    }

    /// Number of pseudonyms ever minted, orphaned ones included.
    pub fn issued_count(&self) -> usize {
        self.maps.read().reverse.len()
    }
}
