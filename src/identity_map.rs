//! Identity map: one materialized model per record identity.
//!
//! Entries are keyed by the canonical `"{type}:{id}"` string and iterate in
//! insertion order. A store owns exactly one map; forks get a fresh one.

use crate::source::Source;
use crate::types::RecordIdentity;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};

/// Registry mapping record identities to model instances.
pub struct IdentityMap<M> {
    entries: HashMap<String, (u64, M)>,
    order: BTreeMap<u64, String>,
    next_slot: u64,
}

impl<M: Clone> IdentityMap<M> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            order: BTreeMap::new(),
            next_slot: 0,
        }
    }

    pub fn get(&self, identity: &RecordIdentity) -> Option<M> {
        self.entries
            .get(&identity.serialize())
            .map(|(_, model)| model.clone())
    }

    /// Insert or replace. A replaced entry keeps its position.
    pub fn set(&mut self, identity: &RecordIdentity, model: M) {
        let key = identity.serialize();
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.1 = model;
            return;
        }

        let slot = self.next_slot;
        self.next_slot += 1;
        self.order.insert(slot, key.clone());
        self.entries.insert(key, (slot, model));
    }

    /// Remove an entry. Returns whether it was present.
    pub fn delete(&mut self, identity: &RecordIdentity) -> bool {
        match self.entries.remove(&identity.serialize()) {
            Some((slot, _)) => {
                self.order.remove(&slot);
                true
            }
            None => false,
        }
    }

    pub fn has(&self, identity: &RecordIdentity) -> bool {
        self.entries.contains_key(&identity.serialize())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    /// Identities in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = RecordIdentity> + '_ {
        self.order
            .values()
            .filter_map(|key| RecordIdentity::deserialize(key))
    }

    /// Models in insertion order.
    pub fn values(&self) -> impl Iterator<Item = &M> + '_ {
        self.order
            .values()
            .filter_map(|key| self.entries.get(key).map(|(_, model)| model))
    }

    /// `(identity, model)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (RecordIdentity, &M)> + '_ {
        self.order.values().filter_map(|key| {
            let (_, model) = self.entries.get(key)?;
            Some((RecordIdentity::deserialize(key)?, model))
        })
    }
}

impl<M: Clone> Default for IdentityMap<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> std::fmt::Debug for IdentityMap<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityMap")
            .field("len", &self.entries.len())
            .finish()
    }
}

/// Shared handle to one identity map.
pub type SharedIdentityMap<M> = Arc<Mutex<IdentityMap<M>>>;

/// Hands out one identity map per source.
///
/// Sources are held weakly: once a source is dropped its map is released on
/// the next lookup.
pub struct IdentityMapFactory<M> {
    maps: Mutex<Vec<(Weak<dyn Source>, SharedIdentityMap<M>)>>,
}

impl<M: Clone> IdentityMapFactory<M> {
    pub fn new() -> Self {
        Self {
            maps: Mutex::new(Vec::new()),
        }
    }

    /// The map for `source`, created on first request.
    pub fn get(&self, source: &Arc<dyn Source>) -> SharedIdentityMap<M> {
        let mut maps = self.maps.lock();
        maps.retain(|(owner, _)| owner.strong_count() > 0);

        let wanted = Arc::as_ptr(source) as *const ();
        if let Some((_, map)) = maps
            .iter()
            .find(|(owner, _)| owner.as_ptr() as *const () == wanted)
        {
            return Arc::clone(map);
        }

        let map = Arc::new(Mutex::new(IdentityMap::new()));
        maps.push((Arc::downgrade(source), Arc::clone(&map)));
        map
    }

    /// Number of live sources with a map.
    pub fn len(&self) -> usize {
        let mut maps = self.maps.lock();
        maps.retain(|(owner, _)| owner.strong_count() > 0);
        maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<M: Clone> Default for IdentityMapFactory<M> {
    fn default() -> Self {
        Self::new()
    }
}
