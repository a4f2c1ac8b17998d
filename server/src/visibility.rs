//! Incremental local-interest reconciliation
//!
//! Each player keeps one [`LocalInterest`] for players and one for NPCs. A
//! reconciliation pass never rebuilds the set: it scans the set and the
//! registry read-only, collects removal candidates into a scratch queue, and
//! only applies them once both scans are done.

use shared::Location;
use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;

/// Changes produced by one reconciliation pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterestDelta<K> {
    pub added: Vec<K>,
    pub removed: Vec<K>,
}

impl<K> InterestDelta<K> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

impl<K> Default for InterestDelta<K> {
    fn default() -> Self {
        Self {
            added: Vec::new(),
            removed: Vec::new(),
        }
    }
}

/// The set of entities one observer currently knows about
#[derive(Debug, Clone)]
pub struct LocalInterest<K> {
    known: HashSet<K>,
    /// Scratch space, empty outside of `reconcile`
    removals: VecDeque<K>,
}

impl<K: Copy + Eq + Hash> LocalInterest<K> {
    pub fn new() -> Self {
        Self {
            known: HashSet::new(),
            removals: VecDeque::new(),
        }
    }

    /// Brings the known set in line with `registry` as seen from `origin`
    ///
    /// An entity is local when its distance to `origin` is strictly below
    /// `threshold`. `observer` is never admitted, even when it is present in
    /// the registry.
    pub fn reconcile(
        &mut self,
        origin: &Location,
        observer: Option<K>,
        registry: &HashMap<K, Location>,
        threshold: f32,
    ) -> InterestDelta<K> {
        debug_assert!(self.removals.is_empty());
        let mut delta = InterestDelta::default();

        // Entities that were unregistered since the last pass.
        for key in &self.known {
            if !registry.contains_key(key) || Some(*key) == observer {
                self.removals.push_back(*key);
            }
        }

        for (key, location) in registry {
            if Some(*key) == observer {
                continue;
            }

            let is_local = origin.distance(location) < threshold;
            let is_known = self.known.contains(key);

            if is_local && !is_known {
                self.known.insert(*key);
                delta.added.push(*key);
            } else if !is_local && is_known {
                self.removals.push_back(*key);
            }
        }

        while let Some(key) = self.removals.pop_front() {
            if self.known.remove(&key) {
                delta.removed.push(key);
            }
        }

        delta
    }

    pub fn contains(&self, key: &K) -> bool {
        self.known.contains(key)
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &K> + '_ {
        self.known.iter()
    }

    pub fn known(&self) -> &HashSet<K> {
        &self.known
    }

    pub fn pending_removals(&self) -> usize {
        self.removals.len()
    }

    pub fn clear(&mut self) {
        self.known.clear();
        self.removals.clear();
    }
}

impl<K: Copy + Eq + Hash> Default for LocalInterest<K> {
    fn default() -> Self {
        Self::new()
    }
}
