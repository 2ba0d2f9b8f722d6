//! Set of registered mirrors keyed by name.
//!
//! The registry itself is a plain owned map; the scheduler keeps it behind
//! its single state lock together with the admission queue and run budget,
//! so every registry mutation is serialized with queue/budget changes.

use std::collections::btree_map::{self, BTreeMap};

use crate::error::{RepoError, RepoErrorKind};
use crate::mirror::{Mirror, MirrorSnapshot, MirrorSpec, MirrorStatus};

#[derive(Debug, Default)]
pub struct Registry {
    mirrors: BTreeMap<String, Mirror>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a validated mirror. New mirrors start active and Idle.
    pub fn add(&mut self, spec: MirrorSpec) -> Result<MirrorSnapshot, RepoError> {
        match self.mirrors.entry(spec.name.clone()) {
            btree_map::Entry::Occupied(_) => {
                Err(RepoError::new(spec.name, RepoErrorKind::Duplicate))
            }
            btree_map::Entry::Vacant(slot) => Ok(slot.insert(Mirror::new(spec)).snapshot()),
        }
    }

    pub fn get(&self, name: &str) -> Result<&Mirror, RepoError> {
        self.mirrors.get(name).ok_or_else(|| RepoError::not_found(name))
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Result<&mut Mirror, RepoError> {
        self.mirrors
            .get_mut(name)
            .ok_or_else(|| RepoError::not_found(name))
    }

    /// Remove a mirror that is neither Queued nor Running. Any pending
    /// re-enqueue is cancelled.
    pub fn remove(&mut self, name: &str) -> Result<Mirror, RepoError> {
        let mirror = self.get(name)?;
        if matches!(mirror.status, MirrorStatus::Queued | MirrorStatus::Running) {
            return Err(RepoError::new(name, RepoErrorKind::InUse(mirror.status)));
        }
        let mut mirror = self
            .mirrors
            .remove(name)
            .ok_or_else(|| RepoError::not_found(name))?;
        mirror.cancel_wakeup();
        Ok(mirror)
    }

    /// Mirrors in name order. Borrowing, so it can be restarted at will.
    pub fn iter(&self) -> impl Iterator<Item = &Mirror> + '_ {
        self.mirrors.values()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Mirror> + '_ {
        self.mirrors.values_mut()
    }

    pub fn len(&self) -> usize {
        self.mirrors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mirrors.is_empty()
    }
}
