/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use super::StorageModel;
use crate::error::StorageError;
use crate::projection::{
    ChannelData, ExplicitCacheData, FavouritesCacheData, FolloweeData, PinCacheData, PrefsData,
    Projections,
};
use cacophony_protocol::Cid;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error, warn};

/// A persisted projection. The pin cache is derived and never listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProjectionKind {
    Channels,
    Prefs,
    Followees,
    ExplicitCache,
    Favourites,
}

pub type TouchedProjections = BTreeSet<ProjectionKind>;

/// Shared access. Any number may be open at once, but never beside a writer.
pub struct ReadSession<'a> {
    guard: RwLockReadGuard<'a, Projections>,
}

impl<'a> ReadSession<'a> {
    pub(super) fn new(guard: RwLockReadGuard<'a, Projections>) -> Self {
        Self { guard }
    }

    pub fn channels(&self) -> &ChannelData {
        &self.guard.channels
    }

    pub fn prefs(&self) -> &PrefsData {
        &self.guard.prefs
    }

    pub fn followees(&self) -> &FolloweeData {
        &self.guard.followees
    }

    /// Lookups here still refresh LRU recency.
    pub fn explicit_cache(&self) -> &ExplicitCacheData {
        &self.guard.explicit_cache
    }

    pub fn favourites(&self) -> &FavouritesCacheData {
        &self.guard.favourites
    }

    pub fn pin_cache(&self) -> &PinCacheData {
        &self.guard.pin_cache
    }

    pub fn close(self) {}
}

/// Exclusive access. Closing re-serializes everything if any persisted
/// projection was borrowed mutably.
pub struct WriteSession<'a> {
    model: &'a StorageModel,
    guard: Option<RwLockWriteGuard<'a, Projections>>,
    touched: TouchedProjections,
}

impl<'a> WriteSession<'a> {
    pub(super) fn new(model: &'a StorageModel, guard: RwLockWriteGuard<'a, Projections>) -> Self {
        Self {
            model,
            guard: Some(guard),
            touched: TouchedProjections::new(),
        }
    }

    fn state(&self) -> &Projections {
        match &self.guard {
            Some(g) => &**g,
            None => unreachable!("write session used after close"),
        }
    }

    fn state_mut(&mut self) -> &mut Projections {
        match &mut self.guard {
            Some(g) => &mut **g,
            None => unreachable!("write session used after close"),
        }
    }

    fn touch(&mut self, kind: ProjectionKind) -> &mut Projections {
        self.touched.insert(kind);
        self.state_mut()
    }

    pub fn channels(&self) -> &ChannelData {
        &self.state().channels
    }

    pub fn prefs(&self) -> &PrefsData {
        &self.state().prefs
    }

    pub fn followees(&self) -> &FolloweeData {
        &self.state().followees
    }

    pub fn explicit_cache(&self) -> &ExplicitCacheData {
        &self.state().explicit_cache
    }

    pub fn favourites(&self) -> &FavouritesCacheData {
        &self.state().favourites
    }

    pub fn pin_cache(&self) -> &PinCacheData {
        &self.state().pin_cache
    }

    pub fn channels_mut(&mut self) -> &mut ChannelData {
        &mut self.touch(ProjectionKind::Channels).channels
    }

    pub fn prefs_mut(&mut self) -> &mut PrefsData {
        &mut self.touch(ProjectionKind::Prefs).prefs
    }

    pub fn followees_mut(&mut self) -> &mut FolloweeData {
        &mut self.touch(ProjectionKind::Followees).followees
    }

    pub fn explicit_cache_mut(&mut self) -> &mut ExplicitCacheData {
        &mut self.touch(ProjectionKind::ExplicitCache).explicit_cache
    }

    pub fn favourites_mut(&mut self) -> &mut FavouritesCacheData {
        &mut self.touch(ProjectionKind::Favourites).favourites
    }

    pub fn touched(&self) -> &TouchedProjections {
        &self.touched
    }

    /// Takes a reference on content the caller already pinned on the node.
    pub fn add_pin_ref(&mut self, cid: &Cid) {
        self.state_mut().pin_cache.add_ref(cid);
    }

    /// Drops a reference and unpins on the node when it was the last one.
    /// Returns true when an unpin was issued.
    pub fn release_pin_ref(&mut self, cid: &Cid) -> bool {
        if !self.state_mut().pin_cache.del_ref(cid) {
            return false;
        }
        self.unpin_on_node(cid);
        true
    }

    fn unpin_on_node(&self, cid: &Cid) {
        if let Err(e) = self.model.network().unpin(cid).get() {
            warn!(%cid, error = %e, "unpin failed; content stays on the node");
        }
    }

    /// Evicts explicit-cache entries over `byte_budget` and releases their pins.
    /// A cache already within budget is left untouched, so closing does not
    /// rewrite the log.
    pub fn purge_explicit_cache(&mut self, byte_budget: u64) -> usize {
        if self.explicit_cache().total_size_bytes() <= byte_budget {
            return 0;
        }
        let mut released = Vec::new();
        let evicted = self
            .explicit_cache_mut()
            .purge(|cid| released.push(cid.clone()), byte_budget);
        for cid in &released {
            self.release_pin_ref(cid);
        }
        debug!(entries = evicted.len(), cids = released.len(), "explicit cache purged");
        evicted.len()
    }

    /// Folds a transaction's net pin changes into the reference counts.
    ///
    /// `owned_pins` are CIDs the transaction pinned on the node itself; any of
    /// them left without a reference is unpinned. Returns the unpinned CIDs.
    pub fn commit_transaction_pin_changes(
        &mut self,
        deltas: &HashMap<Cid, i64>,
        owned_pins: &HashSet<Cid>,
    ) -> Vec<Cid> {
        let pins = &mut self.state_mut().pin_cache;
        for (cid, delta) in deltas.iter().filter(|(_, d)| **d > 0) {
            for _ in 0..*delta {
                pins.add_ref(cid);
            }
        }
        let mut to_unpin = Vec::new();
        for (cid, delta) in deltas.iter().filter(|(_, d)| **d < 0) {
            for _ in 0..delta.unsigned_abs() {
                if pins.del_ref(cid) {
                    to_unpin.push(cid.clone());
                }
            }
        }
        for cid in owned_pins {
            if !pins.is_pinned(cid) && !to_unpin.contains(cid) {
                to_unpin.push(cid.clone());
            }
        }
        to_unpin.sort();
        for cid in &to_unpin {
            self.unpin_on_node(cid);
        }
        debug!(
            deltas = deltas.len(),
            owned = owned_pins.len(),
            unpinned = to_unpin.len(),
            "transaction pin changes applied"
        );
        to_unpin
    }

    fn finish(&mut self) -> Result<TouchedProjections, StorageError> {
        let Some(guard) = self.guard.take() else {
            return Ok(TouchedProjections::new());
        };
        let touched = std::mem::take(&mut self.touched);
        let flushed = !touched.is_empty();
        let result = if flushed {
            self.model.persist(&guard).map(|bytes| {
                debug!(?touched, bytes, "opcode log rewritten");
            })
        } else {
            Ok(())
        };
        drop(guard);
        if let Some(stats) = self.model.stats() {
            stats.write_session_closed(flushed);
        }
        result.map(|()| touched)
    }

    /// Persists if needed and releases the lock. Returns what was touched.
    pub fn close(mut self) -> Result<TouchedProjections, StorageError> {
        self.finish()
    }
}

impl Drop for WriteSession<'_> {
    fn drop(&mut self) {
        if self.guard.is_some() {
            if let Err(e) = self.finish() {
                error!(error = %e, "write session dropped without close failed to persist");
            }
        }
    }
}
