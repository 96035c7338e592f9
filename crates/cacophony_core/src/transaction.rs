/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Pin bookkeeping for long network operations that must not hold the
//! storage lock.
//!
//! A transaction starts from a snapshot of the pinned set and accumulates
//! per-CID deltas; the storage lock is only taken again to fold them in.
//! Nothing stops a write session from releasing content the transaction is
//! relying on in the meantime. That window is accepted: the node does not
//! reclaim unpinned data eagerly.

use crate::error::StorageError;
use crate::scheduler::{NetFuture, NetworkError, NetworkScheduler};
use crate::storage::StorageModel;
use cacophony_protocol::Cid;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// The owner of the canonical pin cache.
pub trait StateResolver {
    /// Applies `deltas` to the reference counts, then unpins whatever in
    /// `owned_pins` is left unreferenced. Returns the CIDs unpinned.
    fn commit_transaction_pin_changes(
        &self,
        deltas: &HashMap<Cid, i64>,
        owned_pins: &HashSet<Cid>,
    ) -> Result<Vec<Cid>, StorageError>;
}

pub struct ConcurrentTransaction {
    network: Arc<dyn NetworkScheduler>,
    existing_pins: HashSet<Cid>,
    deltas: HashMap<Cid, i64>,
    /// Pinned on the node by this transaction; rollback undoes exactly these.
    owned_pins: HashSet<Cid>,
}

impl ConcurrentTransaction {
    pub fn new(network: Arc<dyn NetworkScheduler>, existing_pins: HashSet<Cid>) -> Self {
        Self {
            network,
            existing_pins,
            deltas: HashMap::new(),
            owned_pins: HashSet::new(),
        }
    }

    /// Snapshots the pinned set of `model` under a brief write lock.
    pub fn open(model: &StorageModel) -> Self {
        Self::new(model.network().clone(), model.snapshot_pinned_set())
    }

    fn delta(&self, cid: &Cid) -> i64 {
        self.deltas.get(cid).copied().unwrap_or(0)
    }

    /// Already pinned on the node, either before the transaction opened or
    /// by this transaction, even if its delta has since dropped back.
    fn is_available(&self, cid: &Cid) -> bool {
        self.existing_pins.contains(cid) || self.owned_pins.contains(cid) || self.delta(cid) > 0
    }

    pub fn size_in_bytes(&self, cid: &Cid) -> NetFuture<u64> {
        self.network.size_in_bytes(cid)
    }

    /// Reads content this transaction can see as pinned.
    pub fn load_cached<T>(
        &self,
        cid: &Cid,
        read: impl FnOnce(&dyn NetworkScheduler, &Cid) -> NetFuture<T>,
    ) -> NetFuture<T> {
        assert!(self.is_available(cid), "{cid} is not pinned in this transaction");
        read(self.network.as_ref(), cid)
    }

    /// Takes a reference on `cid`, pinning it on the node first unless it is
    /// already pinned or already referenced by this transaction. A failed
    /// network pin leaves the transaction unchanged.
    pub fn pin(&mut self, cid: &Cid) -> Result<(), NetworkError> {
        if !self.is_available(cid) {
            self.network.pin(cid).get()?;
            self.owned_pins.insert(cid.clone());
        }
        *self.deltas.entry(cid.clone()).or_insert(0) += 1;
        Ok(())
    }

    /// Drops a reference. The node is only touched when the transaction commits.
    pub fn unpin(&mut self, cid: &Cid) {
        *self.deltas.entry(cid.clone()).or_insert(0) -= 1;
    }

    /// Net reference change on `cid` so far.
    pub fn pin_delta(&self, cid: &Cid) -> i64 {
        self.delta(cid)
    }

    pub fn owned_pins(&self) -> &HashSet<Cid> {
        &self.owned_pins
    }

    pub fn commit(self, resolver: &dyn StateResolver) -> Result<Vec<Cid>, StorageError> {
        let deltas: HashMap<Cid, i64> = self.deltas.into_iter().filter(|(_, d)| *d != 0).collect();
        debug!(deltas = deltas.len(), owned = self.owned_pins.len(), "committing transaction");
        resolver.commit_transaction_pin_changes(&deltas, &self.owned_pins)
    }

    /// Leaves every reference count as it was and unpins what this
    /// transaction pinned on the node.
    pub fn rollback(self, resolver: &dyn StateResolver) -> Result<Vec<Cid>, StorageError> {
        debug!(owned = self.owned_pins.len(), "rolling back transaction");
        resolver.commit_transaction_pin_changes(&HashMap::new(), &self.owned_pins)
    }
}
