/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Reference counts of everything this client keeps pinned on the node.
//!
//! Never persisted: rebuilt from the other projections on every load.

use cacophony_protocol::Cid;
use std::collections::{HashMap, HashSet};
use tracing::warn;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PinCacheData {
    counts: HashMap<Cid, u32>,
}

impl PinCacheData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_ref(&mut self, cid: &Cid) {
        *self.counts.entry(cid.clone()).or_insert(0) += 1;
    }

    /// Returns true when the last reference was dropped and the CID should be
    /// unpinned on the node.
    pub fn del_ref(&mut self, cid: &Cid) -> bool {
        let Some(count) = self.counts.get_mut(cid) else {
            panic!("del_ref on {cid}, which holds no pin reference");
        };
        *count -= 1;
        if *count == 0 {
            self.counts.remove(cid);
            true
        } else {
            false
        }
    }

    pub fn is_pinned(&self, cid: &Cid) -> bool {
        self.counts.contains_key(cid)
    }

    pub fn ref_count(&self, cid: &Cid) -> u32 {
        self.counts.get(cid).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn snapshot_pinned_set(&self) -> HashSet<Cid> {
        self.counts.keys().cloned().collect()
    }

    /// Compares against an independently derived cache. Returns the CIDs
    /// whose counts differ, sorted; each mismatch is logged.
    pub fn verify_match(&self, derived: &PinCacheData) -> Vec<Cid> {
        let mut mismatched: Vec<Cid> = self
            .counts
            .keys()
            .chain(derived.counts.keys())
            .filter(|cid| self.ref_count(cid) != derived.ref_count(cid))
            .cloned()
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        mismatched.sort();
        for cid in &mismatched {
            warn!(
                %cid,
                canonical = self.ref_count(cid),
                derived = derived.ref_count(cid),
                "pin cache mismatch"
            );
        }
        mismatched
    }
}
