/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Followed channels and the subset of their posts cached locally.
//!
//! A followee must be created before any element or skip operation names it;
//! breaking that order is an internal bug and panics.

use crate::opcode::{Opcode, OpcodeError, OpcodeWriter};
use cacophony_protocol::{Cid, PublicKey};
use std::collections::BTreeMap;
use std::io::Write;

/// One cached post of a followee. At least one of `image` and `leaf` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowingCacheElement {
    pub element: Cid,
    pub image: Option<Cid>,
    pub leaf: Option<Cid>,
    pub combined_size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolloweeState {
    pub last_fetched_root: Cid,
    /// Where an interrupted backward walk over older records resumes.
    pub next_backward_record: Option<Cid>,
    pub last_poll_millis: i64,
    pub last_success_millis: i64,
    elements: Vec<FollowingCacheElement>,
    /// Record CID -> permanent.
    skipped: BTreeMap<Cid, bool>,
}

impl FolloweeState {
    pub fn elements(&self) -> &[FollowingCacheElement] {
        &self.elements
    }
}

#[derive(Debug, Default, Clone)]
pub struct FolloweeData {
    followees: BTreeMap<PublicKey, FolloweeState>,
}

impl FolloweeData {
    pub fn new() -> Self {
        Self::default()
    }

    fn state_mut(&mut self, followee: &PublicKey) -> &mut FolloweeState {
        match self.followees.get_mut(followee) {
            Some(state) => state,
            None => panic!("followee {followee} is not registered"),
        }
    }

    pub fn all_known_followees(&self) -> Vec<PublicKey> {
        self.followees.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.followees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.followees.is_empty()
    }

    pub fn followee(&self, followee: &PublicKey) -> Option<&FolloweeState> {
        self.followees.get(followee)
    }

    pub fn last_fetched_root(&self, followee: &PublicKey) -> Option<&Cid> {
        self.followees.get(followee).map(|s| &s.last_fetched_root)
    }

    pub fn next_backward_record(&self, followee: &PublicKey) -> Option<&Cid> {
        self.followees
            .get(followee)
            .and_then(|s| s.next_backward_record.as_ref())
    }

    pub fn last_poll_millis(&self, followee: &PublicKey) -> Option<i64> {
        self.followees.get(followee).map(|s| s.last_poll_millis)
    }

    pub fn last_success_millis(&self, followee: &PublicKey) -> Option<i64> {
        self.followees.get(followee).map(|s| s.last_success_millis)
    }

    pub fn elements_for_followee(&self, followee: &PublicKey) -> Option<&[FollowingCacheElement]> {
        self.followees.get(followee).map(|s| s.elements.as_slice())
    }

    pub fn element_for_followee(&self, followee: &PublicKey, element: &Cid) -> Option<&FollowingCacheElement> {
        self.followees
            .get(followee)?
            .elements
            .iter()
            .find(|e| &e.element == element)
    }

    /// Records the followee refresh should not try again. Temporary skips are
    /// only included on request.
    pub fn skipped_records(&self, followee: &PublicKey, include_temporary: bool) -> Vec<Cid> {
        self.followees
            .get(followee)
            .map(|s| {
                s.skipped
                    .iter()
                    .filter(|(_, permanent)| include_temporary || **permanent)
                    .map(|(cid, _)| cid.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Oldest poll first; ties broken by key so the order is stable.
    pub fn followees_in_poll_order(&self) -> Vec<&PublicKey> {
        let mut keys: Vec<(&PublicKey, i64)> = self
            .followees
            .iter()
            .map(|(k, s)| (k, s.last_poll_millis))
            .collect();
        keys.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));
        keys.into_iter().map(|(k, _)| k).collect()
    }

    pub fn next_followee_to_poll(&self) -> Option<&PublicKey> {
        self.followees_in_poll_order().into_iter().next()
    }

    pub fn create_new_followee(
        &mut self,
        followee: PublicKey,
        root: Cid,
        next_backward_record: Option<Cid>,
        last_poll_millis: i64,
        last_success_millis: i64,
    ) {
        assert!(
            !self.followees.contains_key(&followee),
            "followee {followee} already registered"
        );
        self.followees.insert(
            followee,
            FolloweeState {
                last_fetched_root: root,
                next_backward_record,
                last_poll_millis,
                last_success_millis,
                elements: Vec::new(),
                skipped: BTreeMap::new(),
            },
        );
    }

    pub fn update_existing_followee(
        &mut self,
        followee: &PublicKey,
        root: Cid,
        next_backward_record: Option<Cid>,
        last_poll_millis: i64,
        last_success_millis: i64,
    ) {
        let state = self.state_mut(followee);
        state.last_fetched_root = root;
        state.next_backward_record = next_backward_record;
        state.last_poll_millis = last_poll_millis;
        state.last_success_millis = last_success_millis;
    }

    /// Removes a followee whose elements have all been removed already.
    /// Returns its last fetched root so the caller can release that pin.
    pub fn remove_followee(&mut self, followee: &PublicKey) -> Cid {
        let state = match self.followees.remove(followee) {
            Some(state) => state,
            None => panic!("followee {followee} is not registered"),
        };
        assert!(
            state.elements.is_empty(),
            "followee {followee} removed with {} cached elements",
            state.elements.len()
        );
        state.last_fetched_root
    }

    pub fn add_element(&mut self, followee: &PublicKey, element: FollowingCacheElement) {
        assert!(
            element.image.is_some() || element.leaf.is_some(),
            "cached element {} has neither image nor leaf",
            element.element
        );
        let state = self.state_mut(followee);
        assert!(
            !state.elements.iter().any(|e| e.element == element.element),
            "element {} cached twice for {followee}",
            element.element
        );
        state.elements.push(element);
    }

    /// Removing an element that was never cached is allowed and returns `None`.
    pub fn remove_element(&mut self, followee: &PublicKey, element: &Cid) -> Option<FollowingCacheElement> {
        let state = self.state_mut(followee);
        let pos = state.elements.iter().position(|e| &e.element == element)?;
        Some(state.elements.remove(pos))
    }

    pub fn add_skipped_record(&mut self, followee: &PublicKey, record: Cid, permanent: bool) {
        self.state_mut(followee).skipped.insert(record, permanent);
    }

    pub fn remove_temporarily_skipped_record(&mut self, followee: &PublicKey, record: &Cid) {
        let removed = self.state_mut(followee).skipped.remove(record);
        assert_eq!(
            removed,
            Some(false),
            "{record} was not temporarily skipped for {followee}"
        );
    }

    pub fn write_opcodes<W: Write>(&self, writer: &mut OpcodeWriter<W>) -> Result<(), OpcodeError> {
        for (followee, state) in &self.followees {
            writer.write_opcode(&Opcode::SetFolloweeState {
                followee: followee.clone(),
                root: state.last_fetched_root.clone(),
                next_backward_record: state.next_backward_record.clone(),
                last_poll_millis: state.last_poll_millis,
                last_success_millis: state.last_success_millis,
            })?;
            for e in &state.elements {
                writer.write_opcode(&Opcode::AddFolloweeElement {
                    followee: followee.clone(),
                    element: e.element.clone(),
                    image: e.image.clone(),
                    leaf: e.leaf.clone(),
                    combined_size_bytes: e.combined_size_bytes,
                })?;
            }
            for (record, permanent) in &state.skipped {
                writer.write_opcode(&Opcode::SkipFolloweeRecord {
                    followee: followee.clone(),
                    record: record.clone(),
                    permanent: *permanent,
                })?;
            }
        }
        Ok(())
    }
}
