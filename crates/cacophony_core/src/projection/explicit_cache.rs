/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Content fetched on explicit request (not from a followee), bounded by an
//! LRU over logical entries. Evicting one entry releases several CIDs.
//!
//! Lookups refresh recency. The LRU order lives behind its own mutex so that
//! readers holding only the shared storage lock can still touch it.
//!
//! The recency list is a plain `Vec` scanned linearly on every touch and
//! removal. Explicit entries number in the low hundreds, where the scan costs
//! less than the fetch that created the entry.

use super::CachedRecordInfo;
use crate::opcode::{Opcode, OpcodeError, OpcodeWriter};
use cacophony_protocol::{Cid, PublicKey};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    User(PublicKey),
    Record(Cid),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub public_key: PublicKey,
    pub last_fetch_attempt_millis: i64,
    pub last_fetch_success_millis: i64,
    pub index: Cid,
    pub recommendations: Cid,
    pub records: Cid,
    pub description: Cid,
    pub picture: Option<Cid>,
    pub combined_size_bytes: u64,
}

impl UserInfo {
    pub fn owned_cids(&self) -> impl Iterator<Item = &Cid> {
        [&self.index, &self.recommendations, &self.records, &self.description]
            .into_iter()
            .chain(self.picture.iter())
    }
}

/// Roots and sizes of a freshly fetched user, without the fetch timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfoRoots {
    pub index: Cid,
    pub recommendations: Cid,
    pub records: Cid,
    pub description: Cid,
    pub picture: Option<Cid>,
    pub combined_size_bytes: u64,
}

#[derive(Debug, Default)]
pub struct ExplicitCacheData {
    /// Least recently used first. Linear scans are accepted at this size.
    lru: Mutex<Vec<CacheKey>>,
    users: HashMap<PublicKey, UserInfo>,
    records: HashMap<Cid, CachedRecordInfo>,
    total_size_bytes: u64,
}

impl ExplicitCacheData {
    pub fn new() -> Self {
        Self::default()
    }

    fn touch(&self, key: CacheKey) {
        let mut lru = self.lru.lock().unwrap();
        if let Some(pos) = lru.iter().position(|k| k == &key) {
            lru.remove(pos);
        }
        lru.push(key);
    }

    fn forget(&mut self, key: &CacheKey) {
        let lru = self.lru.get_mut().unwrap();
        if let Some(pos) = lru.iter().position(|k| k == key) {
            lru.remove(pos);
        }
    }

    pub fn user_info(&self, public_key: &PublicKey) -> Option<&UserInfo> {
        let info = self.users.get(public_key)?;
        self.touch(CacheKey::User(public_key.clone()));
        Some(info)
    }

    pub fn record_info(&self, record: &Cid) -> Option<&CachedRecordInfo> {
        let info = self.records.get(record)?;
        self.touch(CacheKey::Record(record.clone()));
        Some(info)
    }

    pub fn total_size_bytes(&self) -> u64 {
        self.total_size_bytes
    }

    pub fn len(&self) -> usize {
        self.users.len() + self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current recency order, least recently used first.
    pub fn lru_order(&self) -> Vec<CacheKey> {
        self.lru.lock().unwrap().clone()
    }

    pub fn add_user_info(&mut self, info: UserInfo) {
        assert!(
            !self.users.contains_key(&info.public_key),
            "user {} already in the explicit cache",
            info.public_key
        );
        self.total_size_bytes += info.combined_size_bytes;
        self.lru.get_mut().unwrap().push(CacheKey::User(info.public_key.clone()));
        self.users.insert(info.public_key.clone(), info);
    }

    /// Replaces the roots of a cached user after a successful fetch. Returns
    /// the previous info so the caller can release its pins.
    pub fn success_refresh_user_info(
        &mut self,
        public_key: &PublicKey,
        now_millis: i64,
        roots: UserInfoRoots,
    ) -> UserInfo {
        let Some(existing) = self.users.get_mut(public_key) else {
            panic!("user {public_key} is not in the explicit cache");
        };
        let fresh = UserInfo {
            public_key: public_key.clone(),
            last_fetch_attempt_millis: now_millis,
            last_fetch_success_millis: now_millis,
            index: roots.index,
            recommendations: roots.recommendations,
            records: roots.records,
            description: roots.description,
            picture: roots.picture,
            combined_size_bytes: roots.combined_size_bytes,
        };
        let old = std::mem::replace(existing, fresh);
        self.total_size_bytes = self.total_size_bytes - old.combined_size_bytes + roots.combined_size_bytes;
        self.touch(CacheKey::User(public_key.clone()));
        old
    }

    /// Only the attempt time moves; the cached roots stay.
    pub fn failed_refresh_user_info(&mut self, public_key: &PublicKey, now_millis: i64) {
        let Some(existing) = self.users.get_mut(public_key) else {
            panic!("user {public_key} is not in the explicit cache");
        };
        existing.last_fetch_attempt_millis = now_millis;
        self.touch(CacheKey::User(public_key.clone()));
    }

    /// A record already present is replaced and returned; older logs can hold
    /// duplicates and the last one wins.
    pub fn add_stream_record(&mut self, info: CachedRecordInfo) -> Option<CachedRecordInfo> {
        let key = CacheKey::Record(info.record.clone());
        let stale = self.records.remove(&info.record);
        if let Some(stale) = &stale {
            self.total_size_bytes -= stale.combined_size_bytes;
            self.forget(&key);
        }
        self.total_size_bytes += info.combined_size_bytes;
        self.lru.get_mut().unwrap().push(key);
        self.records.insert(info.record.clone(), info);
        stale
    }

    pub fn replace_stream_record(&mut self, info: CachedRecordInfo) -> CachedRecordInfo {
        let Some(existing) = self.records.get_mut(&info.record) else {
            panic!("record {} is not in the explicit cache", info.record);
        };
        let new_size = info.combined_size_bytes;
        let key = CacheKey::Record(info.record.clone());
        let old = std::mem::replace(existing, info);
        self.total_size_bytes = self.total_size_bytes - old.combined_size_bytes + new_size;
        self.touch(key);
        old
    }

    /// Evicts least recently used entries until the total size fits in
    /// `byte_budget`, calling `evict` once per CID each evicted entry owned.
    /// Returns the evicted keys, oldest first.
    pub fn purge(&mut self, mut evict: impl FnMut(&Cid), byte_budget: u64) -> Vec<CacheKey> {
        let mut evicted = Vec::new();
        while self.total_size_bytes > byte_budget {
            let lru = self.lru.get_mut().unwrap();
            if lru.is_empty() {
                break;
            }
            let key = lru.remove(0);
            let size = match &key {
                CacheKey::User(public_key) => {
                    let info = self
                        .users
                        .remove(public_key)
                        .unwrap_or_else(|| panic!("LRU names unknown user {public_key}"));
                    info.owned_cids().for_each(&mut evict);
                    info.combined_size_bytes
                }
                CacheKey::Record(record) => {
                    let info = self
                        .records
                        .remove(record)
                        .unwrap_or_else(|| panic!("LRU names unknown record {record}"));
                    info.owned_cids().for_each(&mut evict);
                    info.combined_size_bytes
                }
            };
            self.total_size_bytes -= size;
            evicted.push(key);
        }
        evicted
    }

    pub fn walk_all_pins(&self, mut pin: impl FnMut(&Cid)) {
        for info in self.users.values() {
            info.owned_cids().for_each(&mut pin);
        }
        for info in self.records.values() {
            info.owned_cids().for_each(&mut pin);
        }
    }

    /// Writes entries in LRU order so recency survives a reload.
    pub fn write_opcodes<W: Write>(&self, writer: &mut OpcodeWriter<W>) -> Result<(), OpcodeError> {
        for key in self.lru_order() {
            let opcode = match key {
                CacheKey::User(public_key) => {
                    let info = &self.users[&public_key];
                    Opcode::ExplicitUserInfo {
                        public_key,
                        last_fetch_attempt_millis: info.last_fetch_attempt_millis,
                        last_fetch_success_millis: info.last_fetch_success_millis,
                        index: info.index.clone(),
                        recommendations: info.recommendations.clone(),
                        records: info.records.clone(),
                        description: info.description.clone(),
                        picture: info.picture.clone(),
                        combined_size_bytes: info.combined_size_bytes,
                    }
                }
                CacheKey::Record(record) => {
                    let info = &self.records[&record];
                    Opcode::ExplicitStreamRecord {
                        record,
                        has_data_to_cache: info.has_data_to_cache,
                        thumbnail: info.thumbnail.clone(),
                        video: info.video.clone(),
                        audio: info.audio.clone(),
                        combined_size_bytes: info.combined_size_bytes,
                    }
                }
            };
            writer.write_opcode(&opcode)?;
        }
        Ok(())
    }
}
