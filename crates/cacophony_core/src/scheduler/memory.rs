/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use super::{NetFuture, NetworkError, NetworkScheduler};
use cacophony_protocol::{
    Cid, PublicKey, StreamDescription, StreamIndex, StreamRecommendations, StreamRecord,
    StreamRecords,
};
use serde::Serialize;
use sha2::{Digest as _, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

#[derive(Clone)]
enum StoredObject {
    Index(StreamIndex),
    Description(StreamDescription),
    Recommendations(StreamRecommendations),
    Records(StreamRecords),
    Record(StreamRecord),
    Raw(Vec<u8>),
}

impl StoredObject {
    fn size_bytes(&self) -> u64 {
        let encoded = match self {
            Self::Index(v) => serde_json::to_vec(v),
            Self::Description(v) => serde_json::to_vec(v),
            Self::Recommendations(v) => serde_json::to_vec(v),
            Self::Records(v) => serde_json::to_vec(v),
            Self::Record(v) => serde_json::to_vec(v),
            Self::Raw(v) => return v.len() as u64,
        };
        encoded.map(|v| v.len() as u64).unwrap_or_default()
    }
}

#[derive(Default)]
struct MemoryState {
    objects: HashMap<Cid, StoredObject>,
    pinned: HashSet<Cid>,
    names: HashMap<PublicKey, Cid>,
    pin_calls: Vec<Cid>,
    unpin_calls: Vec<Cid>,
    fail_connections: bool,
}

/// A content-addressed node held entirely in memory.
///
/// Requests complete synchronously, so every returned future is already
/// resolved. CIDs are derived from the SHA-256 of the stored content.
#[derive(Default)]
pub struct MemoryScheduler {
    state: Mutex<MemoryState>,
}

fn content_cid(tag: &str, bytes: &[u8]) -> Cid {
    let mut h = Sha256::new();
    h.update(tag.as_bytes());
    h.update(bytes);
    let hex = hex::encode(h.finalize());
    Cid::parse(&format!("Qm{}", &hex[..44])).expect("hex digest is a valid CID")
}

fn encode_for_cid<T: Serialize>(tag: &str, value: &T) -> Cid {
    let bytes = serde_json::to_vec(value).expect("protocol types always serialize");
    content_cid(tag, &bytes)
}

impl MemoryScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, cid: Cid, object: StoredObject) -> Cid {
        let mut g = self.state.lock().unwrap();
        g.objects.insert(cid.clone(), object);
        cid
    }

    pub fn upload_index(&self, index: &StreamIndex) -> Cid {
        self.insert(encode_for_cid("index", index), StoredObject::Index(index.clone()))
    }

    pub fn upload_description(&self, description: &StreamDescription) -> Cid {
        self.insert(
            encode_for_cid("description", description),
            StoredObject::Description(description.clone()),
        )
    }

    pub fn upload_recommendations(&self, recommendations: &StreamRecommendations) -> Cid {
        self.insert(
            encode_for_cid("recommendations", recommendations),
            StoredObject::Recommendations(recommendations.clone()),
        )
    }

    pub fn upload_records(&self, records: &StreamRecords) -> Cid {
        self.insert(encode_for_cid("records", records), StoredObject::Records(records.clone()))
    }

    pub fn upload_record(&self, record: &StreamRecord) -> Cid {
        self.insert(encode_for_cid("record", record), StoredObject::Record(record.clone()))
    }

    pub fn upload_raw(&self, bytes: &[u8]) -> Cid {
        self.insert(content_cid("raw", bytes), StoredObject::Raw(bytes.to_vec()))
    }

    /// Marks content as pinned without recording a pin call, as if a previous
    /// run of the process had pinned it.
    pub fn preload_pin(&self, cid: &Cid) {
        let mut g = self.state.lock().unwrap();
        g.pinned.insert(cid.clone());
    }

    pub fn is_pinned(&self, cid: &Cid) -> bool {
        self.state.lock().unwrap().pinned.contains(cid)
    }

    pub fn pinned_count(&self) -> usize {
        self.state.lock().unwrap().pinned.len()
    }

    pub fn pin_calls(&self) -> Vec<Cid> {
        self.state.lock().unwrap().pin_calls.clone()
    }

    pub fn unpin_calls(&self) -> Vec<Cid> {
        self.state.lock().unwrap().unpin_calls.clone()
    }

    /// While set, every request fails with a connection error.
    pub fn set_fail_connections(&self, fail: bool) {
        self.state.lock().unwrap().fail_connections = fail;
    }

    fn read_with<T>(&self, cid: &Cid, pick: impl FnOnce(&StoredObject) -> Option<T>) -> NetFuture<T> {
        let g = self.state.lock().unwrap();
        if g.fail_connections {
            return NetFuture::ready(Err(NetworkError::Connection(format!("read {cid}"))));
        }
        let result = match g.objects.get(cid) {
            Some(object) => pick(object).ok_or_else(|| NetworkError::FailedDeserialization {
                cid: cid.clone(),
                reason: "unexpected object type".to_string(),
            }),
            None => Err(NetworkError::NotFound(cid.clone())),
        };
        NetFuture::ready(result)
    }
}

impl NetworkScheduler for MemoryScheduler {
    fn read_index(&self, cid: &Cid) -> NetFuture<StreamIndex> {
        self.read_with(cid, |o| match o {
            StoredObject::Index(v) => Some(v.clone()),
            _ => None,
        })
    }

    fn read_description(&self, cid: &Cid) -> NetFuture<StreamDescription> {
        self.read_with(cid, |o| match o {
            StoredObject::Description(v) => Some(v.clone()),
            _ => None,
        })
    }

    fn read_recommendations(&self, cid: &Cid) -> NetFuture<StreamRecommendations> {
        self.read_with(cid, |o| match o {
            StoredObject::Recommendations(v) => Some(v.clone()),
            _ => None,
        })
    }

    fn read_records(&self, cid: &Cid) -> NetFuture<StreamRecords> {
        self.read_with(cid, |o| match o {
            StoredObject::Records(v) => Some(v.clone()),
            _ => None,
        })
    }

    fn read_record(&self, cid: &Cid) -> NetFuture<StreamRecord> {
        self.read_with(cid, |o| match o {
            StoredObject::Record(v) => Some(v.clone()),
            _ => None,
        })
    }

    fn pin(&self, cid: &Cid) -> NetFuture<()> {
        let mut g = self.state.lock().unwrap();
        if g.fail_connections {
            return NetFuture::ready(Err(NetworkError::Connection(format!("pin {cid}"))));
        }
        if !g.objects.contains_key(cid) {
            return NetFuture::ready(Err(NetworkError::NotFound(cid.clone())));
        }
        g.pin_calls.push(cid.clone());
        g.pinned.insert(cid.clone());
        NetFuture::ready(Ok(()))
    }

    fn unpin(&self, cid: &Cid) -> NetFuture<()> {
        let mut g = self.state.lock().unwrap();
        if g.fail_connections {
            return NetFuture::ready(Err(NetworkError::Connection(format!("unpin {cid}"))));
        }
        g.unpin_calls.push(cid.clone());
        if g.pinned.remove(cid) {
            NetFuture::ready(Ok(()))
        } else {
            NetFuture::ready(Err(NetworkError::NotFound(cid.clone())))
        }
    }

    fn size_in_bytes(&self, cid: &Cid) -> NetFuture<u64> {
        self.read_with(cid, |o| Some(o.size_bytes()))
    }

    fn publish(&self, _key_name: &str, public_key: &PublicKey, root: &Cid) -> NetFuture<()> {
        let mut g = self.state.lock().unwrap();
        if g.fail_connections {
            return NetFuture::ready(Err(NetworkError::Connection(format!("publish {public_key}"))));
        }
        g.names.insert(public_key.clone(), root.clone());
        NetFuture::ready(Ok(()))
    }

    fn resolve(&self, public_key: &PublicKey) -> NetFuture<Cid> {
        let g = self.state.lock().unwrap();
        if g.fail_connections {
            return NetFuture::ready(Err(NetworkError::Connection(format!("resolve {public_key}"))));
        }
        let result = g
            .names
            .get(public_key)
            .cloned()
            .ok_or_else(|| NetworkError::Connection(format!("no record published for {public_key}")));
        NetFuture::ready(result)
    }
}
