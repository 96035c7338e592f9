/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

#![allow(dead_code)]

use cacophony_core::error::StorageError;
use cacophony_core::scheduler::MemoryScheduler;
use cacophony_core::storage::{LockingStats, RealConfigFileSystem, StorageModel};
use cacophony_protocol::{
    Cid, PublicKey, StreamDescription, StreamIndex, StreamRecommendations, StreamRecords,
};
use std::path::Path;
use std::sync::Arc;

pub fn cid(raw: &str) -> Cid {
    Cid::parse(raw).unwrap()
}

pub fn key(raw: &str) -> PublicKey {
    PublicKey::parse(raw).unwrap()
}

/// Publishes an empty channel (no picture, no records) and returns its root.
pub fn publish_empty_channel(net: &MemoryScheduler, name: &str) -> Cid {
    let description = net.upload_description(&StreamDescription {
        name: name.to_string(),
        description: String::new(),
        picture: None,
        email: None,
        website: None,
        feature: None,
    });
    let recommendations = net.upload_recommendations(&StreamRecommendations::default());
    let records = net.upload_records(&StreamRecords::default());
    net.upload_index(&StreamIndex { version: 1, description, recommendations, records })
}

pub fn load_model(
    dir: &Path,
    net: &Arc<MemoryScheduler>,
    stats: Option<Arc<dyn LockingStats>>,
) -> Result<StorageModel, StorageError> {
    StorageModel::load(Box::new(RealConfigFileSystem::new(dir)), net.clone(), stats)
}
