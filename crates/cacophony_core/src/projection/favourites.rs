/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use super::CachedRecordInfo;
use crate::opcode::{Opcode, OpcodeError, OpcodeWriter};
use cacophony_protocol::Cid;
use std::collections::HashMap;
use std::io::Write;

/// Posts the user marked as favourite, in the order they were added.
#[derive(Debug, Default, Clone)]
pub struct FavouritesCacheData {
    order: Vec<Cid>,
    records: HashMap<Cid, CachedRecordInfo>,
}

impl FavouritesCacheData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_cids(&self) -> &[Cid] {
        &self.order
    }

    pub fn record_info(&self, record: &Cid) -> Option<&CachedRecordInfo> {
        self.records.get(record)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn total_size_bytes(&self) -> u64 {
        self.records.values().map(|r| r.combined_size_bytes).sum()
    }

    pub fn add_stream_record(&mut self, info: CachedRecordInfo) {
        assert!(
            !self.records.contains_key(&info.record),
            "{} is already a favourite",
            info.record
        );
        self.order.push(info.record.clone());
        self.records.insert(info.record.clone(), info);
    }

    pub fn remove_stream_record(&mut self, record: &Cid) -> Option<CachedRecordInfo> {
        let info = self.records.remove(record)?;
        self.order.retain(|c| c != record);
        Some(info)
    }

    pub fn walk_all_pins(&self, mut pin: impl FnMut(&Cid)) {
        for record in &self.order {
            self.records[record].owned_cids().for_each(&mut pin);
        }
    }

    pub fn write_opcodes<W: Write>(&self, writer: &mut OpcodeWriter<W>) -> Result<(), OpcodeError> {
        for record in &self.order {
            let info = &self.records[record];
            writer.write_opcode(&Opcode::FavouriteStreamRecord {
                record: record.clone(),
                thumbnail: info.thumbnail.clone(),
                video: info.video.clone(),
                audio: info.audio.clone(),
                combined_size_bytes: info.combined_size_bytes,
            })?;
        }
        Ok(())
    }
}
