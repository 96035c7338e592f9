/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use cacophony_protocol::Cid;

/// A locally cached post and the leaf CIDs chosen for it.
///
/// At most one of `video` and `audio` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedRecordInfo {
    pub record: Cid,
    /// False when only the record itself is kept (no leaves were selected).
    pub has_data_to_cache: bool,
    pub thumbnail: Option<Cid>,
    pub video: Option<Cid>,
    pub audio: Option<Cid>,
    pub combined_size_bytes: u64,
}

impl CachedRecordInfo {
    /// Every CID this entry holds a pin reference on, record first.
    pub fn owned_cids(&self) -> impl Iterator<Item = &Cid> {
        std::iter::once(&self.record)
            .chain(self.thumbnail.iter())
            .chain(self.video.iter())
            .chain(self.audio.iter())
    }
}
