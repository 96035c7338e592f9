/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! In-memory views rebuilt by replaying the opcode log.

mod channel;
mod explicit_cache;
mod favourites;
mod followee;
mod pin_cache;
pub mod prefs;
mod record_info;

pub use channel::{ChannelData, HomeChannel};
pub use explicit_cache::{CacheKey, ExplicitCacheData, UserInfo, UserInfoRoots};
pub use favourites::FavouritesCacheData;
pub use followee::{FolloweeData, FolloweeState, FollowingCacheElement};
pub use pin_cache::PinCacheData;
pub use prefs::PrefsData;
pub use record_info::CachedRecordInfo;

use crate::opcode::{OpcodeError, OpcodeWriter};
use std::io::Write;

/// Every projection, as loaded under one storage lock.
#[derive(Debug, Default)]
pub struct Projections {
    pub channels: ChannelData,
    pub prefs: PrefsData,
    pub followees: FolloweeData,
    pub explicit_cache: ExplicitCacheData,
    pub favourites: FavouritesCacheData,
    /// Derived on load, never written to the log.
    pub pin_cache: PinCacheData,
}

impl Projections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes the full persisted state as a fresh opcode stream.
    pub fn write_opcodes<W: Write>(&self, writer: &mut OpcodeWriter<W>) -> Result<(), OpcodeError> {
        self.channels.write_opcodes(writer)?;
        self.prefs.write_opcodes(writer)?;
        self.followees.write_opcodes(writer)?;
        self.explicit_cache.write_opcodes(writer)?;
        self.favourites.write_opcodes(writer)?;
        Ok(())
    }
}
