/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::opcode::{Opcode, OpcodeError, OpcodeWriter};
use std::io::Write;

pub const VIDEO_EDGE_PIXEL_MAX: &str = "VideoEdgePixelMax";
pub const FOLLOWEE_CACHE_TARGET_BYTES: &str = "FolloweeCacheTargetBytes";
pub const REPUBLISH_INTERVAL_MILLIS: &str = "RepublishIntervalMillis";
pub const FOLLOWEE_REFRESH_MILLIS: &str = "FolloweeRefreshMillis";
pub const EXPLICIT_CACHE_TARGET_BYTES: &str = "ExplicitCacheTargetBytes";
pub const EXPLICIT_USER_INFO_REFRESH_MILLIS: &str = "ExplicitUserInfoRefreshMillis";
pub const FOLLOWEE_RECORD_THUMBNAIL_MAX_BYTES: &str = "FolloweeRecordThumbnailMaxBytes";
pub const FOLLOWEE_RECORD_AUDIO_MAX_BYTES: &str = "FolloweeRecordAudioMaxBytes";
pub const FOLLOWEE_RECORD_VIDEO_MAX_BYTES: &str = "FolloweeRecordVideoMaxBytes";

const MB: i64 = 1_000_000;
const GB: i64 = 1_000 * MB;
const HOUR_MILLIS: i64 = 60 * 60 * 1000;

/// User preferences. A plain record: mutate the fields under a write session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefsData {
    pub video_edge_pixel_max: i32,
    pub followee_cache_target_bytes: i64,
    pub republish_interval_millis: i64,
    pub followee_refresh_millis: i64,
    pub explicit_cache_target_bytes: i64,
    pub explicit_user_info_refresh_millis: i64,
    pub followee_record_thumbnail_max_bytes: i64,
    pub followee_record_audio_max_bytes: i64,
    pub followee_record_video_max_bytes: i64,
}

impl Default for PrefsData {
    fn default() -> Self {
        Self {
            video_edge_pixel_max: 1280,
            followee_cache_target_bytes: 10 * GB,
            republish_interval_millis: 12 * HOUR_MILLIS,
            followee_refresh_millis: HOUR_MILLIS,
            explicit_cache_target_bytes: GB,
            explicit_user_info_refresh_millis: 24 * HOUR_MILLIS,
            followee_record_thumbnail_max_bytes: 10 * MB,
            followee_record_audio_max_bytes: 200 * MB,
            followee_record_video_max_bytes: 2 * GB,
        }
    }
}

impl PrefsData {
    /// Returns false if `key` names no int preference.
    pub fn set_int(&mut self, key: &str, value: i32) -> bool {
        match key {
            VIDEO_EDGE_PIXEL_MAX => self.video_edge_pixel_max = value,
            _ => return false,
        }
        true
    }

    /// Returns false if `key` names no long preference.
    pub fn set_long(&mut self, key: &str, value: i64) -> bool {
        let slot = match key {
            FOLLOWEE_CACHE_TARGET_BYTES => &mut self.followee_cache_target_bytes,
            REPUBLISH_INTERVAL_MILLIS => &mut self.republish_interval_millis,
            FOLLOWEE_REFRESH_MILLIS => &mut self.followee_refresh_millis,
            EXPLICIT_CACHE_TARGET_BYTES => &mut self.explicit_cache_target_bytes,
            EXPLICIT_USER_INFO_REFRESH_MILLIS => &mut self.explicit_user_info_refresh_millis,
            FOLLOWEE_RECORD_THUMBNAIL_MAX_BYTES => &mut self.followee_record_thumbnail_max_bytes,
            FOLLOWEE_RECORD_AUDIO_MAX_BYTES => &mut self.followee_record_audio_max_bytes,
            FOLLOWEE_RECORD_VIDEO_MAX_BYTES => &mut self.followee_record_video_max_bytes,
            _ => return false,
        };
        *slot = value;
        true
    }

    pub fn write_opcodes<W: Write>(&self, writer: &mut OpcodeWriter<W>) -> Result<(), OpcodeError> {
        writer.write_opcode(&Opcode::SetPrefsInt {
            key: VIDEO_EDGE_PIXEL_MAX.to_string(),
            value: self.video_edge_pixel_max,
        })?;
        let longs = [
            (FOLLOWEE_CACHE_TARGET_BYTES, self.followee_cache_target_bytes),
            (REPUBLISH_INTERVAL_MILLIS, self.republish_interval_millis),
            (FOLLOWEE_REFRESH_MILLIS, self.followee_refresh_millis),
            (EXPLICIT_CACHE_TARGET_BYTES, self.explicit_cache_target_bytes),
            (EXPLICIT_USER_INFO_REFRESH_MILLIS, self.explicit_user_info_refresh_millis),
            (FOLLOWEE_RECORD_THUMBNAIL_MAX_BYTES, self.followee_record_thumbnail_max_bytes),
            (FOLLOWEE_RECORD_AUDIO_MAX_BYTES, self.followee_record_audio_max_bytes),
            (FOLLOWEE_RECORD_VIDEO_MAX_BYTES, self.followee_record_video_max_bytes),
        ];
        for (key, value) in longs {
            writer.write_opcode(&Opcode::SetPrefsLong {
                key: key.to_string(),
                value,
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_keys_update_their_field() {
        let mut prefs = PrefsData::default();
        assert!(prefs.set_long(EXPLICIT_CACHE_TARGET_BYTES, 5));
        assert!(prefs.set_int(VIDEO_EDGE_PIXEL_MAX, 720));
        assert_eq!(prefs.explicit_cache_target_bytes, 5);
        assert_eq!(prefs.video_edge_pixel_max, 720);
    }

    #[test]
    fn unknown_or_mistyped_keys_are_rejected() {
        let mut prefs = PrefsData::default();
        assert!(!prefs.set_long("NoSuchPref", 1));
        assert!(!prefs.set_long(VIDEO_EDGE_PIXEL_MAX, 1));
        assert!(!prefs.set_int(FOLLOWEE_REFRESH_MILLIS, 1));
        assert_eq!(prefs, PrefsData::default());
    }
}
