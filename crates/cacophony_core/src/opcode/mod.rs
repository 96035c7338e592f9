/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! The opcode log: every persisted mutation of the projections.
//!
//! Ordinals are shared by every on-disk version. Write-deprecated kinds are
//! only ever decoded from version 3 logs and applied through
//! [`Opcode::apply_legacy`]; current kinds go through [`Opcode::apply`].
//! Crossing the two paths is a codec bug and panics.

mod codec;
mod wire;

pub use crate::error::OpcodeError;
pub use codec::{decode_all, encode_all, OpcodeReader, OpcodeWriter};
pub use wire::{OpcodeDeserializer, OpcodeSerializer};

use crate::projection::{CachedRecordInfo, FollowingCacheElement, Projections, UserInfo};
use cacophony_protocol::{Cid, PublicKey};
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum OpcodeType {
    DefineChannel = 1,
    LegacySetFolloweeState = 2,
    LegacyAddFolloweeElement = 3,
    SetPrefsInt = 4,
    SetPrefsLong = 5,
    LegacyExplicitUserInfo = 6,
    LegacyExplicitStreamRecord = 7,
    FavouriteStreamRecord = 8,
    SetFolloweeState = 9,
    AddFolloweeElement = 10,
    ExplicitUserInfo = 11,
    ExplicitStreamRecord = 12,
    SkipFolloweeRecord = 13,
}

impl OpcodeType {
    pub const ALL: [OpcodeType; 13] = [
        Self::DefineChannel,
        Self::LegacySetFolloweeState,
        Self::LegacyAddFolloweeElement,
        Self::SetPrefsInt,
        Self::SetPrefsLong,
        Self::LegacyExplicitUserInfo,
        Self::LegacyExplicitStreamRecord,
        Self::FavouriteStreamRecord,
        Self::SetFolloweeState,
        Self::AddFolloweeElement,
        Self::ExplicitUserInfo,
        Self::ExplicitStreamRecord,
        Self::SkipFolloweeRecord,
    ];

    pub fn ordinal(self) -> u32 {
        self as u32
    }

    /// Ordinal 0 is reserved and never maps to a kind.
    pub fn from_ordinal(ordinal: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.ordinal() == ordinal)
    }

    /// Decodable for migration only; never written by this version.
    pub fn is_write_deprecated(self) -> bool {
        matches!(
            self,
            Self::LegacySetFolloweeState
                | Self::LegacyAddFolloweeElement
                | Self::LegacyExplicitUserInfo
                | Self::LegacyExplicitStreamRecord
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "opcode")]
pub enum Opcode {
    DefineChannel {
        key_name: String,
        public_key: PublicKey,
        root: Cid,
    },
    LegacySetFolloweeState {
        followee: PublicKey,
        root: Cid,
        last_poll_millis: i64,
    },
    LegacyAddFolloweeElement {
        followee: PublicKey,
        element: Cid,
        image: Option<Cid>,
        leaf: Option<Cid>,
        combined_size_bytes: u64,
    },
    SetPrefsInt {
        key: String,
        value: i32,
    },
    SetPrefsLong {
        key: String,
        value: i64,
    },
    /// Version 3 cached users without recording whose they were.
    LegacyExplicitUserInfo {
        index: Cid,
        recommendations: Cid,
        description: Cid,
        picture: Option<Cid>,
        combined_size_bytes: u64,
    },
    LegacyExplicitStreamRecord {
        record: Cid,
        thumbnail: Option<Cid>,
        video: Option<Cid>,
        audio: Option<Cid>,
        combined_size_bytes: u64,
    },
    FavouriteStreamRecord {
        record: Cid,
        thumbnail: Option<Cid>,
        video: Option<Cid>,
        audio: Option<Cid>,
        combined_size_bytes: u64,
    },
    SetFolloweeState {
        followee: PublicKey,
        root: Cid,
        next_backward_record: Option<Cid>,
        last_poll_millis: i64,
        last_success_millis: i64,
    },
    AddFolloweeElement {
        followee: PublicKey,
        element: Cid,
        image: Option<Cid>,
        leaf: Option<Cid>,
        combined_size_bytes: u64,
    },
    ExplicitUserInfo {
        public_key: PublicKey,
        last_fetch_attempt_millis: i64,
        last_fetch_success_millis: i64,
        index: Cid,
        recommendations: Cid,
        records: Cid,
        description: Cid,
        picture: Option<Cid>,
        combined_size_bytes: u64,
    },
    ExplicitStreamRecord {
        record: Cid,
        has_data_to_cache: bool,
        thumbnail: Option<Cid>,
        video: Option<Cid>,
        audio: Option<Cid>,
        combined_size_bytes: u64,
    },
    SkipFolloweeRecord {
        followee: PublicKey,
        record: Cid,
        permanent: bool,
    },
}

/// Apply target while migrating a version 3 log.
pub struct LegacyContext<'a> {
    pub projections: &'a mut Projections,
    /// CIDs referenced by dropped legacy entries. Whatever the rebuilt pin
    /// cache does not reference afterwards must be unpinned on the node.
    pub unpins_to_rationalize: Vec<Cid>,
}

impl<'a> LegacyContext<'a> {
    pub fn new(projections: &'a mut Projections) -> Self {
        Self {
            projections,
            unpins_to_rationalize: Vec::new(),
        }
    }
}

impl Opcode {
    pub fn kind(&self) -> OpcodeType {
        match self {
            Self::DefineChannel { .. } => OpcodeType::DefineChannel,
            Self::LegacySetFolloweeState { .. } => OpcodeType::LegacySetFolloweeState,
            Self::LegacyAddFolloweeElement { .. } => OpcodeType::LegacyAddFolloweeElement,
            Self::SetPrefsInt { .. } => OpcodeType::SetPrefsInt,
            Self::SetPrefsLong { .. } => OpcodeType::SetPrefsLong,
            Self::LegacyExplicitUserInfo { .. } => OpcodeType::LegacyExplicitUserInfo,
            Self::LegacyExplicitStreamRecord { .. } => OpcodeType::LegacyExplicitStreamRecord,
            Self::FavouriteStreamRecord { .. } => OpcodeType::FavouriteStreamRecord,
            Self::SetFolloweeState { .. } => OpcodeType::SetFolloweeState,
            Self::AddFolloweeElement { .. } => OpcodeType::AddFolloweeElement,
            Self::ExplicitUserInfo { .. } => OpcodeType::ExplicitUserInfo,
            Self::ExplicitStreamRecord { .. } => OpcodeType::ExplicitStreamRecord,
            Self::SkipFolloweeRecord { .. } => OpcodeType::SkipFolloweeRecord,
        }
    }

    pub fn encode(&self, out: &mut OpcodeSerializer) {
        match self {
            Self::DefineChannel { key_name, public_key, root } => {
                out.write_string(Some(key_name.as_str()));
                out.write_key(public_key);
                out.write_cid(root);
            }
            Self::LegacySetFolloweeState { followee, root, last_poll_millis } => {
                out.write_key(followee);
                out.write_cid(root);
                out.write_long(*last_poll_millis);
            }
            Self::LegacyAddFolloweeElement { followee, element, image, leaf, combined_size_bytes }
            | Self::AddFolloweeElement { followee, element, image, leaf, combined_size_bytes } => {
                out.write_key(followee);
                out.write_cid(element);
                out.write_optional_cid(image.as_ref());
                out.write_optional_cid(leaf.as_ref());
                out.write_size(*combined_size_bytes);
            }
            Self::SetPrefsInt { key, value } => {
                out.write_string(Some(key.as_str()));
                out.write_int(*value);
            }
            Self::SetPrefsLong { key, value } => {
                out.write_string(Some(key.as_str()));
                out.write_long(*value);
            }
            Self::LegacyExplicitUserInfo { index, recommendations, description, picture, combined_size_bytes } => {
                out.write_cid(index);
                out.write_cid(recommendations);
                out.write_cid(description);
                out.write_optional_cid(picture.as_ref());
                out.write_size(*combined_size_bytes);
            }
            Self::LegacyExplicitStreamRecord { record, thumbnail, video, audio, combined_size_bytes }
            | Self::FavouriteStreamRecord { record, thumbnail, video, audio, combined_size_bytes } => {
                out.write_cid(record);
                out.write_optional_cid(thumbnail.as_ref());
                out.write_optional_cid(video.as_ref());
                out.write_optional_cid(audio.as_ref());
                out.write_size(*combined_size_bytes);
            }
            Self::SetFolloweeState {
                followee,
                root,
                next_backward_record,
                last_poll_millis,
                last_success_millis,
            } => {
                out.write_key(followee);
                out.write_cid(root);
                out.write_optional_cid(next_backward_record.as_ref());
                out.write_long(*last_poll_millis);
                out.write_long(*last_success_millis);
            }
            Self::ExplicitUserInfo {
                public_key,
                last_fetch_attempt_millis,
                last_fetch_success_millis,
                index,
                recommendations,
                records,
                description,
                picture,
                combined_size_bytes,
            } => {
                out.write_key(public_key);
                out.write_long(*last_fetch_attempt_millis);
                out.write_long(*last_fetch_success_millis);
                out.write_cid(index);
                out.write_cid(recommendations);
                out.write_cid(records);
                out.write_cid(description);
                out.write_optional_cid(picture.as_ref());
                out.write_size(*combined_size_bytes);
            }
            Self::ExplicitStreamRecord { record, has_data_to_cache, thumbnail, video, audio, combined_size_bytes } => {
                out.write_cid(record);
                out.write_bool(*has_data_to_cache);
                out.write_optional_cid(thumbnail.as_ref());
                out.write_optional_cid(video.as_ref());
                out.write_optional_cid(audio.as_ref());
                out.write_size(*combined_size_bytes);
            }
            Self::SkipFolloweeRecord { followee, record, permanent } => {
                out.write_key(followee);
                out.write_cid(record);
                out.write_bool(*permanent);
            }
        }
    }

    pub fn decode(kind: OpcodeType, payload: &[u8]) -> Result<Self, OpcodeError> {
        let mut input = OpcodeDeserializer::new(payload);
        let i = &mut input;
        let opcode = match kind {
            OpcodeType::DefineChannel => Self::DefineChannel {
                key_name: i.read_required_string("key name")?,
                public_key: i.read_key("public key")?,
                root: i.read_cid("root")?,
            },
            OpcodeType::LegacySetFolloweeState => Self::LegacySetFolloweeState {
                followee: i.read_key("followee")?,
                root: i.read_cid("root")?,
                last_poll_millis: i.read_long()?,
            },
            OpcodeType::LegacyAddFolloweeElement => Self::LegacyAddFolloweeElement {
                followee: i.read_key("followee")?,
                element: i.read_cid("element")?,
                image: i.read_optional_cid()?,
                leaf: i.read_optional_cid()?,
                combined_size_bytes: i.read_size()?,
            },
            OpcodeType::SetPrefsInt => Self::SetPrefsInt {
                key: i.read_required_string("prefs key")?,
                value: i.read_int()?,
            },
            OpcodeType::SetPrefsLong => Self::SetPrefsLong {
                key: i.read_required_string("prefs key")?,
                value: i.read_long()?,
            },
            OpcodeType::LegacyExplicitUserInfo => Self::LegacyExplicitUserInfo {
                index: i.read_cid("index")?,
                recommendations: i.read_cid("recommendations")?,
                description: i.read_cid("description")?,
                picture: i.read_optional_cid()?,
                combined_size_bytes: i.read_size()?,
            },
            OpcodeType::LegacyExplicitStreamRecord => Self::LegacyExplicitStreamRecord {
                record: i.read_cid("record")?,
                thumbnail: i.read_optional_cid()?,
                video: i.read_optional_cid()?,
                audio: i.read_optional_cid()?,
                combined_size_bytes: i.read_size()?,
            },
            OpcodeType::FavouriteStreamRecord => Self::FavouriteStreamRecord {
                record: i.read_cid("record")?,
                thumbnail: i.read_optional_cid()?,
                video: i.read_optional_cid()?,
                audio: i.read_optional_cid()?,
                combined_size_bytes: i.read_size()?,
            },
            OpcodeType::SetFolloweeState => Self::SetFolloweeState {
                followee: i.read_key("followee")?,
                root: i.read_cid("root")?,
                next_backward_record: i.read_optional_cid()?,
                last_poll_millis: i.read_long()?,
                last_success_millis: i.read_long()?,
            },
            OpcodeType::AddFolloweeElement => Self::AddFolloweeElement {
                followee: i.read_key("followee")?,
                element: i.read_cid("element")?,
                image: i.read_optional_cid()?,
                leaf: i.read_optional_cid()?,
                combined_size_bytes: i.read_size()?,
            },
            OpcodeType::ExplicitUserInfo => Self::ExplicitUserInfo {
                public_key: i.read_key("public key")?,
                last_fetch_attempt_millis: i.read_long()?,
                last_fetch_success_millis: i.read_long()?,
                index: i.read_cid("index")?,
                recommendations: i.read_cid("recommendations")?,
                records: i.read_cid("records")?,
                description: i.read_cid("description")?,
                picture: i.read_optional_cid()?,
                combined_size_bytes: i.read_size()?,
            },
            OpcodeType::ExplicitStreamRecord => Self::ExplicitStreamRecord {
                record: i.read_cid("record")?,
                has_data_to_cache: i.read_bool()?,
                thumbnail: i.read_optional_cid()?,
                video: i.read_optional_cid()?,
                audio: i.read_optional_cid()?,
                combined_size_bytes: i.read_size()?,
            },
            OpcodeType::SkipFolloweeRecord => Self::SkipFolloweeRecord {
                followee: i.read_key("followee")?,
                record: i.read_cid("record")?,
                permanent: i.read_bool()?,
            },
        };
        if input.remaining() != 0 {
            return Err(OpcodeError::Malformed(format!(
                "{} trailing bytes after {kind:?}",
                input.remaining()
            )));
        }
        Ok(opcode)
    }

    /// Applies an opcode read from a current-version log.
    pub fn apply(self, target: &mut Projections) {
        match self {
            Self::DefineChannel { key_name, public_key, root } => {
                target.channels.initialize_channel_state(&key_name, public_key, root);
            }
            Self::SetPrefsInt { key, value } => {
                if !target.prefs.set_int(&key, value) {
                    warn!(%key, value, "dropping unknown int preference");
                }
            }
            Self::SetPrefsLong { key, value } => {
                if !target.prefs.set_long(&key, value) {
                    warn!(%key, value, "dropping unknown long preference");
                }
            }
            Self::FavouriteStreamRecord { record, thumbnail, video, audio, combined_size_bytes } => {
                target.favourites.add_stream_record(CachedRecordInfo {
                    record,
                    has_data_to_cache: true,
                    thumbnail,
                    video,
                    audio,
                    combined_size_bytes,
                });
            }
            Self::SetFolloweeState {
                followee,
                root,
                next_backward_record,
                last_poll_millis,
                last_success_millis,
            } => {
                target.followees.create_new_followee(
                    followee,
                    root,
                    next_backward_record,
                    last_poll_millis,
                    last_success_millis,
                );
            }
            Self::AddFolloweeElement { followee, element, image, leaf, combined_size_bytes } => {
                target.followees.add_element(
                    &followee,
                    FollowingCacheElement { element, image, leaf, combined_size_bytes },
                );
            }
            Self::ExplicitUserInfo {
                public_key,
                last_fetch_attempt_millis,
                last_fetch_success_millis,
                index,
                recommendations,
                records,
                description,
                picture,
                combined_size_bytes,
            } => {
                target.explicit_cache.add_user_info(UserInfo {
                    public_key,
                    last_fetch_attempt_millis,
                    last_fetch_success_millis,
                    index,
                    recommendations,
                    records,
                    description,
                    picture,
                    combined_size_bytes,
                });
            }
            Self::ExplicitStreamRecord { record, has_data_to_cache, thumbnail, video, audio, combined_size_bytes } => {
                target.explicit_cache.add_stream_record(CachedRecordInfo {
                    record,
                    has_data_to_cache,
                    thumbnail,
                    video,
                    audio,
                    combined_size_bytes,
                });
            }
            Self::SkipFolloweeRecord { followee, record, permanent } => {
                target.followees.add_skipped_record(&followee, record, permanent);
            }
            legacy @ (Self::LegacySetFolloweeState { .. }
            | Self::LegacyAddFolloweeElement { .. }
            | Self::LegacyExplicitUserInfo { .. }
            | Self::LegacyExplicitStreamRecord { .. }) => {
                unreachable!("{:?} applied to a current-version log", legacy.kind())
            }
        }
    }

    /// Applies an opcode read from a version 3 log.
    pub fn apply_legacy(self, ctx: &mut LegacyContext<'_>) {
        let target = &mut *ctx.projections;
        match self {
            Self::DefineChannel { .. } | Self::FavouriteStreamRecord { .. } => self.apply(target),
            Self::SetPrefsInt { key, value } => {
                assert!(target.prefs.set_int(&key, value), "unknown int preference {key} in version 3 log");
            }
            Self::SetPrefsLong { key, value } => {
                assert!(target.prefs.set_long(&key, value), "unknown long preference {key} in version 3 log");
            }
            Self::LegacySetFolloweeState { followee, root, last_poll_millis } => {
                target
                    .followees
                    .create_new_followee(followee, root, None, last_poll_millis, last_poll_millis);
            }
            Self::LegacyAddFolloweeElement { followee, element, image, leaf, combined_size_bytes } => {
                // Metadata-only elements are no longer tracked.
                if image.is_some() || leaf.is_some() {
                    target.followees.add_element(
                        &followee,
                        FollowingCacheElement { element, image, leaf, combined_size_bytes },
                    );
                }
            }
            Self::LegacyExplicitUserInfo { index, recommendations, description, picture, .. } => {
                ctx.unpins_to_rationalize.extend([index, recommendations, description]);
                ctx.unpins_to_rationalize.extend(picture);
            }
            Self::LegacyExplicitStreamRecord { record, thumbnail, video, audio, combined_size_bytes } => {
                target.explicit_cache.add_stream_record(CachedRecordInfo {
                    record,
                    has_data_to_cache: false,
                    thumbnail,
                    video,
                    audio,
                    combined_size_bytes,
                });
            }
            current @ (Self::SetFolloweeState { .. }
            | Self::AddFolloweeElement { .. }
            | Self::ExplicitUserInfo { .. }
            | Self::ExplicitStreamRecord { .. }
            | Self::SkipFolloweeRecord { .. }) => {
                unreachable!("{:?} applied to a version 3 log", current.kind())
            }
        }
    }
}
