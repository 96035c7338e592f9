/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::opcode::{Opcode, OpcodeError, OpcodeWriter};
use cacophony_protocol::{Cid, PublicKey};
use std::collections::BTreeMap;
use std::io::Write;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HomeChannel {
    pub public_key: PublicKey,
    pub last_published_root: Cid,
}

/// The user's own channels, keyed by local key name.
#[derive(Debug, Default, Clone)]
pub struct ChannelData {
    channels: BTreeMap<String, HomeChannel>,
}

impl ChannelData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key_names(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(String::as_str)
    }

    pub fn channel(&self, key_name: &str) -> Option<&HomeChannel> {
        self.channels.get(key_name)
    }

    pub fn public_key(&self, key_name: &str) -> Option<&PublicKey> {
        self.channels.get(key_name).map(|c| &c.public_key)
    }

    pub fn last_published_root(&self, key_name: &str) -> Option<&Cid> {
        self.channels.get(key_name).map(|c| &c.last_published_root)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &HomeChannel)> {
        self.channels.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn initialize_channel_state(&mut self, key_name: &str, public_key: PublicKey, root: Cid) {
        let prev = self.channels.insert(
            key_name.to_string(),
            HomeChannel {
                public_key,
                last_published_root: root,
            },
        );
        assert!(prev.is_none(), "channel {key_name} defined twice");
    }

    /// Records a republish. The key of an existing channel never changes.
    pub fn set_last_published_root(&mut self, key_name: &str, public_key: &PublicKey, root: Cid) {
        match self.channels.get_mut(key_name) {
            Some(existing) => {
                assert_eq!(
                    &existing.public_key, public_key,
                    "public key of channel {key_name} changed"
                );
                existing.last_published_root = root;
            }
            None => self.initialize_channel_state(key_name, public_key.clone(), root),
        }
    }

    pub fn remove_channel(&mut self, key_name: &str) -> Option<HomeChannel> {
        self.channels.remove(key_name)
    }

    pub fn write_opcodes<W: Write>(&self, writer: &mut OpcodeWriter<W>) -> Result<(), OpcodeError> {
        for (key_name, channel) in &self.channels {
            writer.write_opcode(&Opcode::DefineChannel {
                key_name: key_name.clone(),
                public_key: channel.public_key.clone(),
                root: channel.last_published_root.clone(),
            })?;
        }
        Ok(())
    }
}
