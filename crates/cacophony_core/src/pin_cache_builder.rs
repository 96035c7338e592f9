/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Derives pin reference counts from the persisted projections.
//!
//! Everything walked here was validated when it was first fetched, so any
//! read failure means local state and the node disagree and is fatal.

use crate::projection::{FollowingCacheElement, PinCacheData, Projections};
use crate::scheduler::{NetFuture, NetworkScheduler};
use cacophony_protocol::Cid;
use tracing::debug;

pub struct PinCacheBuilder<'a> {
    network: &'a dyn NetworkScheduler,
    cache: PinCacheData,
}

fn expect_valid<T>(future: NetFuture<T>, what: &str, cid: &Cid) -> T {
    match future.get() {
        Ok(v) => v,
        Err(e) => panic!("already validated {what} {cid} could not be re-read: {e}"),
    }
}

impl<'a> PinCacheBuilder<'a> {
    pub fn new(network: &'a dyn NetworkScheduler) -> Self {
        Self {
            network,
            cache: PinCacheData::new(),
        }
    }

    /// Walks every root the projections know about.
    pub fn build(mut self, projections: &Projections) -> PinCacheData {
        for (key_name, channel) in projections.channels.iter() {
            debug!(key_name, root = %channel.last_published_root, "walking home channel");
            self.add_home_channel(&channel.last_published_root);
        }
        for followee in projections.followees.all_known_followees() {
            if let Some(state) = projections.followees.followee(&followee) {
                self.add_followee(&state.last_fetched_root, state.elements());
            }
        }
        projections.favourites.walk_all_pins(|cid| self.cache.add_ref(cid));
        projections.explicit_cache.walk_all_pins(|cid| self.cache.add_ref(cid));
        self.finish()
    }

    /// The user's own channel is mirrored in full: every record and leaf.
    pub fn add_home_channel(&mut self, root: &Cid) {
        let records_cid = self.pin_metadata(root);
        let records = expect_valid(self.network.read_records(&records_cid), "record list", &records_cid);
        let pending: Vec<_> = records
            .records
            .iter()
            .map(|cid| {
                self.cache.add_ref(cid);
                (cid, self.network.read_record(cid))
            })
            .collect();
        for (cid, future) in pending {
            let record = expect_valid(future, "record", cid);
            if let Some(thumbnail) = &record.thumbnail {
                self.cache.add_ref(thumbnail);
            }
            for leaf in &record.leaves {
                self.cache.add_ref(&leaf.cid);
            }
        }
    }

    /// A followee is only pinned as far as the followee cache selected it.
    pub fn add_followee(&mut self, root: &Cid, elements: &[FollowingCacheElement]) {
        self.pin_metadata(root);
        for e in elements {
            self.cache.add_ref(&e.element);
            if let Some(image) = &e.image {
                self.cache.add_ref(image);
            }
            if let Some(leaf) = &e.leaf {
                self.cache.add_ref(leaf);
            }
        }
    }

    /// Pins the index, its description, recommendations and record list, and
    /// the description picture. Returns the record list CID.
    fn pin_metadata(&mut self, root: &Cid) -> Cid {
        self.cache.add_ref(root);
        let index = expect_valid(self.network.read_index(root), "index", root);
        self.cache.add_ref(&index.description);
        self.cache.add_ref(&index.recommendations);
        self.cache.add_ref(&index.records);
        let description = expect_valid(
            self.network.read_description(&index.description),
            "description",
            &index.description,
        );
        if let Some(picture) = &description.picture {
            self.cache.add_ref(picture);
        }
        index.records
    }

    pub fn finish(self) -> PinCacheData {
        self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::MemoryScheduler;
    use cacophony_protocol::{
        PublicKey, RecordLeaf, StreamDescription, StreamIndex, StreamRecommendations, StreamRecord,
        StreamRecords,
    };

    fn publish_channel(net: &MemoryScheduler, leaves: &[&[u8]]) -> (Cid, Vec<Cid>) {
        let picture = net.upload_raw(b"avatar");
        let description = net.upload_description(&StreamDescription {
            name: "home".into(),
            description: "mine".into(),
            picture: Some(picture),
            email: None,
            website: None,
            feature: None,
        });
        let recommendations = net.upload_recommendations(&StreamRecommendations::default());
        let mut record_cids = Vec::new();
        let mut leaf_cids = Vec::new();
        for bytes in leaves {
            let leaf = net.upload_raw(bytes);
            leaf_cids.push(leaf.clone());
            record_cids.push(net.upload_record(&StreamRecord {
                name: "post".into(),
                description: String::new(),
                published_seconds: 1,
                publisher: PublicKey::parse("z5Home").unwrap(),
                discussion_url: None,
                reply_to: None,
                thumbnail: None,
                leaves: vec![RecordLeaf { cid: leaf, mime: "audio/ogg".into(), height: 0, width: 0 }],
            }));
        }
        let records = net.upload_records(&StreamRecords { records: record_cids });
        let root = net.upload_index(&StreamIndex { version: 1, description, recommendations, records });
        (root, leaf_cids)
    }

    #[test]
    fn home_channel_pins_every_leaf() {
        let net = MemoryScheduler::new();
        let (root, leaves) = publish_channel(&net, &[b"one", b"two"]);
        let mut builder = PinCacheBuilder::new(&net);
        builder.add_home_channel(&root);
        let pins = builder.finish();
        // index, description, recommendations, records, picture, 2 records, 2 leaves
        assert_eq!(pins.len(), 9);
        assert!(leaves.iter().all(|l| pins.is_pinned(l)));
    }

    #[test]
    fn shared_content_is_counted_per_reference() {
        let net = MemoryScheduler::new();
        let (root, _) = publish_channel(&net, &[b"one"]);
        let mut builder = PinCacheBuilder::new(&net);
        builder.add_home_channel(&root);
        builder.add_followee(&root, &[]);
        let pins = builder.finish();
        assert_eq!(pins.ref_count(&root), 2);
    }

    #[test]
    #[should_panic(expected = "could not be re-read")]
    fn missing_content_is_fatal() {
        let net = MemoryScheduler::new();
        let mut builder = PinCacheBuilder::new(&net);
        builder.add_followee(&Cid::parse("QmGone").unwrap(), &[]);
    }
}
