/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

mod common;

use cacophony_core::error::StorageError;
use cacophony_core::opcode::{decode_all, Opcode, OpcodeType};
use cacophony_core::projection::{
    CacheKey, CachedRecordInfo, FollowingCacheElement, PrefsData, UserInfo,
};
use cacophony_core::scheduler::MemoryScheduler;
use cacophony_core::storage::{
    LockTimings, LockingStats, ProjectionKind, CURRENT_LOG_FILE, VERSION_FILE,
};
use common::{cid, key, load_model, publish_empty_channel};
use std::fs;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn load_err(dir: &Path, net: &Arc<MemoryScheduler>) -> StorageError {
    match load_model(dir, net, None) {
        Ok(_) => panic!("load of {} unexpectedly succeeded", dir.display()),
        Err(e) => e,
    }
}

#[test]
fn fresh_directory_gets_defaults_and_marker() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("data");
    let net = Arc::new(MemoryScheduler::new());

    let model = load_model(&dir, &net, None).unwrap();
    let read = model.open_for_read();
    assert!(read.channels().is_empty());
    assert!(read.followees().is_empty());
    assert!(read.explicit_cache().is_empty());
    assert!(read.favourites().is_empty());
    assert!(read.pin_cache().is_empty());
    assert_eq!(read.prefs(), &PrefsData::default());
    read.close();

    assert_eq!(fs::read(dir.join(VERSION_FILE)).unwrap(), vec![4u8]);
    let opcodes = decode_all(&fs::read(dir.join(CURRENT_LOG_FILE)).unwrap()).unwrap();
    assert_eq!(opcodes.len(), 9);
    assert!(opcodes
        .iter()
        .all(|op| matches!(op.kind(), OpcodeType::SetPrefsInt | OpcodeType::SetPrefsLong)));

    let mut replayed = PrefsData {
        video_edge_pixel_max: 0,
        ..PrefsData::default()
    };
    for op in opcodes {
        match op {
            Opcode::SetPrefsInt { key, value } => assert!(replayed.set_int(&key, value)),
            Opcode::SetPrefsLong { key, value } => assert!(replayed.set_long(&key, value)),
            other => panic!("unexpected {other:?}"),
        }
    }
    assert_eq!(replayed, PrefsData::default());
}

#[test]
fn followee_element_survives_reload() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("data");
    let net = Arc::new(MemoryScheduler::new());
    let root = publish_empty_channel(&net, "followee");
    let followee = key("z5Followee");
    let element = FollowingCacheElement {
        element: cid("QmElement1"),
        image: Some(cid("QmImage1")),
        leaf: None,
        combined_size_bytes: 100,
    };

    {
        let model = load_model(&dir, &net, None).unwrap();
        let mut session = model.open_for_write();
        session
            .followees_mut()
            .create_new_followee(followee.clone(), root.clone(), None, 1_000, 1_000);
        session.followees_mut().add_element(&followee, element.clone());
        let touched = session.close().unwrap();
        assert_eq!(touched.into_iter().collect::<Vec<_>>(), vec![ProjectionKind::Followees]);
    }

    let model = load_model(&dir, &net, None).unwrap();
    let read = model.open_for_read();
    assert_eq!(read.followees().elements_for_followee(&followee), Some(&[element][..]));
    assert_eq!(read.followees().last_fetched_root(&followee), Some(&root));
    assert_eq!(read.followees().last_poll_millis(&followee), Some(1_000));
    // root, description, recommendations, records, element, image
    assert_eq!(read.pin_cache().len(), 6);
    assert!(read.pin_cache().is_pinned(&cid("QmImage1")));
    assert!(read.pin_cache().is_pinned(&root));
}

#[test]
fn every_projection_survives_reload_and_rewrites_identically() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("data");
    let net = Arc::new(MemoryScheduler::new());
    let home_root = publish_empty_channel(&net, "home");
    let followee_root = publish_empty_channel(&net, "followee");
    let followee = key("z5Followee");
    let element = FollowingCacheElement {
        element: cid("QmElement1"),
        image: None,
        leaf: Some(cid("QmLeaf1")),
        combined_size_bytes: 300,
    };
    let user = UserInfo {
        public_key: key("z5Explicit"),
        last_fetch_attempt_millis: 20,
        last_fetch_success_millis: 15,
        index: cid("QmUserIndex"),
        recommendations: cid("QmUserRecs"),
        records: cid("QmUserRecords"),
        description: cid("QmUserDesc"),
        picture: None,
        combined_size_bytes: 64,
    };
    let bare_record = CachedRecordInfo {
        record: cid("QmBareRecord"),
        has_data_to_cache: false,
        thumbnail: None,
        video: None,
        audio: None,
        combined_size_bytes: 8,
    };
    let favourite = CachedRecordInfo {
        record: cid("QmFavourite"),
        has_data_to_cache: true,
        thumbnail: Some(cid("QmFavThumb")),
        video: Some(cid("QmFavVideo")),
        audio: None,
        combined_size_bytes: 4_000,
    };
    {
        let model = load_model(&dir, &net, None).unwrap();
        let mut session = model.open_for_write();
        session
            .channels_mut()
            .initialize_channel_state("home", key("z5Home"), home_root.clone());
        session.prefs_mut().video_edge_pixel_max = 480;
        session.prefs_mut().followee_cache_target_bytes = 123;
        let followees = session.followees_mut();
        followees.create_new_followee(
            followee.clone(),
            followee_root.clone(),
            Some(cid("QmResumeHere")),
            3_000,
            2_000,
        );
        followees.add_element(&followee, element.clone());
        followees.add_skipped_record(&followee, cid("QmBroken"), true);
        followees.add_skipped_record(&followee, cid("QmTooBig"), false);
        session.explicit_cache_mut().add_user_info(user.clone());
        session.explicit_cache_mut().add_stream_record(bare_record.clone());
        session.favourites_mut().add_stream_record(favourite.clone());
        session.close().unwrap();
    }
    let written = fs::read(dir.join(CURRENT_LOG_FILE)).unwrap();

    let model = load_model(&dir, &net, None).unwrap();
    let mut session = model.open_for_write();
    session.prefs_mut();
    session.close().unwrap();
    assert_eq!(fs::read(dir.join(CURRENT_LOG_FILE)).unwrap(), written);

    let read = model.open_for_read();
    assert_eq!(read.channels().last_published_root("home"), Some(&home_root));
    assert_eq!(read.prefs().video_edge_pixel_max, 480);
    assert_eq!(read.prefs().followee_cache_target_bytes, 123);
    let followees = read.followees();
    assert_eq!(followees.last_fetched_root(&followee), Some(&followee_root));
    assert_eq!(followees.next_backward_record(&followee), Some(&cid("QmResumeHere")));
    assert_eq!(followees.last_poll_millis(&followee), Some(3_000));
    assert_eq!(followees.last_success_millis(&followee), Some(2_000));
    assert_eq!(followees.elements_for_followee(&followee), Some(&[element][..]));
    assert_eq!(followees.skipped_records(&followee, false), vec![cid("QmBroken")]);
    assert_eq!(
        followees.skipped_records(&followee, true),
        vec![cid("QmBroken"), cid("QmTooBig")]
    );
    assert_eq!(
        read.explicit_cache().lru_order(),
        vec![
            CacheKey::User(user.public_key.clone()),
            CacheKey::Record(bare_record.record.clone())
        ]
    );
    assert_eq!(read.explicit_cache().user_info(&user.public_key), Some(&user));
    assert_eq!(read.explicit_cache().record_info(&bare_record.record), Some(&bare_record));
    assert_eq!(read.explicit_cache().total_size_bytes(), 72);
    assert_eq!(read.favourites().record_info(&favourite.record), Some(&favourite));
    for c in ["QmLeaf1", "QmElement1", "QmUserRecords", "QmBareRecord", "QmFavVideo"] {
        assert!(read.pin_cache().is_pinned(&cid(c)), "{c} should be pinned");
    }
}

#[test]
fn read_only_session_does_not_rewrite_the_log() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("data");
    let net = Arc::new(MemoryScheduler::new());
    let model = load_model(&dir, &net, None).unwrap();
    let before = fs::metadata(dir.join(CURRENT_LOG_FILE)).unwrap().modified().unwrap();

    let session = model.open_for_write();
    assert_eq!(session.prefs().video_edge_pixel_max, 1280);
    assert!(session.close().unwrap().is_empty());
    let after = fs::metadata(dir.join(CURRENT_LOG_FILE)).unwrap().modified().unwrap();
    assert_eq!(before, after);
}

#[test]
fn changed_prefs_are_persisted() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("data");
    let net = Arc::new(MemoryScheduler::new());
    {
        let model = load_model(&dir, &net, None).unwrap();
        let mut session = model.open_for_write();
        session.prefs_mut().video_edge_pixel_max = 720;
        session.prefs_mut().explicit_cache_target_bytes = 5_000;
        // dropped without close still flushes
    }
    let model = load_model(&dir, &net, None).unwrap();
    let read = model.open_for_read();
    assert_eq!(read.prefs().video_edge_pixel_max, 720);
    assert_eq!(read.prefs().explicit_cache_target_bytes, 5_000);
}

#[test]
fn home_channel_is_pinned_after_reload() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("data");
    let net = Arc::new(MemoryScheduler::new());
    let root = publish_empty_channel(&net, "home");
    {
        let model = load_model(&dir, &net, None).unwrap();
        let mut session = model.open_for_write();
        session
            .channels_mut()
            .initialize_channel_state("home", key("z5Home"), root.clone());
        session.close().unwrap();
    }
    let model = load_model(&dir, &net, None).unwrap();
    let read = model.open_for_read();
    assert_eq!(read.channels().last_published_root("home"), Some(&root));
    assert_eq!(read.pin_cache().ref_count(&root), 1);
    assert_eq!(read.pin_cache().len(), 4);
}

#[test]
fn leftover_temp_log_is_promoted() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("data");
    let net = Arc::new(MemoryScheduler::new());
    {
        let model = load_model(&dir, &net, None).unwrap();
        let mut session = model.open_for_write();
        session.prefs_mut().followee_refresh_millis = 42;
        session.close().unwrap();
    }
    // crash after the old log was removed but before the rename
    let log = dir.join(CURRENT_LOG_FILE);
    fs::rename(&log, dir.join(format!("{CURRENT_LOG_FILE}.temp"))).unwrap();

    let model = load_model(&dir, &net, None).unwrap();
    assert_eq!(model.open_for_read().prefs().followee_refresh_millis, 42);
    assert!(log.exists());
    assert!(!dir.join(format!("{CURRENT_LOG_FILE}.temp")).exists());
}

#[test]
fn incomplete_temp_log_is_discarded() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("data");
    let net = Arc::new(MemoryScheduler::new());
    drop(load_model(&dir, &net, None).unwrap());
    fs::write(dir.join(format!("{CURRENT_LOG_FILE}.temp")), b"half written").unwrap();

    let model = load_model(&dir, &net, None).unwrap();
    assert_eq!(model.open_for_read().prefs(), &PrefsData::default());
    assert!(!dir.join(format!("{CURRENT_LOG_FILE}.temp")).exists());
}

#[test]
fn directory_without_marker_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let net = Arc::new(MemoryScheduler::new());
    let err = load_err(tmp.path(), &net);
    assert!(matches!(err, StorageError::MissingVersionFile(_)), "{err}");
}

#[test]
fn versions_one_and_two_name_the_last_compatible_release() {
    for version in [1u8, 2] {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join(VERSION_FILE), [version]).unwrap();
        let net = Arc::new(MemoryScheduler::new());
        let err = load_err(tmp.path(), &net);
        assert!(matches!(err, StorageError::UnsupportedVersion { .. }), "{err}");
        assert!(err.to_string().contains("3.1"), "{err}");
    }
}

#[test]
fn unknown_version_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join(VERSION_FILE), [9u8]).unwrap();
    let net = Arc::new(MemoryScheduler::new());
    let err = load_err(tmp.path(), &net);
    assert!(matches!(err, StorageError::UnknownVersion(ref v) if v == "9"), "{err}");
}

#[test]
fn marker_without_log_is_an_io_error() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join(VERSION_FILE), [4u8]).unwrap();
    let net = Arc::new(MemoryScheduler::new());
    match load_err(tmp.path(), &net) {
        StorageError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
        other => panic!("unexpected {other}"),
    }
}

#[test]
fn corrupt_log_fails_to_load() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join(VERSION_FILE), [4u8]).unwrap();
    fs::write(tmp.path().join(CURRENT_LOG_FILE), b"definitely not gzip").unwrap();
    let net = Arc::new(MemoryScheduler::new());
    let err = load_err(tmp.path(), &net);
    assert!(matches!(err, StorageError::Codec(_)), "{err}");
}

#[test]
fn lock_waits_are_reported() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("data");
    let net = Arc::new(MemoryScheduler::new());
    let timings = Arc::new(LockTimings::new());
    let stats: Arc<dyn LockingStats> = timings.clone();
    let model = load_model(&dir, &net, Some(stats)).unwrap();

    model.open_for_read().close();
    model.open_for_read().close();
    model.open_for_write().close().unwrap();
    let mut session = model.open_for_write();
    session.prefs_mut().republish_interval_millis = 1;
    session.close().unwrap();

    assert_eq!(timings.read_acquisitions.load(Ordering::Relaxed), 2);
    assert_eq!(timings.write_acquisitions.load(Ordering::Relaxed), 2);
    assert_eq!(timings.flushes.load(Ordering::Relaxed), 1);
    assert_eq!(timings.clean_closes.load(Ordering::Relaxed), 1);
    let json = timings.snapshot_json();
    assert_eq!(json["write"]["flushes"], 1);
}

#[test]
fn readers_share_the_lock() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("data");
    let net = Arc::new(MemoryScheduler::new());
    let model = Arc::new(load_model(&dir, &net, None).unwrap());

    let first = model.open_for_read();
    let handle = {
        let model = model.clone();
        std::thread::spawn(move || model.open_for_read().prefs().video_edge_pixel_max)
    };
    assert_eq!(handle.join().unwrap(), 1280);
    first.close();
}

#[test]
fn writer_excludes_readers_until_closed() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("data");
    let net = Arc::new(MemoryScheduler::new());
    let model = Arc::new(load_model(&dir, &net, None).unwrap());

    let mut session = model.open_for_write();
    session.prefs_mut().video_edge_pixel_max = 100;
    let reader = {
        let model = model.clone();
        std::thread::spawn(move || model.open_for_read().prefs().video_edge_pixel_max)
    };
    std::thread::sleep(std::time::Duration::from_millis(50));
    assert!(!reader.is_finished());
    session.close().unwrap();
    assert_eq!(reader.join().unwrap(), 100);
}
