/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! The storage model: one readers/writer lock over every projection, backed by
//! an opcode log that is rewritten whole whenever a write session changes
//! something.
//!
//! On-disk layout of the configuration directory:
//! - `version`: a single byte naming the format.
//! - `opcodes_v4.gzlog`: the current log.
//! - `opcodes_v3.gzlog`: a legacy log, replaced by a v4 log on first load.

mod config_fs;
mod instrumentation;
mod session;

pub use config_fs::{ConfigFileSystem, RealConfigFileSystem};
pub use instrumentation::{LockTimings, LockingStats};
pub use session::{ProjectionKind, ReadSession, TouchedProjections, WriteSession};

use crate::config::StorageConfig;
use crate::error::StorageError;
use crate::opcode::{LegacyContext, OpcodeReader, OpcodeWriter};
use crate::pin_cache_builder::PinCacheBuilder;
use crate::projection::Projections;
use crate::scheduler::NetworkScheduler;
use crate::transaction::StateResolver;
use anyhow::Context;
use cacophony_protocol::Cid;
use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tracing::{info, warn};

pub const VERSION_FILE: &str = "version";
pub const CURRENT_VERSION: u8 = 4;
pub const LEGACY_VERSION: u8 = 3;
pub const CURRENT_LOG_FILE: &str = "opcodes_v4.gzlog";
pub const LEGACY_LOG_FILE: &str = "opcodes_v3.gzlog";
/// Oldest release that can still migrate versions 1 and 2.
pub const LAST_RELEASE_FOR_V2: &str = "3.1";

pub struct StorageModel {
    fs: Box<dyn ConfigFileSystem>,
    network: Arc<dyn NetworkScheduler>,
    stats: Option<Arc<dyn LockingStats>>,
    state: RwLock<Projections>,
}

impl StorageModel {
    /// Loads (or creates) the storage in `fs`, rebuilding the pin cache from
    /// the network. Version errors are fatal and carry remediation text.
    pub fn load(
        fs: Box<dyn ConfigFileSystem>,
        network: Arc<dyn NetworkScheduler>,
        stats: Option<Arc<dyn LockingStats>>,
    ) -> Result<Self, StorageError> {
        let projections = if fs.directory_exists() {
            Self::load_existing(fs.as_ref(), network.as_ref())?
        } else {
            fs.create_directory()?;
            let projections = Projections::new();
            write_log(fs.as_ref(), &projections)?;
            fs.write_file(VERSION_FILE, &[CURRENT_VERSION])?;
            info!(dir = %fs.root().display(), "created new storage");
            projections
        };
        Ok(Self {
            fs,
            network,
            stats,
            state: RwLock::new(projections),
        })
    }

    /// Resolves the data directory from `config`, loads it and applies the
    /// optional purge-on-open.
    pub fn open(
        config: &StorageConfig,
        network: Arc<dyn NetworkScheduler>,
        stats: Option<Arc<dyn LockingStats>>,
    ) -> anyhow::Result<Self> {
        let dir = config.resolve_data_dir()?;
        let fs = Box::new(RealConfigFileSystem::new(&dir));
        let model = Self::load(fs, network, stats)
            .with_context(|| format!("open storage in {}", dir.display()))?;
        if config.explicit_cache_purge_on_open.unwrap_or(false) {
            let mut session = model.open_for_write();
            let budget = u64::try_from(session.prefs().explicit_cache_target_bytes).unwrap_or(0);
            session.purge_explicit_cache(budget);
            session.close().context("persist purged explicit cache")?;
        }
        Ok(model)
    }

    fn load_existing(
        fs: &dyn ConfigFileSystem,
        network: &dyn NetworkScheduler,
    ) -> Result<Projections, StorageError> {
        let version = match fs.read_file(VERSION_FILE)? {
            Some(bytes) => match bytes.as_slice() {
                [v] => *v,
                other => return Err(StorageError::UnknownVersion(format!("{other:?}"))),
            },
            None => return Err(StorageError::MissingVersionFile(fs.root().to_path_buf())),
        };
        match version {
            CURRENT_VERSION => {
                let mut projections = Projections::new();
                let log = read_log(fs, CURRENT_LOG_FILE)?;
                let mut count = 0usize;
                for opcode in OpcodeReader::new(log.as_slice()) {
                    opcode?.apply(&mut projections);
                    count += 1;
                }
                projections.pin_cache = PinCacheBuilder::new(network).build(&projections);
                info!(
                    version,
                    opcodes = count,
                    channels = projections.channels.len(),
                    followees = projections.followees.len(),
                    pins = projections.pin_cache.len(),
                    "storage loaded"
                );
                Ok(projections)
            }
            LEGACY_VERSION => Self::migrate_legacy(fs, network),
            1 | 2 => Err(StorageError::UnsupportedVersion {
                version,
                last_compatible_release: LAST_RELEASE_FOR_V2,
            }),
            other => Err(StorageError::UnknownVersion(other.to_string())),
        }
    }

    /// Replays a version 3 log, then writes the v4 log, the new marker and
    /// finally deletes the old log. Interrupting this just repeats it.
    fn migrate_legacy(
        fs: &dyn ConfigFileSystem,
        network: &dyn NetworkScheduler,
    ) -> Result<Projections, StorageError> {
        let mut projections = Projections::new();
        let log = read_log(fs, LEGACY_LOG_FILE)?;
        let mut ctx = LegacyContext::new(&mut projections);
        let mut count = 0usize;
        for opcode in OpcodeReader::new(log.as_slice()) {
            opcode?.apply_legacy(&mut ctx);
            count += 1;
        }
        let unpins = std::mem::take(&mut ctx.unpins_to_rationalize);
        projections.pin_cache = PinCacheBuilder::new(network).build(&projections);

        write_log(fs, &projections)?;
        fs.write_file(VERSION_FILE, &[CURRENT_VERSION])?;
        fs.delete_file(LEGACY_LOG_FILE)?;

        let mut unpinned = HashSet::new();
        for cid in unpins {
            if projections.pin_cache.is_pinned(&cid) || !unpinned.insert(cid.clone()) {
                continue;
            }
            if let Err(e) = network.unpin(&cid).get() {
                warn!(%cid, error = %e, "could not unpin dropped legacy entry");
            }
        }
        info!(
            opcodes = count,
            unpinned = unpinned.len(),
            pins = projections.pin_cache.len(),
            "migrated version 3 storage to version 4"
        );
        Ok(projections)
    }

    fn lock_write(&self) -> std::sync::RwLockWriteGuard<'_, Projections> {
        let started = Instant::now();
        let guard = self.state.write().unwrap();
        if let Some(stats) = &self.stats {
            stats.write_lock_acquired(started.elapsed());
        }
        guard
    }

    pub fn open_for_read(&self) -> ReadSession<'_> {
        let started = Instant::now();
        let guard = self.state.read().unwrap();
        if let Some(stats) = &self.stats {
            stats.read_lock_acquired(started.elapsed());
        }
        ReadSession::new(guard)
    }

    pub fn open_for_write(&self) -> WriteSession<'_> {
        WriteSession::new(self, self.lock_write())
    }

    /// The current pinned set, as a concurrent transaction starts from.
    pub fn snapshot_pinned_set(&self) -> HashSet<Cid> {
        self.lock_write().pin_cache.snapshot_pinned_set()
    }

    pub fn network(&self) -> &Arc<dyn NetworkScheduler> {
        &self.network
    }

    pub(crate) fn stats(&self) -> Option<&Arc<dyn LockingStats>> {
        self.stats.as_ref()
    }

    /// Rewrites the whole log. Returns the compressed size.
    pub(crate) fn persist(&self, projections: &Projections) -> Result<usize, StorageError> {
        write_log(self.fs.as_ref(), projections)
    }
}

impl StateResolver for StorageModel {
    fn commit_transaction_pin_changes(
        &self,
        deltas: &HashMap<Cid, i64>,
        owned_pins: &HashSet<Cid>,
    ) -> Result<Vec<Cid>, StorageError> {
        let mut session = self.open_for_write();
        let unpinned = session.commit_transaction_pin_changes(deltas, owned_pins);
        session.close()?;
        Ok(unpinned)
    }
}

fn read_log(fs: &dyn ConfigFileSystem, name: &str) -> Result<Vec<u8>, StorageError> {
    fs.read_file(name)?.ok_or_else(|| {
        StorageError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} has a version marker but no {name}", fs.root().display()),
        ))
    })
}

fn write_log(fs: &dyn ConfigFileSystem, projections: &Projections) -> Result<usize, StorageError> {
    let mut writer = OpcodeWriter::new(Vec::new());
    projections.write_opcodes(&mut writer)?;
    let bytes = writer.finish()?;
    fs.write_file(CURRENT_LOG_FILE, &bytes)?;
    Ok(bytes.len())
}
