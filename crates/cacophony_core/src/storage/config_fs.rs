/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! The configuration directory and its crash-safe file replacement.
//!
//! A write goes to `<name>.temp`, then the old `<name>` is removed and the
//! temp file renamed over it. On read, a lone temp file is a finished write
//! that crashed before the rename, so it is promoted. When both exist the
//! crash happened before the old file was removed, so the temp is discarded.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

const TEMP_SUFFIX: &str = ".temp";

pub trait ConfigFileSystem: Send + Sync {
    fn root(&self) -> &Path;
    fn directory_exists(&self) -> bool;
    fn create_directory(&self) -> io::Result<()>;
    /// `None` when neither the file nor a leftover temp file exists.
    fn read_file(&self, name: &str) -> io::Result<Option<Vec<u8>>>;
    fn write_file(&self, name: &str, bytes: &[u8]) -> io::Result<()>;
    fn delete_file(&self, name: &str) -> io::Result<()>;
}

pub struct RealConfigFileSystem {
    root: PathBuf,
}

impl RealConfigFileSystem {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn paths(&self, name: &str) -> (PathBuf, PathBuf) {
        (
            self.root.join(name),
            self.root.join(format!("{name}{TEMP_SUFFIX}")),
        )
    }
}

impl ConfigFileSystem for RealConfigFileSystem {
    fn root(&self) -> &Path {
        &self.root
    }

    fn directory_exists(&self) -> bool {
        self.root.is_dir()
    }

    fn create_directory(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root)
    }

    fn read_file(&self, name: &str) -> io::Result<Option<Vec<u8>>> {
        let (final_path, temp_path) = self.paths(name);
        match (final_path.exists(), temp_path.exists()) {
            (true, true) => {
                warn!(file = %final_path.display(), "discarding incomplete replacement");
                fs::remove_file(&temp_path)?;
            }
            (false, true) => {
                warn!(file = %final_path.display(), "promoting completed replacement");
                fs::rename(&temp_path, &final_path)?;
            }
            (true, false) => {}
            (false, false) => return Ok(None),
        }
        fs::read(&final_path).map(Some)
    }

    fn write_file(&self, name: &str, bytes: &[u8]) -> io::Result<()> {
        let (final_path, temp_path) = self.paths(name);
        {
            let mut f = fs::File::create(&temp_path)?;
            f.write_all(bytes)?;
            f.sync_all()?;
        }
        if final_path.exists() {
            fs::remove_file(&final_path)?;
        }
        fs::rename(&temp_path, &final_path)
    }

    fn delete_file(&self, name: &str) -> io::Result<()> {
        let (final_path, temp_path) = self.paths(name);
        for path in [final_path, temp_path] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_replaces_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let fs_ = RealConfigFileSystem::new(dir.path());
        fs_.write_file("log", b"one").unwrap();
        fs_.write_file("log", b"two").unwrap();
        assert_eq!(fs_.read_file("log").unwrap(), Some(b"two".to_vec()));
        assert!(!dir.path().join("log.temp").exists());
    }

    #[test]
    fn lone_temp_is_promoted() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("log.temp"), b"new").unwrap();
        let fs_ = RealConfigFileSystem::new(dir.path());
        assert_eq!(fs_.read_file("log").unwrap(), Some(b"new".to_vec()));
        assert!(dir.path().join("log").exists());
        assert!(!dir.path().join("log.temp").exists());
    }

    #[test]
    fn temp_beside_final_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("log"), b"old").unwrap();
        fs::write(dir.path().join("log.temp"), b"half").unwrap();
        let fs_ = RealConfigFileSystem::new(dir.path());
        assert_eq!(fs_.read_file("log").unwrap(), Some(b"old".to_vec()));
        assert!(!dir.path().join("log.temp").exists());
    }

    #[test]
    fn missing_file_reads_as_none_and_deletes_quietly() {
        let dir = tempfile::tempdir().unwrap();
        let fs_ = RealConfigFileSystem::new(dir.path());
        assert_eq!(fs_.read_file("absent").unwrap(), None);
        fs_.delete_file("absent").unwrap();
    }
}
