/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::scheduler::NetworkError;
use cacophony_protocol::ProtocolError;
use std::path::PathBuf;

/// Failure decoding or encoding the opcode log.
#[derive(Debug, thiserror::Error)]
pub enum OpcodeError {
    #[error("unknown opcode ordinal {0}")]
    UnknownOrdinal(u32),
    #[error("opcode frame truncated: expected {expected} payload bytes, got {found}")]
    Truncated { expected: usize, found: usize },
    #[error("malformed opcode payload: {0}")]
    Malformed(String),
    #[error(transparent)]
    Identifier(#[from] ProtocolError),
    #[error("opcode log i/o: {0}")]
    Io(#[from] std::io::Error),
}

/// Startup and persistence failures of the storage model.
///
/// The display text is what a user sees, so version errors carry remediation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("data directory {0} exists but has no version file; it is not a Cacophony data directory")]
    MissingVersionFile(PathBuf),
    #[error("unknown data version {0}; this data was written by a newer or foreign program")]
    UnknownVersion(String),
    #[error(
        "data version {version} is no longer supported: open it once with Cacophony {last_compatible_release} to migrate it first"
    )]
    UnsupportedVersion {
        version: u8,
        last_compatible_release: &'static str,
    },
    #[error("storage i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Codec(#[from] OpcodeError),
    #[error(transparent)]
    Network(#[from] NetworkError),
}
