/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Prints the opcode log of a data directory as one JSON object per line.
//!
//! Usage: `cacophony_dump_log [config.json]`. The data directory comes from
//! the config file, `CACOPHONY_DATA_DIR` or the platform default.

use anyhow::{bail, Context};
use cacophony_core::config::StorageConfig;
use cacophony_core::opcode::OpcodeReader;
use cacophony_core::storage::{
    ConfigFileSystem, RealConfigFileSystem, CURRENT_LOG_FILE, CURRENT_VERSION, LEGACY_LOG_FILE,
    LEGACY_VERSION, VERSION_FILE,
};
use std::io::Write;
use tracing::info;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("info".parse().unwrap()),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => StorageConfig::load(&path)?,
        None => StorageConfig::default(),
    };
    let dir = config.resolve_data_dir()?;
    let fs = RealConfigFileSystem::new(&dir);

    let version = fs
        .read_file(VERSION_FILE)
        .with_context(|| format!("read version in {}", dir.display()))?
        .with_context(|| format!("{} has no version file", dir.display()))?;
    let log_name = match version.as_slice() {
        [v] if *v == CURRENT_VERSION => CURRENT_LOG_FILE,
        [v] if *v == LEGACY_VERSION => LEGACY_LOG_FILE,
        other => bail!("cannot dump data version {other:?}"),
    };
    let log = fs
        .read_file(log_name)?
        .with_context(|| format!("{} missing in {}", log_name, dir.display()))?;
    info!(dir = %dir.display(), log = log_name, "dumping opcode log");

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut count = 0usize;
    for opcode in OpcodeReader::new(log.as_slice()) {
        let opcode = opcode.with_context(|| format!("decode opcode #{count}"))?;
        serde_json::to_writer(&mut out, &opcode)?;
        out.write_all(b"\n")?;
        count += 1;
    }
    info!(opcodes = count, "done");
    Ok(())
}
