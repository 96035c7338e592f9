/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Receives how long callers waited for the storage lock.
pub trait LockingStats: Send + Sync {
    fn read_lock_acquired(&self, waited: Duration);
    fn write_lock_acquired(&self, waited: Duration);
    /// Called after a write session closes; `flushed` is false when nothing was touched.
    fn write_session_closed(&self, flushed: bool);
}

#[derive(Default)]
pub struct LockTimings {
    pub read_acquisitions: AtomicU64,
    pub read_wait_us_total: AtomicU64,
    pub read_wait_us_max: AtomicU64,
    pub write_acquisitions: AtomicU64,
    pub write_wait_us_total: AtomicU64,
    pub write_wait_us_max: AtomicU64,
    pub flushes: AtomicU64,
    pub clean_closes: AtomicU64,
}

fn micros(d: Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX)
}

impl LockTimings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot_json(&self) -> serde_json::Value {
        serde_json::json!({
            "read": {
                "acquisitions": self.read_acquisitions.load(Ordering::Relaxed),
                "wait_us_total": self.read_wait_us_total.load(Ordering::Relaxed),
                "wait_us_max": self.read_wait_us_max.load(Ordering::Relaxed),
            },
            "write": {
                "acquisitions": self.write_acquisitions.load(Ordering::Relaxed),
                "wait_us_total": self.write_wait_us_total.load(Ordering::Relaxed),
                "wait_us_max": self.write_wait_us_max.load(Ordering::Relaxed),
                "flushes": self.flushes.load(Ordering::Relaxed),
                "clean_closes": self.clean_closes.load(Ordering::Relaxed),
            },
        })
    }
}

impl LockingStats for LockTimings {
    fn read_lock_acquired(&self, waited: Duration) {
        let us = micros(waited);
        self.read_acquisitions.fetch_add(1, Ordering::Relaxed);
        self.read_wait_us_total.fetch_add(us, Ordering::Relaxed);
        self.read_wait_us_max.fetch_max(us, Ordering::Relaxed);
    }

    fn write_lock_acquired(&self, waited: Duration) {
        let us = micros(waited);
        self.write_acquisitions.fetch_add(1, Ordering::Relaxed);
        self.write_wait_us_total.fetch_add(us, Ordering::Relaxed);
        self.write_wait_us_max.fetch_max(us, Ordering::Relaxed);
    }

    fn write_session_closed(&self, flushed: bool) {
        if flushed {
            self.flushes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.clean_closes.fetch_add(1, Ordering::Relaxed);
        }
    }
}
