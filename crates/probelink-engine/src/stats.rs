//! Engine counters.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Running counters, updated lock-free by the engine tasks.
#[derive(Debug, Default)]
pub struct EngineStats {
    bytes_read: AtomicU64,
    lines: AtomicU64,
    records: AtomicU64,
    binaries: AtomicU64,
    read_errors: AtomicU64,
    commands_sent: AtomicU64,
    connects: AtomicU64,
}

/// Point-in-time copy of [`EngineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub bytes_read: u64,
    pub lines: u64,
    pub records: u64,
    pub binaries: u64,
    pub read_errors: u64,
    pub commands_sent: u64,
    pub connects: u64,
}

impl EngineStats {
    pub(crate) fn bytes(&self, n: usize) {
        self.bytes_read.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn line(&self) {
        self.lines.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dispatched(&self) {
        self.records.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn binary(&self) {
        self.binaries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn read_error(&self) {
        self.read_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn command_sent(&self) {
        self.commands_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn connected(&self) {
        self.connects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            lines: self.lines.load(Ordering::Relaxed),
            records: self.records.load(Ordering::Relaxed),
            binaries: self.binaries.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
            commands_sent: self.commands_sent.load(Ordering::Relaxed),
            connects: self.connects.load(Ordering::Relaxed),
        }
    }
}
