// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Volume health counters.
//!
//! Relaxed atomic increments on the hot path, snapshot on demand. The
//! counters carry no ordering relationship with each other or with the
//! operations that bump them; they are operator telemetry, not state.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters owned by a volume handle.
#[derive(Debug, Default)]
pub struct HealthCounters {
    crc_failures: AtomicU64,
    heal_count: AtomicU64,
    trajectory_collapses: AtomicU64,
    taints: AtomicU64,
    hw_retries: AtomicU64,
    ghost_reads: AtomicU64,
    blocks_written: AtomicU64,
    blocks_read: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthSnapshot {
    /// Header or payload CRC mismatches observed by reads.
    pub crc_failures: u64,
    /// Rotted replicas rewritten from a good orbit.
    pub heal_count: u64,
    /// Candidate ladders that deduplicated to under half their width.
    pub trajectory_collapses: u64,
    /// Blocks demoted below GOOD by quality administration.
    pub taints: u64,
    /// Device reads retried after a transfer failure.
    pub hw_retries: u64,
    /// Reads whose buffer stayed poisoned (silent DMA failure).
    pub ghost_reads: u64,
    /// Blocks committed.
    pub blocks_written: u64,
    /// Blocks successfully read.
    pub blocks_read: u64,
}

impl HealthCounters {
    pub(crate) fn crc_failure(&self) {
        self.crc_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn heal(&self) {
        self.heal_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn trajectory_collapse(&self) {
        self.trajectory_collapses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn taint(&self) {
        self.taints.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn hw_retry(&self) {
        self.hw_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn ghost_read(&self) {
        self.ghost_reads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn block_written(&self) {
        self.blocks_written.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn block_read(&self) {
        self.blocks_read.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the counters.
    #[must_use]
    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            crc_failures: self.crc_failures.load(Ordering::Relaxed),
            heal_count: self.heal_count.load(Ordering::Relaxed),
            trajectory_collapses: self.trajectory_collapses.load(Ordering::Relaxed),
            taints: self.taints.load(Ordering::Relaxed),
            hw_retries: self.hw_retries.load(Ordering::Relaxed),
            ghost_reads: self.ghost_reads.load(Ordering::Relaxed),
            blocks_written: self.blocks_written.load(Ordering::Relaxed),
            blocks_read: self.blocks_read.load(Ordering::Relaxed),
        }
    }
}
