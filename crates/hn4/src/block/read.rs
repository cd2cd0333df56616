// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Block read pipeline: probe, validate, decode, heal.
//!
//! Candidates are probed in hint-first ladder order; the first one that
//! validates end-to-end wins and probing stops. When nothing validates,
//! the surfaced error is the worst one seen (see
//! [`BlockError::severity`]), so a hardware fault is never washed out by a
//! later "this block is empty".
//!
//! Validation order per candidate: bitmap, poisoned transfer (one retry),
//! ghost detection, magic, header CRC, comp-meta, owner id, generation
//! (strict low-32 equality, past and future both rejected), logical index,
//! payload CRC over the full slot, then decode. Nothing later in the chain
//! is trusted before everything earlier has held.
//!
//! After a success at a deep orbit, auto-medic sweeps the orbits *below*
//! the winner and rewrites rotted replicas from the winning bytes —
//! selectively: only for uncompressed payloads, only with write
//! permission, never under the power-constrained profile, and never for a
//! block owned by someone else.

use crate::anchor::{perm, Anchor};
use crate::ballistic::ORBIT_HORIZON;
use crate::bitmap::BitState;
use crate::block::{
    header_crc_of, BlockHeader, ALGO_RAW, ALGO_TCC, BLOCK_HEADER_SIZE, BLOCK_MAGIC,
};
use crate::codec;
use crate::error::{BlockError, ReadOutcome, Result};
use crate::integrity::{fill_poison, is_ghost, payload_crc};
use crate::qmask::BlockQuality;
use crate::volume::Volume;

/// Successful candidate probe.
struct ProbeHit {
    logical: usize,
    compressed: bool,
}

/// Outcome of probing one physical candidate.
enum Probe {
    Hit(ProbeHit),
    /// Bitmap clear: nothing was ever committed here.
    Sparse,
    /// Horizon scan only: the slot is validly owned by a different block.
    Occupied,
    Fail(BlockError),
}

impl Volume {
    /// Read one logical block of `anchor` into `dst`.
    ///
    /// `dst` must be at least the payload capacity. On success the payload
    /// occupies the logical prefix and the rest of `dst` is zeroed; a
    /// sparse result zeroes all of `dst`.
    pub fn read_block(
        &self,
        anchor: &Anchor,
        block_idx: u64,
        dst: &mut [u8],
        session_perms: u32,
    ) -> Result<ReadOutcome> {
        if !anchor.is_valid() {
            return Err(BlockError::AccessDenied("anchor is not valid"));
        }
        if !anchor.readable(session_perms) {
            return Err(BlockError::AccessDenied("read permission missing"));
        }
        if dst.len() < self.payload_capacity() {
            return Err(BlockError::InvalidArgument("destination below payload capacity"));
        }

        if anchor.is_horizon() {
            return self.read_horizon(anchor, block_idx, dst);
        }

        // Hint-first candidate ladder, deduplicated by physical address
        // (degenerate addressing parameters can fold orbits together).
        let mut orbits = Vec::with_capacity(usize::from(self.policy.k_max) + 2);
        orbits.push(anchor.orbit_hint(block_idx).min(self.policy.k_max));
        for k in 0..=self.policy.k_max {
            if !orbits.contains(&k) {
                orbits.push(k);
            }
        }
        let mut candidates: Vec<(u8, u64)> = Vec::with_capacity(orbits.len());
        for k in orbits {
            if let Some(lba) = self.block_lba(anchor, block_idx, k) {
                if !candidates.iter().any(|&(_, existing)| existing == lba) {
                    candidates.push((k, lba));
                }
            }
        }
        if candidates.is_empty() {
            return Err(BlockError::InvalidArgument("block index stride overflow"));
        }
        let ladder_width = usize::from(self.policy.k_max) + 1;
        if candidates.len() * 2 < ladder_width {
            self.health.trajectory_collapse();
            tracing::debug!(
                block_idx,
                candidates = candidates.len(),
                ladder_width,
                "trajectory collapse"
            );
        }
        if self.policy.prefetch {
            self.dev.prefetch(self.sector_of(candidates[0].1), self.spb);
        }

        let mut block = vec![0u8; self.geo.block_size as usize];
        let mut worst: Option<BlockError> = None;
        let mut dirty = false;
        let mut hit: Option<(u8, u64, ProbeHit)> = None;

        for &(k, lba) in &candidates {
            match self.probe_candidate(anchor, block_idx, lba, &mut block, dst, &mut dirty, false)
            {
                Probe::Hit(h) => {
                    hit = Some((k, lba, h));
                    break;
                }
                Probe::Sparse | Probe::Occupied => {}
                Probe::Fail(e) => {
                    worst = Some(worse_of(worst.take(), e));
                }
            }
        }

        match hit {
            Some((k, lba, h)) => {
                dst[h.logical..].fill(0);
                self.health.block_read();
                self.medic_sweep(anchor, block_idx, k, lba, &block, h.compressed);
                Ok(ReadOutcome::Data { len: h.logical, orbit: k })
            }
            None => self.finish_miss(worst, dirty, dst),
        }
    }

    /// Horizon-mode read: replay the allocator's linear walk from the
    /// block's natural position. Slots validly owned by other blocks are
    /// occupancy, not errors; the walk ends at the first slot the
    /// allocator would have used, which is where an unwritten block proves
    /// itself sparse.
    fn read_horizon(&self, anchor: &Anchor, block_idx: u64, dst: &mut [u8]) -> Result<ReadOutcome> {
        let Some(base) = self.block_lba(anchor, block_idx, ORBIT_HORIZON) else {
            dst.fill(0);
            return Ok(ReadOutcome::Sparse);
        };

        let mut block = vec![0u8; self.geo.block_size as usize];
        let mut worst: Option<BlockError> = None;
        let mut dirty = false;

        for lba in base..self.geo.total_blocks {
            match self.bitmap.test(lba) {
                BitState::Clear => {
                    if self.qmask.get(lba) == BlockQuality::Toxic {
                        // The allocator would have skipped it; so do we.
                        continue;
                    }
                    break;
                }
                BitState::Corrupt => {
                    worst = Some(worse_of(worst.take(), BlockError::BitmapCorrupt { lba }));
                    break;
                }
                BitState::Set => {}
            }
            match self.probe_candidate(anchor, block_idx, lba, &mut block, dst, &mut dirty, true) {
                Probe::Hit(h) => {
                    dst[h.logical..].fill(0);
                    self.health.block_read();
                    return Ok(ReadOutcome::Data { len: h.logical, orbit: ORBIT_HORIZON });
                }
                Probe::Sparse | Probe::Occupied => {}
                Probe::Fail(e) => {
                    worst = Some(worse_of(worst.take(), e));
                }
            }
        }
        self.finish_miss(worst, dirty, dst)
    }

    fn finish_miss(
        &self,
        worst: Option<BlockError>,
        dirty: bool,
        dst: &mut [u8],
    ) -> Result<ReadOutcome> {
        match worst {
            Some(e) => {
                if dirty {
                    // Partial decode output must not leak.
                    dst.fill(0);
                }
                Err(e)
            }
            None => {
                dst.fill(0);
                Ok(ReadOutcome::Sparse)
            }
        }
    }

    /// Validate one physical candidate end to end. On a hit the payload has
    /// been placed into `dst` (tail zeroing is the caller's step).
    #[allow(clippy::too_many_arguments)]
    fn probe_candidate(
        &self,
        anchor: &Anchor,
        block_idx: u64,
        lba: u64,
        block: &mut [u8],
        dst: &mut [u8],
        dirty: &mut bool,
        horizon: bool,
    ) -> Probe {
        if !horizon {
            match self.bitmap.test(lba) {
                BitState::Clear => return Probe::Sparse,
                BitState::Corrupt => return Probe::Fail(BlockError::BitmapCorrupt { lba }),
                BitState::Set => {}
            }
        }

        if let Some(fail) = self.read_with_retry(lba, block) {
            return Probe::Fail(fail);
        }

        let header = BlockHeader::read_from(&block[..BLOCK_HEADER_SIZE]);
        if header.magic != BLOCK_MAGIC {
            return Probe::Fail(BlockError::PhantomBlock { lba });
        }
        if header.header_crc != header_crc_of(block) {
            self.health.crc_failure();
            return Probe::Fail(BlockError::HeaderRot { lba });
        }
        let algo = header.algo();
        if algo != ALGO_RAW && algo != ALGO_TCC {
            return Probe::Fail(BlockError::AlgoUnknown { lba, algo });
        }
        let stored = header.stored_len();
        let capacity = self.payload_capacity();
        if stored > capacity {
            return Probe::Fail(BlockError::HeaderRot { lba });
        }

        let skew = || BlockError::GenerationSkew {
            lba,
            disk: header.generation_low(),
            anchor: anchor.write_gen,
        };
        if horizon {
            // Linear-region walk: a slot validly owned by another identity
            // or another logical index is occupancy, not an error, and must
            // be classified before the generation is even considered.
            if header.well_id != anchor.seed_id || header.seq_index != block_idx {
                return Probe::Occupied;
            }
            if header.generation_low() != anchor.write_gen {
                return Probe::Fail(skew());
            }
        } else {
            if header.well_id != anchor.seed_id {
                return Probe::Fail(BlockError::IdMismatch { lba });
            }
            if header.generation_low() != anchor.write_gen {
                return Probe::Fail(skew());
            }
            if header.seq_index != block_idx {
                return Probe::Fail(BlockError::PhantomBlock { lba });
            }
        }

        if payload_crc(&block[BLOCK_HEADER_SIZE..]) != header.data_crc {
            self.health.crc_failure();
            return Probe::Fail(BlockError::PayloadRot { lba, source: None });
        }

        if algo == ALGO_RAW {
            dst[..stored].copy_from_slice(&block[BLOCK_HEADER_SIZE..BLOCK_HEADER_SIZE + stored]);
            return Probe::Hit(ProbeHit { logical: stored, compressed: false });
        }

        *dirty = true;
        match codec::decompress(&block[BLOCK_HEADER_SIZE..BLOCK_HEADER_SIZE + stored], &mut dst[..capacity]) {
            Ok(logical) => Probe::Hit(ProbeHit { logical, compressed: true }),
            Err(e) => {
                tracing::debug!(lba, error = %e, "payload expansion rejected");
                Probe::Fail(BlockError::PayloadRot { lba, source: Some(e) })
            }
        }
    }

    /// Poison-filled device read with a single retry; ghost transfers count
    /// as hardware failures.
    fn read_with_retry(&self, lba: u64, block: &mut [u8]) -> Option<BlockError> {
        let mut last: Option<BlockError> = None;
        for attempt in 0..2 {
            fill_poison(block);
            match self.read_block_raw(lba, block) {
                Ok(()) if !is_ghost(block) => return None,
                Ok(()) => {
                    self.health.ghost_read();
                    tracing::warn!(lba, attempt, "ghost read: buffer still poisoned");
                    last = Some(BlockError::HwIo { lba, source: None });
                }
                Err(e) => {
                    last = Some(BlockError::HwIo { lba, source: Some(e) });
                }
            }
            if attempt == 0 {
                self.health.hw_retry();
            }
        }
        last
    }

    /// Sweep the orbits below the winning one and rewrite rotted replicas
    /// from the winning block, verbatim. Best-effort throughout: nothing
    /// here can fail the read that triggered it.
    fn medic_sweep(
        &self,
        anchor: &Anchor,
        block_idx: u64,
        k_good: u8,
        winner_lba: u64,
        good_block: &[u8],
        compressed: bool,
    ) {
        if k_good == 0 || k_good == ORBIT_HORIZON || !self.policy.auto_medic {
            return;
        }
        if compressed {
            // Repair never decompresses and recompresses.
            return;
        }
        if anchor.permissions & perm::IMMUTABLE != 0 || anchor.permissions & perm::WRITE == 0 {
            return;
        }

        let mut probe = vec![0u8; self.geo.block_size as usize];
        for kp in 0..k_good {
            let Some(lba) = self.block_lba(anchor, block_idx, kp) else {
                continue;
            };
            if lba == winner_lba || self.bitmap.test(lba) != BitState::Set {
                continue;
            }
            if self.read_with_retry(lba, &mut probe).is_some() {
                // Unreachable media is not "rot"; leave it for the scrubber.
                continue;
            }
            if !self.replica_is_healable(anchor, block_idx, &probe, lba) {
                continue;
            }
            match self.write_block_raw(lba, good_block) {
                Ok(()) => {
                    self.health.heal();
                    tracing::debug!(lba, kp, "rotted replica healed from good orbit");
                }
                Err(e) => {
                    tracing::debug!(lba, error = %e, "heal attempt failed");
                }
            }
        }
    }

    /// Whether a lower-orbit replica's damage class qualifies for repair:
    /// phantom blocks and payload rot do; foreign owners, generation skew
    /// and header rot do not.
    fn replica_is_healable(
        &self,
        anchor: &Anchor,
        block_idx: u64,
        raw: &[u8],
        lba: u64,
    ) -> bool {
        let header = BlockHeader::read_from(&raw[..BLOCK_HEADER_SIZE]);
        if header.magic != BLOCK_MAGIC {
            // Garbage where a replica should be: misdirected write.
            return true;
        }
        if header.header_crc != header_crc_of(raw) {
            return false;
        }
        if header.well_id != anchor.seed_id {
            // Another tenant's block is never touched.
            return false;
        }
        if header.generation_low() != anchor.write_gen {
            return false;
        }
        if header.seq_index != block_idx {
            tracing::debug!(lba, "misdirected replica detected");
            return true;
        }
        // Ours, current generation: rot iff the payload CRC fails.
        payload_crc(&raw[BLOCK_HEADER_SIZE..]) != header.data_crc
    }
}

fn worse_of(current: Option<BlockError>, new: BlockError) -> BlockError {
    match current {
        Some(old) if old.severity() >= new.severity() => old,
        _ => new,
    }
}
