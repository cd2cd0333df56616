// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Block write pipeline: compress, place, seal, commit, eclipse.
//!
//! The commit sequence is fixed: the allocator reserves the bitmap bit, the
//! sealed block image goes to the device, and only then is the anchor
//! mutated (generation bump, orbit hint, horizon flag). A device failure
//! mid-sequence releases the reservation and leaves the anchor untouched.
//! Finally any stale shadow of this block at a lower orbit is eclipsed —
//! its bitmap bit cleared; the disk bytes can stay, unreachable behind the
//! generation check.

use crate::anchor::{class, Anchor};
use crate::ballistic::ORBIT_HORIZON;
use crate::bitmap::BitState;
use crate::block::{
    header_crc_of, probe_header_bytes, BlockHeader, HeaderProbe, ALGO_RAW, ALGO_TCC,
    BLOCK_HEADER_SIZE, BLOCK_MAGIC, LEN_HARD_CAP,
};
use crate::codec;
use crate::error::{BlockError, Result};
use crate::integrity::payload_crc;
use crate::volume::Volume;

impl Volume {
    /// Write one logical block of `anchor`.
    ///
    /// `src` may be any length up to the payload capacity; the logical
    /// length rides in the header and the read side zero-fills beyond it.
    /// On success the anchor's generation has advanced and its orbit
    /// hint/horizon state reflects the placement.
    pub fn write_block(
        &self,
        anchor: &mut Anchor,
        block_idx: u64,
        src: &[u8],
        session_perms: u32,
    ) -> Result<()> {
        if !anchor.is_valid() {
            return Err(BlockError::AccessDenied("anchor is not valid"));
        }
        if !anchor.writable(session_perms) {
            return Err(BlockError::AccessDenied("write permission missing"));
        }
        let capacity = self.payload_capacity();
        if src.len() > capacity || src.len() > LEN_HARD_CAP {
            return Err(BlockError::InvalidArgument("payload exceeds block capacity"));
        }

        // Compression attempt. Ineffective output (or one that cannot fit
        // the slot) falls back to raw without failing the write.
        let mut packed = Vec::new();
        let (algo, stored): (u8, &[u8]) =
            if (anchor.wants_compression() || self.policy.compress_default) && !src.is_empty() {
                packed.resize(capacity, 0);
                match codec::compress(src, &mut packed, &self.tuning) {
                    Ok(n) if n < src.len() => {
                        packed.truncate(n);
                        (ALGO_TCC, &packed)
                    }
                    _ => (ALGO_RAW, src),
                }
            } else {
                (ALGO_RAW, src)
            };

        let (lba, k) = self.alloc_block(anchor, block_idx)?;
        let next_gen = anchor.write_gen.wrapping_add(1);

        // Assemble the sealed block image: header, payload, zero tail. The
        // data CRC covers the whole slot, padding included.
        let mut block = vec![0u8; self.geo.block_size as usize];
        block[BLOCK_HEADER_SIZE..BLOCK_HEADER_SIZE + stored.len()].copy_from_slice(stored);
        let mut header = BlockHeader {
            magic: BLOCK_MAGIC,
            well_id: anchor.seed_id,
            generation: u64::from(next_gen),
            seq_index: block_idx,
            comp_meta: BlockHeader::pack_comp_meta(stored.len(), algo),
            data_crc: payload_crc(&block[BLOCK_HEADER_SIZE..]),
            header_crc: 0,
        };
        header.write_to(&mut block[..BLOCK_HEADER_SIZE]);
        header.header_crc = header_crc_of(&block);
        header.write_to(&mut block[..BLOCK_HEADER_SIZE]);

        if let Err(e) = self.write_block_raw(lba, &block) {
            // Release the reservation; the anchor never saw this write.
            let _ = self.bitmap.clear(lba);
            return Err(BlockError::HwIo { lba, source: Some(e) });
        }

        anchor.write_gen = next_gen;
        if k == ORBIT_HORIZON {
            anchor.data_class |= class::HORIZON;
        } else {
            anchor.set_orbit_hint(block_idx, k);
        }
        self.health.block_written();
        tracing::trace!(lba, k, block_idx, gen = next_gen, algo, "block committed");

        self.eclipse_shadows(anchor, block_idx, k, lba, next_gen);
        Ok(())
    }

    /// Clear the bitmap bits of this block's stale replicas below the
    /// committed orbit. Only positively identified shadows are touched:
    /// valid header, same owner, same logical index, older generation.
    /// Best-effort; a shadow that survives is fenced off by the generation
    /// check anyway.
    fn eclipse_shadows(
        &self,
        anchor: &Anchor,
        block_idx: u64,
        k: u8,
        committed_lba: u64,
        new_gen: u32,
    ) {
        let mut sector = vec![0u8; self.dev.caps().logical_block_size as usize];

        let mut eclipse_one = |lba: u64| {
            if lba == committed_lba || self.bitmap.test(lba) != BitState::Set {
                return;
            }
            if self.read_header_sector(lba, &mut sector).is_err() {
                return;
            }
            if probe_header_bytes(&sector) != HeaderProbe::Valid {
                return;
            }
            let header = BlockHeader::read_from(&sector);
            if header.well_id == anchor.seed_id
                && header.seq_index == block_idx
                && header.generation_low() != new_gen
            {
                let _ = self.bitmap.clear(lba);
                tracing::trace!(lba, "stale shadow eclipsed");
            }
        };

        // Ballistic shadows below the committed orbit (all of them when the
        // write spilled to Horizon). Stale copies inside the horizon region
        // itself are never eclipsed: clearing one would punch a hole into
        // the linear walk ahead of the live copy and the read-side replay
        // would stop there. The generation check fences them instead, and
        // reclamation belongs to the layer that owns free_block.
        let ladder_top = if k == ORBIT_HORIZON { self.policy.k_max + 1 } else { k };
        for kp in 0..ladder_top {
            if let Some(lba) = self.block_lba(anchor, block_idx, kp) {
                eclipse_one(lba);
            }
        }
    }
}
