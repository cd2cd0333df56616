// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! K-ladder allocation.
//!
//! For each allocation the ladder walks orbits `k = 0..=k_max` in order and
//! commits the first LBA that is inside the volume, not TOXIC, and whose
//! bitmap bit is clear. The walk is stateless: freeing a low orbit and
//! retrying returns that same orbit — there is no ratchet remembering how
//! deep previous allocations went, and one anchor's ladder never influences
//! another's (the bitmap is the only shared state).
//!
//! When the ladder is exhausted, placement spills into the Horizon region:
//! a linear scan from `horizon_start + (N << M)` that mirrors what the
//! reader will later replay. Profiles without Horizon collapse instead.

use crate::anchor::Anchor;
use crate::ballistic::{ORBIT_HORIZON, ORBIT_MAX};
use crate::bitmap::BitState;
use crate::error::{BlockError, Result};
use crate::qmask::BlockQuality;
use crate::volume::Volume;

impl Volume {
    /// Reserve a physical block for `(anchor, block_idx)`.
    ///
    /// Returns the committed `(lba, k)`; `k == 15` denotes a Horizon
    /// placement. The bitmap bit is set on return; the caller either writes
    /// the block or frees the reservation.
    pub fn alloc_block(&self, anchor: &Anchor, block_idx: u64) -> Result<(u64, u8)> {
        // Horizon-mode anchors bypass the ladder entirely.
        if anchor.is_horizon() {
            if !self.policy.horizon {
                return Err(BlockError::GravityCollapse);
            }
            return self.alloc_horizon(anchor, block_idx);
        }

        // A stride that cannot be represented fails every orbit identically.
        if self.block_lba(anchor, block_idx, 0).is_none() {
            return Err(BlockError::InvalidArgument("block index stride overflow"));
        }

        for k in 0..=self.policy.k_max.min(ORBIT_MAX) {
            let lba = match self.block_lba(anchor, block_idx, k) {
                Some(lba) => lba,
                None => continue,
            };
            if self.qmask.get(lba) == BlockQuality::Toxic {
                continue;
            }
            match self.bitmap.test_and_set(lba) {
                BitState::Clear => {
                    tracing::trace!(lba, k, block_idx, "ballistic placement");
                    return Ok((lba, k));
                }
                BitState::Set => continue,
                BitState::Corrupt => return Err(BlockError::BitmapCorrupt { lba }),
            }
        }

        if !self.policy.horizon {
            return Err(BlockError::GravityCollapse);
        }
        self.alloc_horizon(anchor, block_idx)
    }

    /// Release a reservation or committed block.
    pub fn free_block(&self, lba: u64) -> Result<()> {
        self.check_lba(lba)?;
        match self.bitmap.clear(lba) {
            BitState::Corrupt => Err(BlockError::BitmapCorrupt { lba }),
            _ => Ok(()),
        }
    }

    /// Linear placement in the Horizon region, first allocatable slot at or
    /// after the block's natural position.
    fn alloc_horizon(&self, anchor: &Anchor, block_idx: u64) -> Result<(u64, u8)> {
        let base = self
            .block_lba(anchor, block_idx, ORBIT_HORIZON)
            .ok_or(BlockError::GravityCollapse)?;

        for lba in base..self.geo.total_blocks {
            if self.qmask.get(lba) == BlockQuality::Toxic {
                continue;
            }
            match self.bitmap.test_and_set(lba) {
                BitState::Clear => {
                    tracing::trace!(lba, block_idx, "horizon placement");
                    return Ok((lba, ORBIT_HORIZON));
                }
                BitState::Set => continue,
                BitState::Corrupt => return Err(BlockError::BitmapCorrupt { lba }),
            }
        }
        Err(BlockError::GravityCollapse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::MemDevice;
    use crate::policy::{DeviceClass, Profile};
    use crate::volume::VolumeGeometry;

    fn open_volume(class: DeviceClass, profile: Profile) -> Volume {
        let geo = VolumeGeometry {
            block_size: 512,
            total_blocks: 2048,
            flux_start: 16,
            horizon_start: 1536,
        };
        let dev = MemDevice::new(512, 2048, class, 0);
        Volume::open(Box::new(dev), geo, profile).expect("open")
    }

    fn anchor() -> Anchor {
        let mut a = Anchor::new(0xCAFE, 100);
        a.orbit_vector = 1;
        a
    }

    #[test]
    fn test_lowest_orbit_wins() {
        let vol = open_volume(DeviceClass::Ssd, Profile::Generic);
        let a = anchor();
        let (lba, k) = vol.alloc_block(&a, 0).expect("alloc");
        assert_eq!(k, 0);
        assert_eq!(lba, vol.block_lba(&a, 0, 0).expect("lba"));
    }

    #[test]
    fn test_collision_escalates_one_orbit() {
        let vol = open_volume(DeviceClass::Ssd, Profile::Generic);
        let a = anchor();
        let (lba0, _) = vol.alloc_block(&a, 0).expect("first");
        let (lba1, k1) = vol.alloc_block(&a, 0).expect("second");
        assert_eq!(k1, 1);
        assert_ne!(lba0, lba1);
    }

    #[test]
    fn test_free_and_retry_returns_same_slot() {
        // No ratchet: the ladder restarts from k = 0 every time.
        let vol = open_volume(DeviceClass::Ssd, Profile::Generic);
        let a = anchor();
        let (lba0, k0) = vol.alloc_block(&a, 7).expect("alloc");
        let _ = vol.alloc_block(&a, 7).expect("deeper");
        vol.free_block(lba0).expect("free");
        let (again, k_again) = vol.alloc_block(&a, 7).expect("retry");
        assert_eq!((again, k_again), (lba0, k0));
    }

    #[test]
    fn test_toxic_blocks_skipped() {
        let vol = open_volume(DeviceClass::Ssd, Profile::Generic);
        let a = anchor();
        let primary = vol.block_lba(&a, 3, 0).expect("lba");
        vol.set_block_quality(primary, BlockQuality::Toxic).expect("taint");
        let (lba, k) = vol.alloc_block(&a, 3).expect("alloc");
        assert_eq!(k, 1);
        assert_ne!(lba, primary);
        assert_eq!(vol.health().taints, 1);
    }

    #[test]
    fn test_hdd_collision_jumps_to_horizon() {
        // Rotational policy never tries k = 1.
        let vol = open_volume(DeviceClass::Hdd, Profile::Generic);
        let a = anchor();
        let (_, k0) = vol.alloc_block(&a, 0).expect("first");
        assert_eq!(k0, 0);
        let (lba, k) = vol.alloc_block(&a, 0).expect("second");
        assert_eq!(k, 15);
        assert!(lba >= vol.geometry().horizon_start);
        let k1_lba = vol.block_lba(&a, 0, 1).expect("k1");
        assert_eq!(vol.bitmap.test(k1_lba), BitState::Clear, "k=1 never attempted");
    }

    #[test]
    fn test_pico_collapses_without_horizon() {
        let vol = open_volume(DeviceClass::Ssd, Profile::Pico);
        let a = anchor();
        vol.alloc_block(&a, 0).expect("first");
        match vol.alloc_block(&a, 0) {
            Err(BlockError::GravityCollapse) => {}
            other => panic!("expected collapse, got {:?}", other),
        }
    }

    #[test]
    fn test_full_ladder_then_horizon() {
        let vol = open_volume(DeviceClass::Ssd, Profile::Generic);
        let a = anchor();
        for expect_k in 0..=12u8 {
            let (_, k) = vol.alloc_block(&a, 0).expect("ladder");
            assert_eq!(k, expect_k);
        }
        let (lba, k) = vol.alloc_block(&a, 0).expect("spill");
        assert_eq!(k, 15);
        assert!(lba >= vol.geometry().horizon_start);
    }

    #[test]
    fn test_horizon_mode_anchor_skips_ladder() {
        let vol = open_volume(DeviceClass::Ssd, Profile::Generic);
        let mut a = anchor();
        a.data_class |= crate::anchor::class::HORIZON;
        let (lba, k) = vol.alloc_block(&a, 2).expect("alloc");
        assert_eq!(k, 15);
        assert_eq!(lba, vol.geometry().horizon_start + 2);
        let k0 = vol.block_lba(&a, 2, 0).expect("k0");
        assert_eq!(vol.bitmap.test(k0), BitState::Clear);
    }

    #[test]
    fn test_cross_anchor_isolation() {
        // Distinct gravity centers: ladders do not interact.
        let vol = open_volume(DeviceClass::Ssd, Profile::Generic);
        let mut a = Anchor::new(1, 100);
        a.orbit_vector = 1;
        let mut b = Anchor::new(2, 900);
        b.orbit_vector = 1;
        for i in 0..8 {
            let (_, ka) = vol.alloc_block(&a, i).expect("a");
            let (_, kb) = vol.alloc_block(&b, i).expect("b");
            assert_eq!(ka, 0, "block {}", i);
            assert_eq!(kb, 0, "block {}", i);
        }
    }

    #[test]
    fn test_deterministic_replay() {
        let mk = || open_volume(DeviceClass::Ssd, Profile::Generic);
        let a = anchor();
        let v1 = mk();
        let v2 = mk();
        for i in 0..32 {
            assert_eq!(
                v1.alloc_block(&a, i).expect("v1"),
                v2.alloc_block(&a, i).expect("v2")
            );
        }
    }

    #[test]
    fn test_horizon_scan_skips_toxic_slots() {
        let vol = open_volume(DeviceClass::Ssd, Profile::Generic);
        let mut a = anchor();
        a.data_class |= crate::anchor::class::HORIZON;
        let base = vol.geometry().horizon_start;
        vol.set_block_quality(base, BlockQuality::Toxic).expect("taint");

        let (lba, k) = vol.alloc_block(&a, 0).expect("alloc");
        assert_eq!(k, 15);
        assert_eq!(lba, base + 1, "toxic natural slot is stepped over");
        assert_eq!(vol.bitmap.test(base), BitState::Clear, "toxic slot untouched");
    }

    #[test]
    fn test_bitmap_corruption_propagates() {
        let vol = open_volume(DeviceClass::Ssd, Profile::Generic);
        let a = anchor();
        let primary = vol.block_lba(&a, 0, 0).expect("lba");
        vol.bitmap.upset_data_bit(primary);
        vol.bitmap.upset_data_bit(primary ^ 1);
        match vol.alloc_block(&a, 0) {
            Err(BlockError::BitmapCorrupt { .. }) => {}
            other => panic!("expected bitmap corruption, got {:?}", other),
        }
    }

    #[test]
    fn test_stride_overflow_is_invalid_argument() {
        let vol = open_volume(DeviceClass::Ssd, Profile::Generic);
        let mut a = anchor();
        a.fractal_scale = 40;
        match vol.alloc_block(&a, 1 << 40) {
            Err(BlockError::InvalidArgument(_)) => {}
            other => panic!("expected invalid argument, got {:?}", other),
        }
    }
}
