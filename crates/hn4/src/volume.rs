// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Volume handle: geometry, device, shared allocation state, and the public
//! block API surface.
//!
//! A volume owns the device handle, the armored allocation bitmap, the
//! quality mask and the health counters. All of its shared state is
//! word-granular, so block operations take `&self` and parallelize freely
//! across anchors; serialization of writes *within* one anchor is the
//! caller's contract.
//!
//! Capabilities are captured once at open and never refreshed; the resolved
//! placement policy is likewise immutable for the volume's lifetime.

use crate::anchor::Anchor;
use crate::ballistic::{self, theta_self_check};
use crate::bitmap::ArmoredBitmap;
use crate::block::{probe_header_bytes, HeaderProbe, BLOCK_HEADER_SIZE};
use crate::codec::ScanTuning;
use crate::error::{BlockError, Result};
use crate::hal::SectorIo;
use crate::policy::{PlacementPolicy, Profile};
use crate::qmask::{BlockQuality, QualityMask};
use crate::telemetry::{HealthCounters, HealthSnapshot};
use std::io;

/// Largest supported block size.
pub const MAX_BLOCK_SIZE: u32 = 64 << 20;

/// Fixed layout parameters of a volume, supplied by the mount layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeGeometry {
    /// Bytes per engine block (multiple of the device sector size).
    pub block_size: u32,
    /// Device capacity in engine blocks.
    pub total_blocks: u64,
    /// First block of the ballistic region; everything below is reserved
    /// for the mount layer.
    pub flux_start: u64,
    /// First block of the linear Horizon region.
    pub horizon_start: u64,
}

impl VolumeGeometry {
    /// Size of the ballistic region; the trajectory modulus.
    #[inline]
    #[must_use]
    pub fn phi(&self) -> u64 {
        self.total_blocks - self.flux_start
    }

    /// Caller-visible payload bytes per block.
    #[inline]
    #[must_use]
    pub fn payload_capacity(&self) -> usize {
        self.block_size as usize - BLOCK_HEADER_SIZE
    }
}

/// Tally of a full-surface rescue scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RescanReport {
    /// Blocks examined.
    pub scanned: u64,
    /// Blocks with a valid header, re-committed into the bitmap.
    pub committed: u64,
    /// Blocks carrying the format magic but a rotted header.
    pub rotted: u64,
    /// Blocks that could not be read at all.
    pub io_errors: u64,
}

/// Tally of a deep scrub pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrubReport {
    /// Committed blocks examined.
    pub scanned: u64,
    /// Blocks whose full payload slot verified; promoted to PRIME.
    pub pristine: u64,
    /// Blocks with header or payload rot; demoted to SUSPECT.
    pub demoted: u64,
    /// Unreadable blocks; demoted to TOXIC.
    pub poisoned: u64,
}

/// Incremental volume construction for callers that derive layout from the
/// device rather than prescribing it.
///
/// ```rust,no_run
/// use hn4::{MemDevice, Profile, Volume};
/// use hn4::policy::DeviceClass;
///
/// let dev = MemDevice::new(512, 4096, DeviceClass::Ssd, 0);
/// let vol = Volume::builder()
///     .block_size(4096)
///     .profile(Profile::Archive)
///     .open(Box::new(dev))
///     .expect("open");
/// ```
#[derive(Debug, Clone)]
pub struct VolumeBuilder {
    block_size: u32,
    flux_start: u64,
    horizon_start: Option<u64>,
    total_blocks: Option<u64>,
    profile: Profile,
}

impl Default for VolumeBuilder {
    fn default() -> Self {
        Self {
            block_size: 4096,
            flux_start: 8,
            horizon_start: None,
            total_blocks: None,
            profile: Profile::Generic,
        }
    }
}

impl VolumeBuilder {
    /// Bytes per engine block.
    #[must_use]
    pub fn block_size(mut self, block_size: u32) -> Self {
        self.block_size = block_size;
        self
    }

    /// First ballistic block.
    #[must_use]
    pub fn flux_start(mut self, flux_start: u64) -> Self {
        self.flux_start = flux_start;
        self
    }

    /// First horizon block. Defaults to three quarters of the volume.
    #[must_use]
    pub fn horizon_start(mut self, horizon_start: u64) -> Self {
        self.horizon_start = Some(horizon_start);
        self
    }

    /// Volume size in blocks. Defaults to everything the device holds.
    #[must_use]
    pub fn total_blocks(mut self, total_blocks: u64) -> Self {
        self.total_blocks = Some(total_blocks);
        self
    }

    /// Deployment profile.
    #[must_use]
    pub fn profile(mut self, profile: Profile) -> Self {
        self.profile = profile;
        self
    }

    /// Resolve the layout against the device and open the volume.
    pub fn open(self, dev: Box<dyn SectorIo>) -> Result<Volume> {
        let caps = dev.caps();
        if self.block_size == 0 {
            return Err(BlockError::InvalidArgument("block size out of range"));
        }
        let total_blocks = self
            .total_blocks
            .unwrap_or(caps.total_capacity_bytes / u64::from(self.block_size));
        let geo = VolumeGeometry {
            block_size: self.block_size,
            total_blocks,
            flux_start: self.flux_start,
            horizon_start: self.horizon_start.unwrap_or(total_blocks / 4 * 3),
        };
        Volume::open(dev, geo, self.profile)
    }
}

/// An open volume.
pub struct Volume {
    pub(crate) dev: Box<dyn SectorIo>,
    pub(crate) geo: VolumeGeometry,
    pub(crate) profile: Profile,
    pub(crate) policy: PlacementPolicy,
    pub(crate) tuning: ScanTuning,
    pub(crate) bitmap: ArmoredBitmap,
    pub(crate) qmask: QualityMask,
    pub(crate) health: HealthCounters,
    pub(crate) spb: u32,
}

impl Volume {
    /// Start building a volume with device-derived defaults.
    #[must_use]
    pub fn builder() -> VolumeBuilder {
        VolumeBuilder::default()
    }

    /// Open a volume over `dev` with the given layout and profile.
    ///
    /// The allocation bitmap starts clear; call [`Volume::rescan`] to
    /// rebuild occupancy from an existing surface.
    pub fn open(dev: Box<dyn SectorIo>, geo: VolumeGeometry, profile: Profile) -> Result<Self> {
        if !theta_self_check() {
            return Err(BlockError::InvalidArgument("orbit table failed self-check"));
        }
        let caps = dev.caps();
        if geo.block_size as usize <= BLOCK_HEADER_SIZE || geo.block_size > MAX_BLOCK_SIZE {
            return Err(BlockError::InvalidArgument("block size out of range"));
        }
        if geo.block_size % caps.logical_block_size != 0 {
            return Err(BlockError::InvalidArgument(
                "block size is not a multiple of the sector size",
            ));
        }
        if geo.flux_start >= geo.total_blocks
            || geo.horizon_start < geo.flux_start
            || geo.horizon_start >= geo.total_blocks
        {
            return Err(BlockError::InvalidArgument("inconsistent region layout"));
        }
        let needed = geo
            .total_blocks
            .checked_mul(u64::from(geo.block_size))
            .ok_or(BlockError::InvalidArgument("volume size overflow"))?;
        if needed > caps.total_capacity_bytes {
            return Err(BlockError::InvalidArgument("volume exceeds device capacity"));
        }

        let policy = PlacementPolicy::resolve(caps.class, profile, caps.hw_flags);
        let tuning = ScanTuning {
            window: policy.scan_window,
            deep_precheck: policy.deep_scan,
            nt_stores: policy.nt_stores,
        };
        tracing::debug!(?geo, ?profile, class = ?caps.class, "volume open");

        Ok(Self {
            dev,
            geo,
            profile,
            policy,
            tuning,
            bitmap: ArmoredBitmap::new(geo.total_blocks),
            qmask: QualityMask::new(geo.total_blocks),
            health: HealthCounters::default(),
            spb: geo.block_size / caps.logical_block_size,
        })
    }

    /// Volume layout.
    #[must_use]
    pub fn geometry(&self) -> VolumeGeometry {
        self.geo
    }

    /// Deployment profile the volume was opened with.
    #[must_use]
    pub fn profile(&self) -> Profile {
        self.profile
    }

    /// Resolved placement policy.
    #[must_use]
    pub fn policy(&self) -> PlacementPolicy {
        self.policy
    }

    /// Caller-visible payload bytes per block.
    #[must_use]
    pub fn payload_capacity(&self) -> usize {
        self.geo.payload_capacity()
    }

    /// Point-in-time health counters.
    #[must_use]
    pub fn health(&self) -> HealthSnapshot {
        self.health.snapshot()
    }

    /// Committed blocks according to the allocation bitmap.
    #[must_use]
    pub fn blocks_in_use(&self) -> u64 {
        self.bitmap.count_set()
    }

    /// Physical LBA of `(anchor, block_idx)` at orbit `k`. Pure; exposed
    /// for pre-allocation planning and diagnostics.
    #[must_use]
    pub fn block_lba(&self, anchor: &Anchor, block_idx: u64, k: u8) -> Option<u64> {
        ballistic::trajectory(
            &self.geo,
            anchor.gravity_center,
            anchor.orbit_vector,
            block_idx,
            anchor.fractal_scale,
            k,
        )
    }

    /// Media health of one block.
    pub fn block_quality(&self, lba: u64) -> Result<BlockQuality> {
        self.check_lba(lba)?;
        Ok(self.qmask.get(lba))
    }

    /// Retag one block's media health. Demotions below GOOD count as taints.
    pub fn set_block_quality(&self, lba: u64, quality: BlockQuality) -> Result<()> {
        self.check_lba(lba)?;
        if quality < BlockQuality::Good {
            self.health.taint();
            tracing::debug!(lba, ?quality, "block demoted");
        }
        self.qmask.set(lba, quality);
        Ok(())
    }

    /// Flush device-side volatile state.
    pub fn flush(&self) -> Result<()> {
        self.dev.flush().map_err(|e| BlockError::HwIo { lba: 0, source: Some(e) })
    }

    /// Rebuild the allocation bitmap from the surface: every block with a
    /// valid header magic and header CRC is re-committed.
    pub fn rescan(&self) -> Result<RescanReport> {
        let mut report = RescanReport::default();
        let mut sector = vec![0u8; self.dev.caps().logical_block_size as usize];

        for lba in self.geo.flux_start..self.geo.total_blocks {
            report.scanned += 1;
            if let Err(e) = self.read_header_sector(lba, &mut sector) {
                tracing::debug!(lba, error = %e, "rescan read failure");
                report.io_errors += 1;
                continue;
            }
            match probe_header_bytes(&sector) {
                HeaderProbe::Valid => {
                    let _ = self.bitmap.test_and_set(lba);
                    report.committed += 1;
                }
                HeaderProbe::Rotted => {
                    report.rotted += 1;
                    let _ = self.bitmap.clear(lba);
                }
                HeaderProbe::Absent => {
                    let _ = self.bitmap.clear(lba);
                }
            }
        }
        tracing::debug!(?report, "rescan complete");
        Ok(report)
    }

    /// Deep surface pass over the committed blocks: verify every header and
    /// full payload slot, and feed the verdicts back into the quality mask.
    /// Clean media is promoted to PRIME, rotted media demoted to SUSPECT,
    /// unreadable media to TOXIC (and its bit released — nothing behind it
    /// is reachable anyway).
    ///
    /// This is the maintenance entry point the mount layer runs in the
    /// background; the hot read path never waits on it.
    pub fn scrub(&self) -> Result<ScrubReport> {
        let mut report = ScrubReport::default();
        let mut block = vec![0u8; self.geo.block_size as usize];

        for lba in self.geo.flux_start..self.geo.total_blocks {
            if self.bitmap.test(lba) != crate::bitmap::BitState::Set {
                continue;
            }
            report.scanned += 1;
            if self.read_block_raw(lba, &mut block).is_err() {
                report.poisoned += 1;
                self.health.taint();
                self.qmask.set(lba, BlockQuality::Toxic);
                let _ = self.bitmap.clear(lba);
                tracing::warn!(lba, "scrub: unreadable block demoted to toxic");
                continue;
            }
            let healthy = match probe_header_bytes(&block) {
                HeaderProbe::Valid => {
                    let header = crate::block::BlockHeader::read_from(&block);
                    crate::integrity::payload_crc(&block[BLOCK_HEADER_SIZE..]) == header.data_crc
                }
                HeaderProbe::Rotted | HeaderProbe::Absent => false,
            };
            if healthy {
                report.pristine += 1;
                self.qmask.set(lba, BlockQuality::Prime);
            } else {
                report.demoted += 1;
                self.health.taint();
                self.qmask.set(lba, BlockQuality::Suspect);
                tracing::debug!(lba, "scrub: rotted block demoted to suspect");
            }
        }
        tracing::debug!(?report, "scrub complete");
        Ok(report)
    }

    // -----------------------------------------------------------------
    // Internal device plumbing
    // -----------------------------------------------------------------

    pub(crate) fn check_lba(&self, lba: u64) -> Result<()> {
        if lba >= self.geo.total_blocks {
            return Err(BlockError::InvalidArgument("lba out of range"));
        }
        Ok(())
    }

    #[inline]
    pub(crate) fn sector_of(&self, lba: u64) -> u64 {
        lba * u64::from(self.spb)
    }

    /// Read one whole engine block.
    pub(crate) fn read_block_raw(&self, lba: u64, buf: &mut [u8]) -> io::Result<()> {
        self.dev.sync_read(self.sector_of(lba), buf)
    }

    /// Write one whole engine block.
    pub(crate) fn write_block_raw(&self, lba: u64, buf: &[u8]) -> io::Result<()> {
        self.dev.sync_write(self.sector_of(lba), buf)
    }

    /// Read just the header-bearing first sector of a block.
    pub(crate) fn read_header_sector(&self, lba: u64, sector: &mut [u8]) -> io::Result<()> {
        self.dev.sync_read(self.sector_of(lba), sector)
    }
}
