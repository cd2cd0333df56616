// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Anchor: the per-object descriptor driving all addressing.
//!
//! An anchor carries the object's identity (`seed_id`), its addressing
//! parameters (gravity center, orbit vector, fractal scale), the current
//! write generation, permission and data-class flag sets, and a packed
//! per-cluster orbit hint that steers readers to the last known good orbit.
//!
//! Anchors are created above this layer and passed by exclusive reference
//! into block operations. A successful write mutates exactly three fields:
//! `write_gen` (bumped to the committed generation), `orbit_hints` (for
//! orbits 0-3), and `data_class` (the HORIZON bit once the ladder has
//! spilled). Reads never mutate.

/// Permission bits.
pub mod perm {
    /// Payload may be read.
    pub const READ: u32 = 0x01;
    /// Payload may be written.
    pub const WRITE: u32 = 0x02;
    /// Object is frozen; writes are denied unconditionally.
    pub const IMMUTABLE: u32 = 0x04;
    /// Payload is ciphertext; reads require a decryption context, which the
    /// block layer does not hold.
    pub const ENCRYPTED: u32 = 0x08;
    /// Session-level override that substitutes for READ/WRITE (but never
    /// for IMMUTABLE, and never for integrity).
    pub const SOVEREIGN: u32 = 0x10;
}

/// Data-class hint bits.
pub mod class {
    /// Anchor is live; everything else is unreadable.
    pub const VALID: u32 = 0x01;
    /// Payloads should be attempted through the structural compressor.
    pub const COMPRESSED: u32 = 0x02;
    /// Ballistic addressing is bypassed; blocks live in the horizon region.
    pub const HORIZON: u32 = 0x04;
    /// Sub-sector object packing (owned by the nano layer above).
    pub const NANO: u32 = 0x08;
}

/// Blocks covered by one 2-bit orbit hint.
pub const HINT_CLUSTER_BLOCKS: u64 = 16;

/// Number of hint clusters carried by one anchor (32 bits / 2).
pub const HINT_CLUSTERS: u64 = 16;

/// Highest orbit representable in a hint.
pub const HINT_ORBIT_MAX: u8 = 3;

/// Per-object descriptor. Field layout mirrors the on-anchor encoding used
/// by the namespace layer; within the block layer it is plain host data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    /// 128-bit owner identity; the sole authority check against a stored
    /// block's well id.
    pub seed_id: u128,
    /// Base block index `G`.
    pub gravity_center: u64,
    /// Collision-spreading vector `V` (48 significant bits).
    pub orbit_vector: u64,
    /// Stride exponent `M` (0-63); block index is scaled by `1 << M`.
    pub fractal_scale: u8,
    /// Current visible generation (low 32 bits of the counter).
    pub write_gen: u32,
    /// Permission bit-set (`perm::*`).
    pub permissions: u32,
    /// Data-class bit-set (`class::*`).
    pub data_class: u32,
    /// Packed 2-bit orbit hints, one per cluster of 16 blocks.
    pub orbit_hints: u32,
}

impl Anchor {
    /// A minimal live anchor with the given identity and base index.
    #[must_use]
    pub fn new(seed_id: u128, gravity_center: u64) -> Self {
        Self {
            seed_id,
            gravity_center,
            orbit_vector: 0,
            fractal_scale: 0,
            write_gen: 0,
            permissions: perm::READ | perm::WRITE,
            data_class: class::VALID,
            orbit_hints: 0,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.data_class & class::VALID != 0
    }

    #[inline]
    #[must_use]
    pub fn is_horizon(&self) -> bool {
        self.data_class & class::HORIZON != 0
    }

    #[inline]
    #[must_use]
    pub fn wants_compression(&self) -> bool {
        self.data_class & class::COMPRESSED != 0
    }

    /// Read gate: anchor READ or session SOVEREIGN, never through ENCRYPTED.
    #[must_use]
    pub fn readable(&self, session_perms: u32) -> bool {
        if self.permissions & perm::ENCRYPTED != 0 {
            return false;
        }
        self.permissions & perm::READ != 0 || session_perms & perm::SOVEREIGN != 0
    }

    /// Write gate: anchor WRITE or session SOVEREIGN; IMMUTABLE denies both.
    #[must_use]
    pub fn writable(&self, session_perms: u32) -> bool {
        if self.permissions & perm::IMMUTABLE != 0 {
            return false;
        }
        self.permissions & perm::WRITE != 0 || session_perms & perm::SOVEREIGN != 0
    }

    /// Hint slot for a logical block index.
    #[inline]
    fn hint_shift(block_idx: u64) -> u32 {
        let cluster = (block_idx / HINT_CLUSTER_BLOCKS) % HINT_CLUSTERS;
        (cluster as u32) * 2
    }

    /// Last known good orbit for the block's cluster (always 0-3).
    #[must_use]
    pub fn orbit_hint(&self, block_idx: u64) -> u8 {
        ((self.orbit_hints >> Self::hint_shift(block_idx)) & 0b11) as u8
    }

    /// Record the orbit a write landed on. Orbits above 3 are not
    /// representable and leave the hint untouched; readers reach them
    /// through the ladder's default order.
    pub fn set_orbit_hint(&mut self, block_idx: u64, k: u8) {
        if k > HINT_ORBIT_MAX {
            return;
        }
        let shift = Self::hint_shift(block_idx);
        self.orbit_hints = (self.orbit_hints & !(0b11 << shift)) | (u32::from(k) << shift);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_gates() {
        let mut a = Anchor::new(1, 0);
        assert!(a.readable(0));
        assert!(a.writable(0));

        a.permissions = perm::READ;
        assert!(!a.writable(0));
        assert!(a.writable(perm::SOVEREIGN));

        a.permissions = perm::READ | perm::WRITE | perm::IMMUTABLE;
        assert!(a.readable(0));
        assert!(!a.writable(0));
        assert!(!a.writable(perm::SOVEREIGN), "immutable beats sovereign");

        a.permissions = perm::WRITE;
        assert!(!a.readable(0));
        assert!(a.readable(perm::SOVEREIGN));

        a.permissions = perm::READ | perm::ENCRYPTED;
        assert!(!a.readable(0), "no decryption context at this layer");
        assert!(!a.readable(perm::SOVEREIGN));
    }

    #[test]
    fn test_hint_packing() {
        let mut a = Anchor::new(1, 0);
        a.set_orbit_hint(0, 3);
        a.set_orbit_hint(16, 1);
        a.set_orbit_hint(250, 2);

        assert_eq!(a.orbit_hint(0), 3);
        assert_eq!(a.orbit_hint(15), 3, "same cluster");
        assert_eq!(a.orbit_hint(16), 1);
        assert_eq!(a.orbit_hint(250), 2);
    }

    #[test]
    fn test_hint_clusters_wrap() {
        let mut a = Anchor::new(1, 0);
        // Cluster space is 16 wide; block 256 shares cluster 0 with block 0.
        a.set_orbit_hint(256, 2);
        assert_eq!(a.orbit_hint(0), 2);
    }

    #[test]
    fn test_deep_orbit_not_hintable() {
        let mut a = Anchor::new(1, 0);
        a.set_orbit_hint(0, 3);
        a.set_orbit_hint(0, 7);
        assert_eq!(a.orbit_hint(0), 3, "deep orbits leave the hint alone");
    }
}
