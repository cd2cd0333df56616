// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Device-class and profile policy tables.
//!
//! Placement behavior is a pure function of `(DeviceClass, Profile)` plus
//! the device's hardware flags. The tables are tiny and cold; dispatch is a
//! match, not a vtable.
//!
//! | Class | K ladder | Rationale |
//! |-------|----------|-----------|
//! | HDD / Tape | k = 0 only, then Horizon | never scatter a seeking head |
//! | SSD / NVM  | k = 0..12, then Horizon  | scatter is free |
//!
//! Profiles tighten the class defaults: PICO (power-constrained) pins the
//! ladder to k = 0 with no Horizon and no self-healing; ARCHIVE compresses
//! every payload by default; SYSTEM keeps the full ladder.

/// Hardware capability flags reported by the HAL.
pub mod hw {
    /// Device prefers non-temporal stores on bulk copies.
    pub const NT_STORE: u32 = 0x01;
    /// Advisory prefetch is worth issuing.
    pub const PREFETCH: u32 = 0x02;
}

/// Broad media class of the underlying device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    /// Rotational media.
    Hdd,
    /// Flash with an FTL.
    Ssd,
    /// Byte-addressable non-volatile memory.
    Nvm,
    /// Streaming media; treated like rotational for placement.
    Tape,
}

/// Deployment profile selected at volume open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Profile {
    /// Balanced defaults.
    #[default]
    Generic,
    /// Cold storage: always attempt compression.
    Archive,
    /// Boot/system volumes: full ladder, no compression by default.
    System,
    /// Power-constrained embedded targets: primary orbit only, no Horizon,
    /// no background repair.
    Pico,
}

/// Resolved placement and scan policy for one volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacementPolicy {
    /// Deepest ballistic orbit the allocator may try.
    pub k_max: u8,
    /// Whether ladder exhaustion may spill into the Horizon region.
    pub horizon: bool,
    /// Whether successful reads repair rotted lower orbits.
    pub auto_medic: bool,
    /// Whether writes attempt compression without the anchor asking.
    pub compress_default: bool,
    /// Codec run-detection window (bytes).
    pub scan_window: usize,
    /// Deep-scan strided pre-check before linear run verification.
    pub deep_scan: bool,
    /// Non-temporal stores on the codec literal-flush path.
    pub nt_stores: bool,
    /// Issue advisory prefetch before candidate probing.
    pub prefetch: bool,
}

impl PlacementPolicy {
    /// Resolve the policy for a device class, profile and HAL flag word.
    #[must_use]
    pub fn resolve(class: DeviceClass, profile: Profile, hw_flags: u32) -> Self {
        let rotational = matches!(class, DeviceClass::Hdd | DeviceClass::Tape);
        let mut p = Self {
            k_max: if rotational { 0 } else { 12 },
            horizon: true,
            auto_medic: true,
            compress_default: false,
            scan_window: if rotational { 16 } else { 8 },
            deep_scan: rotational,
            nt_stores: class == DeviceClass::Nvm && hw_flags & hw::NT_STORE != 0,
            prefetch: hw_flags & hw::PREFETCH != 0,
        };
        match profile {
            Profile::Generic | Profile::System => {}
            Profile::Archive => p.compress_default = true,
            Profile::Pico => {
                p.k_max = 0;
                p.horizon = false;
                p.auto_medic = false;
                p.prefetch = false;
            }
        }
        p
    }
}
