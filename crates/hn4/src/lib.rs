// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # HN4 - Ballistic Block-Addressed Storage Engine
//!
//! HN4 maps logical file offsets to physical sectors through a *ballistic
//! trajectory* function instead of an extent tree: each write scatters
//! across a small ladder of candidate locations ("orbits") derived from the
//! object's identity, and each read replays the same ladder, validating
//! whatever it finds against the caller's expectations. The engine provides
//! atomic block read/write with per-block integrity, generation-based
//! visibility, selective self-healing of rotted replicas, and a structural
//! compressor tuned for sparse and linear numeric data.
//!
//! ## Quick Start
//!
//! ```rust
//! use hn4::{Anchor, MemDevice, Profile, Volume, VolumeGeometry};
//! use hn4::policy::DeviceClass;
//!
//! fn main() -> hn4::Result<()> {
//!     let dev = MemDevice::new(512, 4096, DeviceClass::Ssd, 0);
//!     let geo = VolumeGeometry {
//!         block_size: 4096,
//!         total_blocks: 512,
//!         flux_start: 8,
//!         horizon_start: 384,
//!     };
//!     let vol = Volume::open(Box::new(dev), geo, Profile::Generic)?;
//!
//!     let mut anchor = Anchor::new(0xCAFE, 100);
//!     anchor.orbit_vector = 1;
//!     vol.write_block(&mut anchor, 0, b"HELLO_HN4", 0)?;
//!
//!     let mut dst = vec![0u8; vol.payload_capacity()];
//!     let out = vol.read_block(&anchor, 0, &mut dst, 0)?;
//!     assert_eq!(&dst[..out.len()], b"HELLO_HN4");
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------+
//! |                      Block API (Volume)                      |
//! |        write_block | read_block | alloc_block | free_block   |
//! +--------------------------------------------------------------+
//! |   Write pipeline          |          Read pipeline           |
//! |   codec -> place -> seal  |  probe -> validate -> heal       |
//! +--------------------------------------------------------------+
//! |  Ballistic addressing | K-ladder allocator | TCC codec       |
//! +--------------------------------------------------------------+
//! |  Integrity: CRC domains, armored bitmap, poison sentinels    |
//! +--------------------------------------------------------------+
//! |            HAL: synchronous sector I/O (file, RAM)           |
//! +--------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Volume`] | Open volume: geometry, policy, shared allocation state |
//! | [`Anchor`] | Per-object descriptor driving addressing and visibility |
//! | [`BlockError`] | Closed failure taxonomy with severity precedence |
//! | [`ReadOutcome`] | Successful read result (data or sparse) |
//! | [`hal::SectorIo`] | Synchronous sector transfer contract |
//!
//! All operations are synchronous; the engine suspends only inside device
//! I/O and under bitmap-word contention. Operations on distinct anchors
//! parallelize freely; writes within one anchor are serialized by the
//! caller.

/// Per-object descriptors, permission and data-class bit-sets.
pub mod anchor;
/// Trajectory math: orbit ladder, gravity assist, horizon addressing.
pub mod ballistic;
/// Armored allocation bitmap (SEC-DED protected words).
pub mod bitmap;
/// On-disk block format and the write/read pipelines.
pub mod block;
/// TCC structural codec (compress, decompress, bounds).
pub mod codec;
/// Error taxonomy and result types.
pub mod error;
/// Hardware abstraction: sector devices (file-backed, in-memory).
pub mod hal;
/// Integrity primitives: CRC domains, armored words, poison pattern.
pub mod integrity;
/// Device-class and profile policy tables.
pub mod policy;
/// Per-block media quality mask.
pub mod qmask;
/// Health counters and snapshots.
pub mod telemetry;
/// Volume handle and geometry.
pub mod volume;

mod alloc;

pub use anchor::Anchor;
pub use codec::{compress, compress_bound, decompress, CodecError};
pub use error::{BlockError, ReadOutcome, Result};
pub use hal::{DeviceCaps, FileDevice, MemDevice, SectorIo};
pub use policy::{DeviceClass, Profile};
pub use qmask::BlockQuality;
pub use telemetry::HealthSnapshot;
pub use volume::{RescanReport, ScrubReport, Volume, VolumeBuilder, VolumeGeometry};
