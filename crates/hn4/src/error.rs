// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Engine error taxonomy.
//!
//! Every block-layer operation resolves to exactly one result kind. Success
//! cases ride in [`ReadOutcome`]; failures are the closed [`BlockError`]
//! enumeration below. When a read probes several orbit candidates and more
//! than one fails, the surfaced error is the one with the highest
//! [`severity`](BlockError::severity):
//!
//! ```text
//! HwIo > BitmapCorrupt > HeaderRot > PayloadRot > GenerationSkew
//!      > IdMismatch > PhantomBlock > AlgoUnknown > (sparse)
//! ```
//!
//! Hardware faults outrank every logical verdict so that a flaky controller
//! is never reported as an empty block, and identity/integrity verdicts
//! outrank sparsity for the same reason.

use crate::codec::CodecError;
use thiserror::Error;

/// Result alias used across the block layer.
pub type Result<T> = std::result::Result<T, BlockError>;

/// Successful completion of a block read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Data was found and validated; payload occupies `dst[..len]`, the rest
    /// of `dst` is zeroed.
    Data {
        /// Logical payload length.
        len: usize,
        /// Orbit the winning replica was read from (15 = horizon).
        orbit: u8,
    },
    /// No allocation exists at any candidate; `dst` has been zeroed.
    Sparse,
}

impl ReadOutcome {
    /// Logical length of the returned payload (0 for sparse).
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Data { len, .. } => *len,
            Self::Sparse => 0,
        }
    }

    #[must_use]
    pub fn is_sparse(&self) -> bool {
        matches!(self, Self::Sparse)
    }
}

/// Closed failure taxonomy of the block layer.
#[derive(Debug, Error)]
pub enum BlockError {
    // ------------------------------------------------------------------
    // Caller errors
    // ------------------------------------------------------------------
    /// Undersized/oversized buffer, zero-capacity destination, or a length
    /// beyond the 1 GiB hard cap.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Missing READ/WRITE permission, IMMUTABLE write attempt, ENCRYPTED
    /// payload without a decryption context, or an anchor without VALID.
    #[error("access denied: {0}")]
    AccessDenied(&'static str),

    // ------------------------------------------------------------------
    // Capacity errors
    // ------------------------------------------------------------------
    /// Compressor output did not fit the provided buffer.
    #[error("no space: compressed output exceeds destination capacity")]
    NoSpace,

    /// K-ladder and Horizon fallback are both exhausted.
    #[error("gravity collapse: ballistic orbits and horizon region exhausted")]
    GravityCollapse,

    // ------------------------------------------------------------------
    // Surface errors (ordered by severity, highest first)
    // ------------------------------------------------------------------
    /// HAL failure, DMA-ghost, or a poison-filled buffer after a read.
    #[error("hardware I/O failure at lba {lba}")]
    HwIo {
        /// Physical block address of the failed transfer.
        lba: u64,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Armored bitmap word failed double-bit detection; allocation state for
    /// this region is unknowable.
    #[error("allocation bitmap corrupt for lba {lba}")]
    BitmapCorrupt { lba: u64 },

    /// Header CRC mismatch or malformed comp-meta on an otherwise
    /// magic-valid block.
    #[error("header rot at lba {lba}")]
    HeaderRot { lba: u64 },

    /// Payload CRC mismatch, or a decoder safety violation while expanding a
    /// compressed payload.
    #[error("payload rot at lba {lba}")]
    PayloadRot {
        lba: u64,
        /// Decoder diagnostic when the rot was detected during expansion.
        #[source]
        source: Option<CodecError>,
    },

    /// Stored generation does not equal the anchor's current generation
    /// (past and future skew are both rejected).
    #[error("generation skew at lba {lba}: disk {disk}, anchor {anchor}")]
    GenerationSkew { lba: u64, disk: u32, anchor: u32 },

    /// Stored owner identity differs from the anchor's seed.
    #[error("owner id mismatch at lba {lba}")]
    IdMismatch { lba: u64 },

    /// Magic is valid but the block belongs to a different logical index
    /// (misdirected write), or the magic itself is foreign.
    #[error("phantom block at lba {lba}")]
    PhantomBlock { lba: u64 },

    /// comp-meta names a compression algorithm this build does not know.
    #[error("unknown payload algorithm {algo} at lba {lba}")]
    AlgoUnknown { lba: u64, algo: u8 },
}

impl BlockError {
    /// Severity rank used to pick the surfaced error when multiple orbit
    /// candidates fail. Larger is worse.
    #[must_use]
    pub fn severity(&self) -> u8 {
        match self {
            Self::HwIo { .. } => 9,
            Self::BitmapCorrupt { .. } => 8,
            Self::HeaderRot { .. } => 7,
            Self::PayloadRot { .. } => 6,
            Self::GenerationSkew { .. } => 5,
            Self::IdMismatch { .. } => 4,
            Self::PhantomBlock { .. } => 3,
            Self::AlgoUnknown { .. } => 2,
            // Non-probe errors never compete in candidate selection; rank
            // them above everything so accidental comparison is loud.
            Self::InvalidArgument(_)
            | Self::AccessDenied(_)
            | Self::NoSpace
            | Self::GravityCollapse => u8::MAX,
        }
    }
}
