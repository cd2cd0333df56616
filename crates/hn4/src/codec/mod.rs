// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! TCC: the structural codec for dense numeric payloads.
//!
//! TCC targets tensor weights with sparsity, sensor ramps, run-length
//! regions and high-entropy noise. It is deliberately *not* a dictionary
//! compressor — repeated strings in text are not deduplicated — and its
//! worst-case expansion is bounded by [`compress_bound`].
//!
//! # Token Grammar
//!
//! Every token starts with one opcode byte: the top two bits select the
//! opcode, the bottom six carry an inline length (63 escapes to extension
//! bytes).
//!
//! ```text
//! +----------+-------------------------------+----------------------------+
//! | Opcode   | Inline fields                 | Logical length             |
//! +----------+-------------------------------+----------------------------+
//! | 00 LIT   | N raw bytes                   | N = enc                    |
//! | 01 ISO   | 1 value byte                  | N = enc + 4                |
//! | 10 GRAD  | start byte, signed slope byte | N = enc + 4                |
//! | 11 TSM   | mask bytes, then set words    | N = enc (exact, N % 4 = 0) |
//! +----------+-------------------------------+----------------------------+
//! ```
//!
//! # Length extension
//!
//! An inline field of 63 is followed by extension bytes: each `0xFF` adds
//! 255 and continues, a byte below `0xFF` adds its value and terminates.
//! Consumption is capped at 32 extension bytes; a full run of 32 `0xFF`
//! bytes terminates by the cap itself and encodes the maximum
//! `63 + 32 * 255 = 8223`. Longer logical runs are split across tokens.
//!
//! # Bitmask geometry
//!
//! A TSM token over `N` bytes (`N % 4 == 0`) carries `ceil(N/32)` mask
//! bytes — one bit per 32-bit word, LSB-first — followed by the non-zero
//! words only, verbatim. The encoder chooses TSM over literals only when
//! the projected saving is at least four bytes. Unaligned prefixes and
//! suffixes are emitted as literals, never padded.
//!
//! The decoder is single-pass, streaming, allocation-free, and enforces the
//! full safety envelope: truncated tokens, degenerate or range-escaping
//! gradients, bad bitmask geometry and destination overflow all reject the
//! stream rather than producing partial output.

mod decode;
mod encode;
mod inspect;
mod ntcopy;


pub use decode::decompress;
pub use encode::compress;
pub use inspect::{inspect_stream, StreamStats};

use crate::policy::{hw, DeviceClass};
use thiserror::Error;

/// Opcode values (top two bits of the token's first byte).
pub(crate) mod op {
    pub const LITERAL: u8 = 0b00;
    pub const ISOTOPE: u8 = 0b01;
    pub const GRADIENT: u8 = 0b10;
    pub const BITMASK: u8 = 0b11;
}

/// Inline length value that escapes into extension bytes.
pub(crate) const LEN_ESCAPE: usize = 63;

/// Maximum extension bytes consumed per token.
pub(crate) const LEN_EXT_CAP: usize = 32;

/// Maximum encoded length field value (63 + 32 * 255).
pub(crate) const ENC_LEN_MAX: usize = LEN_ESCAPE + LEN_EXT_CAP * 255;

/// Maximum logical bytes in one Literal token.
pub const MAX_LITERAL_RUN: usize = ENC_LEN_MAX;

/// Maximum logical bytes in one Isotope or Gradient token (bias 4).
pub const MAX_BIASED_RUN: usize = ENC_LEN_MAX + 4;

/// Run-length bias applied to Isotope and Gradient lengths.
pub(crate) const RUN_BIAS: usize = 4;

/// Maximum logical bytes in one Bitmask token (largest multiple of 4).
pub const MAX_BITMASK_RUN: usize = ENC_LEN_MAX & !3;

/// Hard cap on codec input and output (keeps 32-bit offsets safe).
pub const MAX_CODEC_LEN: usize = 1 << 30;

/// Conservative output sizing for [`compress`]: always sufficient for any
/// input of `n` bytes.
#[inline]
#[must_use]
pub const fn compress_bound(n: usize) -> usize {
    n + (n >> 6) + 384
}

/// Codec failure taxonomy. Decoder variants surface through the block layer
/// as payload rot; the originating kind is preserved for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Input or output length exceeds [`MAX_CODEC_LEN`].
    #[error("length exceeds the 1 GiB codec limit")]
    TooLarge,
    /// Encoder ran out of destination space.
    #[error("destination exhausted while encoding")]
    NoSpace,
    /// Source ended inside a token.
    #[error("compressed stream truncated")]
    Truncated,
    /// Gradient token with slope zero (canonical form is Isotope).
    #[error("degenerate gradient token")]
    DegenerateGradient,
    /// Gradient whose projected final value escapes `[0, 255]`.
    #[error("gradient escapes the byte range")]
    GradientRange,
    /// Bitmask token with bad geometry: length not a multiple of four,
    /// empty, or mask bits set beyond the declared region.
    #[error("bitmask token geometry invalid")]
    BitmaskGeometry,
    /// A token would write past the destination capacity.
    #[error("token output exceeds destination capacity")]
    DstOverflow,
}

/// Encoder-side tuning derived from the device class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanTuning {
    /// Bytes a run must span before Isotope/Gradient tokens are emitted.
    pub window: usize,
    /// Strided fail-fast pre-check before linear run verification.
    pub deep_precheck: bool,
    /// Non-temporal stores on the literal flush path.
    pub nt_stores: bool,
}

impl ScanTuning {
    /// Tuning for a device class and HAL capability flags.
    #[must_use]
    pub fn for_device(class: DeviceClass, hw_flags: u32) -> Self {
        let rotational = matches!(class, DeviceClass::Hdd | DeviceClass::Tape);
        Self {
            window: if rotational { 16 } else { 8 },
            deep_precheck: rotational,
            nt_stores: class == DeviceClass::Nvm && hw_flags & hw::NT_STORE != 0,
        }
    }
}

impl Default for ScanTuning {
    fn default() -> Self {
        Self::for_device(DeviceClass::Ssd, 0)
    }
}
