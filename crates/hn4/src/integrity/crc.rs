// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Seeded CRC32 with separate header and payload domains.
//!
//! Both domains use the standard CRC-32 polynomial but start from distinct
//! seeds. A block whose header bytes happen to equal another block's payload
//! bytes therefore still produces two different checksums, so a swapped or
//! re-framed region can never launder one CRC as the other.

/// Seed for the block-header CRC domain.
pub const HEADER_CRC_SEED: u32 = 0xB10C_4EAD;

/// Seed for the payload-slot CRC domain.
pub const DATA_CRC_SEED: u32 = 0xB10C_DA7A;

/// CRC32 over `bytes` starting from an explicit seed state.
#[inline]
#[must_use]
pub fn crc32_seeded(seed: u32, bytes: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new_with_initial(seed);
    hasher.update(bytes);
    hasher.finalize()
}

/// Header-domain CRC over the header prefix.
#[inline]
#[must_use]
pub fn header_crc(bytes: &[u8]) -> u32 {
    crc32_seeded(HEADER_CRC_SEED, bytes)
}

/// Payload-domain CRC over the *entire* payload slot, padding included.
#[inline]
#[must_use]
pub fn payload_crc(bytes: &[u8]) -> u32 {
    crc32_seeded(DATA_CRC_SEED, bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domains_are_separated() {
        let bytes = b"identical bytes in both domains";
        assert_ne!(header_crc(bytes), payload_crc(bytes));
    }

    #[test]
    fn test_deterministic() {
        let bytes = b"same input, same output";
        assert_eq!(header_crc(bytes), header_crc(bytes));
        assert_eq!(payload_crc(bytes), payload_crc(bytes));
    }

    #[test]
    fn test_detects_single_bit_flip() {
        let mut bytes = b"sensitive to every bit".to_vec();
        let original = payload_crc(&bytes);

        for i in 0..bytes.len() {
            for bit in 0..8 {
                bytes[i] ^= 1 << bit;
                assert_ne!(payload_crc(&bytes), original, "flip at byte {} bit {}", i, bit);
                bytes[i] ^= 1 << bit;
            }
        }
    }

    #[test]
    fn test_covers_trailing_padding() {
        // A zero tail still participates: extending the slot changes the CRC.
        let short = payload_crc(b"data");
        let padded = payload_crc(b"data\0\0\0\0");
        assert_ne!(short, padded);
    }
}
