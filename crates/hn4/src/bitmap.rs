// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Armored allocation bitmap.
//!
//! One bit per physical block, grouped into armored 64-bit words (see
//! [`crate::integrity::armor`]). Every access validates the word's ECC:
//! single-bit RAM damage is corrected in place and counted, double-bit
//! damage surfaces as [`BitState::Corrupt`] — which the read pipeline must
//! treat as an error, never as "the block is sparse". A region whose
//! allocation state is unknowable must not be silently read as zeros.
//!
//! Mutations take the word's write lock so the data word and its ECC byte
//! always change together; contention on a hot word parks the writer, which
//! is the engine's only suspension point besides device I/O.

use crate::integrity::{ArmorState, ArmorWord};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

/// Tri-state result of a bitmap probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitState {
    /// Bit is clear; no allocation exists.
    Clear,
    /// Bit is set; a block is (or recently was) committed there.
    Set,
    /// The word's ECC detected uncorrectable damage; state unknowable.
    Corrupt,
}

/// The in-RAM allocation bitmap for one volume.
pub struct ArmoredBitmap {
    words: Vec<RwLock<ArmorWord>>,
    len: u64,
    corrected: AtomicU64,
}

impl ArmoredBitmap {
    /// An all-clear bitmap covering `len` blocks.
    #[must_use]
    pub fn new(len: u64) -> Self {
        let word_count = (len as usize).div_ceil(64);
        let mut words = Vec::with_capacity(word_count);
        words.resize_with(word_count, || RwLock::new(ArmorWord::new(0)));
        Self {
            words,
            len,
            corrected: AtomicU64::new(0),
        }
    }

    /// Number of blocks covered.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bits silently repaired since open.
    #[must_use]
    pub fn corrected_count(&self) -> u64 {
        self.corrected.load(Ordering::Relaxed)
    }

    #[inline]
    fn slot(&self, idx: u64) -> (usize, u64) {
        debug_assert!(idx < self.len, "bitmap index out of range");
        ((idx / 64) as usize, 1u64 << (idx % 64))
    }

    /// Probe one bit.
    #[must_use]
    pub fn test(&self, idx: u64) -> BitState {
        let (w, mask) = self.slot(idx);
        // The read guard must not outlive the match: repair() re-acquires
        // the same lock for writing.
        let state = self.words[w].read().check();
        match state {
            ArmorState::Clean(word) => bit_state(word, mask),
            ArmorState::Corrected(word) => {
                self.repair(w);
                bit_state(word, mask)
            }
            ArmorState::Corrupt => BitState::Corrupt,
        }
    }

    /// Atomically set a bit, returning the previous state. On
    /// [`BitState::Corrupt`] nothing is modified.
    pub fn test_and_set(&self, idx: u64) -> BitState {
        let (w, mask) = self.slot(idx);
        let mut guard = self.words[w].write();
        match guard.check() {
            ArmorState::Clean(word) | ArmorState::Corrected(word) => {
                let prev = bit_state(word, mask);
                guard.store(word | mask);
                prev
            }
            ArmorState::Corrupt => BitState::Corrupt,
        }
    }

    /// Atomically clear a bit, returning the previous state. On
    /// [`BitState::Corrupt`] nothing is modified.
    pub fn clear(&self, idx: u64) -> BitState {
        let (w, mask) = self.slot(idx);
        let mut guard = self.words[w].write();
        match guard.check() {
            ArmorState::Clean(word) | ArmorState::Corrected(word) => {
                let prev = bit_state(word, mask);
                guard.store(word & !mask);
                prev
            }
            ArmorState::Corrupt => BitState::Corrupt,
        }
    }

    /// Set bits across the whole map (corrupt words are skipped).
    #[must_use]
    pub fn count_set(&self) -> u64 {
        self.words
            .iter()
            .map(|w| match w.read().check() {
                ArmorState::Clean(word) | ArmorState::Corrected(word) => {
                    u64::from(word.count_ones())
                }
                ArmorState::Corrupt => 0,
            })
            .sum()
    }

    /// Re-seal a word whose validation corrected a flipped bit.
    fn repair(&self, w: usize) {
        let mut guard = self.words[w].write();
        if let ArmorState::Corrected(word) = guard.check() {
            guard.store(word);
            self.corrected.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(word = w, "allocation bitmap word repaired after single-bit upset");
        }
    }

    /// Flip a raw data bit without touching the ECC, simulating an in-RAM
    /// upset. Used by the corruption test suites.
    pub(crate) fn upset_data_bit(&self, idx: u64) {
        let (w, _) = self.slot(idx);
        self.words[w].write().flip_raw_data_bit((idx % 64) as u8);
    }
}

#[inline]
fn bit_state(word: u64, mask: u64) -> BitState {
    if word & mask != 0 {
        BitState::Set
    } else {
        BitState::Clear
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_clear_cycle() {
        let bm = ArmoredBitmap::new(256);
        assert_eq!(bm.test(100), BitState::Clear);
        assert_eq!(bm.test_and_set(100), BitState::Clear);
        assert_eq!(bm.test(100), BitState::Set);
        assert_eq!(bm.test_and_set(100), BitState::Set);
        assert_eq!(bm.clear(100), BitState::Set);
        assert_eq!(bm.test(100), BitState::Clear);
        assert_eq!(bm.count_set(), 0);
    }

    #[test]
    fn test_single_upset_corrected_and_counted() {
        let bm = ArmoredBitmap::new(128);
        assert_eq!(bm.test_and_set(5), BitState::Clear);
        bm.upset_data_bit(6);
        // The upset bit reads through its corrected value.
        assert_eq!(bm.test(6), BitState::Clear);
        assert_eq!(bm.test(5), BitState::Set);
        assert!(bm.corrected_count() >= 1);
        // The word was re-sealed; further reads are clean.
        assert_eq!(bm.test(6), BitState::Clear);
    }

    #[test]
    fn test_double_upset_is_corrupt_not_sparse() {
        let bm = ArmoredBitmap::new(128);
        bm.upset_data_bit(3);
        bm.upset_data_bit(40);
        assert_eq!(bm.test(0), BitState::Corrupt);
        assert_eq!(bm.test_and_set(0), BitState::Corrupt);
        assert_eq!(bm.clear(0), BitState::Corrupt);
        // The neighbouring word is unaffected.
        assert_eq!(bm.test(64), BitState::Clear);
    }

    #[test]
    fn test_words_are_independent() {
        let bm = ArmoredBitmap::new(640);
        for i in (0..640).step_by(64) {
            assert_eq!(bm.test_and_set(i), BitState::Clear);
        }
        assert_eq!(bm.count_set(), 10);
    }

    #[test]
    fn test_concurrent_set_is_exclusive() {
        use std::sync::Arc;

        let bm = Arc::new(ArmoredBitmap::new(64));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let bm = Arc::clone(&bm);
            handles.push(std::thread::spawn(move || {
                let mut won = 0u32;
                for idx in 0..64 {
                    if bm.test_and_set(idx) == BitState::Clear {
                        won += 1;
                    }
                }
                won
            }));
        }
        let total: u32 = handles.into_iter().map(|h| h.join().expect("join")).sum();
        assert_eq!(total, 64, "every bit has exactly one winner");
    }
}
