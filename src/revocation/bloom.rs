// ABOUTME: Bloom filter for the revocation fast path
// ABOUTME: Sized from an expected item count and a target false-positive rate
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

use sha2::{Digest, Sha256};
use std::f64::consts::LN_2;

const MIN_BITS: usize = 64;
const MAX_HASHES: u32 = 16;

/// Probabilistic set: no false negatives, bounded false positives
#[derive(Debug, Clone)]
pub struct BloomFilter {
    bits: Vec<u64>,
    bit_count: usize,
    hash_count: u32,
    items: usize,
}

impl BloomFilter {
    /// Filter sized for `expected_items` at `false_positive_rate`
    #[must_use]
    pub fn with_rate(expected_items: usize, false_positive_rate: f64) -> Self {
        let n = expected_items.max(1) as f64;
        let p = false_positive_rate.clamp(1e-9, 0.5);

        let bit_count = ((-n * p.ln()) / (LN_2 * LN_2)).ceil().max(MIN_BITS as f64) as usize;
        let hash_count = ((bit_count as f64 / n) * LN_2)
            .round()
            .clamp(1.0, f64::from(MAX_HASHES)) as u32;

        Self {
            bits: vec![0u64; bit_count.div_ceil(64)],
            bit_count,
            hash_count,
            items: 0,
        }
    }

    /// Add an item
    pub fn insert(&mut self, item: &str) {
        for index in self.indexes(item) {
            self.bits[index / 64] |= 1u64 << (index % 64);
        }
        self.items += 1;
    }

    /// Whether the item may be present; `false` is definitive
    #[must_use]
    pub fn might_contain(&self, item: &str) -> bool {
        self.indexes(item)
            .all(|index| self.bits[index / 64] & (1u64 << (index % 64)) != 0)
    }

    /// Number of inserted items
    #[must_use]
    pub const fn len(&self) -> usize {
        self.items
    }

    /// Whether nothing has been inserted
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.items == 0
    }

    /// Size of the bit array
    #[must_use]
    pub const fn bit_count(&self) -> usize {
        self.bit_count
    }

    /// Number of hash functions
    #[must_use]
    pub const fn hash_count(&self) -> u32 {
        self.hash_count
    }

    // Kirsch-Mitzenmacher double hashing over one SHA-256 digest
    fn indexes(&self, item: &str) -> impl Iterator<Item = usize> {
        let digest = Sha256::digest(item.as_bytes());
        let mut first = [0u8; 8];
        let mut second = [0u8; 8];
        first.copy_from_slice(&digest[..8]);
        second.copy_from_slice(&digest[8..16]);
        let h1 = u64::from_le_bytes(first);
        let h2 = u64::from_le_bytes(second) | 1;
        let modulus = self.bit_count as u64;

        (0..u64::from(self.hash_count))
            .map(move |i| (h1.wrapping_add(i.wrapping_mul(h2)) % modulus) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_false_negatives() {
        let mut filter = BloomFilter::with_rate(1000, 0.01);
        for i in 0..1000 {
            filter.insert(&format!("rid-{i}"));
        }
        assert_eq!(filter.len(), 1000);
        for i in 0..1000 {
            assert!(filter.might_contain(&format!("rid-{i}")));
        }
    }

    #[test]
    fn test_false_positive_rate_is_bounded() {
        let mut filter = BloomFilter::with_rate(1000, 0.01);
        for i in 0..1000 {
            filter.insert(&format!("revoked-{i}"));
        }
        let false_positives = (0..10_000)
            .filter(|i| filter.might_contain(&format!("live-{i}")))
            .count();
        // 1% target, generous margin
        assert!(false_positives < 300, "got {false_positives}");
    }

    #[test]
    fn test_sizing() {
        let filter = BloomFilter::with_rate(100_000, 0.001);
        assert!(filter.bit_count() > 1_400_000);
        assert_eq!(filter.hash_count(), 10);
        assert!(filter.is_empty());
    }
}
