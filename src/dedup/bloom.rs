//! Fixed-size bloom filter.
//!
//! Sized once from an expected capacity and a target false-positive rate.
//! Inserting past capacity is allowed; accuracy degrades and a warning is
//! logged the first time it happens. The filter never resizes.

use snafu::prelude::*;
use std::f64::consts::LN_2;
use tracing::warn;

use crate::error::{DedupError, InvalidErrorRateSnafu, TooLargeSnafu, ZeroCapacitySnafu};

#[derive(Debug, Clone)]
pub struct BloomFilter {
    bits: Vec<u64>,
    num_bits: u64,
    num_hashes: u32,
    capacity: u64,
    inserted: u64,
    overfull_logged: bool,
}

impl BloomFilter {
    /// Largest bit array a filter may allocate (1 GiB).
    pub const MAX_BITS: u64 = 1 << 33;

    /// Create a filter for `capacity` items at false-positive rate `error_rate`.
    pub fn new(capacity: u64, error_rate: f64) -> Result<Self, DedupError> {
        let (num_bits, num_hashes) = Self::check_params(capacity, error_rate)?;
        let words = num_bits.div_ceil(64) as usize;

        let mut bits = Vec::new();
        bits.try_reserve_exact(words)
            .ok()
            .context(TooLargeSnafu {
                capacity,
                bits: num_bits,
            })?;
        bits.resize(words, 0);

        Ok(Self {
            bits,
            num_bits,
            num_hashes,
            capacity,
            inserted: 0,
            overfull_logged: false,
        })
    }

    /// Validate sizing parameters without allocating a filter.
    ///
    /// Returns the bit count and hash count the filter would use.
    pub fn check_params(capacity: u64, error_rate: f64) -> Result<(u64, u32), DedupError> {
        ensure!(capacity > 0, ZeroCapacitySnafu);
        ensure!(
            error_rate.is_finite() && error_rate > 0.0 && error_rate < 1.0,
            InvalidErrorRateSnafu { rate: error_rate }
        );

        let n = capacity as f64;
        let wanted = ((-n * error_rate.ln()) / (LN_2 * LN_2)).ceil().max(64.0);
        ensure!(
            wanted <= Self::MAX_BITS as f64,
            TooLargeSnafu {
                capacity,
                bits: wanted as u64,
            }
        );

        let num_bits = wanted as u64;
        let num_hashes = ((num_bits as f64 / n) * LN_2).round().max(1.0) as u32;
        Ok((num_bits, num_hashes))
    }

    pub fn num_bits(&self) -> u64 {
        self.num_bits
    }

    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    /// Number of distinct inserts accepted so far.
    pub fn len(&self) -> u64 {
        self.inserted
    }

    pub fn is_empty(&self) -> bool {
        self.inserted == 0
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.indexes(key).all(|idx| self.bit(idx))
    }

    /// Insert `key`, returning whether it was (probably) present already.
    ///
    /// A key that is reported present is not re-inserted.
    pub fn check_and_insert(&mut self, key: &[u8]) -> bool {
        let indexes: Vec<u64> = self.indexes(key).collect();
        if indexes.iter().all(|&idx| self.bit(idx)) {
            return true;
        }

        for idx in indexes {
            self.set_bit(idx);
        }
        self.inserted += 1;

        if self.inserted > self.capacity && !self.overfull_logged {
            self.overfull_logged = true;
            warn!(
                capacity = self.capacity,
                inserted = self.inserted,
                "Bloom filter exceeded its capacity, false-positive rate will rise"
            );
        }
        false
    }

    // Kirsch-Mitzenmacher double hashing over one blake3 digest.
    fn indexes(&self, key: &[u8]) -> impl Iterator<Item = u64> + use<> {
        let digest = blake3::hash(key);
        let bytes = digest.as_bytes();
        let mut h1 = [0u8; 8];
        let mut h2 = [0u8; 8];
        h1.copy_from_slice(&bytes[0..8]);
        h2.copy_from_slice(&bytes[8..16]);
        let h1 = u64::from_le_bytes(h1);
        let h2 = u64::from_le_bytes(h2) | 1;
        let m = self.num_bits;

        (0..self.num_hashes as u64).map(move |i| h1.wrapping_add(i.wrapping_mul(h2)) % m)
    }

    fn bit(&self, idx: u64) -> bool {
        self.bits[(idx / 64) as usize] & (1 << (idx % 64)) != 0
    }

    fn set_bit(&mut self, idx: u64) {
        self.bits[(idx / 64) as usize] |= 1 << (idx % 64);
    }
}
