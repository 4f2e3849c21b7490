//! Probabilistic deduplication.
//!
//! [`Deduplicator`] wraps a [`BloomFilter`] behind a mutex so that every
//! source driver can share one filter. Keys are derived from records with
//! [`dedup_key`].

pub mod bloom;

pub use bloom::BloomFilter;

use std::sync::Mutex;

use crate::error::DedupError;
use crate::record::{Record, scalar_text};

/// Shared membership test over a fixed-size bloom filter.
#[derive(Debug)]
pub struct Deduplicator {
    filter: Mutex<BloomFilter>,
}

impl Deduplicator {
    pub fn new(capacity: u64, error_rate: f64) -> Result<Self, DedupError> {
        Ok(Self {
            filter: Mutex::new(BloomFilter::new(capacity, error_rate)?),
        })
    }

    /// Returns `true` if `key` was seen before. Unseen keys are inserted.
    ///
    /// Never reports a previously considered key as new.
    pub fn consider(&self, key: &str) -> bool {
        // A panic while holding the lock cannot leave the bit vector in a
        // state that produces false negatives, so a poisoned guard is reused.
        let mut filter = match self.filter.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        filter.check_and_insert(key.as_bytes())
    }
}

/// Derive the deduplication key of a record.
///
/// The `identity_field` wins, the same field that names a record in
/// checkpoints. Failing that, `username` and `text` together form a
/// `"{username}:{text}"` key. Otherwise every field contributes as
/// `name=value`, sorted by name and joined with `:`.
pub fn dedup_key(record: &Record, identity_field: &str) -> String {
    if let Some(id) = record.get(identity_field) {
        return scalar_text(id);
    }

    if let (Some(username), Some(text)) = (record.get("username"), record.get("text")) {
        return format!("{}:{}", scalar_text(username), scalar_text(text));
    }

    let mut pairs: Vec<(&String, String)> = record
        .iter()
        .map(|(name, value)| (name, scalar_text(value)))
        .collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));
    pairs
        .into_iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join(":")
}
