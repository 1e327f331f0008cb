//! Compact, time-ordered identifiers for content elements
//!
//! An identifier is six symbols of a URL safe 64 symbol alphabet. The value
//! packs a coarsened timestamp (4096 ms buckets since 2025-01-01T00:00:00Z)
//! above a 7 bit in-process counter, so one process can hand out 128
//! distinct identifiers per bucket. The first symbol only uses the 52
//! letters so every identifier is also a valid property name.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;

/// Symbols in value order
pub const ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// 2025-01-01T00:00:00Z in milliseconds since the Unix epoch
pub const UID_EPOCH_MS: i64 = 1_735_689_600_000;

const BUCKET_MS: i64 = 4096;
const COUNTER_BITS: u32 = 7;
const COUNTER_MASK: u8 = 0b0111_1111;
const VALUE_MASK: u64 = (1 << 36) - 1;

/// Identifier source with its own wrapping counter
#[derive(Debug, Default)]
pub struct UidGenerator {
    counter: AtomicU8,
}

impl UidGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifier for the current wall clock time
    pub fn next(&self) -> String {
        self.next_at(chrono::Utc::now().timestamp_millis())
    }

    /// Identifier for the given Unix time in milliseconds
    pub fn next_at(&self, unix_ms: i64) -> String {
        let counter = self
            .counter
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |c| {
                Some(c.wrapping_add(1) & COUNTER_MASK)
            })
            .unwrap_or_default();

        let bucket = (unix_ms - UID_EPOCH_MS).max(0) / BUCKET_MS;
        let value = ((bucket as u64) << COUNTER_BITS | u64::from(counter)) & VALUE_MASK;

        encode(value)
    }
}

fn encode(value: u64) -> String {
    (0..6)
        .map(|i| {
            let index = ((value >> (6 * (5 - i))) & 63) as usize;
            let index = if i == 0 { index % 52 } else { index };
            ALPHABET[index] as char
        })
        .collect()
}

/// Identifier from the process wide generator
pub fn uid() -> String {
    static GENERATOR: OnceLock<UidGenerator> = OnceLock::new();
    GENERATOR.get_or_init(UidGenerator::new).next()
}
