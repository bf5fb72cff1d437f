//! Record layout, key encoding and the `Embedding` handle used by every
//! sorting pass.
//!
//! A record is a fixed-width block of `RECORD_SIZE` bytes. Its first
//! `KEY_SIZE` bytes are a printable-ASCII sort key; the rest is payload that
//! is only ever copied.

use std::cmp::Ordering;

/// Width of one record in bytes.
pub const RECORD_SIZE: usize = 100;

/// Width of the sort key prefix in bytes.
pub const KEY_SIZE: usize = 10;

/// Number of leading key bytes folded into the encoded ordinal.
/// The remaining key byte only takes part in byte comparisons.
pub const ENCODED_KEY_BYTES: usize = 9;

pub const MIN_PRINTABLE_CHAR: u8 = 32;
pub const MAX_PRINTABLE_CHAR: u8 = 127;

/// Radix of the mixed-radix key encoding.
pub const PRINTABLE_RANGE: u64 = (MAX_PRINTABLE_CHAR - MIN_PRINTABLE_CHAR) as u64;

/// Largest value produced by [`prefix_hash`].
pub const MAX_PREFIX_HASH: u64 = PRINTABLE_RANGE * PRINTABLE_RANGE + PRINTABLE_RANGE;

/// Digit value of one key byte. Bytes below the printable range clamp to 0.
#[inline(always)]
fn digit(b: u8) -> u64 {
    b.saturating_sub(MIN_PRINTABLE_CHAR) as u64
}

/// Encode the first `ENCODED_KEY_BYTES` bytes of `key` as a base-95 ordinal,
/// most significant digit first.
///
/// For printable input the result is strictly monotonic in the byte order of
/// the 9-byte prefix. Bytes outside the printable range are not validated.
#[inline]
pub fn encode_key(key: &[u8]) -> u64 {
    key[..ENCODED_KEY_BYTES]
        .iter()
        .fold(0u64, |acc, &b| acc * PRINTABLE_RANGE + digit(b))
}

/// Two-byte hash used by the coarse partitioner.
#[inline]
pub fn prefix_hash(key: &[u8]) -> u64 {
    digit(key[0]) * PRINTABLE_RANGE + digit(key[1])
}

/// Key prefix of a record.
#[inline(always)]
pub fn key_of(record: &[u8]) -> &[u8] {
    &record[..KEY_SIZE]
}

/// Byte-wise comparison of the full `KEY_SIZE` key of two records.
#[inline]
pub fn compare_records(a: &[u8], b: &[u8]) -> Ordering {
    key_of(a).cmp(key_of(b))
}

/// A record reference paired with its encoded key.
///
/// The embedding borrows the record from the buffer that holds it, so the
/// buffer cannot be dropped or reused while any embedding over it is alive.
#[derive(Debug, Clone, Copy, Default)]
pub struct Embedding<'a> {
    record: &'a [u8],
    pub converted_key: u64,
}

impl<'a> Embedding<'a> {
    #[inline]
    pub fn new(record: &'a [u8]) -> Self {
        Embedding {
            record,
            converted_key: encode_key(record),
        }
    }

    /// Full record bytes.
    #[inline(always)]
    pub fn record(&self) -> &'a [u8] {
        self.record
    }

    #[inline(always)]
    pub fn key(&self) -> &'a [u8] {
        key_of(self.record)
    }

    /// Total order over the full key bytes (not the encoded ordinal).
    #[inline]
    pub fn cmp_key(&self, other: &Self) -> Ordering {
        self.key().cmp(other.key())
    }
}

/// Build embeddings over every record of `buf`.
/// `buf.len()` must be a multiple of `RECORD_SIZE`.
pub fn embed_records(buf: &[u8]) -> Vec<Embedding<'_>> {
    debug_assert_eq!(buf.len() % RECORD_SIZE, 0);
    buf.chunks_exact(RECORD_SIZE).map(Embedding::new).collect()
}
