//! Static coarse partitioning on the first two key bytes.
//!
//! Splits the whole input into buckets of roughly `avg_partition_records`
//! records before any model is trained. Buckets are ordered: every key in
//! bucket `i` compares less than or equal to every key in bucket `i + 1`
//! whenever their first two bytes differ, and keys sharing those two bytes
//! always share a bucket.

use super::key::{MAX_PREFIX_HASH, prefix_hash};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoarsePartitioner {
    num_partitions: usize,
    bin_width: u64,
}

impl CoarsePartitioner {
    /// Partitioner for `num_records` records. Always yields at least one
    /// partition and a bin width of at least one hash value.
    pub fn new(num_records: u64, avg_partition_records: u64) -> Self {
        let num_partitions = (num_records / avg_partition_records.max(1)).max(1) as usize;
        Self::with_partitions(num_partitions)
    }

    pub fn with_partitions(num_partitions: usize) -> Self {
        let num_partitions = num_partitions.max(1);
        let bin_width = (MAX_PREFIX_HASH / num_partitions as u64).max(1);
        CoarsePartitioner {
            num_partitions,
            bin_width,
        }
    }

    pub fn num_partitions(&self) -> usize {
        self.num_partitions
    }

    /// Bucket of a record (or bare key).
    #[inline]
    pub fn partition(&self, record: &[u8]) -> usize {
        let bin = (prefix_hash(record) / self.bin_width) as usize;
        bin.min(self.num_partitions - 1)
    }
}
