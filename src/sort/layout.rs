//! Output layout of the buckets once every reader has finished.

use super::key::RECORD_SIZE;

/// Total size and output byte offset of every bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketLayout {
    sizes: Vec<u64>,
    offsets: Vec<u64>,
}

impl BucketLayout {
    /// Sum per-reader bucket counts and lay the buckets out back to back.
    pub fn plan<I, C>(num_buckets: usize, reader_counts: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: AsRef<[u64]>,
    {
        let mut sizes = vec![0u64; num_buckets];
        for counts in reader_counts {
            for (total, &n) in sizes.iter_mut().zip(counts.as_ref()) {
                *total += n;
            }
        }

        let offsets = sizes
            .iter()
            .scan(0u64, |next, &size| {
                let offset = *next;
                *next += size * RECORD_SIZE as u64;
                Some(offset)
            })
            .collect();

        BucketLayout { sizes, offsets }
    }

    pub fn num_buckets(&self) -> usize {
        self.sizes.len()
    }

    /// Records in bucket `i`.
    pub fn size(&self, i: usize) -> u64 {
        self.sizes[i]
    }

    /// Output byte offset of bucket `i`.
    pub fn offset(&self, i: usize) -> u64 {
        self.offsets[i]
    }

    pub fn total_records(&self) -> u64 {
        self.sizes.iter().sum()
    }

    pub fn sizes(&self) -> &[u64] {
        &self.sizes
    }

    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }
}
