//! Parallel ingest: readers scan disjoint byte ranges of the input, bucket
//! every record with the coarse partitioner and spill each bucket to a
//! per-reader fragment file.

use std::fs::File;
use std::io::{IoSlice, Seek, SeekFrom};
use std::ops::Range;
use std::path::Path;

use rayon::prelude::*;
use tracing::debug;

use super::error::{Result, SortError};
use super::key::RECORD_SIZE;
use super::partition::CoarsePartitioner;
use crate::common::io::{open_noatime, read_full, write_all_slices};

/// One reader's spill of one bucket. The backing file is anonymous and is
/// removed when the fragment is dropped.
#[derive(Debug)]
pub struct Fragment {
    file: File,
    records: u64,
}

impl Fragment {
    fn create(temp_dir: &Path) -> Result<Self> {
        let file = tempfile::tempfile_in(temp_dir).map_err(|source| SortError::CreateFragment {
            dir: temp_dir.to_path_buf(),
            source,
        })?;
        Ok(Fragment { file, records: 0 })
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn len_bytes(&self) -> usize {
        self.records as usize * RECORD_SIZE
    }

    /// Append the records at `locations` (record indices into `batch`).
    fn append(&mut self, batch: &[u8], locations: &[u32]) -> Result<()> {
        let slices: Vec<IoSlice<'_>> = locations
            .iter()
            .map(|&i| {
                let start = i as usize * RECORD_SIZE;
                IoSlice::new(&batch[start..start + RECORD_SIZE])
            })
            .collect();
        write_all_slices(&mut self.file, &slices)
            .map_err(|e| SortError::write("fragment file", e))?;
        self.records += locations.len() as u64;
        Ok(())
    }

    /// Read the whole fragment into `dst`, which must be exactly
    /// `len_bytes()` long.
    pub fn read_into(&mut self, dst: &mut [u8]) -> Result<()> {
        debug_assert_eq!(dst.len(), self.len_bytes());
        self.file
            .seek(SeekFrom::Start(0))
            .map_err(|e| SortError::read("fragment file", e))?;
        let got = read_full(&mut self.file, dst).map_err(|e| SortError::read("fragment file", e))?;
        if got != dst.len() {
            return Err(SortError::ShortRead {
                what: "fragment file".to_string(),
                expected: dst.len(),
                got,
            });
        }
        Ok(())
    }
}

/// Result of one reader: its fragment per bucket (absent when the reader
/// never saw a record of that bucket).
#[derive(Debug)]
pub struct ReaderOutput {
    pub reader: usize,
    pub fragments: Vec<Option<Fragment>>,
}

impl ReaderOutput {
    /// Records flushed per bucket.
    pub fn counts(&self) -> Vec<u64> {
        self.fragments
            .iter()
            .map(|f| f.as_ref().map_or(0, Fragment::records))
            .collect()
    }
}

/// Split the records of an `input_size`-byte input into `num_readers`
/// contiguous byte ranges.
/// All ranges have the same length except the last, which runs to
/// `input_size`.
pub fn reader_ranges(input_size: u64, num_readers: usize) -> Vec<Range<u64>> {
    let num_readers = num_readers.max(1) as u64;
    let num_records = input_size / RECORD_SIZE as u64;
    let per_reader = (num_records / num_readers) * RECORD_SIZE as u64;
    (0..num_readers)
        .map(|i| {
            let start = i * per_reader;
            let end = if i == num_readers - 1 {
                input_size
            } else {
                start + per_reader
            };
            start..end
        })
        .collect()
}

/// Inputs shared by every reader.
#[derive(Debug, Clone, Copy)]
pub struct IngestContext<'p> {
    pub input: &'p Path,
    pub temp_dir: &'p Path,
    pub partitioner: CoarsePartitioner,
    pub read_batch_records: usize,
}

/// Run one reader per range on a dedicated pool and collect the outputs in
/// reader order.
pub fn ingest(ctx: &IngestContext<'_>, ranges: &[Range<u64>]) -> Result<Vec<ReaderOutput>> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(ranges.len().max(1))
        .thread_name(|i| format!("reader-{}", i))
        .build()?;

    pool.install(|| {
        ranges
            .par_iter()
            .enumerate()
            .map(|(reader, range)| read_range(ctx, reader, range.clone()))
            .collect()
    })
}

fn read_range(ctx: &IngestContext<'_>, reader: usize, range: Range<u64>) -> Result<ReaderOutput> {
    let num_partitions = ctx.partitioner.num_partitions();
    let mut fragments: Vec<Option<Fragment>> = (0..num_partitions).map(|_| None).collect();

    let range_records = ((range.end - range.start) / RECORD_SIZE as u64) as usize;
    if range_records == 0 {
        return Ok(ReaderOutput { reader, fragments });
    }

    let mut input = open_noatime(ctx.input).map_err(|source| SortError::OpenInput {
        path: ctx.input.to_path_buf(),
        source,
    })?;
    input
        .seek(SeekFrom::Start(range.start))
        .map_err(|e| SortError::read(ctx.input.display().to_string(), e))?;

    let batch_records = ctx.read_batch_records.max(1).min(range_records);
    let mut batch = vec![0u8; batch_records * RECORD_SIZE];
    let mut locations: Vec<Vec<u32>> = vec![Vec::new(); num_partitions];

    let mut next = range.start;
    while next < range.end {
        let remaining = ((range.end - next) / RECORD_SIZE as u64) as usize;
        let bytes = remaining.min(batch_records) * RECORD_SIZE;
        let buf = &mut batch[..bytes];

        let got = read_full(&mut input, buf)
            .map_err(|e| SortError::read(ctx.input.display().to_string(), e))?;
        if got != bytes {
            return Err(SortError::ShortRead {
                what: ctx.input.display().to_string(),
                expected: bytes,
                got,
            });
        }

        for (i, record) in buf.chunks_exact(RECORD_SIZE).enumerate() {
            locations[ctx.partitioner.partition(record)].push(i as u32);
        }

        flush(ctx.temp_dir, buf, &mut locations, &mut fragments)?;
        next += bytes as u64;
    }

    debug!(
        reader,
        start = range.start,
        end = range.end,
        fragments = fragments.iter().flatten().count(),
        "reader finished"
    );
    Ok(ReaderOutput { reader, fragments })
}

/// Spill every non-empty location list to its bucket's fragment and clear it.
fn flush(
    temp_dir: &Path,
    batch: &[u8],
    locations: &mut [Vec<u32>],
    fragments: &mut [Option<Fragment>],
) -> Result<()> {
    for (locs, slot) in locations.iter_mut().zip(fragments.iter_mut()) {
        if locs.is_empty() {
            continue;
        }
        if slot.is_none() {
            *slot = Some(Fragment::create(temp_dir)?);
        }
        if let Some(fragment) = slot {
            fragment.append(batch, locs)?;
        }
        locs.clear();
    }
    Ok(())
}
