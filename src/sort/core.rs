//! Orchestration of a full external sort.
//!
//! Pipeline:
//! - pre-flight: size the partitioning and both worker pools against the
//!   memory budget, refusing to start when one bucket cannot fit
//! - ingest: readers spill records to per-(reader, bucket) fragments
//! - layout: bucket sizes and output offsets (barrier after ingest)
//! - sort: sorters learned-sort whole buckets straight into place
//!
//! The output file is created only after ingest, so it may be the input.

use std::fs::File;
use std::mem::size_of;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::info;

use super::error::{Result, SortError};
use super::ingest::{IngestContext, ReaderOutput, ingest, reader_ranges};
use super::key::{Embedding, RECORD_SIZE, compare_records};
use super::layout::BucketLayout;
use super::partition::CoarsePartitioner;
use super::rmi::RmiParams;
use super::sorter::{SortContext, assign_buckets, sort_buckets};
use crate::common::io::{file_size, read_file};
use crate::common::sys::{available_memory, default_threads};

/// Target number of records per coarse bucket.
pub const AVG_PARTITION_RECS: u64 = 10_964_912;

/// Records read per ingest batch.
pub const READ_BATCH_RECS: usize = 1_000_000;

/// Records coalesced per output write.
pub const WRITE_BATCH_RECS: usize = 1_000;

/// Embedding copies alive per record while a bucket is sorted
/// (input slice, scatter buffer, model sample slack).
pub const IN_MEM_SORT_MEM_MULTIPLIER: u64 = 3;

/// A bucket's working set must stay below `available / FEASIBILITY_FACTOR`.
pub const FEASIBILITY_FACTOR: f64 = 1.4;

/// Configuration for a sort run.
#[derive(Debug, Clone)]
pub struct SortConfig {
    pub num_threads: usize,
    pub temp_dir: PathBuf,
    /// Memory budget in bytes; `None` queries available physical memory.
    pub buffer_size: Option<u64>,
    pub avg_partition_records: u64,
    pub read_batch_records: usize,
    pub write_batch_records: usize,
    pub model: RmiParams,
}

impl Default for SortConfig {
    fn default() -> Self {
        SortConfig {
            num_threads: default_threads(),
            temp_dir: PathBuf::from("."),
            buffer_size: None,
            avg_partition_records: AVG_PARTITION_RECS,
            read_batch_records: READ_BATCH_RECS,
            write_batch_records: WRITE_BATCH_RECS,
            model: RmiParams::default(),
        }
    }
}

/// Sizing decisions made before any data is read.
#[derive(Debug, Clone, PartialEq)]
pub struct SortPlan {
    pub input_size: u64,
    pub num_records: u64,
    pub partitioner: CoarsePartitioner,
    pub num_readers: usize,
    pub num_sorters: usize,
    /// Estimated bytes needed to sort one average bucket.
    pub bucket_working_set: u64,
    pub available_memory: u64,
}

impl SortPlan {
    /// Plan a run over `input_size` bytes with `available` bytes of memory.
    pub fn new(input_size: u64, available: u64, config: &SortConfig) -> Result<Self> {
        let num_threads = config.num_threads.max(1);
        let num_records = input_size / RECORD_SIZE as u64;
        let partitioner = CoarsePartitioner::new(num_records, config.avg_partition_records);
        let num_partitions = partitioner.num_partitions() as u64;

        let num_readers = (num_threads as u64).min(num_records).max(1) as usize;

        let avg_bucket_records = num_records.div_ceil(num_partitions);
        let per_record = RECORD_SIZE as u64
            + size_of::<Embedding<'static>>() as u64 * IN_MEM_SORT_MEM_MULTIPLIER;
        let bucket_working_set = avg_bucket_records * per_record;

        let batch_records = (config.read_batch_records.max(1) as u64).min(num_records);
        let ingest_bytes = batch_records * RECORD_SIZE as u64 * num_readers as u64;

        if ingest_bytes >= available
            || FEASIBILITY_FACTOR * bucket_working_set as f64 >= available as f64
        {
            return Err(SortError::Infeasible {
                input_bytes: input_size,
                available,
                max_supported: (num_threads as u64).saturating_mul(available),
            });
        }

        let by_memory = input_size.min(available) / bucket_working_set.max(1);
        let num_sorters = (num_threads as u64)
            .min(by_memory)
            .min(num_partitions)
            .max(1) as usize;

        Ok(SortPlan {
            input_size,
            num_records,
            partitioner,
            num_readers,
            num_sorters,
            bucket_working_set,
            available_memory: available,
        })
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortSummary {
    pub records: u64,
    pub buckets: usize,
    pub non_empty_buckets: usize,
    pub readers: usize,
    pub sorters: usize,
    pub fallbacks: usize,
}

/// Sort `input` into `output` with default settings except for the
/// temporary directory and thread count.
pub fn run(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    temp_dir: impl AsRef<Path>,
    num_threads: usize,
) -> Result<SortSummary> {
    let config = SortConfig {
        num_threads,
        temp_dir: temp_dir.as_ref().to_path_buf(),
        ..SortConfig::default()
    };
    sort_file(input.as_ref(), output.as_ref(), &config)
}

/// Sort the fixed-width records of `input` into `output`.
///
/// An empty input is a no-op and leaves `output` untouched.
pub fn sort_file(input: &Path, output: &Path, config: &SortConfig) -> Result<SortSummary> {
    let input_size = file_size(input).map_err(|source| SortError::Metadata {
        path: input.to_path_buf(),
        source,
    })?;
    if input_size == 0 {
        info!(input = %input.display(), "empty input, nothing to sort");
        return Ok(SortSummary::default());
    }
    if input_size % RECORD_SIZE as u64 != 0 {
        return Err(SortError::TruncatedInput { size: input_size });
    }

    let available = match config.buffer_size {
        Some(bytes) => bytes,
        None => available_memory().map_err(SortError::MemoryQuery)?,
    };
    let plan = SortPlan::new(input_size, available, config)?;
    info!(
        records = plan.num_records,
        partitions = plan.partitioner.num_partitions(),
        readers = plan.num_readers,
        sorters = plan.num_sorters,
        working_set = plan.bucket_working_set,
        available = plan.available_memory,
        "sort planned"
    );

    let started = Instant::now();
    let ingest_ctx = IngestContext {
        input,
        temp_dir: &config.temp_dir,
        partitioner: plan.partitioner,
        read_batch_records: config.read_batch_records,
    };
    let ranges = reader_ranges(input_size, plan.num_readers);
    let readers = ingest(&ingest_ctx, &ranges)?;

    let layout = BucketLayout::plan(
        plan.partitioner.num_partitions(),
        readers.iter().map(ReaderOutput::counts),
    );
    debug_assert_eq!(layout.total_records(), plan.num_records);
    let non_empty_buckets = layout.sizes().iter().filter(|&&n| n > 0).count();
    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        non_empty_buckets,
        "ingest finished"
    );

    create_output(output, input_size)?;

    let started = Instant::now();
    let sort_ctx = SortContext {
        output,
        model: config.model,
        write_batch_records: config.write_batch_records,
    };
    let jobs = assign_buckets(&layout, readers, plan.num_sorters);
    let sorted = sort_buckets(&sort_ctx, jobs)?;

    let records: u64 = sorted.iter().map(|s| s.records).sum();
    let fallbacks: usize = sorted.iter().map(|s| s.fallbacks).sum();
    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        records,
        fallbacks,
        "sort finished"
    );

    Ok(SortSummary {
        records,
        buckets: layout.num_buckets(),
        non_empty_buckets,
        readers: plan.num_readers,
        sorters: plan.num_sorters,
        fallbacks,
    })
}

/// Create (or truncate) `path` and size it to `len` bytes.
fn create_output(path: &Path, len: u64) -> Result<()> {
    let err = |source| SortError::CreateOutput {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(err)?;
    file.set_len(len).map_err(err)?;
    Ok(())
}

/// Check whether the records of `path` are in key order.
/// Returns the index of the first record whose key is smaller than its
/// predecessor's, or `None` when the file is sorted.
pub fn check_sorted(path: &Path) -> Result<Option<u64>> {
    let data = read_file(path).map_err(|source| SortError::OpenInput {
        path: path.to_path_buf(),
        source,
    })?;
    if data.len() % RECORD_SIZE != 0 {
        return Err(SortError::TruncatedInput {
            size: data.len() as u64,
        });
    }

    let mut records = data.chunks_exact(RECORD_SIZE);
    let Some(mut prev) = records.next() else {
        return Ok(None);
    };
    for (i, cur) in records.enumerate() {
        if compare_records(prev, cur) == std::cmp::Ordering::Greater {
            return Ok(Some(i as u64 + 1));
        }
        prev = cur;
    }
    Ok(None)
}

/// Parse a buffer size string like "10K", "1M", "1G".
pub fn parse_buffer_size(s: &str) -> std::result::Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty buffer size".to_string());
    }

    let (num_part, suffix) = if s.ends_with(|c: char| c.is_ascii_alphabetic()) {
        let (n, s) = s.split_at(s.len() - 1);
        (n, s.chars().next())
    } else {
        (s, None)
    };

    let base: u64 = num_part
        .parse()
        .map_err(|_| format!("invalid buffer size: {}", s))?;

    let multiplier: u64 = match suffix {
        Some('K') | Some('k') => 1024,
        Some('M') | Some('m') => 1024 * 1024,
        Some('G') | Some('g') => 1024 * 1024 * 1024,
        Some('T') | Some('t') => 1024u64.pow(4),
        Some('b') => 512,
        Some(c) => return Err(format!("invalid suffix '{}' in buffer size", c)),
        None => 1,
    };

    base.checked_mul(multiplier)
        .ok_or_else(|| format!("buffer size too large: {}", s))
}
