//! Parallel sort stage: each sorter owns a striped subset of buckets, loads
//! a bucket's fragments into one buffer, learned-sorts it and writes it at
//! the bucket's planned offset through its own output handle.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use rayon::prelude::*;
use tracing::{debug, warn};

use super::error::{Result, SortError};
use super::ingest::{Fragment, ReaderOutput};
use super::key::{RECORD_SIZE, embed_records};
use super::layout::BucketLayout;
use super::learned::learned_sort;
use super::rmi::RmiParams;

/// One non-empty bucket and the fragments that hold it, in reader order.
#[derive(Debug)]
pub struct BucketJob {
    pub index: usize,
    pub offset: u64,
    pub records: u64,
    pub fragments: Vec<Fragment>,
}

/// What one sorter did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SorterOutput {
    pub sorter: usize,
    pub buckets: usize,
    pub records: u64,
    pub fallbacks: usize,
}

/// Inputs shared by every sorter.
#[derive(Debug, Clone, Copy)]
pub struct SortContext<'p> {
    pub output: &'p Path,
    pub model: RmiParams,
    pub write_batch_records: usize,
}

/// Regroup reader fragments by bucket and stripe the non-empty buckets over
/// `num_sorters` sorters (bucket `i` goes to sorter `i % num_sorters`).
pub fn assign_buckets(
    layout: &BucketLayout,
    readers: Vec<ReaderOutput>,
    num_sorters: usize,
) -> Vec<Vec<BucketJob>> {
    let num_sorters = num_sorters.max(1);
    let mut per_bucket: Vec<Vec<Fragment>> =
        (0..layout.num_buckets()).map(|_| Vec::new()).collect();
    for output in readers {
        for (bucket, fragment) in output.fragments.into_iter().enumerate() {
            if let Some(fragment) = fragment {
                per_bucket[bucket].push(fragment);
            }
        }
    }

    let mut jobs: Vec<Vec<BucketJob>> = (0..num_sorters).map(|_| Vec::new()).collect();
    for (index, fragments) in per_bucket.into_iter().enumerate() {
        if layout.size(index) == 0 {
            continue;
        }
        jobs[index % num_sorters].push(BucketJob {
            index,
            offset: layout.offset(index),
            records: layout.size(index),
            fragments,
        });
    }
    jobs
}

/// Run one sorter per job list on a dedicated pool.
pub fn sort_buckets(ctx: &SortContext<'_>, jobs: Vec<Vec<BucketJob>>) -> Result<Vec<SorterOutput>> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.len().max(1))
        .thread_name(|i| format!("sorter-{}", i))
        .build()?;

    pool.install(|| {
        jobs.into_par_iter()
            .enumerate()
            .map(|(sorter, jobs)| run_sorter(ctx, sorter, jobs))
            .collect()
    })
}

fn run_sorter(ctx: &SortContext<'_>, sorter: usize, jobs: Vec<BucketJob>) -> Result<SorterOutput> {
    let mut summary = SorterOutput {
        sorter,
        ..SorterOutput::default()
    };
    if jobs.is_empty() {
        return Ok(summary);
    }

    let mut out = OpenOptions::new()
        .write(true)
        .open(ctx.output)
        .map_err(|source| SortError::OpenOutput {
            path: ctx.output.to_path_buf(),
            source,
        })?;

    for job in jobs {
        let (records, fell_back) = sort_bucket(ctx, &mut out, job)?;
        summary.buckets += 1;
        summary.records += records;
        summary.fallbacks += usize::from(fell_back);
    }

    out.flush()
        .map_err(|e| SortError::write(ctx.output.display().to_string(), e))?;
    Ok(summary)
}

fn sort_bucket(ctx: &SortContext<'_>, out: &mut File, job: BucketJob) -> Result<(u64, bool)> {
    let BucketJob {
        index,
        offset,
        records,
        fragments,
    } = job;

    // Fragments are dropped, and their files deleted, as soon as they are read.
    let mut buf = vec![0u8; records as usize * RECORD_SIZE];
    let mut head = 0usize;
    for mut fragment in fragments {
        let len = fragment.len_bytes();
        fragment.read_into(&mut buf[head..head + len])?;
        head += len;
    }
    debug_assert_eq!(head, buf.len());

    let mut embeddings = embed_records(&buf);
    let stats = learned_sort(&mut embeddings, &ctx.model);
    if let Some(report) = &stats.report {
        for correction in &report.corrections {
            warn!(bucket = index, "{}", correction);
        }
    }

    let what = || ctx.output.display().to_string();
    out.seek(SeekFrom::Start(offset))
        .map_err(|e| SortError::write(what(), e))?;

    let batch_records = ctx.write_batch_records.max(1);
    let mut batch = Vec::with_capacity(batch_records.min(embeddings.len()) * RECORD_SIZE);
    for chunk in embeddings.chunks(batch_records) {
        batch.clear();
        for e in chunk {
            batch.extend_from_slice(e.record());
        }
        out.write_all(&batch)
            .map_err(|e| SortError::write(what(), e))?;
    }

    debug!(
        bucket = index,
        records,
        offset,
        segments = stats.segments,
        repair_moves = stats.repair_moves,
        fell_back = stats.fell_back,
        "bucket sorted"
    );
    Ok((records, stats.fell_back))
}
