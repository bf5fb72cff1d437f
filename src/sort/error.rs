//! Error type for the sort pipeline.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use super::key::RECORD_SIZE;
use crate::common::io_error_msg;

pub type Result<T> = std::result::Result<T, SortError>;

/// Every variant is fatal to a sort run.
#[derive(Debug, Error)]
pub enum SortError {
    #[error("cannot open input file {}: {}", .path.display(), io_error_msg(.source))]
    OpenInput { path: PathBuf, source: io::Error },

    #[error("cannot stat {}: {}", .path.display(), io_error_msg(.source))]
    Metadata { path: PathBuf, source: io::Error },

    #[error("cannot create output file {}: {}", .path.display(), io_error_msg(.source))]
    CreateOutput { path: PathBuf, source: io::Error },

    #[error("cannot open output file {}: {}", .path.display(), io_error_msg(.source))]
    OpenOutput { path: PathBuf, source: io::Error },

    #[error("cannot create temporary file in {}: {}", .dir.display(), io_error_msg(.source))]
    CreateFragment { dir: PathBuf, source: io::Error },

    #[error("read failed on {what}: {}", io_error_msg(.source))]
    Read { what: String, source: io::Error },

    #[error("short read on {what}: expected {expected} bytes, got {got}")]
    ShortRead {
        what: String,
        expected: usize,
        got: usize,
    },

    #[error("write failed on {what}: {}", io_error_msg(.source))]
    Write { what: String, source: io::Error },

    #[error("cannot determine available memory: {}", io_error_msg(.0))]
    MemoryQuery(#[source] io::Error),

    #[error(
        "input size {size} is not a multiple of the record width ({} bytes)",
        RECORD_SIZE
    )]
    TruncatedInput { size: u64 },

    #[error(
        "this size is not supported: {input_bytes} bytes with {available} bytes of memory \
         (max supported: {max_supported} bytes)"
    )]
    Infeasible {
        input_bytes: u64,
        available: u64,
        max_supported: u64,
    },

    #[error("cannot start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl SortError {
    pub(crate) fn read(what: impl Into<String>, source: io::Error) -> Self {
        SortError::Read {
            what: what.into(),
            source,
        }
    }

    pub(crate) fn write(what: impl Into<String>, source: io::Error) -> Self {
        SortError::Write {
            what: what.into(),
            source,
        }
    }
}
