#![allow(
    clippy::needless_range_loop,
    clippy::manual_div_ceil,
    clippy::manual_range_contains,
    clippy::too_many_arguments
)]

/// Use mimalloc as the global allocator for all binaries.
/// Faster than glibc malloc for the many small per-bucket and per-batch
/// allocations the sort stages make, with better thread-local caching.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod common;
pub mod sort;

pub use sort::{SortConfig, SortError, SortSummary, check_sorted, run, sort_file};
