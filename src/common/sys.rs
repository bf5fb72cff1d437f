//! Operating-system queries: available memory and hardware concurrency.

use std::io;

/// Upper bound on the default worker count.
pub const MAX_THREADS: usize = 99;

/// Default worker count: hardware concurrency capped at `MAX_THREADS`.
pub fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(MAX_THREADS)
}

/// Bytes of physical memory available to this process.
///
/// On Linux this is `MemAvailable` from /proc/meminfo. Elsewhere, or when
/// the kernel does not report it, falls back to the physical page count.
pub fn available_memory() -> io::Result<u64> {
    #[cfg(target_os = "linux")]
    {
        if let Some(bytes) = meminfo_available()? {
            return Ok(bytes);
        }
    }
    physical_memory()
}

#[cfg(target_os = "linux")]
fn meminfo_available() -> io::Result<Option<u64>> {
    let data = std::fs::read("/proc/meminfo")?;
    Ok(parse_meminfo_available(&data))
}

/// Extract `MemAvailable:` (reported in kB) as bytes.
pub fn parse_meminfo_available(data: &[u8]) -> Option<u64> {
    const FIELD: &[u8] = b"MemAvailable:";
    let start = memchr::memmem::find(data, FIELD)? + FIELD.len();
    let rest = &data[start..];
    let line_end = memchr::memchr(b'\n', rest).unwrap_or(rest.len());
    let digits: Vec<u8> = rest[..line_end]
        .iter()
        .copied()
        .skip_while(|b| b.is_ascii_whitespace())
        .take_while(|b| b.is_ascii_digit())
        .collect();
    let kb: u64 = std::str::from_utf8(&digits).ok()?.parse().ok()?;
    Some(kb * 1024)
}

#[cfg(unix)]
fn physical_memory() -> io::Result<u64> {
    // SAFETY: sysconf has no preconditions.
    let (pages, page_size) =
        unsafe { (libc::sysconf(libc::_SC_PHYS_PAGES), libc::sysconf(libc::_SC_PAGESIZE)) };
    if pages <= 0 || page_size <= 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(pages as u64 * page_size as u64)
}

#[cfg(not(unix))]
fn physical_memory() -> io::Result<u64> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "available memory query not supported on this platform",
    ))
}
