//! Parallel range scanning with Rayon.
//!
//! Splits one range into page-aligned chunks and scans them on the Rayon
//! pool. Every chunk runs through [`VirtualScanner::run`] with its own page
//! buffer; the shared backend is only read.

use crate::memory::error::ScanResult;
use crate::memory::mapping::PAGE_SIZE;
use crate::scanner::cancel::Cancellation;
use crate::scanner::extract::Extract;
use crate::scanner::virtual_scanner::{check_range, VirtualScanner};
use rayon::prelude::*;
use std::sync::atomic::AtomicBool;
use tracing::debug;

/// Split `[start, stop)` into chunks of `chunk_size` rounded up to whole pages.
fn chunk_bounds(start: u64, stop: u64, chunk_size: u64) -> Vec<(u64, u64)> {
    let chunk = chunk_size.max(PAGE_SIZE).div_ceil(PAGE_SIZE) * PAGE_SIZE;
    let mut bounds = Vec::new();
    let mut lo = start;
    while lo < stop {
        let hi = lo.saturating_add(chunk).min(stop);
        bounds.push((lo, hi));
        lo = hi;
    }
    bounds
}

/// Scan `[start, stop)` across the Rayon pool.
///
/// Results come back in ascending VA order, the same as a sequential
/// [`VirtualScanner::run`] over the whole range. Raising `cancel` stops
/// every chunk at its next page.
pub fn scan_parallel(
    scanner: &VirtualScanner,
    start: u64,
    stop: u64,
    chunk_size: u64,
    cancel: &AtomicBool,
) -> ScanResult<Vec<Extract>> {
    check_range(start, stop)?;
    let bounds = chunk_bounds(start, stop, chunk_size);
    debug!(
        "Parallel scan of [{:#x}, {:#x}) in {} chunks on {} threads",
        start,
        stop,
        bounds.len(),
        rayon::current_num_threads()
    );

    let parts = bounds
        .par_iter()
        .map(|&(lo, hi)| {
            if cancel.is_cancelled() {
                return Ok(Vec::new());
            }
            scanner.run(lo, hi, None, cancel)
        })
        .collect::<ScanResult<Vec<Vec<Extract>>>>()?;

    Ok(parts.into_iter().flatten().collect())
}

impl VirtualScanner {
    /// [`scan_parallel`] with the context's chunk size.
    pub fn run_parallel(&self, start: u64, stop: u64, cancel: &AtomicBool) -> ScanResult<Vec<Extract>> {
        scan_parallel(self, start, stop, self.context().chunk_size(), cancel)
    }
}
