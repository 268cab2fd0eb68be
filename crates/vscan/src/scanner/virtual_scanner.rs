//! Page-range scanner.
//!
//! Scans a virtual range of one address space for executable image headers.
//! Three paths, picked from the input:
//!
//! 1. **Large page** - a hint flagged large is read whole (2MB) and swept once.
//! 2. **Single page** - a hint for a one-page request is read directly. With
//!    header rescan on, a start one page past a 64KB boundary also rescans the
//!    page before it through translation, where a page-aligned header for this
//!    allocation would sit.
//! 3. **General** - every page of the range is translated, read and swept.
//!    Unmapped, bad and unreadable pages are skipped silently; they are the
//!    common case in a sparse address space.

use crate::memory::error::{ScanError, ScanResult};
use crate::memory::mapping::{
    PhysicalMapping, LARGE_PAGE_SIZE, PAGE_SIZE, VIRTUAL_ADDRESS_BITS, VIRTUAL_ADDRESS_LIMIT,
};
use crate::memory::traits::MemoryBackend;
use crate::scanner::cancel::Cancellation;
use crate::scanner::context::ScanContext;
use crate::scanner::extract::Extract;
use crate::scanner::page_detector::detect_in_buffer;
use pehdr::{HeaderDetector, PeHeaderDetector};
use std::sync::Arc;
use tracing::debug;

/// Low address bits compared against one page width for the header rescan.
const RESCAN_MASK: u64 = 0xF000;

/// Reject empty, reversed, or over-wide ranges.
pub(crate) fn check_range(start: u64, stop: u64) -> ScanResult<()> {
    if start >= stop {
        return Err(ScanError::InvalidRange { start, stop });
    }
    if stop > VIRTUAL_ADDRESS_LIMIT {
        return Err(ScanError::AddressOutOfRange {
            address: stop,
            bits: VIRTUAL_ADDRESS_BITS,
        });
    }
    Ok(())
}

/// Scans virtual ranges of the address space in its [`ScanContext`].
///
/// A scanner is `Sync`; each call allocates its own page buffer, so one
/// scanner can serve concurrent calls over different sub-ranges.
pub struct VirtualScanner {
    ctx: ScanContext,
    detector: Arc<dyn HeaderDetector>,
}

impl VirtualScanner {
    /// Scanner looking for PE images.
    pub fn new(ctx: ScanContext) -> Self {
        Self::with_detector(ctx, Arc::new(PeHeaderDetector))
    }

    pub fn with_detector(ctx: ScanContext, detector: Arc<dyn HeaderDetector>) -> Self {
        VirtualScanner { ctx, detector }
    }

    pub fn context(&self) -> &ScanContext {
        &self.ctx
    }

    /// Scan `[start, stop)` with the context's backend.
    ///
    /// `hint` is a physical mapping the caller already holds for `start`.
    /// A large hint is read as one 2MB block and only hits inside
    /// `[start, stop)` are kept. A header rescan keeps the hinted page's hits
    /// and puts the hits of the page before `start` ahead of them.
    /// Cancellation returns the detections gathered so far.
    pub fn run<C: Cancellation + ?Sized>(
        &self,
        start: u64,
        stop: u64,
        hint: Option<&PhysicalMapping>,
        cancel: &C,
    ) -> ScanResult<Vec<Extract>> {
        self.run_on(self.ctx.backend().as_ref(), start, stop, hint, cancel)
    }

    /// Scan the whole 48-bit address space.
    pub fn run_full<C: Cancellation + ?Sized>(&self, cancel: &C) -> ScanResult<Vec<Extract>> {
        self.run(0, VIRTUAL_ADDRESS_LIMIT, None, cancel)
    }

    /// Like [`VirtualScanner::run`], reading through `backend` for this call
    /// instead of the context's.
    pub fn run_on<C: Cancellation + ?Sized>(
        &self,
        backend: &dyn MemoryBackend,
        start: u64,
        stop: u64,
        hint: Option<&PhysicalMapping>,
        cancel: &C,
    ) -> ScanResult<Vec<Extract>> {
        check_range(start, stop)?;

        let entry = match hint {
            Some(entry) => entry,
            None => return self.scan_range(backend, start, stop, cancel),
        };

        if entry.large {
            let mut block = vec![0u8; LARGE_PAGE_SIZE as usize];
            if !backend.read_page(entry, &mut block) {
                return Ok(Vec::new());
            }
            let mut found = self.detect(start, &block);
            found.retain(|e| (start..stop).contains(&e.va));
            return Ok(found);
        }

        if stop - start != PAGE_SIZE {
            return self.scan_range(backend, start, stop, cancel);
        }

        let rescan = self.ctx.header_rescan() && start & RESCAN_MASK == PAGE_SIZE;
        if rescan && self.ctx.address_space().is_none() {
            return Err(ScanError::NoAddressSpace);
        }

        let mut block = vec![0u8; PAGE_SIZE as usize];
        let found = if backend.read_page(entry, &mut block) {
            self.detect(start, &block)
        } else {
            Vec::new()
        };
        if !rescan {
            return Ok(found);
        }

        debug!(
            "Header rescan of {:#x} for single page at {:#x}",
            start - PAGE_SIZE,
            start
        );
        let mut rv = self.scan_range(backend, start - PAGE_SIZE, stop - PAGE_SIZE, cancel)?;
        rv.extend(found);
        Ok(rv)
    }

    fn detect(&self, va: u64, block: &[u8]) -> Vec<Extract> {
        let found = detect_in_buffer(self.detector.as_ref(), va, block);
        for extract in &found {
            debug!("Detected PE @ VA {:#x}", extract.va);
        }
        found
    }

    /// Translate, read and sweep each page of `[start, stop)`.
    fn scan_range<C: Cancellation + ?Sized>(
        &self,
        backend: &dyn MemoryBackend,
        start: u64,
        stop: u64,
        cancel: &C,
    ) -> ScanResult<Vec<Extract>> {
        let root = self
            .ctx
            .address_space()
            .ok_or(ScanError::NoAddressSpace)?
            .root();

        let mut block = vec![0u8; PAGE_SIZE as usize];
        let mut rv = Vec::new();
        let mut va = start;

        while va < stop {
            if cancel.is_cancelled() {
                debug!("Scan of [{:#x}, {:#x}) cancelled at {:#x}", start, stop, va);
                return Ok(rv);
            }

            let curr = va;
            va += PAGE_SIZE;

            let mapping = root.translate(backend, curr);
            if !mapping.is_usable() {
                continue;
            }
            if !backend.read_page(&mapping, &mut block) {
                continue;
            }

            rv.extend(self.detect(curr, &block));
        }

        debug!(
            "Scanned [{:#x}, {:#x}): {} detections",
            start,
            stop,
            rv.len()
        );
        Ok(rv)
    }
}
