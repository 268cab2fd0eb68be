//! Page-granular header sweep over one buffer.

use crate::memory::mapping::PAGE_SIZE;
use crate::scanner::extract::Extract;
use pehdr::{has_dos_magic, HeaderDetector};

/// Look for image headers at every page-aligned offset of `block`.
///
/// Only offsets starting with `MZ` reach the detector. Hits are stamped with
/// `va + offset` and returned in offset order; several images may share one
/// large-page block.
pub fn detect_in_buffer(detector: &dyn HeaderDetector, va: u64, block: &[u8]) -> Vec<Extract> {
    (0..block.len())
        .step_by(PAGE_SIZE as usize)
        .filter(|&pos| has_dos_magic(block, pos))
        .filter_map(|pos| {
            detector.try_parse(block, pos).map(|header| Extract {
                va: va + pos as u64,
                header,
            })
        })
        .collect()
}
