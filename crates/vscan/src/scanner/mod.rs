//! Virtual address space scanning for executable images.
//!
//! - `VirtualScanner` - walks a virtual range page by page (the range scanner)
//! - `detect_in_buffer` - sweeps one page or large-page buffer for headers
//! - `scan_parallel` - splits a range across the Rayon pool

pub mod cancel;
pub mod context;
pub mod extract;
pub mod page_detector;
pub mod parallel;
pub mod virtual_scanner;

pub use cancel::{CancelFn, Cancellation, NeverCancel};
pub use context::ScanContext;
pub use extract::Extract;
pub use page_detector::detect_in_buffer;
pub use parallel::scan_parallel;
pub use virtual_scanner::VirtualScanner;
