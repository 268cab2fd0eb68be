//! vscan: find executable images in the virtual address spaces of memory
//! snapshots.
//!
//! Given a paging root (and an EPT root for virtualized guests), the scanner
//! walks a virtual range page by page, resolves each page to physical memory,
//! and reports every page-aligned PE header it finds, including images that
//! are missing from the OS's module lists.
//!
//! # Example
//!
//! ```rust,ignore
//! use vscan::{MemoryImage, NeverCancel, ScanContext, ScanOptions, VirtualScanner};
//!
//! let image = MemoryImage::open("/cases/host.raw")?;
//! let options = ScanOptions::from_json_str(r#"{"dtb": "0x1ad000"}"#)?;
//! let scanner = VirtualScanner::new(ScanContext::for_image(&image, &options)?);
//! for extract in scanner.run(0x7ff0_0000_0000, 0x8000_0000_0000, None, &NeverCancel)? {
//!     println!("{:#x} {:?}", extract.va, extract.header.machine);
//! }
//! ```

pub mod config;
pub mod memory;
pub mod scanner;

#[cfg(test)]
mod testutil;

pub use config::ScanOptions;
pub use memory::error::{ScanError, ScanResult};
pub use memory::image::MemoryImage;
pub use memory::layers::{BufferLayer, MmapFileLayer};
pub use memory::mapping::{
    AddressSpace, PhysicalMapping, TranslationRoot, LARGE_PAGE_SIZE, PAGE_SIZE,
    VIRTUAL_ADDRESS_BITS, VIRTUAL_ADDRESS_LIMIT,
};
pub use memory::traits::{AddressTranslator, MemoryBackend, PageReader, PhysicalLayer};
pub use memory::translators::PageWalker;
pub use scanner::{
    detect_in_buffer, scan_parallel, CancelFn, Cancellation, Extract, NeverCancel, ScanContext,
    VirtualScanner,
};
