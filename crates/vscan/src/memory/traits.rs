//! Core traits for abstracting memory access.
//!
//! [`PhysicalLayer`] is a flat physical byte source (a raw dump, a buffer).
//! [`AddressTranslator`] and [`PageReader`] are the two halves of the memory
//! backend the scanner consumes; [`MemoryBackend`] bundles them.

use crate::memory::error::ScanResult;
use crate::memory::mapping::PhysicalMapping;

/// Trait for reading from a physical memory layer.
pub trait PhysicalLayer: Send + Sync {
    /// Fill `buf` with bytes starting at `offset`.
    fn read_into(&self, offset: u64, buf: &mut [u8]) -> ScanResult<()>;

    /// Read `length` bytes starting at `offset`.
    fn read(&self, offset: u64, length: usize) -> ScanResult<Vec<u8>> {
        let mut buf = vec![0u8; length];
        self.read_into(offset, &mut buf)?;
        Ok(buf)
    }

    /// Check if the address range `[offset, offset+length)` is valid.
    fn is_valid(&self, offset: u64, length: u64) -> bool;

    /// The name of this layer.
    fn name(&self) -> &str;

    /// Maximum valid address in this layer.
    fn maximum_address(&self) -> u64;
}

/// Resolves virtual addresses to physical mappings.
///
/// Both forms are explicit so a caller holding a nested root cannot fall
/// back to the single-level walk by accident. Unmapped addresses are the
/// common case and come back as an invalid mapping, never as an error.
pub trait AddressTranslator: Send + Sync {
    /// Single-level translation through the paging root (CR3).
    fn translate(&self, dtb: u64, va: u64) -> PhysicalMapping;

    /// Two-level translation: guest paging root resolved through the
    /// nested (EPT) root.
    fn translate_nested(&self, eptp: u64, dtb: u64, va: u64) -> PhysicalMapping;
}

/// Materializes the bytes behind a physical mapping.
pub trait PageReader: Send + Sync {
    /// Fill `out` from the physical address of `mapping`.
    ///
    /// Returns `false` when the data cannot be produced; `out` is undefined
    /// in that case.
    fn read_page(&self, mapping: &PhysicalMapping, out: &mut [u8]) -> bool;
}

/// Translation plus page reads, shareable across concurrent scans.
pub trait MemoryBackend: AddressTranslator + PageReader + Send + Sync {}

impl<T: AddressTranslator + PageReader + ?Sized> MemoryBackend for T {}
