//! Scanner configuration bound at construction.

use crate::config::{ScanOptions, DEFAULT_CHUNK_SIZE};
use crate::memory::error::ScanResult;
use crate::memory::image::MemoryImage;
use crate::memory::mapping::AddressSpace;
use crate::memory::traits::MemoryBackend;
use std::sync::Arc;

/// Immutable configuration of one scanner.
///
/// The backend may be shared by any number of scanners; the context itself
/// never changes after construction.
#[derive(Clone)]
pub struct ScanContext {
    backend: Arc<dyn MemoryBackend>,
    address_space: Option<AddressSpace>,
    header_rescan: bool,
    chunk_size: u64,
}

impl ScanContext {
    pub fn new(
        backend: Arc<dyn MemoryBackend>,
        address_space: Option<AddressSpace>,
        header_rescan: bool,
    ) -> Self {
        ScanContext {
            backend,
            address_space,
            header_rescan,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Sub-range width used by [`crate::VirtualScanner::run_parallel`].
    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Build a context from parsed options.
    pub fn from_options(backend: Arc<dyn MemoryBackend>, options: &ScanOptions) -> ScanResult<Self> {
        Ok(Self::new(
            backend,
            options.address_space()?,
            options.header_rescan,
        )
        .with_chunk_size(options.chunk_size))
    }

    /// Context over a raw dump, translated by a page walker.
    pub fn for_image(image: &MemoryImage, options: &ScanOptions) -> ScanResult<Self> {
        let walker = image.page_walker(options.cache_size);
        Self::from_options(Arc::new(walker), options)
    }

    pub fn backend(&self) -> &Arc<dyn MemoryBackend> {
        &self.backend
    }

    pub fn address_space(&self) -> Option<&AddressSpace> {
        self.address_space.as_ref()
    }

    pub fn header_rescan(&self) -> bool {
        self.header_rescan
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }
}

impl std::fmt::Debug for ScanContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanContext")
            .field("address_space", &self.address_space)
            .field("header_rescan", &self.header_rescan)
            .field("chunk_size", &self.chunk_size)
            .finish()
    }
}
