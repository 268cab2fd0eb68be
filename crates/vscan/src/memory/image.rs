//! Memory image abstraction - wraps MmapFileLayer.

use crate::memory::error::ScanResult;
use crate::memory::layers::MmapFileLayer;
use crate::memory::traits::PhysicalLayer;
use crate::memory::translators::PageWalker;
use std::sync::Arc;

/// A memory-mapped forensic image.
pub struct MemoryImage {
    layer: Arc<MmapFileLayer>,
}

impl MemoryImage {
    /// Open a memory dump file.
    pub fn open(path: &str) -> ScanResult<Self> {
        let layer = MmapFileLayer::open("physical", path)?;
        Ok(MemoryImage {
            layer: Arc::new(layer),
        })
    }

    /// Size of the memory dump in bytes.
    pub fn size(&self) -> u64 {
        self.layer.size().unwrap_or(0)
    }

    /// Get a shared reference to the physical layer for use with translators.
    pub fn physical_layer(&self) -> Arc<dyn PhysicalLayer> {
        self.layer.clone() as Arc<dyn PhysicalLayer>
    }

    /// A page walker over this image, usable as a scan backend.
    pub fn page_walker(&self, cache_size: usize) -> PageWalker {
        PageWalker::new("virtual", self.physical_layer(), cache_size)
    }
}
