//! In-memory physical layer.

use crate::memory::error::{ScanError, ScanResult};
use crate::memory::traits::PhysicalLayer;

/// Physical memory held in an owned buffer.
///
/// Handy for small snapshots and for building page tables in tests.
#[derive(Debug, Clone)]
pub struct BufferLayer {
    name: String,
    data: Vec<u8>,
}

impl BufferLayer {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        BufferLayer {
            name: name.into(),
            data,
        }
    }

    /// Zero-filled layer of `size` bytes.
    pub fn zeroed(name: impl Into<String>, size: usize) -> Self {
        Self::new(name, vec![0u8; size])
    }

    /// Copy `bytes` in at `offset`.
    pub fn write(&mut self, offset: u64, bytes: &[u8]) -> ScanResult<()> {
        let start = offset as usize;
        let end = start
            .checked_add(bytes.len())
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                ScanError::invalid_address(&self.name, offset, "Write past end of buffer")
            })?;
        self.data[start..end].copy_from_slice(bytes);
        Ok(())
    }

    /// Store a little-endian u64 at `offset`.
    pub fn write_u64(&mut self, offset: u64, value: u64) -> ScanResult<()> {
        self.write(offset, &value.to_le_bytes())
    }
}

impl PhysicalLayer for BufferLayer {
    fn read_into(&self, offset: u64, buf: &mut [u8]) -> ScanResult<()> {
        let start = usize::try_from(offset)
            .map_err(|_| ScanError::invalid_address(&self.name, offset, "Offset too large"))?;
        let src = start
            .checked_add(buf.len())
            .and_then(|end| self.data.get(start..end))
            .ok_or_else(|| {
                ScanError::invalid_address(
                    &self.name,
                    offset,
                    "Offset outside of the buffer boundaries",
                )
            })?;
        buf.copy_from_slice(src);
        Ok(())
    }

    fn is_valid(&self, offset: u64, length: u64) -> bool {
        length > 0
            && offset
                .checked_add(length)
                .is_some_and(|end| end <= self.data.len() as u64)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn maximum_address(&self) -> u64 {
        (self.data.len() as u64).saturating_sub(1)
    }
}
