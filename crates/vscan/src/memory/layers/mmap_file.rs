//! Memory-mapped raw dump layer.
//!
//! Maps a physical memory dump read-only for zero-copy random access. Reads
//! copy straight from the map into the caller's buffer.

use crate::memory::error::{ScanError, ScanResult};
use crate::memory::traits::PhysicalLayer;
use memmap2::{Mmap, MmapOptions};
use parking_lot::RwLock;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Mapped file contents. Empty files have no map.
struct MmapState {
    mmap: Option<Mmap>,
    size: u64,
}

impl MmapState {
    fn as_slice(&self) -> &[u8] {
        self.mmap.as_deref().unwrap_or(&[])
    }
}

/// A read-only memory-mapped file layer.
///
/// # Thread Safety
///
/// Reads take a shared `parking_lot::RwLock` guard, so any number of scans
/// may read concurrently; only [`MmapFileLayer::destroy`] needs `&mut self`.
///
/// # Example
///
/// ```rust,ignore
/// let layer = MmapFileLayer::open("physical", "/cases/host.raw")?;
/// let mut page = [0u8; 4096];
/// layer.read_bytes_into(0x1000, &mut page, false)?;
/// ```
pub struct MmapFileLayer {
    name: String,
    /// File location as given (file:// URL or path).
    location: String,
    path: PathBuf,
    /// None once the layer has been destroyed.
    state: Option<Arc<RwLock<MmapState>>>,
}

impl MmapFileLayer {
    /// Parse a file:// URL to a path.
    fn parse_location(location: &str) -> PathBuf {
        let path_str = match location.strip_prefix("file://") {
            // file:///C:/path -> C:/path
            Some(url_path)
                if url_path.starts_with('/')
                    && url_path.len() > 2
                    && url_path.chars().nth(2) == Some(':') =>
            {
                &url_path[1..]
            }
            Some(url_path) => url_path,
            None => location,
        };
        PathBuf::from(urlencoding_decode(path_str))
    }

    fn create_mmap(path: &Path) -> ScanResult<MmapState> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        if size == 0 {
            return Ok(MmapState { mmap: None, size: 0 });
        }
        // SAFETY: the map is read-only; forensic images are not expected to
        // change underneath the scan.
        let mmap = unsafe { MmapOptions::new().map(&file)? };
        Ok(MmapState {
            mmap: Some(mmap),
            size,
        })
    }

    fn get_state(&self) -> ScanResult<&Arc<RwLock<MmapState>>> {
        self.state
            .as_ref()
            .ok_or_else(|| ScanError::layer_destroyed(&self.name))
    }

    /// Open a dump file.
    ///
    /// # Arguments
    ///
    /// * `name` - The name of the layer
    /// * `path` - File location (file:// URL or plain filesystem path)
    pub fn open(name: impl Into<String>, path: impl Into<String>) -> ScanResult<Self> {
        let name = name.into();
        let location = path.into();
        let resolved = Self::parse_location(&location);
        let state = Self::create_mmap(&resolved)?;

        Ok(MmapFileLayer {
            name,
            location,
            path: resolved,
            state: Some(Arc::new(RwLock::new(state))),
        })
    }

    /// Copy bytes at `offset` into `buf`.
    ///
    /// With `pad`, bytes beyond the end of the file read as zero; without it
    /// a short read is an error.
    pub fn read_bytes_into(&self, offset: u64, buf: &mut [u8], pad: bool) -> ScanResult<()> {
        let state = self.get_state()?;
        let guard = state.read();
        let data = guard.as_slice();
        let size = guard.size;
        let length = buf.len();

        if offset > size || (offset == size && length > 0) {
            if pad {
                buf.fill(0);
                return Ok(());
            }
            return Err(ScanError::invalid_address(
                &self.name,
                offset,
                "Offset outside of the buffer boundaries",
            ));
        }

        let start = offset as usize;
        let available = (size - offset) as usize;

        if length <= available {
            buf.copy_from_slice(&data[start..start + length]);
            Ok(())
        } else if pad {
            buf[..available].copy_from_slice(&data[start..]);
            buf[available..].fill(0);
            Ok(())
        } else {
            Err(ScanError::invalid_address(
                &self.name,
                offset + available as u64,
                "Could not read sufficient bytes from the file",
            ))
        }
    }

    /// Read `length` bytes at `offset` into a new vector.
    pub fn read_bytes(&self, offset: u64, length: usize, pad: bool) -> ScanResult<Vec<u8>> {
        let mut buf = vec![0u8; length];
        self.read_bytes_into(offset, &mut buf, pad)?;
        Ok(buf)
    }

    /// Size of the mapped file in bytes.
    pub fn size(&self) -> ScanResult<u64> {
        Ok(self.get_state()?.read().size)
    }

    /// Destroy the layer, releasing the map.
    pub fn destroy(&mut self) {
        self.state = None;
    }

    /// The file location as given to [`MmapFileLayer::open`].
    pub fn location(&self) -> &str {
        &self.location
    }

    /// The resolved filesystem path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PhysicalLayer for MmapFileLayer {
    fn read_into(&self, offset: u64, buf: &mut [u8]) -> ScanResult<()> {
        self.read_bytes_into(offset, buf, false)
    }

    fn is_valid(&self, offset: u64, length: u64) -> bool {
        if length == 0 {
            return false;
        }
        let size = match self.size() {
            Ok(s) if s > 0 => s,
            _ => return false,
        };
        let end_offset = offset.saturating_add(length).saturating_sub(1);
        offset < size && end_offset < size
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn maximum_address(&self) -> u64 {
        self.size().unwrap_or(0).saturating_sub(1)
    }
}

/// Simple URL decoding for file paths.
fn urlencoding_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let escape = bytes
                    .get(i + 1..i + 3)
                    .filter(|hex| hex.iter().all(u8::is_ascii_hexdigit))
                    .and_then(|hex| std::str::from_utf8(hex).ok())
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok());
                match escape {
                    Some(byte) => {
                        decoded.push(byte);
                        i += 3;
                    }
                    None => {
                        decoded.push(b'%');
                        i += 1;
                    }
                }
            }
            b'+' => {
                decoded.push(b' ');
                i += 1;
            }
            other => {
                decoded.push(other);
                i += 1;
            }
        }
    }

    // Escapes are UTF-8 bytes; a multi-byte character spans several of them.
    String::from_utf8_lossy(&decoded).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn layer_with(contents: &[u8]) -> (NamedTempFile, MmapFileLayer) {
        let mut tmpfile = NamedTempFile::new().unwrap();
        tmpfile.write_all(contents).unwrap();
        tmpfile.flush().unwrap();
        let layer = MmapFileLayer::open("test", tmpfile.path().to_str().unwrap()).unwrap();
        (tmpfile, layer)
    }

    #[test]
    fn test_parse_file_url() {
        let path = MmapFileLayer::parse_location("file:///tmp/test.raw");
        assert_eq!(path, PathBuf::from("/tmp/test.raw"));
    }

    #[test]
    fn test_parse_plain_path() {
        let path = MmapFileLayer::parse_location("/tmp/test.raw");
        assert_eq!(path, PathBuf::from("/tmp/test.raw"));
    }

    #[test]
    fn test_url_decode() {
        let path = MmapFileLayer::parse_location("file:///tmp/test%20file.raw");
        assert_eq!(path, PathBuf::from("/tmp/test file.raw"));
    }

    #[test]
    fn test_url_decode_multibyte() {
        let path = MmapFileLayer::parse_location("file:///tmp/caf%C3%A9.raw");
        assert_eq!(path, PathBuf::from("/tmp/café.raw"));
        // malformed escapes stay literal
        assert_eq!(urlencoding_decode("a%2"), "a%2");
        assert_eq!(urlencoding_decode("a%zz%41"), "a%zzA");
    }

    #[test]
    fn test_open_escaped_file_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("café.raw");
        std::fs::write(&path, b"MZdump").unwrap();
        let url = format!("file://{}/caf%C3%A9.raw", dir.path().to_str().unwrap());
        let layer = MmapFileLayer::open("dump", &url).unwrap();
        assert_eq!(layer.size().unwrap(), 6);
        assert_eq!(layer.read_bytes(0, 2, false).unwrap(), b"MZ");
    }

    #[test]
    fn test_open_and_read() {
        let (_f, layer) = layer_with(b"Hello, World!");
        assert_eq!(layer.read_bytes(0, 5, false).unwrap(), b"Hello");
        let mut buf = [0u8; 5];
        layer.read_into(7, &mut buf).unwrap();
        assert_eq!(&buf, b"World");
    }

    #[test]
    fn test_read_with_padding() {
        let (_f, layer) = layer_with(b"Hello");
        assert_eq!(layer.read_bytes(3, 5, true).unwrap(), b"lo\0\0\0");
        assert_eq!(layer.read_bytes(100, 3, true).unwrap(), b"\0\0\0");
    }

    #[test]
    fn test_read_out_of_bounds_no_pad() {
        let (_f, layer) = layer_with(b"Hello");
        assert!(layer.read_bytes(100, 3, false).is_err());
        let mut buf = [0u8; 8];
        assert!(layer.read_into(0, &mut buf).is_err());
    }

    #[test]
    fn test_is_valid_and_maximum_address() {
        let (_f, layer) = layer_with(b"0123456789");
        assert!(layer.is_valid(0, 10));
        assert!(layer.is_valid(9, 1));
        assert!(!layer.is_valid(10, 1));
        assert!(!layer.is_valid(0, 11));
        assert_eq!(layer.maximum_address(), 9);
        assert_eq!(PhysicalLayer::name(&layer), "test");
    }

    #[test]
    fn test_destroy() {
        let (_f, mut layer) = layer_with(b"data");
        assert!(layer.read_bytes(0, 4, false).is_ok());
        layer.destroy();
        assert!(matches!(
            layer.read_bytes(0, 4, false),
            Err(ScanError::LayerDestroyed(_))
        ));
    }
}
