//! PE (Portable Executable) header detection for memory scanners.
//!
//! This crate answers one question cheaply: does an executable image header
//! begin at a given offset of a byte block? It validates the DOS stub, the
//! `PE\0\0` signature, the COFF file header and the leading part of the
//! optional header, and returns the header metadata. Section tables, imports
//! and relocations are deliberately left alone.
//!
//! # Example
//!
//! ```rust,ignore
//! use pehdr::{HeaderDetector, PeHeaderDetector};
//!
//! let detector = PeHeaderDetector;
//! if let Some(header) = detector.try_parse(&page, 0) {
//!     println!("{:?} image, {} sections", header.machine, header.number_of_sections);
//! }
//! ```

pub mod error;
#[cfg(any(test, feature = "test-support"))]
pub mod fixtures;
pub mod parser;
pub mod types;

// Re-export key types at crate root.
pub use error::{PeError, PeResult};
pub use parser::{has_dos_magic, parse_header, HeaderDetector, PeHeaderDetector};
pub use types::{Machine, PeHeader, DOS_MAGIC, PE_SIGNATURE};
