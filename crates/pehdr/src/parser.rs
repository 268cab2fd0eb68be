//! PE header validation.
//!
//! All offsets are relative to `pos`, the candidate image start inside the
//! block, so a header may sit anywhere in a larger buffer. Every field read is
//! bounds-checked against the block; a header that straddles the end of the
//! block is rejected rather than read short.

use crate::error::{PeError, PeResult};
use crate::types::{Machine, PeHeader, DOS_MAGIC, PE_SIGNATURE};
use tracing::trace;

/// Size of the DOS header (`IMAGE_DOS_HEADER`).
const DOS_HEADER_SIZE: usize = 0x40;

/// Offset of `e_lfanew` inside the DOS header.
const E_LFANEW_OFFSET: usize = 0x3c;

/// Accepted `e_lfanew` range. Anything outside is almost always noise.
const MIN_LFANEW: u32 = 0x40;
const MAX_LFANEW: u32 = 0x800;

/// Signature (4) + COFF file header (20).
const NT_HEADERS_PREFIX: usize = 24;

/// Optional header bytes consumed, through `DllCharacteristics`.
const OPTIONAL_HEADER_PREFIX: usize = 0x48;

/// Upper bound on section count (the loader refuses more than 96).
const MAX_SECTIONS: u16 = 96;

const PE32_MAGIC: u16 = 0x10b;
const PE32_PLUS_MAGIC: u16 = 0x20b;

/// Something that recognizes executable image headers in raw memory.
///
/// Implementations must not have side effects and must not assume `offset`
/// is the start of `block`.
pub trait HeaderDetector: Send + Sync {
    /// Parse a header starting at `offset`, or `None` if there is none.
    fn try_parse(&self, block: &[u8], offset: usize) -> Option<PeHeader>;
}

/// Default detector backed by [`parse_header`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PeHeaderDetector;

impl HeaderDetector for PeHeaderDetector {
    fn try_parse(&self, block: &[u8], offset: usize) -> Option<PeHeader> {
        match parse_header(block, offset) {
            Ok(header) => Some(header),
            Err(e) => {
                trace!("Rejected MZ candidate at block offset {:#x}: {}", offset, e);
                None
            }
        }
    }
}

/// Two-byte prefilter: `MZ` at `pos`.
#[inline]
pub fn has_dos_magic(block: &[u8], pos: usize) -> bool {
    block.get(pos..pos + 2) == Some(&DOS_MAGIC[..])
}

fn read_u16(block: &[u8], off: usize) -> PeResult<u16> {
    block
        .get(off..off + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or(PeError::Truncated {
            needed: off + 2,
            available: block.len(),
        })
}

fn read_u32(block: &[u8], off: usize) -> PeResult<u32> {
    block
        .get(off..off + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or(PeError::Truncated {
            needed: off + 4,
            available: block.len(),
        })
}

fn read_u64(block: &[u8], off: usize) -> PeResult<u64> {
    let lo = read_u32(block, off)? as u64;
    let hi = read_u32(block, off + 4)? as u64;
    Ok(lo | (hi << 32))
}

/// Validate a PE header at `pos` and extract its metadata.
pub fn parse_header(block: &[u8], pos: usize) -> PeResult<PeHeader> {
    if pos >= block.len() {
        return Err(PeError::OutOfBounds {
            offset: pos,
            len: block.len(),
        });
    }
    if !has_dos_magic(block, pos) {
        return Err(PeError::BadDosMagic);
    }
    if pos + DOS_HEADER_SIZE > block.len() {
        return Err(PeError::Truncated {
            needed: pos + DOS_HEADER_SIZE,
            available: block.len(),
        });
    }

    let e_lfanew = read_u32(block, pos + E_LFANEW_OFFSET)?;
    if !(MIN_LFANEW..=MAX_LFANEW).contains(&e_lfanew) {
        return Err(PeError::BadLfanew(e_lfanew));
    }

    let nt = pos + e_lfanew as usize;
    let opt = nt + NT_HEADERS_PREFIX;
    let needed = opt + OPTIONAL_HEADER_PREFIX;
    if needed > block.len() {
        return Err(PeError::Truncated {
            needed,
            available: block.len(),
        });
    }

    if block[nt..nt + 4] != PE_SIGNATURE {
        return Err(PeError::BadPeSignature);
    }

    // COFF file header
    let machine = Machine::from(read_u16(block, nt + 4)?);
    let number_of_sections = read_u16(block, nt + 6)?;
    if number_of_sections == 0 || number_of_sections > MAX_SECTIONS {
        return Err(PeError::BadSectionCount(number_of_sections));
    }
    let time_date_stamp = read_u32(block, nt + 8)?;
    let size_of_optional_header = read_u16(block, nt + 20)?;
    let characteristics = read_u16(block, nt + 22)?;

    if (size_of_optional_header as usize) < OPTIONAL_HEADER_PREFIX {
        return Err(PeError::BadOptionalSize(size_of_optional_header));
    }

    // Optional header; layouts agree everywhere except ImageBase.
    let is_64 = match read_u16(block, opt)? {
        PE32_MAGIC => false,
        PE32_PLUS_MAGIC => true,
        other => return Err(PeError::BadOptionalMagic(other)),
    };
    let entry_point = read_u32(block, opt + 16)?;
    let image_base = if is_64 {
        read_u64(block, opt + 24)?
    } else {
        read_u32(block, opt + 28)? as u64
    };
    let size_of_image = read_u32(block, opt + 56)?;
    if size_of_image == 0 {
        return Err(PeError::EmptyImage);
    }
    let size_of_headers = read_u32(block, opt + 60)?;
    let subsystem = read_u16(block, opt + 68)?;

    Ok(PeHeader {
        e_lfanew,
        machine,
        number_of_sections,
        time_date_stamp,
        characteristics,
        is_64,
        entry_point,
        image_base,
        size_of_image,
        size_of_headers,
        subsystem,
    })
}
