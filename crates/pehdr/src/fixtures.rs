//! Byte-level image fixtures for tests in this and downstream crates.

/// Write a minimal PE32+ header at `pos`: AMD64, three sections, GUI
/// subsystem, entry 0x1400, image base 0x1_4000_0000, 0x8000 bytes.
///
/// Panics if `b` is shorter than `pos + 0x100`.
pub fn write_pe64(b: &mut [u8], pos: usize) {
    b[pos] = b'M';
    b[pos + 1] = b'Z';
    b[pos + 0x3c..pos + 0x40].copy_from_slice(&0x80u32.to_le_bytes());
    let nt = pos + 0x80;
    b[nt..nt + 4].copy_from_slice(b"PE\0\0");
    b[nt + 4..nt + 6].copy_from_slice(&0x8664u16.to_le_bytes());
    b[nt + 6..nt + 8].copy_from_slice(&3u16.to_le_bytes());
    b[nt + 8..nt + 12].copy_from_slice(&0x6000_0000u32.to_le_bytes());
    b[nt + 20..nt + 22].copy_from_slice(&0xf0u16.to_le_bytes());
    b[nt + 22..nt + 24].copy_from_slice(&0x0022u16.to_le_bytes());
    let opt = nt + 24;
    b[opt..opt + 2].copy_from_slice(&0x20bu16.to_le_bytes());
    b[opt + 16..opt + 20].copy_from_slice(&0x1400u32.to_le_bytes());
    b[opt + 24..opt + 32].copy_from_slice(&0x1_4000_0000u64.to_le_bytes());
    b[opt + 56..opt + 60].copy_from_slice(&0x8000u32.to_le_bytes());
    b[opt + 60..opt + 64].copy_from_slice(&0x400u32.to_le_bytes());
    b[opt + 68..opt + 70].copy_from_slice(&2u16.to_le_bytes());
}
