//! Extended Page Table (EPT) entry decoding.
//!
//! EPT entries carry R/W/X permission bits instead of a present bit; an entry
//! with none of them set is not present. Bit 7 marks a 1GB/2MB leaf at the
//! PDPT/PD levels, and the EPTP low 12 bits hold memory type and walk length.

/// EPT entry permission bits.
pub const EPT_READ: u64 = 1 << 0;
pub const EPT_WRITE: u64 = 1 << 1;
pub const EPT_EXECUTE: u64 = 1 << 2;
pub const EPT_RWX: u64 = EPT_READ | EPT_WRITE | EPT_EXECUTE;

/// Large page bit (PDPTE / PDE).
pub const EPT_LARGE: u64 = 1 << 7;

/// Bits 5:3 of the EPTP encode the page-walk length minus one.
const EPTP_WALK_LENGTH_SHIFT: u32 = 3;
const EPTP_WALK_LENGTH_MASK: u64 = 0b111;

/// Physical address bits 51:12.
const ADDRESS_MASK: u64 = 0x000F_FFFF_FFFF_F000;

/// Whether an EPT entry maps anything.
#[inline]
pub fn ept_present(entry: u64) -> bool {
    entry & EPT_RWX != 0
}

/// Host-physical base of the EPT PML4 table.
#[inline]
pub fn eptp_table_base(eptp: u64) -> u64 {
    eptp & ADDRESS_MASK
}

/// Number of paging levels the EPTP declares.
#[inline]
pub fn eptp_walk_levels(eptp: u64) -> u64 {
    ((eptp >> EPTP_WALK_LENGTH_SHIFT) & EPTP_WALK_LENGTH_MASK) + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ept_present() {
        assert!(ept_present(0x1000 | EPT_READ));
        assert!(ept_present(0x1000 | EPT_EXECUTE));
        assert!(!ept_present(0x1000));
        assert!(!ept_present(EPT_LARGE));
    }

    #[test]
    fn test_eptp_decode() {
        // Write-back (6), 4-level walk (3 << 3)
        let eptp = 0x1234_5000 | (3 << 3) | 6;
        assert_eq!(eptp_table_base(eptp), 0x1234_5000);
        assert_eq!(eptp_walk_levels(eptp), 4);
    }
}
