//! PE header record types.

use serde::{Deserialize, Serialize};

/// `MZ` - first two bytes of every DOS/PE image.
pub const DOS_MAGIC: [u8; 2] = *b"MZ";

/// NT headers signature.
pub const PE_SIGNATURE: [u8; 4] = *b"PE\0\0";

/// `IMAGE_FILE_DLL` bit of the COFF characteristics.
pub const IMAGE_FILE_DLL: u16 = 0x2000;

/// Target machine from the COFF file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Machine {
    I386,
    Amd64,
    Arm,
    Arm64,
    Ia64,
    Unknown(u16),
}

impl From<u16> for Machine {
    fn from(value: u16) -> Self {
        match value {
            0x014c => Machine::I386,
            0x8664 => Machine::Amd64,
            0x01c0 | 0x01c4 => Machine::Arm,
            0xaa64 => Machine::Arm64,
            0x0200 => Machine::Ia64,
            other => Machine::Unknown(other),
        }
    }
}

/// Metadata of a detected PE header.
///
/// Offsets and RVAs are as stored in the header; nothing is relocated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeHeader {
    /// Offset of the NT headers from the start of the image.
    pub e_lfanew: u32,
    pub machine: Machine,
    pub number_of_sections: u16,
    pub time_date_stamp: u32,
    pub characteristics: u16,
    /// True for PE32+ (optional header magic 0x20b).
    pub is_64: bool,
    /// AddressOfEntryPoint (RVA).
    pub entry_point: u32,
    /// Preferred load address.
    pub image_base: u64,
    pub size_of_image: u32,
    pub size_of_headers: u32,
    pub subsystem: u16,
}

impl PeHeader {
    /// Whether the image is a DLL.
    pub fn is_dll(&self) -> bool {
        self.characteristics & IMAGE_FILE_DLL != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_machine_from_u16() {
        assert_eq!(Machine::from(0x8664), Machine::Amd64);
        assert_eq!(Machine::from(0x014c), Machine::I386);
        assert_eq!(Machine::from(0xaa64), Machine::Arm64);
        assert_eq!(Machine::from(0x1234), Machine::Unknown(0x1234));
    }

    #[test]
    fn test_header_serializes() {
        let header = PeHeader {
            e_lfanew: 0x80,
            machine: Machine::Amd64,
            number_of_sections: 4,
            time_date_stamp: 0x5f00_0000,
            characteristics: IMAGE_FILE_DLL | 0x22,
            is_64: true,
            entry_point: 0x1000,
            image_base: 0x1_8000_0000,
            size_of_image: 0x9000,
            size_of_headers: 0x400,
            subsystem: 3,
        };
        assert!(header.is_dll());
        let json = serde_json::to_string(&header).unwrap();
        assert!(json.contains("\"Amd64\""));
        let back: PeHeader = serde_json::from_str(&json).unwrap();
        assert_eq!(back, header);
    }
}
