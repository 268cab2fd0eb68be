//! Physical mapping descriptors and address-space geometry.

use crate::memory::traits::AddressTranslator;
use serde::{Deserialize, Serialize};

/// Standard page size.
pub const PAGE_SIZE: u64 = 0x1000;

/// Large (2MB) page size.
pub const LARGE_PAGE_SIZE: u64 = 0x20_0000;

/// Maximum virtual address bits for 4-level paging.
pub const VIRTUAL_ADDRESS_BITS: u32 = 48;

/// Exclusive upper bound for scanned virtual addresses.
pub const VIRTUAL_ADDRESS_LIMIT: u64 = 1 << VIRTUAL_ADDRESS_BITS;

/// Result of translating one virtual page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PhysicalMapping {
    /// The walk reached a present leaf entry.
    pub valid: bool,
    /// The leaf decodes to something that cannot be backed (e.g. a frame
    /// beyond the physical layer).
    pub bad: bool,
    /// Physical address of the translated virtual address.
    pub address: u64,
    /// The leaf maps a large page rather than a standard page.
    pub large: bool,
}

impl PhysicalMapping {
    /// Unmapped / not present.
    pub const INVALID: PhysicalMapping = PhysicalMapping {
        valid: false,
        bad: false,
        address: 0,
        large: false,
    };

    /// A valid standard-page mapping.
    pub fn page(address: u64) -> Self {
        PhysicalMapping {
            valid: true,
            bad: false,
            address,
            large: false,
        }
    }

    /// A valid large-page mapping.
    pub fn large_page(address: u64) -> Self {
        PhysicalMapping {
            valid: true,
            bad: false,
            address,
            large: true,
        }
    }

    /// A mapping worth reading.
    #[inline]
    pub fn is_usable(&self) -> bool {
        self.valid && !self.bad
    }
}

/// Translation request: one root, or a guest root behind a nested root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TranslationRoot {
    Paging { dtb: u64 },
    Nested { eptp: u64, dtb: u64 },
}

impl TranslationRoot {
    /// Translate `va` with whichever form this root requires.
    pub fn translate<T: AddressTranslator + ?Sized>(&self, translator: &T, va: u64) -> PhysicalMapping {
        match *self {
            TranslationRoot::Paging { dtb } => translator.translate(dtb, va),
            TranslationRoot::Nested { eptp, dtb } => translator.translate_nested(eptp, dtb, va),
        }
    }
}

/// The detected address space of a process or guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressSpace {
    /// Paging root (CR3 value).
    pub dtb: u64,
    /// Nested translation root when the target is a virtualized guest.
    pub eptp: Option<u64>,
}

impl AddressSpace {
    pub fn new(dtb: u64) -> Self {
        AddressSpace { dtb, eptp: None }
    }

    pub fn nested(eptp: u64, dtb: u64) -> Self {
        AddressSpace {
            dtb,
            eptp: Some(eptp),
        }
    }

    pub fn root(&self) -> TranslationRoot {
        match self.eptp {
            Some(eptp) => TranslationRoot::Nested { eptp, dtb: self.dtb },
            None => TranslationRoot::Paging { dtb: self.dtb },
        }
    }
}
