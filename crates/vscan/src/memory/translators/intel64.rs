//! Intel 64-bit (x86-64) page-table walker with optional EPT nesting.
//!
//! Walks PML4 -> PDPT -> PD -> PT over a physical layer. In nested mode the
//! guest tables live in guest-physical memory, so every guest table base and
//! the final guest-physical address go through a second walk of the EPT
//! hierarchy before they are read.

use crate::memory::error::{ScanError, ScanResult};
use crate::memory::mapping::{
    PhysicalMapping, TranslationRoot, LARGE_PAGE_SIZE, PAGE_SIZE, VIRTUAL_ADDRESS_BITS,
};
use crate::memory::traits::{AddressTranslator, PageReader, PhysicalLayer};
use crate::memory::translators::ept;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::trace;

/// Page table entry flags.
const PAGE_PRESENT: u64 = 1 << 0;
const PAGE_PSE: u64 = 1 << 7; // Page Size Extension (large page)
const PAGE_PAT_LARGE: u64 = 1 << 12; // PAT bit for large pages

/// Structure: PML4 (9 bits) -> PDPT (9 bits) -> PD (9 bits) -> PT (9 bits) -> Offset (12 bits)
const STRUCTURE: [(&str, u32, bool); 4] = [
    ("page map layer 4", 9, false),
    ("page directory pointer", 9, true), // 1GB pages
    ("page directory", 9, true),         // 2MB pages
    ("page table", 9, false),
];

/// Maximum physical address bits (Intel spec).
const MAXPHYADDR: u32 = 52;

/// Page shift (log2 of page size).
const PAGE_SHIFT: u32 = 12;

/// Entry size (8 bytes for 64-bit).
const ENTRY_SIZE: usize = 8;

const DEFAULT_CACHE_SIZE: NonZeroUsize = match NonZeroUsize::new(1024) {
    Some(n) => n,
    None => panic!("cache size must be non-zero"),
};

/// Which entry format a walk decodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    /// Ordinary IA-32e paging.
    Paging,
    /// Extended Page Tables.
    Ept,
}

impl Format {
    #[inline]
    fn is_present(self, entry: u64) -> bool {
        match self {
            Format::Paging => entry & PAGE_PRESENT != 0,
            Format::Ept => ept::ept_present(entry),
        }
    }
}

/// Leaf of a walk: the final entry and the bit position just below the
/// translated page number. The page size is `1 << (position + 1)`.
#[derive(Debug, Clone, Copy)]
struct Leaf {
    entry: u64,
    position: u32,
}

impl Leaf {
    #[inline]
    fn page_size(&self) -> u64 {
        1u64 << (self.position + 1)
    }

    #[inline]
    fn address_of(&self, address: u64) -> u64 {
        mask(self.entry, MAXPHYADDR - 1, self.position + 1) | mask(address, self.position, 0)
    }
}

/// Keep bits `high_bit..=low_bit` of `value`.
#[inline]
fn mask(value: u64, high_bit: u32, low_bit: u32) -> u64 {
    let high_mask = if high_bit >= 63 {
        u64::MAX
    } else {
        (1u64 << (high_bit + 1)).wrapping_sub(1)
    };
    let low_mask = if low_bit >= 64 {
        u64::MAX
    } else {
        (1u64 << low_bit).wrapping_sub(1)
    };
    value & (high_mask ^ low_mask)
}

/// x86-64 translator and page reader over a physical layer.
///
/// # Thread Safety
///
/// Both caches sit behind `parking_lot::Mutex`, so one walker can back any
/// number of concurrent scans.
pub struct PageWalker {
    name: String,
    base_layer: Arc<dyn PhysicalLayer>,
    /// Translated page-aligned addresses, keyed by the root they were walked with.
    entry_cache: Mutex<LruCache<(TranslationRoot, u64), PhysicalMapping>>,
    /// Page tables by host-physical address; `None` marks an unreadable or
    /// degenerate table.
    table_cache: Mutex<LruCache<u64, Option<Arc<[u8]>>>>,
}

impl PageWalker {
    /// Create a walker over `base_layer`.
    ///
    /// # Arguments
    /// * `name` - Name used in error messages
    /// * `base_layer` - The physical memory layer
    /// * `cache_size` - LRU capacity for translated pages (0 picks a default)
    pub fn new(name: impl Into<String>, base_layer: Arc<dyn PhysicalLayer>, cache_size: usize) -> Self {
        let entries = NonZeroUsize::new(cache_size).unwrap_or(DEFAULT_CACHE_SIZE);
        let tables = entries.saturating_add(1);
        PageWalker {
            name: name.into(),
            base_layer,
            entry_cache: Mutex::new(LruCache::new(entries)),
            table_cache: Mutex::new(LruCache::new(tables)),
        }
    }

    #[inline]
    fn address_mask() -> u64 {
        (1u64 << VIRTUAL_ADDRESS_BITS) - 1
    }

    /// Get a page table, rejecting tables whose entries are all identical.
    fn get_valid_table(&self, base_address: u64) -> Option<Arc<[u8]>> {
        if let Some(cached) = self.table_cache.lock().get(&base_address) {
            return cached.clone();
        }

        let table: Option<Arc<[u8]>> = match self.base_layer.read(base_address, PAGE_SIZE as usize) {
            Ok(t) => {
                // Windows fills unused tables with one repeated entry.
                let first = &t[..ENTRY_SIZE];
                if t.chunks_exact(ENTRY_SIZE).all(|chunk| chunk == first) {
                    None
                } else {
                    Some(t.into())
                }
            }
            Err(_) => None,
        };

        self.table_cache.lock().put(base_address, table.clone());
        table
    }

    /// Walk the four levels for `address`.
    ///
    /// `root_entry` must already carry the format's present bits. `resolve`
    /// turns each table base into a host-physical address.
    fn walk(
        &self,
        format: Format,
        root_entry: u64,
        address: u64,
        resolve: &dyn Fn(u64) -> ScanResult<u64>,
    ) -> ScanResult<Leaf> {
        let mut position = VIRTUAL_ADDRESS_BITS - 1;
        let mut entry = root_entry;

        for (name, size, large_page) in STRUCTURE.iter() {
            if !format.is_present(entry) {
                return Err(ScanError::paged_invalid_address(
                    &self.name,
                    address,
                    position + 1,
                    entry,
                    format!("Page Fault at entry {:#x} in table {}", entry, name),
                ));
            }

            let base_address = resolve(mask(entry, MAXPHYADDR - 1, PAGE_SHIFT))?;
            let table = self.get_valid_table(base_address).ok_or_else(|| {
                ScanError::paged_invalid_address(
                    &self.name,
                    address,
                    position + 1,
                    entry,
                    format!("Unreadable table {:#x} for {}", base_address, name),
                )
            })?;

            let start = position;
            position -= size;
            let index = (mask(address, start, position + 1) >> (position + 1)) as usize;
            let offset = index * ENTRY_SIZE;
            entry = u64::from_le_bytes([
                table[offset],
                table[offset + 1],
                table[offset + 2],
                table[offset + 3],
                table[offset + 4],
                table[offset + 5],
                table[offset + 6],
                table[offset + 7],
            ]);

            if *large_page && format.is_present(entry) && entry & PAGE_PSE != 0 {
                if format == Format::Paging && entry & PAGE_PAT_LARGE != 0 {
                    entry -= PAGE_PAT_LARGE;
                }
                break;
            }
        }

        if !format.is_present(entry) {
            return Err(ScanError::paged_invalid_address(
                &self.name,
                address,
                position + 1,
                entry,
                format!("Page Fault at entry {:#x} in page entry", entry),
            ));
        }

        Ok(Leaf { entry, position })
    }

    /// Guest-physical to host-physical through the EPT. Returns the host
    /// address and the EPT page size covering it.
    fn ept_translate(&self, eptp: u64, guest_physical: u64) -> ScanResult<(u64, u64)> {
        if guest_physical > Self::address_mask() {
            return Err(ScanError::invalid_address(
                &self.name,
                guest_physical,
                "Guest physical address beyond EPT reach",
            ));
        }
        let root_entry = ept::eptp_table_base(eptp) | ept::EPT_READ;
        let leaf = self.walk(Format::Ept, root_entry, guest_physical, &Ok::<u64, ScanError>)?;
        Ok((leaf.address_of(guest_physical), leaf.page_size()))
    }

    fn mapping(&self, physical_address: u64, page_size: u64) -> PhysicalMapping {
        PhysicalMapping {
            valid: true,
            bad: physical_address > self.base_layer.maximum_address(),
            address: physical_address,
            large: page_size >= LARGE_PAGE_SIZE,
        }
    }

    /// Translate one page-aligned virtual address.
    fn translate_page(&self, root: TranslationRoot, page_address: u64) -> ScanResult<PhysicalMapping> {
        match root {
            TranslationRoot::Paging { dtb } => {
                let root_entry = mask(dtb, MAXPHYADDR - 1, PAGE_SHIFT) | PAGE_PRESENT;
                let leaf = self.walk(Format::Paging, root_entry, page_address, &Ok::<u64, ScanError>)?;
                Ok(self.mapping(leaf.address_of(page_address), leaf.page_size()))
            }
            TranslationRoot::Nested { eptp, dtb } => {
                let levels = ept::eptp_walk_levels(eptp);
                if levels != STRUCTURE.len() as u64 {
                    return Err(ScanError::InvalidParameter(format!(
                        "EPTP {:#x} declares a {}-level walk",
                        eptp, levels
                    )));
                }
                let resolve = |gpa: u64| self.ept_translate(eptp, gpa).map(|(hpa, _)| hpa);
                let root_entry = mask(dtb, MAXPHYADDR - 1, PAGE_SHIFT) | PAGE_PRESENT;
                let leaf = self.walk(Format::Paging, root_entry, page_address, &resolve)?;
                let guest_physical = leaf.address_of(page_address);
                let (host_physical, ept_page_size) = self.ept_translate(eptp, guest_physical)?;
                Ok(self.mapping(host_physical, leaf.page_size().min(ept_page_size)))
            }
        }
    }

    /// Translate `va` under `root`, reporting why it failed.
    ///
    /// Addresses are truncated to 48 bits before walking.
    pub fn translate_address(&self, root: TranslationRoot, va: u64) -> ScanResult<PhysicalMapping> {
        let va = va & Self::address_mask();
        let page_address = va & !(PAGE_SIZE - 1);
        let page_offset = va & (PAGE_SIZE - 1);

        let cached = self.entry_cache.lock().get(&(root, page_address)).copied();
        let page = match cached {
            Some(m) => m,
            None => {
                let m = self.translate_page(root, page_address)?;
                self.entry_cache.lock().put((root, page_address), m);
                m
            }
        };

        Ok(PhysicalMapping {
            address: page.address + page_offset,
            ..page
        })
    }

    fn translate_or_invalid(&self, root: TranslationRoot, va: u64) -> PhysicalMapping {
        self.translate_address(root, va).unwrap_or_else(|e| {
            trace!("{}: {:#x} unmapped: {}", self.name, va, e);
            PhysicalMapping::INVALID
        })
    }
}

impl AddressTranslator for PageWalker {
    fn translate(&self, dtb: u64, va: u64) -> PhysicalMapping {
        self.translate_or_invalid(TranslationRoot::Paging { dtb }, va)
    }

    fn translate_nested(&self, eptp: u64, dtb: u64, va: u64) -> PhysicalMapping {
        self.translate_or_invalid(TranslationRoot::Nested { eptp, dtb }, va)
    }
}

impl PageReader for PageWalker {
    fn read_page(&self, mapping: &PhysicalMapping, out: &mut [u8]) -> bool {
        if !mapping.is_usable() {
            return false;
        }
        match self.base_layer.read_into(mapping.address, out) {
            Ok(()) => true,
            Err(e) => {
                trace!("{}: read of {:#x} failed: {}", self.name, mapping.address, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::layers::BufferLayer;

    const PML4: u64 = 0x1000;
    const PDPT: u64 = 0x2000;
    const PD: u64 = 0x3000;
    const PT: u64 = 0x4000;
    const DATA: u64 = 0x10000;
    const RW: u64 = 0x3;

    fn set(layer: &mut BufferLayer, table: u64, index: u64, value: u64) {
        layer.write_u64(table + index * 8, value).unwrap();
    }

    /// va = PML4[1] / PDPT[2] / PD[3] / PT[4]
    const VA: u64 = (1 << 39) | (2 << 30) | (3 << 21) | (4 << 12);

    fn flat_tables() -> BufferLayer {
        let mut layer = BufferLayer::zeroed("phys", 0x40_0000);
        set(&mut layer, PML4, 1, PDPT | RW);
        set(&mut layer, PDPT, 2, PD | RW);
        set(&mut layer, PD, 3, PT | RW);
        set(&mut layer, PT, 4, DATA | RW);
        // 2MB page at PD[5]
        set(&mut layer, PD, 5, 0x20_0000 | PAGE_PSE | PAGE_PAT_LARGE | RW);
        // frame beyond the layer
        set(&mut layer, PT, 6, 0x1_0000_0000 | RW);
        layer
    }

    fn walker(layer: BufferLayer) -> PageWalker {
        PageWalker::new("test_virtual", Arc::new(layer), 64)
    }

    #[test]
    fn test_mask() {
        assert_eq!(mask(0xFF, 7, 0), 0xFF);
        assert_eq!(mask(0xFF, 7, 4), 0xF0);
        assert_eq!(mask(0x12345678, 15, 8), 0x5600);
    }

    #[test]
    fn test_translate_4k_page() {
        let w = walker(flat_tables());
        let m = w.translate(PML4, VA + 0x123);
        assert!(m.valid);
        assert!(!m.bad);
        assert!(!m.large);
        assert_eq!(m.address, DATA + 0x123);
    }

    #[test]
    fn test_translate_large_page_strips_pat() {
        let w = walker(flat_tables());
        let va = (1 << 39) | (2 << 30) | (5 << 21) | 0x1234;
        let m = w.translate(PML4, va);
        assert!(m.valid && m.large);
        assert_eq!(m.address, 0x20_1234);
    }

    #[test]
    fn test_unmapped_is_invalid() {
        let w = walker(flat_tables());
        assert_eq!(w.translate(PML4, VA + 0x1000), PhysicalMapping::INVALID);
        assert_eq!(w.translate(PML4, 0), PhysicalMapping::INVALID);
        let err = w
            .translate_address(TranslationRoot::Paging { dtb: PML4 }, 0)
            .unwrap_err();
        assert!(matches!(err, ScanError::PagedInvalidAddress { .. }));
    }

    #[test]
    fn test_frame_beyond_layer_is_bad() {
        let w = walker(flat_tables());
        let m = w.translate(PML4, VA + 0x2000);
        assert!(m.valid);
        assert!(m.bad);
        assert!(!m.is_usable());
    }

    #[test]
    fn test_upper_bits_truncated() {
        let w = walker(flat_tables());
        let m = w.translate(PML4, 0xFFFF_0000_0000_0000 | VA);
        assert_eq!(m.address, DATA);
    }

    #[test]
    fn test_duplicate_table_rejected() {
        let mut layer = BufferLayer::zeroed("phys", 0x10000);
        for i in 0..512 {
            set(&mut layer, PML4, i, PDPT | RW);
        }
        let w = walker(layer);
        assert_eq!(w.translate(PML4, VA), PhysicalMapping::INVALID);
    }

    #[test]
    fn test_read_page() {
        let mut layer = flat_tables();
        layer.write(DATA, b"MZ").unwrap();
        let w = walker(layer);
        let m = w.translate(PML4, VA);
        let mut page = vec![0u8; PAGE_SIZE as usize];
        assert!(w.read_page(&m, &mut page));
        assert_eq!(&page[..2], b"MZ");
        assert!(!w.read_page(&PhysicalMapping::INVALID, &mut page));
        assert!(!w.read_page(&PhysicalMapping::page(0x3F_F800), &mut page));
    }

    #[test]
    fn test_nested_translation() {
        // EPT: GPA [0, 2MB) -> HPA [2MB, 4MB) via one 2MB leaf.
        const EPT_PML4: u64 = 0x5000;
        const EPT_PDPT: u64 = 0x6000;
        const EPT_PD: u64 = 0x7000;
        const HOST_BASE: u64 = 0x20_0000;
        let eptp = EPT_PML4 | (3 << 3) | 6;

        let mut layer = BufferLayer::zeroed("phys", 0x40_0000);
        set(&mut layer, EPT_PML4, 0, EPT_PDPT | ept::EPT_RWX);
        set(&mut layer, EPT_PDPT, 0, EPT_PD | ept::EPT_RWX);
        set(&mut layer, EPT_PD, 0, HOST_BASE | ept::EPT_LARGE | ept::EPT_RWX);

        // Guest tables at guest-physical PML4..PT, so host HOST_BASE + x.
        set(&mut layer, HOST_BASE + PML4, 0, PDPT | RW);
        set(&mut layer, HOST_BASE + PDPT, 0, PD | RW);
        set(&mut layer, HOST_BASE + PD, 0, PT | RW);
        set(&mut layer, HOST_BASE + PT, 1, 0x9000 | RW);
        let w = walker(layer);

        let m = w.translate_nested(eptp, PML4, 0x1010);
        assert!(m.valid && !m.large);
        assert_eq!(m.address, HOST_BASE + 0x9010);

        // Flat translation of the same root sees host memory and finds nothing.
        assert_eq!(w.translate(PML4, 0x1010), PhysicalMapping::INVALID);
        // Unmapped guest page.
        assert_eq!(w.translate_nested(eptp, PML4, 0x2000), PhysicalMapping::INVALID);
    }

    #[test]
    fn test_nested_rejects_short_walk() {
        let w = walker(flat_tables());
        let eptp = 0x5000 | (2 << 3) | 6;
        let err = w
            .translate_address(TranslationRoot::Nested { eptp, dtb: PML4 }, 0)
            .unwrap_err();
        assert!(matches!(err, ScanError::InvalidParameter(_)));
    }
}
