//! Fixtures shared by the scanner tests.

use crate::memory::mapping::{PhysicalMapping, PAGE_SIZE};
use crate::memory::traits::{AddressTranslator, PageReader};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

pub use pehdr::fixtures::write_pe64 as write_pe;

/// Page-granular translator and reader over a flat buffer, counting calls.
pub struct FakeBackend {
    physical: Vec<u8>,
    pages: HashMap<u64, PhysicalMapping>,
    failing_reads: HashSet<u64>,
    translations: AtomicUsize,
    nested_translations: AtomicUsize,
    reads: AtomicUsize,
    translated: Mutex<Vec<u64>>,
}

impl FakeBackend {
    pub fn new(physical_size: usize) -> Self {
        FakeBackend {
            physical: vec![0u8; physical_size],
            pages: HashMap::new(),
            failing_reads: HashSet::new(),
            translations: AtomicUsize::new(0),
            nested_translations: AtomicUsize::new(0),
            reads: AtomicUsize::new(0),
            translated: Mutex::new(Vec::new()),
        }
    }

    pub fn physical_mut(&mut self) -> &mut [u8] {
        &mut self.physical
    }

    pub fn map(&mut self, va: u64, pa: u64) {
        self.pages.insert(va, PhysicalMapping::page(pa));
    }

    pub fn map_bad(&mut self, va: u64, pa: u64) {
        let mapping = PhysicalMapping {
            bad: true,
            ..PhysicalMapping::page(pa)
        };
        self.pages.insert(va, mapping);
    }

    pub fn fail_reads_at(&mut self, pa: u64) {
        self.failing_reads.insert(pa);
    }

    pub fn translations(&self) -> usize {
        self.translations.load(Ordering::Relaxed)
    }

    pub fn nested_translations(&self) -> usize {
        self.nested_translations.load(Ordering::Relaxed)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn translated_vas(&self) -> Vec<u64> {
        self.translated.lock().clone()
    }

    fn lookup(&self, va: u64) -> PhysicalMapping {
        self.translated.lock().push(va);
        let page = va & !(PAGE_SIZE - 1);
        match self.pages.get(&page) {
            Some(m) => PhysicalMapping {
                address: m.address + (va - page),
                ..*m
            },
            None => PhysicalMapping::INVALID,
        }
    }
}

impl AddressTranslator for FakeBackend {
    fn translate(&self, _dtb: u64, va: u64) -> PhysicalMapping {
        self.translations.fetch_add(1, Ordering::Relaxed);
        self.lookup(va)
    }

    fn translate_nested(&self, _eptp: u64, _dtb: u64, va: u64) -> PhysicalMapping {
        self.nested_translations.fetch_add(1, Ordering::Relaxed);
        self.lookup(va)
    }
}

impl PageReader for FakeBackend {
    fn read_page(&self, mapping: &PhysicalMapping, out: &mut [u8]) -> bool {
        self.reads.fetch_add(1, Ordering::Relaxed);
        if self.failing_reads.contains(&mapping.address) {
            return false;
        }
        let start = mapping.address as usize;
        match self.physical.get(start..start + out.len()) {
            Some(src) => {
                out.copy_from_slice(src);
                true
            }
            None => false,
        }
    }
}
