//! # Kernel Boot Information
//!
//! The firmware memory map handed over by the bootloader.

use crate::memory::PhysicalRange;

/// Type tag of a firmware memory-map entry.
///
/// Only [`MemoryKind::Usable`] memory may be claimed by the kernel's
/// allocators; everything else is reported for diagnostics only.
#[repr(u32)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum MemoryKind {
    Usable = 1,
    Reserved = 2,
    AcpiReclaimable = 3,
    AcpiNvs = 4,
    BadMemory = 5,
    BootloaderReclaimable = 0x1000,
    KernelAndModules = 0x1001,
    Framebuffer = 0x1002,
}

/// One `(base, length, kind)` entry of the firmware memory map.
#[repr(C)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct MemoryMapEntry {
    pub base: u64,
    pub length: u64,
    pub kind: MemoryKind,
}

impl MemoryMapEntry {
    #[must_use]
    pub const fn new(base: u64, length: u64, kind: MemoryKind) -> Self {
        Self { base, length, kind }
    }

    /// `[base, base + length)`
    #[must_use]
    pub const fn range(&self) -> PhysicalRange {
        PhysicalRange::from_base_len(self.base, self.length)
    }

    #[must_use]
    pub const fn is_usable(&self) -> bool {
        matches!(self.kind, MemoryKind::Usable)
    }
}

/// Borrowed view of the firmware memory map, in firmware order.
#[derive(Debug, Copy, Clone)]
pub struct MemoryMap<'a> {
    entries: &'a [MemoryMapEntry],
}

impl<'a> MemoryMap<'a> {
    #[must_use]
    pub const fn new(entries: &'a [MemoryMapEntry]) -> Self {
        Self { entries }
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &'a MemoryMapEntry> + use<'a> {
        self.entries.iter()
    }

    /// Ranges of all non-empty usable entries, in map order.
    ///
    /// Iterating twice yields the same sequence, which the boot-time range
    /// builder relies on for its sizing pass.
    pub fn usable(&self) -> impl Iterator<Item = PhysicalRange> + use<'a> {
        self.entries
            .iter()
            .filter(|e| e.is_usable() && e.length != 0)
            .map(MemoryMapEntry::range)
    }

    /// Total bytes of usable memory reported by firmware.
    #[must_use]
    pub fn usable_bytes(&self) -> u64 {
        self.usable().map(|r| r.len()).sum()
    }
}

/// Information the kernel needs from the bootloader to bring up memory.
#[derive(Debug, Copy, Clone, Default)]
pub struct BootInfo<'a> {
    /// Firmware memory map, or `None` if the bootloader did not provide one.
    pub memory_map: Option<MemoryMap<'a>>,
}
