//! # Memory Layout

use core::fmt;
use core::ops::Add;

/// End of userspace VA range after which Kernel space begins.
pub const LAST_USERSPACE_ADDRESS: u64 = 0xffff_0000_0000_0000;

/// A simple Higher Half Direct Map (HHDM) base.
/// Anything you map at [`HHDM_BASE`] + `pa` lets the kernel
/// access physical memory via a fixed offset.
pub const HHDM_BASE: u64 = 0xffff_8880_0000_0000;

/// Where the kernel executes (VMA).
pub const KERNEL_BASE: u64 = 0xffff_ffff_8000_0000;

/// Base page size. The physical allocator never guarantees alignment finer than this.
pub const PAGE_SIZE: u64 = 4096;

const _: () = {
    assert!(PAGE_SIZE.is_power_of_two());
    assert!(HHDM_BASE >= LAST_USERSPACE_ADDRESS);
    assert!(KERNEL_BASE > HHDM_BASE);
};

/// Physical memory address.
///
/// Carries intent and prevents accidental VA/PA mix-ups. Alignment helpers
/// take a power-of-two byte alignment.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalAddress(u64);

impl PhysicalAddress {
    #[inline]
    #[must_use]
    pub const fn new(v: u64) -> Self {
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Round up to `align` (power of two).
    #[inline]
    #[must_use]
    pub const fn align_up(self, align: u64) -> Self {
        debug_assert!(align.is_power_of_two());
        Self((self.0 + (align - 1)) & !(align - 1))
    }

    /// Round down to `align` (power of two).
    #[inline]
    #[must_use]
    pub const fn align_down(self, align: u64) -> Self {
        debug_assert!(align.is_power_of_two());
        Self(self.0 & !(align - 1))
    }

    #[inline]
    #[must_use]
    pub const fn is_aligned(self, align: u64) -> bool {
        self.0 & (align - 1) == 0
    }
}

impl fmt::Debug for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PA(0x{:016X})", self.0)
    }
}

impl fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}

impl From<u64> for PhysicalAddress {
    #[inline]
    fn from(v: u64) -> Self {
        Self(v)
    }
}

impl Add<u64> for PhysicalAddress {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

/// Half-open physical interval `[start, end)`.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct PhysicalRange {
    pub start: PhysicalAddress,
    pub end: PhysicalAddress,
}

impl PhysicalRange {
    /// # Panics
    /// If `end < start`.
    #[inline]
    #[must_use]
    pub const fn new(start: PhysicalAddress, end: PhysicalAddress) -> Self {
        assert!(start.0 <= end.0, "physical range ends before it starts");
        Self { start, end }
    }

    #[inline]
    #[must_use]
    pub const fn from_raw(start: u64, end: u64) -> Self {
        Self::new(PhysicalAddress(start), PhysicalAddress(end))
    }

    /// `[base, base + length)`, saturating at the top of the address space.
    #[inline]
    #[must_use]
    pub const fn from_base_len(base: u64, length: u64) -> Self {
        Self::from_raw(base, base.saturating_add(length))
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.end.0 - self.start.0
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.start.0 == self.end.0
    }

    #[inline]
    #[must_use]
    pub const fn contains(&self, pa: PhysicalAddress) -> bool {
        self.start.0 <= pa.0 && pa.0 < self.end.0
    }

    /// Raises the start to `border`.
    ///
    /// Returns `None` when the whole range lies at or below `border`.
    #[inline]
    #[must_use]
    pub const fn clip_start(self, border: PhysicalAddress) -> Option<Self> {
        if self.end.0 <= border.0 {
            return None;
        }
        if self.start.0 < border.0 {
            Some(Self::new(border, self.end))
        } else {
            Some(self)
        }
    }
}

impl fmt::Debug for PhysicalRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[0x{:X}, 0x{:X})", self.start.0, self.end.0)
    }
}

impl fmt::Display for PhysicalRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.start, self.end)
    }
}

/// Fixed physical-to-virtual offset under which every physical address is
/// directly dereferenceable.
///
/// The kernel uses [`PhysWindow::HHDM`]. Hosted tests use
/// [`PhysWindow::IDENTITY`] so that "physical" addresses are ordinary host
/// pointers.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PhysWindow {
    base: u64,
}

impl PhysWindow {
    pub const HHDM: Self = Self::new(HHDM_BASE);
    pub const IDENTITY: Self = Self::new(0);

    #[inline]
    #[must_use]
    pub const fn new(base: u64) -> Self {
        Self { base }
    }

    #[inline]
    #[must_use]
    pub fn to_virt(self, pa: PhysicalAddress) -> *mut u8 {
        self.base.wrapping_add(pa.0) as usize as *mut u8
    }

    #[inline]
    #[must_use]
    pub fn to_phys(self, ptr: *const u8) -> PhysicalAddress {
        PhysicalAddress((ptr as usize as u64).wrapping_sub(self.base))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment_helpers() {
        let a = PhysicalAddress::new(0x12345);
        assert_eq!(a.align_down(0x1000).as_u64(), 0x12000);
        assert_eq!(a.align_up(0x1000).as_u64(), 0x13000);
        assert_eq!(a.align_up(0x1_0000).as_u64(), 0x2_0000);
        assert!(PhysicalAddress::new(0x2_0000).is_aligned(0x1_0000));
        assert_eq!(PhysicalAddress::new(0x2_0000).align_up(0x1_0000).as_u64(), 0x2_0000);
    }

    #[test]
    fn clip_start_drops_ranges_below_border() {
        let r = PhysicalRange::from_raw(0x1000, 0x8000);
        assert_eq!(r.clip_start(PhysicalAddress::new(0x0)), Some(r));
        assert_eq!(
            r.clip_start(PhysicalAddress::new(0x4000)),
            Some(PhysicalRange::from_raw(0x4000, 0x8000))
        );
        assert_eq!(r.clip_start(PhysicalAddress::new(0x8000)), None);
        assert_eq!(r.clip_start(PhysicalAddress::new(0x9000)), None);
    }

    #[test]
    fn window_round_trips() {
        let w = PhysWindow::HHDM;
        let pa = PhysicalAddress::new(0x1234_0000);
        let va = w.to_virt(pa);
        assert_eq!(va as usize as u64, HHDM_BASE + 0x1234_0000);
        assert_eq!(w.to_phys(va), pa);
        assert_eq!(PhysWindow::IDENTITY.to_virt(pa) as usize, 0x1234_0000);
    }

    #[test]
    fn range_queries() {
        let r = PhysicalRange::from_base_len(0x1000, 0x2000);
        assert_eq!(r.len(), 0x2000);
        assert!(!r.is_empty());
        assert!(r.contains(PhysicalAddress::new(0x1000)));
        assert!(!r.contains(PhysicalAddress::new(0x3000)));
    }
}
