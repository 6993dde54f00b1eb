//! # Physical allocation contracts
//!
//! The heap and the range builder sit on top of three collaborators they do
//! not implement themselves:
//!
//! * [`PhysAllocator`]: hands out physical memory by NUMA node.
//! * [`RangeAllocator`]: the per-range sub-allocator the range builder
//!   initializes over each physical range.
//! * [`BootstrapArena`]: the early bump region that provides storage before
//!   any real allocator exists.

use crate::numa::NodeId;
use core::alloc::Layout;
use core::ptr::NonNull;
use kernel_info::memory::{PhysicalAddress, PhysicalRange};

/// NUMA-aware physical memory provider.
///
/// Returned addresses are page aligned and stay valid until passed to
/// [`free`](Self::free).
pub trait PhysAllocator: Sync {
    /// Allocates `size` bytes for `node` without taking the heap's locality
    /// lock; the heap calls this while already holding it. The memory may
    /// come from a different node when `node` is exhausted.
    fn alloc_on_node(&self, size: usize, node: NodeId) -> Option<PhysicalAddress>;

    /// Allocates `size` bytes close to `locality`, taking whatever locks the
    /// provider needs. Used for requests that bypass the slub layer.
    fn alloc_on_behalf(&self, size: usize, locality: NodeId) -> Option<PhysicalAddress>;

    /// Returns memory obtained from either allocation method.
    ///
    /// # Safety
    /// `addr` must have been returned by this allocator and not freed since.
    unsafe fn free(&self, addr: PhysicalAddress);
}

impl<P: PhysAllocator> PhysAllocator for &P {
    fn alloc_on_node(&self, size: usize, node: NodeId) -> Option<PhysicalAddress> {
        (**self).alloc_on_node(size, node)
    }

    fn alloc_on_behalf(&self, size: usize, locality: NodeId) -> Option<PhysicalAddress> {
        (**self).alloc_on_behalf(size, locality)
    }

    unsafe fn free(&self, addr: PhysicalAddress) {
        unsafe { (**self).free(addr) }
    }
}

/// Sub-allocator owning one physical range.
pub trait RangeAllocator: Send {
    /// Initializes an allocator that manages exactly `range`.
    fn new(range: PhysicalRange) -> Self;
}

/// Early bump region used before the real allocators are up.
///
/// # Safety
/// Memory returned by [`alloc`](Self::alloc) must be aligned to the
/// requested layout, exclusively owned by the caller and valid for the
/// lifetime of the kernel; it is never returned.
pub unsafe trait BootstrapArena {
    /// Allocates `layout`, or `None` when the arena is exhausted.
    fn alloc(&mut self, layout: Layout) -> Option<NonNull<u8>>;

    /// Ends the arena and returns its *border*: the first physical address
    /// above everything it handed out. Memory below the border must not be
    /// given to any other allocator.
    fn terminate(self) -> PhysicalAddress;
}
