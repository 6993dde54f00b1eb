//! Slubs and chunks.
//!
//! A *chunk* of [`CHUNK_SIZE`] bytes is requested from the physical
//! allocator and sliced into [`SLUB_SIZE`]-aligned *slubs*. Padding in front
//! of the first and behind the last aligned slub is never used.
//!
//! ```text
//!  chunk base (page aligned)
//!  v
//!  +-----+----------+----------+-- ... --+----------+-----+
//!  | pad |  slub 0  |  slub 1  |         | slub n-1 | pad |
//!  +-----+----------+----------+-- ... --+----------+-----+
//!        ^ aligned to SLUB_SIZE
//! ```
//!
//! Every slub starts with a [`SlubHeader`] naming its owner node. Objects are
//! carved from the remainder, so any object pointer rounded down to
//! `SLUB_SIZE` finds its header.

use super::free_list::{FreeObject, IntrusiveStack, Linked};
use super::order::{ORDER_COUNT, Order};
use crate::numa::NodeId;
use crate::phys::PhysAllocator;
use core::ptr::NonNull;
use kernel_info::memory::{PhysWindow, PhysicalAddress, PhysicalRange};

/// Size and alignment of one slub.
pub const SLUB_SIZE: usize = 64 * 1024;

/// Bytes requested from the physical allocator per chunk.
pub const CHUNK_SIZE: usize = 64 * SLUB_SIZE;

/// A chunk yields at least this many slubs, whatever its alignment.
pub const MIN_SLUBS_PER_CHUNK: usize = CHUNK_SIZE / SLUB_SIZE - 1;

const _: () = assert!(SLUB_SIZE.is_power_of_two());
const _: () = assert!(CHUNK_SIZE % SLUB_SIZE == 0);
const _: () = assert!(Order::MAX.size() < SLUB_SIZE);
const _: () = assert!(kernel_info::memory::HHDM_BASE % SLUB_SIZE as u64 == 0);

/// Header at the start of every slub.
#[repr(C)]
pub(crate) struct SlubHeader {
    owner: NodeId,
    next: Option<NonNull<SlubHeader>>,
}

unsafe impl Linked for SlubHeader {
    unsafe fn link(this: *mut Self) -> *mut Option<NonNull<Self>> {
        unsafe { &raw mut (*this).next }
    }
}

impl SlubHeader {
    /// Reads the owner of the slub containing `object`.
    ///
    /// # Safety
    /// `object` must point into a slub carved by this module.
    pub(crate) unsafe fn owner_of(object: NonNull<u8>) -> NodeId {
        let header = (object.as_ptr() as usize & !(SLUB_SIZE - 1)) as *const Self;
        unsafe { (*header).owner }
    }
}

/// Errors from [`SlubCache::refill`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum ChunkError {
    #[error("physical allocator has no {} byte chunk for node {node}", CHUNK_SIZE)]
    OutOfMemory { node: NodeId },
    #[error("physical allocator returned a misaligned chunk at {addr}")]
    Misaligned { addr: PhysicalAddress },
}

/// The `SLUB_SIZE`-aligned part of the chunk at `base`.
#[must_use]
pub fn slub_span(base: PhysicalAddress) -> PhysicalRange {
    let slub = SLUB_SIZE as u64;
    let start = base.align_up(slub);
    let end = (base + CHUNK_SIZE as u64).align_down(slub);
    PhysicalRange::new(start, end.max(start))
}

/// Per-node slub reserve and per-order free lists.
pub struct SlubCache {
    reserve: IntrusiveStack<SlubHeader>,
    free: [IntrusiveStack<FreeObject>; ORDER_COUNT],
}

// SAFETY: the cache owns every block on its lists; it is only reached
// through the node arena's lock.
unsafe impl Send for SlubCache {}

impl Default for SlubCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SlubCache {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            reserve: IntrusiveStack::new(),
            free: [const { IntrusiveStack::new() }; ORDER_COUNT],
        }
    }

    /// Slubs sliced from chunks but not yet carved.
    #[must_use]
    pub const fn reserved(&self) -> usize {
        self.reserve.len()
    }

    /// Free objects of `order`.
    #[must_use]
    pub const fn free_objects(&self, order: Order) -> usize {
        self.free[order.slot()].len()
    }

    pub(crate) fn contains_free(&self, order: Order, object: NonNull<u8>) -> bool {
        self.free[order.slot()]
            .iter()
            .any(|o| o.cast::<u8>() == object)
    }

    pub(crate) fn pop_free(&mut self, order: Order) -> Option<NonNull<u8>> {
        self.free[order.slot()].pop().map(NonNull::cast)
    }

    /// # Safety
    /// `object` must be an unused object of `order` carved from a slub, and
    /// must not be accessed again until it is handed out by this cache.
    pub(crate) unsafe fn push_free(&mut self, order: Order, object: NonNull<u8>) {
        debug_assert_eq!(object.as_ptr() as usize % order.size(), 0);
        unsafe { self.free[order.slot()].push(object.cast()) }
    }

    /// Carves the next reserved slub into objects of `order`, keeping all
    /// but one on the free list and returning that one.
    pub(crate) fn carve(&mut self, order: Order) -> Option<NonNull<u8>> {
        let header = self.reserve.pop()?;
        let size = order.size();
        let base = header.as_ptr() as usize;
        let first = (base + size_of::<SlubHeader>()).next_multiple_of(size);
        let end = base + SLUB_SIZE;

        // Push high to low so objects are handed out in address order.
        let mut object = end - size;
        while object > first {
            // SAFETY: the slub is owned by this cache and the object lies
            // past the header, inside the slub.
            unsafe { self.push_free(order, NonNull::new_unchecked(object as *mut u8)) };
            object -= size;
        }
        NonNull::new(first as *mut u8)
    }

    /// Requests one chunk on behalf of `node` and adds its slubs to the
    /// reserve, each stamped with `node` as owner.
    ///
    /// Returns the number of slubs added.
    ///
    /// # Errors
    /// [`ChunkError::OutOfMemory`] if the physical allocator has nothing,
    /// [`ChunkError::Misaligned`] if it returned a chunk that is not page
    /// aligned. The reserve is unchanged on error.
    pub(crate) fn refill<P: PhysAllocator>(
        &mut self,
        phys: &P,
        window: PhysWindow,
        node: NodeId,
    ) -> Result<usize, ChunkError> {
        let base = phys
            .alloc_on_node(CHUNK_SIZE, node)
            .ok_or(ChunkError::OutOfMemory { node })?;
        if !base.is_aligned(kernel_info::memory::PAGE_SIZE) {
            // SAFETY: `base` came from this allocator and nothing used it.
            unsafe { phys.free(base) };
            return Err(ChunkError::Misaligned { addr: base });
        }

        let span = slub_span(base);
        let mut count = 0;
        let mut slub = span.start;
        while slub < span.end {
            let header = window.to_virt(slub).cast::<SlubHeader>();
            // SAFETY: the chunk is ours; `header` is SLUB_SIZE aligned and
            // inside it.
            unsafe {
                header.write(SlubHeader { owner: node, next: None });
                self.reserve.push(NonNull::new_unchecked(header));
            }
            count += 1;
            slub = slub + SLUB_SIZE as u64;
        }
        log::trace!("node {node}: chunk at {base} sliced into {count} slubs");
        Ok(count)
    }
}
