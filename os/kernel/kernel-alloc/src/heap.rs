//! # NUMA-aware slub heap
//!
//! Small requests (up to one page) are served from per-node, per-order free
//! lists of objects carved from 64 KiB *slubs*; larger requests go straight
//! to the physical allocator.
//!
//! ## Allocation
//!
//! For a slub-sized request on behalf of node `n`, every node in `n`'s
//! neighbor list (nearest first, `n` included) is tried in turn:
//!
//! 1. pop a free object of the matching order, else
//! 2. carve a reserved slub of that node, else
//! 3. ask the physical allocator for a fresh chunk for that node and carve
//!    one of its slubs.
//!
//! The first success wins. All of it happens under the locality lock with
//! local interrupts masked.
//!
//! ## Freeing
//!
//! Rounding an object pointer down to 64 KiB yields its slub header, which
//! names the owning node. The object goes back onto the *owner's* free list,
//! regardless of which node asked for it or which core frees it.

mod free_list;
mod order;
mod slub;

pub use order::{MAX_ORDER, MIN_ORDER, ORDER_COUNT, Order, SLUB_ORDERS, SizeClass};
pub use slub::{CHUNK_SIZE, ChunkError, MIN_SLUBS_PER_CHUNK, SLUB_SIZE, SlubCache, slub_span};

use crate::numa::{NeighborList, NodeArena, NodeId};
use crate::phys::PhysAllocator;
use core::ptr::NonNull;
use kernel_info::memory::PhysWindow;
use kernel_sync::SpinMutex;
use slub::SlubHeader;

/// The heap: node arena behind the locality lock plus the physical
/// allocator it draws chunks from.
pub struct NumaHeap<P, R: 'static> {
    phys: P,
    window: PhysWindow,
    nodes: SpinMutex<NodeArena<R>>,
}

impl<P: PhysAllocator, R: 'static> NumaHeap<P, R> {
    /// `window` translates the physical addresses `phys` returns into
    /// dereferenceable pointers.
    #[must_use]
    pub const fn new(phys: P, window: PhysWindow, nodes: NodeArena<R>) -> Self {
        Self {
            phys,
            window,
            nodes: SpinMutex::new(nodes),
        }
    }

    #[must_use]
    pub const fn physical(&self) -> &P {
        &self.phys
    }

    /// Exclusive access to the node arena, e.g. to install neighbor lists
    /// before the heap is shared.
    pub const fn nodes_mut(&mut self) -> &mut NodeArena<R> {
        self.nodes.get_mut()
    }

    /// Runs `f` on the node arena under the locality lock.
    #[must_use]
    pub fn with_nodes<U>(&self, f: impl FnOnce(&NodeArena<R>) -> U) -> U {
        let nodes = self.nodes.lock_irq();
        f(&nodes)
    }

    /// Allocates `size` bytes on behalf of `locality`.
    ///
    /// Slub-served objects are aligned to their size class. Returns `None`
    /// when no neighbor of `locality` can provide memory; nothing is
    /// changed in that case.
    ///
    /// # Panics
    /// If `locality` is not a node of this heap.
    #[must_use]
    pub fn alloc(&self, size: usize, locality: NodeId) -> Option<NonNull<u8>> {
        let order = match SizeClass::of(size) {
            SizeClass::Slub(order) => order,
            SizeClass::Bypass => {
                let pa = self.phys.alloc_on_behalf(size, locality)?;
                let object = NonNull::new(self.window.to_virt(pa));
                if object.is_none() {
                    // SAFETY: `pa` came from this allocator and was never handed out.
                    unsafe { self.phys.free(pa) };
                    log::debug!("node {locality}: block at {pa} maps to null, returned");
                }
                return object;
            }
        };

        let mut nodes = self.nodes.lock_irq();
        let neighbors: NeighborList = nodes.node(locality).neighbors().iter().copied().collect();

        for node in neighbors {
            let cache = nodes.node_mut(node).slubs_mut();
            if let Some(object) = cache.pop_free(order) {
                return Some(object);
            }
            if let Some(object) = cache.carve(order) {
                return Some(object);
            }
            match cache.refill(&self.phys, self.window, node) {
                Ok(_) => return cache.carve(order),
                Err(e) => log::trace!("{e}; trying next neighbor of node {locality}"),
            }
        }
        log::debug!("heap: no memory for {size} bytes on behalf of node {locality}");
        None
    }

    /// Returns `ptr` to the heap.
    ///
    /// # Safety
    /// `ptr` must come from [`alloc`](Self::alloc) on this heap with the same
    /// `size`, and must not be used afterwards.
    ///
    /// # Panics
    /// If `ptr` is null.
    pub unsafe fn free(&self, ptr: *mut u8, size: usize) {
        let Some(object) = NonNull::new(ptr) else {
            panic!("attempt to free a null pointer ({size} bytes)");
        };
        match SizeClass::of(size) {
            SizeClass::Bypass => unsafe { self.phys.free(self.window.to_phys(ptr)) },
            SizeClass::Slub(order) => {
                // SAFETY: slub-sized objects always live inside a slub.
                let owner = unsafe { SlubHeader::owner_of(object) };
                let mut nodes = self.nodes.lock_irq();
                unsafe { nodes.node_mut(owner).slubs_mut().push_free(order, object) };
            }
        }
    }

    /// Requests one chunk for `node` and adds its slubs to `node`'s reserve.
    ///
    /// # Errors
    /// See [`ChunkError`].
    ///
    /// # Panics
    /// If `node` is not a node of this heap.
    pub fn allocate_chunk(&self, node: NodeId) -> Result<usize, ChunkError> {
        let mut nodes = self.nodes.lock_irq();
        nodes
            .node_mut(node)
            .slubs_mut()
            .refill(&self.phys, self.window, node)
    }

    /// Free objects of `order` on `node`'s list.
    ///
    /// # Panics
    /// If `node` is not a node of this heap.
    #[must_use]
    pub fn free_objects(&self, node: NodeId, order: Order) -> usize {
        self.with_nodes(|n| n.node(node).slubs().free_objects(order))
    }

    /// Uncarved slubs in `node`'s reserve.
    ///
    /// # Panics
    /// If `node` is not a node of this heap.
    #[must_use]
    pub fn reserved_slubs(&self, node: NodeId) -> usize {
        self.with_nodes(|n| n.node(node).slubs().reserved())
    }

    /// Whether `object` currently sits on `node`'s free list for `order`.
    ///
    /// # Panics
    /// If `node` is not a node of this heap.
    #[must_use]
    pub fn is_free_on(&self, node: NodeId, order: Order, object: NonNull<u8>) -> bool {
        self.with_nodes(|n| n.node(node).slubs().contains_free(order, object))
    }

    /// Owner node recorded in the slub header of `object`.
    ///
    /// # Safety
    /// `object` must be a live slub-sized allocation of this heap.
    #[must_use]
    pub unsafe fn owner_of(&self, object: NonNull<u8>) -> NodeId {
        unsafe { SlubHeader::owner_of(object) }
    }
}
