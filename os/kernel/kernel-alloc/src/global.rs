//! # Global allocator adapter
//!
//! Exposes a [`NumaHeap`] through [`GlobalAlloc`]. The heap is built during
//! boot and installed once; until then every allocation fails.
//!
//! ```rust,ignore
//! #[global_allocator]
//! static GLOBAL_ALLOCATOR: NumaGlobalAlloc<BuddyPhys, BuddyRange, CurrentCpuNode> =
//!     NumaGlobalAlloc::new();
//!
//! // later, once ranges are built:
//! GLOBAL_ALLOCATOR.install(heap)?;
//! ```

use crate::heap::{NumaHeap, SizeClass};
use crate::numa::NodeId;
use crate::phys::PhysAllocator;
use core::alloc::{GlobalAlloc, Layout};
use core::marker::PhantomData;
use core::ptr::{self, NonNull};
use kernel_info::memory::PAGE_SIZE;
use kernel_sync::SyncOnceCell;

/// Tells the adapter which node the running code is on.
pub trait LocalityHint {
    fn current() -> NodeId;
}

/// Always the boot node; for single-node machines and early boot.
#[derive(Debug, Copy, Clone, Default)]
pub struct BootNode;

impl LocalityHint for BootNode {
    fn current() -> NodeId {
        NodeId::BOOT
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
#[error("a heap is already installed")]
pub struct AlreadyInstalled;

/// [`GlobalAlloc`] front end for a `'static` [`NumaHeap`].
pub struct NumaGlobalAlloc<P: 'static, R: 'static, L = BootNode> {
    heap: SyncOnceCell<&'static NumaHeap<P, R>>,
    _locality: PhantomData<fn() -> L>,
}

impl<P: 'static, R: 'static, L> Default for NumaGlobalAlloc<P, R, L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: 'static, R: 'static, L> NumaGlobalAlloc<P, R, L> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            heap: SyncOnceCell::new(),
            _locality: PhantomData,
        }
    }

    /// Makes `heap` the backing heap.
    ///
    /// # Errors
    /// [`AlreadyInstalled`] if a heap was installed before.
    pub fn install(&self, heap: &'static NumaHeap<P, R>) -> Result<(), AlreadyInstalled> {
        self.heap.set(heap).map_err(|_| AlreadyInstalled)
    }

    #[must_use]
    pub fn heap(&self) -> Option<&'static NumaHeap<P, R>> {
        self.heap.get().copied()
    }
}

/// Bytes to request so that the heap's natural alignment covers `layout`.
///
/// Slub objects are aligned to their power-of-two size, so asking for at
/// least `align` bytes is enough up to one page. Bypass allocations are only
/// page aligned; `None` if `layout` needs more.
#[must_use]
pub const fn effective_size(layout: Layout) -> Option<usize> {
    let size = if layout.size() > layout.align() {
        layout.size()
    } else {
        layout.align()
    };
    match SizeClass::of(size) {
        SizeClass::Bypass if (layout.align() as u64) > PAGE_SIZE => None,
        _ => Some(size),
    }
}

unsafe impl<P, R, L> GlobalAlloc for NumaGlobalAlloc<P, R, L>
where
    P: PhysAllocator + 'static,
    R: 'static,
    L: LocalityHint,
{
    /// # Safety
    /// The `GlobalAlloc` contract applies. Returns null when no heap is
    /// installed or the heap is out of memory.
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let (Some(heap), Some(size)) = (self.heap(), effective_size(layout)) else {
            return ptr::null_mut();
        };
        heap.alloc(size, L::current())
            .map_or(ptr::null_mut(), NonNull::as_ptr)
    }

    /// # Safety
    /// The `GlobalAlloc` contract applies. `ptr` and `layout` must match a prior allocation.
    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        if ptr.is_null() {
            return;
        }
        if let (Some(heap), Some(size)) = (self.heap(), effective_size(layout)) {
            unsafe { heap.free(ptr, size) };
        }
    }
}
