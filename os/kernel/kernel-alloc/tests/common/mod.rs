#![allow(dead_code)]

use kernel_alloc::heap::SLUB_SIZE;
use kernel_alloc::numa::NodeId;
use kernel_alloc::phys::{BootstrapArena, PhysAllocator, RangeAllocator};
use kernel_info::memory::{PAGE_SIZE, PhysicalAddress, PhysicalRange};
use std::alloc::{Layout, alloc, dealloc};
use std::collections::HashMap;
use std::ptr::NonNull;
use std::sync::Mutex;

/// Bypass requests above this size fail.
pub const BYPASS_LIMIT: usize = 64 << 20;

/// Physical allocator backed by host memory.
///
/// Chunks are limited per node. Every block is page aligned but deliberately
/// *not* slub aligned, so chunk slicing has to deal with padding.
pub struct HostPhys {
    state: Mutex<State>,
}

struct State {
    chunk_budget: Vec<usize>,
    chunk_requests: Vec<NodeId>,
    live: HashMap<usize, (usize, Layout)>,
}

impl HostPhys {
    /// `budgets[n]` chunks can be allocated for node `n`.
    pub fn new(budgets: &[usize]) -> Self {
        Self {
            state: Mutex::new(State {
                chunk_budget: budgets.to_vec(),
                chunk_requests: Vec::new(),
                live: HashMap::new(),
            }),
        }
    }

    /// Nodes passed to `alloc_on_node`, in call order, successful or not.
    pub fn chunk_requests(&self) -> Vec<NodeId> {
        self.state.lock().unwrap().chunk_requests.clone()
    }

    pub fn live_blocks(&self) -> usize {
        self.state.lock().unwrap().live.len()
    }

    fn allocate(state: &mut State, size: usize) -> PhysicalAddress {
        let layout = Layout::from_size_align(size + SLUB_SIZE, SLUB_SIZE).unwrap();
        let raw = unsafe { alloc(layout) };
        assert!(!raw.is_null(), "host out of memory");
        let block = raw as usize + PAGE_SIZE as usize;
        state.live.insert(block, (raw as usize, layout));
        PhysicalAddress::new(block as u64)
    }
}

impl PhysAllocator for HostPhys {
    fn alloc_on_node(&self, size: usize, node: NodeId) -> Option<PhysicalAddress> {
        let mut state = self.state.lock().unwrap();
        state.chunk_requests.push(node);
        let budget = state.chunk_budget.get_mut(node.index())?;
        if *budget == 0 {
            return None;
        }
        *budget -= 1;
        Some(Self::allocate(&mut state, size))
    }

    fn alloc_on_behalf(&self, size: usize, _locality: NodeId) -> Option<PhysicalAddress> {
        if size > BYPASS_LIMIT {
            return None;
        }
        let mut state = self.state.lock().unwrap();
        Some(Self::allocate(&mut state, size))
    }

    unsafe fn free(&self, addr: PhysicalAddress) {
        let (raw, layout) = self
            .state
            .lock()
            .unwrap()
            .live
            .remove(&(addr.as_u64() as usize))
            .expect("free of unknown block");
        unsafe { dealloc(raw as *mut u8, layout) };
    }
}

impl Drop for HostPhys {
    fn drop(&mut self) {
        for (_, (raw, layout)) in self.state.get_mut().unwrap().live.drain() {
            unsafe { dealloc(raw as *mut u8, layout) };
        }
    }
}

/// Bootstrap arena handing out leaked host memory up to a byte budget.
pub struct HostArena {
    budget: usize,
    border: PhysicalAddress,
}

impl HostArena {
    pub fn new(budget: usize, border: u64) -> Self {
        Self {
            budget,
            border: PhysicalAddress::new(border),
        }
    }
}

unsafe impl BootstrapArena for HostArena {
    fn alloc(&mut self, layout: Layout) -> Option<NonNull<u8>> {
        if layout.size() > self.budget {
            return None;
        }
        self.budget -= layout.size();
        NonNull::new(unsafe { alloc(layout) })
    }

    fn terminate(self) -> PhysicalAddress {
        self.border
    }
}

/// Range sub-allocator that only remembers what it was given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recorded {
    pub range: PhysicalRange,
    pub touched: usize,
}

impl RangeAllocator for Recorded {
    fn new(range: PhysicalRange) -> Self {
        Self { range, touched: 0 }
    }
}

/// Physical allocator handing out fixed addresses without backing memory.
///
/// Only useful for paths that must give a block back before touching it.
pub struct FixedPhys {
    chunk: PhysicalAddress,
    block: PhysicalAddress,
    freed: Mutex<Vec<PhysicalAddress>>,
}

impl FixedPhys {
    /// Every chunk request yields `chunk`, every bypass request `block`.
    pub fn new(chunk: u64, block: u64) -> Self {
        Self {
            chunk: PhysicalAddress::new(chunk),
            block: PhysicalAddress::new(block),
            freed: Mutex::new(Vec::new()),
        }
    }

    pub fn freed(&self) -> Vec<PhysicalAddress> {
        self.freed.lock().unwrap().clone()
    }
}

impl PhysAllocator for FixedPhys {
    fn alloc_on_node(&self, _size: usize, _node: NodeId) -> Option<PhysicalAddress> {
        Some(self.chunk)
    }

    fn alloc_on_behalf(&self, _size: usize, _locality: NodeId) -> Option<PhysicalAddress> {
        Some(self.block)
    }

    unsafe fn free(&self, addr: PhysicalAddress) {
        self.freed.lock().unwrap().push(addr);
    }
}
