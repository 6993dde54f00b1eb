//! # NUMA-Aware Kernel Heap
//!
//! Boot-time physical range bookkeeping and the kernel heap built on top of
//! it. Every allocation is made *on behalf of* a NUMA node and served from
//! memory close to that node whenever possible.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │            GlobalAlloc adapter (global)             │
//! │    • Layout → size class                            │
//! │    • Locality hint for the running core             │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │                 Slub heap (heap)                    │
//! │    • Per-node, per-order free lists                 │
//! │    • 64 KiB slubs carved from 4 MiB chunks          │
//! │    • Neighbor fallback, free-to-owner               │
//! └─────────────────┬───────────────────────────────────┘
//!                   │ PhysAllocator
//! ┌─────────────────▼───────────────────────────────────┐
//! │        NUMA node arena (numa) + ranges (ranges)     │
//! │    • Per-node physical range lists                  │
//! │    • Built once from the firmware memory map        │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Core Components
//!
//! ### Node Arena ([`numa`])
//! All NUMA nodes, addressed by [`NodeId`](numa::NodeId), with their
//! nearest-first neighbor lists, physical ranges and slub caches.
//!
//! ### Range Builder ([`ranges`])
//! Two passes over the memory map: count the per-node pieces, allocate that
//! many records from the [`BootstrapArena`](phys::BootstrapArena), terminate
//! it, then record every piece above the arena's border.
//!
//! ### Slub Heap ([`heap`])
//! * **Size classes**: 16 B to 4 KiB in powers of two; larger requests
//!   bypass the slubs
//! * **Locality lock**: one spin lock, taken with local interrupts masked
//! * **Ownership**: every slub header names its owner node, and freed
//!   objects always return to their owner
//!
//! ### Physical Contracts ([`phys`])
//! The traits the heap and the builder consume: the NUMA physical
//! allocator, per-range sub-allocators and the bootstrap arena.
//!
//! ## Usage
//! ```rust
//! use kernel_alloc::heap::NumaHeap;
//! use kernel_alloc::numa::{NodeArena, NodeId};
//! use kernel_alloc::phys::PhysAllocator;
//! use kernel_info::memory::{PhysWindow, PhysicalAddress};
//!
//! /// Physical memory that is always exhausted.
//! struct Empty;
//!
//! impl PhysAllocator for Empty {
//!     fn alloc_on_node(&self, _: usize, _: NodeId) -> Option<PhysicalAddress> { None }
//!     fn alloc_on_behalf(&self, _: usize, _: NodeId) -> Option<PhysicalAddress> { None }
//!     unsafe fn free(&self, _: PhysicalAddress) {}
//! }
//!
//! let nodes = NodeArena::<()>::with_nodes(2).unwrap();
//! let heap = NumaHeap::new(Empty, PhysWindow::IDENTITY, nodes);
//! assert!(heap.alloc(64, NodeId::BOOT).is_none());
//! assert!(heap.alloc(1 << 20, NodeId::BOOT).is_none());
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod global;
pub mod heap;
pub mod numa;
pub mod phys;
pub mod ranges;
