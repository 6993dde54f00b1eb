//! # Kernel Boot Interface and Memory Layout
//!
//! Shared definitions consumed by the kernel's memory subsystem during and
//! after boot.
//!
//! ## Modules
//!
//! ### Boot Information ([`boot`])
//! The firmware-provided physical memory map as handed over by the
//! bootloader:
//! * **Memory Map Entries**: `(base, length, kind)` triples in firmware order
//! * **Usable Filter**: iteration over the ranges the kernel may claim
//! * **Optional Handoff**: a missing map is representable so boot code can
//!   report it instead of reading garbage
//!
//! ### Memory Layout ([`memory`])
//! * **Physical Addresses**: [`PhysicalAddress`](memory::PhysicalAddress) and
//!   half-open [`PhysicalRange`](memory::PhysicalRange)s with alignment helpers
//! * **Higher Half Direct Map**: the fixed offset at which all physical
//!   memory is visible, wrapped as [`PhysWindow`](memory::PhysWindow)
//!
//! ### NUMA Identifiers ([`numa`])
//! [`NodeId`](numa::NodeId) and the node-count bound shared by the ACPI
//! partitioner and the allocator.
//!
//! ```text
//! Virtual Address Space Layout (64-bit):
//!
//! 0x0000_0000_0000_0000 ┌─────────────────────────────────┐
//!                       │         User Space              │
//! LAST_USERSPACE_ADDRESS├─────────────────────────────────┤
//!                       │        Guard Region             │
//! HHDM_BASE             ├─────────────────────────────────┤ 0xffff_8880_0000_0000
//!                       │   Higher Half Direct Mapping    │
//!                       │   (heap objects live here)      │
//! KERNEL_BASE           ├─────────────────────────────────┤ 0xffff_ffff_8000_0000
//!                       │     Kernel Text & Data          │
//! 0xFFFF_FFFF_FFFF_FFFF └─────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use kernel_info::boot::{MemoryKind, MemoryMap, MemoryMapEntry};
//! use kernel_info::memory::PhysicalRange;
//!
//! let entries = [
//!     MemoryMapEntry::new(0x0, 0x9_f000, MemoryKind::Usable),
//!     MemoryMapEntry::new(0x9_f000, 0x1000, MemoryKind::Reserved),
//! ];
//! let map = MemoryMap::new(&entries);
//! let usable: Vec<PhysicalRange> = map.usable().collect();
//! assert_eq!(usable, [PhysicalRange::from_raw(0x0, 0x9_f000)]);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod boot;
pub mod memory;
pub mod numa;
