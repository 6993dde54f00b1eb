//! # ACPI NUMA Topology Support
//!
//! Parses the memory half of the System Resource Affinity Table (SRAT) and
//! turns it into a *proximity-domain partitioner*: a function that, given an
//! arbitrary physical interval, splits it into pieces each owned by exactly
//! one NUMA node.
//!
//! ## Overview
//!
//! ```text
//! RSDP → XSDT → "SRAT"
//!                 ├── Processor Local APIC Affinity   (type 0, ignored)
//!                 ├── Memory Affinity                 (type 1) ──► MemoryAffinity
//!                 └── Processor x2APIC Affinity       (type 2, ignored)
//!
//! MemoryAffinity* ──► AffinityMap ──partition([start, end))──► (subrange, node)*
//! ```
//!
//! ## Key Components
//!
//! ### Physical Memory Mapping ([`PhysMapRo`])
//! Abstract read-only access to firmware tables, so parsing does not depend
//! on how the kernel maps physical memory at the time.
//!
//! ### SRAT Parsing ([`srat`])
//! * **Validation**: signature, declared length and checksum
//! * **Memory Affinity**: base/length/proximity domain and the
//!   enabled/hot-pluggable/non-volatile flags
//!
//! ### Partitioning ([`partition`])
//! * [`ProximityDomains`](partition::ProximityDomains): the contract consumed
//!   by the boot-time range builder
//! * [`AffinityMap`](partition::AffinityMap): SRAT-backed implementation
//! * [`SingleDomain`](partition::SingleDomain): machines without an SRAT
//!
//! ## Usage
//! ```rust
//! use kernel_acpi::partition::{AffinityMap, ProximityDomains};
//! use kernel_info::memory::PhysicalRange;
//! use kernel_info::numa::NodeId;
//!
//! let mut map = AffinityMap::new(NodeId::BOOT);
//! map.insert(PhysicalRange::from_raw(0x0, 0x4000_0000), NodeId::new(0)).unwrap();
//! map.insert(PhysicalRange::from_raw(0x4000_0000, 0x8000_0000), NodeId::new(1)).unwrap();
//!
//! let pieces: Vec<_> = map
//!     .partition(PhysicalRange::from_raw(0x3000_0000, 0x5000_0000))
//!     .map(|p| (p.range, p.node))
//!     .collect();
//! assert_eq!(pieces.len(), 2);
//! assert_eq!(pieces[1].1, NodeId::new(1));
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod partition;
pub mod srat;

/// Map a physical region and return a *read-only* byte slice for its contents.
/// You provide the implementation (identity map, HHDM, etc.).
pub trait PhysMapRo {
    /// # Safety
    /// The implementor must ensure the returned slice is valid for `len` bytes.
    unsafe fn map_ro<'a>(&self, paddr: u64, len: usize) -> &'a [u8];
}

fn sum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |a, &b| a.wrapping_add(b))
}
