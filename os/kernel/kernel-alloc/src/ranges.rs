//! # Physical range builder
//!
//! Runs once during boot, after the bootstrap arena is the only allocator
//! in existence. Turns the firmware memory map into per-node lists of
//! physical ranges, each with its own sub-allocator.
//!
//! Two passes over the same input:
//!
//! 1. **Sizing**: partition every usable entry by proximity domain and
//!    count the pieces. That many range records are taken from the
//!    bootstrap arena, which is then terminated.
//! 2. **Build**: partition again, clipping every entry to the arena's
//!    border, and record one range per piece on its owning node.
//!
//! The records are allocated before the border is known, so clipping can
//! only ever remove pieces: the sizing count is an upper bound on what the
//! build pass produces.

use crate::numa::{MemoryRange, NodeArena, NodeId, RangeIndex};
use crate::phys::{BootstrapArena, RangeAllocator};
use core::alloc::Layout;
use core::mem::MaybeUninit;
use kernel_acpi::partition::ProximityDomains;
use kernel_info::boot::MemoryMap;
use kernel_info::memory::PhysicalAddress;

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum RangeBuildError {
    #[error("bootloader did not provide a memory map")]
    MissingMemoryMap,
    #[error("memory was assigned to NUMA node {0}, which does not exist")]
    UnknownNode(NodeId),
    #[error("bootstrap arena cannot provide {bytes} bytes for range records")]
    ArenaExhausted { bytes: usize },
}

/// Outcome of [`build_ranges`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct RangeReport {
    /// Pieces counted by the sizing pass (records allocated).
    pub estimated: usize,
    /// Ranges recorded by the build pass.
    pub built: usize,
    /// Bootstrap arena border; no range starts below it.
    pub border: PhysicalAddress,
}

/// Builds the per-node physical range lists.
///
/// `memory_map` is the firmware map (`None` if the bootloader gave none),
/// `domains` splits physical memory by node, and `arena` provides storage
/// for the range records before being terminated.
///
/// # Errors
/// See [`RangeBuildError`]. All errors are detected before `nodes` is
/// touched; they leave the kernel without usable physical memory and are
/// meant to be fatal.
///
/// # Panics
/// If ranges were already built into `nodes`, or if the build pass
/// produces more pieces than the sizing pass counted.
pub fn build_ranges<R: RangeAllocator + 'static>(
    memory_map: Option<&MemoryMap<'_>>,
    domains: &impl ProximityDomains,
    mut arena: impl BootstrapArena,
    nodes: &mut NodeArena<R>,
) -> Result<RangeReport, RangeBuildError> {
    assert!(!nodes.has_ranges(), "physical ranges were already built");
    let map = memory_map.ok_or(RangeBuildError::MissingMemoryMap)?;

    let mut estimated = 0;
    for entry in map.usable() {
        for piece in domains.partition(entry) {
            if !nodes.contains(piece.node) {
                return Err(RangeBuildError::UnknownNode(piece.node));
            }
            estimated += 1;
        }
    }
    let slots = allocate_records::<R>(&mut arena, estimated)?;
    let border = arena.terminate();

    log::info!("Number of memory map entries: {}", map.len());
    log::debug!("Bootstrap arena border: {border}");

    let mut built = 0;
    for entry in map.usable() {
        let Some(entry) = entry.clip_start(border) else {
            continue;
        };
        for piece in domains.partition(entry) {
            assert!(
                built < estimated,
                "range build pass produced more than the {estimated} pieces counted"
            );
            let next = nodes.range_head(piece.node);
            slots[built].write(MemoryRange::new(piece.range, R::new(piece.range), next));
            nodes.set_range_head(piece.node, index_of(built));
            built += 1;
            log::info!("  Range: {} on node {}", piece.range, piece.node);
        }
    }

    // SAFETY: the first `built` slots were initialized above.
    let ranges = unsafe { slice_assume_init_mut(&mut slots[..built]) };
    nodes.install_ranges(ranges);

    Ok(RangeReport {
        estimated,
        built,
        border,
    })
}

fn allocate_records<R: 'static>(
    arena: &mut impl BootstrapArena,
    count: usize,
) -> Result<&'static mut [MaybeUninit<MemoryRange<R>>], RangeBuildError> {
    if count == 0 {
        return Ok(&mut []);
    }
    let layout = Layout::array::<MemoryRange<R>>(count).map_err(|_| {
        RangeBuildError::ArenaExhausted {
            bytes: usize::MAX,
        }
    })?;
    let storage = arena
        .alloc(layout)
        .ok_or(RangeBuildError::ArenaExhausted {
            bytes: layout.size(),
        })?;
    // SAFETY: the arena hands out aligned, exclusively owned memory that
    // lives as long as the kernel.
    Ok(unsafe { core::slice::from_raw_parts_mut(storage.as_ptr().cast(), count) })
}

fn index_of(slot: usize) -> RangeIndex {
    RangeIndex::try_from(slot).unwrap_or_else(|_| panic!("range index {slot} out of bounds"))
}

/// # Safety
/// Every element of `slots` must be initialized.
unsafe fn slice_assume_init_mut<T: 'static>(
    slots: &'static mut [MaybeUninit<T>],
) -> &'static mut [T] {
    unsafe { &mut *(core::ptr::from_mut(slots) as *mut [T]) }
}
