//! # Proximity-domain partitioning
//!
//! Splits physical intervals by NUMA node ownership.

use crate::srat::Srat;
use kernel_info::memory::{PhysicalAddress, PhysicalRange};
use kernel_info::numa::NodeId;

/// Upper bound on enabled SRAT memory affinity entries.
pub const MAX_AFFINITY_ENTRIES: usize = 64;

/// One `(subrange, node)` piece produced by a partitioner.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DomainRange {
    pub range: PhysicalRange,
    pub node: NodeId,
}

/// Splits a physical interval into per-node pieces.
///
/// # Contract
/// For any `range`, the yielded pieces are non-empty, disjoint, in ascending
/// address order and cover `range` exactly once. Partitioning is
/// deterministic: the same input always yields the same pieces, which lets
/// callers count pieces in one pass and record them in a second.
pub trait ProximityDomains {
    fn partition(&self, range: PhysicalRange) -> impl Iterator<Item = DomainRange>;
}

/// All memory belongs to a single node.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct SingleDomain(pub NodeId);

impl ProximityDomains for SingleDomain {
    fn partition(&self, range: PhysicalRange) -> impl Iterator<Item = DomainRange> {
        let node = self.0;
        (!range.is_empty())
            .then_some(DomainRange { range, node })
            .into_iter()
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum AffinityError {
    #[error("more than {} memory affinity entries", MAX_AFFINITY_ENTRIES)]
    TooManyEntries,
    #[error("proximity domain {0} does not fit a node id")]
    DomainOutOfRange(u32),
}

/// Node ownership table built from SRAT memory affinity entries.
///
/// Memory not described by any entry belongs to the fallback node. When
/// firmware reports overlapping entries, the one inserted first wins.
#[derive(Debug, Clone)]
pub struct AffinityMap {
    entries: heapless::Vec<DomainRange, MAX_AFFINITY_ENTRIES>,
    fallback: NodeId,
}

impl AffinityMap {
    #[must_use]
    pub const fn new(fallback: NodeId) -> Self {
        Self {
            entries: heapless::Vec::new(),
            fallback,
        }
    }

    /// Collects every enabled, non-empty memory affinity entry of `srat`.
    ///
    /// # Errors
    /// [`AffinityError::TooManyEntries`] if the table has more entries than
    /// fit, [`AffinityError::DomainOutOfRange`] for an untranslatable domain.
    pub fn from_srat(srat: &Srat<'_>, fallback: NodeId) -> Result<Self, AffinityError> {
        let mut map = Self::new(fallback);
        for affinity in srat.memory_affinities() {
            if !affinity.flags.enabled() {
                log::debug!(
                    "SRAT: skipping disabled memory affinity {:?} (domain {})",
                    affinity.range(),
                    affinity.proximity_domain
                );
                continue;
            }
            let node = NodeId::try_from(affinity.proximity_domain)
                .map_err(AffinityError::DomainOutOfRange)?;
            map.insert(affinity.range(), node)?;
        }
        Ok(map)
    }

    /// Records that `range` belongs to `node`. Empty ranges are ignored.
    ///
    /// # Errors
    /// [`AffinityError::TooManyEntries`] when the table is full.
    pub fn insert(&mut self, range: PhysicalRange, node: NodeId) -> Result<(), AffinityError> {
        if range.is_empty() {
            return Ok(());
        }
        self.entries
            .push(DomainRange { range, node })
            .map_err(|_| AffinityError::TooManyEntries)
    }

    #[must_use]
    pub const fn fallback(&self) -> NodeId {
        self.fallback
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The node owning `pa`.
    #[must_use]
    pub fn node_of(&self, pa: PhysicalAddress) -> NodeId {
        self.entries
            .iter()
            .find(|e| e.range.contains(pa))
            .map_or(self.fallback, |e| e.node)
    }

    /// The piece starting at `cursor` and ending no later than `end`.
    fn piece_at(&self, cursor: PhysicalAddress, end: PhysicalAddress) -> DomainRange {
        if let Some(rank) = self.entries.iter().position(|e| e.range.contains(cursor)) {
            let owner = &self.entries[rank];
            // An earlier entry starting inside the owner takes over there.
            let stop = self.entries[..rank]
                .iter()
                .map(|e| e.range.start)
                .filter(|&start| start > cursor)
                .fold(owner.range.end.min(end), PhysicalAddress::min);
            return DomainRange {
                range: PhysicalRange::new(cursor, stop),
                node: owner.node,
            };
        }
        // In a hole: run until the next described range begins.
        let stop = self
            .entries
            .iter()
            .map(|e| e.range.start)
            .filter(|&start| start > cursor)
            .min()
            .map_or(end, |start| start.min(end));
        DomainRange {
            range: PhysicalRange::new(cursor, stop),
            node: self.fallback,
        }
    }
}

impl ProximityDomains for AffinityMap {
    fn partition(&self, range: PhysicalRange) -> impl Iterator<Item = DomainRange> {
        let end = range.end;
        let mut cursor = range.start;
        core::iter::from_fn(move || {
            if cursor >= end {
                return None;
            }
            let piece = self.piece_at(cursor, end);
            cursor = piece.range.end;
            Some(piece)
        })
    }
}
