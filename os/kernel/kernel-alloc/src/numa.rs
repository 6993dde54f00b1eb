//! # NUMA node arena
//!
//! Every node is addressed by its [`NodeId`], never by pointer: cross-node
//! references (neighbor lists, slub owners) are id lookups into
//! [`NodeArena`]. Physical ranges live in one flat table handed over by the
//! range builder; each node threads its own ranges through that table as an
//! index-linked list, most recently added first.

use crate::heap::SlubCache;
use core::fmt;
use kernel_info::memory::PhysicalRange;

pub use kernel_info::numa::{MAX_NUMA_NODES, NodeId};

/// Index of a [`MemoryRange`] in the arena's range table.
pub type RangeIndex = u32;

/// Nearest-first neighbor list of a node (self included).
pub type NeighborList = heapless::Vec<NodeId, MAX_NUMA_NODES>;

/// A physical `[start, end)` interval owned by exactly one node, together
/// with the physical sub-allocator initialized over it.
pub struct MemoryRange<R> {
    range: PhysicalRange,
    allocator: R,
    next: Option<RangeIndex>,
}

impl<R> MemoryRange<R> {
    pub(crate) const fn new(range: PhysicalRange, allocator: R, next: Option<RangeIndex>) -> Self {
        Self {
            range,
            allocator,
            next,
        }
    }

    #[must_use]
    pub const fn range(&self) -> PhysicalRange {
        self.range
    }

    #[must_use]
    pub const fn allocator(&self) -> &R {
        &self.allocator
    }

    pub const fn allocator_mut(&mut self) -> &mut R {
        &mut self.allocator
    }
}

impl<R> fmt::Debug for MemoryRange<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryRange")
            .field("range", &self.range)
            .field("next", &self.next)
            .finish_non_exhaustive()
    }
}

/// Per-node record.
pub struct NumaNode {
    id: NodeId,
    ranges: Option<RangeIndex>,
    neighbors: NeighborList,
    slubs: SlubCache,
}

impl NumaNode {
    fn new(id: NodeId) -> Self {
        let mut neighbors = NeighborList::new();
        // Capacity is at least one; a lone node is its own nearest neighbor.
        let _ = neighbors.push(id);
        Self {
            id,
            ranges: None,
            neighbors,
            slubs: SlubCache::new(),
        }
    }

    #[must_use]
    pub const fn id(&self) -> NodeId {
        self.id
    }

    /// Nearest-first, self included.
    #[must_use]
    pub fn neighbors(&self) -> &[NodeId] {
        &self.neighbors
    }

    pub(crate) const fn slubs(&self) -> &SlubCache {
        &self.slubs
    }

    pub(crate) const fn slubs_mut(&mut self) -> &mut SlubCache {
        &mut self.slubs
    }
}

impl fmt::Debug for NumaNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NumaNode")
            .field("id", &self.id)
            .field("neighbors", &self.neighbors())
            .field("reserved_slubs", &self.slubs.reserved())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum TopologyError {
    #[error("NUMA node {0} does not exist")]
    UnknownNode(NodeId),
    #[error("at most {max} NUMA nodes are supported, {requested} requested", max = MAX_NUMA_NODES)]
    TooManyNodes { requested: usize },
    #[error("neighbor list of node {node} has more than {max} entries", max = MAX_NUMA_NODES)]
    TooManyNeighbors { node: NodeId },
    #[error("neighbor list of node {0} does not include the node itself")]
    SelfNotListed(NodeId),
}

/// All NUMA nodes of the machine plus the boot-time range table.
pub struct NodeArena<R: 'static> {
    nodes: heapless::Vec<NumaNode, MAX_NUMA_NODES>,
    ranges: &'static mut [MemoryRange<R>],
}

impl<R: 'static> NodeArena<R> {
    /// Creates `count` nodes with ids `0..count`, each its own only neighbor.
    ///
    /// # Errors
    /// [`TopologyError::TooManyNodes`] when `count` is zero or exceeds
    /// [`MAX_NUMA_NODES`].
    pub fn with_nodes(count: usize) -> Result<Self, TopologyError> {
        let too_many = TopologyError::TooManyNodes { requested: count };
        if count == 0 || count > MAX_NUMA_NODES {
            return Err(too_many);
        }
        let mut nodes = heapless::Vec::new();
        for id in 0..count {
            let id = NodeId::new(u16::try_from(id).map_err(|_| too_many)?);
            nodes.push(NumaNode::new(id)).map_err(|_| too_many)?;
        }
        Ok(Self {
            nodes,
            ranges: &mut [],
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        id.index() < self.nodes.len()
    }

    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&NumaNode> {
        self.nodes.get(id.index())
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut NumaNode> {
        self.nodes.get_mut(id.index())
    }

    /// Like [`get`](Self::get) for ids the caller vouches for.
    ///
    /// # Panics
    /// If `id` is not a node of this arena.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &NumaNode {
        self.get(id)
            .unwrap_or_else(|| panic!("unknown NUMA node {id}"))
    }

    /// # Panics
    /// If `id` is not a node of this arena.
    pub fn node_mut(&mut self, id: NodeId) -> &mut NumaNode {
        self.get_mut(id)
            .unwrap_or_else(|| panic!("unknown NUMA node {id}"))
    }

    pub fn iter(&self) -> impl Iterator<Item = &NumaNode> {
        self.nodes.iter()
    }

    /// Installs the nearest-first neighbor list of `id`.
    ///
    /// # Errors
    /// See [`TopologyError`]; the previous list is kept on error.
    pub fn set_neighbors(&mut self, id: NodeId, neighbors: &[NodeId]) -> Result<(), TopologyError> {
        if !self.contains(id) {
            return Err(TopologyError::UnknownNode(id));
        }
        if let Some(&unknown) = neighbors.iter().find(|n| !self.contains(**n)) {
            return Err(TopologyError::UnknownNode(unknown));
        }
        if !neighbors.contains(&id) {
            return Err(TopologyError::SelfNotListed(id));
        }
        let list =
            NeighborList::from_slice(neighbors).map_err(|()| TopologyError::TooManyNeighbors {
                node: id,
            })?;
        self.node_mut(id).neighbors = list;
        Ok(())
    }

    /// Ranges owned by `id`, most recently added first.
    pub fn ranges(&self, id: NodeId) -> impl Iterator<Item = &MemoryRange<R>> {
        let ranges = &*self.ranges;
        let mut cursor = self.get(id).and_then(|n| n.ranges);
        core::iter::from_fn(move || {
            let range = &ranges[cursor? as usize];
            cursor = range.next;
            Some(range)
        })
    }

    /// Visits the ranges owned by `id` mutably, most recently added first.
    pub fn for_each_range_mut(&mut self, id: NodeId, mut f: impl FnMut(&mut MemoryRange<R>)) {
        let mut cursor = self.get(id).and_then(|n| n.ranges);
        while let Some(index) = cursor {
            let range = &mut self.ranges[index as usize];
            cursor = range.next;
            f(range);
        }
    }

    /// Total number of ranges across all nodes.
    #[must_use]
    pub fn range_count(&self) -> usize {
        self.ranges.len()
    }

    /// Current head of `id`'s range list.
    pub(crate) fn range_head(&self, id: NodeId) -> Option<RangeIndex> {
        self.node(id).ranges
    }

    /// Makes `index` the new head of `id`'s range list. The range at `index`
    /// must already link to the previous head.
    pub(crate) fn set_range_head(&mut self, id: NodeId, index: RangeIndex) {
        self.node_mut(id).ranges = Some(index);
    }

    pub(crate) fn has_ranges(&self) -> bool {
        !self.ranges.is_empty() || self.nodes.iter().any(|n| n.ranges.is_some())
    }

    pub(crate) fn install_ranges(&mut self, ranges: &'static mut [MemoryRange<R>]) {
        self.ranges = ranges;
    }
}

impl<R: 'static> fmt::Debug for NodeArena<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeArena")
            .field("nodes", &self.nodes)
            .field("ranges", &self.ranges.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[u16]) -> Vec<NodeId> {
        raw.iter().copied().map(NodeId::new).collect()
    }

    #[test]
    fn nodes_start_as_their_own_only_neighbor() {
        let arena = NodeArena::<()>::with_nodes(3).unwrap();
        assert_eq!(arena.len(), 3);
        for node in arena.iter() {
            assert_eq!(node.neighbors(), [node.id()]);
        }
        assert!(arena.get(NodeId::new(3)).is_none());
        assert_eq!(arena.ranges(NodeId::new(0)).count(), 0);
    }

    #[test]
    fn rejects_bad_node_counts() {
        assert_eq!(
            NodeArena::<()>::with_nodes(0).unwrap_err(),
            TopologyError::TooManyNodes { requested: 0 }
        );
        assert!(NodeArena::<()>::with_nodes(MAX_NUMA_NODES).is_ok());
        assert_eq!(
            NodeArena::<()>::with_nodes(MAX_NUMA_NODES + 1).unwrap_err(),
            TopologyError::TooManyNodes {
                requested: MAX_NUMA_NODES + 1
            }
        );
    }

    #[test]
    fn neighbor_lists_are_validated() {
        let mut arena = NodeArena::<()>::with_nodes(3).unwrap();
        let n1 = NodeId::new(1);

        arena.set_neighbors(n1, &ids(&[1, 0, 2])).unwrap();
        assert_eq!(arena.node(n1).neighbors(), ids(&[1, 0, 2]));

        assert_eq!(
            arena.set_neighbors(n1, &ids(&[1, 7])),
            Err(TopologyError::UnknownNode(NodeId::new(7)))
        );
        assert_eq!(
            arena.set_neighbors(n1, &ids(&[0, 2])),
            Err(TopologyError::SelfNotListed(n1))
        );
        assert_eq!(
            arena.set_neighbors(NodeId::new(9), &ids(&[9])),
            Err(TopologyError::UnknownNode(NodeId::new(9)))
        );
        // unchanged after the failed updates
        assert_eq!(arena.node(n1).neighbors(), ids(&[1, 0, 2]));
    }

    #[test]
    fn oversized_neighbor_list_is_rejected() {
        let mut arena = NodeArena::<()>::with_nodes(2).unwrap();
        let n0 = NodeId::new(0);
        let long = vec![n0; MAX_NUMA_NODES + 1];

        let err = arena.set_neighbors(n0, &long).unwrap_err();
        assert_eq!(err, TopologyError::TooManyNeighbors { node: n0 });
        assert_eq!(
            err.to_string(),
            format!("neighbor list of node 0 has more than {MAX_NUMA_NODES} entries")
        );
        assert_eq!(
            TopologyError::TooManyNodes { requested: 65 }.to_string(),
            format!("at most {MAX_NUMA_NODES} NUMA nodes are supported, 65 requested")
        );
        assert_eq!(arena.node(n0).neighbors(), [n0]);
    }
}
