//! # NUMA identifiers

use core::fmt;

/// Upper bound on the number of NUMA nodes the kernel tracks.
pub const MAX_NUMA_NODES: usize = 64;

/// Identity of a NUMA node (proximity domain after translation).
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NodeId(u16);

impl NodeId {
    /// The boot node. Every machine has at least this one.
    pub const BOOT: Self = Self(0);

    #[inline]
    #[must_use]
    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    #[inline]
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl TryFrom<u32> for NodeId {
    type Error = u32;

    /// Converts an ACPI proximity domain, handing it back if it does not fit.
    fn try_from(domain: u32) -> Result<Self, Self::Error> {
        u16::try_from(domain).map(Self).map_err(|_| domain)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

const _: () = assert!(MAX_NUMA_NODES <= u16::MAX as usize);
