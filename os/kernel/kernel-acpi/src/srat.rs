//! # System Resource Affinity Table (SRAT)
//!
//! Only the memory affinity structures are decoded; processor affinity is the
//! scheduler's business.
//!
//! ```text
//! offset  size  field
//! 0       36    standard ACPI header ("SRAT", length, revision, checksum, ...)
//! 36      4     reserved (1 for legacy compatibility)
//! 40      8     reserved
//! 48      ..    affinity structures: [type: u8][length: u8][body ...]
//! ```

use crate::{PhysMapRo, sum};
use bitfield_struct::bitfield;
use kernel_info::memory::PhysicalRange;

/// Table signature.
pub const SRAT_SIGNATURE: [u8; 4] = *b"SRAT";

/// Size of the standard ACPI system description table header.
const ACPI_HEADER_LEN: usize = 36;

/// Offset of the first affinity structure.
const STRUCTURES_OFFSET: usize = 48;

/// Affinity structure type of memory affinity entries.
const TYPE_MEMORY_AFFINITY: u8 = 1;

/// Length of a memory affinity structure.
const MEMORY_AFFINITY_LEN: usize = 40;

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum SratError {
    #[error("table is shorter than the SRAT header")]
    TooShort,
    #[error("table signature is not \"SRAT\"")]
    BadSignature,
    #[error("declared table length {declared} exceeds the {available} bytes available")]
    LengthMismatch { declared: usize, available: usize },
    #[error("table checksum does not sum to zero")]
    BadChecksum,
}

/// Memory affinity flags (ACPI 6.x, table 5.59).
#[bitfield(u32, order = Lsb)]
#[derive(Eq, PartialEq)]
pub struct MemoryAffinityFlags {
    /// Bit 0: the entry is valid. Disabled entries must be ignored.
    pub enabled: bool,

    /// Bit 1: the range may be hot-plugged.
    pub hot_pluggable: bool,

    /// Bit 2: the range is non-volatile memory.
    pub non_volatile: bool,

    /// Bits 3–31: reserved.
    #[bits(29)]
    __: u32,
}

/// A decoded memory affinity structure.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct MemoryAffinity {
    pub base: u64,
    pub length: u64,
    pub proximity_domain: u32,
    pub flags: MemoryAffinityFlags,
}

impl MemoryAffinity {
    #[must_use]
    pub const fn range(&self) -> PhysicalRange {
        PhysicalRange::from_base_len(self.base, self.length)
    }
}

/// A validated, borrowed SRAT.
#[derive(Debug, Copy, Clone)]
pub struct Srat<'a> {
    bytes: &'a [u8],
}

impl<'a> Srat<'a> {
    /// Validates signature, length and checksum of a raw table.
    ///
    /// Bytes past the declared table length are ignored.
    ///
    /// # Errors
    /// See [`SratError`].
    pub fn parse(bytes: &'a [u8]) -> Result<Self, SratError> {
        if bytes.len() < STRUCTURES_OFFSET {
            return Err(SratError::TooShort);
        }
        if bytes[0..4] != SRAT_SIGNATURE {
            return Err(SratError::BadSignature);
        }
        let declared = read_u32(bytes, 4) as usize;
        if declared < STRUCTURES_OFFSET {
            return Err(SratError::TooShort);
        }
        if declared > bytes.len() {
            return Err(SratError::LengthMismatch {
                declared,
                available: bytes.len(),
            });
        }
        let bytes = &bytes[..declared];
        if sum(bytes) != 0 {
            return Err(SratError::BadChecksum);
        }
        Ok(Self { bytes })
    }

    /// Maps and parses the SRAT at physical address `paddr`.
    ///
    /// # Safety
    /// `paddr` must point at an ACPI table that `mapper` can map for at
    /// least its declared length.
    ///
    /// # Errors
    /// See [`SratError`].
    pub unsafe fn from_phys<M: PhysMapRo>(mapper: &M, paddr: u64) -> Result<Self, SratError> {
        let header = unsafe { mapper.map_ro(paddr, ACPI_HEADER_LEN) };
        if header[0..4] != SRAT_SIGNATURE {
            return Err(SratError::BadSignature);
        }
        let len = read_u32(header, 4) as usize;
        let table = unsafe { mapper.map_ro(paddr, len) };
        Self::parse(table)
    }

    /// All memory affinity structures, enabled or not, in table order.
    ///
    /// Iteration stops at the first structure whose length is zero or runs
    /// past the end of the table.
    pub fn memory_affinities(&self) -> impl Iterator<Item = MemoryAffinity> + use<'a> {
        let bytes = self.bytes;
        let mut offset = STRUCTURES_OFFSET;
        core::iter::from_fn(move || {
            loop {
                if offset + 2 > bytes.len() {
                    return None;
                }
                let kind = bytes[offset];
                let len = bytes[offset + 1] as usize;
                if len < 2 || offset + len > bytes.len() {
                    log::debug!("SRAT: malformed affinity structure at offset {offset}");
                    return None;
                }
                let at = offset;
                offset += len;
                if kind == TYPE_MEMORY_AFFINITY && len >= MEMORY_AFFINITY_LEN {
                    return Some(decode_memory_affinity(&bytes[at..at + len]));
                }
            }
        })
    }
}

fn decode_memory_affinity(s: &[u8]) -> MemoryAffinity {
    let base = u64::from(read_u32(s, 8)) | (u64::from(read_u32(s, 12)) << 32);
    let length = u64::from(read_u32(s, 16)) | (u64::from(read_u32(s, 20)) << 32);
    MemoryAffinity {
        base,
        length,
        proximity_domain: read_u32(s, 2),
        flags: MemoryAffinityFlags::from_bits(read_u32(s, 28)),
    }
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}
