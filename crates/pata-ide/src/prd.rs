//! Physical region descriptor (PRD) table construction for the Bus Master
//! IDE DMA engine.
//!
//! The engine walks a contiguous, page-aligned array of 8-byte descriptors:
//! 32-bit physical address, 16-bit byte count (0 encodes 64 KiB), and a flag
//! word whose bit 15 marks the end of the table. A descriptor must never
//! span a 64 KiB physical boundary; the builder splits segments so that it
//! never does.

use thiserror::Error;
use tracing::debug;

/// Descriptor capacity of the table. Fixed by the size of the page-aligned
/// allocation handed to the engine.
pub const PRD_CAPACITY: usize = 512;

/// Hardware boundary a single descriptor may not cross.
pub const PRD_BOUNDARY: u64 = 64 * 1024;

/// Per-segment length cap requested from the memory cursor. Matching the
/// boundary size keeps the split check to at most one carry per segment.
pub const MAX_SEGMENT: u32 = 64 * 1024;

/// Largest transfer the table can describe (every descriptor at full span).
pub const MAX_TRANSFER: u64 = PRD_CAPACITY as u64 * PRD_BOUNDARY;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DmaError {
    /// The transfer needs more descriptors than the table holds.
    #[error("PRD table exhausted ({PRD_CAPACITY} descriptors)")]
    TableExhausted,
    /// A non-empty request produced no descriptors; the engine was not
    /// touched.
    #[error("transfer produced no descriptors")]
    EmptyTransfer,
}

/// DMA engine bookkeeping for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaState {
    Idle,
    /// A descriptor chain is programmed; completion status is pending.
    AwaitingStatus,
    Error,
}

/// One physical memory extent of a transfer buffer, as produced by the
/// platform's memory cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhysSegment {
    pub addr: u64,
    pub len: u32,
}

/// Walks the physical segments of a prepared transfer buffer.
///
/// The cursor owns the byte-offset bookkeeping for the buffer; the builder
/// only asks for the next extent, capped at `max_len` bytes.
pub trait SegmentCursor {
    fn next_segment(&mut self, max_len: u32) -> Option<PhysSegment>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrdEntry {
    pub addr: u32,
    /// Stored byte count; 0 encodes a full 64 KiB span.
    pub byte_count: u16,
    pub flags: u16,
}

impl PrdEntry {
    /// End-of-table flag: this descriptor is the last of the chain.
    pub const EOT: u16 = 0x8000;

    /// Zero-length terminator kept in unused slots so a stray DMA start
    /// cannot walk into stale descriptors.
    pub const TERMINATOR: PrdEntry = PrdEntry {
        addr: 0,
        byte_count: 0,
        flags: PrdEntry::EOT,
    };

    fn new(addr: u32, span: u32) -> Self {
        debug_assert!(span > 0 && span <= MAX_SEGMENT);
        Self {
            addr,
            // Exactly 64 KiB wraps to the 0 encoding.
            byte_count: span as u16,
            flags: 0,
        }
    }

    pub fn is_last(&self) -> bool {
        self.flags & Self::EOT != 0
    }

    /// Decoded span in bytes.
    pub fn len(&self) -> u32 {
        if self.byte_count == 0 {
            MAX_SEGMENT
        } else {
            self.byte_count as u32
        }
    }

    pub fn is_empty(&self) -> bool {
        // A terminator entry carries EOT with a zero address; real entries
        // always describe at least one byte.
        *self == Self::TERMINATOR
    }
}

/// The channel's descriptor table. Rewritten in full for every command;
/// between commands every slot holds a terminator.
pub struct PrdTable {
    entries: [PrdEntry; PRD_CAPACITY],
    count: usize,
}

impl PrdTable {
    pub fn new() -> Self {
        Self {
            entries: [PrdEntry::TERMINATOR; PRD_CAPACITY],
            count: 0,
        }
    }

    /// Refill the table with terminators, discarding the previous chain.
    pub fn terminate_all(&mut self) {
        self.entries = [PrdEntry::TERMINATOR; PRD_CAPACITY];
        self.count = 0;
    }

    /// Descriptors of the current chain. Slots past the count are stale and
    /// ignored until the next build overwrites them.
    pub fn chain(&self) -> &[PrdEntry] {
        &self.entries[..self.count]
    }

    /// Build the descriptor chain for a transfer of `byte_count` bytes.
    ///
    /// Pulls physical segments from `cursor`, splitting any that cross a
    /// 64 KiB physical boundary (a 64 KiB segment starting exactly on a
    /// boundary needs no split). The final descriptor of the transfer gets
    /// the end-of-table flag. Returns the number of descriptors emitted.
    pub fn build(
        &mut self,
        cursor: &mut dyn SegmentCursor,
        byte_count: u64,
    ) -> Result<usize, DmaError> {
        self.terminate_all();

        if byte_count > MAX_TRANSFER {
            return Err(DmaError::TableExhausted);
        }

        let mut remaining = byte_count;
        let mut index = 0usize;

        while remaining > 0 {
            let max_len = remaining.min(MAX_SEGMENT as u64) as u32;
            let Some(seg) = cursor.next_segment(max_len) else {
                break;
            };
            if seg.len == 0 {
                break;
            }

            if seg.addr & 0x3 != 0 {
                // Hardware tolerates non-dword-aligned segments; worth a
                // trace when chasing throughput, not a fault.
                debug!(addr = seg.addr, "PRD segment not dword aligned");
            }

            let mut addr = seg.addr;
            let mut left = seg.len.min(remaining as u32);

            while left > 0 {
                // Span up to the next 64 KiB boundary; a boundary-aligned
                // start may take the full 64 KiB in one descriptor.
                let to_boundary = PRD_BOUNDARY - (addr % PRD_BOUNDARY);
                let span = (left as u64).min(to_boundary) as u32;

                if index == PRD_CAPACITY {
                    // Leave only terminators behind; the partial chain must
                    // not be startable.
                    self.terminate_all();
                    return Err(DmaError::TableExhausted);
                }
                self.entries[index] = PrdEntry::new(addr as u32, span);
                index += 1;

                addr += span as u64;
                left -= span;
                remaining -= span as u64;
            }
        }

        if index == 0 {
            return Err(DmaError::EmptyTransfer);
        }

        self.entries[index - 1].flags |= PrdEntry::EOT;
        self.count = index;
        Ok(index)
    }
}

impl Default for PrdTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Cursor over a fixed list of physical extents.
    struct ListCursor {
        segments: Vec<PhysSegment>,
        next: usize,
        offset: u32,
    }

    impl ListCursor {
        fn new(segments: Vec<PhysSegment>) -> Self {
            Self {
                segments,
                next: 0,
                offset: 0,
            }
        }
    }

    impl SegmentCursor for ListCursor {
        fn next_segment(&mut self, max_len: u32) -> Option<PhysSegment> {
            let seg = *self.segments.get(self.next)?;
            let remaining = seg.len - self.offset;
            let take = remaining.min(max_len);
            let out = PhysSegment {
                addr: seg.addr + self.offset as u64,
                len: take,
            };
            self.offset += take;
            if self.offset == seg.len {
                self.next += 1;
                self.offset = 0;
            }
            Some(out)
        }
    }

    #[test]
    fn straddling_segment_splits_at_the_boundary() {
        // 16 bytes either side of the 0x20000 boundary.
        let mut cursor = ListCursor::new(vec![PhysSegment {
            addr: 0x1FFF0,
            len: 0x20,
        }]);
        let mut table = PrdTable::new();

        let n = table.build(&mut cursor, 0x20).unwrap();
        assert_eq!(n, 2);

        let chain = table.chain();
        assert_eq!(chain[0].addr, 0x1FFF0);
        assert_eq!(chain[0].len(), 16);
        assert!(!chain[0].is_last());
        assert_eq!(chain[1].addr, 0x20000);
        assert_eq!(chain[1].len(), 16);
        assert!(chain[1].is_last());
    }

    #[test]
    fn aligned_64k_segment_needs_no_split() {
        let mut cursor = ListCursor::new(vec![PhysSegment {
            addr: 0x30000,
            len: 0x10000,
        }]);
        let mut table = PrdTable::new();

        let n = table.build(&mut cursor, 0x10000).unwrap();
        assert_eq!(n, 1);
        // Full-span descriptors use the 0 byte-count encoding.
        assert_eq!(table.chain()[0].byte_count, 0);
        assert_eq!(table.chain()[0].len(), 0x10000);
        assert!(table.chain()[0].is_last());
    }

    #[test]
    fn chain_tiles_the_transfer_exactly() {
        let mut cursor = ListCursor::new(vec![
            PhysSegment {
                addr: 0x1000,
                len: 0x800,
            },
            PhysSegment {
                addr: 0xFF00,
                len: 0x400,
            },
            PhysSegment {
                addr: 0x5_0000,
                len: 0x2_0000,
            },
        ]);
        let total = 0x800 + 0x400 + 0x2_0000;
        let mut table = PrdTable::new();

        let n = table.build(&mut cursor, total as u64).unwrap();
        let chain = table.chain();
        assert_eq!(chain.len(), n);

        let sum: u64 = chain.iter().map(|e| e.len() as u64).sum();
        assert_eq!(sum, total as u64);

        for (i, e) in chain.iter().enumerate() {
            let start = e.addr as u64;
            let end = start + e.len() as u64;
            // The last byte of the descriptor stays inside the block its
            // first byte starts in.
            assert_eq!(
                start / PRD_BOUNDARY,
                (end - 1) / PRD_BOUNDARY,
                "descriptor {i} crosses a 64 KiB boundary"
            );
            assert_eq!(e.is_last(), i == n - 1);
        }
    }

    #[test]
    fn exhausting_the_table_aborts_the_build() {
        // 513 one-byte segments, each a descriptor of its own.
        let segments = (0..PRD_CAPACITY as u64 + 1)
            .map(|i| PhysSegment {
                addr: 0x1000 + i * 0x10,
                len: 1,
            })
            .collect();
        let mut cursor = ListCursor::new(segments);
        let mut table = PrdTable::new();

        let err = table
            .build(&mut cursor, PRD_CAPACITY as u64 + 1)
            .unwrap_err();
        assert_eq!(err, DmaError::TableExhausted);
        assert!(table.chain().is_empty());
    }

    #[test]
    fn five_hundred_twelve_descriptors_still_fit() {
        let segments = (0..PRD_CAPACITY as u64)
            .map(|i| PhysSegment {
                addr: 0x1000 + i * 0x10,
                len: 1,
            })
            .collect();
        let mut cursor = ListCursor::new(segments);
        let mut table = PrdTable::new();

        let n = table.build(&mut cursor, PRD_CAPACITY as u64).unwrap();
        assert_eq!(n, PRD_CAPACITY);
        assert!(table.chain()[PRD_CAPACITY - 1].is_last());
    }

    #[test]
    fn empty_build_is_rejected_without_touching_the_chain() {
        let mut cursor = ListCursor::new(vec![]);
        let mut table = PrdTable::new();

        assert_eq!(table.build(&mut cursor, 512).unwrap_err(), DmaError::EmptyTransfer);
        assert_eq!(table.build(&mut cursor, 0).unwrap_err(), DmaError::EmptyTransfer);
        assert!(table.chain().is_empty());
    }

    #[test]
    fn unused_slots_hold_terminators_between_commands() {
        let mut table = PrdTable::new();
        let mut cursor = ListCursor::new(vec![PhysSegment {
            addr: 0x1000,
            len: 0x200,
        }]);
        table.build(&mut cursor, 0x200).unwrap();

        table.terminate_all();
        assert!(table.chain().is_empty());
        assert!(table.entries.iter().all(|e| e.is_empty()));
    }
}
