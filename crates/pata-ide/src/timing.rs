//! Transfer-mode timing tables and the negotiation algorithms over them.
//!
//! Each chipset supplies one constant table per mode class (PIO, multi-word
//! DMA, Ultra-DMA). Tables are ordered slowest (index 0) to fastest; cycle
//! time is monotonically non-increasing with index. Index 0 is the
//! universally compatible timing and is always a valid fallback.

use tracing::{debug, warn};

/// One row of a chipset timing table.
///
/// `value` is the chipset-packed register image for chipsets that program a
/// single word per entry; chipsets that program discrete setup/active/
/// recovery fields use the sub-timings instead and leave `value` zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingEntry {
    /// Minimum total cycle time for one transfer at this timing.
    pub cycle_ns: u16,
    pub value: u32,
    pub setup_ns: u16,
    pub active_ns: u16,
    pub recovery_ns: u16,
}

impl TimingEntry {
    pub const fn packed(cycle_ns: u16, value: u32) -> Self {
        Self {
            cycle_ns,
            value,
            setup_ns: 0,
            active_ns: 0,
            recovery_ns: 0,
        }
    }

    pub const fn split(cycle_ns: u16, setup_ns: u16, active_ns: u16, recovery_ns: u16) -> Self {
        Self {
            cycle_ns,
            value: 0,
            setup_ns,
            active_ns,
            recovery_ns,
        }
    }
}

/// Highest set bit of a mode bitmask as a numeric mode, `None` if empty.
pub fn mask_to_mode(mask: u32) -> Option<u8> {
    if mask == 0 {
        None
    } else {
        Some((31 - mask.leading_zeros()) as u8)
    }
}

/// Select the fastest table entry satisfying a requested mode and cycle-time
/// floor.
///
/// The mode number is the highest bit of `mask`, clamped to the table size.
/// The effective floor is the larger of `requested_cycle_ns` and the clamped
/// mode's own minimum cycle time (a drive must not be driven faster than its
/// reported mode implies). The table is scanned backward from the fastest
/// entry; the first entry whose cycle time meets the floor wins, with the
/// slowest entry as the guaranteed fallback. Tables hold at most seven
/// entries, so a linear scan is the whole story.
///
/// Returns the resolved mode number alongside the chosen entry; with an
/// over-large floor these deliberately decouple (the mode number still
/// mirrors the request, the entry is slower).
pub fn select(
    mask: u32,
    requested_cycle_ns: u16,
    table: &'static [TimingEntry],
) -> Option<(u8, &'static TimingEntry)> {
    let mode = mask_to_mode(mask)?;
    let mode = mode.min(table.len() as u8 - 1);
    let floor = requested_cycle_ns.max(table[mode as usize].cycle_ns);

    let mut pick = 0;
    for i in (1..table.len()).rev() {
        if table[i].cycle_ns >= floor {
            pick = i;
            break;
        }
    }
    debug!(
        mode,
        floor_ns = floor,
        cycle_ns = table[pick].cycle_ns,
        "timing entry selected"
    );
    Some((mode, &table[pick]))
}

/// Clamp an Ultra-DMA mode to the 40-conductor-cable ceiling.
///
/// Modes above 2 double-clock the data strobe and need an 80-conductor
/// cable; without one the mode is degraded to 2 rather than rejected.
pub fn limit_udma_for_cable(mode: u8, cable_80w: bool) -> u8 {
    if mode > 2 && !cable_80w {
        warn!(
            requested = mode,
            "no 80-conductor cable detected, limiting Ultra-DMA to mode 2"
        );
        2
    } else {
        mode
    }
}

/// Timing constraints for one drive, in nanoseconds, as merged onto shared
/// per-channel registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimingBudget {
    pub cycle_ns: u16,
    pub setup_ns: u16,
    pub active_ns: u16,
    pub recovery_ns: u16,
}

impl From<&TimingEntry> for TimingBudget {
    fn from(e: &TimingEntry) -> Self {
        Self {
            cycle_ns: e.cycle_ns,
            setup_ns: e.setup_ns,
            active_ns: e.active_ns,
            recovery_ns: e.recovery_ns,
        }
    }
}

/// Merge two drives' timing budgets for registers they share.
///
/// Field-wise maximum: the shared register must satisfy the stricter
/// (slower) of the two drives. An absent budget is the identity, so a drive
/// with no DMA timing selected contributes nothing. Commutative and
/// idempotent by construction.
pub fn merge(a: Option<TimingBudget>, b: Option<TimingBudget>) -> Option<TimingBudget> {
    match (a, b) {
        (None, x) => x,
        (x, None) => x,
        (Some(a), Some(b)) => Some(TimingBudget {
            cycle_ns: a.cycle_ns.max(b.cycle_ns),
            setup_ns: a.setup_ns.max(b.setup_ns),
            active_ns: a.active_ns.max(b.active_ns),
            recovery_ns: a.recovery_ns.max(b.recovery_ns),
        }),
    }
}

/// Negotiated timing state for one drive on a channel.
///
/// Owned by the channel; reset to the slowest PIO timing with DMA and
/// Ultra-DMA disabled whenever the bus resets.
#[derive(Debug, Clone, Copy)]
pub struct BusTimingSelection {
    pub pio_mode: u8,
    pub pio: &'static TimingEntry,
    pub mwdma_mode: Option<u8>,
    pub mwdma: Option<&'static TimingEntry>,
    pub udma_mode: Option<u8>,
    pub udma_enabled: bool,
}

impl BusTimingSelection {
    /// The universally compatible state: PIO mode 0, no DMA.
    pub fn slowest(pio_table: &'static [TimingEntry]) -> Self {
        Self {
            pio_mode: 0,
            pio: &pio_table[0],
            mwdma_mode: None,
            mwdma: None,
            udma_mode: None,
            udma_enabled: false,
        }
    }
}
