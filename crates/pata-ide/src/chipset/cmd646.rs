//! CMD Technology family (CMD646U2 / CMD649 class).
//!
//! Per-drive address-setup and read/write timing bytes at irregular
//! offsets, plus one Ultra-DMA control byte per channel holding an
//! enable/mode nibble for each drive. Ultra-DMA modes 0-4. The interrupt
//! latch on this family must be cleared only after the completion handler
//! has run, or the line floats and retriggers.

use pci_cfg::SharedConfigSpace;

use crate::irq::ClearPolicy;
use crate::timing::{merge, BusTimingSelection, TimingBudget, TimingEntry};

use super::{ChipsetOps, FieldShift, TimingField};

static PIO_TABLE: [TimingEntry; 5] = [
    TimingEntry::split(600, 70, 290, 240),
    TimingEntry::split(383, 50, 290, 93),
    TimingEntry::split(240, 30, 290, 40),
    TimingEntry::split(180, 30, 80, 70),
    TimingEntry::split(120, 25, 70, 25),
];

static MWDMA_TABLE: [TimingEntry; 3] = [
    TimingEntry::split(480, 60, 215, 215),
    TimingEntry::split(150, 45, 80, 50),
    TimingEntry::split(120, 25, 70, 25),
];

// `value` is the 3-bit strobe code for the drive's nibble in the Ultra-DMA
// control byte.
static UDMA_TABLE: [TimingEntry; 5] = [
    TimingEntry::packed(120, 0x4),
    TimingEntry::packed(80, 0x3),
    TimingEntry::packed(60, 0x2),
    TimingEntry::packed(45, 0x1),
    TimingEntry::packed(30, 0x0),
];

/// Address setup code, bits 7:6 of the per-drive ARTTIM byte.
const ADDR_SETUP: TimingField = TimingField {
    name: "address-setup",
    offset: [[0x53, 0x55], [0x57, 0x59]],
    shift: FieldShift::Fixed(6),
    width: 2,
    min_ticks: 1,
    max_ticks: 4,
};

/// Data read/write strobe timing, active high nibble / recovery low.
const DRW_ACTIVE: TimingField = TimingField {
    name: "drw-active",
    offset: [[0x54, 0x56], [0x58, 0x5B]],
    shift: FieldShift::Fixed(4),
    width: 4,
    min_ticks: 1,
    max_ticks: 16,
};

const DRW_RECOVERY: TimingField = TimingField {
    name: "drw-recovery",
    offset: [[0x54, 0x56], [0x58, 0x5B]],
    shift: FieldShift::Fixed(0),
    width: 4,
    min_ticks: 1,
    max_ticks: 16,
};

/// Ultra-DMA control byte per channel; each drive owns one nibble:
/// bit 3 = enable, bits 2:0 = strobe code.
const UDMA_CTRL: [u8; 2] = [0x73, 0x7B];
const UDMA_ENABLE: u8 = 0x8;

pub struct Cmd646;

impl Cmd646 {
    fn data_budget(sel: &BusTimingSelection) -> TimingBudget {
        let pio = TimingBudget::from(sel.pio);
        match sel.mwdma {
            Some(dma) => merge(Some(pio), Some(TimingBudget::from(dma))).unwrap_or(pio),
            None => pio,
        }
    }
}

impl ChipsetOps for Cmd646 {
    fn name(&self) -> &'static str {
        "cmd646u2"
    }

    fn pio_table(&self) -> &'static [TimingEntry] {
        &PIO_TABLE
    }

    fn mwdma_table(&self) -> &'static [TimingEntry] {
        &MWDMA_TABLE
    }

    fn udma_table(&self) -> &'static [TimingEntry] {
        &UDMA_TABLE
    }

    fn clear_policy(&self) -> ClearPolicy {
        ClearPolicy::AfterHandler
    }

    fn program(&self, cfg: &SharedConfigSpace, channel: usize, sel: &[BusTimingSelection; 2]) {
        for (drive, s) in sel.iter().enumerate() {
            let data = Self::data_budget(s);
            ADDR_SETUP.write_interval(cfg, channel, drive, data.setup_ns);
            DRW_ACTIVE.write_interval(cfg, channel, drive, data.active_ns);
            DRW_RECOVERY.write_interval(cfg, channel, drive, data.recovery_ns);

            let nibble = match (s.udma_enabled, s.udma_mode) {
                (true, Some(mode)) => UDMA_ENABLE | UDMA_TABLE[mode as usize].value as u8,
                _ => 0,
            };
            let shift = 4 * drive as u8;
            cfg.modify_u8(UDMA_CTRL[channel], 0x0F << shift, nibble << shift);
        }
    }
}
