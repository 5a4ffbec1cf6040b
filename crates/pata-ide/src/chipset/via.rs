//! VIA family (VT82C686B / VT8233A class).
//!
//! Timing state lives in discrete configuration-space fields: one data
//! active/recovery nibble pair per drive, one command timing byte per
//! channel shared by both drives (hence the merge step), a single
//! address-setup byte packing all four drive positions of the controller,
//! and one Ultra-DMA byte per drive. Ultra-DMA modes 0-6.

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

// Ultra-DMA strobe control bytes: bit 7 enables the UDMA strobe, bit 6
// enables cycle-time checking, low bits select the strobe period.
static UDMA_TABLE: [TimingEntry; 7] = [
    TimingEntry::packed(120, 0xE6),
    TimingEntry::packed(80, 0xE5),
    TimingEntry::packed(60, 0xE4),
    TimingEntry::packed(45, 0xE3),
    TimingEntry::packed(30, 0xE2),
    TimingEntry::packed(20, 0xE1),
    TimingEntry::packed(15, 0xE0),
];

/// Ultra-DMA byte image with the strobe disabled (PIO/MWDMA strobing only).
const UDMA_OFF: u8 = 0x03;

/// Data strobe active time, high nibble of the per-drive timing byte.
/// Register order runs secondary-slave first, so offsets walk down.
const DATA_ACTIVE: TimingField = TimingField {
    name: "data-active",
    offset: [[0x4B, 0x4A], [0x49, 0x48]],
    shift: FieldShift::Fixed(4),
    width: 4,
    min_ticks: 1,
    max_ticks: 16,
};

const DATA_RECOVERY: TimingField = TimingField {
    name: "data-recovery",
    offset: [[0x4B, 0x4A], [0x49, 0x48]],
    shift: FieldShift::Fixed(0),
    width: 4,
    min_ticks: 1,
    max_ticks: 16,
};

/// Command (task-file) strobe timing, one byte per channel, shared by both
/// drives.
const CMD_ACTIVE: TimingField = TimingField {
    name: "command-active",
    offset: [[0x4F, 0x4F], [0x4E, 0x4E]],
    shift: FieldShift::Fixed(4),
    width: 4,
    min_ticks: 1,
    max_ticks: 16,
};

const CMD_RECOVERY: TimingField = TimingField {
    name: "command-recovery",
    offset: [[0x4F, 0x4F], [0x4E, 0x4E]],
    shift: FieldShift::Fixed(0),
    width: 4,
    min_ticks: 1,
    max_ticks: 16,
};

/// Address setup for all four drive positions packed into one byte;
/// the bit position is a function of drive and channel.
const ADDR_SETUP: TimingField = TimingField {
    name: "address-setup",
    offset: [[0x4C; 2]; 2],
    shift: FieldShift::PerUnit { base: 6 },
    width: 2,
    min_ticks: 1,
    max_ticks: 4,
};

/// Ultra-DMA strobe control, one byte per drive.
const UDMA_CTRL: TimingField = TimingField {
    name: "udma-control",
    offset: [[0x53, 0x52], [0x51, 0x50]],
    shift: FieldShift::Fixed(0),
    width: 8,
    min_ticks: 0,
    max_ticks: 0,
};

pub struct Via;

impl Via {
    /// Per-drive data-path budget: with DMA selected the strobe must
    /// satisfy both the PIO and the DMA timing.
    fn data_budget(sel: &BusTimingSelection) -> TimingBudget {
        let pio = TimingBudget::from(sel.pio);
        match sel.mwdma {
            // merge of two Some values always yields Some
            Some(dma) => merge(Some(pio), Some(TimingBudget::from(dma))).unwrap_or(pio),
            None => pio,
        }
    }
}

impl ChipsetOps for Via {
    fn name(&self) -> &'static str {
        "via-vt8233a"
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

    fn shared_command_timing(&self) -> bool {
        true
    }

    fn clear_policy(&self) -> ClearPolicy {
        ClearPolicy::BeforeHandler
    }

    fn program(&self, cfg: &SharedConfigSpace, channel: usize, sel: &[BusTimingSelection; 2]) {
        for (drive, s) in sel.iter().enumerate() {
            let data = Self::data_budget(s);
            DATA_ACTIVE.write_interval(cfg, channel, drive, data.active_ns);
            DATA_RECOVERY.write_interval(cfg, channel, drive, data.recovery_ns);
            ADDR_SETUP.write_interval(cfg, channel, drive, data.setup_ns);

            let udma_byte = match (s.udma_enabled, s.udma_mode) {
                (true, Some(mode)) => UDMA_TABLE[mode as usize].value as u8,
                _ => UDMA_OFF,
            };
            UDMA_CTRL.write_raw(cfg, channel, drive, udma_byte);
        }

        // The command-timing byte is shared: the slower drive wins.
        let cmd = merge(
            Some(TimingBudget::from(sel[0].pio)),
            Some(TimingBudget::from(sel[1].pio)),
        )
        .unwrap_or_default();
        CMD_ACTIVE.write_interval(cfg, channel, 0, cmd.active_ns);
        CMD_RECOVERY.write_interval(cfg, channel, 0, cmd.recovery_ns);
    }
}
