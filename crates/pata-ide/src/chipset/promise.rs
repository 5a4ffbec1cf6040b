//! Promise family (PDC20268 class).
//!
//! Each drive owns a whole 32-bit timing word in configuration space; the
//! PIO fields and the (multi-word or Ultra) DMA strobe fields are OR'd into
//! one image and written as a dword, so nothing is shared between drives or
//! channels. Ultra-DMA modes 0-5.

use pci_cfg::SharedConfigSpace;

use crate::irq::ClearPolicy;
use crate::timing::{BusTimingSelection, TimingEntry};

use super::ChipsetOps;

// Timing word layout: bits 7:0 address-setup ticks, 15:8 active ticks,
// 23:16 recovery ticks, 27:24 Ultra-DMA strobe code, bit 29 selects the
// multi-word DMA strobe, bit 30 enables the Ultra-DMA strobe.
const MWDMA_STROBE: u32 = 1 << 29;
const UDMA_STROBE: u32 = 1 << 30;

static PIO_TABLE: [TimingEntry; 5] = [
    TimingEntry::packed(600, 0x0008_0A03),
    TimingEntry::packed(383, 0x0004_0A02),
    TimingEntry::packed(240, 0x0002_0A01),
    TimingEntry::packed(180, 0x0003_0301),
    TimingEntry::packed(120, 0x0001_0301),
];

static MWDMA_TABLE: [TimingEntry; 3] = [
    TimingEntry::packed(480, MWDMA_STROBE | 0x0008_0802),
    TimingEntry::packed(150, MWDMA_STROBE | 0x0002_0302),
    TimingEntry::packed(120, MWDMA_STROBE | 0x0001_0301),
];

static UDMA_TABLE: [TimingEntry; 6] = [
    TimingEntry::packed(120, UDMA_STROBE | 0x0500_0000),
    TimingEntry::packed(80, UDMA_STROBE | 0x0400_0000),
    TimingEntry::packed(60, UDMA_STROBE | 0x0300_0000),
    TimingEntry::packed(45, UDMA_STROBE | 0x0200_0000),
    TimingEntry::packed(30, UDMA_STROBE | 0x0100_0000),
    TimingEntry::packed(20, UDMA_STROBE | 0x0000_0000),
];

/// Base of the four per-drive timing dwords.
const TIMING_BASE: u8 = 0x60;

fn timing_offset(channel: usize, drive: usize) -> u8 {
    TIMING_BASE + 4 * (2 * channel as u8 + drive as u8)
}

pub struct Promise;

impl ChipsetOps for Promise {
    fn name(&self) -> &'static str {
        "pdc20268"
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
        ClearPolicy::BeforeHandler
    }

    fn program(&self, cfg: &SharedConfigSpace, channel: usize, sel: &[BusTimingSelection; 2]) {
        for (drive, s) in sel.iter().enumerate() {
            let mut word = s.pio.value;
            if let (true, Some(mode)) = (s.udma_enabled, s.udma_mode) {
                word |= UDMA_TABLE[mode as usize].value;
            } else if let Some(dma) = s.mwdma {
                word |= dma.value;
            }
            cfg.write_u32(timing_offset(channel, drive), word);
        }
    }
}
