//! Per-chipset register layouts behind one capability trait.
//!
//! The shared algorithms (mode selection, timing merge, PRD construction)
//! are chipset-agnostic; everything a family does differently — timing
//! tables, field offsets and bit positions, interrupt-latch ordering — is
//! supplied by its [`ChipsetOps`] implementation.

pub mod cmd646;
pub mod promise;
pub mod via;

use pci_cfg::SharedConfigSpace;

use crate::irq::ClearPolicy;
use crate::timing::{BusTimingSelection, TimingEntry};

/// PCI clock period at 33 MHz; all timing fields count in these ticks.
pub const CLOCK_NS: u16 = 30;

/// Bit position of a timing field within its register byte.
#[derive(Debug, Clone, Copy)]
pub enum FieldShift {
    Fixed(u8),
    /// Shift computed from the unit: `base - (drive * 2 + channel * 4)`.
    /// Used for address-setup bytes that pack all four drive positions of a
    /// controller into one register.
    PerUnit { base: u8 },
}

/// One bit-packed timing field in configuration space.
///
/// `offset` is the field's register offset keyed by channel and drive; the
/// stored value is re-based against `min_ticks` (registers hold an offset,
/// not an absolute count).
#[derive(Debug, Clone, Copy)]
pub struct TimingField {
    pub name: &'static str,
    pub offset: [[u8; 2]; 2],
    pub shift: FieldShift,
    pub width: u8,
    pub min_ticks: u8,
    pub max_ticks: u8,
}

impl TimingField {
    fn shift_for(&self, channel: usize, drive: usize) -> u8 {
        match self.shift {
            FieldShift::Fixed(s) => s,
            FieldShift::PerUnit { base } => base - (drive as u8 * 2 + channel as u8 * 4),
        }
    }

    fn value_mask(&self) -> u8 {
        ((1u16 << self.width) - 1) as u8
    }

    /// Program a nanosecond interval into the field.
    ///
    /// Ceiling-divides into clock ticks so the programmed timing is never
    /// faster than requested, then clamps into the field's range; there is
    /// no error path, out-of-range values saturate (documented hardware
    /// behavior).
    pub fn write_interval(&self, cfg: &SharedConfigSpace, channel: usize, drive: usize, ns: u16) {
        let ticks = ns
            .div_ceil(CLOCK_NS)
            .clamp(self.min_ticks as u16, self.max_ticks as u16);
        self.write_raw(cfg, channel, drive, (ticks - self.min_ticks as u16) as u8);
    }

    /// Read the field back as nanoseconds.
    pub fn read_interval(&self, cfg: &SharedConfigSpace, channel: usize, drive: usize) -> u16 {
        (self.read_raw(cfg, channel, drive) as u16 + self.min_ticks as u16) * CLOCK_NS
    }

    /// Masked read-modify-write of the raw (re-based) field value.
    pub fn write_raw(&self, cfg: &SharedConfigSpace, channel: usize, drive: usize, value: u8) {
        let shift = self.shift_for(channel, drive);
        let mask = self.value_mask() << shift;
        cfg.modify_u8(
            self.offset[channel][drive],
            mask,
            (value & self.value_mask()) << shift,
        );
    }

    pub fn read_raw(&self, cfg: &SharedConfigSpace, channel: usize, drive: usize) -> u8 {
        let shift = self.shift_for(channel, drive);
        (cfg.read_u8(self.offset[channel][drive]) >> shift) & self.value_mask()
    }
}

/// Everything one chipset family contributes: timing tables, supported
/// mode masks, interrupt-latch ordering, and the register packing that
/// turns a channel's negotiated selections into hardware state.
pub trait ChipsetOps {
    fn name(&self) -> &'static str;

    fn pio_table(&self) -> &'static [TimingEntry];
    fn mwdma_table(&self) -> &'static [TimingEntry];
    fn udma_table(&self) -> &'static [TimingEntry];

    fn pio_mask(&self) -> u32 {
        (1 << self.pio_table().len()) - 1
    }

    fn mwdma_mask(&self) -> u32 {
        (1 << self.mwdma_table().len()) - 1
    }

    fn udma_mask(&self) -> u32 {
        (1 << self.udma_table().len()) - 1
    }

    /// Whether command-timing registers are shared between the two drives
    /// of a channel (the merge step applies only on such chipsets).
    fn shared_command_timing(&self) -> bool {
        false
    }

    fn clear_policy(&self) -> ClearPolicy;

    /// Write both drives' negotiated timings for `channel` into
    /// configuration space. Pure function of its inputs: programming the
    /// same selection twice yields the same register image.
    fn program(&self, cfg: &SharedConfigSpace, channel: usize, sel: &[BusTimingSelection; 2]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pci_cfg::{CfgMem, PciConfigIo};

    const FIELD: TimingField = TimingField {
        name: "active",
        offset: [[0x48, 0x49], [0x4A, 0x4B]],
        shift: FieldShift::Fixed(4),
        width: 4,
        min_ticks: 1,
        max_ticks: 16,
    };

    #[test]
    fn interval_rounds_up_and_stores_rebased_ticks() {
        let cfg = SharedConfigSpace::new(CfgMem::new());

        // 80 ns at 30 ns/tick rounds up to 3 ticks, stored as 3 - 1 = 2.
        FIELD.write_interval(&cfg, 0, 1, 80);
        assert_eq!(cfg.read_u8(0x49) >> 4, 2);
        assert_eq!(FIELD.read_interval(&cfg, 0, 1), 90);
    }

    #[test]
    fn interval_clamps_into_the_field_range() {
        let cfg = SharedConfigSpace::new(CfgMem::new());

        // 0 ns clamps up to the 1-tick minimum.
        FIELD.write_interval(&cfg, 0, 0, 0);
        assert_eq!(FIELD.read_interval(&cfg, 0, 0), 30);

        // 10 µs clamps down to 16 ticks.
        FIELD.write_interval(&cfg, 0, 0, 10_000);
        assert_eq!(FIELD.read_interval(&cfg, 0, 0), 480);
    }

    #[test]
    fn round_trip_is_within_one_tick() {
        let cfg = SharedConfigSpace::new(CfgMem::new());
        for ns in [30u16, 45, 70, 93, 215, 290, 479] {
            FIELD.write_interval(&cfg, 1, 0, ns);
            let back = FIELD.read_interval(&cfg, 1, 0);
            assert!(back >= ns, "{back} ns programmed for {ns} ns request");
            assert!(back - ns < CLOCK_NS, "{back} ns is over a tick past {ns}");
        }
    }

    #[test]
    fn masked_write_preserves_the_other_nibble() {
        let mut mem = CfgMem::new();
        mem.write_u8(0x48, 0x0A);
        let cfg = SharedConfigSpace::new(mem);

        FIELD.write_raw(&cfg, 0, 0, 0x5);
        assert_eq!(cfg.read_u8(0x48), 0x5A);
    }

    #[test]
    fn per_unit_shift_walks_down_by_drive_and_channel() {
        let field = TimingField {
            name: "address-setup",
            offset: [[0x4C; 2]; 2],
            shift: FieldShift::PerUnit { base: 6 },
            width: 2,
            min_ticks: 1,
            max_ticks: 4,
        };
        let cfg = SharedConfigSpace::new(CfgMem::new());

        field.write_raw(&cfg, 0, 0, 0b11);
        field.write_raw(&cfg, 0, 1, 0b10);
        field.write_raw(&cfg, 1, 0, 0b01);
        field.write_raw(&cfg, 1, 1, 0b11);
        assert_eq!(cfg.read_u8(0x4C), 0b11_10_01_11);
    }
}
