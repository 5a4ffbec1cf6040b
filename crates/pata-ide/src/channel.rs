//! Per-channel orchestration: mode negotiation, register programming, PRD
//! builds and interrupt dispatch for one ATA bus with up to two drives.
//!
//! All methods run on the channel's single work loop; the only mutable
//! state shared with a sibling channel is the configuration space behind
//! its serializing handle.

use pci_cfg::SharedConfigSpace;
use thiserror::Error;
use tracing::debug;

use crate::chipset::ChipsetOps;
use crate::irq::{BusMasterIo, ClearPolicy, InterruptPipeline};
use crate::prd::{DmaError, DmaState, PrdTable, SegmentCursor};
use crate::timing::{self, BusTimingSelection};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The request asked for modes this chipset or drive cannot do; no
    /// state was changed.
    #[error("requested transfer mode not supported")]
    ModeNotSupported,
}

/// Requested transfer modes for one drive. Bit i set means mode i is
/// acceptable; cycle times of 0 mean "no floor requested".
#[derive(Debug, Clone, Copy, Default)]
pub struct ModeRequest {
    pub pio_mask: u32,
    pub mwdma_mask: u32,
    pub udma_mask: u32,
    pub pio_cycle_ns: u16,
    pub mwdma_cycle_ns: u16,
}

impl ModeRequest {
    pub fn pio(mask: u32) -> Self {
        Self {
            pio_mask: mask,
            ..Default::default()
        }
    }
}

/// What was actually selected, mirrored back as bitmasks (`1 << mode`)
/// plus the achieved cycle times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeReport {
    pub pio_mask: u32,
    pub mwdma_mask: u32,
    pub udma_mask: u32,
    pub pio_cycle_ns: u16,
    pub mwdma_cycle_ns: u16,
}

pub struct Channel<C: ChipsetOps> {
    chipset: C,
    cfg: SharedConfigSpace,
    /// 0 = primary, 1 = secondary.
    index: usize,
    /// 80-conductor cable state per drive, probed once at channel start.
    cable_80w: [bool; 2],
    selection: [BusTimingSelection; 2],
    prd: PrdTable,
    dma_state: DmaState,
    pipeline: InterruptPipeline,
}

impl<C: ChipsetOps> Channel<C> {
    /// `shared_irq` should be false only for fixed legacy lines that are
    /// never shared; it lets the interrupt filter skip its register read.
    pub fn new(
        chipset: C,
        cfg: SharedConfigSpace,
        index: usize,
        cable_80w: [bool; 2],
        shared_irq: bool,
    ) -> Self {
        let slowest = BusTimingSelection::slowest(chipset.pio_table());
        let pipeline = InterruptPipeline::new(chipset.clear_policy(), shared_irq);
        Self {
            chipset,
            cfg,
            index,
            cable_80w,
            selection: [slowest; 2],
            prd: PrdTable::new(),
            dma_state: DmaState::Idle,
            pipeline,
        }
    }

    pub fn selection(&self, drive: usize) -> &BusTimingSelection {
        &self.selection[drive]
    }

    pub fn dma_state(&self) -> DmaState {
        self.dma_state
    }

    pub fn prd(&self) -> &PrdTable {
        &self.prd
    }

    /// Negotiate and program transfer timings for one drive.
    ///
    /// Invalid requests are rejected before any selection runs; on
    /// rejection neither drive's recorded selection changes and no
    /// register is written.
    pub fn configure(&mut self, drive: usize, req: &ModeRequest) -> Result<ModeReport, ConfigError> {
        self.validate(req)?;

        let (pio_mode, pio) = timing::select(req.pio_mask, req.pio_cycle_ns, self.chipset.pio_table())
            .ok_or(ConfigError::ModeNotSupported)?;

        let mut sel = BusTimingSelection {
            pio_mode,
            pio,
            mwdma_mode: None,
            mwdma: None,
            udma_mode: None,
            udma_enabled: false,
        };

        if req.mwdma_mask != 0 {
            let (mode, entry) =
                timing::select(req.mwdma_mask, req.mwdma_cycle_ns, self.chipset.mwdma_table())
                    .ok_or(ConfigError::ModeNotSupported)?;
            sel.mwdma_mode = Some(mode);
            sel.mwdma = Some(entry);
        }

        if let Some(mode) = timing::mask_to_mode(req.udma_mask) {
            let mode = mode.min(self.chipset.udma_table().len() as u8 - 1);
            let mode = timing::limit_udma_for_cable(mode, self.cable_80w[drive]);
            sel.udma_mode = Some(mode);
            sel.udma_enabled = true;
        }

        self.selection[drive] = sel;

        // Informational only; the command layer reads modes back through
        // the report.
        debug!(
            chipset = self.chipset.name(),
            channel = self.index,
            drive,
            pio_mode = sel.pio_mode,
            mwdma_mode = sel.mwdma_mode,
            udma_mode = sel.udma_mode,
            shared_command_timing = self.chipset.shared_command_timing(),
            "transfer mode negotiated"
        );

        // Reprogram the whole channel: on shared-register chipsets the
        // sibling's constraints fold into the same bytes.
        self.chipset.program(&self.cfg, self.index, &self.selection);

        Ok(self.report(drive))
    }

    fn validate(&self, req: &ModeRequest) -> Result<(), ConfigError> {
        if req.pio_mask & self.chipset.pio_mask() == 0 {
            return Err(ConfigError::ModeNotSupported);
        }
        if req.mwdma_mask & !self.chipset.mwdma_mask() != 0 {
            return Err(ConfigError::ModeNotSupported);
        }
        if req.udma_mask & !self.chipset.udma_mask() != 0 {
            return Err(ConfigError::ModeNotSupported);
        }
        // Multi-word DMA and Ultra-DMA drive the same strobe lines; a
        // request may arm only one of them.
        if req.mwdma_mask != 0 && req.udma_mask != 0 {
            return Err(ConfigError::ModeNotSupported);
        }
        Ok(())
    }

    fn report(&self, drive: usize) -> ModeReport {
        let sel = &self.selection[drive];
        ModeReport {
            pio_mask: 1 << sel.pio_mode,
            mwdma_mask: sel.mwdma_mode.map_or(0, |m| 1 << m),
            udma_mask: sel.udma_mode.filter(|_| sel.udma_enabled).map_or(0, |m| 1 << m),
            pio_cycle_ns: sel.pio.cycle_ns,
            mwdma_cycle_ns: sel.mwdma.map_or(0, |e| e.cycle_ns),
        }
    }

    /// Drop both drives back to the universally compatible timing and
    /// re-terminate the descriptor table. Called on bus reset.
    pub fn reset_bus(&mut self) {
        let slowest = BusTimingSelection::slowest(self.chipset.pio_table());
        self.selection = [slowest; 2];
        self.chipset.program(&self.cfg, self.index, &self.selection);
        self.prd.terminate_all();
        self.dma_state = DmaState::Idle;
    }

    /// Build the PRD chain for the next command.
    pub fn build_dma(
        &mut self,
        cursor: &mut dyn SegmentCursor,
        byte_count: u64,
    ) -> Result<usize, DmaError> {
        match self.prd.build(cursor, byte_count) {
            Ok(count) => {
                self.dma_state = DmaState::AwaitingStatus;
                Ok(count)
            }
            Err(DmaError::TableExhausted) => {
                self.dma_state = DmaState::Error;
                Err(DmaError::TableExhausted)
            }
            Err(err) => {
                // The engine was never touched; the channel can take
                // another command immediately.
                self.dma_state = DmaState::Idle;
                Err(err)
            }
        }
    }

    /// Mark the engine idle once completion status has been consumed.
    pub fn finish_dma(&mut self) {
        self.dma_state = DmaState::Idle;
    }

    /// Interrupt-context predicate; cheap by construction.
    pub fn filter_interrupt(&self, bm: &mut dyn BusMasterIo) -> bool {
        self.pipeline.filter(bm)
    }

    /// Service a claimed interrupt on the work loop, honoring the
    /// chipset's latch-clear ordering.
    pub fn handle_interrupt(&mut self, bm: &mut dyn BusMasterIo, on_complete: &mut dyn FnMut()) {
        self.pipeline.service(bm, on_complete);
    }

    pub fn clear_policy(&self) -> ClearPolicy {
        self.chipset.clear_policy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chipset::cmd646::Cmd646;
    use crate::chipset::via::Via;
    use crate::prd::{PhysSegment, PRD_CAPACITY};
    use pci_cfg::CfgMem;

    fn via_channel(cable_80w: [bool; 2]) -> Channel<Via> {
        Channel::new(Via, SharedConfigSpace::new(CfgMem::new()), 0, cable_80w, true)
    }

    struct OneSegment(Option<PhysSegment>);

    impl SegmentCursor for OneSegment {
        fn next_segment(&mut self, max_len: u32) -> Option<PhysSegment> {
            let seg = self.0.take()?;
            Some(PhysSegment {
                addr: seg.addr,
                len: seg.len.min(max_len),
            })
        }
    }

    struct TinySegments(u64);

    impl SegmentCursor for TinySegments {
        fn next_segment(&mut self, _max_len: u32) -> Option<PhysSegment> {
            let addr = 0x1000 + self.0 * 0x10;
            self.0 += 1;
            Some(PhysSegment { addr, len: 1 })
        }
    }

    #[test]
    fn simultaneous_mwdma_and_udma_request_is_rejected_without_mutation() {
        let mut ch = via_channel([true, true]);
        ch.configure(0, &ModeRequest::pio(0b1_0000)).unwrap();
        let before = *ch.selection(0);

        let req = ModeRequest {
            pio_mask: 0b1_0000,
            mwdma_mask: 0b100,
            udma_mask: 0b10,
            ..Default::default()
        };
        assert_eq!(ch.configure(0, &req), Err(ConfigError::ModeNotSupported));
        assert_eq!(ch.selection(0).pio_mode, before.pio_mode);
        assert_eq!(ch.selection(0).mwdma_mode, before.mwdma_mode);
    }

    #[test]
    fn unsupported_mode_bits_are_rejected() {
        let mut ch = via_channel([true, true]);

        // No PIO bit at all.
        assert!(ch.configure(0, &ModeRequest::default()).is_err());

        // MWDMA bit past mode 2.
        let req = ModeRequest {
            pio_mask: 1,
            mwdma_mask: 0b1000,
            ..Default::default()
        };
        assert!(ch.configure(0, &req).is_err());

        // UDMA bit past the VIA table (mode 7).
        let req = ModeRequest {
            pio_mask: 1,
            udma_mask: 0b1000_0000,
            ..Default::default()
        };
        assert!(ch.configure(0, &req).is_err());
    }

    #[test]
    fn udma_above_two_downgrades_without_80w_cable() {
        let mut ch = via_channel([false, true]);
        let req = ModeRequest {
            pio_mask: 0b1_0000,
            udma_mask: 0b10_0000,
            ..Default::default()
        };

        let report = ch.configure(0, &req).unwrap();
        assert_eq!(ch.selection(0).udma_mode, Some(2));
        assert_eq!(report.udma_mask, 0b100);

        // Same request on the drive with the good cable keeps mode 5.
        let report = ch.configure(1, &req).unwrap();
        assert_eq!(report.udma_mask, 0b10_0000);
    }

    #[test]
    fn report_mirrors_masks_and_achieved_cycle_times() {
        let mut ch = via_channel([true, true]);
        let req = ModeRequest {
            pio_mask: 0b1_1111,
            mwdma_mask: 0b111,
            ..Default::default()
        };

        let report = ch.configure(0, &req).unwrap();
        assert_eq!(
            report,
            ModeReport {
                pio_mask: 0b1_0000,
                mwdma_mask: 0b100,
                udma_mask: 0,
                pio_cycle_ns: 120,
                mwdma_cycle_ns: 120,
            }
        );
    }

    #[test]
    fn reset_drops_to_pio_mode_zero_with_dma_disabled() {
        let mut ch = via_channel([true, true]);
        let req = ModeRequest {
            pio_mask: 0b1_0000,
            udma_mask: 0b100,
            ..Default::default()
        };
        ch.configure(0, &req).unwrap();

        ch.reset_bus();
        let sel = ch.selection(0);
        assert_eq!(sel.pio_mode, 0);
        assert_eq!(sel.pio.cycle_ns, 600);
        assert!(sel.mwdma.is_none());
        assert!(!sel.udma_enabled);
        assert_eq!(ch.dma_state(), DmaState::Idle);
    }

    #[test]
    fn dma_build_states_follow_the_outcome() {
        let mut ch = via_channel([true, true]);

        // Success: awaiting completion status.
        let mut one = OneSegment(Some(PhysSegment {
            addr: 0x1000,
            len: 0x200,
        }));
        assert_eq!(ch.build_dma(&mut one, 0x200), Ok(1));
        assert_eq!(ch.dma_state(), DmaState::AwaitingStatus);
        ch.finish_dma();

        // Empty build: rejected, engine untouched.
        let mut none = OneSegment(None);
        assert_eq!(ch.build_dma(&mut none, 0x200), Err(DmaError::EmptyTransfer));
        assert_eq!(ch.dma_state(), DmaState::Idle);

        // Exhaustion: channel DMA state latches the error.
        let mut tiny = TinySegments(0);
        assert_eq!(
            ch.build_dma(&mut tiny, PRD_CAPACITY as u64 + 1),
            Err(DmaError::TableExhausted)
        );
        assert_eq!(ch.dma_state(), DmaState::Error);
    }

    #[test]
    fn clear_policy_comes_from_the_chipset() {
        let via = via_channel([true, true]);
        assert_eq!(via.clear_policy(), ClearPolicy::BeforeHandler);

        let cmd = Channel::new(
            Cmd646,
            SharedConfigSpace::new(CfgMem::new()),
            0,
            [true, true],
            true,
        );
        assert_eq!(cmd.clear_policy(), ClearPolicy::AfterHandler);
    }
}
