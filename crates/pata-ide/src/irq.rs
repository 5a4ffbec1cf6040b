//! Interrupt filter/handler pipeline over the Bus Master IDE status
//! register.
//!
//! The filter runs in interrupt context and must stay at one register read
//! plus a comparison; it exists only to keep shared-line interrupts that
//! belong to another device from waking the channel's work loop. The
//! handler runs on the work loop and clears the channel's interrupt latch
//! in a chipset-fixed order relative to command completion.

use bitflags::bitflags;

bitflags! {
    /// Bus Master IDE status register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct BmStatus: u8 {
        const ACTIVE = 1 << 0;
        const ERROR = 1 << 1;
        /// This channel's interrupt latch. Write-1-to-clear.
        const INTERRUPT = 1 << 2;
        const DRIVE0_DMA_CAPABLE = 1 << 5;
        const DRIVE1_DMA_CAPABLE = 1 << 6;
        const SIMPLEX = 1 << 7;
    }
}

bitflags! {
    /// Bus Master IDE command register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct BmCommand: u8 {
        const START = 1 << 0;
        /// Transfer direction: set = device to memory.
        const WRITE_TO_MEMORY = 1 << 3;
    }
}

/// Access to one channel's bus-master register block.
pub trait BusMasterIo {
    fn read_status(&mut self) -> BmStatus;
    /// Write-1-to-clear the given status bits.
    fn clear_status(&mut self, bits: BmStatus);
}

/// When the interrupt latch is cleared relative to the completion handler.
///
/// Fixed per chipset family: clearing early floats the line on some parts
/// and immediately retriggers a spurious interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearPolicy {
    BeforeHandler,
    AfterHandler,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqState {
    Idle,
    Servicing,
}

pub struct InterruptPipeline {
    policy: ClearPolicy,
    /// Channels on fixed legacy IRQ lines are never shared and skip the
    /// filter read entirely.
    shared_line: bool,
    state: IrqState,
}

impl InterruptPipeline {
    pub fn new(policy: ClearPolicy, shared_line: bool) -> Self {
        Self {
            policy,
            shared_line,
            state: IrqState::Idle,
        }
    }

    pub fn state(&self) -> IrqState {
        self.state
    }

    /// Interrupt-context predicate: does this interrupt belong to us?
    pub fn filter(&self, bm: &mut dyn BusMasterIo) -> bool {
        if !self.shared_line {
            return true;
        }
        bm.read_status().contains(BmStatus::INTERRUPT)
    }

    /// Work-loop phase: run command completion and clear the latch in the
    /// chipset's required order.
    pub fn service(&mut self, bm: &mut dyn BusMasterIo, on_complete: &mut dyn FnMut()) {
        self.state = IrqState::Servicing;
        match self.policy {
            ClearPolicy::BeforeHandler => {
                bm.clear_status(BmStatus::INTERRUPT);
                on_complete();
            }
            ClearPolicy::AfterHandler => {
                on_complete();
                bm.clear_status(BmStatus::INTERRUPT);
            }
        }
        self.state = IrqState::Idle;
    }
}
