//! Bus-timing negotiation and DMA descriptor construction for legacy PCI
//! parallel-ATA (IDE) host controllers.
//!
//! One [`channel::Channel`] drives one ATA bus (up to two drives sharing the
//! electrical signal lines). It negotiates PIO / multi-word DMA / Ultra-DMA
//! timings against per-chipset lookup tables, packs the result into the
//! chipset's configuration-space timing registers, and builds the physical
//! region descriptor (PRD) chain consumed by the Bus Master IDE DMA engine.
//!
//! Chipset-specific register layouts live behind [`chipset::ChipsetOps`];
//! three families are provided: [`chipset::via`], [`chipset::cmd646`] and
//! [`chipset::promise`].

pub mod channel;
pub mod chipset;
pub mod irq;
pub mod prd;
pub mod timing;

pub use channel::{Channel, ConfigError, ModeRequest, ModeReport};
pub use chipset::ChipsetOps;
pub use irq::{BmCommand, BmStatus, BusMasterIo, ClearPolicy};
pub use prd::{DmaError, DmaState, PhysSegment, PrdEntry, PrdTable, SegmentCursor};
