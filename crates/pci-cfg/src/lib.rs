//! Serialized access to an IDE controller's PCI configuration space.
//!
//! Both channels of a controller program their timing registers into one
//! shared configuration space, and several timing fields pack multiple
//! drives (or both channels) into a single byte. Every write therefore goes
//! through a masked read-modify-write so a channel never clobbers bits owned
//! by its sibling, and all access funnels through one serializing handle
//! owned by the root controller object.

use std::cell::RefCell;
use std::rc::Rc;

/// Byte-granular configuration-space access.
///
/// Reads are `&mut self` because implementations may sit on top of an
/// indexed CF8h/CFCh access mechanism with its own latch state.
pub trait PciConfigIo {
    fn read_u8(&mut self, offset: u8) -> u8;
    fn write_u8(&mut self, offset: u8, value: u8);

    /// Masked read-modify-write: only bits set in `mask` are replaced.
    fn modify_u8(&mut self, offset: u8, mask: u8, value: u8) {
        let old = self.read_u8(offset);
        self.write_u8(offset, (old & !mask) | (value & mask));
    }

    fn read_u32(&mut self, offset: u8) -> u32 {
        let mut bytes = [0u8; 4];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = self.read_u8(offset.wrapping_add(i as u8));
        }
        u32::from_le_bytes(bytes)
    }

    fn write_u32(&mut self, offset: u8, value: u32) {
        for (i, b) in value.to_le_bytes().iter().enumerate() {
            self.write_u8(offset.wrapping_add(i as u8), *b);
        }
    }
}

/// Shared handle to a controller's configuration space.
///
/// Channels hold clones of this handle instead of raw register addresses;
/// the `RefCell` serializes access within the single work-loop execution
/// model (one borrow per register operation, never held across calls).
#[derive(Clone)]
pub struct SharedConfigSpace {
    inner: Rc<RefCell<dyn PciConfigIo>>,
}

impl SharedConfigSpace {
    pub fn new(io: impl PciConfigIo + 'static) -> Self {
        Self {
            inner: Rc::new(RefCell::new(io)),
        }
    }

    pub fn read_u8(&self, offset: u8) -> u8 {
        self.inner.borrow_mut().read_u8(offset)
    }

    pub fn write_u8(&self, offset: u8, value: u8) {
        self.inner.borrow_mut().write_u8(offset, value)
    }

    pub fn modify_u8(&self, offset: u8, mask: u8, value: u8) {
        self.inner.borrow_mut().modify_u8(offset, mask, value)
    }

    pub fn read_u32(&self, offset: u8) -> u32 {
        self.inner.borrow_mut().read_u32(offset)
    }

    pub fn write_u32(&self, offset: u8, value: u32) {
        self.inner.borrow_mut().write_u32(offset, value)
    }
}

/// In-memory configuration space, for tests and bring-up on fake hardware.
#[derive(Clone)]
pub struct CfgMem {
    bytes: [u8; 256],
}

impl CfgMem {
    pub fn new() -> Self {
        Self { bytes: [0; 256] }
    }

    /// Snapshot of the whole space, for comparing register images.
    pub fn bytes(&self) -> [u8; 256] {
        self.bytes
    }
}

impl Default for CfgMem {
    fn default() -> Self {
        Self::new()
    }
}

impl PciConfigIo for CfgMem {
    fn read_u8(&mut self, offset: u8) -> u8 {
        self.bytes[offset as usize]
    }

    fn write_u8(&mut self, offset: u8, value: u8) {
        self.bytes[offset as usize] = value;
    }
}
