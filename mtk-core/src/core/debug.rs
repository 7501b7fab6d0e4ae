use bitvec::{field::BitField, order::Lsb0, view::BitView};

use crate::{PrivilegeLevel, RawPrivilegeLevel};

/// Why the hart entered Debug Mode, as reported in `dcsr.cause`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DebugCause {
    Ebreak = 1,
    Trigger = 2,
    HaltRequest = 3,
    Step = 4,
    ResetHaltRequest = 5,
}

/// Debug Control and Status register.
///
/// Software (in Debug Mode) can only change `step` and `ebreakm`. `cause` and `prv` are updated by
/// the hart when it halts.
#[derive(Debug, Clone)]
pub struct Dcsr(u32);

impl Default for Dcsr {
    fn default() -> Self {
        Self::new()
    }
}

impl Dcsr {
    const WRITABLE: u32 = 1 << idx::STEP | 1 << idx::EBREAKM;

    /// Reset value: `prv` = M and `debugver` = 4 (external debug support as specified).
    pub fn new() -> Self {
        let mut dcsr = 0u32;
        dcsr.view_bits_mut::<Lsb0>()[idx::PRV].store_le(PrivilegeLevel::Machine as u8);
        dcsr.view_bits_mut::<Lsb0>()[idx::DEBUGVER].store_le(4u8);
        Self(dcsr)
    }

    pub fn read(&self) -> u32 {
        self.0
    }

    pub fn write(&mut self, value: u32, mask: u32) {
        let mask = mask & Self::WRITABLE;
        self.0 = self.0 & !mask | value & mask;
    }

    pub fn step(&self) -> bool {
        self.0.view_bits::<Lsb0>()[idx::STEP]
    }

    pub fn ebreakm(&self) -> bool {
        self.0.view_bits::<Lsb0>()[idx::EBREAKM]
    }

    pub fn cause(&self) -> u8 {
        self.0.view_bits::<Lsb0>()[idx::CAUSE].load_le()
    }

    pub fn set_cause(&mut self, cause: DebugCause) {
        self.0.view_bits_mut::<Lsb0>()[idx::CAUSE].store_le(cause as u8);
    }

    /// Privilege level the hart was running at when it halted.
    pub fn prv(&self) -> PrivilegeLevel {
        let raw = RawPrivilegeLevel::from_u2(self.0.view_bits::<Lsb0>()[idx::PRV].load_le());
        PrivilegeLevel::try_from(raw).unwrap_or(PrivilegeLevel::Machine)
    }

    pub fn set_prv(&mut self, value: PrivilegeLevel) {
        self.0.view_bits_mut::<Lsb0>()[idx::PRV].store_le(value as u8);
    }
}

mod idx {
    use std::ops::Range;

    pub const PRV: Range<usize> = 0..2;
    pub const STEP: usize = 2;
    pub const CAUSE: Range<usize> = 6..9;
    pub const EBREAKM: usize = 15;
    pub const DEBUGVER: Range<usize> = 28..32;
}
