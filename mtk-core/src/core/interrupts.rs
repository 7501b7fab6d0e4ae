use bitvec::{array::BitArray, field::BitField, order::Lsb0};

use super::trap::Interrupt;

#[allow(clippy::identity_op)]
const VALID_INTERRUPTS_MASK: u16 = 0
    | (1 << Interrupt::MachineSoftwareInterrupt as usize)
    | (1 << Interrupt::MachineTimerInterrupt as usize)
    | (1 << Interrupt::MachineExternalInterrupt as usize);

/// The mie and mip registers.
///
/// `mie` is fully writable over the implemented machine-level bits. `mip` is read-only to software:
/// its MSIP, MTIP, and MEIP bits mirror the external interrupt lines driven through
/// [`Interrupts::set_line`].
#[derive(Debug, Clone, Default)]
pub struct Interrupts {
    mip: BitArray<[u16; 1], Lsb0>,
    mie: BitArray<[u16; 1], Lsb0>,
}

impl Interrupts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drive the external line feeding the pending bit of `interrupt`.
    ///
    /// Lines without an implemented pending bit are ignored.
    pub fn set_line(&mut self, interrupt: Interrupt, value: bool) {
        if VALID_INTERRUPTS_MASK >> interrupt as usize & 1 == 1 {
            self.mip.set(interrupt as usize, value);
        }
    }

    pub fn read_mip(&self) -> u32 {
        self.mip.load_le::<u16>() as u32
    }

    pub fn read_mie(&self) -> u32 {
        self.mie.load_le::<u16>() as u32
    }

    pub fn write_mie(&mut self, value: u32, mask: u32) {
        let mask = mask as u16 & VALID_INTERRUPTS_MASK;
        let mie = self.mie.load_le::<u16>() & !mask | value as u16 & mask;
        self.mie.store_le(mie);
    }

    /// Interrupts both pending and enabled, one bit per cause code.
    pub fn pending_enabled(&self) -> u16 {
        (self.mip & self.mie).load_le()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_enabled() {
        let mut interrupts = Interrupts::new();
        interrupts.set_line(Interrupt::MachineExternalInterrupt, true);
        interrupts.set_line(Interrupt::SupervisorExternalInterrupt, true);
        assert_eq!(0x800, interrupts.read_mip());
        assert_eq!(0, interrupts.pending_enabled());
        interrupts.write_mie(0xffff_ffff, 0xffff_ffff);
        assert_eq!(0x888, interrupts.read_mie());
        assert_eq!(0x800, interrupts.pending_enabled());
        interrupts.set_line(Interrupt::MachineExternalInterrupt, false);
        assert_eq!(0, interrupts.pending_enabled());
    }
}
