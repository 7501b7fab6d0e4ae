use bitvec::{field::BitField, order::Lsb0, view::BitView};

use crate::{PrivilegeLevel, RawPrivilegeLevel};

/// The mstatus register.
///
/// > The mstatus register is an MXLEN-bit read/write register [...]. The mstatus register keeps
/// > track of and controls the hart’s current operating state.
///
/// Software writes latch the whole value, except for MPP which is **WARL** and keeps its old value
/// when the reserved privilege level is written.
#[derive(Debug, Clone, Default)]
pub struct Status {
    mstatus: u32,
}

impl Status {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self) -> u32 {
        self.mstatus
    }

    pub fn write(&mut self, value: u32, mask: u32) {
        let old_mpp = self.mpp();
        self.mstatus = self.mstatus & !mask | value & mask;
        let written = RawPrivilegeLevel::from_u2(self.mstatus.view_bits::<Lsb0>()[idx::MPP].load_le());
        if PrivilegeLevel::try_from(written).is_err() {
            self.set_mpp(old_mpp);
        }
    }

    /// Returns `true` if the MIE (M-mode Interrupt Enable) bit is set.
    pub fn mie(&self) -> bool {
        self.mstatus.view_bits::<Lsb0>()[idx::MIE]
    }

    pub fn set_mie(&mut self, value: bool) {
        self.mstatus.view_bits_mut::<Lsb0>().set(idx::MIE, value);
    }

    /// Returns `true` if the MPIE (M-mode Previous Interrupt Enable) bit is set.
    pub fn mpie(&self) -> bool {
        self.mstatus.view_bits::<Lsb0>()[idx::MPIE]
    }

    pub fn set_mpie(&mut self, value: bool) {
        self.mstatus.view_bits_mut::<Lsb0>().set(idx::MPIE, value);
    }

    /// Returns the privilege level held in the MPP (M-mode Previous Privilege) field.
    pub fn mpp(&self) -> PrivilegeLevel {
        let raw = RawPrivilegeLevel::from_u2(self.mstatus.view_bits::<Lsb0>()[idx::MPP].load_le());
        // Only legal values are ever stored.
        PrivilegeLevel::try_from(raw).unwrap_or(PrivilegeLevel::Machine)
    }

    pub fn set_mpp(&mut self, value: PrivilegeLevel) {
        self.mstatus.view_bits_mut::<Lsb0>()[idx::MPP].store_le(value as u8);
    }

    /// Trap entry: stack the interrupt enable and the privilege level the trap was taken from.
    pub fn push(&mut self, from: PrivilegeLevel) {
        self.set_mpie(self.mie());
        self.set_mie(false);
        self.set_mpp(from);
    }

    /// `mret`: unstack interrupt enable and return the privilege level to continue in.
    ///
    /// > MIE is set to MPIE; the privilege mode is changed to MPP; MPIE is set to 1; and MPP is set
    /// > to the least-privileged supported mode.
    pub fn pop(&mut self) -> PrivilegeLevel {
        let to = self.mpp();
        self.set_mie(self.mpie());
        self.set_mpie(true);
        self.set_mpp(PrivilegeLevel::User);
        to
    }
}

mod idx {
    use std::ops::Range;

    pub const MIE: usize = 3;
    pub const MPIE: usize = 7;
    pub const MPP: Range<usize> = 11..13;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop() {
        let mut status = Status::new();
        status.set_mie(true);
        status.push(PrivilegeLevel::User);
        assert!(!status.mie());
        assert!(status.mpie());
        assert_eq!(PrivilegeLevel::User, status.mpp());
        assert_eq!(PrivilegeLevel::User, status.pop());
        assert!(status.mie());
        assert!(status.mpie());
    }

    #[test]
    fn test_mpp_is_warl() {
        let mut status = Status::new();
        status.write(0x0000_1800, 0xffff_ffff);
        assert_eq!(PrivilegeLevel::Machine, status.mpp());
        status.write(0x0000_1008, 0xffff_ffff);
        assert_eq!(PrivilegeLevel::Machine, status.mpp());
        assert!(status.mie());
        assert_eq!(0x0000_1808, status.read());
    }
}
