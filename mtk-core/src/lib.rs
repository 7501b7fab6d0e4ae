#[macro_use]
extern crate static_assertions;

use std::fmt;
use thiserror::Error;

pub mod address_map;
pub mod address_range;
pub mod bus;
pub mod core;
pub mod debug;
pub mod instruction;
pub mod probe;
pub mod registers;
pub mod resources;
pub mod simulator;
pub mod soc;

#[cfg(test)]
pub(crate) mod asm;

/// Re-export of [`AddressRange`] for convenience.
pub use address_range::AddressRange;
pub use simulator::{Clocked, Simulator};
pub use soc::Soc;

/// Two-bit privilege level as found in `mstatus.MPP` or `dcsr.prv`, including the reserved
/// encoding `2`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub enum RawPrivilegeLevel {
    User = 0,
    Supervisor = 1,
    Reserved = 2,
    Machine = 3,
}

impl RawPrivilegeLevel {
    /// Convert the two least significant bits of `value` into a [`RawPrivilegeLevel`].
    pub fn from_u2(value: u8) -> Self {
        match value & 0b11 {
            0 => Self::User,
            1 => Self::Supervisor,
            2 => Self::Reserved,
            _ => Self::Machine,
        }
    }
}

/// Privilege level the hart executes at.
///
/// > The machine level has the highest privileges and is the only mandatory privilege level for a
/// > RISC-V hardware platform.
///
/// Supervisor mode is representable (e.g. written into `mstatus.MPP` and entered through `mret`),
/// but no supervisor CSRs or delegation exist.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub enum PrivilegeLevel {
    User = 0,
    Supervisor = 1,
    Machine = 3,
}

impl fmt::Display for PrivilegeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match *self {
            PrivilegeLevel::User => "U",
            PrivilegeLevel::Supervisor => "S",
            PrivilegeLevel::Machine => "M",
        })
    }
}

impl TryFrom<RawPrivilegeLevel> for PrivilegeLevel {
    type Error = ReservedPrivilegeLevelError;

    fn try_from(value: RawPrivilegeLevel) -> Result<Self, Self::Error> {
        match value {
            RawPrivilegeLevel::User => Ok(Self::User),
            RawPrivilegeLevel::Supervisor => Ok(Self::Supervisor),
            RawPrivilegeLevel::Reserved => Err(ReservedPrivilegeLevelError),
            RawPrivilegeLevel::Machine => Ok(Self::Machine),
        }
    }
}

#[derive(Error, Debug, Clone, Copy, Eq, PartialEq)]
#[error("privilege level 2 is reserved")]
pub struct ReservedPrivilegeLevelError;

/// Natural alignment of a memory access.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Alignment(u32);

impl Alignment {
    pub const BYTE: Self = Self(1);
    pub const HALFWORD: Self = Self(2);
    pub const WORD: Self = Self(4);

    /// Returns the natural alignment of an access of `size` bytes, or `None` if `size` isn't one of
    /// 1, 2, or 4.
    pub fn natural_for_size(size: u32) -> Option<Self> {
        match size {
            1 => Some(Self::BYTE),
            2 => Some(Self::HALFWORD),
            4 => Some(Self::WORD),
            _ => None,
        }
    }

    pub fn is_aligned(self, address: u32) -> bool {
        address & (self.0 - 1) == 0
    }

    /// Rounds `address` down to the closest aligned address.
    pub fn align_down(self, address: u32) -> u32 {
        address & !(self.0 - 1)
    }
}
