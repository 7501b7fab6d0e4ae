//! Sv32 address translation.
//!
//! The walk runs as a small state machine on the hart's bus port: one page-table entry read per
//! bus transaction, first level 1 (indexed by VPN[1]) then level 0 (indexed by VPN[0]).

use bitvec::{field::BitField, order::Lsb0, view::BitView};
use log::trace;
use thiserror::Error;

use super::memory::AccessType;
use crate::bus::{BusPort, BusRequest};
use crate::PrivilegeLevel;

const PAGE_SIZE: u64 = 4096;
const PTE_SIZE: u32 = 4;

/// Supervisor Address Translation and Protection register.
///
/// Only the MODE and PPN fields are writable; ASID is hardwired to zero.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct Satp(u32);

impl Satp {
    const WRITABLE: u32 = 0x803f_ffff;

    pub fn read(&self) -> u32 {
        self.0
    }

    pub fn write(&mut self, value: u32, mask: u32) {
        let mask = mask & Self::WRITABLE;
        self.0 = self.0 & !mask | value & mask;
    }

    /// `true` when MODE selects Sv32.
    pub fn sv32(&self) -> bool {
        self.0.view_bits::<Lsb0>()[31]
    }

    /// Physical page number of the root page table.
    pub fn ppn(&self) -> u32 {
        self.0.view_bits::<Lsb0>()[0..22].load_le()
    }
}

/// An Sv32 page-table entry.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Pte(pub u32);

impl Pte {
    pub fn v(self) -> bool {
        self.0.view_bits::<Lsb0>()[idx::V]
    }

    pub fn r(self) -> bool {
        self.0.view_bits::<Lsb0>()[idx::R]
    }

    pub fn w(self) -> bool {
        self.0.view_bits::<Lsb0>()[idx::W]
    }

    pub fn x(self) -> bool {
        self.0.view_bits::<Lsb0>()[idx::X]
    }

    pub fn u(self) -> bool {
        self.0.view_bits::<Lsb0>()[idx::U]
    }

    pub fn g(self) -> bool {
        self.0.view_bits::<Lsb0>()[idx::G]
    }

    pub fn a(self) -> bool {
        self.0.view_bits::<Lsb0>()[idx::A]
    }

    pub fn d(self) -> bool {
        self.0.view_bits::<Lsb0>()[idx::D]
    }

    pub fn rsw(self) -> u8 {
        self.0.view_bits::<Lsb0>()[idx::RSW].load_le()
    }

    pub fn ppn0(self) -> u32 {
        self.0.view_bits::<Lsb0>()[idx::PPN0].load_le()
    }

    pub fn ppn1(self) -> u32 {
        self.0.view_bits::<Lsb0>()[idx::PPN1].load_le()
    }

    /// The full 22-bit physical page number.
    pub fn ppn(self) -> u32 {
        self.0 >> 10
    }

    /// A valid entry with R or X set maps a page; otherwise it points to the next level table.
    pub fn is_leaf(self) -> bool {
        self.r() || self.x()
    }
}

mod idx {
    use std::ops::Range;

    pub const V: usize = 0;
    pub const R: usize = 1;
    pub const W: usize = 2;
    pub const X: usize = 3;
    pub const U: usize = 4;
    pub const G: usize = 5;
    pub const A: usize = 6;
    pub const D: usize = 7;
    pub const RSW: Range<usize> = 8..10;
    pub const PPN0: Range<usize> = 10..20;
    pub const PPN1: Range<usize> = 20..32;
}

fn vpn(vaddr: u32, level: usize) -> u32 {
    (vaddr >> (12 + 10 * level)) & 0x3ff
}

#[derive(Error, Debug, Clone, Copy, Eq, PartialEq)]
pub enum PageFault {
    #[error("{access:?} of {vaddr:#010x}: invalid PTE at level {level}")]
    Invalid { vaddr: u32, access: AccessType, level: usize },
    #[error("{access:?} of {vaddr:#010x}: no leaf PTE found")]
    NoLeaf { vaddr: u32, access: AccessType },
    #[error("{access:?} of {vaddr:#010x}: permission denied at level {level}")]
    Permission { vaddr: u32, access: AccessType, level: usize },
    #[error("{access:?} of {vaddr:#010x}: A/D bit clear at level {level}")]
    AccessedDirty { vaddr: u32, access: AccessType, level: usize },
    #[error("{access:?} of {vaddr:#010x}: misaligned superpage")]
    MisalignedSuperpage { vaddr: u32, access: AccessType },
}

/// Outcome of inspecting one page-table entry.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum WalkStep {
    /// Continue at the table with this physical base address.
    Table(u32),
    /// Translation finished with this physical address.
    Leaf(u32),
}

/// Checks the entry read at `level` for an access of kind `access` at `privilege`.
pub fn inspect(
    pte: Pte,
    level: usize,
    vaddr: u32,
    access: AccessType,
    privilege: PrivilegeLevel,
) -> Result<WalkStep, PageFault> {
    if !pte.v() || (pte.w() && !pte.r()) {
        return Err(PageFault::Invalid {
            vaddr,
            access,
            level,
        });
    }
    if !pte.is_leaf() {
        return match level {
            0 => Err(PageFault::NoLeaf { vaddr, access }),
            _ => Ok(WalkStep::Table((pte.ppn() as u64 * PAGE_SIZE) as u32)),
        };
    }
    let granted = match access {
        AccessType::Execute => pte.x(),
        AccessType::Read => pte.r(),
        AccessType::Write => pte.w(),
    };
    let mode_matches = match privilege {
        PrivilegeLevel::User => pte.u(),
        _ => !pte.u(),
    };
    if !granted || !mode_matches {
        return Err(PageFault::Permission {
            vaddr,
            access,
            level,
        });
    }
    if level == 1 && pte.ppn0() != 0 {
        return Err(PageFault::MisalignedSuperpage { vaddr, access });
    }
    if !pte.a() || (access == AccessType::Write && !pte.d()) {
        return Err(PageFault::AccessedDirty {
            vaddr,
            access,
            level,
        });
    }
    let offset = vaddr & 0xfff;
    let ppn0 = match level {
        1 => vpn(vaddr, 0),
        _ => pte.ppn0(),
    };
    // The physical address space is 34 bits wide; the bus only sees the low 32.
    let paddr = (pte.ppn1() as u64) << 22 | (ppn0 as u64) << 12 | offset as u64;
    Ok(WalkStep::Leaf(paddr as u32))
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum WalkOutcome {
    Pending,
    Translated(u32),
    PageFault(PageFault),
    /// A page-table entry read failed on the bus.
    AccessFault,
}

/// An Sv32 walk in progress.
#[derive(Debug, Clone)]
pub struct PageWalk {
    vaddr: u32,
    access: AccessType,
    privilege: PrivilegeLevel,
    level: usize,
    table: u32,
    waiting: bool,
}

impl PageWalk {
    pub fn new(satp: Satp, vaddr: u32, access: AccessType, privilege: PrivilegeLevel) -> Self {
        Self {
            vaddr,
            access,
            privilege,
            level: 1,
            table: (satp.ppn() as u64 * PAGE_SIZE) as u32,
            waiting: false,
        }
    }

    pub fn tick(&mut self, port: &mut BusPort) -> WalkOutcome {
        if !self.waiting {
            let address = self.table.wrapping_add(vpn(self.vaddr, self.level) * PTE_SIZE);
            self.waiting = port.issue(BusRequest::load(address));
            return WalkOutcome::Pending;
        }
        let Some(response) = port.take_response() else {
            return WalkOutcome::Pending;
        };
        self.waiting = false;
        if response.error {
            return WalkOutcome::AccessFault;
        }
        let pte = Pte(response.data);
        trace!(
            "sv32 walk {:#010x}: level {} pte {:#010x}",
            self.vaddr,
            self.level,
            pte.0
        );
        match inspect(pte, self.level, self.vaddr, self.access, self.privilege) {
            Ok(WalkStep::Table(table)) => {
                self.table = table;
                self.level -= 1;
                WalkOutcome::Pending
            }
            Ok(WalkStep::Leaf(paddr)) => WalkOutcome::Translated(paddr),
            Err(fault) => WalkOutcome::PageFault(fault),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{Arbiter, BusError, BusSlave, Master};

    const V: u32 = 1;
    const R: u32 = 1 << 1;
    const W: u32 = 1 << 2;
    const X: u32 = 1 << 3;
    const U: u32 = 1 << 4;
    const A: u32 = 1 << 6;
    const D: u32 = 1 << 7;

    fn pte(ppn: u32, flags: u32) -> Pte {
        Pte(ppn << 10 | flags)
    }

    #[test]
    fn test_pointer_entry() {
        assert_eq!(
            Ok(WalkStep::Table(0x0000_3000)),
            inspect(pte(3, V), 1, 0, AccessType::Read, PrivilegeLevel::User)
        );
        assert_eq!(
            Err(PageFault::NoLeaf {
                vaddr: 0,
                access: AccessType::Read
            }),
            inspect(pte(3, V), 0, 0, AccessType::Read, PrivilegeLevel::User)
        );
    }

    #[test]
    fn test_invalid_entries() {
        for flags in [R | A, V | W | A] {
            assert!(matches!(
                inspect(pte(1, flags), 0, 0, AccessType::Read, PrivilegeLevel::User),
                Err(PageFault::Invalid { level: 0, .. })
            ));
        }
    }

    #[test]
    fn test_leaf_permissions() {
        let user_rx = pte(0x12, V | R | X | U | A);
        assert_eq!(
            Ok(WalkStep::Leaf(0x0001_2abc)),
            inspect(user_rx, 0, 0x0040_0abc, AccessType::Execute, PrivilegeLevel::User)
        );
        assert!(matches!(
            inspect(user_rx, 0, 0, AccessType::Write, PrivilegeLevel::User),
            Err(PageFault::Permission { .. })
        ));
        assert!(matches!(
            inspect(user_rx, 0, 0, AccessType::Read, PrivilegeLevel::Supervisor),
            Err(PageFault::Permission { .. })
        ));
        assert!(matches!(
            inspect(pte(0x12, V | R | W | U | A), 0, 0, AccessType::Write, PrivilegeLevel::User),
            Err(PageFault::AccessedDirty { .. })
        ));
        assert!(matches!(
            inspect(pte(0x12, V | R | U), 0, 0, AccessType::Read, PrivilegeLevel::User),
            Err(PageFault::AccessedDirty { .. })
        ));
    }

    #[test]
    fn test_superpage() {
        let mega = pte(0x800, V | R | W | U | A | D);
        assert_eq!(
            Ok(WalkStep::Leaf(0x0092_3456)),
            inspect(mega, 1, 0x0052_3456, AccessType::Write, PrivilegeLevel::User)
        );
        assert_eq!(
            Err(PageFault::MisalignedSuperpage {
                vaddr: 0,
                access: AccessType::Read
            }),
            inspect(pte(0x401, V | R | U | A), 1, 0, AccessType::Read, PrivilegeLevel::User)
        );
    }

    #[derive(Debug)]
    struct Tables(Vec<(u32, u32)>);

    impl BusSlave for Tables {
        fn read_word(&mut self, address: u32) -> Result<u32, BusError> {
            self.0
                .iter()
                .find(|(a, _)| *a == address & !3)
                .map(|(_, word)| *word)
                .ok_or(BusError::Unmapped(address))
        }

        fn write_word(&mut self, address: u32, _: u32, _: u8) -> Result<(), BusError> {
            Err(BusError::ReadOnly(address))
        }
    }

    fn run(walk: &mut PageWalk, tables: &mut Tables) -> (WalkOutcome, usize) {
        let mut arbiter = Arbiter::new();
        for ticks in 1..20 {
            match walk.tick(arbiter.port_mut(Master::Core)) {
                WalkOutcome::Pending => arbiter.tick(tables),
                outcome => return (outcome, ticks),
            }
        }
        (WalkOutcome::Pending, 20)
    }

    #[test]
    fn test_two_level_walk() {
        let mut satp = Satp::default();
        satp.write(0x8000_0002, 0xffff_ffff);
        assert!(satp.sv32());
        // vaddr 0x0040_1234: vpn1 = 1, vpn0 = 1
        let mut tables = Tables(vec![
            (0x2000 + 4, pte(0x3, V).0),
            (0x3000 + 4, pte(0x7, V | R | U | A).0),
        ]);
        let mut walk = PageWalk::new(satp, 0x0040_1234, AccessType::Read, PrivilegeLevel::User);
        assert_eq!(
            (WalkOutcome::Translated(0x7234), 4),
            run(&mut walk, &mut tables)
        );
    }

    #[test]
    fn test_walk_bus_error() {
        let mut satp = Satp::default();
        satp.write(0x8000_0010, 0xffff_ffff);
        let mut walk = PageWalk::new(satp, 0, AccessType::Execute, PrivilegeLevel::User);
        assert_eq!(
            WalkOutcome::AccessFault,
            run(&mut walk, &mut Tables(Vec::new())).0
        );
    }
}
