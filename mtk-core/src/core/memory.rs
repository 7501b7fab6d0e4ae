//! The load/store unit, also used for instruction fetch.
//!
//! Two-state machine: IDLE, then WAIT for the bus response. With Sv32 active the WAIT phase is
//! preceded by a page walk on the same bus port.

use super::mmu::{PageWalk, Satp, WalkOutcome};
use super::trap::Exception;
use crate::bus::{BusPort, BusRequest};
use crate::instruction::{LoadWidth, StoreWidth};
use crate::{Alignment, PrivilegeLevel};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AccessType {
    Read,
    Write,
    Execute,
}

/// What to do with a load or store whose address isn't naturally aligned.
///
/// Instruction fetches always trap on misalignment.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum MisalignedAccess {
    /// Round the address down to the access size, like a word-wide bus ignoring the low bits.
    #[default]
    AlignDown,
    /// Raise a load/store address-misaligned exception.
    Trap,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum MemOp {
    Fetch,
    Load(LoadWidth),
    Store(StoreWidth, u32),
}

impl MemOp {
    fn size(self) -> u32 {
        match self {
            Self::Fetch => 4,
            Self::Load(width) => width.size(),
            Self::Store(width, _) => width.size(),
        }
    }

    fn access_type(self) -> AccessType {
        match self {
            Self::Fetch => AccessType::Execute,
            Self::Load(_) => AccessType::Read,
            Self::Store(..) => AccessType::Write,
        }
    }

    fn misaligned(self) -> Exception {
        match self {
            Self::Fetch => Exception::InstructionAddressMisaligned,
            Self::Load(_) => Exception::LoadAddressMisaligned,
            Self::Store(..) => Exception::StoreAddressMisaligned,
        }
    }

    fn access_fault(self) -> Exception {
        match self {
            Self::Fetch => Exception::InstructionAccessFault,
            Self::Load(_) => Exception::LoadAccessFault,
            Self::Store(..) => Exception::StoreAccessFault,
        }
    }

    fn page_fault(self) -> Exception {
        match self {
            Self::Fetch => Exception::InstructionPageFault,
            Self::Load(_) => Exception::LoadPageFault,
            Self::Store(..) => Exception::StorePageFault,
        }
    }

    fn request(self, paddr: u32) -> BusRequest {
        match self {
            Self::Fetch | Self::Load(_) => BusRequest::load(paddr),
            Self::Store(width, value) => {
                let lane = paddr & 0b11;
                let (data, mask) = match width {
                    StoreWidth::Sb => ((value & 0xff) * 0x0101_0101, 0b0001 << lane),
                    StoreWidth::Sh => ((value & 0xffff) * 0x0001_0001, 0b0011 << lane),
                    StoreWidth::Sw => (value, 0b1111),
                };
                BusRequest::store(paddr, data, mask as u8)
            }
        }
    }

    /// Selects and extends the addressed bytes out of the word read at `paddr`.
    fn extract(self, paddr: u32, word: u32) -> u32 {
        let shifted = word >> ((paddr & 0b11) * 8);
        match self {
            Self::Fetch | Self::Store(..) | Self::Load(LoadWidth::Lw) => shifted,
            Self::Load(LoadWidth::Lb) => shifted as u8 as i8 as u32,
            Self::Load(LoadWidth::Lh) => shifted as u16 as i16 as u32,
            Self::Load(LoadWidth::Lbu) => shifted & 0xff,
            Self::Load(LoadWidth::Lhu) => shifted & 0xffff,
        }
    }
}

/// Result of one tick of the unit.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum MemOutcome {
    Pending,
    /// Access completed; carries the fetched word or the extended load value (0 for stores).
    Done(u32),
    /// Access failed with this exception and trap value.
    Fault(Exception, u32),
}

#[derive(Debug, Clone, Default)]
enum State {
    #[default]
    Idle,
    Translate {
        op: MemOp,
        vaddr: u32,
        walk: PageWalk,
    },
    Wait {
        op: MemOp,
        vaddr: u32,
        paddr: u32,
        issued: bool,
    },
}

/// Address translation context of the current access, `None` for bare physical addressing.
pub type Translation = Option<(Satp, PrivilegeLevel)>;

#[derive(Debug, Clone, Default)]
pub struct MemoryUnit {
    state: State,
}

impl MemoryUnit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, State::Idle)
    }

    /// Drop the access in progress.
    pub fn reset(&mut self) {
        self.state = State::Idle;
    }

    /// Starts an access at `vaddr`. Fails with the exception to raise if the address is misaligned
    /// under `policy`; no bus transaction is issued in that case.
    pub fn start(
        &mut self,
        op: MemOp,
        vaddr: u32,
        policy: MisalignedAccess,
        translation: Translation,
    ) -> Result<(), (Exception, u32)> {
        let alignment = Alignment::natural_for_size(op.size()).unwrap_or(Alignment::WORD);
        let vaddr = match (alignment.is_aligned(vaddr), op, policy) {
            (true, ..) => vaddr,
            (false, MemOp::Fetch, _) | (false, _, MisalignedAccess::Trap) => {
                return Err((op.misaligned(), vaddr))
            }
            (false, _, MisalignedAccess::AlignDown) => alignment.align_down(vaddr),
        };
        self.state = match translation {
            Some((satp, privilege)) => State::Translate {
                op,
                vaddr,
                walk: PageWalk::new(satp, vaddr, op.access_type(), privilege),
            },
            None => State::Wait {
                op,
                vaddr,
                paddr: vaddr,
                issued: false,
            },
        };
        Ok(())
    }

    pub fn tick(&mut self, port: &mut BusPort) -> MemOutcome {
        match std::mem::take(&mut self.state) {
            State::Idle => MemOutcome::Pending,
            State::Translate {
                op,
                vaddr,
                mut walk,
            } => match walk.tick(port) {
                WalkOutcome::Pending => {
                    self.state = State::Translate { op, vaddr, walk };
                    MemOutcome::Pending
                }
                WalkOutcome::Translated(paddr) => {
                    self.state = State::Wait {
                        op,
                        vaddr,
                        paddr,
                        issued: false,
                    };
                    self.tick(port)
                }
                WalkOutcome::PageFault(_) => MemOutcome::Fault(op.page_fault(), vaddr),
                WalkOutcome::AccessFault => MemOutcome::Fault(op.access_fault(), vaddr),
            },
            State::Wait {
                op,
                vaddr,
                paddr,
                issued: false,
            } => {
                let issued = port.issue(op.request(paddr));
                self.state = State::Wait {
                    op,
                    vaddr,
                    paddr,
                    issued,
                };
                MemOutcome::Pending
            }
            State::Wait {
                op,
                vaddr,
                paddr,
                issued: true,
            } => match port.take_response() {
                None => {
                    self.state = State::Wait {
                        op,
                        vaddr,
                        paddr,
                        issued: true,
                    };
                    MemOutcome::Pending
                }
                Some(response) if response.error => MemOutcome::Fault(op.access_fault(), vaddr),
                Some(response) => MemOutcome::Done(op.extract(paddr, response.data)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{Arbiter, Master};
    use crate::resources::ram::Ram;

    fn run(unit: &mut MemoryUnit, ram: &mut Ram) -> MemOutcome {
        let mut arbiter = Arbiter::new();
        for _ in 0..10 {
            match unit.tick(arbiter.port_mut(Master::Core)) {
                MemOutcome::Pending => arbiter.tick(ram),
                outcome => return outcome,
            }
        }
        MemOutcome::Pending
    }

    fn access(ram: &mut Ram, op: MemOp, vaddr: u32, policy: MisalignedAccess) -> MemOutcome {
        let mut unit = MemoryUnit::new();
        match unit.start(op, vaddr, policy, None) {
            Ok(()) => run(&mut unit, ram),
            Err((exception, tval)) => MemOutcome::Fault(exception, tval),
        }
    }

    #[test]
    fn test_sign_extension() {
        let mut ram = Ram::new(0, 0x100).unwrap();
        ram.load(0x10, &[0x80, 0xff, 0x34, 0x12]).unwrap();
        let policy = MisalignedAccess::Trap;
        assert_eq!(
            MemOutcome::Done(0xffff_ff80),
            access(&mut ram, MemOp::Load(LoadWidth::Lb), 0x10, policy)
        );
        assert_eq!(
            MemOutcome::Done(0x80),
            access(&mut ram, MemOp::Load(LoadWidth::Lbu), 0x10, policy)
        );
        assert_eq!(
            MemOutcome::Done(0xffff_ff80),
            access(&mut ram, MemOp::Load(LoadWidth::Lh), 0x10, policy)
        );
        assert_eq!(
            MemOutcome::Done(0x1234),
            access(&mut ram, MemOp::Load(LoadWidth::Lhu), 0x12, policy)
        );
        assert_eq!(
            MemOutcome::Done(0x1234_ff80),
            access(&mut ram, MemOp::Load(LoadWidth::Lw), 0x10, policy)
        );
    }

    #[test]
    fn test_store_lanes() {
        let mut ram = Ram::new(0, 0x100).unwrap();
        let policy = MisalignedAccess::Trap;
        access(&mut ram, MemOp::Store(StoreWidth::Sw, 0x1122_3344), 0x20, policy);
        access(&mut ram, MemOp::Store(StoreWidth::Sb, 0xaa), 0x21, policy);
        access(&mut ram, MemOp::Store(StoreWidth::Sh, 0xbbcc), 0x22, policy);
        assert_eq!(
            MemOutcome::Done(0xbbcc_aa44),
            access(&mut ram, MemOp::Load(LoadWidth::Lw), 0x20, policy)
        );
    }

    #[test]
    fn test_misaligned_policies() {
        let mut ram = Ram::new(0, 0x100).unwrap();
        ram.load(0xdc, &0xdead_beef_u32.to_le_bytes()).unwrap();
        assert_eq!(
            MemOutcome::Done(0xdead_beef),
            access(
                &mut ram,
                MemOp::Load(LoadWidth::Lw),
                0xde,
                MisalignedAccess::AlignDown
            )
        );
        assert_eq!(
            MemOutcome::Fault(Exception::LoadAddressMisaligned, 0xde),
            access(&mut ram, MemOp::Load(LoadWidth::Lw), 0xde, MisalignedAccess::Trap)
        );
        assert_eq!(
            MemOutcome::Fault(Exception::InstructionAddressMisaligned, 0x2),
            access(&mut ram, MemOp::Fetch, 0x2, MisalignedAccess::AlignDown)
        );
    }

    #[test]
    fn test_access_fault() {
        let mut ram = Ram::new(0, 0x100).unwrap();
        assert_eq!(
            MemOutcome::Fault(Exception::StoreAccessFault, 0x400),
            access(
                &mut ram,
                MemOp::Store(StoreWidth::Sw, 0),
                0x400,
                MisalignedAccess::Trap
            )
        );
    }
}
