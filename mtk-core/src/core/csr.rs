//! Control and status registers and the 4-phase CSR unit that executes Zicsr instructions.

use log::trace;

use super::control::{Tvec, MISA};
use super::debug::Dcsr;
use super::interrupts::Interrupts;
use super::mmu::Satp;
use super::status::Status;
use super::trap::Trap;
use crate::instruction::CsrOp;
use crate::PrivilegeLevel;

/// 12-bit CSR address.
pub type CsrSpecifier = u16;

pub const SATP: CsrSpecifier = 0x180;
pub const MSTATUS: CsrSpecifier = 0x300;
pub const MISA_SPECIFIER: CsrSpecifier = 0x301;
pub const MIE: CsrSpecifier = 0x304;
pub const MTVEC: CsrSpecifier = 0x305;
pub const MSCRATCH: CsrSpecifier = 0x340;
pub const MEPC: CsrSpecifier = 0x341;
pub const MCAUSE: CsrSpecifier = 0x342;
pub const MTVAL: CsrSpecifier = 0x343;
pub const MIP: CsrSpecifier = 0x344;
pub const DCSR: CsrSpecifier = 0x7b0;
pub const DPC: CsrSpecifier = 0x7b1;
/// Non-standard machine timer, in the custom read/write range.
pub const MTIME: CsrSpecifier = 0x7c0;
pub const MTIMECMP: CsrSpecifier = 0x7c1;
pub const MHARTID: CsrSpecifier = 0xf14;

/// Addresses reserved for Debug Mode (`dcsr`, `dpc`, `dscratch0`, `dscratch1`).
const DEBUG_RANGE: std::ops::RangeInclusive<CsrSpecifier> = 0x7b0..=0x7b3;

/// All CSRs of the hart.
///
/// Software writes go through [`CsrFile::write`], which applies each register's write policy:
/// - full write: `mtvec`, `mscratch`, `mstatus`, `mie`, `mtime`, `mtimecmp`, `dpc`;
/// - partial write: `dcsr` (`step`, `ebreakm`), `satp` (`ppn`, `mode`);
/// - no effect: `misa`, `mtval`, `mepc`, `mhartid`, `mcause`, `mip`.
///
/// Registers in the last group are still updated by the hart itself (trap entry, interrupt lines).
#[derive(Debug, Clone)]
pub struct CsrFile {
    pub status: Status,
    pub mtvec: Tvec,
    pub trap: Trap,
    pub interrupts: Interrupts,
    pub dcsr: Dcsr,
    pub dpc: u32,
    pub satp: Satp,
    mhartid: u32,
    mtime: u32,
    mtimecmp: u32,
    satp_enabled: bool,
}

impl CsrFile {
    pub fn new(mhartid: u32, mtvec: u32, satp_enabled: bool) -> Self {
        Self {
            status: Status::new(),
            mtvec: Tvec::new(mtvec),
            trap: Trap::new(),
            interrupts: Interrupts::new(),
            dcsr: Dcsr::new(),
            dpc: 0,
            satp: Satp::default(),
            mhartid,
            mtime: 0,
            mtimecmp: 0,
            satp_enabled,
        }
    }

    /// `true` if `specifier` names an implemented CSR.
    pub fn exists(&self, specifier: CsrSpecifier) -> bool {
        self.read(specifier).is_some()
    }

    /// Reads a CSR, returning `None` if it isn't implemented.
    pub fn read(&self, specifier: CsrSpecifier) -> Option<u32> {
        Some(match specifier {
            SATP if self.satp_enabled => self.satp.read(),
            MSTATUS => self.status.read(),
            MISA_SPECIFIER => MISA,
            MIE => self.interrupts.read_mie(),
            MTVEC => self.mtvec.read(),
            MSCRATCH => self.trap.read_mscratch(),
            MEPC => self.trap.read_mepc(),
            MCAUSE => self.trap.mcause.read(),
            MTVAL => self.trap.read_mtval(),
            MIP => self.interrupts.read_mip(),
            DCSR => self.dcsr.read(),
            DPC => self.dpc,
            MTIME => self.mtime,
            MTIMECMP => self.mtimecmp,
            MHARTID => self.mhartid,
            _ => return None,
        })
    }

    /// Software write, applying the register's write policy. Unknown registers are ignored.
    pub fn write(&mut self, specifier: CsrSpecifier, value: u32) {
        const ALL: u32 = 0xffff_ffff;
        match specifier {
            SATP if self.satp_enabled => self.satp.write(value, ALL),
            MSTATUS => self.status.write(value, ALL),
            MIE => self.interrupts.write_mie(value, ALL),
            MTVEC => self.mtvec.write(value, ALL),
            MSCRATCH => self.trap.write_mscratch(value, ALL),
            DCSR => self.dcsr.write(value, ALL),
            DPC => self.dpc = value,
            MTIME => self.mtime = value,
            MTIMECMP => self.mtimecmp = value,
            _ => {}
        }
    }
}

/// Phases of the CSR unit.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum CsrPhase {
    #[default]
    Idle,
    RegGeneric,
    RegSpecific,
    Finish,
}

/// Operands of the CSR instruction being executed.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct CsrRequest {
    pub op: CsrOp,
    pub specifier: CsrSpecifier,
    /// `rs1` value, or the zero-extended immediate for the `I` variants.
    pub operand: u32,
    /// `true` for CSRRS/CSRRC with `rs1 = x0`, which must not write the register.
    pub read_only: bool,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CsrStep {
    Busy,
    /// Valid for one cycle, carrying the old CSR value for `rd`.
    Done(u32),
    Illegal,
}

/// The 4-phase CSR state machine: IDLE, REG_GENERIC, REG_SPECIFIC, FINISH.
#[derive(Debug, Clone, Default)]
pub struct CsrUnit {
    phase: CsrPhase,
    rd_val: u32,
    write_value: u32,
}

impl CsrUnit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> CsrPhase {
        self.phase
    }

    pub fn reset(&mut self) {
        self.phase = CsrPhase::Idle;
    }

    /// Advances one phase. `privilege` is the effective privilege level; Debug Mode counts as
    /// Machine mode.
    pub fn tick(
        &mut self,
        request: CsrRequest,
        csrs: &mut CsrFile,
        privilege: PrivilegeLevel,
        debug_mode: bool,
    ) -> CsrStep {
        match self.phase {
            CsrPhase::Idle => {
                let specifier = request.specifier;
                let allowed = privilege == PrivilegeLevel::Machine
                    && csrs.exists(specifier)
                    && (debug_mode || !DEBUG_RANGE.contains(&specifier));
                if !allowed {
                    trace!("csr {specifier:#05x}: illegal access at {privilege}");
                    return CsrStep::Illegal;
                }
                self.phase = CsrPhase::RegGeneric;
                CsrStep::Busy
            }
            CsrPhase::RegGeneric => {
                self.rd_val = csrs.read(request.specifier).unwrap_or(0);
                self.write_value = match request.op {
                    CsrOp::ReadWrite => request.operand,
                    CsrOp::ReadSet => self.rd_val | request.operand,
                    CsrOp::ReadClear => self.rd_val & !request.operand,
                };
                self.phase = CsrPhase::RegSpecific;
                CsrStep::Busy
            }
            CsrPhase::RegSpecific => {
                if !request.read_only {
                    trace!(
                        "csr {:#05x}: write {:#010x}",
                        request.specifier,
                        self.write_value
                    );
                    csrs.write(request.specifier, self.write_value);
                }
                self.phase = CsrPhase::Finish;
                CsrStep::Busy
            }
            CsrPhase::Finish => {
                self.phase = CsrPhase::Idle;
                CsrStep::Done(self.rd_val)
            }
        }
    }
}
