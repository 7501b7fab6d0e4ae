//! Provides a simulatable RV32I core implementation.

pub mod control;
pub mod csr;
pub mod debug;
pub mod execute;
pub mod interrupts;
pub mod memory;
pub mod mmu;
pub mod status;
pub mod trap;

use log::{debug, trace, warn};

use crate::bus::BusPort;
use crate::debug::handshake::{DebugRequests, HartStatus};
use crate::instruction::{CsrOp, CsrSource, InstrClass, Instruction};
use crate::registers::{RegisterFile, Specifier};
use crate::PrivilegeLevel;
use csr::{CsrFile, CsrRequest, CsrStep, CsrUnit};
use debug::DebugCause;
use memory::{MemOp, MemOutcome, MemoryUnit, MisalignedAccess, Translation};
use trap::{Exception, Interrupt, TrapEncoder};

/// Reset value of `mtvec`.
pub const MTVEC_RESET: u32 = 0x1020;

#[derive(Debug, Clone)]
pub struct Config {
    /// Address to which the core's PC register is reset.
    pub reset_vector: u32,
    /// Enables `satp` and Sv32 translation outside Machine mode.
    pub virtual_memory: bool,
    /// How non-naturally-aligned loads and stores are handled.
    pub misaligned_access: MisalignedAccess,
    /// Value of `mhartid`.
    pub hart_id: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            reset_vector: 0x1000,
            virtual_memory: false,
            misaligned_access: MisalignedAccess::default(),
            hart_id: 0,
        }
    }
}

/// States of the main control state machine.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum State {
    CheckShouldHalt,
    Halted,
    Fetch,
    Decode,
    Execute,
    Writeback,
    Trap,
}

/// Whether the state machine may move on to the next state within the current tick.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Flow {
    Continue,
    Yield,
}

/// RISC-V core implementing the RV32I ISA with Machine-mode traps and External Debug support.
///
/// As we don't support hardware multithreading, every core always only has a single hart.
/// We therefore don't model RISC-V harts explicitly, but rather consider [`Core`] to be the whole
/// of a core with a single hart.
///
/// > A component is termed a core if it contains an independent instruction fetch unit.
///
/// Each [`tick`](Core::tick) advances the control state machine
/// `CHECK_SHOULD_HALT -> FETCH -> DECODE -> EXECUTE -> WRITEBACK`, with `TRAP` reachable from
/// fetch, decode and execute, and `HALTED` entered on debug requests. States that don't wait on
/// the bus or the CSR unit fall through into their successor within the same tick.
#[derive(Debug, Clone)]
pub struct Core {
    config: Config,
    state: State,
    pc: u32,
    next_pc: u32,
    raw_instruction: u32,
    instruction: Option<Instruction>,
    rd_val: u32,
    registers: RegisterFile,
    csrs: CsrFile,
    privilege: PrivilegeLevel,
    memory: MemoryUnit,
    csr_unit: CsrUnit,
    traps: TrapEncoder,
    debug_mode: bool,
    halt_acked: bool,
    resume_acked: bool,
    gpr_acked: bool,
    status: HartStatus,
}

impl Core {
    pub fn new(config: Config) -> Self {
        let csrs = CsrFile::new(config.hart_id, MTVEC_RESET, config.virtual_memory);
        Self {
            state: State::CheckShouldHalt,
            pc: config.reset_vector,
            next_pc: config.reset_vector,
            raw_instruction: 0,
            instruction: None,
            rd_val: 0,
            registers: RegisterFile::new(),
            csrs,
            privilege: PrivilegeLevel::Machine,
            memory: MemoryUnit::new(),
            csr_unit: CsrUnit::new(),
            traps: TrapEncoder::new(),
            debug_mode: false,
            halt_acked: false,
            resume_acked: false,
            gpr_acked: false,
            status: HartStatus::default(),
            config,
        }
    }

    /// Provide a read-only view of this core's configuration.
    ///
    /// It is not possible to modify the configuration after creation.
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_halted(&self) -> bool {
        self.state == State::Halted
    }

    /// Address of the instruction being executed, or of the next one between instructions.
    pub fn pc(&self) -> u32 {
        self.pc
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.registers
    }

    pub fn csrs(&self) -> &CsrFile {
        &self.csrs
    }

    pub fn privilege(&self) -> PrivilegeLevel {
        self.privilege
    }

    /// Signals driven towards the Debug Module at the end of the last tick.
    pub fn status(&self) -> HartStatus {
        self.status
    }

    pub fn set_interrupt_line(&mut self, interrupt: Interrupt, value: bool) {
        self.csrs.interrupts.set_line(interrupt, value);
    }

    /// Advance the core by one clock cycle.
    ///
    /// `requests` are the Debug Module's outputs as registered at the end of the previous tick.
    pub fn tick(&mut self, port: &mut BusPort, requests: &DebugRequests) {
        self.sample_requests(requests);
        loop {
            let flow = match self.state {
                State::CheckShouldHalt => self.check_should_halt(requests),
                State::Halted => self.halted(requests),
                State::Fetch => self.fetch(port),
                State::Decode => self.decode(),
                State::Execute => self.execute(port, requests),
                State::Writeback => self.writeback(),
                State::Trap => self.trap(requests),
            };
            if flow == Flow::Yield {
                break;
            }
        }
        self.status.halted = self.is_halted();
        self.status.dpc = self.csrs.dpc;
    }

    fn sample_requests(&mut self, requests: &DebugRequests) {
        self.status.haltack = false;
        self.status.resumeack = false;
        self.status.gpr_ack = false;
        self.debug_mode = requests.debug_mode;
        if !requests.haltreq {
            self.halt_acked = false;
        }
        if !requests.resumereq {
            self.resume_acked = false;
        }
        if requests.gpr.is_none() {
            self.gpr_acked = false;
        }
        if let Some(dpc) = requests.dpc_write {
            self.csrs.dpc = dpc;
        }
    }

    /// Debug Mode always executes at Machine level.
    fn effective_privilege(&self) -> PrivilegeLevel {
        match self.debug_mode {
            true => PrivilegeLevel::Machine,
            false => self.privilege,
        }
    }

    fn translation(&self) -> Translation {
        let privilege = self.effective_privilege();
        let active = self.config.virtual_memory
            && self.csrs.satp.sv32()
            && privilege != PrivilegeLevel::Machine;
        active.then_some((self.csrs.satp, privilege))
    }

    fn check_should_halt(&mut self, requests: &DebugRequests) -> Flow {
        if requests.haltreq && !self.halt_acked {
            return self.enter_halted(DebugCause::HaltRequest, requests);
        }
        let step = self.csrs.dcsr.step() && !self.debug_mode;
        if step {
            return self.enter_halted(DebugCause::Step, requests);
        }
        let interrupt = self.csrs.interrupts.pending_enabled() != 0 && self.csrs.status.mie();
        if interrupt && !self.debug_mode {
            self.state = State::Trap;
            return Flow::Continue;
        }
        self.state = State::Fetch;
        Flow::Continue
    }

    fn enter_halted(&mut self, cause: DebugCause, requests: &DebugRequests) -> Flow {
        if !self.debug_mode {
            debug!("halting at {:#010x}: {cause:?}", self.pc);
            self.csrs.dpc = self.pc;
            self.csrs.dcsr.set_cause(cause);
            self.csrs.dcsr.set_prv(self.privilege);
        }
        if requests.haltreq && !self.halt_acked {
            self.status.haltack = true;
            self.halt_acked = true;
        }
        self.state = State::Halted;
        Flow::Yield
    }

    fn halted(&mut self, requests: &DebugRequests) -> Flow {
        if let Some(access) = requests.gpr.filter(|_| !self.gpr_acked) {
            self.status.gpr_read = self.registers.read(access.regno);
            if let Some(value) = access.write.filter(|_| !access.regno.is_zero()) {
                self.registers.write(access.regno, value);
            }
            self.status.gpr_ack = true;
            self.gpr_acked = true;
        }
        if requests.haltreq && !self.halt_acked {
            warn!("halt request while already halted");
            self.status.haltack = true;
            self.halt_acked = true;
        }
        if requests.resumereq && !self.resume_acked {
            self.pc = self.csrs.dpc;
            self.privilege = self.csrs.dcsr.prv();
            self.status.progbuf_error = false;
            self.status.resumeack = true;
            self.resume_acked = true;
            debug!(
                "resuming at {:#010x} ({}, debug mode {})",
                self.pc, self.privilege, self.debug_mode
            );
            self.state = State::Fetch;
            return Flow::Continue;
        }
        Flow::Yield
    }

    /// "Independent instruction fetch unit"
    ///
    /// > The base RISC-V ISA has fixed-length 32-bit instructions that must be naturally aligned on
    /// > 32-bit boundaries.
    fn fetch(&mut self, port: &mut BusPort) -> Flow {
        if self.memory.is_idle() {
            let started =
                self.memory
                    .start(MemOp::Fetch, self.pc, MisalignedAccess::Trap, self.translation());
            if let Err((exception, tval)) = started {
                return self.raise(exception, tval);
            }
        }
        match self.memory.tick(port) {
            MemOutcome::Pending => Flow::Yield,
            MemOutcome::Done(word) => {
                self.raw_instruction = word;
                self.state = State::Decode;
                Flow::Continue
            }
            MemOutcome::Fault(exception, tval) => self.raise(exception, tval),
        }
    }

    /// # Unspecified behavior
    ///
    /// > The behavior upon decoding a reserved instruction is UNSPECIFIED.
    ///
    /// This implementation chooses to raise an [`Exception::IllegalInstruction`] for any word it
    /// cannot decode, reporting the word in `mtval`.
    fn decode(&mut self) -> Flow {
        match Instruction::decode(self.raw_instruction) {
            Ok(instruction) => {
                trace!("{:#010x}: {instruction:?}", self.pc);
                self.instruction = Some(instruction);
                self.next_pc = self.pc.wrapping_add(4);
                self.state = State::Execute;
                Flow::Continue
            }
            Err(err) => {
                debug!("{:#010x}: {err}", self.pc);
                self.raise(Exception::IllegalInstruction, err.raw())
            }
        }
    }

    fn execute(&mut self, port: &mut BusPort, requests: &DebugRequests) -> Flow {
        let Some(instruction) = self.instruction else {
            self.state = State::CheckShouldHalt;
            return Flow::Continue;
        };
        let pc = self.pc;
        let regs = self.registers.dump();
        let x = |specifier: Specifier| regs[usize::from(specifier)];
        self.rd_val = match (instruction.class(), instruction) {
            (
                InstrClass::Logic | InstrClass::Adder | InstrClass::Shifter | InstrClass::Compare,
                Instruction::OpImm {
                    op, src, immediate, ..
                },
            ) => execute::reg_imm(op, x(src), immediate),
            (
                InstrClass::Shifter,
                Instruction::OpShiftImm {
                    op,
                    src,
                    shift_amount_u5,
                    ..
                },
            ) => execute::reg_shift_imm(op, x(src), shift_amount_u5),
            (
                InstrClass::Logic | InstrClass::Adder | InstrClass::Shifter | InstrClass::Compare,
                Instruction::Op { op, src1, src2, .. },
            ) => execute::reg_reg(op, x(src1), x(src2)),
            (InstrClass::Lui, Instruction::Lui { immediate, .. }) => immediate as u32,
            (InstrClass::Auipc, Instruction::Auipc { immediate, .. }) => {
                pc.wrapping_add(immediate as u32)
            }
            (InstrClass::Jal, Instruction::Jal { offset, .. }) => {
                self.next_pc = pc.wrapping_add(offset as u32);
                pc.wrapping_add(4)
            }
            (InstrClass::Jalr, Instruction::Jalr { base, offset, .. }) => {
                self.next_pc = x(base).wrapping_add(offset as u32) & !1;
                pc.wrapping_add(4)
            }
            (
                InstrClass::Branch,
                Instruction::Branch {
                    condition,
                    src1,
                    src2,
                    offset,
                },
            ) => {
                if execute::branch_taken(condition, x(src1), x(src2)) {
                    self.next_pc = pc.wrapping_add(offset as u32);
                }
                0
            }
            (InstrClass::Mem, _) => return self.execute_memory(instruction, port),
            (InstrClass::Csr, _) => return self.execute_csr(instruction),
            (InstrClass::Mret, _) => {
                if self.effective_privilege() != PrivilegeLevel::Machine {
                    return self.raise(Exception::IllegalInstruction, self.raw_instruction);
                }
                self.privilege = self.csrs.status.pop();
                self.next_pc = self.csrs.trap.read_mepc();
                trace!("mret to {:#010x} in {}", self.next_pc, self.privilege);
                0
            }
            (InstrClass::Fence, _) => 0,
            (InstrClass::Ecall, _) => {
                let exception = match self.effective_privilege() {
                    PrivilegeLevel::User => Exception::EnvironmentCallFromUMode,
                    PrivilegeLevel::Supervisor => Exception::EnvironmentCallFromSMode,
                    PrivilegeLevel::Machine => Exception::EnvironmentCallFromMMode,
                };
                return self.raise(exception, 0);
            }
            (InstrClass::Ebreak, _) => {
                if self.debug_mode || self.csrs.dcsr.ebreakm() {
                    return self.enter_halted(DebugCause::Ebreak, requests);
                }
                return self.raise(Exception::Breakpoint, pc);
            }
            _ => return self.raise(Exception::IllegalInstruction, self.raw_instruction),
        };
        self.state = State::Writeback;
        Flow::Yield
    }

    fn execute_memory(&mut self, instruction: Instruction, port: &mut BusPort) -> Flow {
        if self.memory.is_idle() {
            let (op, base, offset) = match instruction {
                Instruction::Load {
                    width,
                    base,
                    offset,
                    ..
                } => (MemOp::Load(width), base, offset),
                Instruction::Store {
                    width,
                    src,
                    base,
                    offset,
                } => (MemOp::Store(width, self.registers.read(src)), base, offset),
                _ => return self.raise(Exception::IllegalInstruction, self.raw_instruction),
            };
            let address = self.registers.read(base).wrapping_add(offset as u32);
            let policy = self.config.misaligned_access;
            if let Err((exception, tval)) =
                self.memory.start(op, address, policy, self.translation())
            {
                return self.raise(exception, tval);
            }
        }
        match self.memory.tick(port) {
            MemOutcome::Pending => Flow::Yield,
            MemOutcome::Done(value) => {
                self.rd_val = value;
                self.state = State::Writeback;
                Flow::Yield
            }
            MemOutcome::Fault(exception, tval) => self.raise(exception, tval),
        }
    }

    fn execute_csr(&mut self, instruction: Instruction) -> Flow {
        let Instruction::Csr {
            op, source, csr, ..
        } = instruction
        else {
            return self.raise(Exception::IllegalInstruction, self.raw_instruction);
        };
        let operand = match source {
            CsrSource::Register(specifier) => self.registers.read(specifier),
            CsrSource::Immediate(immediate) => immediate,
        };
        let request = CsrRequest {
            op,
            specifier: csr,
            operand,
            read_only: op != CsrOp::ReadWrite && source == CsrSource::Register(Specifier::X0),
        };
        let privilege = self.effective_privilege();
        match self
            .csr_unit
            .tick(request, &mut self.csrs, privilege, self.debug_mode)
        {
            CsrStep::Busy => Flow::Yield,
            CsrStep::Done(value) => {
                self.rd_val = value;
                self.state = State::Writeback;
                Flow::Yield
            }
            CsrStep::Illegal => self.raise(Exception::IllegalInstruction, self.raw_instruction),
        }
    }

    fn writeback(&mut self) -> Flow {
        let destination = self.instruction.take().and_then(|i| i.destination());
        if let Some(rd) = destination.filter(|rd| !rd.is_zero()) {
            self.registers.write(rd, self.rd_val);
        }
        self.pc = self.next_pc;
        self.state = State::CheckShouldHalt;
        Flow::Continue
    }

    fn raise(&mut self, exception: Exception, tval: u32) -> Flow {
        self.traps.assert(exception, tval);
        self.state = State::Trap;
        Flow::Continue
    }

    /// Takes the selected trap or interrupt.
    ///
    /// While executing the program buffer no trap is taken: the hart halts and reports the
    /// exception to the Debug Module instead.
    fn trap(&mut self, requests: &DebugRequests) -> Flow {
        self.instruction = None;
        if self.debug_mode {
            if let Some((cause, _)) = self.traps.select(0, false) {
                debug!("{cause} at {:#010x} during program buffer execution", self.pc);
            }
            self.status.progbuf_error = true;
            self.memory.reset();
            self.csr_unit.reset();
            return self.enter_halted(DebugCause::Ebreak, requests);
        }
        let pending = self.csrs.interrupts.pending_enabled();
        let Some((cause, tval)) = self.traps.select(pending, self.csrs.status.mie()) else {
            self.state = State::CheckShouldHalt;
            return Flow::Yield;
        };
        debug!(
            "trap {cause} at {:#010x} from {}, tval {tval:#010x}",
            self.pc, self.privilege
        );
        self.memory.reset();
        self.csr_unit.reset();
        self.csrs.status.push(self.privilege);
        self.privilege = PrivilegeLevel::Machine;
        self.csrs.trap.record(cause, self.pc, tval);
        self.pc = self.csrs.mtvec.base();
        self.state = State::CheckShouldHalt;
        Flow::Yield
    }
}
