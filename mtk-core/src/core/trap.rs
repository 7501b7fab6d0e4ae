//! Trap causes, the trap CSRs and the two priority encoders that select what gets taken.

use std::fmt;

/// Synchronous exception causes, as encoded in `mcause` with the interrupt bit clear.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Exception {
    InstructionAddressMisaligned = 0,
    InstructionAccessFault = 1,
    IllegalInstruction = 2,
    Breakpoint = 3,
    LoadAddressMisaligned = 4,
    LoadAccessFault = 5,
    StoreAddressMisaligned = 6,
    StoreAccessFault = 7,
    EnvironmentCallFromUMode = 8,
    EnvironmentCallFromSMode = 9,
    EnvironmentCallFromMMode = 11,
    InstructionPageFault = 12,
    LoadPageFault = 13,
    StorePageFault = 15,
}

impl Exception {
    pub fn code(self) -> u32 {
        self as u32
    }

    fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            0 => Self::InstructionAddressMisaligned,
            1 => Self::InstructionAccessFault,
            2 => Self::IllegalInstruction,
            3 => Self::Breakpoint,
            4 => Self::LoadAddressMisaligned,
            5 => Self::LoadAccessFault,
            6 => Self::StoreAddressMisaligned,
            7 => Self::StoreAccessFault,
            8 => Self::EnvironmentCallFromUMode,
            9 => Self::EnvironmentCallFromSMode,
            11 => Self::EnvironmentCallFromMMode,
            12 => Self::InstructionPageFault,
            13 => Self::LoadPageFault,
            15 => Self::StorePageFault,
            _ => return None,
        })
    }

    /// Whether `mtval` receives the trap value (faulting address or instruction word) for this
    /// cause. Other causes, page faults included, clear `mtval`.
    pub fn reports_tval(self) -> bool {
        matches!(
            self,
            Self::InstructionAccessFault
                | Self::LoadAccessFault
                | Self::StoreAccessFault
                | Self::IllegalInstruction
        )
    }
}

/// Interrupt causes, as encoded in `mcause` with the interrupt bit set.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Interrupt {
    UserSoftwareInterrupt = 0,
    SupervisorSoftwareInterrupt = 1,
    MachineSoftwareInterrupt = 3,
    UserTimerInterrupt = 4,
    SupervisorTimerInterrupt = 5,
    MachineTimerInterrupt = 7,
    UserExternalInterrupt = 8,
    SupervisorExternalInterrupt = 9,
    MachineExternalInterrupt = 11,
}

impl Interrupt {
    pub fn code(self) -> u32 {
        self as u32
    }

    fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            0 => Self::UserSoftwareInterrupt,
            1 => Self::SupervisorSoftwareInterrupt,
            3 => Self::MachineSoftwareInterrupt,
            4 => Self::UserTimerInterrupt,
            5 => Self::SupervisorTimerInterrupt,
            7 => Self::MachineTimerInterrupt,
            8 => Self::UserExternalInterrupt,
            9 => Self::SupervisorExternalInterrupt,
            11 => Self::MachineExternalInterrupt,
            _ => return None,
        })
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TrapCause {
    Exception(Exception),
    Interrupt(Interrupt),
}

impl fmt::Display for TrapCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exception(exception) => write!(f, "{exception:?}"),
            Self::Interrupt(interrupt) => write!(f, "{interrupt:?}"),
        }
    }
}

impl From<Exception> for TrapCause {
    fn from(value: Exception) -> Self {
        Self::Exception(value)
    }
}

impl From<Interrupt> for TrapCause {
    fn from(value: Interrupt) -> Self {
        Self::Interrupt(value)
    }
}

/// The mcause register. Hardware-written only.
#[derive(Debug, Clone, Default)]
pub struct Cause(u32);

impl Cause {
    pub fn read(&self) -> u32 {
        self.0
    }

    pub fn set(&mut self, cause: TrapCause) {
        self.0 = match cause {
            TrapCause::Exception(exception) => exception.code(),
            TrapCause::Interrupt(interrupt) => 0x8000_0000 | interrupt.code(),
        };
    }
}

/// Machine trap-handling registers.
#[derive(Debug, Clone, Default)]
pub struct Trap {
    mscratch: u32,
    mepc: u32,
    pub mcause: Cause,
    mtval: u32,
}

impl Trap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read_mscratch(&self) -> u32 {
        self.mscratch
    }

    pub fn write_mscratch(&mut self, value: u32, mask: u32) {
        self.mscratch = self.mscratch & !mask | value & mask;
    }

    pub fn read_mepc(&self) -> u32 {
        self.mepc
    }

    pub fn read_mtval(&self) -> u32 {
        self.mtval
    }

    /// Hardware update on trap entry.
    pub fn record(&mut self, cause: TrapCause, epc: u32, tval: u32) {
        self.mcause.set(cause);
        self.mepc = epc & !0b11;
        self.mtval = match cause {
            TrapCause::Exception(exception) if exception.reports_tval() => tval,
            _ => 0,
        };
    }
}

/// Lowest set bit of a 16-way request vector.
fn priority_encode(requests: u16) -> Option<u32> {
    (requests != 0).then(|| requests.trailing_zeros())
}

/// The two 16-way priority encoders of the exception unit.
///
/// Synchronous causes are collected in `pending_traps` while an instruction is in flight;
/// interrupt causes come from `mip & mie`. Each encoder picks its lowest-numbered request.
#[derive(Debug, Clone, Default)]
pub struct TrapEncoder {
    pending_traps: u16,
    tval: u32,
}

impl TrapEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assert(&mut self, exception: Exception, tval: u32) {
        let bit = 1 << exception.code();
        if self.pending_traps & (bit - 1) == 0 {
            self.tval = tval;
        }
        self.pending_traps |= bit;
    }

    pub fn any_trap(&self) -> bool {
        self.pending_traps != 0
    }

    /// Selects the cause to take: any pending trap first, otherwise an interrupt from `pending`
    /// (i.e. `mip & mie`) if `enabled` (i.e. `mstatus.MIE`). Clears the trap requests.
    pub fn select(&mut self, pending: u16, enabled: bool) -> Option<(TrapCause, u32)> {
        let trap = priority_encode(self.pending_traps).and_then(Exception::from_code);
        self.pending_traps = 0;
        if let Some(exception) = trap {
            return Some((exception.into(), self.tval));
        }
        if !enabled {
            return None;
        }
        priority_encode(pending)
            .and_then(Interrupt::from_code)
            .map(|interrupt| (interrupt.into(), 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cause_encoding() {
        let mut cause = Cause::default();
        cause.set(Exception::IllegalInstruction.into());
        assert_eq!(2, cause.read());
        cause.set(Interrupt::MachineExternalInterrupt.into());
        assert_eq!(0x8000_000b, cause.read());
    }

    #[test]
    fn test_lowest_cause_wins() {
        let mut encoder = TrapEncoder::new();
        encoder.assert(Exception::LoadAccessFault, 0x40);
        encoder.assert(Exception::IllegalInstruction, 0x1234);
        assert!(encoder.any_trap());
        assert_eq!(
            Some((Exception::IllegalInstruction.into(), 0x1234)),
            encoder.select(0, false)
        );
        assert!(!encoder.any_trap());
        assert_eq!(None, encoder.select(1 << 11 | 1 << 7, false));
        assert_eq!(
            Some((Interrupt::MachineTimerInterrupt.into(), 0)),
            encoder.select(1 << 11 | 1 << 7, true)
        );
    }

    #[test]
    fn test_tval_only_for_reporting_causes() {
        let mut trap = Trap::new();
        trap.record(Exception::LoadAccessFault.into(), 0x1004, 0x4_0000);
        assert_eq!(0x4_0000, trap.read_mtval());
        assert_eq!(0x1004, trap.read_mepc());
        trap.record(Exception::Breakpoint.into(), 0x1008, 0x1008);
        assert_eq!(0, trap.read_mtval());
        assert_eq!(3, trap.mcause.read());
        trap.record(Exception::LoadPageFault.into(), 0x100c, 0x0040_0000);
        assert_eq!(0, trap.read_mtval());
        assert_eq!(13, trap.mcause.read());
    }
}
