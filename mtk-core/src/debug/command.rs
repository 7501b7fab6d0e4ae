//! Execution of the Access Register abstract command.
//!
//! > This command gives the debugger access to CPU registers and allows it to execute the Program
//! > Buffer.
//!
//! Only GPRs (`regno` `0x1000` to `0x101f`) can be transferred, and only as 32-bit values. With
//! `postexec` set the hart is resumed into the program buffer in Debug Mode and the command
//! completes once it halts again. `dpc` is preserved across the program-buffer run.

use log::{debug, trace};

use super::handshake::{DebugRequests, GprAccess, HartStatus};
use super::registers::AccessRegister;
use super::{CmdErr, DATA_COUNT, PROGBUF_BASE};
use crate::registers::Specifier;

/// First `regno` of the GPRs.
pub const REGNO_GPR_BASE: u16 = 0x1000;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Phase {
    Transfer,
    WaitGpr,
    SanityCheck,
    Resume,
    WaitHalt,
}

/// An Access Register command in flight.
#[derive(Debug, Clone)]
pub struct AccessRegisterCommand {
    control: AccessRegister,
    phase: Phase,
    /// `dpc` of the halted hart before it was pointed at the program buffer.
    real_dpc: u32,
}

impl AccessRegisterCommand {
    pub fn new(control: AccessRegister) -> Self {
        Self {
            control,
            phase: Phase::Transfer,
            real_dpc: 0,
        }
    }

    /// Advances the command by one tick. Returns the outcome once the command is complete.
    ///
    /// `status` is the hart's output from the previous tick; `requests` are the Debug Module's
    /// outputs, updated in place.
    pub fn tick(
        &mut self,
        status: &HartStatus,
        requests: &mut DebugRequests,
        data: &mut [u32; DATA_COUNT],
    ) -> Option<Result<(), CmdErr>> {
        match self.phase {
            Phase::Transfer => {
                if !self.control.transfer() {
                    return self.after_transfer();
                }
                if self.control.aarsize() != AccessRegister::AARSIZE_32 {
                    debug!("access register: unsupported aarsize {}", self.control.aarsize());
                    return Some(Err(CmdErr::NotSupported));
                }
                let regno = self.control.regno();
                let Some(specifier) = regno
                    .checked_sub(REGNO_GPR_BASE)
                    .and_then(Specifier::new)
                else {
                    debug!("access register: unsupported regno {regno:#06x}");
                    return Some(Err(CmdErr::NotSupported));
                };
                if !status.halted {
                    return Some(Err(CmdErr::HaltOrResume));
                }
                requests.gpr = Some(GprAccess {
                    regno: specifier,
                    write: self.control.write().then_some(data[0]),
                });
                self.phase = Phase::WaitGpr;
                None
            }
            Phase::WaitGpr => {
                if !status.gpr_ack {
                    return None;
                }
                if !self.control.write() {
                    data[0] = status.gpr_read;
                }
                trace!(
                    "access register: {} {:#06x} = {:#010x}",
                    if self.control.write() { "wrote" } else { "read" },
                    self.control.regno(),
                    data[0]
                );
                requests.gpr = None;
                self.after_transfer()
            }
            Phase::SanityCheck => {
                if !status.halted {
                    return Some(Err(CmdErr::HaltOrResume));
                }
                self.real_dpc = status.dpc;
                requests.debug_mode = true;
                requests.dpc_write = Some(PROGBUF_BASE);
                requests.resumereq = true;
                self.phase = Phase::Resume;
                None
            }
            Phase::Resume => {
                requests.dpc_write = None;
                if status.resumeack {
                    requests.resumereq = false;
                    requests.dpc_write = Some(self.real_dpc);
                    self.phase = Phase::WaitHalt;
                }
                None
            }
            Phase::WaitHalt => {
                requests.dpc_write = None;
                if status.progbuf_error {
                    debug!("program buffer raised an exception");
                    requests.debug_mode = false;
                    return Some(Err(CmdErr::Exception));
                }
                if status.halted {
                    requests.debug_mode = false;
                    return Some(Ok(()));
                }
                None
            }
        }
    }

    fn after_transfer(&mut self) -> Option<Result<(), CmdErr>> {
        match self.control.postexec() {
            true => {
                self.phase = Phase::SanityCheck;
                None
            }
            false => Some(Ok(())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn halted() -> HartStatus {
        HartStatus {
            halted: true,
            dpc: 0x1234,
            ..Default::default()
        }
    }

    #[test]
    fn test_gpr_read() {
        let mut command = AccessRegisterCommand::new(
            AccessRegister::build(0x1005, false, true, false).access_register(),
        );
        let mut requests = DebugRequests::default();
        let mut data = [0; DATA_COUNT];
        assert_eq!(None, command.tick(&halted(), &mut requests, &mut data));
        assert_eq!(
            Some(GprAccess {
                regno: Specifier::new(5u8).unwrap(),
                write: None
            }),
            requests.gpr
        );
        assert_eq!(None, command.tick(&halted(), &mut requests, &mut data));
        let ack = HartStatus {
            gpr_ack: true,
            gpr_read: 0xfeed,
            ..halted()
        };
        assert_eq!(Some(Ok(())), command.tick(&ack, &mut requests, &mut data));
        assert_eq!(0xfeed, data[0]);
        assert_eq!(None, requests.gpr);
    }

    #[test]
    fn test_gpr_write_takes_data0() {
        let mut command = AccessRegisterCommand::new(
            AccessRegister::build(0x101f, true, true, false).access_register(),
        );
        let mut requests = DebugRequests::default();
        let mut data = [0xabcd, 0];
        command.tick(&halted(), &mut requests, &mut data);
        assert_eq!(Some(0xabcd), requests.gpr.and_then(|access| access.write));
    }

    #[test]
    fn test_unsupported_transfers() {
        let mut requests = DebugRequests::default();
        let mut data = [0; DATA_COUNT];
        for control in [
            AccessRegister::build(0x0300, false, true, false).access_register(),
            AccessRegister::build(0x1020, false, true, false).access_register(),
            AccessRegister(AccessRegister::build(0x1000, false, true, false).0 & !(7 << 20)),
        ] {
            let mut command = AccessRegisterCommand::new(control);
            assert_eq!(
                Some(Err(CmdErr::NotSupported)),
                command.tick(&halted(), &mut requests, &mut data)
            );
        }
        assert_eq!(None, requests.gpr);
    }

    #[test]
    fn test_transfer_requires_halt() {
        let mut command = AccessRegisterCommand::new(
            AccessRegister::build(0x1001, false, true, false).access_register(),
        );
        assert_eq!(
            Some(Err(CmdErr::HaltOrResume)),
            command.tick(
                &HartStatus::default(),
                &mut DebugRequests::default(),
                &mut [0; DATA_COUNT]
            )
        );
    }

    #[test]
    fn test_no_transfer_no_postexec() {
        let mut command = AccessRegisterCommand::new(
            AccessRegister::build(0x1001, false, false, false).access_register(),
        );
        assert_eq!(
            Some(Ok(())),
            command.tick(
                &HartStatus::default(),
                &mut DebugRequests::default(),
                &mut [0; DATA_COUNT]
            )
        );
    }

    #[test]
    fn test_postexec_sequence() {
        let mut command = AccessRegisterCommand::new(
            AccessRegister::build(0x1000, false, false, true).access_register(),
        );
        let mut requests = DebugRequests::default();
        let mut data = [0; DATA_COUNT];
        assert_eq!(None, command.tick(&halted(), &mut requests, &mut data));
        assert_eq!(None, command.tick(&halted(), &mut requests, &mut data));
        assert!(requests.debug_mode && requests.resumereq);
        assert_eq!(Some(PROGBUF_BASE), requests.dpc_write);

        assert_eq!(None, command.tick(&halted(), &mut requests, &mut data));
        assert_eq!(None, requests.dpc_write);
        let resumed = HartStatus {
            resumeack: true,
            ..Default::default()
        };
        assert_eq!(None, command.tick(&resumed, &mut requests, &mut data));
        assert!(!requests.resumereq);
        assert_eq!(Some(0x1234), requests.dpc_write);

        let running = HartStatus::default();
        assert_eq!(None, command.tick(&running, &mut requests, &mut data));
        assert_eq!(None, requests.dpc_write);
        assert_eq!(Some(Ok(())), command.tick(&halted(), &mut requests, &mut data));
        assert!(!requests.debug_mode);
    }

    #[test]
    fn test_postexec_exception() {
        let mut command = AccessRegisterCommand::new(
            AccessRegister::build(0x1000, false, false, true).access_register(),
        );
        let mut requests = DebugRequests::default();
        let mut data = [0; DATA_COUNT];
        command.tick(&halted(), &mut requests, &mut data);
        command.tick(&halted(), &mut requests, &mut data);
        let resumed = HartStatus {
            resumeack: true,
            ..Default::default()
        };
        command.tick(&resumed, &mut requests, &mut data);
        let faulted = HartStatus {
            progbuf_error: true,
            ..halted()
        };
        assert_eq!(
            Some(Err(CmdErr::Exception)),
            command.tick(&faulted, &mut requests, &mut data)
        );
        assert!(!requests.debug_mode);
    }

    #[test]
    fn test_postexec_requires_halt() {
        let mut command = AccessRegisterCommand::new(
            AccessRegister::build(0x1000, false, false, true).access_register(),
        );
        let mut requests = DebugRequests::default();
        let mut data = [0; DATA_COUNT];
        command.tick(&HartStatus::default(), &mut requests, &mut data);
        assert_eq!(
            Some(Err(CmdErr::HaltOrResume)),
            command.tick(&HartStatus::default(), &mut requests, &mut data)
        );
        assert!(!requests.resumereq);
    }
}
