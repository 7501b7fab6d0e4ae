//! Side effects of DMI register writes that outlive the write itself.

use log::{debug, trace, warn};

use super::command::AccessRegisterCommand;
use super::handshake::HartStatus;
use super::registers::{Command, Dmcontrol};
use super::{CmdErr, DebugModule, PROGBUF_BASE};
use crate::bus::{BusPort, BusRequest};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(super) enum DmcontrolPhase {
    Start,
    WaitHaltAck,
    WaitResumeAck,
}

/// Work remaining for a latched DMI write. The Debug Module stays busy until it returns.
#[derive(Debug, Clone)]
pub(super) enum Handler {
    Done,
    Dmcontrol {
        value: Dmcontrol,
        phase: DmcontrolPhase,
    },
    Progbuf {
        index: usize,
        value: u32,
        issued: bool,
    },
    StartCommand,
    Command(AccessRegisterCommand),
}

impl Handler {
    pub(super) fn dmcontrol(value: Dmcontrol) -> Self {
        Self::Dmcontrol {
            value,
            phase: DmcontrolPhase::Start,
        }
    }

    pub(super) fn progbuf(index: usize, value: u32) -> Self {
        Self::Progbuf {
            index,
            value,
            issued: false,
        }
    }

    /// Returns `true` once the write is complete.
    pub(super) fn tick(
        &mut self,
        dm: &mut DebugModule,
        status: &HartStatus,
        port: &mut BusPort,
    ) -> bool {
        loop {
            match self {
                Handler::Done => return true,
                Handler::Dmcontrol { value, phase } => {
                    return dmcontrol(dm, *value, phase, status);
                }
                Handler::Progbuf {
                    index,
                    value,
                    issued,
                } => {
                    if !*issued {
                        let address = PROGBUF_BASE + 4 * *index as u32;
                        *issued = port.issue(BusRequest::store(address, *value, 0b1111));
                        return false;
                    }
                    let Some(response) = port.take_response() else {
                        return false;
                    };
                    if response.error {
                        debug!("dm: program buffer store failed");
                        dm.set_cmderr(CmdErr::BusError);
                        return true;
                    }
                    if !dm.abstractauto.autoexecprogbuf(*index) {
                        return true;
                    }
                    *self = Handler::StartCommand;
                }
                Handler::StartCommand => match start_command(dm) {
                    Some(command) => *self = Handler::Command(command),
                    None => return true,
                },
                Handler::Command(command) => {
                    return match command.tick(status, &mut dm.requests, &mut dm.data) {
                        None => false,
                        Some(result) => {
                            trace!("dm: abstract command finished: {result:?}");
                            if let Err(cmderr) = result {
                                dm.set_cmderr(cmderr);
                            }
                            true
                        }
                    };
                }
            }
        }
    }
}

fn dmcontrol(
    dm: &mut DebugModule,
    value: Dmcontrol,
    phase: &mut DmcontrolPhase,
    status: &HartStatus,
) -> bool {
    match phase {
        DmcontrolPhase::Start => {
            if !value.dmactive() {
                dm.deactivate();
                return true;
            }
            dm.dmcontrol = value.retained();
            if dm.nonexistent() {
                debug!("dm: hart {} doesn't exist", value.hartsel());
                return true;
            }
            if value.ackhavereset() {
                dm.havereset = false;
            }
            if value.haltreq() {
                if status.halted {
                    warn!("dm: haltreq written while the hart is already halted");
                    dm.protocol_error = true;
                } else {
                    dm.requests.haltreq = true;
                    *phase = DmcontrolPhase::WaitHaltAck;
                    return false;
                }
            }
            if value.resumereq() && !value.haltreq() && status.halted {
                dm.resumeack = false;
                dm.requests.resumereq = true;
                *phase = DmcontrolPhase::WaitResumeAck;
                return false;
            }
            true
        }
        DmcontrolPhase::WaitHaltAck => {
            if status.haltack {
                dm.requests.haltreq = false;
                return true;
            }
            false
        }
        DmcontrolPhase::WaitResumeAck => {
            if status.resumeack {
                dm.requests.resumereq = false;
                dm.resumeack = true;
                return true;
            }
            false
        }
    }
}

/// Starts the command in `command`, unless an earlier error is still pending.
fn start_command(dm: &mut DebugModule) -> Option<AccessRegisterCommand> {
    if dm.cmderr != CmdErr::NoErr {
        debug!("dm: command ignored, cmderr is {:?}", dm.cmderr);
        return None;
    }
    if dm.command.cmdtype() != Command::ACCESS_REGISTER {
        debug!("dm: unsupported command type {}", dm.command.cmdtype());
        dm.set_cmderr(CmdErr::NotSupported);
        return None;
    }
    Some(AccessRegisterCommand::new(dm.command.access_register()))
}
