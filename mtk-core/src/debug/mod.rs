//! External debug support: the JTAG Debug Transport Module and the Debug Module behind it.
//!
//! The Debug Module serves one DMI transaction at a time. Reads complete in a single tick; writes
//! are latched and then handed to a register-specific handler that may take many ticks, during
//! which the Debug Module reports itself busy to the DTM.

pub mod cdc;
pub mod command;
mod handlers;
pub mod handshake;
pub mod jtag;
pub mod registers;

use log::{debug, trace, warn};

use crate::bus::BusPort;
use handlers::Handler;
use handshake::{DebugRequests, HartStatus};
use jtag::DmiTarget;
use registers::{address, Abstractauto, Abstractcs, Command, Dmcontrol, Dmstatus};

/// Address of the first program-buffer word on the system bus.
pub const PROGBUF_BASE: u32 = 0xde88;
/// Number of program-buffer words.
pub const PROGBUF_SIZE: usize = 3;
/// Number of `data` registers.
pub const DATA_COUNT: usize = 2;

const_assert!(PROGBUF_SIZE <= 16);
const_assert!(DATA_COUNT >= 1 && DATA_COUNT <= 12);
const_assert_eq!(PROGBUF_BASE % 4, 0);

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DmiOp {
    Nop,
    Read,
    Write,
}

/// A DMI transaction as shifted in through the DMI scan register.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DmiRequest {
    pub op: DmiOp,
    pub address: u8,
    pub data: u32,
}

/// What the DTM hands to the Debug Module after an Update-DR.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DmiEvent {
    Request(DmiRequest),
    /// A transaction arrived while the Debug Module was busy and was dropped.
    Overrun,
}

/// Abstract command error, as reported in `abstractcs.cmderr`.
///
/// Once set, it stays until cleared by writing ones to it; later errors don't overwrite it.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
#[repr(u8)]
pub enum CmdErr {
    #[default]
    NoErr = 0,
    Busy = 1,
    NotSupported = 2,
    Exception = 3,
    HaltOrResume = 4,
    BusError = 5,
    Other = 7,
}

impl CmdErr {
    pub fn from_u3(value: u8) -> Self {
        match value & 0b111 {
            0 => Self::NoErr,
            1 => Self::Busy,
            2 => Self::NotSupported,
            3 => Self::Exception,
            4 => Self::HaltOrResume,
            5 => Self::BusError,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone)]
enum State {
    Idle,
    /// A read was served; `busy` drops on the next tick.
    DeassertBusy,
    Wait(Handler),
}

#[derive(Debug, Clone)]
pub struct DebugModule {
    state: State,
    busy: bool,
    read_data: u32,
    dmcontrol: Dmcontrol,
    dmstatus: Dmstatus,
    /// The hart was reset and the debugger hasn't acknowledged it yet.
    havereset: bool,
    /// Set once the hart acknowledged a resume requested through `dmcontrol`.
    resumeack: bool,
    cmderr: CmdErr,
    command: Command,
    abstractauto: Abstractauto,
    data: [u32; DATA_COUNT],
    requests: DebugRequests,
    /// Sticky. The debugger requested a halt while the hart was already halted.
    protocol_error: bool,
}

impl Default for DebugModule {
    fn default() -> Self {
        Self::new()
    }
}

impl DebugModule {
    pub fn new() -> Self {
        Self {
            state: State::Idle,
            busy: false,
            read_data: 0,
            dmcontrol: Dmcontrol::default(),
            dmstatus: Dmstatus::new(false, false, true, false),
            havereset: true,
            resumeack: false,
            cmderr: CmdErr::NoErr,
            command: Command::default(),
            abstractauto: Abstractauto::default(),
            data: [0; DATA_COUNT],
            requests: DebugRequests::default(),
            protocol_error: false,
        }
    }

    /// Signals towards the hart, as registered at the end of the last tick.
    pub fn requests(&self) -> DebugRequests {
        self.requests
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn read_data(&self) -> u32 {
        self.read_data
    }

    /// What the DTM samples on its next capture or update.
    pub fn dmi_target(&self) -> DmiTarget {
        DmiTarget {
            busy: self.busy,
            read_data: self.read_data,
        }
    }

    pub fn dmcontrol(&self) -> Dmcontrol {
        self.dmcontrol
    }

    pub fn dmstatus(&self) -> Dmstatus {
        self.dmstatus
    }

    pub fn abstractcs(&self) -> Abstractcs {
        Abstractcs::new(
            DATA_COUNT as u8,
            self.cmderr as u8,
            self.busy,
            PROGBUF_SIZE as u8,
        )
    }

    pub fn cmderr(&self) -> CmdErr {
        self.cmderr
    }

    pub fn data(&self) -> &[u32; DATA_COUNT] {
        &self.data
    }

    /// `true` once the debugger misused the halt protocol, e.g. by sending `haltreq` to a hart
    /// that was already halted.
    pub fn protocol_error(&self) -> bool {
        self.protocol_error
    }

    /// Advance the Debug Module by one clock cycle.
    ///
    /// `status` is the hart's output as registered at the end of the previous tick. `port` is the
    /// Debug Module's connection to the system bus, used to fill the program buffer.
    pub fn tick(&mut self, event: Option<DmiEvent>, status: &HartStatus, port: &mut BusPort) {
        match event {
            Some(DmiEvent::Request(request)) if matches!(self.state, State::Idle) => {
                self.dispatch(request)
            }
            Some(event) => {
                warn!("dmi overrun: {event:?}");
                self.set_cmderr(CmdErr::Busy);
                self.step(status, port);
            }
            None => self.step(status, port),
        }
        self.dmstatus = Dmstatus::new(
            status.halted,
            self.resumeack,
            self.havereset,
            self.nonexistent(),
        );
    }

    fn step(&mut self, status: &HartStatus, port: &mut BusPort) {
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Idle => {}
            State::DeassertBusy => self.busy = false,
            State::Wait(mut handler) => match handler.tick(self, status, port) {
                true => {
                    trace!("dm: write done");
                    self.busy = false;
                }
                false => self.state = State::Wait(handler),
            },
        }
    }

    fn dispatch(&mut self, request: DmiRequest) {
        match request.op {
            DmiOp::Nop => {}
            DmiOp::Read => {
                self.read_data = self.read(request.address);
                trace!("dm: read {:#04x} = {:#010x}", request.address, self.read_data);
                self.busy = true;
                self.state = State::DeassertBusy;
            }
            DmiOp::Write => {
                trace!("dm: write {:#04x} = {:#010x}", request.address, request.data);
                self.busy = true;
                let handler = self.latch(request.address, request.data);
                self.state = State::Wait(handler);
            }
        }
    }

    fn read(&mut self, address: u8) -> u32 {
        match address {
            address::DATA0..=address::DATA1 => self.data[usize::from(address - address::DATA0)],
            address::DMCONTROL => self.dmcontrol.0,
            address::DMSTATUS => self.dmstatus.0,
            address::HARTINFO => 0,
            address::ABSTRACTCS => self.abstractcs().0,
            address::COMMAND => 0,
            address::ABSTRACTAUTO => self.abstractauto.0,
            _ if Self::progbuf_index(address).is_some() => 0,
            _ => {
                debug!("dm: read of unimplemented register {address:#04x}");
                self.set_cmderr(CmdErr::NotSupported);
                0
            }
        }
    }

    /// Latches a written value and picks the handler that carries out its side effects.
    fn latch(&mut self, address: u8, value: u32) -> Handler {
        if address != address::DMCONTROL && !self.dmcontrol.dmactive() {
            debug!("dm: ignoring write to {address:#04x} while inactive");
            return Handler::Done;
        }
        match address {
            address::DMCONTROL => Handler::dmcontrol(Dmcontrol(value)),
            address::DATA0..=address::DATA1 => {
                let index = usize::from(address - address::DATA0);
                self.data[index] = value;
                match self.abstractauto.autoexecdata(index) {
                    true => Handler::StartCommand,
                    false => Handler::Done,
                }
            }
            address::ABSTRACTCS => {
                let cleared = self.cmderr as u8 & !Abstractcs(value).cmderr();
                self.cmderr = CmdErr::from_u3(cleared);
                Handler::Done
            }
            address::COMMAND => {
                self.command = Command(value);
                Handler::StartCommand
            }
            address::ABSTRACTAUTO => {
                self.abstractauto = Abstractauto::legalize(value, DATA_COUNT, PROGBUF_SIZE);
                Handler::Done
            }
            address::DMSTATUS | address::HARTINFO => Handler::Done,
            _ => match Self::progbuf_index(address) {
                Some(index) => Handler::progbuf(index, value),
                None => {
                    debug!("dm: write to unimplemented register {address:#04x}");
                    self.set_cmderr(CmdErr::NotSupported);
                    Handler::Done
                }
            },
        }
    }

    fn progbuf_index(address: u8) -> Option<usize> {
        let index = usize::from(address.checked_sub(address::PROGBUF0)?);
        (index < PROGBUF_SIZE).then_some(index)
    }

    /// Only hart 0 exists.
    fn nonexistent(&self) -> bool {
        self.dmcontrol.hartsel() != 0
    }

    fn set_cmderr(&mut self, cmderr: CmdErr) {
        if self.cmderr == CmdErr::NoErr {
            self.cmderr = cmderr;
        }
    }

    /// `dmactive` was cleared: every register and request goes back to its reset value.
    fn deactivate(&mut self) {
        debug!("dm: deactivated");
        self.dmcontrol = Dmcontrol::default();
        self.resumeack = false;
        self.cmderr = CmdErr::NoErr;
        self.command = Command::default();
        self.abstractauto = Abstractauto::default();
        self.data = [0; DATA_COUNT];
        self.requests = DebugRequests::default();
    }
}
