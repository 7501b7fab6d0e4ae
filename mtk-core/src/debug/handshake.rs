//! Signals exchanged between the Debug Module and the hart, and a monitor checking the
//! request/acknowledge protocol on them.
//!
//! Both sides only ever see the other side's signals as they were at the end of the previous tick.
//! A request is held until its acknowledge is observed; an acknowledge is a one-tick pulse.

use log::warn;

use crate::registers::Specifier;

/// A single access through the debug GPR port.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct GprAccess {
    pub regno: Specifier,
    /// `Some` for a write. Writes to `x0` are dropped.
    pub write: Option<u32>,
}

/// Debug Module to hart.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct DebugRequests {
    pub haltreq: bool,
    pub resumereq: bool,
    /// Set while the hart executes the program buffer.
    pub debug_mode: bool,
    /// Overwrites `dpc` at the start of the hart's next tick, in any state.
    pub dpc_write: Option<u32>,
    /// Only served while the hart is halted.
    pub gpr: Option<GprAccess>,
}

/// Hart to Debug Module.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct HartStatus {
    pub halted: bool,
    pub haltack: bool,
    pub resumeack: bool,
    pub dpc: u32,
    /// Pulses when a [`GprAccess`] was performed; `gpr_read` then holds the register's old value.
    pub gpr_ack: bool,
    pub gpr_read: u32,
    /// An exception was raised while executing the program buffer.
    pub progbuf_error: bool,
}

/// Watches one request/acknowledge pair.
#[derive(Debug, Clone, Default)]
struct PairMonitor {
    request: bool,
    ack: bool,
}

impl PairMonitor {
    /// Returns a description of the violation seen this tick, if any.
    fn sample(&mut self, request: bool, ack: bool) -> Option<&'static str> {
        let violation = if ack && self.ack {
            Some("acknowledge held for more than one tick")
        } else if ack && !request {
            Some("acknowledge without a pending request")
        } else if ack && !self.request {
            Some("acknowledge in the same tick the request rose")
        } else if self.ack && request {
            Some("request still asserted after its acknowledge")
        } else {
            None
        };
        self.request = request;
        self.ack = ack;
        violation
    }
}

/// Protocol checker for the halt and resume handshakes.
///
/// Violations are logged and latched into a sticky flag; they never stop the simulation.
#[derive(Debug, Clone, Default)]
pub struct HandshakeMonitor {
    halt: PairMonitor,
    resume: PairMonitor,
    halted: bool,
    error: bool,
}

impl HandshakeMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Samples the signals both sides drive at the end of a tick.
    pub fn sample(&mut self, requests: &DebugRequests, status: &HartStatus) {
        if let Some(violation) = self.halt.sample(requests.haltreq, status.haltack) {
            warn!("halt handshake: {violation}");
            self.error = true;
        }
        if let Some(violation) = self.resume.sample(requests.resumereq, status.resumeack) {
            warn!("resume handshake: {violation}");
            self.error = true;
        }
        if status.haltack && self.halted {
            warn!("halt handshake: halt request delivered to an already halted hart");
            self.error = true;
        }
        self.halted = status.halted;
    }

    /// `true` once any violation was seen.
    pub fn error(&self) -> bool {
        self.error
    }
}
