//! Debugger-side JTAG probe driving the pins of a [`Soc`].
//!
//! Every TCK half-period lasts [`JtagProbe::hold_ticks`] core ticks so the TAP's input synchronizers
//! see each level. All scans start and end in Run-Test/Idle.

use log::{debug, trace};
use thiserror::Error;

use crate::debug::jtag::{ir, DMI_WIDTH, IR_WIDTH};
use crate::debug::DmiOp;
use crate::simulator::Clocked;
use crate::Soc;

/// `dtmcs.dmireset`.
const DTMCS_DMIRESET: u64 = 1 << 16;

#[derive(Error, Debug, Clone, Copy, Eq, PartialEq)]
pub enum ProbeError {
    #[error("debug module was busy, transaction dropped")]
    Busy,
    #[error("dmi transaction failed with status {0}")]
    Failed(u8),
}

#[derive(Debug, Clone)]
pub struct JtagProbe {
    /// Core ticks per TCK level.
    pub hold_ticks: u32,
    /// Extra TCK cycles spent in Run-Test/Idle after every scan.
    pub idle_cycles: u32,
    ir: Option<u8>,
}

impl Default for JtagProbe {
    fn default() -> Self {
        Self {
            hold_ticks: 3,
            idle_cycles: 16,
            ir: None,
        }
    }
}

impl JtagProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the TAP to Test-Logic-Reset and then Run-Test/Idle.
    pub fn reset(&mut self, soc: &mut Soc) {
        for _ in 0..6 {
            self.clock(soc, true, false);
        }
        self.clock(soc, false, false);
        self.ir = Some(ir::IDCODE);
    }

    /// Shifts `instruction` into IR. Returns the captured IR value.
    pub fn write_ir(&mut self, soc: &mut Soc, instruction: u8) -> u8 {
        let captured = self.scan(soc, true, instruction as u64, IR_WIDTH) as u8;
        self.ir = Some(instruction);
        captured
    }

    /// Shifts `width` bits of `value` through the selected data register, least significant bit
    /// first. Returns the bits shifted out.
    pub fn scan_dr(&mut self, soc: &mut Soc, value: u64, width: u32) -> u64 {
        self.scan(soc, false, value, width)
    }

    pub fn read_idcode(&mut self, soc: &mut Soc) -> u32 {
        self.select(soc, ir::IDCODE);
        self.scan_dr(soc, 0, 32) as u32
    }

    pub fn read_dtmcs(&mut self, soc: &mut Soc) -> u32 {
        self.select(soc, ir::DTMCS);
        self.scan_dr(soc, 0, 32) as u32
    }

    /// Clears a sticky DMI busy status.
    pub fn dmi_reset(&mut self, soc: &mut Soc) {
        self.select(soc, ir::DTMCS);
        self.scan_dr(soc, DTMCS_DMIRESET, 32);
    }

    pub fn dmi_read(&mut self, soc: &mut Soc, address: u8) -> Result<u32, ProbeError> {
        self.dmi(soc, DmiOp::Read, address, 0)
    }

    pub fn dmi_write(&mut self, soc: &mut Soc, address: u8, data: u32) -> Result<(), ProbeError> {
        self.dmi(soc, DmiOp::Write, address, data).map(|_| ())
    }

    /// Issues one DMI transaction, then collects its result with a NOP scan.
    fn dmi(
        &mut self,
        soc: &mut Soc,
        op: DmiOp,
        address: u8,
        data: u32,
    ) -> Result<u32, ProbeError> {
        self.select(soc, ir::DMI);
        let op_bits = match op {
            DmiOp::Nop => 0,
            DmiOp::Read => 1,
            DmiOp::Write => 2,
        };
        let packet = op_bits | (data as u64) << 2 | (address as u64) << 34;
        self.scan_dr(soc, packet, DMI_WIDTH);
        let response = self.scan_dr(soc, 0, DMI_WIDTH);
        debug!("dmi {op:?} {address:#04x} {data:#010x}: response {response:#013x}");
        match (response & 0b11) as u8 {
            0 => Ok((response >> 2) as u32),
            3 => Err(ProbeError::Busy),
            status => Err(ProbeError::Failed(status)),
        }
    }

    fn select(&mut self, soc: &mut Soc, instruction: u8) {
        if self.ir != Some(instruction) {
            self.write_ir(soc, instruction);
        }
    }

    fn scan(&mut self, soc: &mut Soc, select_ir: bool, value: u64, width: u32) -> u64 {
        self.clock(soc, true, false);
        if select_ir {
            self.clock(soc, true, false);
        }
        self.clock(soc, false, false);
        self.clock(soc, false, false);
        let mut out = 0;
        for bit in 0..width {
            let tdo = self.clock(soc, bit + 1 == width, value >> bit & 1 == 1);
            out |= (tdo as u64) << bit;
        }
        self.clock(soc, true, false);
        self.clock(soc, false, false);
        for _ in 0..self.idle_cycles {
            self.clock(soc, false, false);
        }
        trace!("scan {value:#x} ({width} bits) -> {out:#x}");
        out
    }

    /// One TCK period. Returns TDO as sampled just before the rising edge.
    fn clock(&mut self, soc: &mut Soc, tms: bool, tdi: bool) -> bool {
        self.hold(soc, false, tms, tdi);
        let tdo = soc.tdo();
        self.hold(soc, true, tms, tdi);
        tdo
    }

    fn hold(&mut self, soc: &mut Soc, tck: bool, tms: bool, tdi: bool) {
        soc.set_pins(tck, tms, tdi);
        for _ in 0..self.hold_ticks {
            soc.tick();
        }
    }
}
