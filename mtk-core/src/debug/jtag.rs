//! JTAG Test Access Port acting as the Debug Transport Module.
//!
//! The TAP runs in the core clock domain. TCK, TMS and TDI are double-registered on the way in and
//! the state machine acts on the edges of the synchronized TCK: state transitions, captures and
//! shifts happen on the rising edge, TDO changes on the falling edge.

use log::{debug, trace, warn};

use super::cdc::FfSynchronizer;
use super::{DmiEvent, DmiOp, DmiRequest};

/// Width of the instruction register.
pub const IR_WIDTH: u32 = 5;
/// Width of the DMI scan register: `op` (2 bits), `data` (32 bits), `address` (7 bits).
pub const DMI_WIDTH: u32 = 2 + 32 + ABITS;
/// DMI address bits.
pub const ABITS: u32 = 7;

const_assert_eq!(DMI_WIDTH, 41);
const_assert!(IR_WIDTH >= 5);

/// Instructions selecting the scan register between TDI and TDO.
pub mod ir {
    pub const BYPASS: u8 = 0x00;
    pub const IDCODE: u8 = 0x01;
    pub const DTMCS: u8 = 0x10;
    pub const DMI: u8 = 0x11;
}

/// Default IDCODE, the one Spike reports.
pub const DEFAULT_IDCODE: u32 = 0x10e3_1913;

/// Minimum number of Run-Test/Idle cycles advertised in `dtmcs.idle`.
const DTMCS_IDLE: u32 = 2;
/// `dtmcs.version` for version 0.13 of the external debug support.
const DTMCS_VERSION: u32 = 1;
/// Value of `dmistat` and of the captured DMI `op` after an overrun.
const DMI_STATUS_BUSY: u64 = 3;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TapState {
    TestLogicReset,
    RunTestIdle,
    SelectDrScan,
    CaptureDr,
    ShiftDr,
    Exit1Dr,
    PauseDr,
    Exit2Dr,
    UpdateDr,
    SelectIrScan,
    CaptureIr,
    ShiftIr,
    Exit1Ir,
    PauseIr,
    Exit2Ir,
    UpdateIr,
}

impl TapState {
    /// Successor on a rising TCK edge with the given TMS level.
    pub fn next(self, tms: bool) -> Self {
        use TapState::*;
        match (self, tms) {
            (TestLogicReset, true) => TestLogicReset,
            (TestLogicReset, false) => RunTestIdle,
            (RunTestIdle, true) => SelectDrScan,
            (RunTestIdle, false) => RunTestIdle,
            (SelectDrScan, true) => SelectIrScan,
            (SelectDrScan, false) => CaptureDr,
            (CaptureDr, true) => Exit1Dr,
            (CaptureDr, false) => ShiftDr,
            (ShiftDr, true) => Exit1Dr,
            (ShiftDr, false) => ShiftDr,
            (Exit1Dr, true) => UpdateDr,
            (Exit1Dr, false) => PauseDr,
            (PauseDr, true) => Exit2Dr,
            (PauseDr, false) => PauseDr,
            (Exit2Dr, true) => UpdateDr,
            (Exit2Dr, false) => ShiftDr,
            (UpdateDr, true) => SelectDrScan,
            (UpdateDr, false) => RunTestIdle,
            (SelectIrScan, true) => TestLogicReset,
            (SelectIrScan, false) => CaptureIr,
            (CaptureIr, true) => Exit1Ir,
            (CaptureIr, false) => ShiftIr,
            (ShiftIr, true) => Exit1Ir,
            (ShiftIr, false) => ShiftIr,
            (Exit1Ir, true) => UpdateIr,
            (Exit1Ir, false) => PauseIr,
            (PauseIr, true) => Exit2Ir,
            (PauseIr, false) => PauseIr,
            (Exit2Ir, true) => UpdateIr,
            (Exit2Ir, false) => ShiftIr,
            (UpdateIr, true) => SelectDrScan,
            (UpdateIr, false) => RunTestIdle,
        }
    }
}

/// What the Debug Module exposes to the DTM.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct DmiTarget {
    /// The Debug Module can't accept a new transaction.
    pub busy: bool,
    /// Result of the last read.
    pub read_data: u32,
}

#[derive(Debug, Clone)]
pub struct JtagTap {
    tck: FfSynchronizer,
    tms: FfSynchronizer,
    tdi: FfSynchronizer,
    prev_tck: bool,
    tdo: bool,
    state: TapState,
    ir: u8,
    ir_shift: u8,
    dr: u64,
    dr_width: u32,
    idcode: u32,
    /// Sticky overrun flag, reported as `dmistat` = 3.
    dmi_busy: bool,
    /// Address of the last accepted DMI transaction.
    dmi_address: u8,
}

impl JtagTap {
    pub fn new(idcode: u32) -> Self {
        Self {
            tck: FfSynchronizer::new(false),
            tms: FfSynchronizer::new(true),
            tdi: FfSynchronizer::new(false),
            prev_tck: false,
            tdo: false,
            state: TapState::TestLogicReset,
            ir: ir::IDCODE,
            ir_shift: 0,
            dr: 0,
            dr_width: 1,
            idcode,
            dmi_busy: false,
            dmi_address: 0,
        }
    }

    pub fn state(&self) -> TapState {
        self.state
    }

    pub fn ir(&self) -> u8 {
        self.ir
    }

    pub fn tdo(&self) -> bool {
        self.tdo
    }

    /// Samples the pins and advances on TCK edges. Returns the DMI event produced by an Update-DR
    /// with the DMI register selected.
    pub fn tick(&mut self, tck: bool, tms: bool, tdi: bool, target: DmiTarget) -> Option<DmiEvent> {
        let tck = self.tck.tick(tck);
        let tms = self.tms.tick(tms);
        let tdi = self.tdi.tick(tdi);
        let rising = tck && !self.prev_tck;
        let falling = !tck && self.prev_tck;
        self.prev_tck = tck;
        if falling {
            self.tdo = match self.state {
                TapState::ShiftDr => self.dr & 1 == 1,
                TapState::ShiftIr => self.ir_shift & 1 == 1,
                _ => self.tdo,
            };
            return None;
        }
        if !rising {
            return None;
        }
        match self.state {
            TapState::ShiftDr => {
                self.dr = self.dr >> 1 | (tdi as u64) << (self.dr_width - 1);
            }
            TapState::ShiftIr => {
                self.ir_shift = self.ir_shift >> 1 | (tdi as u8) << (IR_WIDTH - 1);
            }
            _ => {}
        }
        let previous = self.state;
        self.state = self.state.next(tms);
        if self.state != previous {
            trace!("tap {previous:?} -> {:?}", self.state);
        }
        match self.state {
            TapState::TestLogicReset => self.ir = ir::IDCODE,
            TapState::CaptureDr => self.capture_dr(target),
            // IEEE 1149.1 mandates 0b01 in the two least significant bits
            TapState::CaptureIr => self.ir_shift = 0b00001,
            TapState::UpdateIr => {
                self.ir = self.ir_shift;
                debug!("tap ir {:#04x}", self.ir);
            }
            TapState::UpdateDr => return self.update_dr(target),
            _ => {}
        }
        None
    }

    fn capture_dr(&mut self, target: DmiTarget) {
        (self.dr, self.dr_width) = match self.ir {
            ir::IDCODE => (self.idcode as u64, 32),
            ir::DTMCS => {
                let dmistat = match self.dmi_busy {
                    true => DMI_STATUS_BUSY as u32,
                    false => 0,
                };
                let dtmcs = DTMCS_VERSION | ABITS << 4 | dmistat << 10 | DTMCS_IDLE << 12;
                (dtmcs as u64, 32)
            }
            ir::DMI => {
                let op = match self.dmi_busy {
                    true => DMI_STATUS_BUSY,
                    false => 0,
                };
                let packet = op | (target.read_data as u64) << 2 | (self.dmi_address as u64) << 34;
                (packet, DMI_WIDTH)
            }
            _ => (0, 1),
        };
    }

    fn update_dr(&mut self, target: DmiTarget) -> Option<DmiEvent> {
        match self.ir {
            ir::DTMCS => {
                let dmireset = self.dr >> 16 & 1 == 1;
                let dmihardreset = self.dr >> 17 & 1 == 1;
                if dmireset || dmihardreset {
                    debug!("dtmcs: dmireset {dmireset}, dmihardreset {dmihardreset}");
                    self.dmi_busy = false;
                }
                if dmihardreset {
                    self.dmi_address = 0;
                }
                None
            }
            ir::DMI => {
                if self.dmi_busy {
                    return None;
                }
                let op = match self.dr & 0b11 {
                    1 => DmiOp::Read,
                    2 => DmiOp::Write,
                    _ => return None,
                };
                let request = DmiRequest {
                    op,
                    address: (self.dr >> 34) as u8 & ((1 << ABITS) - 1) as u8,
                    data: (self.dr >> 2) as u32,
                };
                if target.busy {
                    warn!("dmi overrun, dropping {request:?}");
                    self.dmi_busy = true;
                    return Some(DmiEvent::Overrun);
                }
                self.dmi_address = request.address;
                Some(DmiEvent::Request(request))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Drives the TAP directly, holding each pin level for enough ticks to pass the synchronizers.
    struct Driver {
        tap: JtagTap,
        target: DmiTarget,
        events: Vec<DmiEvent>,
    }

    impl Driver {
        fn new() -> Self {
            Self {
                tap: JtagTap::new(DEFAULT_IDCODE),
                target: DmiTarget::default(),
                events: Vec::new(),
            }
        }

        fn hold(&mut self, tck: bool, tms: bool, tdi: bool) {
            for _ in 0..3 {
                if let Some(event) = self.tap.tick(tck, tms, tdi, self.target) {
                    self.events.push(event);
                }
            }
        }

        /// One TCK period; returns TDO as sampled before the rising edge.
        fn clock(&mut self, tms: bool, tdi: bool) -> bool {
            self.hold(false, tms, tdi);
            let tdo = self.tap.tdo();
            self.hold(true, tms, tdi);
            self.hold(false, tms, tdi);
            tdo
        }

        fn scan(&mut self, select_ir: bool, value: u64, width: u32) -> u64 {
            self.clock(true, false);
            if select_ir {
                self.clock(true, false);
            }
            self.clock(false, false);
            self.clock(false, false);
            let mut out = 0;
            for bit in 0..width {
                let tdo = self.clock(bit == width - 1, value >> bit & 1 == 1);
                out |= (tdo as u64) << bit;
            }
            self.clock(true, false);
            self.clock(false, false);
            out
        }
    }

    #[test]
    fn test_state_machine() {
        let mut state = TapState::RunTestIdle;
        for tms in [true, false, false, true, false, true, false] {
            state = state.next(tms);
        }
        assert_eq!(TapState::ShiftDr, state);
        for _ in 0..5 {
            state = state.next(true);
        }
        assert_eq!(TapState::TestLogicReset, state);
    }

    #[test]
    fn test_idcode_after_reset() {
        let mut driver = Driver::new();
        for _ in 0..5 {
            driver.clock(true, false);
        }
        driver.clock(false, false);
        assert_eq!(TapState::RunTestIdle, driver.tap.state());
        assert_eq!(DEFAULT_IDCODE as u64, driver.scan(false, 0, 32));
    }

    #[test]
    fn test_ir_scan_and_dtmcs() {
        let mut driver = Driver::new();
        driver.clock(false, false);
        let captured = driver.scan(true, ir::DTMCS as u64, IR_WIDTH);
        assert_eq!(0b00001, captured);
        assert_eq!(ir::DTMCS, driver.tap.ir());
        let dtmcs = driver.scan(false, 0, 32);
        assert_eq!(0x2071, dtmcs);
    }

    #[test]
    fn test_dmi_update_and_overrun() {
        let mut driver = Driver::new();
        driver.clock(false, false);
        driver.scan(true, ir::DMI as u64, IR_WIDTH);
        let packet = 2 | 0xdead_beef_u64 << 2 | 0x04 << 34;
        driver.scan(false, packet, DMI_WIDTH);
        assert_eq!(
            vec![DmiEvent::Request(DmiRequest {
                op: DmiOp::Write,
                address: 0x04,
                data: 0xdead_beef
            })],
            driver.events
        );

        driver.target = DmiTarget {
            busy: true,
            read_data: 0x1234,
        };
        driver.scan(false, packet, DMI_WIDTH);
        assert_eq!(Some(&DmiEvent::Overrun), driver.events.last());
        driver.target.busy = false;
        let captured = driver.scan(false, packet, DMI_WIDTH);
        assert_eq!(DMI_STATUS_BUSY, captured & 0b11);
        assert_eq!(0x1234, (captured >> 2) as u32);
        assert_eq!(2, driver.events.len());

        driver.scan(true, ir::DTMCS as u64, IR_WIDTH);
        driver.scan(false, 1 << 16, 32);
        driver.scan(true, ir::DMI as u64, IR_WIDTH);
        let captured = driver.scan(false, 0, DMI_WIDTH);
        assert_eq!(0, captured & 0b11);
        assert_eq!(0x04, captured >> 34);
    }
}
