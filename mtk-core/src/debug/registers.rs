//! Debug Module registers as seen over the DMI.
//!
//! > The Debug Module is the interface between the debugger and the hart.
//!
//! Register values are kept as raw words; the types here provide field accessors over them.

use bitvec::{field::BitField, order::Lsb0, view::BitView};

/// DMI register addresses.
pub mod address {
    pub const DATA0: u8 = 0x04;
    pub const DATA1: u8 = 0x05;
    pub const DMCONTROL: u8 = 0x10;
    pub const DMSTATUS: u8 = 0x11;
    pub const HARTINFO: u8 = 0x12;
    pub const ABSTRACTCS: u8 = 0x16;
    pub const COMMAND: u8 = 0x17;
    pub const ABSTRACTAUTO: u8 = 0x18;
    pub const PROGBUF0: u8 = 0x20;
}

/// Debug Module Control.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct Dmcontrol(pub u32);

impl Dmcontrol {
    pub fn dmactive(self) -> bool {
        self.0.view_bits::<Lsb0>()[idx::dmcontrol::DMACTIVE]
    }

    pub fn ackhavereset(self) -> bool {
        self.0.view_bits::<Lsb0>()[idx::dmcontrol::ACKHAVERESET]
    }

    pub fn resumereq(self) -> bool {
        self.0.view_bits::<Lsb0>()[idx::dmcontrol::RESUMEREQ]
    }

    pub fn haltreq(self) -> bool {
        self.0.view_bits::<Lsb0>()[idx::dmcontrol::HALTREQ]
    }

    /// `hartselhi:hartsello`.
    pub fn hartsel(self) -> u32 {
        let bits = self.0.view_bits::<Lsb0>();
        let hi: u32 = bits[idx::dmcontrol::HARTSELHI].load_le();
        let lo: u32 = bits[idx::dmcontrol::HARTSELLO].load_le();
        hi << 10 | lo
    }

    /// The part of a written value that reads back: `dmactive` and the hart selection.
    pub fn retained(self) -> Self {
        const MASK: u32 = 1 << idx::dmcontrol::DMACTIVE | 0x3ff << 16 | 0x3ff << 6;
        Self(self.0 & MASK)
    }
}

/// Debug Module Status. Read-only, rebuilt from the hart state.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct Dmstatus(pub u32);

impl Dmstatus {
    /// Debug Module conforming to version 0.13 of the external debug support.
    const VERSION: u8 = 2;

    pub fn new(halted: bool, resumeack: bool, havereset: bool, nonexistent: bool) -> Self {
        let mut dmstatus = Self(0);
        let bits = dmstatus.0.view_bits_mut::<Lsb0>();
        bits[idx::dmstatus::VERSION].store_le(Self::VERSION);
        bits.set(idx::dmstatus::AUTHENTICATED, true);
        let exists = !nonexistent;
        for (any, all, value) in [
            (idx::dmstatus::ANYHALTED, idx::dmstatus::ALLHALTED, exists && halted),
            (idx::dmstatus::ANYRUNNING, idx::dmstatus::ALLRUNNING, exists && !halted),
            (idx::dmstatus::ANYNONEXISTENT, idx::dmstatus::ALLNONEXISTENT, nonexistent),
            (idx::dmstatus::ANYRESUMEACK, idx::dmstatus::ALLRESUMEACK, exists && resumeack),
            (idx::dmstatus::ANYHAVERESET, idx::dmstatus::ALLHAVERESET, exists && havereset),
        ] {
            bits.set(any, value);
            bits.set(all, value);
        }
        dmstatus
    }

    pub fn allhalted(self) -> bool {
        self.0.view_bits::<Lsb0>()[idx::dmstatus::ALLHALTED]
    }

    pub fn anyhalted(self) -> bool {
        self.0.view_bits::<Lsb0>()[idx::dmstatus::ANYHALTED]
    }

    pub fn allrunning(self) -> bool {
        self.0.view_bits::<Lsb0>()[idx::dmstatus::ALLRUNNING]
    }

    pub fn anyrunning(self) -> bool {
        self.0.view_bits::<Lsb0>()[idx::dmstatus::ANYRUNNING]
    }

    pub fn allresumeack(self) -> bool {
        self.0.view_bits::<Lsb0>()[idx::dmstatus::ALLRESUMEACK]
    }

    pub fn allnonexistent(self) -> bool {
        self.0.view_bits::<Lsb0>()[idx::dmstatus::ALLNONEXISTENT]
    }

    pub fn allhavereset(self) -> bool {
        self.0.view_bits::<Lsb0>()[idx::dmstatus::ALLHAVERESET]
    }
}

/// Abstract Control and Status.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct Abstractcs(pub u32);

impl Abstractcs {
    pub fn new(datacount: u8, cmderr: u8, busy: bool, progbufsize: u8) -> Self {
        let mut abstractcs = Self(0);
        let bits = abstractcs.0.view_bits_mut::<Lsb0>();
        bits[idx::abstractcs::DATACOUNT].store_le(datacount);
        bits[idx::abstractcs::CMDERR].store_le(cmderr);
        bits.set(idx::abstractcs::BUSY, busy);
        bits[idx::abstractcs::PROGBUFSIZE].store_le(progbufsize);
        abstractcs
    }

    pub fn cmderr(self) -> u8 {
        self.0.view_bits::<Lsb0>()[idx::abstractcs::CMDERR].load_le()
    }

    pub fn busy(self) -> bool {
        self.0.view_bits::<Lsb0>()[idx::abstractcs::BUSY]
    }

    pub fn datacount(self) -> u8 {
        self.0.view_bits::<Lsb0>()[idx::abstractcs::DATACOUNT].load_le()
    }

    pub fn progbufsize(self) -> u8 {
        self.0.view_bits::<Lsb0>()[idx::abstractcs::PROGBUFSIZE].load_le()
    }
}

/// Abstract Command.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct Command(pub u32);

impl Command {
    pub const ACCESS_REGISTER: u8 = 0;

    pub fn cmdtype(self) -> u8 {
        self.0.view_bits::<Lsb0>()[idx::command::CMDTYPE].load_le()
    }

    /// Interprets the `control` field as an Access Register command.
    pub fn access_register(self) -> AccessRegister {
        AccessRegister(self.0.view_bits::<Lsb0>()[idx::command::CONTROL].load_le())
    }
}

/// `control` field of an Access Register abstract command.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct AccessRegister(pub u32);

impl AccessRegister {
    pub const AARSIZE_32: u8 = 2;

    pub fn regno(self) -> u16 {
        self.0.view_bits::<Lsb0>()[idx::access_register::REGNO].load_le()
    }

    pub fn write(self) -> bool {
        self.0.view_bits::<Lsb0>()[idx::access_register::WRITE]
    }

    pub fn transfer(self) -> bool {
        self.0.view_bits::<Lsb0>()[idx::access_register::TRANSFER]
    }

    pub fn postexec(self) -> bool {
        self.0.view_bits::<Lsb0>()[idx::access_register::POSTEXEC]
    }

    pub fn aarsize(self) -> u8 {
        self.0.view_bits::<Lsb0>()[idx::access_register::AARSIZE].load_le()
    }

    pub fn build(regno: u16, write: bool, transfer: bool, postexec: bool) -> Command {
        let mut control = 0u32;
        let bits = control.view_bits_mut::<Lsb0>();
        bits[idx::access_register::REGNO].store_le(regno);
        bits.set(idx::access_register::WRITE, write);
        bits.set(idx::access_register::TRANSFER, transfer);
        bits.set(idx::access_register::POSTEXEC, postexec);
        bits[idx::access_register::AARSIZE].store_le(Self::AARSIZE_32);
        Command(control)
    }
}

/// Abstract Command Autoexec.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct Abstractauto(pub u32);

impl Abstractauto {
    pub fn autoexecdata(self, index: usize) -> bool {
        self.0.view_bits::<Lsb0>()[idx::abstractauto::AUTOEXECDATA][index]
    }

    pub fn autoexecprogbuf(self, index: usize) -> bool {
        self.0.view_bits::<Lsb0>()[idx::abstractauto::AUTOEXECPROGBUF][index]
    }

    /// Keeps only the autoexec bits of implemented registers.
    pub fn legalize(value: u32, datacount: usize, progbufsize: usize) -> Self {
        let data = (1u32 << datacount) - 1;
        let progbuf = ((1u32 << progbufsize) - 1) << idx::abstractauto::AUTOEXECPROGBUF.start;
        Self(value & (data | progbuf))
    }
}

mod idx {
    pub mod dmcontrol {
        use std::ops::Range;

        pub const DMACTIVE: usize = 0;
        pub const HARTSELHI: Range<usize> = 6..16;
        pub const HARTSELLO: Range<usize> = 16..26;
        pub const ACKHAVERESET: usize = 28;
        pub const RESUMEREQ: usize = 30;
        pub const HALTREQ: usize = 31;
    }

    pub mod dmstatus {
        use std::ops::Range;

        pub const VERSION: Range<usize> = 0..4;
        pub const AUTHENTICATED: usize = 7;
        pub const ANYHALTED: usize = 8;
        pub const ALLHALTED: usize = 9;
        pub const ANYRUNNING: usize = 10;
        pub const ALLRUNNING: usize = 11;
        pub const ANYNONEXISTENT: usize = 14;
        pub const ALLNONEXISTENT: usize = 15;
        pub const ANYRESUMEACK: usize = 16;
        pub const ALLRESUMEACK: usize = 17;
        pub const ANYHAVERESET: usize = 18;
        pub const ALLHAVERESET: usize = 19;
    }

    pub mod abstractcs {
        use std::ops::Range;

        pub const DATACOUNT: Range<usize> = 0..4;
        pub const CMDERR: Range<usize> = 8..11;
        pub const BUSY: usize = 12;
        pub const PROGBUFSIZE: Range<usize> = 24..29;
    }

    pub mod command {
        use std::ops::Range;

        pub const CONTROL: Range<usize> = 0..24;
        pub const CMDTYPE: Range<usize> = 24..32;
    }

    pub mod access_register {
        use std::ops::Range;

        pub const REGNO: Range<usize> = 0..16;
        pub const WRITE: usize = 16;
        pub const TRANSFER: usize = 17;
        pub const POSTEXEC: usize = 18;
        pub const AARSIZE: Range<usize> = 20..23;
    }

    pub mod abstractauto {
        use std::ops::Range;

        pub const AUTOEXECDATA: Range<usize> = 0..12;
        pub const AUTOEXECPROGBUF: Range<usize> = 16..32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dmcontrol_fields() {
        let dmcontrol = Dmcontrol(1 << 31 | 1 << 28 | 5 << 16 | 1);
        assert!(dmcontrol.haltreq());
        assert!(!dmcontrol.resumereq());
        assert!(dmcontrol.ackhavereset());
        assert!(dmcontrol.dmactive());
        assert_eq!(5, dmcontrol.hartsel());
        assert_eq!(Dmcontrol(5 << 16 | 1), dmcontrol.retained());
        assert_eq!(1 << 10, Dmcontrol(1 << 6).hartsel());
    }

    #[test]
    fn test_dmstatus() {
        let halted = Dmstatus::new(true, false, true, false);
        assert!(halted.allhalted() && halted.anyhalted());
        assert!(!halted.allrunning() && !halted.anyrunning());
        assert!(halted.allhavereset());
        assert_eq!(2, halted.0 & 0xf);
        let running = Dmstatus::new(false, true, false, false);
        assert!(running.allrunning() && running.allresumeack());
        let nonexistent = Dmstatus::new(true, true, true, true);
        assert!(nonexistent.allnonexistent());
        assert!(!nonexistent.allhalted() && !nonexistent.allrunning());
    }

    #[test]
    fn test_access_register() {
        let command = AccessRegister::build(0x1005, true, true, false);
        assert_eq!(Command::ACCESS_REGISTER, command.cmdtype());
        assert_eq!(0x0023_1005, command.0);
        let control = command.access_register();
        assert_eq!(0x1005, control.regno());
        assert!(control.write() && control.transfer() && !control.postexec());
        assert_eq!(AccessRegister::AARSIZE_32, control.aarsize());
    }

    #[test]
    fn test_abstractauto_legalize() {
        let auto = Abstractauto::legalize(0xffff_ffff, 2, 3);
        assert_eq!(0x0007_0003, auto.0);
        assert!(auto.autoexecdata(1));
        assert!(!auto.autoexecdata(2));
        assert!(auto.autoexecprogbuf(2));
        assert!(!auto.autoexecprogbuf(3));
    }

    #[test]
    fn test_abstractcs_layout() {
        let abstractcs = Abstractcs::new(2, 3, true, 3);
        assert_eq!(0x0300_1302, abstractcs.0);
        assert_eq!(3, abstractcs.cmderr());
        assert!(abstractcs.busy());
    }
}
