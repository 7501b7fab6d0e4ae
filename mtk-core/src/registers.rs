//! General purpose register file.

use std::fmt;

/// Number of `x` registers.
pub const LEN: u8 = 32;

/// The 32 word-wide `x` registers of the hart.
///
/// > For RV32I, the 32 x registers are each 32 bits wide, i.e., XLEN=32. Register x0 is hardwired
/// > with all bits equal to 0.
///
/// The file itself stores whatever its write port is given. Keeping `x0` at zero is the job of
/// the two writers: the writeback stage and the debug GPR port, both of which drop writes to `x0`
/// before they reach [`RegisterFile::write`].
#[derive(Debug, Clone, Default)]
pub struct RegisterFile {
    x: [u32; LEN as usize],
}

impl RegisterFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read port.
    pub fn read(&self, specifier: Specifier) -> u32 {
        self.x[usize::from(specifier)]
    }

    /// Write port.
    pub fn write(&mut self, specifier: Specifier, value: u32) {
        self.x[usize::from(specifier)] = value;
    }

    /// Snapshot of all registers, `x0` first.
    pub fn dump(&self) -> [u32; LEN as usize] {
        self.x
    }
}

/// An `x` register specifier. Can take values in the range `0..LEN`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Specifier(u8);

impl Specifier {
    pub const X0: Self = Specifier(0);

    /// Create a register specifier from its index, returning `None` if `index > 31`.
    pub fn new<U: TryInto<u8>>(index: U) -> Option<Self> {
        let index = index.try_into().ok()?;
        (index < LEN).then_some(Self(index))
    }

    /// Takes the five least significant bits of `value` as register index.
    pub fn from_u5(value: u32) -> Self {
        const_assert_eq!(LEN, 32);
        Self((value & 0x1f) as u8)
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Iterator over `x0` up to `x31`.
    pub fn iter_all() -> impl Iterator<Item = Self> {
        (0..LEN).map(Self)
    }
}

impl From<Specifier> for u8 {
    fn from(value: Specifier) -> Self {
        value.0
    }
}

impl From<Specifier> for usize {
    fn from(value: Specifier) -> Self {
        value.0 as usize
    }
}

impl fmt::Display for Specifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_write() {
        let mut registers = RegisterFile::new();
        for specifier in Specifier::iter_all().skip(1) {
            registers.write(specifier, u8::from(specifier) as u32 * 3);
        }
        assert_eq!(0, registers.read(Specifier::X0));
        assert_eq!(93, registers.read(Specifier::from_u5(31)));
        assert_eq!(3, registers.dump()[1]);
    }

    #[test]
    fn test_specifier() {
        assert_eq!(None, Specifier::new(32));
        assert_eq!(Some(Specifier::from_u5(5)), Specifier::new(5u32));
        assert_eq!(Specifier::from_u5(1), Specifier::from_u5(0x21));
        assert!(Specifier::X0.is_zero());
        assert_eq!("x17", Specifier::from_u5(17).to_string());
    }
}
