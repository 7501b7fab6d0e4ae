use bitvec::{field::BitField, order::Lsb0, view::BitView};

/// Machine ISA register: RV32 with only the base integer ISA.
pub const MISA: u32 = 0x4000_0100;

/// Trap Vector Base Address Register (mtvec).
///
/// Every trap, synchronous or not, jumps to BASE. The MODE bits are stored and read back but never
/// select a vectored target.
#[derive(Debug, Clone)]
pub struct Tvec(u32);

impl Tvec {
    pub fn new(reset_value: u32) -> Self {
        Self(reset_value)
    }

    pub fn read(&self) -> u32 {
        self.0
    }

    pub fn write(&mut self, value: u32, mask: u32) {
        self.0 = self.0 & !mask | value & mask;
    }

    /// Returns the vector base address (the BASE field shifted back into place). This is where
    /// every trap vectors to.
    pub fn base(&self) -> u32 {
        self.0.view_bits::<Lsb0>()[2..].load_le::<u32>() << 2
    }
}
