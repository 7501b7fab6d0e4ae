use crate::bus::{merge_lanes, BusError, BusSlave};
use crate::debug::{PROGBUF_BASE, PROGBUF_SIZE};
use crate::AddressRange;

/// The program-buffer window: [`PROGBUF_SIZE`] instruction words at [`PROGBUF_BASE`].
///
/// The Debug Module fills it through its bus port; the hart executes it after the Debug Module
/// redirects `dpc` into the window and resumes. The word following the last one is not part of the
/// window, so a program buffer must end in `ebreak`.
#[derive(Debug, Clone, Default)]
pub struct ProgramBuffer {
    words: [u32; PROGBUF_SIZE],
}

impl ProgramBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn range() -> AddressRange {
        crate::address_range![PROGBUF_BASE, PROGBUF_BASE + 4 * PROGBUF_SIZE as u32 - 1]
    }

    pub fn words(&self) -> &[u32; PROGBUF_SIZE] {
        &self.words
    }

    fn index(address: u32) -> Option<usize> {
        Self::range()
            .offset_of(address)
            .map(|offset| offset as usize / 4)
    }
}

impl BusSlave for ProgramBuffer {
    fn read_word(&mut self, address: u32) -> Result<u32, BusError> {
        Self::index(address)
            .map(|index| self.words[index])
            .ok_or(BusError::Unmapped(address))
    }

    fn write_word(&mut self, address: u32, data: u32, mask: u8) -> Result<(), BusError> {
        let index = Self::index(address).ok_or(BusError::Unmapped(address))?;
        self.words[index] = merge_lanes(self.words[index], data, mask);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window() {
        let mut progbuf = ProgramBuffer::new();
        progbuf.write_word(0xde88, 0x0010_0073, 0b1111).unwrap();
        progbuf.write_word(0xde8c + 2, 0x1234_5678, 0b1111).unwrap();
        assert_eq!(Ok(0x0010_0073), progbuf.read_word(0xde88));
        assert_eq!(0x1234_5678, progbuf.words()[1]);
        assert_eq!(
            Err(BusError::Unmapped(0xde88 + 4 * PROGBUF_SIZE as u32)),
            progbuf.read_word(0xde88 + 4 * PROGBUF_SIZE as u32)
        );
        assert_eq!(Err(BusError::Unmapped(0xde84)), progbuf.read_word(0xde84));
    }
}
