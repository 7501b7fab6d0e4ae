use crate::bus::{merge_lanes, BusError, BusSlave};
use crate::AddressRange;
use thiserror::Error;

/// Byte-backed RAM, word-addressed on the bus.
///
/// This can be categorized as *main memory* according to the types of memory resources defined by
/// the RISC-V spec. Bus accesses ignore the two least significant address bits; sub-word stores
/// select their bytes through the lane mask.
#[derive(Debug, Clone)]
pub struct Ram {
    range: AddressRange,
    data: Vec<u8>,
}

impl Ram {
    /// Create a zero-initialized RAM of `size` bytes mapped at `base`.
    ///
    /// `size` must be a non-zero multiple of four, and the region must not wrap around the address
    /// space.
    pub fn new(base: u32, size: u32) -> Result<Self, RamError> {
        if size % 4 != 0 || base % 4 != 0 {
            return Err(RamError::Unaligned { base, size });
        }
        let range =
            AddressRange::with_size(base, size).map_err(|_| RamError::Unaligned { base, size })?;
        const_assert!(usize::BITS >= 32);
        Ok(Self {
            range,
            data: vec![0; size as usize],
        })
    }

    pub fn range(&self) -> AddressRange {
        self.range
    }

    /// Copy `bytes` into RAM starting at `address`, bypassing the bus.
    pub fn load(&mut self, address: u32, bytes: &[u8]) -> Result<(), RamError> {
        let out_of_range = RamError::OutOfRange {
            address,
            len: bytes.len(),
        };
        let start = self.range.offset_of(address).ok_or(out_of_range.clone())? as usize;
        let end = start.checked_add(bytes.len()).ok_or(out_of_range.clone())?;
        self.data
            .get_mut(start..end)
            .ok_or(out_of_range)?
            .copy_from_slice(bytes);
        Ok(())
    }

    /// Reads one byte, bypassing the bus. Returns `None` outside the RAM.
    pub fn read_byte(&self, address: u32) -> Option<u8> {
        let offset = self.range.offset_of(address)?;
        self.data.get(offset as usize).copied()
    }

    fn word_offset(&self, address: u32) -> Option<usize> {
        self.range.offset_of(address & !3).map(|offset| offset as usize)
    }
}

impl BusSlave for Ram {
    fn read_word(&mut self, address: u32) -> Result<u32, BusError> {
        let offset = self.word_offset(address).ok_or(BusError::Unmapped(address))?;
        let mut word = [0u8; 4];
        word.copy_from_slice(&self.data[offset..offset + 4]);
        Ok(u32::from_le_bytes(word))
    }

    fn write_word(&mut self, address: u32, data: u32, mask: u8) -> Result<(), BusError> {
        let offset = self.word_offset(address).ok_or(BusError::Unmapped(address))?;
        let old = self.read_word(address)?;
        self.data[offset..offset + 4].copy_from_slice(&merge_lanes(old, data, mask).to_le_bytes());
        Ok(())
    }
}

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum RamError {
    #[error("RAM of {size:#x} bytes at {base:#010x} must be word aligned and non-empty")]
    Unaligned { base: u32, size: u32 },
    #[error("{len} bytes at {address:#010x} fall outside RAM")]
    OutOfRange { address: u32, len: usize },
}
