use std::fmt;
use thiserror::Error;

/// A non-empty range in a 32-bit address space bounded inclusively below and above.
///
/// Enforces the invariant that `self.start() <= self.end()`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct AddressRange {
    start: u32,
    end: u32,
}

impl fmt::Display for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:#x}, {:#x}]", self.start, self.end)
    }
}

impl AddressRange {
    pub fn new(start: u32, end: u32) -> Result<Self, InvalidBoundsError> {
        (start <= end)
            .then_some(Self { start, end })
            .ok_or(InvalidBoundsError { start, end })
    }

    /// Range of `size` bytes starting at `base`.
    ///
    /// Fails if `size` is zero or the range would wrap around the address space.
    pub fn with_size(base: u32, size: u32) -> Result<Self, InvalidBoundsError> {
        let end = size
            .checked_sub(1)
            .and_then(|delta| base.checked_add(delta))
            .ok_or(InvalidBoundsError {
                start: base,
                end: base.wrapping_add(size).wrapping_sub(1),
            })?;
        Self::new(base, end)
    }

    pub fn start(self) -> u32 {
        self.start
    }

    pub fn end(self) -> u32 {
        self.end
    }

    pub fn contains(self, address: u32) -> bool {
        self.start <= address && address <= self.end
    }

    /// Offset of `address` relative to the start of the range, if contained.
    pub fn offset_of(self, address: u32) -> Option<u32> {
        self.contains(address).then(|| address - self.start)
    }

    pub fn overlaps(self, other: Self) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

#[derive(Error, Debug, Clone, Copy, Eq, PartialEq)]
#[error("invalid address range bounds: start {start:#x} > end {end:#x}")]
pub struct InvalidBoundsError {
    start: u32,
    end: u32,
}

/// Shorthand for an [`AddressRange`] with constant bounds. Panics on invalid bounds.
#[macro_export]
macro_rules! address_range {
    [$start:expr, $end:expr] => {
        $crate::address_range::AddressRange::new($start, $end).unwrap()
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_size() {
        let range = AddressRange::with_size(0xde88, 12).unwrap();
        assert_eq!(0xde88, range.start());
        assert_eq!(0xde93, range.end());
        assert_eq!(Some(8), range.offset_of(0xde90));
        assert_eq!(None, range.offset_of(0xde94));
        assert!(AddressRange::with_size(0, 0).is_err());
        assert!(AddressRange::with_size(0xffff_fff0, 0x20).is_err());
    }

    #[test]
    fn test_overlaps() {
        let a = address_range![0x0, 0xffff];
        assert!(a.overlaps(address_range![0xffff, 0x1_0000]));
        assert!(!a.overlaps(address_range![0x1_0000, 0x1_0003]));
        assert!(AddressRange::new(4, 3).is_err());
    }
}
