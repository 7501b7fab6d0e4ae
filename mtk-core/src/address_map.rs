use crate::AddressRange;
use std::cmp::Ordering;
use thiserror::Error;

/// Generic map of 32-bit address ranges to values of type `T`.
///
/// The ranges cannot overlap. Lookups are a binary search over the ranges sorted by start address.
#[derive(Debug, Clone)]
pub struct AddressMap<T> {
    ordered_ranges: Vec<(AddressRange, T)>,
}

impl<T> Default for AddressMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> AddressMap<T> {
    /// Create new empty map.
    pub fn new() -> Self {
        Self {
            ordered_ranges: Vec::new(),
        }
    }

    /// Add a mapping, rejecting it if `range` overlaps a range already present.
    pub fn insert(&mut self, range: AddressRange, value: T) -> Result<(), AddressMapError> {
        let index = self
            .ordered_ranges
            .partition_point(|(r, _)| r.start() < range.start());
        let clashes = |i: usize| {
            self.ordered_ranges
                .get(i)
                .is_some_and(|(r, _)| r.overlaps(range))
        };
        if clashes(index) || index.checked_sub(1).is_some_and(clashes) {
            return Err(AddressMapError::OverlappingAddressRanges(range));
        }
        self.ordered_ranges.insert(index, (range, value));
        Ok(())
    }

    /// Returns the value that the address range containing `address` maps to, or `None` if that
    /// address is unmapped.
    pub fn value(&self, address: u32) -> Option<&T> {
        self.range_value(address).map(|(_, value)| value)
    }

    /// Returns the range containing `address` together with the value it maps to.
    pub fn range_value(&self, address: u32) -> Option<(AddressRange, &T)> {
        self.ordered_ranges
            .binary_search_by(|(range, _)| {
                if address < range.start() {
                    Ordering::Greater
                } else if address <= range.end() {
                    Ordering::Equal
                } else {
                    Ordering::Less
                }
            })
            .ok()
            .map(|index| {
                let (range, value) = &self.ordered_ranges[index];
                (*range, value)
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = (AddressRange, &T)> {
        self.ordered_ranges.iter().map(|(range, value)| (*range, value))
    }
}

impl<T> TryFrom<Vec<(AddressRange, T)>> for AddressMap<T> {
    type Error = AddressMapError;

    fn try_from(value: Vec<(AddressRange, T)>) -> Result<Self, Self::Error> {
        let mut map = Self::new();
        for (range, value) in value {
            map.insert(range, value)?;
        }
        Ok(map)
    }
}

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum AddressMapError {
    #[error("address range {0} overlaps with previously added address range")]
    OverlappingAddressRanges(AddressRange),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address_range;

    #[test]
    fn test_lookup() {
        let map = AddressMap::try_from(vec![
            (address_range![0xde88, 0xde93], "progbuf"),
            (address_range![0x0, 0xde87], "ram"),
            (address_range![0xde94, 0xffff], "ram"),
        ])
        .unwrap();
        assert_eq!(Some(&"ram"), map.value(0x0));
        assert_eq!(Some(&"ram"), map.value(0xde87));
        assert_eq!(Some(&"progbuf"), map.value(0xde88));
        assert_eq!(Some(&"progbuf"), map.value(0xde93));
        assert_eq!(Some(&"ram"), map.value(0xde94));
        assert_eq!(None, map.value(0x1_0000));
    }

    #[test]
    fn test_overlap_rejected() {
        let mut map = AddressMap::new();
        map.insert(address_range![0x100, 0x1ff], 1).unwrap();
        assert!(map.insert(address_range![0x0, 0x100], 2).is_err());
        assert!(map.insert(address_range![0x1ff, 0x2ff], 3).is_err());
        assert!(map.insert(address_range![0x200, 0x2ff], 4).is_ok());
        assert_eq!(2, map.iter().count());
    }
}
