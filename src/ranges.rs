//! Address ranges and `.debug_ranges` lists.

use std::fmt;

use crate::error::{Error, Result};
use crate::reader::Reader;

/// A half-open address range.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct AddressRange {
    pub low: u64,
    pub high: u64,
}

impl AddressRange {
    pub fn contains(&self, address: u64) -> bool {
        self.low <= address && address < self.high
    }

    pub fn is_empty(&self) -> bool {
        self.low >= self.high
    }
}

impl fmt::Display for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:#x}, {:#x})", self.low, self.high)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RangeListEntry {
    pub start: u64,
    pub end: u64,
}

/// One list from `.debug_ranges`, as written (relative to its base).
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RangeList {
    offset: u64,
    address_size: u8,
    entries: Vec<RangeListEntry>,
}

impl RangeList {
    /// Parses a list starting at `offset` up to and including its `(0, 0)`
    /// terminator.
    pub fn extract(reader: &Reader, offset: &mut u64) -> Result<Self> {
        let start = *offset;
        if !reader.is_valid_offset(start) {
            return Err(Error::OutOfBoundsOffset {
                section: ".debug_ranges",
                offset: start,
                size: reader.len(),
            });
        }
        let address_size = reader.address_size();
        if address_size != 4 && address_size != 8 {
            return Err(Error::MalformedHeader {
                offset: start,
                reason: "unsupported address size for range list",
            });
        }
        let mut entries = vec![];
        loop {
            let begin = reader.address(offset)?;
            let end = reader.address(offset)?;
            if begin == 0 && end == 0 {
                break;
            }
            entries.push(RangeListEntry { start: begin, end });
        }
        Ok(Self {
            offset: start,
            address_size,
            entries,
        })
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn entries(&self) -> &[RangeListEntry] {
        &self.entries
    }

    /// A begin address of all ones marks an entry that sets a new base
    /// address instead of describing a range.
    pub fn is_base_address_selection(&self, entry: &RangeListEntry) -> bool {
        let max = match self.address_size {
            4 => u64::from(u32::MAX),
            _ => u64::MAX,
        };
        entry.start == max
    }

    /// Resolves the list against `base`, applying any base address selection
    /// entries along the way.
    pub fn absolute_ranges(&self, base: Option<u64>) -> Vec<AddressRange> {
        let mut base = base.unwrap_or(0);
        let mut out = vec![];
        for entry in &self.entries {
            if self.is_base_address_selection(entry) {
                base = entry.end;
                continue;
            }
            out.push(AddressRange {
                low: base.wrapping_add(entry.start),
                high: base.wrapping_add(entry.end),
            });
        }
        out
    }
}
