//! Location lists (`.debug_loc` and the split `.debug_loc.dwo` form).

use std::fmt;

use crate::error::{Error, ErrorPolicy, Result};
use crate::reader::Reader;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LocationListEntry {
    pub begin: u64,
    pub end: u64,
    pub expr: Vec<u8>,
}

/// A list of address ranges with the location expression valid in each.
/// `offset` is where the list starts, which is what `DW_AT_location` holds.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LocationList {
    pub offset: u64,
    pub entries: Vec<LocationListEntry>,
}

fn write_lists(f: &mut fmt::Formatter<'_>, lists: &[LocationList]) -> fmt::Result {
    for list in lists {
        writeln!(f, "{:#010x}:", list.offset)?;
        for e in &list.entries {
            write!(f, "    [{:#018x}, {:#018x}):", e.begin, e.end)?;
            for b in &e.expr {
                write!(f, " {:02x}", b)?;
            }
            writeln!(f)?;
        }
    }
    Ok(())
}

fn find_list(lists: &[LocationList], offset: u64) -> Option<&LocationList> {
    lists
        .binary_search_by_key(&offset, |l| l.offset)
        .ok()
        .map(|i| &lists[i])
}

/// Parsed `.debug_loc`.
#[derive(Clone, Debug, Default)]
pub struct DebugLoc {
    lists: Vec<LocationList>,
}

impl DebugLoc {
    /// Parses every list in the section. Parsing stops at the first list that
    /// can't be read, since nothing says where the next one starts. The lists
    /// before it are kept unless `on_error` answers [`ErrorPolicy::Halt`], in
    /// which case the table comes back empty.
    pub fn parse(reader: &Reader, mut on_error: impl FnMut(&Error) -> ErrorPolicy) -> Self {
        let mut lists = vec![];
        let mut offset = 0;
        let addr_size = u64::from(reader.address_size());
        while reader.is_valid_offset_for_data_of_size(offset, addr_size) {
            match Self::parse_list(reader, &mut offset) {
                Ok(list) => lists.push(list),
                Err(e) => {
                    if on_error(&e) == ErrorPolicy::Halt {
                        lists.clear();
                    }
                    break;
                }
            }
        }
        tracing::debug!(count = lists.len(), "parsed .debug_loc");
        Self { lists }
    }

    fn parse_list(reader: &Reader, offset: &mut u64) -> Result<LocationList> {
        let start = *offset;
        let mut entries = vec![];
        loop {
            let begin = reader.address(offset)?;
            let end = reader.address(offset)?;
            if begin == 0 && end == 0 {
                break;
            }
            let len = reader.u16(offset)?;
            let expr = reader.bytes(offset, len.into())?.to_vec();
            entries.push(LocationListEntry { begin, end, expr });
        }
        Ok(LocationList {
            offset: start,
            entries,
        })
    }

    pub fn lists(&self) -> &[LocationList] {
        &self.lists
    }

    pub fn find(&self, offset: u64) -> Option<&LocationList> {
        find_list(&self.lists, offset)
    }
}

impl fmt::Display for DebugLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_lists(f, &self.lists)
    }
}

const DW_LLE_END_OF_LIST: u8 = 0;
const DW_LLE_STARTX_LENGTH: u8 = 3;

/// Parsed `.debug_loc.dwo`. Entries there name their start address by index
/// into the skeleton's address pool, so `begin` holds that index and `end` the
/// length of the range.
#[derive(Clone, Debug, Default)]
pub struct DebugLocDwo {
    lists: Vec<LocationList>,
}

impl DebugLocDwo {
    /// Same error handling as [`DebugLoc::parse`].
    pub fn parse(reader: &Reader, mut on_error: impl FnMut(&Error) -> ErrorPolicy) -> Self {
        let mut lists = vec![];
        let mut offset = 0;
        while reader.is_valid_offset(offset) {
            match Self::parse_list(reader, &mut offset) {
                Ok(list) => lists.push(list),
                Err(e) => {
                    if on_error(&e) == ErrorPolicy::Halt {
                        lists.clear();
                    }
                    break;
                }
            }
        }
        tracing::debug!(count = lists.len(), "parsed .debug_loc.dwo");
        Self { lists }
    }

    fn parse_list(reader: &Reader, offset: &mut u64) -> Result<LocationList> {
        let start = *offset;
        let mut entries = vec![];
        loop {
            let kind_at = *offset;
            match reader.u8(offset)? {
                DW_LLE_END_OF_LIST => break,
                DW_LLE_STARTX_LENGTH => {
                    let begin = reader.uleb128(offset)?;
                    let end = u64::from(reader.u32(offset)?);
                    let len = reader.u16(offset)?;
                    let expr = reader.bytes(offset, len.into())?.to_vec();
                    entries.push(LocationListEntry { begin, end, expr });
                }
                _ => {
                    return Err(Error::MalformedHeader {
                        offset: kind_at,
                        reason: "unsupported location list entry kind",
                    })
                }
            }
        }
        Ok(LocationList {
            offset: start,
            entries,
        })
    }

    pub fn lists(&self) -> &[LocationList] {
        &self.lists
    }

    pub fn find(&self, offset: u64) -> Option<&LocationList> {
        find_list(&self.lists, offset)
    }
}

impl fmt::Display for DebugLocDwo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_lists(f, &self.lists)
    }
}
