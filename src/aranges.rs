//! Address to compile unit lookup, from `.debug_aranges` with a fallback to
//! the units' own address ranges.

use std::collections::BTreeSet;
use std::ops::Range;

use rangemap::RangeMap;

use crate::context::Context;
use crate::error::{Error, ErrorPolicy, Result};
use crate::ranges::AddressRange;
use crate::reader::{initial_length, Reader};
use crate::section::SectionId;

/// One set from `.debug_aranges`: the ranges belonging to a single unit.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ArangeSet {
    pub offset: u64,
    pub version: u16,
    pub cu_offset: u64,
    pub address_size: u8,
    pub segment_size: u8,
    pub ranges: Vec<AddressRange>,
}

impl ArangeSet {
    pub fn extract(reader: &Reader, offset: &mut u64) -> Result<Self> {
        let start = *offset;
        let (length, format) = initial_length(reader, offset)?;
        let end = offset
            .checked_add(length)
            .filter(|&e| e <= reader.len())
            .ok_or(Error::MalformedHeader {
                offset: start,
                reason: "address range set runs past the end of the section",
            })?;
        let version = reader.u16(offset)?;
        let cu_offset = reader.relocated(format.word_size(), offset)?;
        let address_size = reader.u8(offset)?;
        let segment_size = reader.u8(offset)?;
        if address_size != 4 && address_size != 8 {
            return Err(Error::MalformedHeader {
                offset: start,
                reason: "unsupported address size in address range set",
            });
        }

        // Tuples are aligned to twice the address size, measured from the
        // start of the set.
        let tuple = 2 * u64::from(address_size);
        let header = *offset - start;
        *offset = start + (header + tuple - 1) / tuple * tuple;

        let reader = reader.with_address_size(address_size);
        let mut ranges = vec![];
        while *offset + tuple <= end {
            let low = reader.address(offset)?;
            let len = reader.uint(address_size, offset)?;
            if low == 0 && len == 0 {
                break;
            }
            ranges.push(AddressRange {
                low,
                high: low.wrapping_add(len),
            });
        }
        *offset = end;

        Ok(Self {
            offset: start,
            version,
            cu_offset,
            address_size,
            segment_size,
            ranges,
        })
    }
}

/// Where the set after the one at `offset` would start, going by its length
/// field alone.
fn next_set_offset(reader: &Reader, offset: u64) -> Option<u64> {
    let mut at = offset;
    let (length, _) = initial_length(reader, &mut at).ok()?;
    at.checked_add(length)
}

/// Maps addresses to the offset of the compile unit covering them.
#[derive(Clone, Debug, Default)]
pub struct DebugAranges {
    map: RangeMap<u64, u64>,
}

impl DebugAranges {
    /// Builds the map from `.debug_aranges`, then fills in any compile unit
    /// the section didn't describe by walking its entries.
    ///
    /// A set that can't be read is reported. On [`ErrorPolicy::Continue`] the
    /// walk resumes at the next set; on [`ErrorPolicy::Halt`] the map comes
    /// back empty.
    pub fn generate(ctx: &Context) -> Self {
        let mut aranges = Self::default();
        let mut covered = BTreeSet::new();

        let reader = ctx.section_reader(SectionId::Aranges);
        let mut offset = 0;
        while reader.is_valid_offset(offset) {
            let start = offset;
            match ArangeSet::extract(&reader, &mut offset) {
                Ok(set) => {
                    covered.insert(set.cu_offset);
                    for r in &set.ranges {
                        aranges.append_range(set.cu_offset, r.low, r.high);
                    }
                }
                Err(err) => {
                    if ctx.report(&err) == ErrorPolicy::Halt {
                        return Self::default();
                    }
                    match next_set_offset(&reader, start) {
                        Some(next) if next > start => offset = next,
                        _ => break,
                    }
                }
            }
        }

        for unit in ctx.compile_units() {
            if covered.contains(&unit.offset()) {
                continue;
            }
            let mut ranges = vec![];
            if let Some(die) = unit.unit_die(ctx) {
                ranges = die.address_ranges();
                if ranges.is_empty() {
                    die.collect_children_address_ranges(&mut ranges);
                    if let Some((split_ctx, split)) = unit.split_unit(ctx) {
                        if let Some(split_die) = split.unit_die(split_ctx) {
                            split_die.collect_children_address_ranges(&mut ranges);
                        }
                    }
                }
            }
            tracing::trace!(unit = unit.offset(), count = ranges.len(), "ranges from entries");
            for r in ranges {
                aranges.append_range(unit.offset(), r.low, r.high);
            }
        }
        aranges
    }

    fn append_range(&mut self, cu_offset: u64, low: u64, high: u64) {
        // Empty and inverted ranges cover nothing.
        if low < high {
            self.map.insert(low..high, cu_offset);
        }
    }

    pub fn find_address(&self, address: u64) -> Option<u64> {
        self.map.get(&address).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Range<u64>, &u64)> + '_ {
        self.map.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
