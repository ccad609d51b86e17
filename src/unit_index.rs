//! Package file indexes (`.debug_cu_index` / `.debug_tu_index`).
//!
//! A `.dwp` file concatenates the sections of many `.dwo` files. The index
//! records, per unit, which slice of each section belongs to it, and maps the
//! unit's signature (its DWO id or type signature) to that row through an
//! open-addressed hash table.

use std::fmt;

use gimli::constants as gim_con;
use gimli::DwSectV2;

use crate::error::{Error, Result};
use crate::reader::Reader;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SectionContribution {
    pub offset: u64,
    pub length: u64,
}

impl SectionContribution {
    pub fn contains(&self, offset: u64) -> bool {
        offset >= self.offset && offset - self.offset < self.length
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UnitIndexEntry {
    signature: Option<u64>,
    contributions: Vec<(DwSectV2, SectionContribution)>,
}

impl UnitIndexEntry {
    pub fn signature(&self) -> Option<u64> {
        self.signature
    }

    pub fn contribution(&self, kind: DwSectV2) -> Option<SectionContribution> {
        self.contributions
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, c)| *c)
    }

    pub fn contributions(&self) -> &[(DwSectV2, SectionContribution)] {
        &self.contributions
    }
}

#[derive(Clone, Debug, Default)]
pub struct UnitIndex {
    version: u32,
    columns: Vec<DwSectV2>,
    rows: Vec<UnitIndexEntry>,
    /// (signature, 1-based row) per hash bucket; row 0 marks an empty slot.
    slots: Vec<(u64, u32)>,
}

const HEADER_SIZE: u64 = 16;

impl UnitIndex {
    pub fn parse(reader: &Reader) -> Result<Self> {
        if reader.is_empty() {
            return Ok(Self::default());
        }
        let mut offset = 0;
        let version = reader.u32(&mut offset)?;
        if version != 2 {
            return Err(Error::UnsupportedVersion {
                version: version as u16,
                offset: 0,
            });
        }
        let column_count = u64::from(reader.u32(&mut offset)?);
        let unit_count = u64::from(reader.u32(&mut offset)?);
        let bucket_count = u64::from(reader.u32(&mut offset)?);

        let body = bucket_count
            .checked_mul(12)
            .zip(column_count.checked_mul(4))
            .zip(unit_count.checked_mul(column_count).and_then(|n| n.checked_mul(8)))
            .and_then(|((a, b), c)| a.checked_add(b)?.checked_add(c));
        if !body.map_or(false, |size| reader.is_valid_offset_for_data_of_size(HEADER_SIZE, size)) {
            return Err(Error::MalformedHeader {
                offset: 0,
                reason: "unit index tables run past the end of the section",
            });
        }

        let mut signatures = Vec::with_capacity(bucket_count as usize);
        for _ in 0..bucket_count {
            signatures.push(reader.u64(&mut offset)?);
        }
        let mut slots = Vec::with_capacity(bucket_count as usize);
        for sig in signatures {
            slots.push((sig, reader.u32(&mut offset)?));
        }

        let mut columns = Vec::with_capacity(column_count as usize);
        for _ in 0..column_count {
            let kind = DwSectV2(reader.u32(&mut offset)?);
            if !(gim_con::DW_SECT_V2_INFO.0..=gim_con::DW_SECT_V2_MACRO.0).contains(&kind.0) {
                return Err(Error::MalformedHeader {
                    offset: offset - 4,
                    reason: "unknown section kind in unit index",
                });
            }
            columns.push(kind);
        }

        let mut rows: Vec<UnitIndexEntry> = (0..unit_count)
            .map(|_| UnitIndexEntry {
                signature: None,
                contributions: Vec::with_capacity(columns.len()),
            })
            .collect();
        for row in &mut rows {
            for &kind in &columns {
                let start = u64::from(reader.u32(&mut offset)?);
                row.contributions.push((
                    kind,
                    SectionContribution {
                        offset: start,
                        length: 0,
                    },
                ));
            }
        }
        for row in &mut rows {
            for (_, contribution) in &mut row.contributions {
                contribution.length = u64::from(reader.u32(&mut offset)?);
            }
        }

        for &(sig, row) in &slots {
            if row == 0 {
                continue;
            }
            match rows.get_mut(row as usize - 1) {
                Some(entry) => entry.signature = Some(sig),
                None => {
                    return Err(Error::MalformedHeader {
                        offset: 0,
                        reason: "unit index hash table names a missing row",
                    })
                }
            }
        }

        Ok(Self {
            version,
            columns,
            rows,
            slots,
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn columns(&self) -> &[DwSectV2] {
        &self.columns
    }

    pub fn rows(&self) -> &[UnitIndexEntry] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Looks a signature up through the hash table. The probe sequence is
    /// bounded by the number of buckets.
    pub fn find(&self, signature: u64) -> Option<&UnitIndexEntry> {
        let n = self.slots.len() as u64;
        if n == 0 {
            return None;
        }
        let mut h = signature % n;
        let step = ((signature >> 32) % n) | 1;
        for _ in 0..n {
            let (sig, row) = self.slots[h as usize];
            if row == 0 {
                return None;
            }
            if sig == signature {
                return self.rows.get(row as usize - 1);
            }
            h = (h + step) % n;
        }
        None
    }

    /// Finds the row whose contribution to section `kind` covers `offset`.
    pub fn find_by_offset(&self, kind: DwSectV2, offset: u64) -> Option<&UnitIndexEntry> {
        self.rows.iter().find(|row| {
            row.contribution(kind)
                .map_or(false, |c| c.contains(offset) || (c.length == 0 && c.offset == offset))
        })
    }
}

impl fmt::Display for UnitIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "version = {} slots = {} units = {}",
            self.version,
            self.slots.len(),
            self.rows.len()
        )?;
        for (i, row) in self.rows.iter().enumerate() {
            write!(f, "{:5} {:#018x}", i + 1, row.signature.unwrap_or(0))?;
            for (kind, c) in &row.contributions {
                write!(f, " {}[{:#010x}, {:#010x})", kind, c.offset, c.offset + c.length)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
