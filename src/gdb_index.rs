//! The `.gdb_index` section: a name and address index over the compile
//! units, emitted by linkers and `gdb-add-index`.
//!
//! The section is always little endian. A 24 byte header gives the offsets of
//! five areas, which follow each other in order: the CU list, the type unit
//! list, the address area, the symbol hash table, and the constant pool that
//! the symbol table points into for names and CU vectors.

use std::fmt;

use crate::error::{Error, Result};
use crate::reader::Reader;

const HEADER_SIZE: u64 = 24;
const CU_ENTRY_SIZE: u64 = 16;
const TU_ENTRY_SIZE: u64 = 24;
const ADDRESS_ENTRY_SIZE: u64 = 20;
const SYMBOL_SLOT_SIZE: u64 = 8;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CompUnitEntry {
    pub offset: u64,
    pub length: u64,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TypeUnitEntry {
    pub offset: u64,
    pub type_offset: u64,
    pub type_signature: u64,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct AddressEntry {
    pub low: u64,
    pub high: u64,
    /// Index into the CU list.
    pub cu_index: u32,
}

/// A filled slot of the symbol hash table.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SymbolEntry {
    pub slot: u32,
    pub name_offset: u32,
    pub vec_offset: u32,
    pub name: String,
    /// Raw CU vector values. The low 24 bits index the CU list (type units
    /// follow the compile units); the high byte holds symbol attributes.
    pub cu_vector: Vec<u32>,
}

impl SymbolEntry {
    /// The CU list indices, without the attribute bits.
    pub fn unit_indices(&self) -> impl Iterator<Item = u32> + '_ {
        self.cu_vector.iter().map(|v| v & 0x00ff_ffff)
    }
}

/// The hash `.gdb_index` version 5 and later key symbols by.
pub fn gdb_index_hash(name: &[u8]) -> u32 {
    name.iter().fold(0u32, |r, &c| {
        r.wrapping_mul(67)
            .wrapping_add(u32::from(c.to_ascii_lowercase()))
            .wrapping_sub(113)
    })
}

#[derive(Clone, Debug, Default)]
pub struct GdbIndex {
    version: u32,
    cu_list_offset: u32,
    tu_list_offset: u32,
    address_area_offset: u32,
    symbol_table_offset: u32,
    constant_pool_offset: u32,
    compile_units: Vec<CompUnitEntry>,
    type_units: Vec<TypeUnitEntry>,
    addresses: Vec<AddressEntry>,
    /// Number of slots in the hash table, filled or not.
    symbol_table_size: u32,
    symbols: Vec<SymbolEntry>,
}

impl GdbIndex {
    /// Parses the section. An empty section gives an empty index.
    pub fn parse(reader: &Reader) -> Result<Self> {
        if reader.is_empty() {
            return Ok(Self::default());
        }
        let mut offset = 0;
        let version = reader.u32(&mut offset)?;
        // Versions before 7 hash names differently and lack symbol
        // attributes; 8 only changed how gdb treats the contents.
        if !(7..=8).contains(&version) {
            return Err(Error::UnsupportedVersion {
                version: version as u16,
                offset: 0,
            });
        }
        let cu_list_offset = reader.u32(&mut offset)?;
        let tu_list_offset = reader.u32(&mut offset)?;
        let address_area_offset = reader.u32(&mut offset)?;
        let symbol_table_offset = reader.u32(&mut offset)?;
        let constant_pool_offset = reader.u32(&mut offset)?;

        let areas = [
            cu_list_offset,
            tu_list_offset,
            address_area_offset,
            symbol_table_offset,
            constant_pool_offset,
        ];
        let ordered = u64::from(cu_list_offset) >= HEADER_SIZE
            && areas.windows(2).all(|w| w[0] <= w[1])
            && u64::from(constant_pool_offset) <= reader.len();
        if !ordered {
            return Err(Error::MalformedHeader {
                offset: 0,
                reason: "gdb index areas are out of order or out of bounds",
            });
        }

        let mut offset = u64::from(cu_list_offset);
        let count = u64::from(tu_list_offset - cu_list_offset) / CU_ENTRY_SIZE;
        let mut compile_units = Vec::with_capacity(count as usize);
        for _ in 0..count {
            compile_units.push(CompUnitEntry {
                offset: reader.u64(&mut offset)?,
                length: reader.u64(&mut offset)?,
            });
        }

        let mut offset = u64::from(tu_list_offset);
        let count = u64::from(address_area_offset - tu_list_offset) / TU_ENTRY_SIZE;
        let mut type_units = Vec::with_capacity(count as usize);
        for _ in 0..count {
            type_units.push(TypeUnitEntry {
                offset: reader.u64(&mut offset)?,
                type_offset: reader.u64(&mut offset)?,
                type_signature: reader.u64(&mut offset)?,
            });
        }

        let mut offset = u64::from(address_area_offset);
        let count = u64::from(symbol_table_offset - address_area_offset) / ADDRESS_ENTRY_SIZE;
        let mut addresses = Vec::with_capacity(count as usize);
        for _ in 0..count {
            addresses.push(AddressEntry {
                low: reader.u64(&mut offset)?,
                high: reader.u64(&mut offset)?,
                cu_index: reader.u32(&mut offset)?,
            });
        }

        let pool = u64::from(constant_pool_offset);
        let mut offset = u64::from(symbol_table_offset);
        let slots = u64::from(constant_pool_offset - symbol_table_offset) / SYMBOL_SLOT_SIZE;
        let mut symbols = vec![];
        for slot in 0..slots as u32 {
            let name_offset = reader.u32(&mut offset)?;
            let vec_offset = reader.u32(&mut offset)?;
            if name_offset == 0 && vec_offset == 0 {
                continue;
            }
            let mut at = pool + u64::from(name_offset);
            let name = String::from_utf8_lossy(reader.cstr(&mut at)?).into_owned();
            let mut at = pool + u64::from(vec_offset);
            let len = reader.u32(&mut at)?;
            // Every value takes four bytes, which bounds the count.
            if !reader.is_valid_offset_for_data_of_size(at, u64::from(len) * 4) {
                return Err(Error::TruncatedSection {
                    offset: at,
                    size: u64::from(len) * 4,
                });
            }
            let cu_vector = (0..len)
                .map(|_| reader.u32(&mut at))
                .collect::<Result<Vec<_>>>()?;
            symbols.push(SymbolEntry {
                slot,
                name_offset,
                vec_offset,
                name,
                cu_vector,
            });
        }

        tracing::debug!(
            version,
            units = compile_units.len(),
            types = type_units.len(),
            addresses = addresses.len(),
            symbols = symbols.len(),
            "parsed .gdb_index"
        );
        Ok(Self {
            version,
            cu_list_offset,
            tu_list_offset,
            address_area_offset,
            symbol_table_offset,
            constant_pool_offset,
            compile_units,
            type_units,
            addresses,
            symbol_table_size: slots as u32,
            symbols,
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn is_empty(&self) -> bool {
        self.version == 0
    }

    pub fn compile_units(&self) -> &[CompUnitEntry] {
        &self.compile_units
    }

    pub fn type_units(&self) -> &[TypeUnitEntry] {
        &self.type_units
    }

    pub fn addresses(&self) -> &[AddressEntry] {
        &self.addresses
    }

    pub fn symbols(&self) -> &[SymbolEntry] {
        &self.symbols
    }

    /// The compile unit covering `address`, from the address area.
    pub fn compile_unit_for_address(&self, address: u64) -> Option<&CompUnitEntry> {
        let entry = self
            .addresses
            .iter()
            .find(|a| a.low <= address && address < a.high)?;
        self.compile_units.get(entry.cu_index as usize)
    }

    /// Looks `name` up in the symbol hash table. The table is open addressed
    /// with a step derived from the hash, so the probe visits each slot at
    /// most once.
    pub fn find(&self, name: &str) -> Option<&SymbolEntry> {
        let size = self.symbol_table_size;
        if size == 0 || !size.is_power_of_two() {
            return self.symbols.iter().find(|s| s.name == name);
        }
        let mask = size - 1;
        let hash = gdb_index_hash(name.as_bytes());
        let step = (hash.wrapping_mul(17) & mask) | 1;
        let mut slot = hash & mask;
        for _ in 0..size {
            let entry = self.symbols.binary_search_by_key(&slot, |s| s.slot).ok()?;
            let entry = &self.symbols[entry];
            if entry.name == name {
                return Some(entry);
            }
            slot = (slot + step) & mask;
        }
        None
    }
}

impl fmt::Display for GdbIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  Version = {}", self.version)?;

        writeln!(
            f,
            "\n  CU list offset = {:#x}, has {} entries:",
            self.cu_list_offset,
            self.compile_units.len()
        )?;
        for (i, cu) in self.compile_units.iter().enumerate() {
            writeln!(f, "    {}: Offset = {:#x}, Length = {:#x}", i, cu.offset, cu.length)?;
        }

        writeln!(
            f,
            "\n  Types CU list offset = {:#x}, has {} entries:",
            self.tu_list_offset,
            self.type_units.len()
        )?;
        for (i, tu) in self.type_units.iter().enumerate() {
            writeln!(
                f,
                "    {}: offset = {:#010x}, type_offset = {:#010x}, type_signature = {:#018x}",
                i, tu.offset, tu.type_offset, tu.type_signature
            )?;
        }

        writeln!(
            f,
            "\n  Address area offset = {:#x}, has {} entries:",
            self.address_area_offset,
            self.addresses.len()
        )?;
        for a in &self.addresses {
            writeln!(
                f,
                "    Low/High address = [{:#x}, {:#x}) (Size: {:#x}), CU id = {}",
                a.low,
                a.high,
                a.high.wrapping_sub(a.low),
                a.cu_index
            )?;
        }

        writeln!(
            f,
            "\n  Symbol table offset = {:#x}, size = {}, filled slots:",
            self.symbol_table_offset, self.symbol_table_size
        )?;
        for s in &self.symbols {
            write!(f, "    {}: {}, CU vector:", s.slot, s.name)?;
            for v in &s.cu_vector {
                write!(f, " {:#x}", v)?;
            }
            writeln!(f)?;
        }

        writeln!(f, "\n  Constant pool offset = {:#x}", self.constant_pool_offset)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testutil;
    use gimli::RunTimeEndian;

    fn parse(data: &[u8]) -> Result<GdbIndex> {
        GdbIndex::parse(&Reader::new(data, RunTimeEndian::Little, 8))
    }

    #[test]
    fn units_addresses_and_symbols() {
        let data = testutil::gdb_index(&[("main", 0), ("helper", 1)]);
        let index = parse(&data).unwrap();
        assert_eq!(index.version(), 7);
        assert_eq!(
            index.compile_units(),
            &[
                CompUnitEntry {
                    offset: 0,
                    length: 0x40
                },
                CompUnitEntry {
                    offset: 0x40,
                    length: 0x30
                },
            ]
        );
        assert_eq!(index.type_units().len(), 1);
        assert_eq!(index.type_units()[0].type_signature, 0xfeed);
        assert_eq!(index.compile_unit_for_address(0x1010).map(|c| c.offset), Some(0x40));
        assert_eq!(index.compile_unit_for_address(0x3000), None);

        assert_eq!(index.symbols().len(), 2);
        let main = index.find("main").unwrap();
        assert_eq!(main.unit_indices().collect::<Vec<_>>(), vec![0]);
        // Symbol attribute bits are kept in the raw vector.
        assert_eq!(main.cu_vector, vec![0x3000_0000]);
        assert_eq!(index.find("HELPER"), None);
        assert_eq!(index.find("helper").map(|s| s.cu_vector.clone()), Some(vec![0x3000_0001]));
        assert!(index.find("missing").is_none());
        assert!(index.to_string().contains("CU list offset = 0x18, has 2 entries"));
    }

    #[test]
    fn hash_ignores_case() {
        assert_eq!(gdb_index_hash(b"Main"), gdb_index_hash(b"main"));
        assert_eq!(gdb_index_hash(b""), 0);
        assert_eq!(gdb_index_hash(b"a"), u32::from(b'a').wrapping_sub(113));
    }

    #[test]
    fn empty_and_bad_sections() {
        assert!(parse(&[]).unwrap().is_empty());

        let mut data = testutil::gdb_index(&[("main", 0)]);
        data[0..4].copy_from_slice(&4u32.to_le_bytes());
        assert!(matches!(parse(&data), Err(Error::UnsupportedVersion { version: 4, .. })));

        let mut data = testutil::gdb_index(&[("main", 0)]);
        // CU list after the TU list.
        data[4..8].copy_from_slice(&0x100u32.to_le_bytes());
        assert!(matches!(parse(&data), Err(Error::MalformedHeader { .. })));
    }
}
