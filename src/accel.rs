//! Apple-style accelerator tables (`.apple_names`, `.apple_types`,
//! `.apple_namespaces`, `.apple_objc`).
//!
//! Layout: a fixed header, a header-data block describing the atoms stored
//! per entry, then three parallel arrays of `u32` (bucket -> first hash index,
//! hash values, hash data offsets), then the hash data itself. Each hash data
//! record is a run of `(string offset, count, count * atoms)` ended by a zero
//! string offset.

use std::fmt;

use fallible_iterator::FallibleIterator;
use gimli::constants as gim_con;
use gimli::{DwForm, Format};

use crate::error::{Error, Result};
use crate::form::{FormClass, FormParams, FormValue};
use crate::reader::Reader;

pub const APPLE_HASH_MAGIC: u32 = 0x4841_5348;
pub const EMPTY_BUCKET: u32 = u32::MAX;

pub const DW_ATOM_NULL: u16 = 0;
pub const DW_ATOM_DIE_OFFSET: u16 = 1;
pub const DW_ATOM_CU_OFFSET: u16 = 2;
pub const DW_ATOM_DIE_TAG: u16 = 3;
pub const DW_ATOM_TYPE_FLAGS: u16 = 5;

const HEADER_SIZE: u64 = 20;

fn atom_name(atom: u16) -> Option<&'static str> {
    Some(match atom {
        DW_ATOM_NULL => "DW_ATOM_null",
        DW_ATOM_DIE_OFFSET => "DW_ATOM_die_offset",
        DW_ATOM_CU_OFFSET => "DW_ATOM_cu_offset",
        DW_ATOM_DIE_TAG => "DW_ATOM_die_tag",
        DW_ATOM_TYPE_FLAGS => "DW_ATOM_type_flags",
        _ => return None,
    })
}

/// The classic DJB string hash the tables are keyed by.
pub fn djb_hash(name: &[u8]) -> u32 {
    name.iter()
        .fold(5381u32, |h, &c| h.wrapping_mul(33).wrapping_add(u32::from(c)))
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct AccelHeader {
    pub magic: u32,
    pub version: u16,
    pub hash_function: u16,
    pub bucket_count: u32,
    pub hashes_count: u32,
    pub header_data_length: u32,
}

/// One name in a hash data record, with the DIE offsets stored under it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AccelName {
    pub string_offset: u64,
    pub die_offsets: Vec<u64>,
}

/// Everything stored under one hash value.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HashEntry {
    pub bucket: u32,
    pub hash_index: u32,
    pub hash: u32,
    pub names: Vec<AccelName>,
}

#[derive(Clone, Debug)]
pub struct AcceleratorTable<'a> {
    reader: Reader<'a>,
    strings: &'a [u8],
    header: AccelHeader,
    die_offset_base: u32,
    atoms: Vec<(u16, DwForm)>,
}

impl<'a> AcceleratorTable<'a> {
    /// Reads the header and atom descriptions. Fails if the section is too
    /// short to hold the header or the three fixed-stride arrays it
    /// announces.
    pub fn extract(reader: Reader<'a>, strings: &'a [u8]) -> Result<Self> {
        if !reader.is_valid_offset_for_data_of_size(0, HEADER_SIZE) {
            return Err(Error::TruncatedSection {
                offset: 0,
                size: reader.len(),
            });
        }
        let mut offset = 0;
        let header = AccelHeader {
            magic: reader.u32(&mut offset)?,
            version: reader.u16(&mut offset)?,
            hash_function: reader.u16(&mut offset)?,
            bucket_count: reader.u32(&mut offset)?,
            hashes_count: reader.u32(&mut offset)?,
            header_data_length: reader.u32(&mut offset)?,
        };
        let tables = HEADER_SIZE
            + u64::from(header.header_data_length)
            + u64::from(header.bucket_count) * 4
            + u64::from(header.hashes_count) * 8;
        if !reader.is_valid_offset_for_data_of_size(0, tables) {
            return Err(Error::MalformedHeader {
                offset: 0,
                reason: "accelerator table arrays run past the end of the section",
            });
        }

        let die_offset_base = reader.u32(&mut offset)?;
        let atom_count = reader.u32(&mut offset)?;
        // Atoms live inside the header data.
        if u64::from(atom_count) * 4 + 8 > u64::from(header.header_data_length) {
            return Err(Error::MalformedHeader {
                offset: HEADER_SIZE,
                reason: "more atoms than fit in the header data",
            });
        }
        let mut atoms = Vec::with_capacity(atom_count as usize);
        for _ in 0..atom_count {
            let atom = reader.u16(&mut offset)?;
            let form = DwForm(reader.u16(&mut offset)?);
            atoms.push((atom, form));
        }

        Ok(Self {
            reader,
            strings,
            header,
            die_offset_base,
            atoms,
        })
    }

    pub fn header(&self) -> &AccelHeader {
        &self.header
    }

    pub fn die_offset_base(&self) -> u32 {
        self.die_offset_base
    }

    pub fn atoms(&self) -> &[(u16, DwForm)] {
        &self.atoms
    }

    fn buckets_offset(&self) -> u64 {
        HEADER_SIZE + u64::from(self.header.header_data_length)
    }

    fn hashes_offset(&self) -> u64 {
        self.buckets_offset() + u64::from(self.header.bucket_count) * 4
    }

    fn offsets_offset(&self) -> u64 {
        self.hashes_offset() + u64::from(self.header.hashes_count) * 4
    }

    /// The first hash index of bucket `index`, or [`EMPTY_BUCKET`].
    pub fn bucket(&self, index: u32) -> Option<u32> {
        if index >= self.header.bucket_count {
            return None;
        }
        let mut offset = self.buckets_offset() + u64::from(index) * 4;
        self.reader.u32(&mut offset).ok()
    }

    pub fn hash(&self, index: u32) -> Option<u32> {
        if index >= self.header.hashes_count {
            return None;
        }
        let mut offset = self.hashes_offset() + u64::from(index) * 4;
        self.reader.u32(&mut offset).ok()
    }

    pub fn hash_data_offset(&self, index: u32) -> Option<u64> {
        if index >= self.header.hashes_count {
            return None;
        }
        let mut offset = self.offsets_offset() + u64::from(index) * 4;
        self.reader.u32(&mut offset).ok().map(u64::from)
    }

    /// Every `DW_ATOM_die_offset` atom must be an unsigned constant.
    pub fn validate_forms(&self) -> bool {
        self.atoms.iter().all(|&(atom, form)| {
            atom != DW_ATOM_DIE_OFFSET
                || ((crate::form::is_form_class(form, FormClass::Constant)
                    || crate::form::is_form_class(form, FormClass::Flag))
                    && form != gim_con::DW_FORM_sdata)
        })
    }

    fn form_params(&self) -> FormParams {
        FormParams {
            version: 2,
            address_size: self.reader.address_size(),
            format: Format::Dwarf32,
        }
    }

    /// Reads one data object (one value per atom) and returns its DIE
    /// offset, if one of the atoms carries it.
    pub fn read_atoms(&self, offset: &mut u64) -> Result<Option<u64>> {
        let params = self.form_params();
        let mut die_offset = None;
        for &(atom, form) in &self.atoms {
            let value = FormValue::extract(form, &self.reader, offset, params, None)?;
            if atom == DW_ATOM_DIE_OFFSET {
                die_offset = value.as_unsigned();
            }
        }
        Ok(die_offset)
    }

    /// Reads the hash data record at `offset`.
    pub fn hash_data(&self, offset: u64) -> Result<Vec<AccelName>> {
        let mut offset = offset;
        let mut names = vec![];
        while self.reader.is_valid_offset_for_data_of_size(offset, 4) {
            let string_offset = self.reader.relocated(4, &mut offset)?;
            if string_offset == 0 {
                break;
            }
            let at = offset;
            let count = u64::from(self.reader.u32(&mut offset)?);
            if !self.atoms.is_empty() && count > self.reader.len() - offset {
                return Err(Error::MalformedHeader {
                    offset: at,
                    reason: "hash data count exceeds the section",
                });
            }
            let mut die_offsets = vec![];
            if !self.atoms.is_empty() {
                for _ in 0..count {
                    if let Some(die) = self.read_atoms(&mut offset)? {
                        die_offsets.push(die);
                    }
                }
            }
            names.push(AccelName {
                string_offset,
                die_offsets,
            });
        }
        Ok(names)
    }

    /// Looks up the name stored at `string_offset` in the string section.
    pub fn string_at(&self, string_offset: u64) -> Option<&'a [u8]> {
        let start = usize::try_from(string_offset).ok()?;
        let tail = self.strings.get(start..)?;
        let len = tail.iter().position(|&b| b == 0)?;
        Some(&tail[..len])
    }

    /// Walks every bucket and its hash chain.
    pub fn entries(&self) -> HashEntries<'_, 'a> {
        HashEntries {
            table: self,
            bucket: 0,
            next_hash: None,
        }
    }

    /// DIE offsets stored under `name`.
    pub fn find(&self, name: &str) -> Result<Vec<u64>> {
        let n = self.header.bucket_count;
        if n == 0 {
            return Ok(vec![]);
        }
        let hash = djb_hash(name.as_bytes());
        let bucket = hash % n;
        let mut index = match self.bucket(bucket) {
            Some(EMPTY_BUCKET) | None => return Ok(vec![]),
            Some(i) => i,
        };
        let mut out = vec![];
        while let Some(h) = self.hash(index) {
            if h % n != bucket {
                break;
            }
            if h == hash {
                let data = self.hash_data_offset(index).unwrap_or(0);
                for entry in self.hash_data(data)? {
                    if self.string_at(entry.string_offset) == Some(name.as_bytes()) {
                        out.extend(entry.die_offsets);
                    }
                }
            }
            index += 1;
        }
        Ok(out)
    }
}

/// Iterator over the hash entries of a table, bucket by bucket. Each
/// bucket's chain ends at the first hash belonging to another bucket, so
/// the walk never visits more than `hashes_count` entries per bucket.
pub struct HashEntries<'t, 'a> {
    table: &'t AcceleratorTable<'a>,
    bucket: u32,
    next_hash: Option<u32>,
}

impl FallibleIterator for HashEntries<'_, '_> {
    type Item = HashEntry;
    type Error = Error;

    fn next(&mut self) -> Result<Option<HashEntry>> {
        let n = self.table.header.bucket_count;
        loop {
            match self.next_hash {
                None => {
                    if self.bucket >= n {
                        return Ok(None);
                    }
                    match self.table.bucket(self.bucket) {
                        Some(EMPTY_BUCKET) | None => self.bucket += 1,
                        Some(index) => self.next_hash = Some(index),
                    }
                }
                Some(index) => {
                    let hash = match self.table.hash(index) {
                        Some(h) if h % n == self.bucket => h,
                        _ => {
                            self.next_hash = None;
                            self.bucket += 1;
                            continue;
                        }
                    };
                    self.next_hash = index.checked_add(1);
                    if self.next_hash.is_none() {
                        self.bucket += 1;
                    }
                    let offset = self.table.hash_data_offset(index).unwrap_or(0);
                    let names = self.table.hash_data(offset)?;
                    return Ok(Some(HashEntry {
                        bucket: hash % n,
                        hash_index: index,
                        hash,
                        names,
                    }));
                }
            }
        }
    }
}

impl fmt::Display for AcceleratorTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let h = &self.header;
        writeln!(f, "Magic = {:#010x}", h.magic)?;
        writeln!(f, "Version = {:#06x}", h.version)?;
        writeln!(f, "Hash function = {:#010x}", h.hash_function)?;
        writeln!(f, "Bucket count = {}", h.bucket_count)?;
        writeln!(f, "Hashes count = {}", h.hashes_count)?;
        writeln!(f, "HeaderData length = {}", h.header_data_length)?;
        writeln!(f, "DIE offset base = {}", self.die_offset_base)?;
        writeln!(f, "Number of atoms = {}", self.atoms.len())?;
        for (i, (atom, form)) in self.atoms.iter().enumerate() {
            match atom_name(*atom) {
                Some(name) => write!(f, "Atom[{}] Type: {}", i, name)?,
                None => write!(f, "Atom[{}] Type: DW_ATOM_Unknown_{:#x}", i, atom)?,
            }
            writeln!(f, " Form: {}", form)?;
        }
        let mut entries = self.entries();
        loop {
            match entries.next() {
                Ok(Some(entry)) => {
                    writeln!(
                        f,
                        "Bucket[{}] Hash = {:#010x}",
                        entry.bucket, entry.hash
                    )?;
                    for name in &entry.names {
                        let s = self.string_at(name.string_offset).unwrap_or(b"<NULL>");
                        writeln!(
                            f,
                            "    Name: {:08x} \"{}\"",
                            name.string_offset,
                            String::from_utf8_lossy(s)
                        )?;
                        for (i, die) in name.die_offsets.iter().enumerate() {
                            writeln!(f, "    Data[{}] => {:#010x}", i, die)?;
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    writeln!(f, "    error: {}", e)?;
                    break;
                }
            }
        }
        Ok(())
    }
}
