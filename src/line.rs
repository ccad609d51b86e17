//! Line number programs (`.debug_line`), versions 2 through 5.

use std::fmt;
use std::path::{Path, PathBuf};

use gimli::constants as gim_con;
use gimli::{DwForm, DwLne, DwLnct, DwLns, Format};

use crate::error::{Error, Result};
use crate::form::{FormParams, FormValue};
use crate::lookup::{FileLineInfoKind, LineInfo};
use crate::reader::{initial_length, Reader};

/// String sections a v5 line table header may point into.
#[derive(Copy, Clone, Debug, Default)]
pub struct LineStrings<'a> {
    pub str: &'a [u8],
    pub line_str: &'a [u8],
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FileEntry {
    pub name: String,
    pub dir_index: u64,
    pub mod_time: u64,
    pub length: u64,
    pub md5: Option<[u8; 16]>,
}

#[derive(Clone, Debug)]
pub struct Prologue {
    pub offset: u64,
    pub total_length: u64,
    pub format: Format,
    pub version: u16,
    pub address_size: Option<u8>,
    pub segment_selector_size: u8,
    pub prologue_length: u64,
    pub min_inst_length: u8,
    pub max_ops_per_inst: u8,
    pub default_is_stmt: bool,
    pub line_base: i8,
    pub line_range: u8,
    pub opcode_base: u8,
    pub standard_opcode_lengths: Vec<u8>,
    pub include_directories: Vec<String>,
    pub file_names: Vec<FileEntry>,
}

fn cstring(data: &[u8], offset: u64) -> Option<String> {
    let start = usize::try_from(offset).ok()?;
    let tail = data.get(start..)?;
    let len = tail.iter().position(|&b| b == 0)?;
    Some(String::from_utf8_lossy(&tail[..len]).into_owned())
}

fn form_string(value: &FormValue, strings: &LineStrings) -> Option<String> {
    match value.form() {
        gim_con::DW_FORM_string => value.as_str().map(|s| s.into_owned()),
        gim_con::DW_FORM_strp => cstring(strings.str, value.raw_uvalue()?),
        gim_con::DW_FORM_line_strp => cstring(strings.line_str, value.raw_uvalue()?),
        _ => None,
    }
}

impl Prologue {
    pub fn parse(reader: &Reader, offset: &mut u64, strings: &LineStrings) -> Result<Self> {
        let start = *offset;
        let (total_length, format) = initial_length(reader, offset)?;
        let end = offset
            .checked_add(total_length)
            .filter(|&e| e <= reader.len())
            .ok_or(Error::MalformedHeader {
                offset: start,
                reason: "line table runs past the end of the section",
            })?;
        let version = reader.u16(offset)?;
        if !(2..=5).contains(&version) {
            return Err(Error::UnsupportedVersion {
                version,
                offset: start,
            });
        }
        let (address_size, segment_selector_size) = if version >= 5 {
            (Some(reader.u8(offset)?), reader.u8(offset)?)
        } else {
            (None, 0)
        };
        let prologue_length = reader.uint(format.word_size(), offset)?;
        let program_start = offset
            .checked_add(prologue_length)
            .filter(|&p| p <= end)
            .ok_or(Error::MalformedHeader {
                offset: start,
                reason: "line table header is longer than the table",
            })?;

        let min_inst_length = reader.u8(offset)?;
        let max_ops_per_inst = if version >= 4 { reader.u8(offset)? } else { 1 };
        let default_is_stmt = reader.u8(offset)? != 0;
        let line_base = reader.i8(offset)?;
        let line_range = reader.u8(offset)?;
        let opcode_base = reader.u8(offset)?;
        if line_range == 0 {
            return Err(Error::MalformedHeader {
                offset: start,
                reason: "line range of zero",
            });
        }
        if opcode_base == 0 {
            return Err(Error::MalformedHeader {
                offset: start,
                reason: "opcode base of zero",
            });
        }
        let standard_opcode_lengths = reader
            .bytes(offset, u64::from(opcode_base - 1))?
            .to_vec();

        let mut prologue = Self {
            offset: start,
            total_length,
            format,
            version,
            address_size,
            segment_selector_size,
            prologue_length,
            min_inst_length,
            max_ops_per_inst,
            default_is_stmt,
            line_base,
            line_range,
            opcode_base,
            standard_opcode_lengths,
            include_directories: vec![],
            file_names: vec![],
        };

        if version >= 5 {
            let params = FormParams {
                version,
                address_size: address_size.unwrap_or_else(|| reader.address_size()),
                format,
            };
            prologue.include_directories = parse_v5_entries(reader, offset, params, strings)?
                .into_iter()
                .map(|e| e.name)
                .collect();
            prologue.file_names = parse_v5_entries(reader, offset, params, strings)?;
        } else {
            loop {
                let dir = reader.cstr(offset)?;
                if dir.is_empty() {
                    break;
                }
                prologue
                    .include_directories
                    .push(String::from_utf8_lossy(dir).into_owned());
            }
            loop {
                let name = reader.cstr(offset)?;
                if name.is_empty() {
                    break;
                }
                let name = String::from_utf8_lossy(name).into_owned();
                prologue.file_names.push(FileEntry {
                    name,
                    dir_index: reader.uleb128(offset)?,
                    mod_time: reader.uleb128(offset)?,
                    length: reader.uleb128(offset)?,
                    md5: None,
                });
            }
        }

        if *offset != program_start {
            return Err(Error::MalformedHeader {
                offset: start,
                reason: "line table header length disagrees with its contents",
            });
        }
        Ok(prologue)
    }

    pub fn end_offset(&self) -> u64 {
        let length_field = match self.format {
            Format::Dwarf32 => 4,
            Format::Dwarf64 => 12,
        };
        self.offset + length_field + self.total_length
    }

    pub fn has_file_at_index(&self, index: u64) -> bool {
        if self.version >= 5 {
            index < self.file_names.len() as u64
        } else {
            index != 0 && index <= self.file_names.len() as u64
        }
    }

    /// File entries are 1-based before DWARF 5 and 0-based from then on.
    pub fn file_entry(&self, index: u64) -> Option<&FileEntry> {
        if !self.has_file_at_index(index) {
            return None;
        }
        let i = if self.version >= 5 { index } else { index - 1 };
        self.file_names.get(i as usize)
    }

    fn include_directory(&self, index: u64) -> Option<&str> {
        let i = if self.version >= 5 {
            index
        } else {
            index.checked_sub(1)?
        };
        self.include_directories.get(i as usize).map(String::as_str)
    }

    /// Builds the name of file `index`, optionally made absolute with its
    /// include directory and the unit's compilation directory.
    pub fn file_name_by_index(
        &self,
        index: u64,
        comp_dir: Option<&str>,
        kind: FileLineInfoKind,
    ) -> Option<String> {
        if kind == FileLineInfoKind::None {
            return None;
        }
        let entry = self.file_entry(index)?;
        if kind != FileLineInfoKind::AbsoluteFilePath || Path::new(&entry.name).is_absolute() {
            return Some(entry.name.clone());
        }
        let include_dir = self.include_directory(entry.dir_index).unwrap_or("");
        // Directory 0 of a DWARF 5 table is the compilation directory.
        let comp_dir = match comp_dir {
            None if self.version >= 5 && entry.dir_index != 0 => self.include_directory(0),
            dir => dir,
        };
        let mut path = PathBuf::new();
        if let Some(dir) = comp_dir {
            if Path::new(include_dir).is_relative() && !dir.is_empty() {
                path.push(dir);
            }
        }
        if !include_dir.is_empty() {
            path.push(include_dir);
        }
        path.push(&entry.name);
        Some(path.to_string_lossy().into_owned())
    }
}

fn parse_v5_entries(
    reader: &Reader,
    offset: &mut u64,
    params: FormParams,
    strings: &LineStrings,
) -> Result<Vec<FileEntry>> {
    let format_count = reader.u8(offset)?;
    let mut formats = Vec::with_capacity(format_count.into());
    for _ in 0..format_count {
        let at = *offset;
        let content = reader.uleb128(offset)?;
        let form = reader.uleb128(offset)?;
        match (u16::try_from(content), u16::try_from(form)) {
            (Ok(c), Ok(f)) => formats.push((DwLnct(c), DwForm(f))),
            _ => {
                return Err(Error::MalformedHeader {
                    offset: at,
                    reason: "entry format code out of range",
                })
            }
        }
    }

    let count = reader.uleb128(offset)?;
    let mut entries = vec![];
    for _ in 0..count {
        let mut entry = FileEntry::default();
        for &(content, form) in &formats {
            let value = FormValue::extract(form, reader, offset, params, None)?;
            match content {
                gim_con::DW_LNCT_path => {
                    entry.name = form_string(&value, strings).unwrap_or_default();
                }
                gim_con::DW_LNCT_directory_index => {
                    entry.dir_index = value.as_unsigned().unwrap_or(0);
                }
                gim_con::DW_LNCT_timestamp => {
                    entry.mod_time = value.as_unsigned().unwrap_or(0);
                }
                gim_con::DW_LNCT_size => {
                    entry.length = value.as_unsigned().unwrap_or(0);
                }
                gim_con::DW_LNCT_MD5 => {
                    entry.md5 = value.as_block().and_then(|b| b.try_into().ok());
                }
                _ => {}
            }
        }
        entries.push(entry);
    }
    Ok(entries)
}

/// One row of the line number matrix.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Row {
    pub address: u64,
    pub line: u32,
    pub column: u16,
    pub file: u16,
    pub discriminator: u32,
    pub isa: u8,
    pub is_stmt: bool,
    pub basic_block: bool,
    pub end_sequence: bool,
    pub prologue_end: bool,
    pub epilogue_begin: bool,
}

impl Row {
    fn new(default_is_stmt: bool) -> Self {
        Self {
            address: 0,
            line: 1,
            column: 0,
            file: 1,
            discriminator: 0,
            isa: 0,
            is_stmt: default_is_stmt,
            basic_block: false,
            end_sequence: false,
            prologue_end: false,
            epilogue_begin: false,
        }
    }

    fn post_append(&mut self) {
        self.discriminator = 0;
        self.basic_block = false;
        self.prologue_end = false;
        self.epilogue_begin = false;
    }
}

/// A contiguous run of rows with increasing addresses, ended by an
/// end-of-sequence row.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Sequence {
    pub low_pc: u64,
    pub high_pc: u64,
    pub first_row: usize,
    /// One past the end-of-sequence row.
    pub last_row: usize,
}

impl Sequence {
    pub fn contains(&self, address: u64) -> bool {
        self.low_pc <= address && address < self.high_pc
    }
}

#[derive(Clone, Debug)]
pub struct LineTable {
    prologue: Prologue,
    rows: Vec<Row>,
    sequences: Vec<Sequence>,
}

impl LineTable {
    /// Parses the table at `offset` and runs its program. On success
    /// `offset` points just past the table.
    pub fn parse(reader: &Reader, offset: &mut u64, strings: &LineStrings) -> Result<Self> {
        let prologue = Prologue::parse(reader, offset, strings)?;
        let end = prologue.end_offset();
        let mut table = Self {
            prologue,
            rows: vec![],
            sequences: vec![],
        };
        table.run_program(reader, offset, end)?;
        *offset = end;
        table.sequences.sort_by_key(|s| s.low_pc);
        Ok(table)
    }

    fn run_program(&mut self, reader: &Reader, offset: &mut u64, end: u64) -> Result<()> {
        let p = &self.prologue;
        let min_inst = u64::from(p.min_inst_length);
        let line_range = p.line_range;
        let opcode_base = p.opcode_base;
        let line_base = i64::from(p.line_base);
        let default_is_stmt = p.default_is_stmt;

        let mut row = Row::new(default_is_stmt);
        let mut sequence: Option<(u64, usize)> = None;
        let mut rows = vec![];
        let mut sequences = vec![];
        let mut new_files = vec![];

        let mut append = |row: &Row, rows: &mut Vec<Row>| {
            if sequence.is_none() {
                sequence = Some((row.address, rows.len()));
            }
            rows.push(*row);
            if row.end_sequence {
                if let Some((low_pc, first_row)) = sequence.take() {
                    let seq = Sequence {
                        low_pc,
                        high_pc: row.address,
                        first_row,
                        last_row: rows.len(),
                    };
                    if seq.low_pc < seq.high_pc {
                        sequences.push(seq);
                    }
                }
            }
        };

        while *offset < end {
            let opcode_at = *offset;
            let opcode = reader.u8(offset)?;
            if opcode == 0 {
                let len = reader.uleb128(offset)?;
                let ext_end = offset.checked_add(len).ok_or(Error::MalformedHeader {
                    offset: opcode_at,
                    reason: "extended opcode length overflows",
                })?;
                if len == 0 {
                    continue;
                }
                let sub = DwLne(reader.u8(offset)?);
                match sub {
                    gim_con::DW_LNE_end_sequence => {
                        row.end_sequence = true;
                        append(&row, &mut rows);
                        row = Row::new(default_is_stmt);
                    }
                    gim_con::DW_LNE_set_address => {
                        let size = len - 1;
                        if !matches!(size, 1 | 2 | 4 | 8) {
                            return Err(Error::MalformedHeader {
                                offset: opcode_at,
                                reason: "unsupported operand size for set_address",
                            });
                        }
                        row.address = reader.relocated(size as u8, offset)?;
                    }
                    gim_con::DW_LNE_define_file => {
                        let name = String::from_utf8_lossy(reader.cstr(offset)?).into_owned();
                        new_files.push(FileEntry {
                            name,
                            dir_index: reader.uleb128(offset)?,
                            mod_time: reader.uleb128(offset)?,
                            length: reader.uleb128(offset)?,
                            md5: None,
                        });
                    }
                    gim_con::DW_LNE_set_discriminator => {
                        row.discriminator = reader.uleb128(offset)? as u32;
                    }
                    _ => {
                        reader.skip(offset, ext_end.saturating_sub(*offset))?;
                    }
                }
                if *offset != ext_end {
                    return Err(Error::MalformedHeader {
                        offset: opcode_at,
                        reason: "extended opcode length disagrees with its operands",
                    });
                }
            } else if opcode < opcode_base {
                match DwLns(opcode) {
                    gim_con::DW_LNS_copy => {
                        append(&row, &mut rows);
                        row.post_append();
                    }
                    gim_con::DW_LNS_advance_pc => {
                        let adv = reader.uleb128(offset)?;
                        row.address = row.address.wrapping_add(adv.wrapping_mul(min_inst));
                    }
                    gim_con::DW_LNS_advance_line => {
                        let adv = reader.sleb128(offset)?;
                        row.line = (i64::from(row.line) + adv) as u32;
                    }
                    gim_con::DW_LNS_set_file => {
                        row.file = reader.uleb128(offset)? as u16;
                    }
                    gim_con::DW_LNS_set_column => {
                        row.column = reader.uleb128(offset)? as u16;
                    }
                    gim_con::DW_LNS_negate_stmt => row.is_stmt = !row.is_stmt,
                    gim_con::DW_LNS_set_basic_block => row.basic_block = true,
                    gim_con::DW_LNS_const_add_pc => {
                        let adjust = u64::from(255 - opcode_base) / u64::from(line_range);
                        row.address = row.address.wrapping_add(adjust * min_inst);
                    }
                    gim_con::DW_LNS_fixed_advance_pc => {
                        row.address = row.address.wrapping_add(u64::from(reader.u16(offset)?));
                    }
                    gim_con::DW_LNS_set_prologue_end => row.prologue_end = true,
                    gim_con::DW_LNS_set_epilogue_begin => row.epilogue_begin = true,
                    gim_con::DW_LNS_set_isa => {
                        row.isa = reader.uleb128(offset)? as u8;
                    }
                    _ => {
                        // Unknown standard opcode: the header says how many
                        // ULEB operands to skip.
                        let count = p.standard_opcode_lengths[usize::from(opcode - 1)];
                        for _ in 0..count {
                            reader.uleb128(offset)?;
                        }
                    }
                }
            } else {
                let adjusted = opcode - opcode_base;
                let addr_adv = u64::from(adjusted / line_range) * min_inst;
                let line_adv = line_base + i64::from(adjusted % line_range);
                row.address = row.address.wrapping_add(addr_adv);
                row.line = (i64::from(row.line) + line_adv) as u32;
                append(&row, &mut rows);
                row.post_append();
            }
        }

        drop(append);
        if sequence.is_some() {
            tracing::debug!(
                table = self.prologue.offset,
                "last sequence is missing its end_sequence"
            );
        }
        self.rows = rows;
        self.sequences = sequences;
        self.prologue.file_names.extend(new_files);
        Ok(())
    }

    pub fn prologue(&self) -> &Prologue {
        &self.prologue
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn sequences(&self) -> &[Sequence] {
        &self.sequences
    }

    fn find_row_in_sequence(&self, seq: &Sequence, address: u64) -> Option<usize> {
        if !seq.contains(address) {
            return None;
        }
        let rows = self.rows.get(seq.first_row..seq.last_row)?;
        match rows.partition_point(|r| r.address <= address) {
            0 => None,
            n => Some(seq.first_row + n - 1),
        }
    }

    /// Index of the row describing `address`, if a sequence covers it.
    pub fn lookup_address(&self, address: u64) -> Option<usize> {
        let after = self.sequences.partition_point(|s| s.low_pc <= address);
        let seq = self.sequences.get(after.checked_sub(1)?)?;
        self.find_row_in_sequence(seq, address)
    }

    /// Indices of every row describing an address in
    /// `[address, address + size)`, in sequence order.
    pub fn lookup_address_range(&self, address: u64, size: u64) -> Vec<usize> {
        let end = address.saturating_add(size);
        let mut out = vec![];
        if size == 0 {
            return out;
        }
        for seq in &self.sequences {
            if seq.high_pc <= address || seq.low_pc >= end {
                continue;
            }
            let first = self
                .find_row_in_sequence(seq, address)
                .unwrap_or(seq.first_row);
            // The end_sequence row describes no instruction.
            let last = self
                .find_row_in_sequence(seq, end - 1)
                .unwrap_or(seq.last_row - 2);
            out.extend(first..=last);
        }
        out
    }

    pub fn file_name_by_index(
        &self,
        index: u64,
        comp_dir: Option<&str>,
        kind: FileLineInfoKind,
    ) -> Option<String> {
        self.prologue.file_name_by_index(index, comp_dir, kind)
    }

    /// File, line, column and discriminator for `address`.
    pub fn file_line_info_for_address(
        &self,
        address: u64,
        comp_dir: Option<&str>,
        kind: FileLineInfoKind,
    ) -> Option<LineInfo> {
        let row = &self.rows[self.lookup_address(address)?];
        Some(LineInfo {
            file_name: self.file_name_by_index(row.file.into(), comp_dir, kind),
            line: row.line.into(),
            column: row.column.into(),
            discriminator: row.discriminator.into(),
            ..LineInfo::default()
        })
    }
}

impl fmt::Display for LineTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = &self.prologue;
        writeln!(f, "Line table prologue:")?;
        writeln!(f, "    total_length: {:#010x}", p.total_length)?;
        writeln!(f, "         version: {}", p.version)?;
        writeln!(f, " prologue_length: {:#010x}", p.prologue_length)?;
        writeln!(f, " min_inst_length: {}", p.min_inst_length)?;
        writeln!(f, " default_is_stmt: {}", u8::from(p.default_is_stmt))?;
        writeln!(f, "       line_base: {}", p.line_base)?;
        writeln!(f, "      line_range: {}", p.line_range)?;
        writeln!(f, "     opcode_base: {}", p.opcode_base)?;
        for (i, d) in p.include_directories.iter().enumerate() {
            writeln!(f, "include_directories[{:3}] = '{}'", i + 1, d)?;
        }
        for (i, e) in p.file_names.iter().enumerate() {
            writeln!(
                f,
                "file_names[{:3}] dir={} mod_time={:#x} length={} name='{}'",
                i + 1,
                e.dir_index,
                e.mod_time,
                e.length,
                e.name
            )?;
        }
        writeln!(f, "Address            Line   Column File   ISA Discriminator Flags")?;
        writeln!(f, "------------------ ------ ------ ------ --- ------------- -------------")?;
        for r in &self.rows {
            write!(
                f,
                "{:#018x} {:6} {:6} {:6} {:3} {:13} ",
                r.address, r.line, r.column, r.file, r.isa, r.discriminator
            )?;
            let flags = [
                (r.is_stmt, "is_stmt"),
                (r.basic_block, "basic_block"),
                (r.prologue_end, "prologue_end"),
                (r.epilogue_begin, "epilogue_begin"),
                (r.end_sequence, "end_sequence"),
            ];
            let names: Vec<_> = flags.iter().filter(|(on, _)| *on).map(|(_, n)| *n).collect();
            writeln!(f, "{}", names.join(" "))?;
        }
        Ok(())
    }
}
