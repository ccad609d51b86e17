//! Hand-assembled debug sections for tests.

use gimli::constants as gim_con;
use gimli::{DwAt, DwForm, DwTag};

use crate::accel::{djb_hash, APPLE_HASH_MAGIC, DW_ATOM_DIE_OFFSET, EMPTY_BUCKET};
use crate::context::Context;
use crate::line::{LineStrings, LineTable};
use crate::reader::Reader;
use crate::section::{Section, SectionId, Sections};

/// Little-endian byte writer with chaining methods.
#[derive(Clone, Debug, Default)]
pub(crate) struct SectionWriter {
    buf: Vec<u8>,
}

impl SectionWriter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub(crate) fn i8(&mut self, v: i8) -> &mut Self {
        self.buf.push(v as u8);
        self
    }

    pub(crate) fn u16(&mut self, v: u16) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub(crate) fn u32(&mut self, v: u32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub(crate) fn u64(&mut self, v: u64) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub(crate) fn uleb(&mut self, mut v: u64) -> &mut Self {
        loop {
            let byte = (v & 0x7f) as u8;
            v >>= 7;
            if v == 0 {
                self.buf.push(byte);
                return self;
            }
            self.buf.push(byte | 0x80);
        }
    }

    pub(crate) fn sleb(&mut self, mut v: i64) -> &mut Self {
        loop {
            let byte = (v & 0x7f) as u8;
            v >>= 7;
            let done = (v == 0 && byte & 0x40 == 0) || (v == -1 && byte & 0x40 != 0);
            if done {
                self.buf.push(byte);
                return self;
            }
            self.buf.push(byte | 0x80);
        }
    }

    pub(crate) fn cstr(&mut self, s: &str) -> &mut Self {
        self.buf.extend_from_slice(s.as_bytes());
        self.buf.push(0);
        self
    }

    pub(crate) fn bytes(&mut self, b: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(b);
        self
    }

    pub(crate) fn len(&self) -> usize {
        self.buf.len()
    }

    pub(crate) fn patch_u32(&mut self, at: usize, v: u32) -> &mut Self {
        self.buf[at..at + 4].copy_from_slice(&v.to_le_bytes());
        self
    }

    pub(crate) fn into_vec(self) -> Vec<u8> {
        self.buf
    }
}

/// Appends one abbreviation declaration.
fn abbrev(w: &mut SectionWriter, code: u64, tag: DwTag, children: bool, attrs: &[(DwAt, DwForm)]) {
    w.uleb(code).uleb(tag.0.into()).u8(children.into());
    for &(attr, form) in attrs {
        w.uleb(attr.0.into()).uleb(form.0.into());
    }
    w.uleb(0).uleb(0);
}

/// Writes a 32-bit v4 unit header whose length is patched by
/// [`finish_unit`].
fn start_unit(w: &mut SectionWriter) -> usize {
    let start = w.len();
    w.u32(0).u16(4).u32(0).u8(8);
    start
}

fn finish_unit(w: &mut SectionWriter, start: usize) {
    let length = w.len() - start - 4;
    w.patch_u32(start, length as u32);
}

/// Line number program assembler. Headers use a line base of -5, a line
/// range of 14 and an opcode base of 13.
pub(crate) struct LineProgramWriter {
    version: u16,
    header: SectionWriter,
    program: SectionWriter,
}

const LINE_BASE: i8 = -5;
const LINE_RANGE: u8 = 14;
const OPCODE_BASE: u8 = 13;

fn line_header_fields(version: u16) -> SectionWriter {
    let mut h = SectionWriter::new();
    h.u8(1);
    if version >= 4 {
        h.u8(1);
    }
    h.u8(1).i8(LINE_BASE).u8(LINE_RANGE).u8(OPCODE_BASE);
    h.bytes(&[0, 1, 1, 1, 1, 0, 0, 0, 1, 0, 0, 1]);
    h
}

impl LineProgramWriter {
    /// A table with the given include directories and `(name, directory)`
    /// files. Version 5 tables spell paths inline.
    pub(crate) fn new(version: u16, dirs: &[&str], files: &[(&str, u64)]) -> Self {
        let mut header = line_header_fields(version);
        if version >= 5 {
            header.u8(1).uleb(gim_con::DW_LNCT_path.0.into()).uleb(gim_con::DW_FORM_string.0.into());
            header.uleb(dirs.len() as u64);
            for d in dirs {
                header.cstr(d);
            }
            header.u8(2);
            header.uleb(gim_con::DW_LNCT_path.0.into()).uleb(gim_con::DW_FORM_string.0.into());
            header
                .uleb(gim_con::DW_LNCT_directory_index.0.into())
                .uleb(gim_con::DW_FORM_udata.0.into());
            header.uleb(files.len() as u64);
            for &(name, dir) in files {
                header.cstr(name).uleb(dir);
            }
        } else {
            for d in dirs {
                header.cstr(d);
            }
            header.u8(0);
            for &(name, dir) in files {
                header.cstr(name).uleb(dir).uleb(0).uleb(0);
            }
            header.u8(0);
        }
        Self::with_header(version, header)
    }

    fn with_header(version: u16, header: SectionWriter) -> Self {
        Self {
            version,
            header,
            program: SectionWriter::new(),
        }
    }

    pub(crate) fn set_address(&mut self, address: u64) -> &mut Self {
        self.program.u8(0).uleb(9).u8(gim_con::DW_LNE_set_address.0).u64(address);
        self
    }

    pub(crate) fn end_sequence(&mut self) -> &mut Self {
        self.program.u8(0).uleb(1).u8(gim_con::DW_LNE_end_sequence.0);
        self
    }

    pub(crate) fn copy(&mut self) -> &mut Self {
        self.program.u8(gim_con::DW_LNS_copy.0);
        self
    }

    pub(crate) fn advance_pc(&mut self, by: u64) -> &mut Self {
        self.program.u8(gim_con::DW_LNS_advance_pc.0).uleb(by);
        self
    }

    pub(crate) fn advance_line(&mut self, by: i64) -> &mut Self {
        self.program.u8(gim_con::DW_LNS_advance_line.0).sleb(by);
        self
    }

    pub(crate) fn set_file(&mut self, file: u64) -> &mut Self {
        self.program.u8(gim_con::DW_LNS_set_file.0).uleb(file);
        self
    }

    /// A special opcode advancing the address and line and appending a
    /// row.
    pub(crate) fn special(&mut self, address_advance: u8, line_advance: i8) -> &mut Self {
        assert!((LINE_BASE..LINE_BASE + LINE_RANGE as i8).contains(&line_advance));
        let opcode = u32::from((line_advance - LINE_BASE) as u8)
            + u32::from(LINE_RANGE) * u32::from(address_advance)
            + u32::from(OPCODE_BASE);
        self.program.u8(u8::try_from(opcode).unwrap());
        self
    }

    pub(crate) fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.program.bytes(bytes);
        self
    }

    pub(crate) fn finish(&mut self) -> Vec<u8> {
        let header = std::mem::take(&mut self.header).into_vec();
        let program = std::mem::take(&mut self.program).into_vec();
        let mut w = SectionWriter::new();
        w.u32(0).u16(self.version);
        if self.version >= 5 {
            w.u8(8).u8(0);
        }
        w.u32(header.len() as u32).bytes(&header).bytes(&program);
        let length = w.len() - 4;
        w.patch_u32(0, length as u32);
        w.into_vec()
    }
}

/// A version 5 table whose directory and file names live in
/// `.debug_line_str`: directories `/root` and `sub`, files `a.c` (directory
/// 0) and `x.c` (directory 1).
pub(crate) fn v5_line_table() -> LineTable {
    let mut strings = SectionWriter::new();
    let mut at = |s: &str| {
        let off = strings.len() as u32;
        strings.cstr(s);
        off
    };
    let (root, sub, a, x) = (at("/root"), at("sub"), at("a.c"), at("x.c"));

    let mut header = line_header_fields(5);
    header.u8(1).uleb(gim_con::DW_LNCT_path.0.into()).uleb(gim_con::DW_FORM_line_strp.0.into());
    header.uleb(2).u32(root).u32(sub);
    header.u8(2);
    header.uleb(gim_con::DW_LNCT_path.0.into()).uleb(gim_con::DW_FORM_line_strp.0.into());
    header
        .uleb(gim_con::DW_LNCT_directory_index.0.into())
        .uleb(gim_con::DW_FORM_udata.0.into());
    header.uleb(2).u32(a).uleb(0).u32(x).uleb(1);

    let mut p = LineProgramWriter::with_header(5, header);
    p.set_address(0x2000).copy().advance_pc(8).end_sequence();
    let data = p.finish();

    let line_str = strings.into_vec();
    let reader = Reader::new(&data, gimli::RunTimeEndian::Little, 8);
    let mut offset = 0;
    LineTable::parse(
        &reader,
        &mut offset,
        &LineStrings {
            str: &[],
            line_str: &line_str,
        },
    )
    .unwrap()
}

/// Builds an Apple accelerator table over `names` (string offset, die
/// offset), one hash per name, spread over `bucket_count` buckets. The
/// table stores a single `DW_ATOM_die_offset` atom as `data4`.
pub(crate) fn apple_table(names: &[(&str, u32, u32)], bucket_count: u32) -> Vec<u8> {
    let mut hashed: Vec<(u32, u32, u32)> = names
        .iter()
        .map(|&(name, str_off, die)| (djb_hash(name.as_bytes()), str_off, die))
        .collect();
    if bucket_count != 0 {
        hashed.sort_by_key(|&(h, _, _)| h % bucket_count);
    }

    let mut w = SectionWriter::new();
    w.u32(APPLE_HASH_MAGIC).u16(1).u16(0);
    w.u32(bucket_count).u32(hashed.len() as u32).u32(12);
    w.u32(0).u32(1).u16(DW_ATOM_DIE_OFFSET).u16(gim_con::DW_FORM_data4.0);
    for b in 0..bucket_count {
        let first = hashed.iter().position(|&(h, _, _)| h % bucket_count == b);
        w.u32(first.map_or(EMPTY_BUCKET, |i| i as u32));
    }
    for &(h, _, _) in &hashed {
        w.u32(h);
    }
    let data_start = w.len() as u32 + hashed.len() as u32 * 4;
    for i in 0..hashed.len() as u32 {
        // Each record is 4 + 4 + 4 + 4 bytes.
        w.u32(data_start + i * 16);
    }
    for &(_, str_off, die) in &hashed {
        w.u32(str_off).u32(1).u32(die).u32(0);
    }
    w.into_vec()
}

pub(crate) const CU_LOW_PC: u64 = 0x1000;

/// Entry offsets in the sample unit.
#[derive(Copy, Clone, Debug)]
pub(crate) struct SampleOffsets {
    pub cu: u64,
    pub helper: u64,
    pub main: u64,
    pub inlined: u64,
    pub variable: u64,
    pub base_type: u64,
    /// Where the variable's `DW_AT_type` value is stored.
    pub variable_type_value: u64,
}

fn sample_abbrev() -> Vec<u8> {
    let mut w = SectionWriter::new();
    abbrev(
        &mut w,
        1,
        gim_con::DW_TAG_compile_unit,
        true,
        &[
            (gim_con::DW_AT_name, gim_con::DW_FORM_strp),
            (gim_con::DW_AT_comp_dir, gim_con::DW_FORM_string),
            (gim_con::DW_AT_low_pc, gim_con::DW_FORM_addr),
            (gim_con::DW_AT_high_pc, gim_con::DW_FORM_data4),
            (gim_con::DW_AT_stmt_list, gim_con::DW_FORM_sec_offset),
        ],
    );
    abbrev(
        &mut w,
        2,
        gim_con::DW_TAG_subprogram,
        false,
        &[
            (gim_con::DW_AT_name, gim_con::DW_FORM_strp),
            (gim_con::DW_AT_linkage_name, gim_con::DW_FORM_strp),
            (gim_con::DW_AT_decl_file, gim_con::DW_FORM_data1),
            (gim_con::DW_AT_decl_line, gim_con::DW_FORM_data1),
            (gim_con::DW_AT_inline, gim_con::DW_FORM_data1),
        ],
    );
    abbrev(
        &mut w,
        3,
        gim_con::DW_TAG_subprogram,
        true,
        &[
            (gim_con::DW_AT_name, gim_con::DW_FORM_string),
            (gim_con::DW_AT_low_pc, gim_con::DW_FORM_addr),
            (gim_con::DW_AT_high_pc, gim_con::DW_FORM_data4),
            (gim_con::DW_AT_decl_line, gim_con::DW_FORM_data1),
            (gim_con::DW_AT_external, gim_con::DW_FORM_flag_present),
        ],
    );
    abbrev(
        &mut w,
        4,
        gim_con::DW_TAG_inlined_subroutine,
        false,
        &[
            (gim_con::DW_AT_abstract_origin, gim_con::DW_FORM_ref4),
            (gim_con::DW_AT_low_pc, gim_con::DW_FORM_addr),
            (gim_con::DW_AT_high_pc, gim_con::DW_FORM_data4),
            (gim_con::DW_AT_call_file, gim_con::DW_FORM_data1),
            (gim_con::DW_AT_call_line, gim_con::DW_FORM_data1),
            (gim_con::DW_AT_call_column, gim_con::DW_FORM_data1),
        ],
    );
    abbrev(
        &mut w,
        5,
        gim_con::DW_TAG_variable,
        false,
        &[
            (gim_con::DW_AT_name, gim_con::DW_FORM_string),
            (gim_con::DW_AT_type, gim_con::DW_FORM_ref4),
        ],
    );
    abbrev(
        &mut w,
        6,
        gim_con::DW_TAG_base_type,
        false,
        &[
            (gim_con::DW_AT_name, gim_con::DW_FORM_string),
            (gim_con::DW_AT_encoding, gim_con::DW_FORM_data1),
            (gim_con::DW_AT_byte_size, gim_con::DW_FORM_data1),
        ],
    );
    w.uleb(0);
    w.into_vec()
}

/// `.debug_str` of the sample: `main.c` at 1, `helper` at 8 and
/// `_Z6helperv` at 15.
fn sample_str() -> Vec<u8> {
    b"\0main.c\0helper\0_Z6helperv\0".to_vec()
}

/// One compile unit, `main.c`, covering `[0x1000, 0x1100)`:
///
/// ```text
/// compile_unit
///   subprogram helper (abstract, declared on line 3)
///   subprogram main [0x1000, 0x1080), declared on line 10
///     inlined_subroutine helper [0x1010, 0x1020), called from 1:12:5
///     variable x
///   base_type int
/// ```
fn sample_info() -> (Vec<u8>, SampleOffsets) {
    let mut w = SectionWriter::new();
    let start = start_unit(&mut w);
    let at = |w: &SectionWriter| w.len() as u64;

    let cu = at(&w);
    w.uleb(1).u32(1).cstr("/src").u64(CU_LOW_PC).u32(0x100).u32(0);
    let helper = at(&w);
    w.uleb(2).u32(8).u32(15).u8(1).u8(3).u8(gim_con::DW_INL_inlined.0);
    let main = at(&w);
    w.uleb(3).cstr("main").u64(CU_LOW_PC).u32(0x80).u8(10);
    let inlined = at(&w);
    w.uleb(4).u32(helper as u32).u64(CU_LOW_PC + 0x10).u32(0x10).u8(1).u8(12).u8(5);
    let variable = at(&w);
    w.uleb(5).cstr("x");
    let variable_type_value = at(&w);
    w.u32(0);
    w.uleb(0);
    let base_type = at(&w);
    w.uleb(6).cstr("int").u8(gim_con::DW_ATE_signed.0).u8(4);
    w.uleb(0);

    w.patch_u32(variable_type_value as usize, base_type as u32);
    finish_unit(&mut w, start);
    let offsets = SampleOffsets {
        cu,
        helper,
        main,
        inlined,
        variable,
        base_type,
        variable_type_value,
    };
    (w.into_vec(), offsets)
}

/// Rows: 0x1000 line 10, 0x1010 line 4, 0x1020 line 13, ending at 0x1100,
/// all in `main.c`.
fn sample_line() -> Vec<u8> {
    let mut p = LineProgramWriter::new(4, &[], &[("main.c", 0)]);
    p.set_address(CU_LOW_PC).advance_line(9).copy();
    p.advance_line(-6).special(0x10, 0);
    p.advance_pc(0x10).advance_line(9).copy();
    p.advance_pc(0xe0).end_sequence();
    p.finish()
}

pub(crate) fn sample_offsets() -> SampleOffsets {
    sample_info().1
}

pub(crate) fn sample_sections() -> Sections {
    sample_sections_with_info(sample_info().0)
}

/// The sample's abbreviations, strings and line table around a different
/// `.debug_info`. `Sections::insert` keeps the first section per ID, so
/// this has to start from scratch rather than from `sample_sections`.
fn sample_sections_with_info(info: Vec<u8>) -> Sections {
    let mut sections = Sections::default();
    sections.insert(SectionId::Info, Section::new(info));
    sections.insert(SectionId::Abbrev, Section::new(sample_abbrev()));
    sections.insert(SectionId::Str, Section::new(sample_str()));
    sections.insert(SectionId::Line, Section::new(sample_line()));
    sections
}

pub(crate) fn sample_context() -> Context {
    Context::builder().sections(sample_sections()).build()
}

/// The sample with one more section added.
pub(crate) fn sample_context_with(id: SectionId, data: Vec<u8>) -> Context {
    let mut sections = sample_sections();
    sections.insert(id, Section::new(data));
    Context::builder().sections(sections).build()
}

fn sample_with_variable_type(value: u32) -> Context {
    let (mut info, offsets) = sample_info();
    let at = offsets.variable_type_value as usize;
    info[at..at + 4].copy_from_slice(&value.to_le_bytes());
    Context::builder()
        .sections(sample_sections_with_info(info))
        .build()
}

/// The sample, with the variable's type pointing past the end of its unit.
pub(crate) fn context_with_bad_reference() -> Context {
    sample_with_variable_type(0x200)
}

/// The sample, with the variable's type pointing into the middle of an
/// entry.
pub(crate) fn context_with_misaligned_reference() -> Context {
    sample_with_variable_type(sample_offsets().base_type as u32 + 1)
}

/// A version 9 unit followed by the sample unit.
pub(crate) fn context_with_broken_unit() -> Context {
    let mut info = SectionWriter::new();
    info.u32(7).u16(9).u32(0).u8(8);
    info.bytes(&sample_info().0);
    Context::builder()
        .sections(sample_sections_with_info(info.into_vec()))
        .build()
}

/// A unit entry, one base type child, then an undeclared code 0x55.
pub(crate) fn context_with_bad_abbrev_code() -> Context {
    let mut w = SectionWriter::new();
    let start = start_unit(&mut w);
    w.uleb(1).u32(1).cstr("/src").u64(CU_LOW_PC).u32(0x100).u32(0);
    w.uleb(6).cstr("int").u8(gim_con::DW_ATE_signed.0).u8(4);
    w.uleb(0x55).u32(0);
    w.uleb(0);
    finish_unit(&mut w, start);

    Context::builder()
        .sections(sample_sections_with_info(w.into_vec()))
        .build()
}

/// Two unnamed subprograms naming each other as their abstract origin.
pub(crate) fn context_with_origin_cycle() -> Context {
    let mut a = SectionWriter::new();
    abbrev(
        &mut a,
        1,
        gim_con::DW_TAG_compile_unit,
        true,
        &[(gim_con::DW_AT_producer, gim_con::DW_FORM_string)],
    );
    abbrev(
        &mut a,
        2,
        gim_con::DW_TAG_subprogram,
        false,
        &[(gim_con::DW_AT_abstract_origin, gim_con::DW_FORM_ref4)],
    );
    a.uleb(0);

    let mut w = SectionWriter::new();
    let start = start_unit(&mut w);
    w.uleb(1).cstr("test");
    let first = w.len();
    // Each subprogram entry is 5 bytes.
    w.uleb(2).u32(first as u32 + 5);
    w.uleb(2).u32(first as u32);
    w.uleb(0);
    finish_unit(&mut w, start);

    let mut sections = Sections::default();
    sections.insert(SectionId::Info, Section::new(w.into_vec()));
    sections.insert(SectionId::Abbrev, Section::new(a.into_vec()));
    Context::builder().sections(sections).build()
}

/// One childless compile unit per entry of `stmt_lists`, all reading
/// `line`.
fn context_with_units_reading(line: Vec<u8>, stmt_lists: &[u32]) -> Context {
    let mut a = SectionWriter::new();
    abbrev(
        &mut a,
        1,
        gim_con::DW_TAG_compile_unit,
        false,
        &[(gim_con::DW_AT_stmt_list, gim_con::DW_FORM_sec_offset)],
    );
    a.uleb(0);

    let mut w = SectionWriter::new();
    for &stmt in stmt_lists {
        let start = start_unit(&mut w);
        w.uleb(1).u32(stmt);
        finish_unit(&mut w, start);
    }

    let mut sections = Sections::default();
    sections.insert(SectionId::Info, Section::new(w.into_vec()));
    sections.insert(SectionId::Abbrev, Section::new(a.into_vec()));
    sections.insert(SectionId::Line, Section::new(line));
    Context::builder().sections(sections).build()
}

/// A unit whose line table has one row per address, in the given order,
/// plus the end of sequence at the last address.
pub(crate) fn context_with_line_rows(addresses: &[u64]) -> Context {
    let mut p = LineProgramWriter::new(4, &[], &[("a.c", 0)]);
    for &a in addresses {
        p.set_address(a).copy();
    }
    p.end_sequence();
    context_with_units_reading(p.finish(), &[0])
}

/// A unit whose line table has a single file but rows naming `file`.
pub(crate) fn context_with_line_file(file: u64) -> Context {
    let mut p = LineProgramWriter::new(4, &[], &[("a.c", 0)]);
    p.set_file(file).set_address(0x1000).copy().advance_pc(4).end_sequence();
    context_with_units_reading(p.finish(), &[0])
}

/// Two units pointing at the same line table.
pub(crate) fn context_with_shared_stmt_list() -> Context {
    let mut p = LineProgramWriter::new(4, &[], &[("a.c", 0)]);
    p.set_address(0x1000).copy().advance_pc(4).end_sequence();
    context_with_units_reading(p.finish(), &[0, 0])
}

/// An ELF `.dwo` holding one split compile unit with DWO id `id`.
pub(crate) fn dwo_object(id: u64) -> Vec<u8> {
    use object::write::Object;
    use object::{Architecture, BinaryFormat, Endianness, SectionKind};

    let mut a = SectionWriter::new();
    abbrev(
        &mut a,
        1,
        gim_con::DW_TAG_compile_unit,
        false,
        &[
            (gim_con::DW_AT_name, gim_con::DW_FORM_strp),
            (gim_con::DW_AT_GNU_dwo_id, gim_con::DW_FORM_data8),
        ],
    );
    a.uleb(0);

    let mut w = SectionWriter::new();
    let start = start_unit(&mut w);
    w.uleb(1).u32(1).u64(id);
    finish_unit(&mut w, start);

    let mut obj = Object::new(BinaryFormat::Elf, Architecture::X86_64, Endianness::Little);
    for (name, data) in [
        (".debug_info.dwo", w.into_vec()),
        (".debug_abbrev.dwo", a.into_vec()),
        (".debug_str.dwo", b"\0b.c\0".to_vec()),
    ] {
        let section = obj.add_section(vec![], name.as_bytes().to_vec(), SectionKind::Debug);
        obj.append_section_data(section, &data, 1);
    }
    obj.write().unwrap()
}

/// A relocatable ELF whose `.debug_ranges` holds one 8 byte address
/// relocated against an absolute symbol at `value`, plus `addend`.
pub(crate) fn relocated_object(value: u64, addend: i64) -> Vec<u8> {
    use object::write::{Object, Relocation, Symbol, SymbolSection};
    use object::{
        Architecture, BinaryFormat, Endianness, RelocationEncoding, RelocationKind, SectionKind,
        SymbolFlags, SymbolKind, SymbolScope,
    };

    let mut obj = Object::new(BinaryFormat::Elf, Architecture::X86_64, Endianness::Little);
    let ranges = obj.add_section(vec![], b".debug_ranges".to_vec(), SectionKind::Debug);
    obj.append_section_data(ranges, &[0u8; 16], 1);
    let info = obj.add_section(vec![], b".debug_info".to_vec(), SectionKind::Debug);
    obj.append_section_data(info, &[0u8; 4], 1);

    let symbol = obj.add_symbol(Symbol {
        name: b"text_start".to_vec(),
        value,
        size: 0,
        kind: SymbolKind::Label,
        scope: SymbolScope::Compilation,
        weak: false,
        section: SymbolSection::Absolute,
        flags: SymbolFlags::None,
    });
    obj.add_relocation(
        ranges,
        Relocation {
            offset: 0,
            size: 64,
            kind: RelocationKind::Absolute,
            encoding: RelocationEncoding::Generic,
            symbol,
            addend,
        },
    )
    .unwrap();
    obj.write().unwrap()
}

/// A version 7 `.gdb_index` with two compile units, one type unit, one
/// address range (covering 0x1000..0x1100, in the second unit) and an 8 slot
/// symbol table holding `symbols` as (name, CU index) pairs.
pub(crate) fn gdb_index(symbols: &[(&str, u32)]) -> Vec<u8> {
    const SLOTS: u32 = 8;
    let cu_list = 24u32;
    let tu_list = cu_list + 2 * 16;
    let address_area = tu_list + 24;
    let symbol_table = address_area + 20;
    let pool_start = symbol_table + SLOTS * 8;

    let mut pool = SectionWriter::new();
    let mut table = vec![(0u32, 0u32); SLOTS as usize];
    for &(name, cu) in symbols {
        let name_offset = pool.len() as u32;
        pool.cstr(name);
        let vec_offset = pool.len() as u32;
        pool.u32(1).u32(0x3000_0000 | cu);

        let hash = crate::gdb_index::gdb_index_hash(name.as_bytes());
        let mask = SLOTS - 1;
        let step = (hash.wrapping_mul(17) & mask) | 1;
        let mut slot = hash & mask;
        while table[slot as usize] != (0, 0) {
            slot = (slot + step) & mask;
        }
        table[slot as usize] = (name_offset, vec_offset);
    }

    let mut w = SectionWriter::new();
    w.u32(7)
        .u32(cu_list)
        .u32(tu_list)
        .u32(address_area)
        .u32(symbol_table)
        .u32(pool_start);
    w.u64(0).u64(0x40).u64(0x40).u64(0x30);
    w.u64(0x80).u64(0x1d).u64(0xfeed);
    w.u64(0x1000).u64(0x1100).u32(1);
    for (name_offset, vec_offset) in table {
        w.u32(name_offset).u32(vec_offset);
    }
    w.bytes(&pool.into_vec());
    w.into_vec()
}
