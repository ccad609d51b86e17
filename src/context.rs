//! The top-level handle on one object file's debug info.
//!
//! A [`Context`] owns the raw sections and parses everything else on first
//! use: units, abbreviation tables, line tables, location lists, and so on.
//! Nothing here is thread safe; every cache is a plain `OnceCell` or
//! `RefCell`.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};
use std::sync::Arc;

use gimli::constants as gim_con;
use gimli::RunTimeEndian;
use once_cell::unsync::OnceCell;

use crate::abbrev::DebugAbbrev;
use crate::accel::AcceleratorTable;
use crate::aranges::DebugAranges;
use crate::die::Die;
use crate::error::{default_error_handler, Error, ErrorHandler, ErrorPolicy, Result};
use crate::frame::DebugFrame;
use crate::gdb_index::GdbIndex;
use crate::line::{LineStrings, LineTable};
use crate::loc::{DebugLoc, DebugLocDwo};
use crate::macinfo::DebugMacinfo;
use crate::reader::Reader;
use crate::section::{Section, SectionId, Sections};
use crate::unit::{Unit, UnitHeader, UnitSection, UnitSections};
use crate::unit_index::UnitIndex;

/// Collects what a [`Context`] is built from.
pub struct ContextBuilder {
    file_name: Option<PathBuf>,
    endian: RunTimeEndian,
    address_size: u8,
    handler: ErrorHandler,
    sections: Sections,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self {
            file_name: None,
            endian: RunTimeEndian::Little,
            address_size: 8,
            handler: Rc::new(default_error_handler),
            sections: Sections::default(),
        }
    }
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Path of the object file. Package (`.dwp`) lookup is relative to it.
    pub fn file_name(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_name = Some(path.into());
        self
    }

    pub fn endian(mut self, endian: RunTimeEndian) -> Self {
        self.endian = endian;
        self
    }

    /// Address size used for sections that don't state their own.
    pub fn address_size(mut self, size: u8) -> Self {
        self.address_size = size;
        self
    }

    pub fn error_handler(mut self, handler: ErrorHandler) -> Self {
        self.handler = handler;
        self
    }

    pub fn section(mut self, id: SectionId, section: Section) -> Self {
        self.sections.insert(id, section);
        self
    }

    pub fn sections(mut self, sections: Sections) -> Self {
        self.sections = sections;
        self
    }

    pub fn build(self) -> Context {
        Context {
            file_name: self.file_name,
            endian: self.endian,
            address_size: self.address_size,
            sections: self.sections,
            handler: self.handler,
            max_version: Cell::new(0),
            units: OnceCell::new(),
            type_units: OnceCell::new(),
            dwo_units: OnceCell::new(),
            dwo_type_units: OnceCell::new(),
            abbrev: OnceCell::new(),
            abbrev_dwo: OnceCell::new(),
            loc: OnceCell::new(),
            loc_dwo: OnceCell::new(),
            aranges: OnceCell::new(),
            debug_frame: OnceCell::new(),
            eh_frame: OnceCell::new(),
            macinfo: OnceCell::new(),
            cu_index: OnceCell::new(),
            tu_index: OnceCell::new(),
            gdb_index: OnceCell::new(),
            line_tables: RefCell::default(),
            dwo_files: RefCell::default(),
            dwp: RefCell::default(),
            checked_for_dwp: Cell::new(false),
        }
    }
}

pub struct Context {
    file_name: Option<PathBuf>,
    endian: RunTimeEndian,
    address_size: u8,
    sections: Sections,
    handler: ErrorHandler,
    max_version: Cell<u16>,

    units: OnceCell<Vec<Unit>>,
    type_units: OnceCell<Vec<Vec<Unit>>>,
    dwo_units: OnceCell<Vec<Unit>>,
    dwo_type_units: OnceCell<Vec<Vec<Unit>>>,

    abbrev: OnceCell<DebugAbbrev>,
    abbrev_dwo: OnceCell<DebugAbbrev>,
    loc: OnceCell<DebugLoc>,
    loc_dwo: OnceCell<DebugLocDwo>,
    aranges: OnceCell<DebugAranges>,
    debug_frame: OnceCell<Option<DebugFrame>>,
    eh_frame: OnceCell<Option<DebugFrame>>,
    macinfo: OnceCell<DebugMacinfo>,
    cu_index: OnceCell<UnitIndex>,
    tu_index: OnceCell<UnitIndex>,
    gdb_index: OnceCell<GdbIndex>,
    /// Keyed by (from a `.dwo` section, offset).
    line_tables: RefCell<HashMap<(bool, u64), Option<Rc<LineTable>>>>,

    dwo_files: RefCell<HashMap<PathBuf, Weak<DwoFile>>>,
    dwp: RefCell<Weak<DwoFile>>,
    checked_for_dwp: Cell<bool>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("file_name", &self.file_name)
            .field("endian", &self.endian)
            .field("address_size", &self.address_size)
            .finish_non_exhaustive()
    }
}

/// A split debug file and the context parsed from it.
#[derive(Debug)]
pub struct DwoFile {
    path: PathBuf,
    context: Context,
}

impl DwoFile {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Shared handle on a split file's context. The owning [`Context`] only
/// keeps a weak reference, so the file is dropped once every handle is.
#[derive(Clone, Debug)]
pub struct DwoContext(Rc<DwoFile>);

impl DwoContext {
    pub fn file(&self) -> &DwoFile {
        &self.0
    }

    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }
}

impl Deref for DwoContext {
    type Target = Context;

    fn deref(&self) -> &Context {
        &self.0.context
    }
}

impl Context {
    pub fn builder() -> ContextBuilder {
        ContextBuilder::new()
    }

    pub fn file_name(&self) -> Option<&Path> {
        self.file_name.as_deref()
    }

    pub fn endian(&self) -> RunTimeEndian {
        self.endian
    }

    pub fn address_size(&self) -> u8 {
        self.address_size
    }

    pub fn sections(&self) -> &Sections {
        &self.sections
    }

    pub fn section(&self, id: SectionId) -> &Section {
        self.sections.get(id)
    }

    pub fn section_reader(&self, id: SectionId) -> Reader<'_> {
        Reader::for_section(self.sections.get(id), self.endian, self.address_size)
    }

    /// Hands a recoverable error to the caller's policy.
    pub fn report(&self, err: &Error) -> ErrorPolicy {
        (self.handler)(err)
    }

    /// Highest unit version seen so far. Only meaningful once the units
    /// have been parsed.
    pub fn max_version(&self) -> u16 {
        self.max_version.get()
    }

    pub fn debug_abbrev(&self) -> &DebugAbbrev {
        self.abbrev
            .get_or_init(|| DebugAbbrev::parse(&self.section_reader(SectionId::Abbrev)))
    }

    pub fn debug_abbrev_dwo(&self) -> &DebugAbbrev {
        self.abbrev_dwo
            .get_or_init(|| DebugAbbrev::parse(&self.section_reader(SectionId::AbbrevDwo)))
    }

    fn unit_sections(&self, origin: UnitSection, info: Section) -> UnitSections {
        let s = &self.sections;
        if origin.is_dwo() {
            UnitSections {
                info,
                str: s.get(SectionId::StrDwo).clone(),
                str_offsets: s.get(SectionId::StrOffsetsDwo).clone(),
                addr: s.get(SectionId::Addr).clone(),
                line: s.get(SectionId::LineDwo).clone(),
                line_str: s.get(SectionId::LineStr).clone(),
                ranges: s.get(SectionId::Ranges).clone(),
            }
        } else {
            UnitSections {
                info,
                str: s.get(SectionId::Str).clone(),
                str_offsets: s.get(SectionId::StrOffsets).clone(),
                addr: s.get(SectionId::Addr).clone(),
                line: s.get(SectionId::Line).clone(),
                line_str: s.get(SectionId::LineStr).clone(),
                ranges: s.get(SectionId::Ranges).clone(),
            }
        }
    }

    fn parse_unit(
        &self,
        reader: &Reader,
        offset: &mut u64,
        origin: UnitSection,
        sections: &UnitSections,
    ) -> Result<Unit> {
        let start = *offset;
        let header = UnitHeader::parse(reader, offset, origin)?;

        let index_entry = if origin.is_dwo() {
            let (index, kind) = if origin.is_types() {
                (self.tu_index(), gim_con::DW_SECT_V2_TYPES)
            } else {
                (self.cu_index(), gim_con::DW_SECT_V2_INFO)
            };
            index.find_by_offset(kind, start).cloned()
        } else {
            None
        };
        let abbrev_base = index_entry
            .as_ref()
            .and_then(|e| e.contribution(gim_con::DW_SECT_V2_ABBREV))
            .map_or(0, |c| c.offset);

        let abbrevs = if origin.is_dwo() {
            self.debug_abbrev_dwo()
        } else {
            self.debug_abbrev()
        };
        let set = abbrevs
            .set(abbrev_base + header.abbrev_offset)
            .ok_or(Error::MalformedHeader {
                offset: start,
                reason: "abbreviation offset does not start a table",
            })?;

        self.max_version
            .set(self.max_version.get().max(header.version));
        *offset = header.next_unit_offset();
        Ok(Unit::new(
            header,
            origin,
            self.endian,
            sections.clone(),
            set.clone(),
            index_entry,
        ))
    }

    /// Parses every unit in `section`. A unit that fails to parse is
    /// reported and skipped, unless the handler says to halt.
    fn parse_units(&self, origin: UnitSection, section: &Section) -> Vec<Unit> {
        let reader = Reader::for_section(section, self.endian, self.address_size);
        let sections = self.unit_sections(origin, section.clone());
        let mut units = vec![];
        let mut offset = 0;
        while reader.is_valid_offset(offset) {
            let start = offset;
            match self.parse_unit(&reader, &mut offset, origin, &sections) {
                Ok(unit) => units.push(unit),
                Err(err) => {
                    if self.report(&err) == ErrorPolicy::Halt {
                        break;
                    }
                    match UnitHeader::peek_next_unit_offset(&reader, start) {
                        Some(next) if next > start => offset = next,
                        _ => break,
                    }
                }
            }
        }
        tracing::debug!(section = origin.section_id().name(), count = units.len(), "parsed units");
        units
    }

    pub fn compile_units(&self) -> &[Unit] {
        self.units
            .get_or_init(|| self.parse_units(UnitSection::Info, self.sections.get(SectionId::Info)))
    }

    /// Units from each `.debug_types` section, one collection per section.
    pub fn type_unit_sections(&self) -> &[Vec<Unit>] {
        self.type_units.get_or_init(|| {
            self.sections
                .types()
                .iter()
                .enumerate()
                .map(|(i, s)| self.parse_units(UnitSection::Types(i), s))
                .collect()
        })
    }

    pub fn type_units(&self) -> impl Iterator<Item = &Unit> + '_ {
        self.type_unit_sections().iter().flatten()
    }

    pub fn dwo_compile_units(&self) -> &[Unit] {
        self.dwo_units.get_or_init(|| {
            self.parse_units(UnitSection::InfoDwo, self.sections.get(SectionId::InfoDwo))
        })
    }

    pub fn dwo_type_unit_sections(&self) -> &[Vec<Unit>] {
        self.dwo_type_units.get_or_init(|| {
            self.sections
                .types_dwo()
                .iter()
                .enumerate()
                .map(|(i, s)| self.parse_units(UnitSection::TypesDwo(i), s))
                .collect()
        })
    }

    pub fn dwo_type_units(&self) -> impl Iterator<Item = &Unit> + '_ {
        self.dwo_type_unit_sections().iter().flatten()
    }

    /// The unit collection parsed from `origin`.
    pub fn units(&self, origin: UnitSection) -> &[Unit] {
        match origin {
            UnitSection::Info => self.compile_units(),
            UnitSection::InfoDwo => self.dwo_compile_units(),
            UnitSection::Types(i) => self
                .type_unit_sections()
                .get(i)
                .map_or(&[][..], |v| &v[..]),
            UnitSection::TypesDwo(i) => self
                .dwo_type_unit_sections()
                .get(i)
                .map_or(&[][..], |v| &v[..]),
        }
    }

    /// Finds the unit in `origin` whose extent covers `offset`.
    pub fn unit_for_offset(&self, origin: UnitSection, offset: u64) -> Option<&Unit> {
        let units = self.units(origin);
        let i = units.partition_point(|u| u.next_unit_offset() <= offset);
        units.get(i).filter(|u| u.contains_offset(offset))
    }

    /// Finds the entry at `offset` in `.debug_info`.
    pub fn die_for_offset(&self, offset: u64) -> Option<Die<'_>> {
        self.die_for_offset_in(UnitSection::Info, offset)
    }

    pub fn die_for_offset_in(&self, origin: UnitSection, offset: u64) -> Option<Die<'_>> {
        self.unit_for_offset(origin, offset)?
            .die_for_offset(self, offset)
    }

    pub fn cu_index(&self) -> &UnitIndex {
        self.cu_index
            .get_or_init(|| self.parse_index(SectionId::CuIndex))
    }

    pub fn tu_index(&self) -> &UnitIndex {
        self.tu_index
            .get_or_init(|| self.parse_index(SectionId::TuIndex))
    }

    /// An index is all or nothing: a broken one is reported and treated as
    /// empty whatever the handler answers.
    fn parse_index(&self, id: SectionId) -> UnitIndex {
        match UnitIndex::parse(&self.section_reader(id)) {
            Ok(index) => index,
            Err(err) => {
                self.report(&err);
                UnitIndex::default()
            }
        }
    }

    /// The `.gdb_index` table, which is little endian whatever the object
    /// is. Like the package indexes, a broken one is reported and treated as
    /// empty.
    pub fn gdb_index(&self) -> &GdbIndex {
        self.gdb_index.get_or_init(|| {
            let reader = Reader::for_section(
                self.sections.get(SectionId::GdbIndex),
                RunTimeEndian::Little,
                self.address_size,
            );
            GdbIndex::parse(&reader).unwrap_or_else(|err| {
                self.report(&err);
                GdbIndex::default()
            })
        })
    }

    pub fn debug_loc(&self) -> &DebugLoc {
        self.loc.get_or_init(|| {
            DebugLoc::parse(&self.section_reader(SectionId::Loc), |e| self.report(e))
        })
    }

    pub fn debug_loc_dwo(&self) -> &DebugLocDwo {
        self.loc_dwo.get_or_init(|| {
            DebugLocDwo::parse(&self.section_reader(SectionId::LocDwo), |e| self.report(e))
        })
    }

    pub fn debug_aranges(&self) -> &DebugAranges {
        self.aranges.get_or_init(|| DebugAranges::generate(self))
    }

    pub fn debug_frame(&self) -> Option<&DebugFrame> {
        self.debug_frame
            .get_or_init(|| {
                let data = self.sections.get(SectionId::Frame).data();
                self.frame_or_report(DebugFrame::parse_debug_frame(data, self.endian, self.address_size))
            })
            .as_ref()
    }

    pub fn eh_frame(&self) -> Option<&DebugFrame> {
        self.eh_frame
            .get_or_init(|| {
                let data = self.sections.get(SectionId::EhFrame).data();
                self.frame_or_report(DebugFrame::parse_eh_frame(data, self.endian, self.address_size))
            })
            .as_ref()
    }

    fn frame_or_report(&self, frame: Result<DebugFrame>) -> Option<DebugFrame> {
        frame.map_err(|err| self.report(&err)).ok()
    }

    pub fn debug_macinfo(&self) -> &DebugMacinfo {
        self.macinfo.get_or_init(|| {
            DebugMacinfo::parse(&self.section_reader(SectionId::Macinfo), |e| self.report(e))
        })
    }

    fn accelerator_table(&self, id: SectionId) -> Option<AcceleratorTable<'_>> {
        if !self.sections.contains(id) {
            return None;
        }
        let strings = self.sections.get(SectionId::Str).data();
        match AcceleratorTable::extract(self.section_reader(id), strings) {
            Ok(table) => Some(table),
            Err(err) => {
                self.report(&err);
                None
            }
        }
    }

    pub fn apple_names(&self) -> Option<AcceleratorTable<'_>> {
        self.accelerator_table(SectionId::AppleNames)
    }

    pub fn apple_types(&self) -> Option<AcceleratorTable<'_>> {
        self.accelerator_table(SectionId::AppleTypes)
    }

    pub fn apple_namespaces(&self) -> Option<AcceleratorTable<'_>> {
        self.accelerator_table(SectionId::AppleNamespaces)
    }

    pub fn apple_objc(&self) -> Option<AcceleratorTable<'_>> {
        self.accelerator_table(SectionId::AppleObjc)
    }

    /// Parses (once) the line table at `offset` of the line section `unit`
    /// reads from.
    pub fn line_table_for_unit(&self, unit: &Unit) -> Option<Rc<LineTable>> {
        let offset = unit.stmt_list()?;
        let key = (unit.is_dwo(), offset);
        if let Some(cached) = self.line_tables.borrow().get(&key) {
            return cached.clone();
        }

        let sections = unit.sections();
        let reader = Reader::for_section(&sections.line, unit.endian(), unit.address_size());
        let strings = LineStrings {
            str: sections.str.data(),
            line_str: sections.line_str.data(),
        };
        let mut at = offset;
        let table = match LineTable::parse(&reader, &mut at, &strings) {
            Ok(table) => Some(Rc::new(table)),
            Err(err) => {
                self.report(&err);
                None
            }
        };
        self.line_tables.borrow_mut().insert(key, table.clone());
        table
    }

    /// Opens (or reuses) the split file for `path`.
    ///
    /// A package file named after this object with a `.dwp` suffix is tried
    /// first; once it has failed to open, individual `.dwo` files are used.
    /// Open failures are reported and yield `None`.
    pub fn dwo_context(&self, path: &Path) -> Option<DwoContext> {
        if let Some(dwp) = self.dwp.borrow().upgrade() {
            return Some(DwoContext(dwp));
        }
        if let Some(live) = self.dwo_files.borrow().get(path).and_then(Weak::upgrade) {
            tracing::debug!(path = %path.display(), "reusing split file");
            return Some(DwoContext(live));
        }

        if !self.checked_for_dwp.get() {
            if let Some(name) = &self.file_name {
                let mut dwp_name = name.clone().into_os_string();
                dwp_name.push(".dwp");
                let dwp_path = PathBuf::from(dwp_name);
                match self.open_split_file(&dwp_path) {
                    Ok(file) => {
                        let file = Rc::new(file);
                        *self.dwp.borrow_mut() = Rc::downgrade(&file);
                        tracing::debug!(path = %dwp_path.display(), "opened package file");
                        return Some(DwoContext(file));
                    }
                    Err(err) => {
                        tracing::debug!(%err, "no package file");
                        self.checked_for_dwp.set(true);
                    }
                }
            } else {
                self.checked_for_dwp.set(true);
            }
        }

        match self.open_split_file(path) {
            Ok(file) => {
                let file = Rc::new(file);
                let mut files = self.dwo_files.borrow_mut();
                files.retain(|_, f| f.strong_count() > 0);
                files.insert(path.to_path_buf(), Rc::downgrade(&file));
                tracing::debug!(path = %path.display(), "opened split file");
                Some(DwoContext(file))
            }
            Err(err) => {
                self.report(&err);
                None
            }
        }
    }

    fn open_split_file(&self, path: &Path) -> Result<DwoFile> {
        let unavailable = |source: Box<dyn std::error::Error + Send + Sync>| {
            Error::SplitFileUnavailable {
                path: path.to_path_buf(),
                source,
            }
        };
        let data: Arc<[u8]> = std::fs::read(path)
            .map_err(|e| unavailable(e.into()))?
            .into();
        let sections = crate::load_sections(&data).map_err(|e| unavailable(e.into()))?;
        let context = ContextBuilder::new()
            .file_name(path)
            .endian(sections.endian)
            .address_size(sections.address_size)
            .error_handler(self.handler.clone())
            .sections(sections.sections)
            .build();
        Ok(DwoFile {
            path: path.to_path_buf(),
            context,
        })
    }

    /// Index into [`Context::dwo_compile_units`] of the split unit with DWO
    /// id `hash`. Uses the package index when there is one.
    pub fn dwo_compile_unit_index_for_hash(&self, hash: u64) -> Option<usize> {
        let units = self.dwo_compile_units();
        let index = self.cu_index();
        if !index.is_empty() {
            let row = index.find(hash)?;
            let start = row.contribution(gim_con::DW_SECT_V2_INFO)?.offset;
            return units.iter().position(|u| u.offset() == start);
        }
        // Plain .dwo files hold one unit; older producers omit the id from
        // it, so fall back to the only unit there is.
        units
            .iter()
            .position(|u| u.dwo_id() == Some(hash))
            .or_else(|| (units.len() == 1 && units[0].dwo_id().is_none()).then_some(0))
    }

    pub fn dwo_compile_unit_for_hash(&self, hash: u64) -> Option<&Unit> {
        let i = self.dwo_compile_unit_index_for_hash(hash)?;
        self.dwo_compile_units().get(i)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::halt_on_error;
    use crate::testutil::{self, SectionWriter};

    #[test]
    fn every_entry_is_found_by_offset() {
        let ctx = testutil::sample_context();
        for unit in ctx.compile_units() {
            let root = unit.unit_die(&ctx).unwrap();
            let mut stack = vec![root];
            while let Some(die) = stack.pop() {
                assert_eq!(ctx.die_for_offset(die.offset()), Some(die));
                stack.extend(die.children());
            }
        }
        assert_eq!(ctx.max_version(), 4);
    }

    #[test]
    fn broken_unit_is_skipped() {
        // A version 9 unit followed by the sample unit.
        let mut info = SectionWriter::new();
        info.u32(7).u16(9).u32(0).u8(8);
        let sample = testutil::sample_sections();
        info.bytes(sample.get(SectionId::Info).data());

        let mut sections = Sections::default();
        sections.insert(SectionId::Info, Section::new(info.into_vec()));
        for id in [SectionId::Abbrev, SectionId::Str, SectionId::Line] {
            sections.insert(id, sample.get(id).clone());
        }

        let ctx = Context::builder().sections(sections.clone()).build();
        assert_eq!(ctx.compile_units().len(), 1);
        assert_eq!(ctx.compile_units()[0].offset(), 11);

        let strict = Context::builder()
            .sections(sections)
            .error_handler(Rc::new(halt_on_error))
            .build();
        assert!(strict.compile_units().is_empty());
    }

    #[test]
    fn line_tables_are_parsed_once() {
        let ctx = testutil::sample_context();
        let unit = &ctx.compile_units()[0];
        let a = ctx.line_table_for_unit(unit).unwrap();
        let b = ctx.line_table_for_unit(unit).unwrap();
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(a.prologue().file_names[0].name, "main.c");
    }

    #[test]
    fn gdb_index_is_parsed_once() {
        let ctx = testutil::sample_context_with(
            SectionId::GdbIndex,
            testutil::gdb_index(&[("main", 0)]),
        );
        let index = ctx.gdb_index();
        assert!(std::ptr::eq(index, ctx.gdb_index()));
        assert_eq!(index.compile_units().len(), 2);
        assert_eq!(index.find("main").map(|s| s.slot), index.symbols().first().map(|s| s.slot));

        let mut broken = testutil::gdb_index(&[]);
        broken[0..4].copy_from_slice(&3u32.to_le_bytes());
        let ctx = testutil::sample_context_with(SectionId::GdbIndex, broken);
        assert!(ctx.gdb_index().is_empty());
    }

    #[test]
    fn missing_split_file_is_recoverable() {
        let ctx = testutil::sample_context();
        assert!(ctx
            .dwo_context(Path::new("/nonexistent/dir/x.dwo"))
            .is_none());
        // The owning context is still usable.
        assert_eq!(ctx.compile_units().len(), 1);
    }

    #[test]
    fn split_contexts_are_shared_while_alive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b.dwo");
        std::fs::write(&path, testutil::dwo_object(0x1234)).unwrap();

        let ctx = testutil::sample_context();
        let first = ctx.dwo_context(&path).unwrap();
        let second = ctx.dwo_context(&path).unwrap();
        assert!(DwoContext::ptr_eq(&first, &second));
        assert_eq!(first.dwo_compile_units().len(), 1);

        drop(first);
        drop(second);
        let third = ctx.dwo_context(&path).unwrap();
        assert_eq!(third.dwo_compile_unit_for_hash(0x1234).map(Unit::offset), Some(0));
    }

    #[test]
    fn released_split_files_leave_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        let paths: Vec<_> = ["a.dwo", "b.dwo", "c.dwo"]
            .iter()
            .map(|name| dir.path().join(name))
            .collect();
        for (i, path) in paths.iter().enumerate() {
            std::fs::write(path, testutil::dwo_object(i as u64)).unwrap();
        }

        let ctx = testutil::sample_context();
        let kept = ctx.dwo_context(&paths[0]).unwrap();
        drop(ctx.dwo_context(&paths[1]).unwrap());
        let _last = ctx.dwo_context(&paths[2]).unwrap();

        let cached: Vec<_> = {
            let files = ctx.dwo_files.borrow();
            let mut names: Vec<_> = files.keys().cloned().collect();
            names.sort();
            names
        };
        assert_eq!(cached, vec![paths[0].clone(), paths[2].clone()]);
        assert_eq!(kept.file().path(), paths[0].as_path());
    }
}
