//! Compile and type units: headers, the flat entry array, and the per-unit
//! views of the string, address and range sections.

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use gimli::constants as gim_con;
use gimli::{DwAt, Format, RunTimeEndian};
use once_cell::unsync::OnceCell;

use crate::abbrev::{AbbreviationDeclaration, AbbreviationDeclarationSet};
use crate::context::{Context, DwoContext};
use crate::die::Die;
use crate::error::{Error, Result};
use crate::form::{skip_value, FormParams, FormValue};
use crate::ranges::RangeList;
use crate::reader::{initial_length, Reader};
use crate::section::{Section, SectionId};
use crate::unit_index::UnitIndexEntry;

/// Which collection a unit was parsed from.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum UnitSection {
    Info,
    /// The n-th `.debug_types` section.
    Types(usize),
    InfoDwo,
    TypesDwo(usize),
}

impl UnitSection {
    pub fn is_dwo(self) -> bool {
        matches!(self, Self::InfoDwo | Self::TypesDwo(_))
    }

    pub fn is_types(self) -> bool {
        matches!(self, Self::Types(_) | Self::TypesDwo(_))
    }

    pub fn section_id(self) -> SectionId {
        match self {
            Self::Info => SectionId::Info,
            Self::Types(_) => SectionId::Types,
            Self::InfoDwo => SectionId::InfoDwo,
            Self::TypesDwo(_) => SectionId::TypesDwo,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum UnitKind {
    Compile,
    Type,
    Partial,
    Skeleton,
    SplitCompile,
    SplitType,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct UnitHeader {
    pub offset: u64,
    pub format: Format,
    pub version: u16,
    pub kind: UnitKind,
    pub address_size: u8,
    pub abbrev_offset: u64,
    pub type_signature: Option<u64>,
    /// Unit-relative offset of the type DIE, for type units.
    pub type_offset: Option<u64>,
    pub dwo_id: Option<u64>,
    first_entry_offset: u64,
    next_unit_offset: u64,
}

impl UnitHeader {
    /// Parses a unit header at `offset`, leaving `offset` at the first
    /// entry.
    pub fn parse(reader: &Reader, offset: &mut u64, origin: UnitSection) -> Result<Self> {
        let start = *offset;
        let (length, format) = initial_length(reader, offset)?;
        let next_unit_offset = offset
            .checked_add(length)
            .filter(|&end| end <= reader.len())
            .ok_or(Error::MalformedHeader {
                offset: start,
                reason: "unit length runs past the end of the section",
            })?;

        let version = reader.u16(offset)?;
        if !(2..=5).contains(&version) {
            return Err(Error::UnsupportedVersion {
                version,
                offset: start,
            });
        }

        let word = format.word_size();
        let (kind, address_size, abbrev_offset) = if version >= 5 {
            let kind = match gimli::DwUt(reader.u8(offset)?) {
                gim_con::DW_UT_compile => UnitKind::Compile,
                gim_con::DW_UT_type => UnitKind::Type,
                gim_con::DW_UT_partial => UnitKind::Partial,
                gim_con::DW_UT_skeleton => UnitKind::Skeleton,
                gim_con::DW_UT_split_compile => UnitKind::SplitCompile,
                gim_con::DW_UT_split_type => UnitKind::SplitType,
                _ => {
                    return Err(Error::MalformedHeader {
                        offset: start,
                        reason: "unknown unit type",
                    })
                }
            };
            let address_size = reader.u8(offset)?;
            let abbrev_offset = reader.relocated(word, offset)?;
            (kind, address_size, abbrev_offset)
        } else {
            let abbrev_offset = reader.relocated(word, offset)?;
            let address_size = reader.u8(offset)?;
            let kind = if origin.is_types() {
                UnitKind::Type
            } else {
                UnitKind::Compile
            };
            (kind, address_size, abbrev_offset)
        };
        if address_size != 4 && address_size != 8 {
            return Err(Error::MalformedHeader {
                offset: start,
                reason: "unsupported address size",
            });
        }

        let (type_signature, type_offset, dwo_id) = match kind {
            UnitKind::Type | UnitKind::SplitType => {
                let signature = reader.u64(offset)?;
                let type_offset = reader.uint(word, offset)?;
                (Some(signature), Some(type_offset), None)
            }
            UnitKind::Skeleton | UnitKind::SplitCompile => (None, None, Some(reader.u64(offset)?)),
            _ => (None, None, None),
        };

        let first_entry_offset = *offset;
        if first_entry_offset > next_unit_offset {
            return Err(Error::MalformedHeader {
                offset: start,
                reason: "unit header is longer than the unit",
            });
        }
        if let Some(t) = type_offset {
            let in_unit = start
                .checked_add(t)
                .map_or(false, |abs| abs >= first_entry_offset && abs < next_unit_offset);
            if !in_unit {
                return Err(Error::MalformedHeader {
                    offset: start,
                    reason: "type offset points outside the unit",
                });
            }
        }

        Ok(Self {
            offset: start,
            format,
            version,
            kind,
            address_size,
            abbrev_offset,
            type_signature,
            type_offset,
            dwo_id,
            first_entry_offset,
            next_unit_offset,
        })
    }

    /// Reads just enough of a (possibly broken) header to find where the next
    /// unit would start.
    pub fn peek_next_unit_offset(reader: &Reader, offset: u64) -> Option<u64> {
        let mut at = offset;
        let (length, _) = initial_length(reader, &mut at).ok()?;
        at.checked_add(length)
    }

    pub fn form_params(&self) -> FormParams {
        FormParams {
            version: self.version,
            address_size: self.address_size,
            format: self.format,
        }
    }

    pub fn first_entry_offset(&self) -> u64 {
        self.first_entry_offset
    }

    pub fn next_unit_offset(&self) -> u64 {
        self.next_unit_offset
    }

    /// Total size of the unit, including its length field.
    pub fn size(&self) -> u64 {
        self.next_unit_offset - self.offset
    }
}

/// The sections a unit resolves its attributes against.
#[derive(Clone, Debug, Default)]
pub struct UnitSections {
    pub info: Section,
    pub str: Section,
    pub str_offsets: Section,
    pub addr: Section,
    pub line: Section,
    pub line_str: Section,
    pub ranges: Section,
}

/// One raw record of the flattened entry tree.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DebugInfoEntry {
    pub offset: u64,
    /// Zero for the null entries that close a list of children.
    pub abbrev_code: u64,
    pub depth: u32,
    /// Index of the parent entry in the unit's entry array.
    pub parent: Option<usize>,
}

impl DebugInfoEntry {
    pub fn is_null(&self) -> bool {
        self.abbrev_code == 0
    }
}

/// One decoded attribute of an entry.
#[derive(Copy, Clone, Debug)]
pub struct Attribute<'a> {
    pub attr: DwAt,
    /// Offset of the encoded value within the unit's section.
    pub offset: u64,
    pub value: FormValue<'a>,
}

/// Address and range sections lent to a split unit by its skeleton.
#[derive(Clone, Debug)]
struct SkeletonLink {
    addr: Section,
    addr_base: u64,
    ranges: Section,
    ranges_base: u64,
}

/// The split unit a skeleton resolved to, and the `.dwo`/`.dwp` context
/// keeping it alive.
pub struct SplitUnit {
    context: DwoContext,
    index: usize,
}

impl SplitUnit {
    pub fn context(&self) -> &DwoContext {
        &self.context
    }

    pub fn unit(&self) -> &Unit {
        &self.context.dwo_compile_units()[self.index]
    }
}

pub struct Unit {
    header: UnitHeader,
    origin: UnitSection,
    endian: RunTimeEndian,
    sections: UnitSections,
    abbrevs: Arc<AbbreviationDeclarationSet>,
    index_entry: Option<UnitIndexEntry>,
    entries: OnceCell<(Vec<DebugInfoEntry>, Option<Error>)>,
    addr_base: OnceCell<u64>,
    str_offsets_base: OnceCell<u64>,
    skeleton: OnceCell<SkeletonLink>,
    split: OnceCell<Option<SplitUnit>>,
}

impl std::fmt::Debug for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Unit")
            .field("header", &self.header)
            .field("origin", &self.origin)
            .finish()
    }
}

impl Unit {
    pub fn new(
        header: UnitHeader,
        origin: UnitSection,
        endian: RunTimeEndian,
        sections: UnitSections,
        abbrevs: Arc<AbbreviationDeclarationSet>,
        index_entry: Option<UnitIndexEntry>,
    ) -> Self {
        Self {
            header,
            origin,
            endian,
            sections,
            abbrevs,
            index_entry,
            entries: OnceCell::new(),
            addr_base: OnceCell::new(),
            str_offsets_base: OnceCell::new(),
            skeleton: OnceCell::new(),
            split: OnceCell::new(),
        }
    }

    pub fn header(&self) -> &UnitHeader {
        &self.header
    }

    pub fn offset(&self) -> u64 {
        self.header.offset
    }

    pub fn version(&self) -> u16 {
        self.header.version
    }

    pub fn address_size(&self) -> u8 {
        self.header.address_size
    }

    pub fn format(&self) -> Format {
        self.header.format
    }

    pub fn kind(&self) -> UnitKind {
        self.header.kind
    }

    pub fn origin(&self) -> UnitSection {
        self.origin
    }

    pub fn is_dwo(&self) -> bool {
        self.origin.is_dwo()
    }

    pub fn endian(&self) -> RunTimeEndian {
        self.endian
    }

    pub fn next_unit_offset(&self) -> u64 {
        self.header.next_unit_offset
    }

    pub fn size(&self) -> u64 {
        self.header.size()
    }

    pub fn contains_offset(&self, offset: u64) -> bool {
        offset >= self.header.offset && offset < self.header.next_unit_offset
    }

    pub fn sections(&self) -> &UnitSections {
        &self.sections
    }

    pub fn abbreviations(&self) -> &AbbreviationDeclarationSet {
        &self.abbrevs
    }

    pub fn index_entry(&self) -> Option<&UnitIndexEntry> {
        self.index_entry.as_ref()
    }

    pub(crate) fn info_reader(&self) -> Reader<'_> {
        Reader::for_section(&self.sections.info, self.endian, self.header.address_size)
    }

    /// The flattened entry tree, parsed on first use.
    pub fn entries(&self) -> &[DebugInfoEntry] {
        &self.parsed().0
    }

    /// The error that cut entry parsing short, if any. The entries before
    /// it are still available.
    pub fn entries_error(&self) -> Option<&Error> {
        self.parsed().1.as_ref()
    }

    fn parsed(&self) -> &(Vec<DebugInfoEntry>, Option<Error>) {
        self.entries.get_or_init(|| {
            let mut entries = vec![];
            match self.extract_entries(&mut entries) {
                Ok(()) => (entries, None),
                Err(err) => {
                    tracing::warn!(unit = self.offset(), %err, "entry parsing stopped early");
                    (entries, Some(err))
                }
            }
        })
    }

    fn extract_entries(&self, entries: &mut Vec<DebugInfoEntry>) -> Result<()> {
        let reader = self.info_reader();
        let params = self.header.form_params();
        let end = self.header.next_unit_offset;
        let mut offset = self.header.first_entry_offset;
        let mut parents: Vec<usize> = vec![];

        while offset < end {
            let entry_offset = offset;
            let code = reader.uleb128(&mut offset)?;
            let depth = parents.len() as u32;
            let parent = parents.last().copied();
            if code == 0 {
                entries.push(DebugInfoEntry {
                    offset: entry_offset,
                    abbrev_code: 0,
                    depth,
                    parent,
                });
                if parents.pop().is_none() || parents.is_empty() {
                    break;
                }
                continue;
            }

            let decl = self.abbrevs.get(code).ok_or(Error::UnknownAbbreviation {
                code,
                offset: entry_offset,
            })?;
            for spec in decl.attributes() {
                skip_value(spec.form, &reader, &mut offset, params)?;
            }
            if offset > end {
                return Err(Error::OutOfBoundsOffset {
                    section: self.origin.section_id().name(),
                    offset,
                    size: end,
                });
            }

            let index = entries.len();
            entries.push(DebugInfoEntry {
                offset: entry_offset,
                abbrev_code: code,
                depth,
                parent,
            });
            if decl.has_children() {
                parents.push(index);
            } else if parents.is_empty() {
                // A unit entry without children is the whole unit.
                break;
            }
        }
        Ok(())
    }

    pub fn index_of_offset(&self, offset: u64) -> Option<usize> {
        self.entries()
            .binary_search_by_key(&offset, |e| e.offset)
            .ok()
    }

    pub fn abbreviation(&self, entry: &DebugInfoEntry) -> Option<&AbbreviationDeclaration> {
        if entry.is_null() {
            return None;
        }
        self.abbrevs.get(entry.abbrev_code)
    }

    /// Iterates over the decoded attributes of `entry`. Iteration ends after
    /// the first attribute that fails to decode.
    pub fn attributes<'a>(&'a self, entry: &DebugInfoEntry) -> AttributeIter<'a> {
        let decl = self.abbreviation(entry);
        let reader = self.info_reader();
        let mut offset = entry.offset;
        let failed = reader.uleb128(&mut offset).is_err();
        AttributeIter {
            unit: self,
            reader,
            decl,
            index: 0,
            offset,
            failed,
        }
    }

    /// Finds the value of `attr` on `entry`, decoding only that attribute.
    pub fn find_attribute<'a>(&'a self, entry: &DebugInfoEntry, attr: DwAt) -> Option<FormValue<'a>> {
        let decl = self.abbreviation(entry)?;
        let index = decl.find_attribute_index(attr)?;
        let spec = &decl.attributes()[index];
        if let Some(value) = spec.implicit_const {
            return Some(FormValue::implicit_const(value, Some(self)));
        }

        let reader = self.info_reader();
        let params = self.header.form_params();
        let mut offset = entry.offset;
        reader.uleb128(&mut offset).ok()?;
        for skipped in &decl.attributes()[..index] {
            skip_value(skipped.form, &reader, &mut offset, params).ok()?;
        }
        FormValue::extract(spec.form, &reader, &mut offset, params, Some(self)).ok()
    }

    fn unit_entry_attribute(&self, attrs: &[DwAt]) -> Option<FormValue<'_>> {
        let entry = self.entries().first()?;
        attrs.iter().find_map(|&a| self.find_attribute(entry, a))
    }

    pub fn unit_die<'a>(&'a self, ctx: &'a Context) -> Option<Die<'a>> {
        self.die_at_index(ctx, 0)
    }

    pub fn die_at_index<'a>(&'a self, ctx: &'a Context, index: usize) -> Option<Die<'a>> {
        let entry = self.entries().get(index)?;
        if entry.is_null() {
            return None;
        }
        Some(Die::new(ctx, self, index))
    }

    pub fn die_for_offset<'a>(&'a self, ctx: &'a Context, offset: u64) -> Option<Die<'a>> {
        let index = self.index_of_offset(offset)?;
        self.die_at_index(ctx, index)
    }

    /// Every non-null entry, in section order.
    pub fn dies<'a>(&'a self, ctx: &'a Context) -> impl Iterator<Item = Die<'a>> + 'a {
        (0..self.entries().len()).filter_map(move |i| self.die_at_index(ctx, i))
    }

    /// The base for relative addresses in this unit's range and location
    /// lists.
    pub fn base_address(&self) -> Option<u64> {
        self.unit_entry_attribute(&[gim_con::DW_AT_low_pc, gim_con::DW_AT_entry_pc])?
            .as_address()
    }

    pub fn comp_dir(&self) -> Option<Cow<'_, str>> {
        self.unit_entry_attribute(&[gim_con::DW_AT_comp_dir])?.as_str()
    }

    /// Offset of this unit's line table, adjusted for its contribution when
    /// it comes from a package file.
    pub fn stmt_list(&self) -> Option<u64> {
        let offset = self
            .unit_entry_attribute(&[gim_con::DW_AT_stmt_list])?
            .as_section_offset()?;
        let base = self
            .index_entry
            .as_ref()
            .and_then(|e| e.contribution(gim_con::DW_SECT_V2_LINE))
            .map_or(0, |c| c.offset);
        Some(base + offset)
    }

    pub fn dwo_id(&self) -> Option<u64> {
        self.header.dwo_id.or_else(|| {
            self.unit_entry_attribute(&[gim_con::DW_AT_GNU_dwo_id])?
                .as_unsigned()
        })
    }

    pub fn dwo_name(&self) -> Option<Cow<'_, str>> {
        self.unit_entry_attribute(&[gim_con::DW_AT_GNU_dwo_name, gim_con::DW_AT_dwo_name])?
            .as_str()
    }

    fn address_pool(&self) -> (&Section, u64) {
        if let Some(link) = self.skeleton.get() {
            return (&link.addr, link.addr_base);
        }
        let base = *self.addr_base.get_or_init(|| {
            self.unit_entry_attribute(&[gim_con::DW_AT_addr_base, gim_con::DW_AT_GNU_addr_base])
                .and_then(|v| v.as_section_offset())
                .unwrap_or(0)
        });
        (&self.sections.addr, base)
    }

    /// Looks up entry `index` of this unit's `.debug_addr` contribution.
    pub fn address_at_index(&self, index: u64) -> Option<u64> {
        let (section, base) = self.address_pool();
        let size = u64::from(self.header.address_size);
        let reader = Reader::for_section(section, self.endian, self.header.address_size);
        let mut offset = index.checked_mul(size)?.checked_add(base)?;
        reader.address(&mut offset).ok()
    }

    fn str_offsets_base(&self) -> u64 {
        *self.str_offsets_base.get_or_init(|| {
            let contribution = self
                .index_entry
                .as_ref()
                .and_then(|e| e.contribution(gim_con::DW_SECT_V2_STR_OFFSETS));
            if let Some(c) = contribution {
                return c.offset;
            }
            self.unit_entry_attribute(&[gim_con::DW_AT_str_offsets_base])
                .and_then(|v| v.as_section_offset())
                .unwrap_or(0)
        })
    }

    /// Looks up entry `index` of this unit's string offsets table.
    pub fn string_offset_at_index(&self, index: u64) -> Option<u64> {
        let word = self.header.format.word_size();
        let reader = Reader::for_section(&self.sections.str_offsets, self.endian, self.header.address_size);
        let mut offset = index
            .checked_mul(u64::from(word))?
            .checked_add(self.str_offsets_base())?;
        reader.relocated(word, &mut offset).ok()
    }

    pub fn debug_str(&self, offset: u64) -> Option<&[u8]> {
        let mut offset = offset;
        Reader::new(self.sections.str.data(), self.endian, self.header.address_size)
            .cstr(&mut offset)
            .ok()
    }

    pub fn debug_line_str(&self, offset: u64) -> Option<&[u8]> {
        let mut offset = offset;
        Reader::new(self.sections.line_str.data(), self.endian, self.header.address_size)
            .cstr(&mut offset)
            .ok()
    }

    /// Parses the range list at `offset` in this unit's ranges section.
    /// Split units read the skeleton's section, relative to its ranges base.
    pub fn range_list(&self, offset: u64) -> Result<RangeList> {
        let (section, base) = match self.skeleton.get() {
            Some(link) => (&link.ranges, link.ranges_base),
            None => (&self.sections.ranges, 0),
        };
        let reader = Reader::for_section(section, self.endian, self.header.address_size);
        let mut at = base.checked_add(offset).ok_or(Error::OutOfBoundsOffset {
            section: SectionId::Ranges.name(),
            offset,
            size: section.len(),
        })?;
        RangeList::extract(&reader, &mut at)
    }

    /// For a skeleton unit, locates and loads the split unit carrying its
    /// real debug info. The result, including failure, is cached.
    pub fn split_unit<'a>(&'a self, ctx: &'a Context) -> Option<(&'a Context, &'a Unit)> {
        if self.is_dwo() {
            return None;
        }
        let split = self.split.get_or_init(|| self.load_split_unit(ctx));
        split.as_ref().map(|s| (&**s.context(), s.unit()))
    }

    fn load_split_unit(&self, ctx: &Context) -> Option<SplitUnit> {
        let name = self.dwo_name()?;
        let path = match self.comp_dir() {
            Some(dir) if Path::new(&*name).is_relative() && !dir.is_empty() => {
                Path::new(&*dir).join(&*name)
            }
            _ => PathBuf::from(&*name),
        };
        let id = self.dwo_id()?;
        let dwo = ctx.dwo_context(&path)?;
        let Some(index) = dwo.dwo_compile_unit_index_for_hash(id) else {
            tracing::debug!(path = %path.display(), id, "no split unit with matching id");
            return None;
        };

        let (addr, addr_base) = self.address_pool();
        let ranges_base = self
            .unit_entry_attribute(&[gim_con::DW_AT_GNU_ranges_base, gim_con::DW_AT_rnglists_base])
            .and_then(|v| v.as_section_offset())
            .unwrap_or(0);
        let link = SkeletonLink {
            addr: addr.clone(),
            addr_base,
            ranges: self.sections.ranges.clone(),
            ranges_base,
        };
        if dwo.dwo_compile_units()[index].skeleton.set(link).is_err() {
            tracing::debug!(id, "split unit was already linked to a skeleton");
        }
        Some(SplitUnit {
            context: dwo,
            index,
        })
    }
}

pub struct AttributeIter<'a> {
    unit: &'a Unit,
    reader: Reader<'a>,
    decl: Option<&'a AbbreviationDeclaration>,
    index: usize,
    offset: u64,
    failed: bool,
}

impl<'a> Iterator for AttributeIter<'a> {
    type Item = Result<Attribute<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let spec = *self.decl?.attributes().get(self.index)?;
        self.index += 1;
        let offset = self.offset;
        let value = match spec.implicit_const {
            Some(v) => Ok(FormValue::implicit_const(v, Some(self.unit))),
            None => FormValue::extract(
                spec.form,
                &self.reader,
                &mut self.offset,
                self.unit.header.form_params(),
                Some(self.unit),
            ),
        };
        match value {
            Ok(value) => Some(Ok(Attribute {
                attr: spec.attr,
                offset,
                value,
            })),
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testutil::{self, SectionWriter};

    #[test]
    fn header_v4_and_v5() {
        let mut w = SectionWriter::new();
        w.u32(7).u16(4).u32(0x20).u8(8);
        w.u32(8).u16(5).u8(gim_con::DW_UT_compile.0).u8(4).u32(0);
        let data = w.into_vec();
        let r = Reader::new(&data, RunTimeEndian::Little, 0);

        let mut off = 0;
        let h = UnitHeader::parse(&r, &mut off, UnitSection::Info).unwrap();
        assert_eq!(h.version, 4);
        assert_eq!(h.abbrev_offset, 0x20);
        assert_eq!(h.address_size, 8);
        assert_eq!(h.first_entry_offset(), 11);
        assert_eq!(h.next_unit_offset(), 11);

        let mut off = h.next_unit_offset();
        let h = UnitHeader::parse(&r, &mut off, UnitSection::Info).unwrap();
        assert_eq!(h.version, 5);
        assert_eq!(h.kind, UnitKind::Compile);
        assert_eq!(h.address_size, 4);
        assert_eq!(h.size(), 12);
    }

    #[test]
    fn header_rejects_nonsense() {
        let mut w = SectionWriter::new();
        w.u32(7).u16(6).u32(0).u8(8);
        let data = w.into_vec();
        let r = Reader::new(&data, RunTimeEndian::Little, 0);
        let mut off = 0;
        assert!(matches!(
            UnitHeader::parse(&r, &mut off, UnitSection::Info),
            Err(Error::UnsupportedVersion { version: 6, .. })
        ));
        assert_eq!(UnitHeader::peek_next_unit_offset(&r, 0), Some(11));

        let mut w = SectionWriter::new();
        w.u32(100).u16(4).u32(0).u8(8);
        let data = w.into_vec();
        let r = Reader::new(&data, RunTimeEndian::Little, 0);
        let mut off = 0;
        assert!(matches!(
            UnitHeader::parse(&r, &mut off, UnitSection::Info),
            Err(Error::MalformedHeader { .. })
        ));

        let mut w = SectionWriter::new();
        w.u32(7).u16(4).u32(0).u8(3);
        let data = w.into_vec();
        let r = Reader::new(&data, RunTimeEndian::Little, 0);
        let mut off = 0;
        assert!(UnitHeader::parse(&r, &mut off, UnitSection::Info).is_err());
    }

    #[test]
    fn type_unit_header() {
        let mut w = SectionWriter::new();
        w.u32(21).u16(4).u32(0).u8(8).u64(0xfeed).u32(23);
        w.u8(0).u8(0);
        let data = w.into_vec();
        let r = Reader::new(&data, RunTimeEndian::Little, 0);
        let mut off = 0;
        let h = UnitHeader::parse(&r, &mut off, UnitSection::Types(0)).unwrap();
        assert_eq!(h.kind, UnitKind::Type);
        assert_eq!(h.type_signature, Some(0xfeed));
        assert_eq!(h.first_entry_offset(), 23);
    }

    #[test]
    fn entry_tree_shape() {
        let ctx = testutil::sample_context();
        let unit = &ctx.compile_units()[0];
        let entries = unit.entries();
        assert!(unit.entries_error().is_none());

        // Unit entry at depth 0, everything else below it.
        assert_eq!(entries[0].depth, 0);
        assert_eq!(entries[0].parent, None);
        assert!(entries[1..].iter().all(|e| e.depth >= 1));
        // Closing null of the unit is the last thing parsed.
        let last = entries.last().unwrap();
        assert!(last.is_null());
        assert_eq!(last.depth, 1);
        assert_eq!(last.parent, Some(0));

        for (i, e) in entries.iter().enumerate() {
            assert_eq!(unit.index_of_offset(e.offset), Some(i));
            if let Some(p) = e.parent {
                assert!(p < i);
                assert_eq!(entries[p].depth + 1, e.depth);
            }
        }
    }

    #[test]
    fn unknown_abbreviation_stops_the_unit() {
        let ctx = testutil::context_with_bad_abbrev_code();
        let unit = &ctx.compile_units()[0];
        assert!(matches!(
            unit.entries_error(),
            Some(Error::UnknownAbbreviation { code: 0x55, .. })
        ));
        // The unit entry and the first child survive.
        assert_eq!(unit.entries().len(), 2);
    }

    #[test]
    fn broken_unit_precedes_the_sample() {
        let sample = testutil::sample_context();
        let ctx = testutil::context_with_broken_unit();
        let info = ctx.section(SectionId::Info);
        // An 11 byte version 9 header sits in front of the sample unit.
        assert_eq!(info.len(), sample.section(SectionId::Info).len() + 11);
        assert_eq!(&info.data()[11..], sample.section(SectionId::Info).data());
        // The broken unit is skipped and the sample unit still parses.
        let offsets: Vec<_> = ctx.compile_units().iter().map(|u| u.offset()).collect();
        assert_eq!(offsets, [11]);
    }

    #[test]
    fn unit_attributes() {
        let ctx = testutil::sample_context();
        let unit = &ctx.compile_units()[0];
        assert_eq!(unit.base_address(), Some(testutil::CU_LOW_PC));
        assert_eq!(unit.comp_dir().as_deref(), Some("/src"));
        assert_eq!(unit.stmt_list(), Some(0));
        assert_eq!(unit.dwo_id(), None);
        assert!(unit.split_unit(&ctx).is_none());
    }
}
