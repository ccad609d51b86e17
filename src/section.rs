//! Raw debug sections and the names they go by in different containers.

use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;

use once_cell::sync::Lazy;

/// Which debug section a blob of bytes came from.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum SectionId {
    Info,
    Types,
    Abbrev,
    Aranges,
    Frame,
    EhFrame,
    Line,
    LineStr,
    Loc,
    Str,
    StrOffsets,
    Ranges,
    Macinfo,
    Addr,
    InfoDwo,
    TypesDwo,
    AbbrevDwo,
    LineDwo,
    LocDwo,
    StrDwo,
    StrOffsetsDwo,
    CuIndex,
    TuIndex,
    AppleNames,
    AppleTypes,
    AppleNamespaces,
    AppleObjc,
    GdbIndex,
}

impl SectionId {
    /// Maps a container section name onto a section ID.
    ///
    /// Leading `.`, `_` and `z` characters are ignored, which covers ELF
    /// (`.debug_info`), Mach-O (`__debug_info`) and compressed (`.zdebug_info`)
    /// spellings. Mach-O truncates section names to 16 bytes, so the truncated
    /// forms are recognized as aliases.
    pub fn from_name(name: &str) -> Option<Self> {
        let stripped = name.trim_start_matches(|c| c == '.' || c == '_' || c == 'z');
        let id = match stripped {
            "debug_info" => Self::Info,
            "debug_types" => Self::Types,
            "debug_abbrev" => Self::Abbrev,
            "debug_aranges" => Self::Aranges,
            "debug_frame" => Self::Frame,
            "eh_frame" => Self::EhFrame,
            "debug_line" => Self::Line,
            "debug_line_str" => Self::LineStr,
            "debug_loc" => Self::Loc,
            "debug_str" => Self::Str,
            "debug_str_offsets" | "debug_str_offs" => Self::StrOffsets,
            "debug_ranges" => Self::Ranges,
            "debug_macinfo" => Self::Macinfo,
            "debug_addr" => Self::Addr,
            "debug_info.dwo" => Self::InfoDwo,
            "debug_types.dwo" => Self::TypesDwo,
            "debug_abbrev.dwo" => Self::AbbrevDwo,
            "debug_line.dwo" => Self::LineDwo,
            "debug_loc.dwo" => Self::LocDwo,
            "debug_str.dwo" => Self::StrDwo,
            "debug_str_offsets.dwo" => Self::StrOffsetsDwo,
            "debug_cu_index" => Self::CuIndex,
            "debug_tu_index" => Self::TuIndex,
            "apple_names" => Self::AppleNames,
            "apple_types" => Self::AppleTypes,
            "apple_namespaces" | "apple_namespac" => Self::AppleNamespaces,
            "apple_objc" => Self::AppleObjc,
            "gdb_index" => Self::GdbIndex,
            _ => return None,
        };
        Some(id)
    }

    /// Canonical ELF name, used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Self::Info => ".debug_info",
            Self::Types => ".debug_types",
            Self::Abbrev => ".debug_abbrev",
            Self::Aranges => ".debug_aranges",
            Self::Frame => ".debug_frame",
            Self::EhFrame => ".eh_frame",
            Self::Line => ".debug_line",
            Self::LineStr => ".debug_line_str",
            Self::Loc => ".debug_loc",
            Self::Str => ".debug_str",
            Self::StrOffsets => ".debug_str_offsets",
            Self::Ranges => ".debug_ranges",
            Self::Macinfo => ".debug_macinfo",
            Self::Addr => ".debug_addr",
            Self::InfoDwo => ".debug_info.dwo",
            Self::TypesDwo => ".debug_types.dwo",
            Self::AbbrevDwo => ".debug_abbrev.dwo",
            Self::LineDwo => ".debug_line.dwo",
            Self::LocDwo => ".debug_loc.dwo",
            Self::StrDwo => ".debug_str.dwo",
            Self::StrOffsetsDwo => ".debug_str_offsets.dwo",
            Self::CuIndex => ".debug_cu_index",
            Self::TuIndex => ".debug_tu_index",
            Self::AppleNames => ".apple_names",
            Self::AppleTypes => ".apple_types",
            Self::AppleNamespaces => ".apple_namespaces",
            Self::AppleObjc => ".apple_objc",
            Self::GdbIndex => ".gdb_index",
        }
    }
}

/// Relocation targets keyed by the section offset they patch.
pub type RelocationMap = BTreeMap<u64, u64>;

/// An immutable section image plus any relocations that apply to it.
///
/// The bytes are reference counted, so units, line tables and split-file
/// contexts can hang on to a section without borrowing from whoever loaded
/// it. Uncompressed sections typically share one buffer holding the entire
/// object file.
#[derive(Clone, Debug)]
pub struct Section {
    buf: Arc<[u8]>,
    range: Range<usize>,
    relocs: Arc<RelocationMap>,
}

static EMPTY: Lazy<Section> = Lazy::new(Section::default);

impl Default for Section {
    fn default() -> Self {
        Self {
            buf: Arc::from(Vec::<u8>::new()),
            range: 0..0,
            relocs: Arc::default(),
        }
    }
}

impl Section {
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        let buf = data.into();
        let range = 0..buf.len();
        Self {
            buf,
            range,
            relocs: Arc::default(),
        }
    }

    /// Creates a section that is a window onto a larger shared buffer.
    /// Returns `None` if `range` doesn't fit.
    pub fn shared(buf: Arc<[u8]>, range: Range<usize>) -> Option<Self> {
        if range.start > range.end || range.end > buf.len() {
            return None;
        }
        Some(Self {
            buf,
            range,
            relocs: Arc::default(),
        })
    }

    pub fn with_relocations(mut self, relocs: RelocationMap) -> Self {
        self.relocs = Arc::new(relocs);
        self
    }

    pub fn data(&self) -> &[u8] {
        &self.buf[self.range.clone()]
    }

    pub fn len(&self) -> u64 {
        self.range.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    pub fn relocations(&self) -> &RelocationMap {
        &self.relocs
    }

    /// Returns a copy of the section restricted to `len` bytes starting at
    /// `offset`, keeping the relocations whose keys fall inside the window
    /// (rebased to the new start).
    pub fn slice(&self, offset: u64, len: u64) -> Option<Self> {
        let start = usize::try_from(offset).ok()?;
        let len = usize::try_from(len).ok()?;
        let end = start.checked_add(len)?;
        if end > self.range.len() {
            return None;
        }
        let relocs = self
            .relocs
            .range(offset..offset + len as u64)
            .map(|(&k, &v)| (k - offset, v))
            .collect();
        Some(Self {
            buf: self.buf.clone(),
            range: self.range.start + start..self.range.start + end,
            relocs: Arc::new(relocs),
        })
    }
}

/// The full set of debug sections found in one object file.
#[derive(Clone, Debug, Default)]
pub struct Sections {
    slots: BTreeMap<SectionId, Section>,
    // Objects built with -fdebug-types-section may carry several of these,
    // one per COMDAT group.
    types: Vec<Section>,
    types_dwo: Vec<Section>,
}

impl Sections {
    /// Records `section` under `id`. Type sections accumulate; every other
    /// ID keeps the first section it was given.
    pub fn insert(&mut self, id: SectionId, section: Section) {
        match id {
            SectionId::Types => self.types.push(section),
            SectionId::TypesDwo => self.types_dwo.push(section),
            _ => {
                self.slots.entry(id).or_insert(section);
            }
        }
    }

    /// Gets the section for `id`, or an empty section if it's absent. For
    /// the type sections this is the first one found; use
    /// [`Sections::types`] to see them all.
    pub fn get(&self, id: SectionId) -> &Section {
        let found = match id {
            SectionId::Types => self.types.first(),
            SectionId::TypesDwo => self.types_dwo.first(),
            _ => self.slots.get(&id),
        };
        found.unwrap_or(&EMPTY)
    }

    pub fn contains(&self, id: SectionId) -> bool {
        !self.get(id).is_empty()
    }

    pub fn types(&self) -> &[Section] {
        &self.types
    }

    pub fn types_dwo(&self) -> &[Section] {
        &self.types_dwo
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn container_spellings() {
        assert_eq!(SectionId::from_name(".debug_info"), Some(SectionId::Info));
        assert_eq!(SectionId::from_name("__debug_info"), Some(SectionId::Info));
        assert_eq!(SectionId::from_name(".zdebug_line"), Some(SectionId::Line));
        assert_eq!(
            SectionId::from_name("__apple_namespac"),
            Some(SectionId::AppleNamespaces)
        );
        assert_eq!(
            SectionId::from_name(".debug_str_offsets.dwo"),
            Some(SectionId::StrOffsetsDwo)
        );
        assert_eq!(SectionId::from_name(".gdb_index"), Some(SectionId::GdbIndex));
        assert_eq!(SectionId::from_name(".text"), None);
    }

    #[test]
    fn types_accumulate_others_keep_first() {
        let mut s = Sections::default();
        s.insert(SectionId::Types, Section::new(vec![1]));
        s.insert(SectionId::Types, Section::new(vec![2]));
        s.insert(SectionId::Str, Section::new(vec![3]));
        s.insert(SectionId::Str, Section::new(vec![4]));
        assert_eq!(s.types().len(), 2);
        assert_eq!(s.get(SectionId::Str).data(), &[3]);
        assert!(s.get(SectionId::Addr).is_empty());
    }

    #[test]
    fn slice_rebases_relocations() {
        let mut relocs = RelocationMap::new();
        relocs.insert(2, 0x10);
        relocs.insert(6, 0x20);
        let s = Section::new(vec![0u8; 8]).with_relocations(relocs);
        let sub = s.slice(4, 4).unwrap();
        assert_eq!(sub.len(), 4);
        assert_eq!(sub.relocations().get(&2), Some(&0x20));
        assert!(s.slice(6, 4).is_none());
    }
}
