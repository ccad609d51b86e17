//! A DWARF decoder and query engine.
//!
//! Load an object file with [`parse_file`] (or assemble sections by hand
//! with [`ContextBuilder`]) to get a [`Context`]. The context parses units,
//! line tables and the other debug sections lazily, resolves addresses to
//! source locations and inlining stacks, follows skeleton units into their
//! `.dwo`/`.dwp` files, and can check the whole thing for consistency.

pub mod abbrev;
pub mod accel;
pub mod aranges;
pub mod context;
pub mod die;
pub mod error;
pub mod form;
pub mod frame;
pub mod gdb_index;
pub mod line;
pub mod loc;
pub mod lookup;
pub mod macinfo;
pub mod ranges;
pub mod reader;
pub mod section;
pub mod unit;
pub mod unit_index;
pub mod verify;

#[cfg(test)]
pub(crate) mod testutil;

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

use object::{CompressionFormat, Object, ObjectSection, ObjectSymbol, RelocationTarget};

pub use context::{Context, ContextBuilder, DwoContext};
pub use die::Die;
pub use error::{default_error_handler, halt_on_error, Error, ErrorHandler, ErrorPolicy, Result};
pub use lookup::{FileLineInfoKind, FunctionNameKind, InliningInfo, LineInfo, LineInfoSpecifier};
pub use section::{RelocationMap, Section, SectionId, Sections};
pub use unit::{Unit, UnitSection};
pub use verify::{Diagnostic, DiagnosticKind, VerifyTarget};

// Internal type abbreviations
pub(crate) type BTreeIndex<I, K> = BTreeMap<K, BTreeSet<I>>;

/// Debug sections pulled out of an object file, with what we learned about
/// the target along the way.
pub(crate) struct LoadedSections {
    pub endian: gimli::RunTimeEndian,
    pub address_size: u8,
    pub sections: Sections,
}

/// Finds every debug section in the object file image `data`.
///
/// Uncompressed sections are windows onto `data`; compressed ones are
/// inflated into their own buffers. Any relocations recorded against a
/// section are resolved into its relocation map; linked images normally
/// carry none for their debug sections.
pub(crate) fn load_sections(data: &Arc<[u8]>) -> Result<LoadedSections> {
    let object = object::File::parse(&**data)?;
    let endian = if object.is_little_endian() {
        gimli::RunTimeEndian::Little
    } else {
        gimli::RunTimeEndian::Big
    };
    let address_size = if object.is_64() { 8 } else { 4 };

    let mut sections = Sections::default();
    for section in object.sections() {
        let Some(id) = section.name().ok().and_then(SectionId::from_name) else {
            continue;
        };

        let range = section.compressed_file_range()?;
        let shared = if range.format == CompressionFormat::None {
            usize::try_from(range.offset)
                .ok()
                .zip(usize::try_from(range.uncompressed_size).ok())
                .and_then(|(start, len)| Section::shared(data.clone(), start..start.checked_add(len)?))
        } else {
            None
        };
        let mut loaded = match shared {
            Some(s) => s,
            None => match section.uncompressed_data()? {
                Cow::Borrowed(b) => Section::new(b.to_vec()),
                Cow::Owned(v) => Section::new(v),
            },
        };

        let relocs = relocation_map(&object, &section);
        if !relocs.is_empty() {
            loaded = loaded.with_relocations(relocs);
        }
        tracing::trace!(section = id.name(), size = loaded.len(), "loaded section");
        sections.insert(id, loaded);
    }

    Ok(LoadedSections {
        endian,
        address_size,
        sections,
    })
}

/// Resolves the relocations against `section` to the values they patch in:
/// the target's address, plus the addend when it isn't stored in place.
fn relocation_map<'d>(object: &object::File<'d>, section: &object::Section<'d, '_>) -> RelocationMap {
    let mut map = RelocationMap::new();
    for (offset, reloc) in section.relocations() {
        let target = match reloc.target() {
            RelocationTarget::Symbol(index) => match object.symbol_by_index(index) {
                Ok(symbol) => symbol.address(),
                Err(_) => continue,
            },
            RelocationTarget::Section(index) => match object.section_by_index(index) {
                Ok(s) => s.address(),
                Err(_) => continue,
            },
            _ => continue,
        };
        let addend = if reloc.has_implicit_addend() {
            0
        } else {
            reloc.addend() as u64
        };
        map.insert(offset, target.wrapping_add(addend));
    }
    map
}

/// Reads the object file at `path` and builds a context over its debug
/// info, reporting recoverable errors through the default handler.
pub fn parse_file(path: impl AsRef<Path>) -> Result<Context> {
    parse_file_with(path, Rc::new(default_error_handler))
}

pub fn parse_file_with(path: impl AsRef<Path>, handler: ErrorHandler) -> Result<Context> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_object_data(path, data.into(), handler)
}

/// Builds a context over an object file image already in memory. `path`
/// names the file for split-file discovery.
pub fn parse_object_data(path: &Path, data: Arc<[u8]>, handler: ErrorHandler) -> Result<Context> {
    let loaded = load_sections(&data)?;
    tracing::debug!(
        path = %path.display(),
        endian = ?loaded.endian,
        address_size = loaded.address_size,
        "loaded object file"
    );
    Ok(Context::builder()
        .file_name(path)
        .endian(loaded.endian)
        .address_size(loaded.address_size)
        .error_handler(handler)
        .sections(loaded.sections)
        .build())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn loads_sections_from_elf() {
        let data: Arc<[u8]> = testutil::dwo_object(0x77).into();
        let loaded = load_sections(&data).unwrap();
        assert_eq!(loaded.address_size, 8);
        assert_eq!(loaded.endian, gimli::RunTimeEndian::Little);
        assert!(loaded.sections.contains(SectionId::InfoDwo));
        assert!(loaded.sections.contains(SectionId::AbbrevDwo));
        assert_eq!(loaded.sections.get(SectionId::StrDwo).data(), b"\0b.c\0");
        assert!(!loaded.sections.contains(SectionId::Info));
    }

    #[test]
    fn relocations_resolve_to_symbol_plus_addend() {
        let data: Arc<[u8]> = testutil::relocated_object(0x1000, 0x10).into();
        let loaded = load_sections(&data).unwrap();
        let ranges = loaded.sections.get(SectionId::Ranges);
        assert_eq!(ranges.len(), 16);
        assert_eq!(ranges.relocations().get(&0), Some(&0x1010));
        assert!(loaded.sections.get(SectionId::Info).relocations().is_empty());
    }

    #[test]
    fn parse_missing_file() {
        let err = parse_file("/nonexistent/object/file").unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn parse_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.dwo");
        std::fs::write(&path, testutil::dwo_object(0x77)).unwrap();
        let ctx = parse_file(&path).unwrap();
        assert_eq!(ctx.file_name(), Some(path.as_path()));
        let unit = ctx.dwo_compile_unit_for_hash(0x77).unwrap();
        assert_eq!(unit.dwo_id(), Some(0x77));
        assert!(ctx.compile_units().is_empty());
    }
}
