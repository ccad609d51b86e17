//! Abbreviation tables (`.debug_abbrev`).

use std::sync::Arc;

use gimli::constants as gim_con;
use gimli::{DwAt, DwForm, DwTag};
use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::reader::Reader;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct AttributeSpec {
    pub attr: DwAt,
    pub form: DwForm,
    /// Only present for `DW_FORM_implicit_const`.
    pub implicit_const: Option<i64>,
}

/// The shape shared by every entry that uses one abbreviation code.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AbbreviationDeclaration {
    code: u64,
    tag: DwTag,
    has_children: bool,
    attributes: Vec<AttributeSpec>,
}

impl AbbreviationDeclaration {
    /// Parses one declaration. Returns `None` on the zero code that ends a
    /// set.
    pub fn extract(reader: &Reader, offset: &mut u64) -> Result<Option<Self>> {
        let code = reader.uleb128(offset)?;
        if code == 0 {
            return Ok(None);
        }
        let tag_at = *offset;
        let tag = reader.uleb128(offset)?;
        let tag = u16::try_from(tag).map(DwTag).map_err(|_| Error::MalformedHeader {
            offset: tag_at,
            reason: "abbreviation tag out of range",
        })?;
        let has_children = reader.u8(offset)? == gim_con::DW_CHILDREN_yes.0;

        let mut attributes = vec![];
        loop {
            let spec_at = *offset;
            let attr = reader.uleb128(offset)?;
            let form = reader.uleb128(offset)?;
            if attr == 0 && form == 0 {
                break;
            }
            let (attr, form) = match (u16::try_from(attr), u16::try_from(form)) {
                (Ok(a), Ok(f)) => (DwAt(a), DwForm(f)),
                _ => {
                    return Err(Error::MalformedHeader {
                        offset: spec_at,
                        reason: "attribute or form code out of range",
                    })
                }
            };
            let implicit_const = if form == gim_con::DW_FORM_implicit_const {
                Some(reader.sleb128(offset)?)
            } else {
                None
            };
            attributes.push(AttributeSpec {
                attr,
                form,
                implicit_const,
            });
        }

        Ok(Some(Self {
            code,
            tag,
            has_children,
            attributes,
        }))
    }

    pub fn code(&self) -> u64 {
        self.code
    }

    pub fn tag(&self) -> DwTag {
        self.tag
    }

    pub fn has_children(&self) -> bool {
        self.has_children
    }

    pub fn attributes(&self) -> &[AttributeSpec] {
        &self.attributes
    }

    pub fn find_attribute_index(&self, attr: DwAt) -> Option<usize> {
        self.attributes.iter().position(|spec| spec.attr == attr)
    }
}

/// All declarations that start at one offset in `.debug_abbrev`.
#[derive(Clone, Debug, Default)]
pub struct AbbreviationDeclarationSet {
    offset: u64,
    decls: IndexMap<u64, AbbreviationDeclaration>,
}

impl AbbreviationDeclarationSet {
    pub fn extract(reader: &Reader, offset: &mut u64) -> Result<Self> {
        let start = *offset;
        let mut decls = IndexMap::new();
        while let Some(decl) = AbbreviationDeclaration::extract(reader, offset)? {
            // First declaration wins on duplicate codes.
            decls.entry(decl.code()).or_insert(decl);
        }
        Ok(Self {
            offset: start,
            decls,
        })
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn get(&self, code: u64) -> Option<&AbbreviationDeclaration> {
        self.decls.get(&code)
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AbbreviationDeclaration> + '_ {
        self.decls.values()
    }
}

/// Every abbreviation set in a `.debug_abbrev` section, keyed by offset.
#[derive(Clone, Debug, Default)]
pub struct DebugAbbrev {
    sets: IndexMap<u64, Arc<AbbreviationDeclarationSet>>,
}

impl DebugAbbrev {
    /// Parses sets back to back until the section runs out. A set that
    /// can't be parsed ends the scan; the ones before it remain usable.
    pub fn parse(reader: &Reader) -> Self {
        let mut sets = IndexMap::new();
        let mut offset = 0;
        while reader.is_valid_offset(offset) {
            let start = offset;
            match AbbreviationDeclarationSet::extract(reader, &mut offset) {
                Ok(set) => {
                    sets.insert(start, Arc::new(set));
                }
                Err(err) => {
                    tracing::debug!(%err, offset = start, "abbreviation scan stopped");
                    break;
                }
            }
        }
        Self { sets }
    }

    pub fn set(&self, offset: u64) -> Option<&Arc<AbbreviationDeclarationSet>> {
        self.sets.get(&offset)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<AbbreviationDeclarationSet>> + '_ {
        self.sets.values()
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}
