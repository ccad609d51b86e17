//! Lightweight handles onto parsed entries.

use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;

use gimli::constants as gim_con;
use gimli::{DwAt, DwTag};

use crate::abbrev::AbbreviationDeclaration;
use crate::context::Context;
use crate::form::{FormClass, FormValue};
use crate::lookup::FunctionNameKind;
use crate::ranges::AddressRange;
use crate::unit::{AttributeIter, DebugInfoEntry, Unit};

/// How many entries a recursive attribute search will visit through
/// `DW_AT_abstract_origin` and `DW_AT_specification` links before giving up.
const MAX_REFERENCE_CHASE: usize = 64;

/// A position in a unit's entry array.
///
/// Handles are `Copy` and only valid as long as the context that produced
/// them. Two handles are equal when they point at the same entry of the same
/// unit.
#[derive(Copy, Clone)]
pub struct Die<'a> {
    ctx: &'a Context,
    unit: &'a Unit,
    index: usize,
}

impl PartialEq for Die<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.unit, other.unit) && self.index == other.index
    }
}

impl Eq for Die<'_> {}

impl fmt::Debug for Die<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Die")
            .field("offset", &format_args!("{:#x}", self.offset()))
            .field("tag", &self.tag())
            .finish()
    }
}

/// Caller information recorded on an inlined subroutine.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct CallerFrame {
    pub file: u64,
    pub line: u64,
    pub column: u64,
    pub discriminator: u64,
}

impl<'a> Die<'a> {
    pub(crate) fn new(ctx: &'a Context, unit: &'a Unit, index: usize) -> Self {
        Self { ctx, unit, index }
    }

    pub fn context(&self) -> &'a Context {
        self.ctx
    }

    pub fn unit(&self) -> &'a Unit {
        self.unit
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn entry(&self) -> &'a DebugInfoEntry {
        &self.unit.entries()[self.index]
    }

    pub fn offset(&self) -> u64 {
        self.entry().offset
    }

    pub fn depth(&self) -> u32 {
        self.entry().depth
    }

    pub fn is_null(&self) -> bool {
        self.entry().is_null()
    }

    pub fn abbreviation(&self) -> Option<&'a AbbreviationDeclaration> {
        self.unit.abbreviation(self.entry())
    }

    pub fn tag(&self) -> DwTag {
        self.abbreviation()
            .map_or(gim_con::DW_TAG_null, |a| a.tag())
    }

    pub fn has_children(&self) -> bool {
        self.abbreviation().map_or(false, |a| a.has_children())
    }

    pub fn is_subprogram(&self) -> bool {
        self.tag() == gim_con::DW_TAG_subprogram
    }

    pub fn is_subroutine(&self) -> bool {
        matches!(
            self.tag(),
            gim_con::DW_TAG_subprogram | gim_con::DW_TAG_inlined_subroutine
        )
    }

    pub fn parent(&self) -> Option<Die<'a>> {
        let parent = self.entry().parent?;
        Some(Die::new(self.ctx, self.unit, parent))
    }

    /// The next entry at the same depth, which may be the null entry that
    /// closes the parent's children.
    pub fn sibling(&self) -> Option<Die<'a>> {
        let entries = self.unit.entries();
        if let Some(target) = self.find(gim_con::DW_AT_sibling).and_then(|v| v.as_reference()) {
            if let Some(index) = self.unit.index_of_offset(target) {
                if index > self.index {
                    return Some(Die::new(self.ctx, self.unit, index));
                }
            }
        }
        let depth = self.depth();
        for (i, e) in entries.iter().enumerate().skip(self.index + 1) {
            if e.depth == depth {
                return Some(Die::new(self.ctx, self.unit, i));
            }
            if e.depth < depth {
                break;
            }
        }
        None
    }

    pub fn first_child(&self) -> Option<Die<'a>> {
        if !self.has_children() || self.index + 1 >= self.unit.entries().len() {
            return None;
        }
        Some(Die::new(self.ctx, self.unit, self.index + 1))
    }

    pub fn children(&self) -> Children<'a> {
        Children {
            next: self.first_child(),
        }
    }

    pub fn attributes(&self) -> AttributeIter<'a> {
        self.unit.attributes(self.entry())
    }

    pub fn find(&self, attr: DwAt) -> Option<FormValue<'a>> {
        self.unit.find_attribute(self.entry(), attr)
    }

    /// The value of the first attribute in `attrs` present on this entry.
    pub fn find_any(&self, attrs: &[DwAt]) -> Option<FormValue<'a>> {
        attrs.iter().find_map(|&a| self.find(a))
    }

    /// Like [`Die::find_any`], but also searches the entries named by
    /// `DW_AT_abstract_origin` and `DW_AT_specification`, depth first,
    /// abstract origin first.
    pub fn find_recursively(&self, attrs: &[DwAt]) -> Option<FormValue<'a>> {
        let mut stack = vec![*self];
        let mut seen = HashSet::new();
        while let Some(die) = stack.pop() {
            if seen.len() >= MAX_REFERENCE_CHASE || !seen.insert((die.unit as *const Unit, die.index)) {
                continue;
            }
            if let Some(v) = die.find_any(attrs) {
                return Some(v);
            }
            if let Some(spec) = die.attribute_as_die(gim_con::DW_AT_specification) {
                stack.push(spec);
            }
            if let Some(origin) = die.attribute_as_die(gim_con::DW_AT_abstract_origin) {
                stack.push(origin);
            }
        }
        None
    }

    /// Follows a reference-valued attribute to the entry it names.
    pub fn attribute_as_die(&self, attr: DwAt) -> Option<Die<'a>> {
        let value = self.find(attr)?;
        let offset = value.as_reference()?;
        if value.form() == gim_con::DW_FORM_ref_addr {
            self.ctx.die_for_offset_in(self.unit.origin(), offset)
        } else {
            self.unit.die_for_offset(self.ctx, offset)
        }
    }

    pub fn low_pc(&self) -> Option<u64> {
        self.find(gim_con::DW_AT_low_pc)?.as_address()
    }

    /// `DW_AT_high_pc`, which since DWARF 4 may be an offset from `low_pc`.
    pub fn high_pc(&self, low_pc: u64) -> Option<u64> {
        let value = self.find(gim_con::DW_AT_high_pc)?;
        if value.is_form_class(FormClass::Address) {
            value.as_address()
        } else {
            value.as_unsigned().map(|len| low_pc.wrapping_add(len))
        }
    }

    pub fn low_and_high_pc(&self) -> Option<(u64, u64)> {
        let low = self.low_pc()?;
        Some((low, self.high_pc(low)?))
    }

    /// Address ranges covered by this entry, from `low_pc`/`high_pc` or
    /// from its range list.
    pub fn address_ranges(&self) -> Vec<AddressRange> {
        if let Some((low, high)) = self.low_and_high_pc() {
            return vec![AddressRange { low, high }];
        }
        let Some(offset) = self
            .find(gim_con::DW_AT_ranges)
            .and_then(|v| v.as_section_offset())
        else {
            return vec![];
        };
        match self.unit.range_list(offset) {
            Ok(list) => list.absolute_ranges(self.unit.base_address()),
            Err(err) => {
                tracing::debug!(die = self.offset(), %err, "unreadable range list");
                vec![]
            }
        }
    }

    /// Appends the ranges of every subprogram at or below this entry.
    pub fn collect_children_address_ranges(&self, out: &mut Vec<AddressRange>) {
        let mut stack = vec![*self];
        while let Some(die) = stack.pop() {
            if die.is_subprogram() {
                out.extend(die.address_ranges());
            }
            stack.extend(die.children());
        }
    }

    pub fn contains_address(&self, address: u64) -> bool {
        self.address_ranges().iter().any(|r| r.contains(address))
    }

    pub fn name(&self, kind: FunctionNameKind) -> Option<Cow<'a, str>> {
        if kind == FunctionNameKind::None {
            return None;
        }
        if kind == FunctionNameKind::LinkageName {
            let linkage = self.find_recursively(&[
                gim_con::DW_AT_MIPS_linkage_name,
                gim_con::DW_AT_linkage_name,
            ]);
            if let Some(name) = linkage.and_then(|v| v.as_str()) {
                return Some(name);
            }
        }
        self.find_recursively(&[gim_con::DW_AT_name])?.as_str()
    }

    /// The name of a subprogram or inlined subroutine. Other entries have
    /// none.
    pub fn subroutine_name(&self, kind: FunctionNameKind) -> Option<Cow<'a, str>> {
        if !self.is_subroutine() {
            return None;
        }
        self.name(kind)
    }

    pub fn decl_line(&self) -> Option<u64> {
        self.find_recursively(&[gim_con::DW_AT_decl_line])?
            .as_unsigned()
    }

    pub fn caller_frame(&self) -> CallerFrame {
        let get = |attr| self.find(attr).and_then(|v| v.as_unsigned()).unwrap_or(0);
        CallerFrame {
            file: get(gim_con::DW_AT_call_file),
            line: get(gim_con::DW_AT_call_line),
            column: get(gim_con::DW_AT_call_column),
            discriminator: get(gim_con::DW_AT_GNU_discriminator),
        }
    }
}

/// Iterator over the non-null children of an entry.
pub struct Children<'a> {
    next: Option<Die<'a>>,
}

impl<'a> Iterator for Children<'a> {
    type Item = Die<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let die = self.next.take()?;
        if die.is_null() {
            return None;
        }
        self.next = die.sibling();
        Some(die)
    }
}
