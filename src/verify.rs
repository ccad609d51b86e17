//! Consistency checks over a context's debug info.
//!
//! The verifier is meant to be run on broken input. It never stops at the
//! first problem; every finding becomes a [`Diagnostic`] handed to the
//! caller, and is also logged at `error` level.

use std::collections::BTreeMap;
use std::fmt;

use gimli::constants as gim_con;

use crate::accel::{AcceleratorTable, EMPTY_BUCKET};
use crate::context::Context;
use crate::die::Die;
use crate::error::Error;
use crate::reader::{initial_length, Reader};
use crate::section::SectionId;
use crate::unit::{Attribute, Unit, UnitSection};
use crate::BTreeIndex;

/// Which groups of checks to run.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct VerifyTarget {
    pub info: bool,
    pub line: bool,
    pub apple_names: bool,
}

impl VerifyTarget {
    pub const ALL: Self = Self {
        info: true,
        line: true,
        apple_names: true,
    };
    pub const INFO: Self = Self {
        info: true,
        line: false,
        apple_names: false,
    };
    pub const LINE: Self = Self {
        info: false,
        line: true,
        apple_names: false,
    };
    pub const APPLE_NAMES: Self = Self {
        info: false,
        line: false,
        apple_names: true,
    };
}

impl Default for VerifyTarget {
    fn default() -> Self {
        Self::ALL
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DiagnosticKind {
    UnitHeader,
    /// An entry could not be decoded.
    Entry,
    Attribute,
    Form,
    Reference,
    LineTable,
    AppleNames,
}

/// One problem found by the verifier.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub section: SectionId,
    /// Offset of the offending unit, entry, row or table within `section`.
    pub offset: u64,
    pub message: String,
}

impl Diagnostic {
    pub fn to_error(&self) -> Error {
        Error::VerificationViolation(self.to_string())
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{:#010x}]: {}", self.section.name(), self.offset, self.message)
    }
}

pub struct Verifier<'c, F> {
    ctx: &'c Context,
    report: F,
    /// Referenced entry offset -> offsets of the entries referring to it.
    references: BTreeIndex<u64, u64>,
    errors: usize,
}

impl<'c, F: FnMut(&Diagnostic)> Verifier<'c, F> {
    pub fn new(ctx: &'c Context, report: F) -> Self {
        Self {
            ctx,
            report,
            references: BTreeIndex::new(),
            errors: 0,
        }
    }

    /// Number of diagnostics emitted so far.
    pub fn error_count(&self) -> usize {
        self.errors
    }

    fn emit(&mut self, kind: DiagnosticKind, section: SectionId, offset: u64, message: String) {
        let diag = Diagnostic {
            kind,
            section,
            offset,
            message,
        };
        tracing::error!(%diag, "verification failure");
        self.errors += 1;
        (self.report)(&diag);
    }

    /// Runs the selected checks. Returns true if none of them found a
    /// problem.
    pub fn verify(&mut self, target: VerifyTarget) -> bool {
        let mut ok = true;
        if target.info {
            ok &= self.handle_debug_info();
        }
        if target.line {
            ok &= self.handle_debug_line();
        }
        if target.apple_names {
            ok &= self.handle_apple_names();
        }
        ok
    }

    pub fn handle_debug_info(&mut self) -> bool {
        let before = self.errors;
        let reader = self.ctx.section_reader(SectionId::Info);
        let mut offset = 0;
        let mut index = 0;
        while reader.is_valid_offset(offset) {
            let start = offset;
            match self.verify_unit_header(&reader, &mut offset, index) {
                HeaderCheck::Valid => {
                    if let Some(unit) = self.ctx.unit_for_offset(UnitSection::Info, start) {
                        if unit.offset() == start {
                            self.verify_unit_contents(unit);
                        }
                    }
                }
                HeaderCheck::Invalid => {}
                HeaderCheck::Unrecoverable => break,
            }
            index += 1;
        }
        if index == 0 {
            tracing::debug!(".debug_info is empty");
        }
        self.verify_references();
        self.errors == before
    }

    fn verify_unit_header(&mut self, reader: &Reader, offset: &mut u64, index: usize) -> HeaderCheck {
        let start = *offset;
        let Ok((length, format)) = initial_length(reader, offset) else {
            self.emit(
                DiagnosticKind::UnitHeader,
                SectionId::Info,
                start,
                format!("unit[{}] length is truncated", index),
            );
            return HeaderCheck::Unrecoverable;
        };
        let fields_start = *offset;
        let end = fields_start.saturating_add(length);

        let mut problems = vec![];
        let version = reader.u16(offset).ok();
        let word = format.word_size();
        let (unit_type, address_size, abbrev_offset) = match version {
            Some(v) if v >= 5 => {
                let unit_type = reader.u8(offset).ok();
                let address_size = reader.u8(offset).ok();
                let abbrev_offset = reader.uint(word, offset).ok();
                (unit_type, address_size, abbrev_offset)
            }
            _ => {
                let abbrev_offset = reader.uint(word, offset).ok();
                let address_size = reader.u8(offset).ok();
                (None, address_size, abbrev_offset)
            }
        };

        if end > reader.len() {
            problems.push("the unit length is too large for the .debug_info provided");
        }
        if !matches!(version, Some(2..=5)) {
            problems.push("the 16 bit unit header version is not valid");
        }
        if let Some(t) = unit_type {
            let valid = (gim_con::DW_UT_compile.0..=gim_con::DW_UT_split_type.0).contains(&t);
            if !valid {
                problems.push("the unit type encoding is not valid");
            }
        }
        let abbrev_ok = abbrev_offset.map_or(false, |o| self.ctx.debug_abbrev().set(o).is_some());
        if !abbrev_ok {
            problems.push("the offset into the .debug_abbrev section is not valid");
        }
        if !matches!(address_size, Some(4 | 8)) {
            problems.push("the address size is unsupported");
        }

        *offset = end;
        if problems.is_empty() {
            return HeaderCheck::Valid;
        }
        for p in problems {
            self.emit(
                DiagnosticKind::UnitHeader,
                SectionId::Info,
                start,
                format!("unit[{}]: {}", index, p),
            );
        }
        HeaderCheck::Invalid
    }

    fn verify_unit_contents(&mut self, unit: &'c Unit) {
        if let Some(err) = unit.entries_error() {
            self.emit(
                DiagnosticKind::Entry,
                SectionId::Info,
                unit.offset(),
                format!("entries of unit could not be decoded: {}", err),
            );
        }
        for die in unit.dies(self.ctx) {
            if die.is_null() {
                continue;
            }
            for attr in die.attributes() {
                match attr {
                    Ok(attr) => {
                        self.verify_attribute(&die, &attr);
                        self.verify_form(&die, &attr);
                    }
                    Err(err) => self.emit(
                        DiagnosticKind::Entry,
                        SectionId::Info,
                        die.offset(),
                        format!("attribute could not be decoded: {}", err),
                    ),
                }
            }
        }
    }

    fn verify_attribute(&mut self, die: &Die<'c>, attr: &Attribute<'c>) {
        let target = match attr.attr {
            gim_con::DW_AT_ranges => SectionId::Ranges,
            gim_con::DW_AT_stmt_list => SectionId::Line,
            _ => return,
        };
        let size = self.ctx.section(target).len();
        match attr.value.as_section_offset() {
            Some(off) if off >= size => self.emit(
                DiagnosticKind::Attribute,
                SectionId::Info,
                die.offset(),
                format!(
                    "{} offset {:#010x} is beyond {} bounds ({:#x})",
                    attr.attr,
                    off,
                    target.name(),
                    size
                ),
            ),
            Some(_) => {}
            None => self.emit(
                DiagnosticKind::Attribute,
                SectionId::Info,
                die.offset(),
                format!("entry has invalid {} encoding {}", attr.attr, attr.value.form()),
            ),
        }
    }

    fn verify_form(&mut self, die: &Die<'c>, attr: &Attribute<'c>) {
        let form = attr.value.form();
        match form {
            gim_con::DW_FORM_ref1
            | gim_con::DW_FORM_ref2
            | gim_con::DW_FORM_ref4
            | gim_con::DW_FORM_ref8
            | gim_con::DW_FORM_ref_udata => {
                let unit_size = die.unit().size();
                let Some(raw) = attr.value.raw_uvalue() else {
                    return;
                };
                if raw >= unit_size {
                    self.emit(
                        DiagnosticKind::Form,
                        SectionId::Info,
                        die.offset(),
                        format!(
                            "{} unit offset {:#010x} is invalid (must be less than unit size of {:#010x})",
                            form, raw, unit_size
                        ),
                    );
                } else if let Some(target) = attr.value.as_reference() {
                    self.references.entry(target).or_default().insert(die.offset());
                }
            }
            gim_con::DW_FORM_ref_addr => {
                let Some(target) = attr.value.as_reference() else {
                    return;
                };
                let size = self.ctx.section(SectionId::Info).len();
                if target >= size {
                    self.emit(
                        DiagnosticKind::Form,
                        SectionId::Info,
                        die.offset(),
                        format!("DW_FORM_ref_addr offset {:#010x} is beyond .debug_info bounds", target),
                    );
                } else {
                    self.references.entry(target).or_default().insert(die.offset());
                }
            }
            gim_con::DW_FORM_strp => {
                let Some(off) = attr.value.as_section_offset() else {
                    return;
                };
                let size = die.unit().sections().str.len();
                if off >= size {
                    self.emit(
                        DiagnosticKind::Form,
                        SectionId::Info,
                        die.offset(),
                        format!("DW_FORM_strp offset {:#010x} is beyond .debug_str bounds", off),
                    );
                }
            }
            _ => {}
        }
    }

    /// Every recorded reference must land on the start of a real entry.
    fn verify_references(&mut self) {
        let references = std::mem::take(&mut self.references);
        for (target, from) in references {
            let valid = self
                .ctx
                .die_for_offset(target)
                .map_or(false, |d| !d.is_null());
            if valid {
                continue;
            }
            let referrers: Vec<String> = from.iter().map(|o| format!("{:#010x}", o)).collect();
            self.emit(
                DiagnosticKind::Reference,
                SectionId::Info,
                target,
                format!(
                    "invalid entry reference {:#010x}, offset is between entries; referenced from {}",
                    target,
                    referrers.join(", ")
                ),
            );
        }
    }

    pub fn handle_debug_line(&mut self) -> bool {
        let before = self.errors;
        self.verify_stmt_offsets();
        self.verify_line_rows();
        self.errors == before
    }

    fn verify_stmt_offsets(&mut self) {
        let line_size = self.ctx.section(SectionId::Line).len();
        let mut seen: BTreeMap<u64, u64> = BTreeMap::new();
        for unit in self.ctx.compile_units() {
            // Bad encodings are reported by the .debug_info checks.
            let Some(stmt) = unit.stmt_list() else {
                continue;
            };
            if stmt >= line_size {
                continue;
            }
            if self.ctx.line_table_for_unit(unit).is_none() {
                self.emit(
                    DiagnosticKind::LineTable,
                    SectionId::Line,
                    stmt,
                    format!("line table could not be parsed for unit {:#010x}", unit.offset()),
                );
                continue;
            }
            if let Some(&first) = seen.get(&stmt) {
                self.emit(
                    DiagnosticKind::LineTable,
                    SectionId::Line,
                    stmt,
                    format!(
                        "two compile units, {:#010x} and {:#010x}, have the same DW_AT_stmt_list offset",
                        first,
                        unit.offset()
                    ),
                );
                continue;
            }
            seen.insert(stmt, unit.offset());
        }
    }

    fn verify_line_rows(&mut self) {
        for unit in self.ctx.compile_units() {
            let Some(table) = self.ctx.line_table_for_unit(unit) else {
                continue;
            };
            let stmt = unit.stmt_list().unwrap_or(0);
            let prologue = table.prologue();
            let file_count = prologue.file_names.len() as u64;
            let mut prev_address = 0;
            for (i, row) in table.rows().iter().enumerate() {
                if row.address < prev_address {
                    self.emit(
                        DiagnosticKind::LineTable,
                        SectionId::Line,
                        stmt,
                        format!(
                            "row[{}] decreases in address from previous row ({:#x} < {:#x})",
                            i, row.address, prev_address
                        ),
                    );
                }
                if !prologue.has_file_at_index(row.file.into()) {
                    let range = if prologue.version >= 5 {
                        format!("[0,{})", file_count)
                    } else {
                        format!("[1,{}]", file_count)
                    };
                    self.emit(
                        DiagnosticKind::LineTable,
                        SectionId::Line,
                        stmt,
                        format!(
                            "row[{}] has invalid file index {} (valid values are {})",
                            i, row.file, range
                        ),
                    );
                }
                prev_address = if row.end_sequence { 0 } else { row.address };
            }
        }
    }

    pub fn handle_apple_names(&mut self) -> bool {
        let Some(table) = self.ctx.apple_names() else {
            return true;
        };
        let before = self.errors;
        self.verify_apple_names(&table);
        self.errors == before
    }

    fn verify_apple_names(&mut self, table: &AcceleratorTable<'c>) {
        let header = *table.header();
        for b in 0..header.bucket_count {
            match table.bucket(b) {
                Some(EMPTY_BUCKET) => {}
                Some(i) if i < header.hashes_count => {}
                Some(i) => self.emit(
                    DiagnosticKind::AppleNames,
                    SectionId::AppleNames,
                    0,
                    format!("bucket[{}] has invalid hash index: {}", b, i),
                ),
                None => break,
            }
        }

        if table.atoms().is_empty() {
            self.emit(
                DiagnosticKind::AppleNames,
                SectionId::AppleNames,
                0,
                "no atoms; failed to read hash data".into(),
            );
            return;
        }
        if !table.validate_forms() {
            self.emit(
                DiagnosticKind::AppleNames,
                SectionId::AppleNames,
                0,
                "unsupported form; failed to read hash data".into(),
            );
            return;
        }

        for h in 0..header.hashes_count {
            let (Some(hash), Some(data)) = (table.hash(h), table.hash_data_offset(h)) else {
                break;
            };
            let names = match table.hash_data(data) {
                Ok(names) => names,
                Err(err) => {
                    self.emit(
                        DiagnosticKind::AppleNames,
                        SectionId::AppleNames,
                        data,
                        format!("hash[{}] has invalid hash data offset {:#010x}: {}", h, data, err),
                    );
                    continue;
                }
            };
            let bucket = match header.bucket_count {
                0 => None,
                n => Some(hash % n),
            };
            for (s, name) in names.iter().enumerate() {
                for (d, &die) in name.die_offsets.iter().enumerate() {
                    if self.ctx.die_for_offset(die).is_some() {
                        continue;
                    }
                    let text = table
                        .string_at(name.string_offset)
                        .map_or_else(|| "<NULL>".into(), String::from_utf8_lossy);
                    let bucket = bucket.map_or_else(|| "-".to_string(), |b| b.to_string());
                    self.emit(
                        DiagnosticKind::AppleNames,
                        SectionId::AppleNames,
                        data,
                        format!(
                            "bucket[{}] hash[{}] = {:#010x} str[{}] = {:#010x} die[{}] = {:#010x} is not a valid entry offset for \"{}\"",
                            bucket, h, hash, s, name.string_offset, d, die, text
                        ),
                    );
                }
            }
        }
    }
}

enum HeaderCheck {
    Valid,
    Invalid,
    /// The rest of the section can't be walked.
    Unrecoverable,
}

impl Context {
    /// Runs the verifier over this context, handing each finding to
    /// `report`. Returns true if nothing was found.
    pub fn verify(&self, target: VerifyTarget, report: impl FnMut(&Diagnostic)) -> bool {
        let mut verifier = Verifier::new(self, report);
        let ok = verifier.verify(target);
        tracing::debug!(errors = verifier.error_count(), "verification finished");
        ok
    }
}
