//! Address to source resolution: owning unit, inlined call chain, file and
//! line.

use crate::context::Context;
use crate::die::{CallerFrame, Die};
use crate::unit::{Unit, UnitSection};

/// How much of a file name to produce.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum FileLineInfoKind {
    None,
    /// The name exactly as the line table records it.
    RawValue,
    /// Joined with its include directory and the compilation directory.
    #[default]
    AbsoluteFilePath,
}

/// Which name to report for a function.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum FunctionNameKind {
    None,
    ShortName,
    /// The mangled name when there is one, otherwise the short name.
    #[default]
    LinkageName,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct LineInfoSpecifier {
    pub file: FileLineInfoKind,
    pub function: FunctionNameKind,
}

/// Source information for one address or one frame of an inlining stack.
/// Zero means unknown for the numeric fields.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LineInfo {
    pub file_name: Option<String>,
    pub function_name: Option<String>,
    pub line: u64,
    pub column: u64,
    pub start_line: u64,
    pub discriminator: u64,
}

/// Frames for one address, innermost first.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct InliningInfo {
    frames: Vec<LineInfo>,
}

impl InliningInfo {
    pub fn frames(&self) -> &[LineInfo] {
        &self.frames
    }

    pub fn frame(&self, index: usize) -> Option<&LineInfo> {
        self.frames.get(index)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    fn push(&mut self, frame: LineInfo) {
        self.frames.push(frame);
    }
}

impl Context {
    /// The compile unit whose code covers `address`.
    pub fn compile_unit_for_address(&self, address: u64) -> Option<&Unit> {
        let offset = self.debug_aranges().find_address(address)?;
        self.unit_for_offset(UnitSection::Info, offset)
    }

    /// The subprogram and inlined subroutine entries covering `address`
    /// in `unit`, innermost first. When `unit` is a skeleton whose split
    /// unit can be loaded, the entries come from the split unit.
    pub fn inlined_chain_for_address<'a>(&'a self, unit: &'a Unit, address: u64) -> Vec<Die<'a>> {
        let (ctx, unit) = unit.split_unit(self).unwrap_or((self, unit));
        let Some(root) = unit.unit_die(ctx) else {
            return vec![];
        };

        let mut chain = vec![];
        let mut scope = root;
        'descend: loop {
            // Search the scope for a covering subroutine, looking through
            // lexical blocks and the like but not into other subroutines.
            let mut stack: Vec<Die<'a>> = scope.children().collect();
            stack.reverse();
            while let Some(die) = stack.pop() {
                if die.is_subroutine() {
                    if die.contains_address(address) {
                        chain.push(die);
                        scope = die;
                        continue 'descend;
                    }
                } else {
                    let start = stack.len();
                    stack.extend(die.children());
                    stack[start..].reverse();
                }
            }
            break;
        }
        chain.reverse();
        chain
    }

    /// Name and declaration line of the innermost function covering
    /// `address`.
    fn function_name_and_start_line(
        &self,
        unit: &Unit,
        address: u64,
        kind: FunctionNameKind,
    ) -> (Option<String>, u64) {
        let chain = self.inlined_chain_for_address(unit, address);
        let Some(die) = chain.first() else {
            return (None, 0);
        };
        let name = die.subroutine_name(kind).map(|n| n.into_owned());
        (name, die.decl_line().unwrap_or(0))
    }

    pub fn line_info_for_address(&self, address: u64, spec: LineInfoSpecifier) -> LineInfo {
        let mut result = LineInfo::default();
        let Some(unit) = self.compile_unit_for_address(address) else {
            return result;
        };
        let (name, start_line) = self.function_name_and_start_line(unit, address, spec.function);
        if spec.file != FileLineInfoKind::None {
            let comp_dir = unit.comp_dir();
            if let Some(info) = self
                .line_table_for_unit(unit)
                .and_then(|t| t.file_line_info_for_address(address, comp_dir.as_deref(), spec.file))
            {
                result = info;
            }
        }
        result.function_name = name;
        result.start_line = start_line;
        result
    }

    /// One entry per line table row describing `[address, address + size)`,
    /// keyed by the row's address. Without file information only the
    /// function at `address` is reported.
    pub fn line_info_for_address_range(
        &self,
        address: u64,
        size: u64,
        spec: LineInfoSpecifier,
    ) -> Vec<(u64, LineInfo)> {
        let Some(unit) = self.compile_unit_for_address(address) else {
            return vec![];
        };
        let (name, start_line) = self.function_name_and_start_line(unit, address, spec.function);

        if spec.file == FileLineInfoKind::None {
            let info = LineInfo {
                function_name: name,
                start_line,
                ..LineInfo::default()
            };
            return vec![(address, info)];
        }

        let Some(table) = self.line_table_for_unit(unit) else {
            return vec![];
        };
        let comp_dir = unit.comp_dir();
        table
            .lookup_address_range(address, size)
            .into_iter()
            .map(|i| {
                let row = &table.rows()[i];
                let info = LineInfo {
                    file_name: table.file_name_by_index(
                        row.file.into(),
                        comp_dir.as_deref(),
                        spec.file,
                    ),
                    function_name: name.clone(),
                    line: row.line.into(),
                    column: row.column.into(),
                    start_line,
                    discriminator: 0,
                };
                (row.address, info)
            })
            .collect()
    }

    /// The full inlining stack at `address`, innermost frame first. The
    /// innermost frame's file and line come from the line table; each outer
    /// frame takes them from the call site recorded on the frame inside it.
    pub fn inlining_info_for_address(&self, address: u64, spec: LineInfoSpecifier) -> InliningInfo {
        let mut info = InliningInfo::default();
        let Some(unit) = self.compile_unit_for_address(address) else {
            return info;
        };
        let comp_dir = unit.comp_dir();
        let comp_dir = comp_dir.as_deref();
        let wants_file = spec.file != FileLineInfoKind::None;

        let chain = self.inlined_chain_for_address(unit, address);
        if chain.is_empty() {
            // No entries (say, the split file is missing); the line table
            // still knows the file and line.
            if wants_file {
                if let Some(frame) = self
                    .line_table_for_unit(unit)
                    .and_then(|t| t.file_line_info_for_address(address, comp_dir, spec.file))
                {
                    info.push(frame);
                }
            }
            return info;
        }

        let table = if wants_file {
            self.line_table_for_unit(unit)
        } else {
            None
        };
        let mut call = None;
        for (i, die) in chain.iter().enumerate() {
            let mut frame = LineInfo::default();
            if wants_file {
                match call {
                    None => {
                        if let Some(found) = table
                            .as_ref()
                            .and_then(|t| t.file_line_info_for_address(address, comp_dir, spec.file))
                        {
                            frame = found;
                        }
                    }
                    Some(site) => {
                        let CallerFrame {
                            file,
                            line,
                            column,
                            discriminator,
                        } = site;
                        frame.file_name = table
                            .as_ref()
                            .and_then(|t| t.file_name_by_index(file, comp_dir, spec.file));
                        frame.line = line;
                        frame.column = column;
                        frame.discriminator = discriminator;
                    }
                }
                if i + 1 < chain.len() {
                    call = Some(die.caller_frame());
                }
            }
            frame.function_name = die.subroutine_name(spec.function).map(|n| n.into_owned());
            frame.start_line = die.decl_line().unwrap_or(0);
            info.push(frame);
        }
        info
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testutil;

    #[test]
    fn chain_for_inlined_address() {
        let ctx = testutil::sample_context();
        let unit = ctx.compile_unit_for_address(0x1014).unwrap();
        let chain = ctx.inlined_chain_for_address(unit, 0x1014);
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].offset(), testutil::sample_offsets().inlined);
        assert_eq!(chain[1].offset(), testutil::sample_offsets().main);

        let chain = ctx.inlined_chain_for_address(unit, 0x1040);
        assert_eq!(chain.len(), 1);
        assert!(ctx.inlined_chain_for_address(unit, 0x10f0).is_empty());
        assert!(ctx.compile_unit_for_address(0x2000).is_none());
    }

    #[test]
    fn line_info_names_the_innermost_function() {
        let ctx = testutil::sample_context();
        let info = ctx.line_info_for_address(0x1014, LineInfoSpecifier::default());
        assert_eq!(info.function_name.as_deref(), Some("_Z6helperv"));
        assert_eq!(info.file_name.as_deref(), Some("/src/main.c"));
        assert_eq!(info.line, 4);
        assert_eq!(info.start_line, 3);

        let short = ctx.line_info_for_address(
            0x1014,
            LineInfoSpecifier {
                file: FileLineInfoKind::None,
                function: FunctionNameKind::ShortName,
            },
        );
        assert_eq!(short.function_name.as_deref(), Some("helper"));
        assert_eq!(short.file_name, None);
        assert_eq!(short.line, 0);

        assert_eq!(ctx.line_info_for_address(0x5000, LineInfoSpecifier::default()), LineInfo::default());
    }

    #[test]
    fn inlining_stack_uses_call_sites() {
        let ctx = testutil::sample_context();
        let info = ctx.inlining_info_for_address(0x1014, LineInfoSpecifier::default());
        assert_eq!(info.len(), 2);

        let inner = info.frame(0).unwrap();
        assert_eq!(inner.function_name.as_deref(), Some("_Z6helperv"));
        assert_eq!(inner.line, 4);

        let outer = info.frame(1).unwrap();
        assert_eq!(outer.function_name.as_deref(), Some("main"));
        assert_eq!(outer.file_name.as_deref(), Some("/src/main.c"));
        assert_eq!(outer.line, 12);
        assert_eq!(outer.column, 5);
        assert_eq!(outer.start_line, 10);
    }

    #[test]
    fn range_lookup() {
        let ctx = testutil::sample_context();
        let rows = ctx.line_info_for_address_range(0x1000, 0x20, LineInfoSpecifier::default());
        let addrs: Vec<_> = rows.iter().map(|(a, _)| *a).collect();
        assert_eq!(addrs, vec![0x1000, 0x1010]);
        assert!(rows.iter().all(|(_, i)| i.function_name.as_deref() == Some("main")));

        let spec = LineInfoSpecifier {
            file: FileLineInfoKind::None,
            function: FunctionNameKind::ShortName,
        };
        let rows = ctx.line_info_for_address_range(0x1014, 0x20, spec);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1.function_name.as_deref(), Some("helper"));
    }
}
