//! `.debug_macinfo`: preprocessor macro records.

use std::fmt;

use crate::error::{Error, ErrorPolicy, Result};
use crate::reader::Reader;

const DW_MACINFO_DEFINE: u8 = 0x01;
const DW_MACINFO_UNDEF: u8 = 0x02;
const DW_MACINFO_START_FILE: u8 = 0x03;
const DW_MACINFO_END_FILE: u8 = 0x04;
const DW_MACINFO_VENDOR_EXT: u8 = 0xff;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum MacinfoEntry {
    Define { line: u64, macro_: String },
    Undef { line: u64, macro_: String },
    StartFile { line: u64, file: u64 },
    EndFile,
    VendorExt { constant: u64, string: String },
}

/// One run of records, ended by a zero type.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MacinfoList {
    pub offset: u64,
    pub entries: Vec<MacinfoEntry>,
}

#[derive(Clone, Debug, Default)]
pub struct DebugMacinfo {
    lists: Vec<MacinfoList>,
}

fn string(reader: &Reader, offset: &mut u64) -> Result<String> {
    Ok(String::from_utf8_lossy(reader.cstr(offset)?).into_owned())
}

impl DebugMacinfo {
    /// Parses the whole section. An unknown record type ends parsing;
    /// `on_error` hears about it and what came before is kept, unless it
    /// answers [`ErrorPolicy::Halt`].
    pub fn parse(reader: &Reader, mut on_error: impl FnMut(&Error) -> ErrorPolicy) -> Self {
        let mut lists = vec![];
        let mut offset = 0;
        while reader.is_valid_offset(offset) {
            match Self::parse_list(reader, &mut offset) {
                Ok(list) => lists.push(list),
                Err((partial, e)) => {
                    if on_error(&e) == ErrorPolicy::Halt {
                        lists.clear();
                    } else if !partial.entries.is_empty() {
                        lists.push(partial);
                    }
                    break;
                }
            }
        }
        tracing::debug!(count = lists.len(), "parsed .debug_macinfo");
        Self { lists }
    }

    fn parse_list(
        reader: &Reader,
        offset: &mut u64,
    ) -> std::result::Result<MacinfoList, (MacinfoList, Error)> {
        let mut list = MacinfoList {
            offset: *offset,
            entries: vec![],
        };
        loop {
            match Self::parse_entry(reader, offset) {
                Ok(Some(entry)) => list.entries.push(entry),
                Ok(None) => return Ok(list),
                Err(e) => return Err((list, e)),
            }
        }
    }

    fn parse_entry(reader: &Reader, offset: &mut u64) -> Result<Option<MacinfoEntry>> {
        let at = *offset;
        let kind = reader.uleb128(offset)?;
        let kind = match u8::try_from(kind) {
            Ok(0) => return Ok(None),
            Ok(k) => k,
            Err(_) => {
                return Err(Error::MalformedHeader {
                    offset: at,
                    reason: "invalid macinfo record type",
                })
            }
        };
        let entry = match kind {
            DW_MACINFO_DEFINE => MacinfoEntry::Define {
                line: reader.uleb128(offset)?,
                macro_: string(reader, offset)?,
            },
            DW_MACINFO_UNDEF => MacinfoEntry::Undef {
                line: reader.uleb128(offset)?,
                macro_: string(reader, offset)?,
            },
            DW_MACINFO_START_FILE => MacinfoEntry::StartFile {
                line: reader.uleb128(offset)?,
                file: reader.uleb128(offset)?,
            },
            DW_MACINFO_END_FILE => MacinfoEntry::EndFile,
            DW_MACINFO_VENDOR_EXT => MacinfoEntry::VendorExt {
                constant: reader.uleb128(offset)?,
                string: string(reader, offset)?,
            },
            _ => {
                return Err(Error::MalformedHeader {
                    offset: at,
                    reason: "invalid macinfo record type",
                })
            }
        };
        Ok(Some(entry))
    }

    pub fn lists(&self) -> &[MacinfoList] {
        &self.lists
    }
}

impl fmt::Display for DebugMacinfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for list in &self.lists {
            let mut depth = 0usize;
            for e in &list.entries {
                if *e == MacinfoEntry::EndFile {
                    depth = depth.saturating_sub(1);
                }
                write!(f, "{:width$}", "", width = depth * 2)?;
                match e {
                    MacinfoEntry::Define { line, macro_ } => {
                        writeln!(f, "DW_MACINFO_define - lineno: {} macro: {}", line, macro_)?
                    }
                    MacinfoEntry::Undef { line, macro_ } => {
                        writeln!(f, "DW_MACINFO_undef - lineno: {} macro: {}", line, macro_)?
                    }
                    MacinfoEntry::StartFile { line, file } => {
                        writeln!(f, "DW_MACINFO_start_file - lineno: {} filenum: {}", line, file)?;
                        depth += 1;
                    }
                    MacinfoEntry::EndFile => writeln!(f, "DW_MACINFO_end_file")?,
                    MacinfoEntry::VendorExt { constant, string } => writeln!(
                        f,
                        "DW_MACINFO_vendor_ext - constant: {} string: {}",
                        constant, string
                    )?,
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testutil::SectionWriter;
    use gimli::RunTimeEndian;

    #[test]
    fn lists_and_records() {
        let mut w = SectionWriter::new();
        w.uleb(3).uleb(0).uleb(1);
        w.uleb(1).uleb(2).cstr("FOO 1");
        w.uleb(2).uleb(5).cstr("FOO");
        w.uleb(4);
        w.uleb(0);
        w.uleb(0xff).uleb(7).cstr("vendor");
        w.uleb(0);
        let data = w.into_vec();

        let mut errors = 0;
        let mac = DebugMacinfo::parse(&Reader::new(&data, RunTimeEndian::Little, 8), |_| {
            errors += 1;
            ErrorPolicy::Continue
        });
        assert_eq!(errors, 0);
        assert_eq!(mac.lists().len(), 2);
        assert_eq!(mac.lists()[0].entries.len(), 4);
        assert_eq!(
            mac.lists()[0].entries[1],
            MacinfoEntry::Define {
                line: 2,
                macro_: "FOO 1".into()
            }
        );
        assert_eq!(mac.lists()[1].offset, 19);
        assert!(mac.to_string().contains("  DW_MACINFO_define"));
    }

    #[test]
    fn invalid_type_stops() {
        let mut w = SectionWriter::new();
        w.uleb(1).uleb(2).cstr("A");
        w.uleb(9);
        w.uleb(1).uleb(3).cstr("B");
        let data = w.into_vec();

        let reader = Reader::new(&data, RunTimeEndian::Little, 8);
        let mut errors = 0;
        let mac = DebugMacinfo::parse(&reader, |_| {
            errors += 1;
            ErrorPolicy::Continue
        });
        assert_eq!(errors, 1);
        assert_eq!(mac.lists().len(), 1);
        assert_eq!(mac.lists()[0].entries.len(), 1);

        let mac = DebugMacinfo::parse(&reader, |_| ErrorPolicy::Halt);
        assert!(mac.lists().is_empty());
    }
}
