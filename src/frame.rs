//! Call frame information (`.debug_frame` and `.eh_frame`).
//!
//! The CIE/FDE grammar itself is handled by gimli's CFI reader. This module
//! walks the section with it, keeps a summary of every entry, and prints them.

use std::fmt;

use gimli::{BaseAddresses, CieOrFde, EndianSlice, RunTimeEndian, UnwindSection};

use crate::error::Result;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FrameEntryKind {
    Cie {
        version: u8,
        code_alignment_factor: u64,
        data_alignment_factor: i64,
        return_address_register: u16,
        has_augmentation: bool,
    },
    Fde {
        cie_offset: u64,
        initial_address: u64,
        address_range: u64,
    },
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FrameEntry {
    pub offset: u64,
    pub length: u64,
    pub kind: FrameEntryKind,
}

impl FrameEntry {
    pub fn contains_address(&self, address: u64) -> bool {
        match self.kind {
            FrameEntryKind::Fde {
                initial_address,
                address_range,
                ..
            } => address >= initial_address && address - initial_address < address_range,
            FrameEntryKind::Cie { .. } => false,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct DebugFrame {
    is_eh: bool,
    entries: Vec<FrameEntry>,
}

impl DebugFrame {
    /// Parses `.debug_frame`.
    pub fn parse_debug_frame(data: &[u8], endian: RunTimeEndian, address_size: u8) -> Result<Self> {
        let mut section = gimli::DebugFrame::new(data, endian);
        section.set_address_size(address_size);
        Self::parse_section(section, false)
    }

    /// Parses `.eh_frame`. Pointer encodings relative to the section are
    /// resolved as if it were loaded at address zero.
    pub fn parse_eh_frame(data: &[u8], endian: RunTimeEndian, address_size: u8) -> Result<Self> {
        let mut section = gimli::EhFrame::new(data, endian);
        section.set_address_size(address_size);
        Self::parse_section(section, true)
    }

    fn parse_section<'a, S>(section: S, is_eh: bool) -> Result<Self>
    where
        S: UnwindSection<EndianSlice<'a, RunTimeEndian>>,
    {
        let bases = BaseAddresses::default().set_eh_frame(0);
        let mut iter = section.entries(&bases);
        let mut entries = vec![];
        while let Some(entry) = iter.next()? {
            let summary = match entry {
                CieOrFde::Cie(cie) => FrameEntry {
                    offset: cie.offset() as u64,
                    length: cie.entry_len() as u64,
                    kind: FrameEntryKind::Cie {
                        version: cie.version(),
                        code_alignment_factor: cie.code_alignment_factor(),
                        data_alignment_factor: cie.data_alignment_factor(),
                        return_address_register: cie.return_address_register().0,
                        has_augmentation: cie.augmentation().is_some(),
                    },
                },
                CieOrFde::Fde(partial) => {
                    let fde = partial.parse(S::cie_from_offset)?;
                    FrameEntry {
                        offset: fde.offset() as u64,
                        length: fde.entry_len() as u64,
                        kind: FrameEntryKind::Fde {
                            cie_offset: fde.cie().offset() as u64,
                            initial_address: fde.initial_address(),
                            address_range: fde.len(),
                        },
                    }
                }
            };
            entries.push(summary);
        }
        tracing::debug!(
            count = entries.len(),
            eh = is_eh,
            "parsed call frame information"
        );
        Ok(Self { is_eh, entries })
    }

    pub fn is_eh_frame(&self) -> bool {
        self.is_eh
    }

    pub fn entries(&self) -> &[FrameEntry] {
        &self.entries
    }

    pub fn fde_for_address(&self, address: u64) -> Option<&FrameEntry> {
        self.entries.iter().find(|e| e.contains_address(address))
    }
}

impl fmt::Display for DebugFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for e in &self.entries {
            match &e.kind {
                FrameEntryKind::Cie {
                    version,
                    code_alignment_factor,
                    data_alignment_factor,
                    return_address_register,
                    ..
                } => {
                    writeln!(f, "{:08x} {:08x} CIE", e.offset, e.length)?;
                    writeln!(f, "  Version:               {}", version)?;
                    writeln!(f, "  Code alignment factor: {}", code_alignment_factor)?;
                    writeln!(f, "  Data alignment factor: {}", data_alignment_factor)?;
                    writeln!(f, "  Return address column: {}", return_address_register)?;
                }
                FrameEntryKind::Fde {
                    cie_offset,
                    initial_address,
                    address_range,
                } => {
                    writeln!(
                        f,
                        "{:08x} {:08x} FDE cie={:08x} pc={:08x}...{:08x}",
                        e.offset,
                        e.length,
                        cie_offset,
                        initial_address,
                        initial_address.wrapping_add(*address_range)
                    )?;
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
