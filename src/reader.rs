//! Bounds-checked, endian-aware reads from a section image.
//!
//! Every read takes the offset by `&mut` and advances it past whatever was
//! consumed. A read that would leave the section fails with
//! [`Error::TruncatedSection`] and leaves the offset where it was, so the
//! caller can decide whether to give up on the enclosing structure.

use gimli::RunTimeEndian;
use scroll::{Pread, Sleb128, Uleb128};

use crate::error::{Error, Result};
use crate::section::{RelocationMap, Section};

#[derive(Copy, Clone, Debug)]
pub struct Reader<'a> {
    data: &'a [u8],
    relocs: Option<&'a RelocationMap>,
    endian: RunTimeEndian,
    address_size: u8,
}

fn scroll_endian(endian: RunTimeEndian) -> scroll::Endian {
    match endian {
        RunTimeEndian::Little => scroll::Endian::Little,
        RunTimeEndian::Big => scroll::Endian::Big,
    }
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8], endian: RunTimeEndian, address_size: u8) -> Self {
        Self {
            data,
            relocs: None,
            endian,
            address_size,
        }
    }

    /// Creates a reader over `section` that also applies its relocations.
    pub fn for_section(section: &'a Section, endian: RunTimeEndian, address_size: u8) -> Self {
        let relocs = section.relocations();
        Self {
            data: section.data(),
            relocs: if relocs.is_empty() { None } else { Some(relocs) },
            endian,
            address_size,
        }
    }

    pub fn with_address_size(self, address_size: u8) -> Self {
        Self {
            address_size,
            ..self
        }
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn endian(&self) -> RunTimeEndian {
        self.endian
    }

    pub fn address_size(&self) -> u8 {
        self.address_size
    }

    pub fn is_valid_offset(&self, offset: u64) -> bool {
        offset < self.len()
    }

    pub fn is_valid_offset_for_data_of_size(&self, offset: u64, size: u64) -> bool {
        offset
            .checked_add(size)
            .map_or(false, |end| end <= self.len())
    }

    fn position(&self, offset: u64, size: u64) -> Result<usize> {
        if self.is_valid_offset_for_data_of_size(offset, size) {
            Ok(offset as usize)
        } else {
            Err(Error::TruncatedSection { offset, size })
        }
    }

    fn fixed<T>(&self, offset: &mut u64, size: u64) -> Result<T>
    where
        T: for<'b> scroll::ctx::TryFromCtx<'b, scroll::Endian, Error = scroll::Error>,
    {
        let mut pos = self.position(*offset, size)?;
        let value = self
            .data
            .gread_with::<T>(&mut pos, scroll_endian(self.endian))
            .map_err(|_| Error::TruncatedSection {
                offset: *offset,
                size,
            })?;
        *offset += size;
        Ok(value)
    }

    pub fn u8(&self, offset: &mut u64) -> Result<u8> {
        self.fixed(offset, 1)
    }

    pub fn i8(&self, offset: &mut u64) -> Result<i8> {
        self.fixed(offset, 1)
    }

    pub fn u16(&self, offset: &mut u64) -> Result<u16> {
        self.fixed(offset, 2)
    }

    pub fn u32(&self, offset: &mut u64) -> Result<u32> {
        self.fixed(offset, 4)
    }

    pub fn u64(&self, offset: &mut u64) -> Result<u64> {
        self.fixed(offset, 8)
    }

    /// Reads an unsigned integer of 1, 2, 3, 4 or 8 bytes.
    pub fn uint(&self, size: u8, offset: &mut u64) -> Result<u64> {
        match size {
            1 => self.u8(offset).map(u64::from),
            2 => self.u16(offset).map(u64::from),
            3 => {
                let pos = self.position(*offset, 3)?;
                let b = &self.data[pos..pos + 3];
                let v = match self.endian {
                    RunTimeEndian::Little => {
                        u64::from(b[0]) | u64::from(b[1]) << 8 | u64::from(b[2]) << 16
                    }
                    RunTimeEndian::Big => {
                        u64::from(b[2]) | u64::from(b[1]) << 8 | u64::from(b[0]) << 16
                    }
                };
                *offset += 3;
                Ok(v)
            }
            4 => self.u32(offset).map(u64::from),
            8 => self.u64(offset),
            _ => Err(Error::MalformedHeader {
                offset: *offset,
                reason: "unsupported integer size",
            }),
        }
    }

    /// Reads an integer of `size` bytes and adds the relocation recorded
    /// for its offset, if any.
    pub fn relocated(&self, size: u8, offset: &mut u64) -> Result<u64> {
        let at = *offset;
        let value = self.uint(size, offset)?;
        let reloc = self
            .relocs
            .and_then(|r| r.get(&at).copied())
            .unwrap_or(0);
        Ok(value.wrapping_add(reloc))
    }

    /// Reads a target address of the reader's address size.
    pub fn address(&self, offset: &mut u64) -> Result<u64> {
        self.relocated(self.address_size, offset)
    }

    pub fn uleb128(&self, offset: &mut u64) -> Result<u64> {
        let start = *offset;
        let mut pos = self.position(start, 1)?;
        let value = Uleb128::read(self.data, &mut pos).map_err(|e| leb_error(e, start))?;
        *offset = pos as u64;
        Ok(value)
    }

    pub fn sleb128(&self, offset: &mut u64) -> Result<i64> {
        let start = *offset;
        let mut pos = self.position(start, 1)?;
        let value = Sleb128::read(self.data, &mut pos).map_err(|e| leb_error(e, start))?;
        *offset = pos as u64;
        Ok(value)
    }

    /// Reads a NUL-terminated string, returning it without the terminator.
    pub fn cstr(&self, offset: &mut u64) -> Result<&'a [u8]> {
        let start = self.position(*offset, 1)?;
        let len = self.data[start..]
            .iter()
            .position(|&b| b == 0)
            .ok_or(Error::TruncatedSection {
                offset: *offset,
                size: self.len() - *offset + 1,
            })?;
        *offset += len as u64 + 1;
        Ok(&self.data[start..start + len])
    }

    pub fn bytes(&self, offset: &mut u64, len: u64) -> Result<&'a [u8]> {
        let start = self.position(*offset, len)?;
        *offset += len;
        Ok(&self.data[start..start + len as usize])
    }

    pub fn skip(&self, offset: &mut u64, len: u64) -> Result<()> {
        self.position(*offset, len)?;
        *offset += len;
        Ok(())
    }
}

fn leb_error(err: scroll::Error, offset: u64) -> Error {
    match err {
        scroll::Error::BadInput { .. } => Error::MalformedLeb128 { offset },
        _ => Error::TruncatedSection { offset, size: 1 },
    }
}

/// Reads an initial-length field, returning the length and the format it
/// implies.
pub fn initial_length(reader: &Reader, offset: &mut u64) -> Result<(u64, gimli::Format)> {
    let at = *offset;
    let length = reader.u32(offset)?;
    match length {
        0xffff_ffff => Ok((reader.u64(offset)?, gimli::Format::Dwarf64)),
        0xffff_fff0..=0xffff_fffe => Err(Error::MalformedHeader {
            offset: at,
            reason: "reserved unit length value",
        }),
        len => Ok((u64::from(len), gimli::Format::Dwarf32)),
    }
}
