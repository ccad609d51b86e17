//! Attribute value decoding.
//!
//! A [`FormValue`] is the raw decoded payload of one attribute together with
//! the form it was encoded in, and (optionally) the unit it came from. The
//! unit is what lets us resolve unit-relative references, string offsets and
//! indexed addresses lazily, at access time.

use std::borrow::Cow;

use gimli::constants as gim_con;
use gimli::{DwForm, Format};

use crate::error::{Error, Result};
use crate::reader::Reader;
use crate::unit::Unit;

/// How deep a chain of `DW_FORM_indirect` may go before we give up on it.
pub const MAX_INDIRECTION: usize = 8;

/// The per-unit facts needed to size and decode forms.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FormParams {
    pub version: u16,
    pub address_size: u8,
    pub format: Format,
}

impl FormParams {
    pub fn offset_size(&self) -> u8 {
        self.format.word_size()
    }

    /// `DW_FORM_ref_addr` was address-sized in DWARF 2 and offset-sized
    /// afterwards.
    pub fn ref_addr_size(&self) -> u8 {
        if self.version <= 2 {
            self.address_size
        } else {
            self.offset_size()
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FormClass {
    Unknown,
    Address,
    Block,
    Constant,
    String,
    Flag,
    Reference,
    Indirect,
    SectionOffset,
    Exprloc,
}

/// Primary class of a form. Some forms belong to more than one class; see
/// [`is_form_class`].
pub fn form_class(form: DwForm) -> FormClass {
    match form {
        gim_con::DW_FORM_addr
        | gim_con::DW_FORM_addrx
        | gim_con::DW_FORM_addrx1
        | gim_con::DW_FORM_addrx2
        | gim_con::DW_FORM_addrx3
        | gim_con::DW_FORM_addrx4
        | gim_con::DW_FORM_GNU_addr_index => FormClass::Address,

        gim_con::DW_FORM_block
        | gim_con::DW_FORM_block1
        | gim_con::DW_FORM_block2
        | gim_con::DW_FORM_block4 => FormClass::Block,

        gim_con::DW_FORM_data1
        | gim_con::DW_FORM_data2
        | gim_con::DW_FORM_data4
        | gim_con::DW_FORM_data8
        | gim_con::DW_FORM_data16
        | gim_con::DW_FORM_sdata
        | gim_con::DW_FORM_udata
        | gim_con::DW_FORM_implicit_const => FormClass::Constant,

        gim_con::DW_FORM_string
        | gim_con::DW_FORM_strp
        | gim_con::DW_FORM_line_strp
        | gim_con::DW_FORM_strp_sup
        | gim_con::DW_FORM_strx
        | gim_con::DW_FORM_strx1
        | gim_con::DW_FORM_strx2
        | gim_con::DW_FORM_strx3
        | gim_con::DW_FORM_strx4
        | gim_con::DW_FORM_GNU_str_index
        | gim_con::DW_FORM_GNU_strp_alt => FormClass::String,

        gim_con::DW_FORM_flag | gim_con::DW_FORM_flag_present => FormClass::Flag,

        gim_con::DW_FORM_ref_addr
        | gim_con::DW_FORM_ref1
        | gim_con::DW_FORM_ref2
        | gim_con::DW_FORM_ref4
        | gim_con::DW_FORM_ref8
        | gim_con::DW_FORM_ref_udata
        | gim_con::DW_FORM_ref_sig8
        | gim_con::DW_FORM_ref_sup4
        | gim_con::DW_FORM_ref_sup8
        | gim_con::DW_FORM_GNU_ref_alt => FormClass::Reference,

        gim_con::DW_FORM_indirect => FormClass::Indirect,

        gim_con::DW_FORM_sec_offset
        | gim_con::DW_FORM_loclistx
        | gim_con::DW_FORM_rnglistx => FormClass::SectionOffset,

        gim_con::DW_FORM_exprloc => FormClass::Exprloc,

        _ => FormClass::Unknown,
    }
}

/// Checks whether `form` can be interpreted as a member of `class`.
///
/// Before DWARF 4, `data4` and `data8` doubled as section offsets. Producers
/// still emit them that way by mistake, so this doesn't look at the version.
/// `strp` is accepted as a section offset too, since it is one.
pub fn is_form_class(form: DwForm, class: FormClass) -> bool {
    if form_class(form) == class {
        return true;
    }
    class == FormClass::SectionOffset
        && matches!(
            form,
            gim_con::DW_FORM_data4 | gim_con::DW_FORM_data8 | gim_con::DW_FORM_strp
        )
}

/// Number of bytes a value of this form always occupies, or `None` if the
/// size depends on the data.
pub fn fixed_byte_size(form: DwForm, params: FormParams) -> Option<u8> {
    match form {
        gim_con::DW_FORM_addr => Some(params.address_size),
        gim_con::DW_FORM_ref_addr => Some(params.ref_addr_size()),

        gim_con::DW_FORM_flag_present | gim_con::DW_FORM_implicit_const => Some(0),

        gim_con::DW_FORM_flag
        | gim_con::DW_FORM_data1
        | gim_con::DW_FORM_ref1
        | gim_con::DW_FORM_strx1
        | gim_con::DW_FORM_addrx1 => Some(1),

        gim_con::DW_FORM_data2
        | gim_con::DW_FORM_ref2
        | gim_con::DW_FORM_strx2
        | gim_con::DW_FORM_addrx2 => Some(2),

        gim_con::DW_FORM_strx3 | gim_con::DW_FORM_addrx3 => Some(3),

        gim_con::DW_FORM_data4
        | gim_con::DW_FORM_ref4
        | gim_con::DW_FORM_ref_sup4
        | gim_con::DW_FORM_strx4
        | gim_con::DW_FORM_addrx4 => Some(4),

        gim_con::DW_FORM_data8
        | gim_con::DW_FORM_ref8
        | gim_con::DW_FORM_ref_sig8
        | gim_con::DW_FORM_ref_sup8 => Some(8),

        gim_con::DW_FORM_data16 => Some(16),

        gim_con::DW_FORM_strp
        | gim_con::DW_FORM_sec_offset
        | gim_con::DW_FORM_line_strp
        | gim_con::DW_FORM_strp_sup
        | gim_con::DW_FORM_GNU_ref_alt
        | gim_con::DW_FORM_GNU_strp_alt => Some(params.offset_size()),

        _ => None,
    }
}

fn read_form_code(reader: &Reader, offset: &mut u64) -> Result<DwForm> {
    let at = *offset;
    let raw = reader.uleb128(offset)?;
    u16::try_from(raw).map(DwForm).map_err(|_| Error::InvalidForm {
        form: gim_con::DW_FORM_null,
        offset: at,
    })
}

/// Advances `offset` past a value of the given form without decoding it.
///
/// For every form, this consumes exactly as many bytes as
/// [`FormValue::extract`] would.
pub fn skip_value(
    form: DwForm,
    reader: &Reader,
    offset: &mut u64,
    params: FormParams,
) -> Result<()> {
    let mut form = form;
    for _ in 0..=MAX_INDIRECTION {
        if let Some(size) = fixed_byte_size(form, params) {
            return reader.skip(offset, u64::from(size));
        }
        match form {
            gim_con::DW_FORM_block | gim_con::DW_FORM_exprloc => {
                let len = reader.uleb128(offset)?;
                return reader.skip(offset, len);
            }
            gim_con::DW_FORM_block1 => {
                let len = reader.u8(offset)?;
                return reader.skip(offset, u64::from(len));
            }
            gim_con::DW_FORM_block2 => {
                let len = reader.u16(offset)?;
                return reader.skip(offset, u64::from(len));
            }
            gim_con::DW_FORM_block4 => {
                let len = reader.u32(offset)?;
                return reader.skip(offset, u64::from(len));
            }
            gim_con::DW_FORM_string => {
                reader.cstr(offset)?;
                return Ok(());
            }
            gim_con::DW_FORM_sdata => {
                reader.sleb128(offset)?;
                return Ok(());
            }
            gim_con::DW_FORM_udata
            | gim_con::DW_FORM_ref_udata
            | gim_con::DW_FORM_strx
            | gim_con::DW_FORM_addrx
            | gim_con::DW_FORM_loclistx
            | gim_con::DW_FORM_rnglistx
            | gim_con::DW_FORM_GNU_addr_index
            | gim_con::DW_FORM_GNU_str_index => {
                reader.uleb128(offset)?;
                return Ok(());
            }
            gim_con::DW_FORM_indirect => {
                form = read_form_code(reader, offset)?;
            }
            _ => {
                return Err(Error::InvalidForm {
                    form,
                    offset: *offset,
                })
            }
        }
    }
    Err(Error::InvalidForm {
        form: gim_con::DW_FORM_indirect,
        offset: *offset,
    })
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Payload<'a> {
    Unsigned(u64),
    Signed(i64),
    InlineString(&'a [u8]),
    Block(&'a [u8]),
}

/// A decoded attribute value.
#[derive(Copy, Clone, Debug)]
pub struct FormValue<'a> {
    form: DwForm,
    payload: Payload<'a>,
    unit: Option<&'a Unit>,
}

impl<'a> FormValue<'a> {
    /// Decodes a value of `form` at `offset`, advancing past it.
    ///
    /// `unit`, when given, is remembered so that the accessors can resolve
    /// unit-relative information later.
    pub fn extract(
        form: DwForm,
        reader: &Reader<'a>,
        offset: &mut u64,
        params: FormParams,
        unit: Option<&'a Unit>,
    ) -> Result<Self> {
        let mut form = form;
        let mut indirections = 0;
        let payload = loop {
            let payload = match form {
                gim_con::DW_FORM_addr | gim_con::DW_FORM_ref_addr => {
                    let size = if form == gim_con::DW_FORM_addr {
                        params.address_size
                    } else {
                        params.ref_addr_size()
                    };
                    Payload::Unsigned(reader.relocated(size, offset)?)
                }
                gim_con::DW_FORM_exprloc | gim_con::DW_FORM_block => {
                    let len = reader.uleb128(offset)?;
                    Payload::Block(reader.bytes(offset, len)?)
                }
                gim_con::DW_FORM_block1 => {
                    let len = reader.u8(offset)?;
                    Payload::Block(reader.bytes(offset, u64::from(len))?)
                }
                gim_con::DW_FORM_block2 => {
                    let len = reader.u16(offset)?;
                    Payload::Block(reader.bytes(offset, u64::from(len))?)
                }
                gim_con::DW_FORM_block4 => {
                    let len = reader.u32(offset)?;
                    Payload::Block(reader.bytes(offset, u64::from(len))?)
                }
                gim_con::DW_FORM_data16 => Payload::Block(reader.bytes(offset, 16)?),

                gim_con::DW_FORM_data1
                | gim_con::DW_FORM_ref1
                | gim_con::DW_FORM_flag
                | gim_con::DW_FORM_strx1
                | gim_con::DW_FORM_addrx1 => Payload::Unsigned(reader.uint(1, offset)?),
                gim_con::DW_FORM_data2
                | gim_con::DW_FORM_ref2
                | gim_con::DW_FORM_strx2
                | gim_con::DW_FORM_addrx2 => Payload::Unsigned(reader.uint(2, offset)?),
                gim_con::DW_FORM_strx3 | gim_con::DW_FORM_addrx3 => {
                    Payload::Unsigned(reader.uint(3, offset)?)
                }
                gim_con::DW_FORM_data4
                | gim_con::DW_FORM_ref4
                | gim_con::DW_FORM_ref_sup4
                | gim_con::DW_FORM_strx4
                | gim_con::DW_FORM_addrx4 => Payload::Unsigned(reader.relocated(4, offset)?),
                gim_con::DW_FORM_data8
                | gim_con::DW_FORM_ref8
                | gim_con::DW_FORM_ref_sup8
                | gim_con::DW_FORM_ref_sig8 => Payload::Unsigned(reader.relocated(8, offset)?),

                gim_con::DW_FORM_sdata => Payload::Signed(reader.sleb128(offset)?),
                gim_con::DW_FORM_udata
                | gim_con::DW_FORM_ref_udata
                | gim_con::DW_FORM_strx
                | gim_con::DW_FORM_addrx
                | gim_con::DW_FORM_loclistx
                | gim_con::DW_FORM_rnglistx
                | gim_con::DW_FORM_GNU_addr_index
                | gim_con::DW_FORM_GNU_str_index => Payload::Unsigned(reader.uleb128(offset)?),

                gim_con::DW_FORM_string => Payload::InlineString(reader.cstr(offset)?),

                gim_con::DW_FORM_strp
                | gim_con::DW_FORM_sec_offset
                | gim_con::DW_FORM_line_strp
                | gim_con::DW_FORM_strp_sup
                | gim_con::DW_FORM_GNU_ref_alt
                | gim_con::DW_FORM_GNU_strp_alt => {
                    Payload::Unsigned(reader.relocated(params.offset_size(), offset)?)
                }

                gim_con::DW_FORM_flag_present => Payload::Unsigned(1),
                // The value lives in the abbreviation, not in .debug_info.
                gim_con::DW_FORM_implicit_const => Payload::Signed(0),

                gim_con::DW_FORM_indirect => {
                    indirections += 1;
                    if indirections > MAX_INDIRECTION {
                        return Err(Error::InvalidForm {
                            form,
                            offset: *offset,
                        });
                    }
                    form = read_form_code(reader, offset)?;
                    continue;
                }
                _ => {
                    return Err(Error::InvalidForm {
                        form,
                        offset: *offset,
                    })
                }
            };
            break payload;
        };
        Ok(Self {
            form,
            payload,
            unit,
        })
    }

    /// Builds the value of a `DW_FORM_implicit_const` attribute from the
    /// constant stored in its abbreviation.
    pub fn implicit_const(value: i64, unit: Option<&'a Unit>) -> Self {
        Self {
            form: gim_con::DW_FORM_implicit_const,
            payload: Payload::Signed(value),
            unit,
        }
    }

    pub fn form(&self) -> DwForm {
        self.form
    }

    pub fn unit(&self) -> Option<&'a Unit> {
        self.unit
    }

    pub fn is_form_class(&self, class: FormClass) -> bool {
        is_form_class(self.form, class)
    }

    /// The undecorated integer payload, for forms that have one.
    pub fn raw_uvalue(&self) -> Option<u64> {
        match self.payload {
            Payload::Unsigned(v) => Some(v),
            Payload::Signed(v) => Some(v as u64),
            _ => None,
        }
    }

    pub fn as_unsigned(&self) -> Option<u64> {
        let constant = self.is_form_class(FormClass::Constant) || self.is_form_class(FormClass::Flag);
        if !constant || self.form == gim_con::DW_FORM_sdata {
            return None;
        }
        match self.payload {
            Payload::Unsigned(v) => Some(v),
            Payload::Signed(v) => u64::try_from(v).ok(),
            _ => None,
        }
    }

    /// Interprets the value as signed, sign-extending the fixed-size data
    /// forms.
    pub fn as_signed(&self) -> Option<i64> {
        let constant = self.is_form_class(FormClass::Constant) || self.is_form_class(FormClass::Flag);
        if !constant {
            return None;
        }
        match (self.form, self.payload) {
            (_, Payload::Signed(v)) => Some(v),
            (gim_con::DW_FORM_data1, Payload::Unsigned(v)) => Some(i64::from(v as u8 as i8)),
            (gim_con::DW_FORM_data2, Payload::Unsigned(v)) => Some(i64::from(v as u16 as i16)),
            (gim_con::DW_FORM_data4, Payload::Unsigned(v)) => Some(i64::from(v as u32 as i32)),
            (gim_con::DW_FORM_udata, Payload::Unsigned(v)) => i64::try_from(v).ok(),
            (_, Payload::Unsigned(v)) => Some(v as i64),
            _ => None,
        }
    }

    /// Returns the address, resolving indexed forms through the unit's
    /// address pool.
    pub fn as_address(&self) -> Option<u64> {
        if !self.is_form_class(FormClass::Address) {
            return None;
        }
        let raw = self.raw_uvalue()?;
        match self.form {
            gim_con::DW_FORM_addr => Some(raw),
            _ => self.unit?.address_at_index(raw),
        }
    }

    /// Returns the referenced DIE's absolute offset in its section.
    ///
    /// Unit-relative forms are rebased on the owning unit. Type signatures
    /// and supplementary-file references can't be resolved this way.
    pub fn as_reference(&self) -> Option<u64> {
        let raw = self.raw_uvalue()?;
        match self.form {
            gim_con::DW_FORM_ref1
            | gim_con::DW_FORM_ref2
            | gim_con::DW_FORM_ref4
            | gim_con::DW_FORM_ref8
            | gim_con::DW_FORM_ref_udata => Some(self.unit?.offset() + raw),
            gim_con::DW_FORM_ref_addr => Some(raw),
            _ => None,
        }
    }

    pub fn as_section_offset(&self) -> Option<u64> {
        if !self.is_form_class(FormClass::SectionOffset) {
            return None;
        }
        self.raw_uvalue()
    }

    pub fn as_block(&self) -> Option<&'a [u8]> {
        match self.payload {
            Payload::Block(b) => Some(b),
            _ => None,
        }
    }

    /// Returns the raw bytes of a string attribute, chasing string offsets
    /// and string indices through the unit's string sections.
    pub fn as_cstr(&self) -> Option<&'a [u8]> {
        if let Payload::InlineString(s) = self.payload {
            return Some(s);
        }
        let unit = self.unit?;
        let raw = self.raw_uvalue()?;
        match self.form {
            gim_con::DW_FORM_strp => unit.debug_str(raw),
            gim_con::DW_FORM_line_strp => unit.debug_line_str(raw),
            gim_con::DW_FORM_strx
            | gim_con::DW_FORM_strx1
            | gim_con::DW_FORM_strx2
            | gim_con::DW_FORM_strx3
            | gim_con::DW_FORM_strx4
            | gim_con::DW_FORM_GNU_str_index => {
                let offset = unit.string_offset_at_index(raw)?;
                unit.debug_str(offset)
            }
            _ => None,
        }
    }

    /// Like [`FormValue::as_cstr`], decoded as (lossy) UTF-8.
    pub fn as_str(&self) -> Option<Cow<'a, str>> {
        self.as_cstr().map(String::from_utf8_lossy)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use gimli::RunTimeEndian;

    const V4_32: FormParams = FormParams {
        version: 4,
        address_size: 8,
        format: Format::Dwarf32,
    };

    /// One sample encoding per form we can decode.
    fn samples() -> Vec<(DwForm, Vec<u8>)> {
        vec![
            (gim_con::DW_FORM_addr, vec![1; 8]),
            (gim_con::DW_FORM_ref_addr, vec![2; 4]),
            (gim_con::DW_FORM_block2, vec![2, 0, 0xaa, 0xbb]),
            (gim_con::DW_FORM_block4, vec![1, 0, 0, 0, 0xaa]),
            (gim_con::DW_FORM_data2, vec![1, 2]),
            (gim_con::DW_FORM_data4, vec![1, 2, 3, 4]),
            (gim_con::DW_FORM_data8, vec![1; 8]),
            (gim_con::DW_FORM_string, b"abc\0".to_vec()),
            (gim_con::DW_FORM_block, vec![3, 1, 2, 3]),
            (gim_con::DW_FORM_block1, vec![1, 9]),
            (gim_con::DW_FORM_data1, vec![0xff]),
            (gim_con::DW_FORM_flag, vec![1]),
            (gim_con::DW_FORM_sdata, vec![0x7f]),
            (gim_con::DW_FORM_strp, vec![0; 4]),
            (gim_con::DW_FORM_udata, vec![0x80, 0x01]),
            (gim_con::DW_FORM_ref1, vec![4]),
            (gim_con::DW_FORM_ref2, vec![4, 0]),
            (gim_con::DW_FORM_ref4, vec![4, 0, 0, 0]),
            (gim_con::DW_FORM_ref8, vec![4; 8]),
            (gim_con::DW_FORM_ref_udata, vec![4]),
            (gim_con::DW_FORM_indirect, vec![0x0b, 7]),
            (gim_con::DW_FORM_sec_offset, vec![0; 4]),
            (gim_con::DW_FORM_exprloc, vec![2, 0x91, 0x00]),
            (gim_con::DW_FORM_flag_present, vec![]),
            (gim_con::DW_FORM_ref_sig8, vec![5; 8]),
            (gim_con::DW_FORM_strx, vec![1]),
            (gim_con::DW_FORM_addrx, vec![1]),
            (gim_con::DW_FORM_ref_sup4, vec![0; 4]),
            (gim_con::DW_FORM_strp_sup, vec![0; 4]),
            (gim_con::DW_FORM_data16, vec![7; 16]),
            (gim_con::DW_FORM_line_strp, vec![0; 4]),
            (gim_con::DW_FORM_implicit_const, vec![]),
            (gim_con::DW_FORM_loclistx, vec![1]),
            (gim_con::DW_FORM_rnglistx, vec![1]),
            (gim_con::DW_FORM_ref_sup8, vec![0; 8]),
            (gim_con::DW_FORM_strx1, vec![1]),
            (gim_con::DW_FORM_strx2, vec![1, 0]),
            (gim_con::DW_FORM_strx3, vec![1, 0, 0]),
            (gim_con::DW_FORM_strx4, vec![1, 0, 0, 0]),
            (gim_con::DW_FORM_addrx1, vec![1]),
            (gim_con::DW_FORM_addrx2, vec![1, 0]),
            (gim_con::DW_FORM_addrx3, vec![1, 0, 0]),
            (gim_con::DW_FORM_addrx4, vec![1, 0, 0, 0]),
            (gim_con::DW_FORM_GNU_addr_index, vec![0x81, 0x01]),
            (gim_con::DW_FORM_GNU_str_index, vec![2]),
            (gim_con::DW_FORM_GNU_ref_alt, vec![0; 4]),
            (gim_con::DW_FORM_GNU_strp_alt, vec![0; 4]),
        ]
    }

    #[test]
    fn skip_matches_extract_and_fixed_size() {
        for (form, bytes) in samples() {
            // Trailing junk makes sure nobody reads to the end by accident.
            let mut data = bytes.clone();
            data.extend_from_slice(&[0xee; 4]);
            let reader = Reader::new(&data, RunTimeEndian::Little, 8);

            let mut skip_off = 0;
            skip_value(form, &reader, &mut skip_off, V4_32).unwrap();
            let mut extract_off = 0;
            FormValue::extract(form, &reader, &mut extract_off, V4_32, None).unwrap();

            assert_eq!(skip_off, bytes.len() as u64, "skip of {}", form);
            assert_eq!(extract_off, skip_off, "extract of {}", form);
            if let Some(size) = fixed_byte_size(form, V4_32) {
                assert_eq!(u64::from(size), skip_off, "fixed size of {}", form);
            }
        }
    }

    #[test]
    fn ref_addr_is_address_sized_in_v2() {
        let v2 = FormParams {
            version: 2,
            ..V4_32
        };
        assert_eq!(fixed_byte_size(gim_con::DW_FORM_ref_addr, v2), Some(8));
        assert_eq!(fixed_byte_size(gim_con::DW_FORM_ref_addr, V4_32), Some(4));
        let dwarf64 = FormParams {
            format: Format::Dwarf64,
            ..V4_32
        };
        assert_eq!(fixed_byte_size(gim_con::DW_FORM_strp, dwarf64), Some(8));
    }

    #[test]
    fn unknown_and_runaway_forms_fail() {
        let data = [0u8; 4];
        let reader = Reader::new(&data, RunTimeEndian::Little, 8);
        let mut off = 0;
        assert!(matches!(
            FormValue::extract(DwForm(0x7f), &reader, &mut off, V4_32, None),
            Err(Error::InvalidForm { .. })
        ));

        // indirect -> indirect -> ... never terminates on its own.
        let data = [0x16u8; 16];
        let reader = Reader::new(&data, RunTimeEndian::Little, 8);
        let mut off = 0;
        assert!(matches!(
            FormValue::extract(gim_con::DW_FORM_indirect, &reader, &mut off, V4_32, None),
            Err(Error::InvalidForm { .. })
        ));
        let mut off = 0;
        assert!(skip_value(gim_con::DW_FORM_indirect, &reader, &mut off, V4_32).is_err());
    }

    #[test]
    fn constant_accessors() {
        let data = [0xfe, 0x7f];
        let reader = Reader::new(&data, RunTimeEndian::Little, 8);
        let mut off = 0;
        let v = FormValue::extract(gim_con::DW_FORM_data1, &reader, &mut off, V4_32, None).unwrap();
        assert_eq!(v.as_unsigned(), Some(0xfe));
        assert_eq!(v.as_signed(), Some(-2));
        assert_eq!(v.as_address(), None);

        let mut off = 1;
        let v = FormValue::extract(gim_con::DW_FORM_sdata, &reader, &mut off, V4_32, None).unwrap();
        assert_eq!(v.as_unsigned(), None);
        assert_eq!(v.as_signed(), Some(-1));

        let v = FormValue::implicit_const(-5, None);
        assert_eq!(v.as_signed(), Some(-5));
        assert_eq!(v.as_unsigned(), None);
    }

    #[test]
    fn class_membership() {
        assert!(is_form_class(gim_con::DW_FORM_data4, FormClass::SectionOffset));
        assert!(is_form_class(gim_con::DW_FORM_strp, FormClass::SectionOffset));
        assert!(!is_form_class(gim_con::DW_FORM_data2, FormClass::SectionOffset));
        assert!(is_form_class(gim_con::DW_FORM_GNU_str_index, FormClass::String));
        assert_eq!(form_class(gim_con::DW_FORM_exprloc), FormClass::Exprloc);
    }
}
