// Sources:
// - https://dubeyko.com/development/FileSystems/NTFS/ntfsdoc.pdf
// - https://learn.microsoft.com/windows/win32/devnotes/attribute-record-header

use bitflags::bitflags;
use core::fmt;
use log::trace;
use serde::{Deserialize, Serialize};

use crate::cursor::ByteCursor;
use crate::diagnostics::DiagnosticSink;
use crate::error::{DecodeError, Result};

/// Attribute type codes. Anything not listed is carried as `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttributeType {
    StandardInformation,
    AttributeList,
    FileName,
    ObjectId,
    SecurityDescriptor,
    VolumeName,
    VolumeInformation,
    Data,
    IndexRoot,
    IndexAllocation,
    Bitmap,
    ReparsePoint,
    EaInformation,
    Ea,
    LoggedUtilityStream,
    EndOfAttributes,
    Unknown(u32),
}

impl From<u32> for AttributeType {
    fn from(value: u32) -> Self {
        use AttributeType::*;
        match value {
            0x10 => StandardInformation,
            0x20 => AttributeList,
            0x30 => FileName,
            0x40 => ObjectId,
            0x50 => SecurityDescriptor,
            0x60 => VolumeName,
            0x70 => VolumeInformation,
            0x80 => Data,
            0x90 => IndexRoot,
            0xA0 => IndexAllocation,
            0xB0 => Bitmap,
            0xC0 => ReparsePoint,
            0xD0 => EaInformation,
            0xE0 => Ea,
            0x100 => LoggedUtilityStream,
            0xFFFF_FFFF => EndOfAttributes,
            other => Unknown(other),
        }
    }
}

impl AttributeType {
    pub const END_MARKER: u32 = 0xFFFF_FFFF;

    pub fn code(&self) -> u32 {
        use AttributeType::*;
        match self {
            StandardInformation => 0x10,
            AttributeList => 0x20,
            FileName => 0x30,
            ObjectId => 0x40,
            SecurityDescriptor => 0x50,
            VolumeName => 0x60,
            VolumeInformation => 0x70,
            Data => 0x80,
            IndexRoot => 0x90,
            IndexAllocation => 0xA0,
            Bitmap => 0xB0,
            ReparsePoint => 0xC0,
            EaInformation => 0xD0,
            Ea => 0xE0,
            LoggedUtilityStream => 0x100,
            EndOfAttributes => Self::END_MARKER,
            Unknown(code) => *code,
        }
    }

    pub fn name(&self) -> &'static str {
        use AttributeType::*;
        match self {
            StandardInformation => "$STANDARD_INFORMATION",
            AttributeList => "$ATTRIBUTE_LIST",
            FileName => "$FILE_NAME",
            ObjectId => "$OBJECT_ID",
            SecurityDescriptor => "$SECURITY_DESCRIPTOR",
            VolumeName => "$VOLUME_NAME",
            VolumeInformation => "$VOLUME_INFORMATION",
            Data => "$DATA",
            IndexRoot => "$INDEX_ROOT",
            IndexAllocation => "$INDEX_ALLOCATION",
            Bitmap => "$BITMAP",
            ReparsePoint => "$REPARSE_POINT",
            EaInformation => "$EA_INFORMATION",
            Ea => "$EA",
            LoggedUtilityStream => "$LOGGED_UTILITY_STREAM",
            EndOfAttributes => "END",
            Unknown(_) => "UNKNOWN",
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:X})", self.name(), self.code())
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct AttributeDataFlags: u16 {
        const COMPRESSION_MASK = 0x00FF;
        const ENCRYPTED        = 0x4000;
        const SPARSE           = 0x8000;
    }
}

/// Resident/non-resident part of the attribute header, selected by the form code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Form {
    Resident {
        value_length: u32,
        value_offset: u16,
        /// Opaque on-disk byte, kept as read.
        index_flag: u8,
    },
    NonResident {
        lowest_vcn: u64,
        highest_vcn: u64,
        mapping_pairs_offset: u16,
        compression_unit_size: u16,
        allocated_length: u64,
        file_size: u64,
        valid_data_length: u64,
        total_allocated: Option<u64>,
    },
}

impl Form {
    fn resident(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        let value_length = cursor.read_u32()?;
        let value_offset = cursor.read_u16()?;
        let index_flag = cursor.read_u8()?;
        cursor.skip(1)?;
        Ok(Form::Resident {
            value_length,
            value_offset,
            index_flag,
        })
    }

    /// Compressed and sparse attributes carry an extra total-allocated field.
    fn non_resident(cursor: &mut ByteCursor<'_>, flags: AttributeDataFlags) -> Result<Self> {
        let lowest_vcn = cursor.read_u64()?;
        let highest_vcn = cursor.read_u64()?;
        let mapping_pairs_offset = cursor.read_u16()?;
        let compression_unit_size = cursor.read_u16()?;
        cursor.skip(4)?;
        let allocated_length = cursor.read_u64()?;
        let file_size = cursor.read_u64()?;
        let valid_data_length = cursor.read_u64()?;
        let total_allocated = if flags
            .intersects(AttributeDataFlags::COMPRESSION_MASK | AttributeDataFlags::SPARSE)
        {
            Some(cursor.read_u64()?)
        } else {
            None
        };
        Ok(Form::NonResident {
            lowest_vcn,
            highest_vcn,
            mapping_pairs_offset,
            compression_unit_size,
            allocated_length,
            file_size,
            valid_data_length,
            total_allocated,
        })
    }
}

/// Header common to every attribute record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeHeader {
    /// Offset of the attribute record inside the MFT entry.
    pub offset: u64,
    pub type_code: AttributeType,
    pub record_length: u32,
    pub form_code: u8,
    pub name_length: u8,
    pub name_offset: u16,
    pub flags: AttributeDataFlags,
    pub instance: u16,
    pub name: Option<String>,
    pub form: Form,
}

impl AttributeHeader {
    /// Decode the header at the cursor position.
    ///
    /// Returns `Ok(None)` on the end-of-attributes marker. On success the cursor
    /// sits just past the fixed header, whatever the name lookup did.
    pub fn from_cursor(
        cursor: &mut ByteCursor<'_>,
        sink: &mut DiagnosticSink,
    ) -> Result<Option<Self>> {
        let offset = cursor.tell();
        let raw_type = cursor.read_u32()?;
        if raw_type == AttributeType::END_MARKER {
            trace!("end of attributes at offset {}", offset);
            return Ok(None);
        }
        let type_code = AttributeType::from(raw_type);
        let record_length = cursor.read_u32()?;
        let form_code = cursor.read_u8()?;
        let name_length = cursor.read_u8()?;
        let name_offset = cursor.read_u16()?;
        let flags = AttributeDataFlags::from_bits_retain(cursor.read_u16()?);
        let instance = cursor.read_u16()?;

        let form = if form_code == 0 {
            Form::resident(cursor)?
        } else {
            Form::non_resident(cursor, flags)?
        };
        let after_header = cursor.tell();

        let name = if name_length > 0 {
            let decoded = cursor
                .seek(offset + u64::from(name_offset))
                .and_then(|_| cursor.read_utf16(usize::from(name_length)));
            let name = match decoded {
                Ok(name) => name,
                Err(e) => {
                    sink.report(Some(type_code), offset, e);
                    String::new()
                }
            };
            cursor.seek(after_header)?;
            Some(name)
        } else {
            None
        };

        Ok(Some(AttributeHeader {
            offset,
            type_code,
            record_length,
            form_code,
            name_length,
            name_offset,
            flags,
            instance,
            name,
            form,
        }))
    }

    pub fn is_resident(&self) -> bool {
        matches!(self.form, Form::Resident { .. })
    }

    /// Size of the attribute value: resident length, or the logical file size.
    pub fn value_size(&self) -> u64 {
        match self.form {
            Form::Resident { value_length, .. } => u64::from(value_length),
            Form::NonResident { file_size, .. } => file_size,
        }
    }

    /// Cursor bounded to the resident value of this attribute.
    pub fn value_cursor<'a>(&self, record: &ByteCursor<'a>) -> Result<ByteCursor<'a>> {
        match self.form {
            Form::Resident {
                value_length,
                value_offset,
                ..
            } => {
                let end = u64::from(value_offset) + u64::from(value_length);
                if end > u64::from(self.record_length) {
                    return Err(DecodeError::StructuralCorruption(format!(
                        "resident value ends at {} past the {} byte attribute",
                        end, self.record_length
                    )));
                }
                record.sub_cursor(self.offset + u64::from(value_offset), value_length as usize)
            }
            Form::NonResident { .. } => Err(DecodeError::Unsupported(format!(
                "non-resident {} body",
                self.type_code.name()
            ))),
        }
    }
}

/// A decoded attribute: its header plus the body when it could be decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute<T> {
    pub header: AttributeHeader,
    pub body: Option<T>,
}

/// Decoder for the resident value of one attribute type.
pub trait ResidentBody: Sized {
    const TYPE: AttributeType;

    /// Decode from a cursor bounded to the resident value.
    fn from_cursor(cursor: &mut ByteCursor<'_>) -> Result<Self>;
}
