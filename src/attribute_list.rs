use log::debug;
use serde::{Deserialize, Serialize};

use crate::attribute::{AttributeType, ResidentBody};
use crate::cursor::ByteCursor;
use crate::error::{DecodeError, Result};
use crate::types::FileReference;

/// One catalog line of an $ATTRIBUTE_LIST. The referenced record is never followed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeListEntry {
    pub type_code: AttributeType,
    pub record_length: u16,
    pub name_length: u8,
    pub name_offset: u8,
    pub lowest_vcn: u64,
    pub segment_reference: FileReference,
    pub attribute_id: u16,
    pub name: Option<String>,
}

impl AttributeListEntry {
    pub const MIN_SIZE: usize = 0x1A;

    fn from_cursor(cursor: &mut ByteCursor<'_>, type_code: AttributeType) -> Result<Self> {
        let start = cursor.tell() - 4;
        let record_length = cursor.read_u16()?;
        let name_length = cursor.read_u8()?;
        let name_offset = cursor.read_u8()?;
        let lowest_vcn = cursor.read_u64()?;
        let segment_reference = FileReference::from_cursor(cursor)?;
        let attribute_id = cursor.read_u16()?;
        let name = if name_length > 0 {
            cursor.seek(start + u64::from(name_offset))?;
            Some(cursor.read_utf16_lossy(usize::from(name_length))?)
        } else {
            None
        };
        Ok(Self {
            type_code,
            record_length,
            name_length,
            name_offset,
            lowest_vcn,
            segment_reference,
            attribute_id,
            name,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AttributeList {
    pub entries: Vec<AttributeListEntry>,
}

impl ResidentBody for AttributeList {
    const TYPE: AttributeType = AttributeType::AttributeList;

    /// Walks the catalog until the value ends, an end marker, or an entry that
    /// cannot be trusted; whatever was decoded before that is kept.
    fn from_cursor(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        let mut entries = Vec::new();
        let end = cursor.len() as u64;
        let mut position = 0u64;

        while position + AttributeListEntry::MIN_SIZE as u64 <= end {
            cursor.seek(position)?;
            let raw_type = cursor.read_u32()?;
            if raw_type == AttributeType::END_MARKER {
                break;
            }
            let type_code = AttributeType::from(raw_type);
            let entry = match AttributeListEntry::from_cursor(cursor, type_code) {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("attribute list truncated at {}: {}", position, e);
                    break;
                }
            };
            let advance = u64::from(entry.record_length);
            if advance == 0 || position + advance > end {
                debug!(
                    "attribute list truncated at {}: {}",
                    position,
                    DecodeError::StructuralCorruption(format!(
                        "entry length {} does not fit",
                        advance
                    ))
                );
                break;
            }
            entries.push(entry);
            position += advance;
        }

        Ok(Self { entries })
    }
}
