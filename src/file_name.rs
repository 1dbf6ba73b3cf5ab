use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::attribute::{AttributeType, ResidentBody};
use crate::cursor::ByteCursor;
use crate::error::Result;
use crate::types::{FileAttributeFlags, FileReference};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileNameNamespace {
    Posix,
    Win32,
    Dos,
    Win32AndDos,
    Unknown(u8),
}

impl From<u8> for FileNameNamespace {
    fn from(value: u8) -> Self {
        match value {
            0 => FileNameNamespace::Posix,
            1 => FileNameNamespace::Win32,
            2 => FileNameNamespace::Dos,
            3 => FileNameNamespace::Win32AndDos,
            other => FileNameNamespace::Unknown(other),
        }
    }
}

/// Parsed $FILE_NAME. Also the key layout of `$I30` index entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileName {
    pub parent: FileReference,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    pub mft_modified: Option<DateTime<Utc>>,
    pub accessed: Option<DateTime<Utc>>,
    pub allocated_size: u64,
    pub real_size: u64,
    pub flags: FileAttributeFlags,
    pub reparse_value: u32,
    pub name_length: u8,
    pub namespace: FileNameNamespace,
    pub name: String,
}

impl FileName {
    /// The short 8.3 alias of a long name, as opposed to a name users see.
    pub fn is_dos_only(&self) -> bool {
        self.namespace == FileNameNamespace::Dos
    }
}

impl ResidentBody for FileName {
    const TYPE: AttributeType = AttributeType::FileName;

    fn from_cursor(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        let parent = FileReference::from_cursor(cursor)?;
        let created = cursor.read_filetime()?;
        let modified = cursor.read_filetime()?;
        let mft_modified = cursor.read_filetime()?;
        let accessed = cursor.read_filetime()?;
        let allocated_size = cursor.read_u64()?;
        let real_size = cursor.read_u64()?;
        let flags = FileAttributeFlags::from_bits_retain(cursor.read_u32()?);
        let reparse_value = cursor.read_u32()?;
        let name_length = cursor.read_u8()?;
        let namespace = FileNameNamespace::from(cursor.read_u8()?);
        let name = cursor.read_utf16_lossy(usize::from(name_length))?;

        Ok(Self {
            parent,
            created,
            modified,
            mft_modified,
            accessed,
            allocated_size,
            real_size,
            flags,
            reparse_value,
            name_length,
            namespace,
            name,
        })
    }
}
