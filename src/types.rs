//! Small value types shared by several attribute decoders.

use bitflags::bitflags;
use core::fmt;
use serde::{Deserialize, Serialize};

use crate::cursor::ByteCursor;
use crate::error::Result;

/// 8-byte on-disk reference to another MFT entry.
///
/// Bytes 0..4 hold the segment (entry) number, bytes 4..6 are padding and
/// bytes 6..8 the sequence number of that entry at the time the reference was
/// written. It is a foreign key by value: nothing here ever follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FileReference {
    pub segment_number: u32,
    pub sequence_number: u16,
}

impl FileReference {
    pub fn from_cursor(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        let segment_number = cursor.read_u32()?;
        cursor.skip(2)?;
        let sequence_number = cursor.read_u16()?;
        Ok(Self {
            segment_number,
            sequence_number,
        })
    }

    /// A zero reference means "this entry is its own base record".
    pub fn is_null(&self) -> bool {
        self.segment_number == 0 && self.sequence_number == 0
    }
}

impl fmt::Display for FileReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.segment_number, self.sequence_number)
    }
}

/// GUID in its mixed-endian on-disk form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Guid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

impl Guid {
    pub const SIZE: usize = 16;

    pub fn from_cursor(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        let data1 = cursor.read_u32()?;
        let data2 = cursor.read_u16()?;
        let data3 = cursor.read_u16()?;
        let mut data4 = [0u8; 8];
        data4.copy_from_slice(&cursor.read_bytes(8)?);
        Ok(Self {
            data1,
            data2,
            data3,
            data4,
        })
    }

    pub fn is_nil(&self) -> bool {
        *self == Self::default()
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = &self.data4;
        write!(
            f,
            "{:08X}-{:04X}-{:04X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}",
            self.data1, self.data2, self.data3, d[0], d[1], d[2], d[3], d[4], d[5], d[6], d[7]
        )
    }
}

bitflags! {
    /// DOS-style file attributes stored in $STANDARD_INFORMATION and $FILE_NAME.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct FileAttributeFlags: u32 {
        const READONLY            = 0x0000_0001;
        const HIDDEN              = 0x0000_0002;
        const SYSTEM              = 0x0000_0004;
        const VOLUME              = 0x0000_0008;
        const DIRECTORY           = 0x0000_0010;
        const ARCHIVE             = 0x0000_0020;
        const DEVICE              = 0x0000_0040;
        const NORMAL              = 0x0000_0080;
        const TEMPORARY           = 0x0000_0100;
        const SPARSE_FILE         = 0x0000_0200;
        const REPARSE_POINT       = 0x0000_0400;
        const COMPRESSED          = 0x0000_0800;
        const OFFLINE             = 0x0000_1000;
        const NOT_CONTENT_INDEXED = 0x0000_2000;
        const ENCRYPTED           = 0x0000_4000;
        const VIRTUAL             = 0x0001_0000;
        const DIRECTORY_INDEX     = 0x1000_0000;
        const INDEX_VIEW          = 0x2000_0000;
    }
}

/// `"A | B"` rendering of any bit set, `"None"` when empty.
pub fn flag_names<F: bitflags::Flags>(flags: &F) -> String {
    let names: Vec<&str> = flags.iter_names().map(|(name, _)| name).collect();
    if names.is_empty() {
        "None".to_string()
    } else {
        names.join(" | ")
    }
}
