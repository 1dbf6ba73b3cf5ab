use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::attribute::{AttributeType, ResidentBody};
use crate::cursor::ByteCursor;
use crate::error::Result;

/// $VOLUME_NAME: the whole value is the label, possibly empty.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VolumeName {
    pub name: String,
}

impl ResidentBody for VolumeName {
    const TYPE: AttributeType = AttributeType::VolumeName;

    fn from_cursor(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        let chars = cursor.remaining() / 2;
        Ok(Self {
            name: cursor.read_utf16_lossy(chars)?,
        })
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct VolumeFlags: u16 {
        const DIRTY           = 0x0001;
        const RESIZE_LOGFILE  = 0x0002;
        const MOUNT_UPGRADE   = 0x0004;
        const MOUNT_NT4       = 0x0008;
        const DELETE_USN      = 0x0010;
        const OBJECTID_REPAIR = 0x0020;
        const CHKDSK_MODIFIED = 0x8000;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeInformation {
    pub major_version: u8,
    pub minor_version: u8,
    pub flags: VolumeFlags,
}

impl VolumeInformation {
    pub fn version(&self) -> String {
        format!("{}.{}", self.major_version, self.minor_version)
    }
}

impl ResidentBody for VolumeInformation {
    const TYPE: AttributeType = AttributeType::VolumeInformation;

    fn from_cursor(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        cursor.skip(8)?;
        let major_version = cursor.read_u8()?;
        let minor_version = cursor.read_u8()?;
        let flags = VolumeFlags::from_bits_retain(cursor.read_u16()?);
        Ok(Self {
            major_version,
            minor_version,
            flags,
        })
    }
}
