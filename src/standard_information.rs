use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::attribute::{AttributeType, ResidentBody};
use crate::cursor::ByteCursor;
use crate::error::Result;
use crate::types::FileAttributeFlags;

/// Parsed $STANDARD_INFORMATION. The NTFS 3.0+ tail is present only when the value is long enough.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardInformation {
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    pub mft_modified: Option<DateTime<Utc>>,
    pub accessed: Option<DateTime<Utc>>,
    pub file_attributes: FileAttributeFlags,
    pub max_versions: u32,
    pub version_number: u32,
    pub class_id: u32,
    pub owner_id: Option<u32>,
    pub security_id: Option<u32>,
    pub quota_charged: Option<u64>,
    pub usn: Option<u64>,
}

impl ResidentBody for StandardInformation {
    const TYPE: AttributeType = AttributeType::StandardInformation;

    fn from_cursor(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        let created = cursor.read_filetime()?;
        let modified = cursor.read_filetime()?;
        let mft_modified = cursor.read_filetime()?;
        let accessed = cursor.read_filetime()?;
        let file_attributes = FileAttributeFlags::from_bits_retain(cursor.read_u32()?);
        let max_versions = cursor.read_u32()?;
        let version_number = cursor.read_u32()?;
        let class_id = cursor.read_u32()?;

        let len = cursor.len();
        let owner_id = if len >= 0x34 { Some(cursor.read_u32()?) } else { None };
        let security_id = if len >= 0x38 { Some(cursor.read_u32()?) } else { None };
        let quota_charged = if len >= 0x40 { Some(cursor.read_u64()?) } else { None };
        let usn = if len >= 0x48 { Some(cursor.read_u64()?) } else { None };

        Ok(Self {
            created,
            modified,
            mft_modified,
            accessed,
            file_attributes,
            max_versions,
            version_number,
            class_id,
            owner_id,
            security_id,
            quota_charged,
            usn,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeError;
    use crate::testutil::{filetime, standard_information_value};

    #[test]
    fn full_value() {
        let value = standard_information_value(filetime(1_500_000_000), 0x26, true);
        let mut c = ByteCursor::new(&value);
        let si = StandardInformation::from_cursor(&mut c).unwrap();
        assert_eq!(si.created.unwrap().timestamp(), 1_500_000_000);
        assert_eq!(si.accessed.unwrap().timestamp(), 1_500_000_000);
        assert!(si.file_attributes.contains(FileAttributeFlags::HIDDEN));
        assert!(si.file_attributes.contains(FileAttributeFlags::ARCHIVE));
        assert_eq!(si.security_id, Some(0x100));
        assert_eq!(si.usn, Some(0x1122));
    }

    #[test]
    fn legacy_value_has_no_tail() {
        let value = standard_information_value(filetime(0), 0, false);
        assert_eq!(value.len(), 0x30);
        let mut c = ByteCursor::new(&value);
        let si = StandardInformation::from_cursor(&mut c).unwrap();
        assert_eq!(si.owner_id, None);
        assert_eq!(si.usn, None);
    }

    #[test]
    fn short_value_is_truncated() {
        let value = standard_information_value(filetime(0), 0, false);
        let mut c = ByteCursor::new(&value[..0x20]);
        assert!(matches!(
            StandardInformation::from_cursor(&mut c),
            Err(DecodeError::Truncated { .. })
        ));
    }
}
