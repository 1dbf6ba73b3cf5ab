use serde::{Deserialize, Serialize};

use crate::attribute::{AttributeType, ResidentBody};
use crate::cursor::ByteCursor;
use crate::error::Result;
use crate::types::Guid;

/// $OBJECT_ID. Volumes usually store only the first GUID; the birth fields follow when present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectId {
    pub object_id: Guid,
    pub birth_volume_id: Option<Guid>,
    pub birth_object_id: Option<Guid>,
    pub domain_id: Option<Guid>,
}

impl ResidentBody for ObjectId {
    const TYPE: AttributeType = AttributeType::ObjectId;

    fn from_cursor(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        let object_id = Guid::from_cursor(cursor)?;
        let mut optional = || -> Result<Option<Guid>> {
            if cursor.remaining() >= Guid::SIZE {
                Guid::from_cursor(cursor).map(Some)
            } else {
                Ok(None)
            }
        };
        let birth_volume_id = optional()?;
        let birth_object_id = optional()?;
        let domain_id = optional()?;
        Ok(Self {
            object_id,
            birth_volume_id,
            birth_object_id,
            domain_id,
        })
    }
}
