// Sources:
// - https://learn.microsoft.com/windows/win32/api/winnt/ns-winnt-security_descriptor_relative
// - https://learn.microsoft.com/windows/win32/secauthz/access-control-lists
// - https://learn.microsoft.com/openspecs/windows_protocols/ms-dtyp/f992ad60-0fe4-4b87-9fed-beb478836861

use bitflags::bitflags;
use core::fmt;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::attribute::{AttributeType, ResidentBody};
use crate::cursor::ByteCursor;
use crate::error::{DecodeError, Result};
use crate::types::Guid;

/// Windows security identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sid {
    pub revision: u8,
    pub sub_authority_count: u8,
    /// 48-bit identifier authority.
    pub authority: u64,
    pub sub_authorities: Vec<u32>,
}

impl Sid {
    pub const MAX_SUB_AUTHORITIES: u8 = 15;

    pub fn from_cursor(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        let offset = cursor.tell();
        let revision = cursor.read_u8()?;
        let sub_authority_count = cursor.read_u8()?;
        if sub_authority_count > Self::MAX_SUB_AUTHORITIES {
            return Err(DecodeError::StructuralCorruption(format!(
                "SID at {} claims {} sub-authorities",
                offset, sub_authority_count
            )));
        }
        let authority = cursor.read_u48_be()?;
        let sub_authorities = (0..sub_authority_count)
            .map(|_| cursor.read_u32())
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            revision,
            sub_authority_count,
            authority,
            sub_authorities,
        })
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S-{}-", self.revision)?;
        // authorities that do not fit 32 bits are written in hex
        if self.authority >> 32 == 0 {
            write!(f, "{}", self.authority)?;
        } else {
            write!(f, "0x{:012X}", self.authority)?;
        }
        for sub in &self.sub_authorities {
            write!(f, "-{}", sub)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AceType {
    AccessAllowed,
    AccessDenied,
    SystemAudit,
    SystemAlarm,
    AccessAllowedCompound,
    AccessAllowedObject,
    AccessDeniedObject,
    SystemAuditObject,
    SystemAlarmObject,
    AccessAllowedCallback,
    AccessDeniedCallback,
    AccessAllowedCallbackObject,
    AccessDeniedCallbackObject,
    SystemAuditCallback,
    SystemAlarmCallback,
    SystemAuditCallbackObject,
    SystemAlarmCallbackObject,
    SystemMandatoryLabel,
    SystemResourceAttribute,
    SystemScopedPolicyId,
    Unknown(u8),
}

impl From<u8> for AceType {
    fn from(value: u8) -> Self {
        use AceType::*;
        match value {
            0x00 => AccessAllowed,
            0x01 => AccessDenied,
            0x02 => SystemAudit,
            0x03 => SystemAlarm,
            0x04 => AccessAllowedCompound,
            0x05 => AccessAllowedObject,
            0x06 => AccessDeniedObject,
            0x07 => SystemAuditObject,
            0x08 => SystemAlarmObject,
            0x09 => AccessAllowedCallback,
            0x0A => AccessDeniedCallback,
            0x0B => AccessAllowedCallbackObject,
            0x0C => AccessDeniedCallbackObject,
            0x0D => SystemAuditCallback,
            0x0E => SystemAlarmCallback,
            0x0F => SystemAuditCallbackObject,
            0x10 => SystemAlarmCallbackObject,
            0x11 => SystemMandatoryLabel,
            0x12 => SystemResourceAttribute,
            0x13 => SystemScopedPolicyId,
            other => Unknown(other),
        }
    }
}

impl AceType {
    /// Object ACEs carry object flags and up to two GUIDs ahead of the SID.
    pub fn is_object(&self) -> bool {
        use AceType::*;
        matches!(
            self,
            AccessAllowedObject
                | AccessDeniedObject
                | SystemAuditObject
                | SystemAlarmObject
                | AccessAllowedCallbackObject
                | AccessDeniedCallbackObject
                | SystemAuditCallbackObject
                | SystemAlarmCallbackObject
        )
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct AceFlags: u8 {
        const OBJECT_INHERIT       = 0x01;
        const CONTAINER_INHERIT    = 0x02;
        const NO_PROPAGATE_INHERIT = 0x04;
        const INHERIT_ONLY         = 0x08;
        const INHERITED            = 0x10;
        const SUCCESSFUL_ACCESS    = 0x40;
        const FAILED_ACCESS        = 0x80;
    }
}

bitflags! {
    /// File-object rights in the low word, then standard, then generic rights.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct AccessMask: u32 {
        const FILE_READ_DATA         = 0x0000_0001;
        const FILE_WRITE_DATA        = 0x0000_0002;
        const FILE_APPEND_DATA       = 0x0000_0004;
        const FILE_READ_EA           = 0x0000_0008;
        const FILE_WRITE_EA          = 0x0000_0010;
        const FILE_EXECUTE           = 0x0000_0020;
        const FILE_DELETE_CHILD      = 0x0000_0040;
        const FILE_READ_ATTRIBUTES   = 0x0000_0080;
        const FILE_WRITE_ATTRIBUTES  = 0x0000_0100;
        const DELETE                 = 0x0001_0000;
        const READ_CONTROL           = 0x0002_0000;
        const WRITE_DAC              = 0x0004_0000;
        const WRITE_OWNER            = 0x0008_0000;
        const SYNCHRONIZE            = 0x0010_0000;
        const ACCESS_SYSTEM_SECURITY = 0x0100_0000;
        const MAXIMUM_ALLOWED        = 0x0200_0000;
        const GENERIC_ALL            = 0x1000_0000;
        const GENERIC_EXECUTE        = 0x2000_0000;
        const GENERIC_WRITE          = 0x4000_0000;
        const GENERIC_READ           = 0x8000_0000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct ObjectAceFlags: u32 {
        const OBJECT_TYPE_PRESENT           = 0x1;
        const INHERITED_OBJECT_TYPE_PRESENT = 0x2;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ace {
    pub ace_type: AceType,
    pub flags: AceFlags,
    pub size: u16,
    pub mask: AccessMask,
    pub object_flags: Option<ObjectAceFlags>,
    pub object_type: Option<Guid>,
    pub inherited_object_type: Option<Guid>,
    pub sid: Sid,
}

impl Ace {
    pub const HEADER_SIZE: u16 = 8;

    /// Decode one ACE. Everything past the fixed header is read from inside the
    /// ACE's own `size` bytes.
    pub fn from_cursor(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        let start = cursor.tell();
        let ace_type = AceType::from(cursor.read_u8()?);
        let flags = AceFlags::from_bits_retain(cursor.read_u8()?);
        let size = cursor.read_u16()?;
        let mask = AccessMask::from_bits_retain(cursor.read_u32()?);

        let mut body = cursor.sub_cursor(start, usize::from(size))?;
        body.seek(u64::from(Self::HEADER_SIZE))?;

        let (object_flags, object_type, inherited_object_type) = if ace_type.is_object() {
            let object_flags = ObjectAceFlags::from_bits_retain(body.read_u32()?);
            let object_type = if object_flags.contains(ObjectAceFlags::OBJECT_TYPE_PRESENT) {
                Some(Guid::from_cursor(&mut body)?)
            } else {
                None
            };
            let inherited_object_type =
                if object_flags.contains(ObjectAceFlags::INHERITED_OBJECT_TYPE_PRESENT) {
                    Some(Guid::from_cursor(&mut body)?)
                } else {
                    None
                };
            (Some(object_flags), object_type, inherited_object_type)
        } else {
            (None, None, None)
        };
        let sid = Sid::from_cursor(&mut body)?;

        cursor.seek(start + u64::from(size))?;
        Ok(Self {
            ace_type,
            flags,
            size,
            mask,
            object_flags,
            object_type,
            inherited_object_type,
            sid,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acl {
    pub revision: u8,
    pub size: u16,
    pub ace_count: u16,
    pub entries: Vec<Ace>,
}

impl Acl {
    pub const HEADER_SIZE: u64 = 8;

    /// Read the ACL header, then ACEs until the declared size or count is used up.
    /// An unreadable ACE ends the list; the ACEs before it are kept.
    pub fn from_cursor(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        let start = cursor.tell();
        let revision = cursor.read_u8()?;
        cursor.skip(1)?;
        let size = cursor.read_u16()?;
        let ace_count = cursor.read_u16()?;
        cursor.skip(2)?;

        let end = start + u64::from(size);
        let mut position = start + Self::HEADER_SIZE;
        let mut entries = Vec::with_capacity(usize::from(ace_count));

        while position < end && entries.len() < usize::from(ace_count) {
            let ace = match cursor.seek(position).and_then(|_| Ace::from_cursor(cursor)) {
                Ok(ace) => ace,
                Err(e) => {
                    debug!("ACL at {} truncated after {} entries: {}", start, entries.len(), e);
                    break;
                }
            };
            let next = position + u64::from(ace.size);
            if ace.size < Ace::HEADER_SIZE || next > end {
                debug!(
                    "ACL at {} truncated after {} entries: ACE size {} overruns the list",
                    start,
                    entries.len(),
                    ace.size
                );
                break;
            }
            entries.push(ace);
            position = next;
        }

        Ok(Self {
            revision,
            size,
            ace_count,
            entries,
        })
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct SecurityDescriptorControl: u16 {
        const SE_OWNER_DEFAULTED       = 0x0001;
        const SE_GROUP_DEFAULTED       = 0x0002;
        const SE_DACL_PRESENT          = 0x0004;
        const SE_DACL_DEFAULTED        = 0x0008;
        const SE_SACL_PRESENT          = 0x0010;
        const SE_SACL_DEFAULTED        = 0x0020;
        const SE_DACL_AUTO_INHERIT_REQ = 0x0100;
        const SE_SACL_AUTO_INHERIT_REQ = 0x0200;
        const SE_DACL_AUTO_INHERITED   = 0x0400;
        const SE_SACL_AUTO_INHERITED   = 0x0800;
        const SE_DACL_PROTECTED        = 0x1000;
        const SE_SACL_PROTECTED        = 0x2000;
        const SE_RM_CONTROL_VALID      = 0x4000;
        const SE_SELF_RELATIVE         = 0x8000;
    }
}

/// $SECURITY_DESCRIPTOR in self-relative form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityDescriptor {
    pub revision: u8,
    pub control: SecurityDescriptorControl,
    pub owner_offset: u32,
    pub group_offset: u32,
    pub sacl_offset: u32,
    pub dacl_offset: u32,
    pub owner: Option<Sid>,
    pub group: Option<Sid>,
    pub sacl: Option<Acl>,
    pub dacl: Option<Acl>,
}

impl SecurityDescriptor {
    fn read_at<T>(
        cursor: &mut ByteCursor<'_>,
        origin: u64,
        offset: u32,
        decode: impl FnOnce(&mut ByteCursor<'_>) -> Result<T>,
    ) -> Result<Option<T>> {
        if offset == 0 {
            return Ok(None);
        }
        cursor.seek(origin + u64::from(offset))?;
        decode(cursor).map(Some)
    }
}

impl ResidentBody for SecurityDescriptor {
    const TYPE: AttributeType = AttributeType::SecurityDescriptor;

    fn from_cursor(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        let origin = cursor.tell();
        let revision = cursor.read_u8()?;
        cursor.skip(1)?;
        let control = SecurityDescriptorControl::from_bits_retain(cursor.read_u16()?);
        let owner_offset = cursor.read_u32()?;
        let group_offset = cursor.read_u32()?;
        let sacl_offset = cursor.read_u32()?;
        let dacl_offset = cursor.read_u32()?;

        let mut sd = Self {
            revision,
            control,
            owner_offset,
            group_offset,
            sacl_offset,
            dacl_offset,
            owner: None,
            group: None,
            sacl: None,
            dacl: None,
        };

        // offsets are relative to the descriptor only in self-relative layout
        if !control.contains(SecurityDescriptorControl::SE_SELF_RELATIVE) {
            debug!("security descriptor is not self-relative, skipping SIDs and ACLs");
            return Ok(sd);
        }

        sd.owner = Self::read_at(cursor, origin, owner_offset, Sid::from_cursor)?;
        sd.group = Self::read_at(cursor, origin, group_offset, Sid::from_cursor)?;
        if control.contains(SecurityDescriptorControl::SE_SACL_PRESENT) {
            sd.sacl = Self::read_at(cursor, origin, sacl_offset, Acl::from_cursor)?;
        }
        if control.contains(SecurityDescriptorControl::SE_DACL_PRESENT) {
            sd.dacl = Self::read_at(cursor, origin, dacl_offset, Acl::from_cursor)?;
        }
        Ok(sd)
    }
}
