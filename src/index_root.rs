// Sources:
// - https://dubeyko.com/development/FileSystems/NTFS/ntfsdoc.pdf
// - https://github.com/libyal/libfsntfs/blob/main/documentation/New%20Technologies%20File%20System%20(NTFS).asciidoc

use bitflags::bitflags;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::attribute::{AttributeType, ResidentBody};
use crate::cursor::ByteCursor;
use crate::error::{DecodeError, Result};
use crate::file_name::FileName;
use crate::types::FileReference;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollationRule {
    Binary,
    FileName,
    UnicodeString,
    NtofsUlong,
    NtofsSid,
    NtofsSecurityHash,
    NtofsUlongs,
    Unknown(u32),
}

impl From<u32> for CollationRule {
    fn from(value: u32) -> Self {
        match value {
            0x00 => CollationRule::Binary,
            0x01 => CollationRule::FileName,
            0x02 => CollationRule::UnicodeString,
            0x10 => CollationRule::NtofsUlong,
            0x11 => CollationRule::NtofsSid,
            0x12 => CollationRule::NtofsSecurityHash,
            0x13 => CollationRule::NtofsUlongs,
            other => CollationRule::Unknown(other),
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct IndexNodeFlags: u8 {
        /// Children live in a non-resident $INDEX_ALLOCATION.
        const LARGE_INDEX = 0x01;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct IndexEntryFlags: u32 {
        const HAS_SUB_NODE = 0x01;
        const IS_LAST      = 0x02;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub file_reference: FileReference,
    pub entry_length: u16,
    pub key_length: u16,
    pub flags: IndexEntryFlags,
    /// Decoded key when the index is over $FILE_NAME.
    pub file_name: Option<FileName>,
    pub sub_node_vcn: Option<u64>,
}

impl IndexEntry {
    pub const HEADER_SIZE: u16 = 16;

    fn from_cursor(cursor: &mut ByteCursor<'_>, indexed_type: AttributeType) -> Result<Self> {
        let start = cursor.tell();
        let file_reference = FileReference::from_cursor(cursor)?;
        let entry_length = cursor.read_u16()?;
        let key_length = cursor.read_u16()?;
        let flags = IndexEntryFlags::from_bits_retain(cursor.read_u32()?);

        if entry_length < Self::HEADER_SIZE {
            return Err(DecodeError::StructuralCorruption(format!(
                "index entry at {} is {} bytes long",
                start, entry_length
            )));
        }

        let file_name = if indexed_type == AttributeType::FileName
            && key_length > 0
            && !flags.contains(IndexEntryFlags::IS_LAST)
        {
            let decoded = cursor
                .sub_cursor(start + u64::from(Self::HEADER_SIZE), usize::from(key_length))
                .and_then(|mut key| FileName::from_cursor(&mut key));
            match decoded {
                Ok(name) => Some(name),
                Err(e) => {
                    debug!("index entry at {}: unreadable $FILE_NAME key: {}", start, e);
                    None
                }
            }
        } else {
            None
        };

        let sub_node_vcn = if flags.contains(IndexEntryFlags::HAS_SUB_NODE) {
            cursor.seek(start + u64::from(entry_length) - 8)?;
            Some(cursor.read_u64()?)
        } else {
            None
        };

        Ok(Self {
            file_reference,
            entry_length,
            key_length,
            flags,
            file_name,
            sub_node_vcn,
        })
    }

    pub fn is_last(&self) -> bool {
        self.flags.contains(IndexEntryFlags::IS_LAST)
    }
}

/// $INDEX_ROOT: the root node of a directory or view index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRoot {
    pub indexed_attribute_type: AttributeType,
    pub collation_rule: CollationRule,
    pub index_block_size: u32,
    pub clusters_per_index_block: u8,
    pub entries_offset: u32,
    pub index_length: u32,
    pub allocated_length: u32,
    pub node_flags: IndexNodeFlags,
    pub entries: Vec<IndexEntry>,
}

impl IndexRoot {
    const NODE_HEADER_OFFSET: u64 = 0x10;

    pub fn has_index_allocation(&self) -> bool {
        self.node_flags.contains(IndexNodeFlags::LARGE_INDEX)
    }

    /// Entries below the root live in $INDEX_ALLOCATION, which this crate does not read.
    pub fn sub_node(&self, entry: &IndexEntry) -> Result<Vec<IndexEntry>> {
        Err(DecodeError::Unsupported(format!(
            "index sub-node at VCN {:?}",
            entry.sub_node_vcn
        )))
    }
}

impl ResidentBody for IndexRoot {
    const TYPE: AttributeType = AttributeType::IndexRoot;

    fn from_cursor(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        let indexed_attribute_type = AttributeType::from(cursor.read_u32()?);
        let collation_rule = CollationRule::from(cursor.read_u32()?);
        let index_block_size = cursor.read_u32()?;
        let clusters_per_index_block = cursor.read_u8()?;
        cursor.seek(Self::NODE_HEADER_OFFSET)?;
        let entries_offset = cursor.read_u32()?;
        let index_length = cursor.read_u32()?;
        let allocated_length = cursor.read_u32()?;
        let node_flags = IndexNodeFlags::from_bits_retain(cursor.read_u8()?);

        let start = Self::NODE_HEADER_OFFSET + u64::from(entries_offset);
        let end = (Self::NODE_HEADER_OFFSET + u64::from(index_length)).min(cursor.len() as u64);
        let mut position = start;
        let mut entries = Vec::new();

        while position + u64::from(IndexEntry::HEADER_SIZE) <= end {
            let entry = match cursor
                .seek(position)
                .and_then(|_| IndexEntry::from_cursor(cursor, indexed_attribute_type))
            {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("index root truncated after {} entries: {}", entries.len(), e);
                    break;
                }
            };
            let last = entry.is_last();
            let next = position + u64::from(entry.entry_length);
            entries.push(entry);
            if last {
                break;
            }
            if next > end {
                debug!("index entry at {} runs past the node", position);
                break;
            }
            position = next;
        }

        Ok(Self {
            indexed_attribute_type,
            collation_rule,
            index_block_size,
            clusters_per_index_block,
            entries_offset,
            index_length,
            allocated_length,
            node_flags,
            entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{file_name_value, filetime, index_entry, index_root_value};

    #[test]
    fn directory_root_with_names() {
        let key = file_name_value(5, 5, "Windows", 1, filetime(0));
        let value = index_root_value(
            0x30,
            0,
            &[
                index_entry(0x1C, 1, &key, 0, None),
                index_entry(0, 0, &[], 0x03, Some(7)),
            ],
        );
        let mut c = ByteCursor::new(&value);
        let root = IndexRoot::from_cursor(&mut c).unwrap();
        assert_eq!(root.indexed_attribute_type, AttributeType::FileName);
        assert_eq!(root.collation_rule, CollationRule::FileName);
        assert_eq!(root.index_block_size, 4096);
        assert_eq!(root.entries.len(), 2);
        let first = &root.entries[0];
        assert_eq!(first.file_reference.segment_number, 0x1C);
        assert_eq!(first.file_name.as_ref().unwrap().name, "Windows");
        let last = &root.entries[1];
        assert!(last.is_last());
        assert_eq!(last.sub_node_vcn, Some(7));
        assert!(!root.has_index_allocation());
        assert!(matches!(
            root.sub_node(last),
            Err(DecodeError::Unsupported(_))
        ));
    }

    #[test]
    fn stops_at_is_last() {
        let key = file_name_value(5, 5, "a", 1, filetime(0));
        let value = index_root_value(
            0x30,
            0,
            &[
                index_entry(0, 0, &[], 0x02, None),
                index_entry(0x40, 1, &key, 0, None),
            ],
        );
        let mut c = ByteCursor::new(&value);
        let root = IndexRoot::from_cursor(&mut c).unwrap();
        assert_eq!(root.entries.len(), 1);
    }

    #[test]
    fn malformed_entry_keeps_prior_entries() {
        let key = file_name_value(5, 5, "b", 1, filetime(0));
        let mut bad = index_entry(0x41, 1, &key, 0, None);
        bad[8..10].copy_from_slice(&4u16.to_le_bytes());
        let value = index_root_value(0x30, 0x01, &[index_entry(0x40, 1, &key, 0, None), bad]);
        let mut c = ByteCursor::new(&value);
        let root = IndexRoot::from_cursor(&mut c).unwrap();
        assert_eq!(root.entries.len(), 1);
        assert!(root.has_index_allocation());
    }
}
