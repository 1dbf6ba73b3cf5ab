// Sources:
// - https://dubeyko.com/development/FileSystems/NTFS/ntfsdoc.pdf
// - https://learn.microsoft.com/windows/win32/devnotes/file-record-segment-header

use bitflags::bitflags;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::cursor::ByteCursor;
use crate::diagnostics::DiagnosticSink;
use crate::error::{DecodeError, Result};
use crate::types::FileReference;

/// Size of every $MFT entry this crate decodes.
pub const MFT_ENTRY_SIZE: usize = 1024;

/// Bytes of fixed header that must be present for a record to be decodable at all.
pub const ENTRY_HEADER_MIN_SIZE: usize = 0x2A;

/// Offset of the record number field, only present on XP-era and later volumes.
const RECORD_NUMBER_OFFSET: u16 = 0x2C;

/// Sector stride protected by the update sequence array.
const FIXUP_STRIDE: usize = 512;

/// Multi-sector signature classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Signature {
    File,
    Baad,
    /// Anything that is neither `FILE` nor `BAAD`.
    Crpt,
}

impl Signature {
    pub const RAW_FILE: u32 = 0x454C_4946;
    pub const RAW_BAAD: u32 = 0x4441_4142;

    pub fn from_raw(raw: u32) -> Self {
        match raw {
            Self::RAW_FILE => Signature::File,
            Self::RAW_BAAD => Signature::Baad,
            _ => Signature::Crpt,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Signature::File => "FILE",
            Signature::Baad => "BAAD",
            Signature::Crpt => "CRPT",
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct EntryFlags: u16 {
        const ACTIVE        = 0x0001;
        const HAS_INDEX     = 0x0002;
        const IS_EXTENSION  = 0x0004;
        const SPECIAL_INDEX = 0x0008;
    }
}

/// Header found at the very beginning of every record (offset 0).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryHeader {
    pub signature: Signature,
    pub update_sequence_array_offset: u16,
    pub update_sequence_array_size: u16,
    pub log_file_sequence_number: u64,
    pub sequence_number: u16,
    pub reference_count: u16,
    pub first_attribute_offset: u16,
    pub flags: EntryFlags,
    pub used_size: u32,
    pub total_size: u32,
    pub base_file_record_segment: FileReference,
    pub first_attribute_id: u16,
    /// Opaque on-disk value, kept exactly as read.
    pub mft_record_number: Option<u32>,
}

impl EntryHeader {
    /// Decode the fixed header from a cursor positioned at the record start.
    ///
    /// A `BAAD` or unrecognized signature is recorded, not rejected. Only a
    /// buffer too short for the header, or a first-attribute offset beyond the
    /// buffer, fails.
    pub fn from_cursor(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        let signature = Signature::from_raw(cursor.read_u32()?);
        let update_sequence_array_offset = cursor.read_u16()?;
        let update_sequence_array_size = cursor.read_u16()?;
        let log_file_sequence_number = cursor.read_u64()?;
        let sequence_number = cursor.read_u16()?;
        let reference_count = cursor.read_u16()?;
        let first_attribute_offset = cursor.read_u16()?;
        let flags = EntryFlags::from_bits_retain(cursor.read_u16()?);
        let used_size = cursor.read_u32()?;
        let total_size = cursor.read_u32()?;
        let base_file_record_segment = FileReference::from_cursor(cursor)?;
        let first_attribute_id = cursor.read_u16()?;

        let mft_record_number = if first_attribute_offset >= RECORD_NUMBER_OFFSET + 4 {
            cursor.seek(u64::from(RECORD_NUMBER_OFFSET))?;
            Some(cursor.read_u32()?)
        } else {
            None
        };

        if usize::from(first_attribute_offset) > cursor.len() {
            return Err(DecodeError::OutOfBounds {
                offset: u64::from(first_attribute_offset),
                len: cursor.len(),
            });
        }

        if signature != Signature::File {
            debug!("record signature is {}", signature.as_str());
        }

        Ok(EntryHeader {
            signature,
            update_sequence_array_offset,
            update_sequence_array_size,
            log_file_sequence_number,
            sequence_number,
            reference_count,
            first_attribute_offset,
            flags,
            used_size,
            total_size,
            base_file_record_segment,
            first_attribute_id,
            mft_record_number,
        })
    }

    pub fn is_active(&self) -> bool {
        self.flags.contains(EntryFlags::ACTIVE)
    }

    pub fn has_index(&self) -> bool {
        self.flags.contains(EntryFlags::HAS_INDEX)
    }

    /// Extension records point back at their base record; base records hold a null reference.
    pub fn is_base_record(&self) -> bool {
        self.base_file_record_segment.is_null()
    }

    /// Describe the ways the size/offset fields contradict each other, if any.
    pub fn consistency_problem(&self, buffer_len: usize) -> Option<String> {
        if self.total_size as usize > buffer_len.max(MFT_ENTRY_SIZE) {
            return Some(format!(
                "total size {} exceeds the {} byte record",
                self.total_size,
                buffer_len.max(MFT_ENTRY_SIZE)
            ));
        }
        if self.used_size > self.total_size {
            return Some(format!(
                "used size {} exceeds total size {}",
                self.used_size, self.total_size
            ));
        }
        if u32::from(self.first_attribute_offset) >= self.used_size {
            return Some(format!(
                "first attribute offset {} is not below used size {}",
                self.first_attribute_offset, self.used_size
            ));
        }
        None
    }
}

/// Undo the multi-sector protection on a private copy of the record.
///
/// On disk every 512-byte sector ends with the update sequence number, and the
/// two bytes it displaced are kept in the update sequence array. A sector whose
/// tail does not carry the number is left as read and reported; every other
/// sector is restored. Returns the count of restored sectors.
pub fn apply_fixups(
    buf: &mut [u8],
    usa_offset: usize,
    usa_count: usize,
    sink: &mut DiagnosticSink,
) -> usize {
    let Some(protected) = usa_count.checked_sub(1) else {
        return 0;
    };
    let array = match ByteCursor::new(buf)
        .sub_cursor(usa_offset as u64, 2 * usa_count)
        .and_then(|mut usa| usa.read_bytes(2 * usa_count))
    {
        Ok(array) => array,
        Err(e) => {
            sink.report(
                None,
                usa_offset as u64,
                DecodeError::StructuralCorruption(format!(
                    "update sequence array of {} words does not fit the record: {}",
                    usa_count, e
                )),
            );
            return 0;
        }
    };
    let (usn, saved) = array.split_at(2);

    let sectors = buf.len() / FIXUP_STRIDE;
    if protected > sectors {
        sink.report(
            None,
            usa_offset as u64,
            DecodeError::StructuralCorruption(format!(
                "update sequence array protects {} sectors, the record holds {}",
                protected, sectors
            )),
        );
    }

    let tail = FIXUP_STRIDE - 2;
    let mut restored = 0;
    for (index, (sector, original)) in buf
        .chunks_exact_mut(FIXUP_STRIDE)
        .zip(saved.chunks_exact(2))
        .enumerate()
    {
        if &sector[tail..] != usn {
            sink.report(
                None,
                (index * FIXUP_STRIDE + tail) as u64,
                DecodeError::StructuralCorruption(format!(
                    "sector {} does not end with update sequence number {:02x}{:02x}",
                    index, usn[1], usn[0]
                )),
            );
            continue;
        }
        sector[tail..].copy_from_slice(original);
        restored += 1;
    }
    debug!("restored {} of {} protected sectors", restored, protected);
    restored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::RecordBuilder;

    #[test]
    fn signature_classification() {
        assert_eq!(Signature::from_raw(u32::from_le_bytes(*b"FILE")), Signature::File);
        assert_eq!(Signature::from_raw(0x4441_4142), Signature::Baad);
        assert_eq!(Signature::from_raw(0), Signature::Crpt);
        assert_eq!(Signature::from_raw(u32::from_le_bytes(*b"INDX")), Signature::Crpt);
    }

    #[test]
    fn decodes_fixed_fields() {
        let raw = RecordBuilder::new().sequence(7).flags(0x0003).build();
        let mut c = ByteCursor::new(&raw);
        let h = EntryHeader::from_cursor(&mut c).unwrap();
        assert_eq!(h.signature, Signature::File);
        assert_eq!(h.sequence_number, 7);
        assert!(h.is_active());
        assert!(h.has_index());
        assert_eq!(h.total_size, 1024);
        assert_eq!(h.first_attribute_offset, 0x38);
        assert_eq!(h.mft_record_number, Some(RecordBuilder::DEFAULT_RECORD_NUMBER));
        assert!(h.is_base_record());
        assert_eq!(h.consistency_problem(raw.len()), None);
    }

    #[test]
    fn baad_header_still_decodes() {
        let mut raw = RecordBuilder::new().build();
        raw[0..4].copy_from_slice(b"BAAD");
        let mut c = ByteCursor::new(&raw);
        let h = EntryHeader::from_cursor(&mut c).unwrap();
        assert_eq!(h.signature, Signature::Baad);
        assert_eq!(h.sequence_number, 1);
    }

    #[test]
    fn short_buffer_is_truncated() {
        let raw = RecordBuilder::new().build();
        let mut c = ByteCursor::new(&raw[..0x20]);
        assert!(matches!(
            EntryHeader::from_cursor(&mut c),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn legacy_header_has_no_record_number() {
        let mut raw = RecordBuilder::new().build();
        raw[0x14..0x16].copy_from_slice(&0x2Au16.to_le_bytes());
        let mut c = ByteCursor::new(&raw);
        let h = EntryHeader::from_cursor(&mut c).unwrap();
        assert_eq!(h.mft_record_number, None);
    }

    #[test]
    fn fixups_restore_sector_tails() {
        let mut raw = RecordBuilder::new().build();
        // builder protected the record: sector tails now carry the USN
        assert_eq!(&raw[510..512], &raw[0x30..0x32]);
        let mut sink = DiagnosticSink::new(None);
        assert_eq!(apply_fixups(&mut raw, 0x30, 3, &mut sink), 2);
        assert!(sink.is_empty());
        assert_eq!(&raw[510..512], &[0, 0]);
        assert_eq!(&raw[1022..1024], &[0, 0]);
    }

    #[test]
    fn mismatched_sector_is_reported_and_the_rest_restored() {
        let mut raw = RecordBuilder::new().build();
        raw[510] ^= 0xFF;
        let mut sink = DiagnosticSink::new(Some(7));
        assert_eq!(apply_fixups(&mut raw, 0x30, 3, &mut sink), 1);
        // second sector is repaired even though the first one failed
        assert_eq!(&raw[1022..1024], &[0, 0]);
        let items = sink.into_inner();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].offset, 510);
        assert!(matches!(items[0].error, DecodeError::StructuralCorruption(_)));
    }

    #[test]
    fn array_outside_the_record_is_reported() {
        let mut raw = RecordBuilder::new().build();
        let before = raw.clone();
        let mut sink = DiagnosticSink::new(None);
        assert_eq!(apply_fixups(&mut raw, 1020, 3, &mut sink), 0);
        assert_eq!(raw, before);
        assert_eq!(sink.into_inner()[0].offset, 1020);

        let mut sink = DiagnosticSink::new(None);
        assert_eq!(apply_fixups(&mut raw, 0x30, 0, &mut sink), 0);
        assert!(sink.is_empty());
    }

    #[test]
    fn array_longer_than_the_record_restores_what_exists() {
        let mut raw = RecordBuilder::new().build();
        let mut sink = DiagnosticSink::new(None);
        assert_eq!(apply_fixups(&mut raw, 0x30, 4, &mut sink), 2);
        assert_eq!(sink.into_inner().len(), 1);
    }
}
