// Sources:
// - https://dubeyko.com/development/FileSystems/NTFS/ntfsdoc.pdf
// - https://en.wikipedia.org/wiki/NTFS

use chrono::{DateTime, Utc};
use log::{debug, trace};
use prettytable::{Table, row};
use serde::Serialize;
use serde_json::{Value, json};

use crate::attribute::{Attribute, AttributeHeader, AttributeType, ResidentBody};
use crate::attribute_list::AttributeList;
use crate::cursor::ByteCursor;
use crate::data::Data;
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::error::{DecodeError, Result};
use crate::file_name::FileName;
use crate::header::{EntryHeader, apply_fixups};
use crate::index_root::IndexRoot;
use crate::object_id::ObjectId;
use crate::security::SecurityDescriptor;
use crate::standard_information::StandardInformation;
use crate::types::{FileReference, flag_names};
use crate::volume::{VolumeInformation, VolumeName};

/// Smallest attribute record that can hold a resident header.
const MIN_ATTRIBUTE_HEADER: u64 = 0x10;

/// A named $DATA attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataStream {
    pub name: String,
    pub size: u64,
    pub resident: bool,
}

/// One decoded 1 KiB MFT entry. Each collection keeps on-disk order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MftEntry {
    /// Caller-supplied record index, if any.
    pub identifier: Option<u64>,
    pub header: EntryHeader,
    pub standard_information: Vec<Attribute<StandardInformation>>,
    pub attribute_list: Vec<Attribute<AttributeList>>,
    pub file_name: Vec<Attribute<FileName>>,
    pub object_id: Vec<Attribute<ObjectId>>,
    pub security_descriptor: Vec<Attribute<SecurityDescriptor>>,
    pub volume_name: Vec<Attribute<VolumeName>>,
    pub volume_information: Vec<Attribute<VolumeInformation>>,
    pub data: Vec<Attribute<Data>>,
    pub index_root: Vec<Attribute<IndexRoot>>,
    pub index_allocation: Vec<AttributeHeader>,
    pub bitmap: Vec<AttributeHeader>,
    pub reparse_point: Vec<AttributeHeader>,
    pub ea_information: Vec<AttributeHeader>,
    pub ea: Vec<AttributeHeader>,
    pub logged_utility_stream: Vec<AttributeHeader>,
    pub unknown: Vec<AttributeHeader>,
    pub diagnostics: Vec<Diagnostic>,
}

impl MftEntry {
    /// Decode a record with no caller identity attached.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        Self::from_bytes(raw, None)
    }

    /// Decode a raw record.
    ///
    /// Fails only when the fixed header itself cannot be read. Every later
    /// problem leaves the affected attribute without a body and is recorded in
    /// [`MftEntry::diagnostics`].
    pub fn from_bytes(raw: &[u8], identifier: Option<u64>) -> Result<Self> {
        let header = EntryHeader::from_cursor(&mut ByteCursor::new(raw))?;
        let mut sink = DiagnosticSink::new(identifier.or(header.mft_record_number.map(u64::from)));

        if let Some(problem) = header.consistency_problem(raw.len()) {
            sink.report(None, 0, DecodeError::StructuralCorruption(problem));
        }

        // patch a private copy, the caller's buffer stays untouched
        let mut buf = raw.to_vec();
        apply_fixups(
            &mut buf,
            usize::from(header.update_sequence_array_offset),
            usize::from(header.update_sequence_array_size),
            &mut sink,
        );

        let mut entry = MftEntry {
            identifier,
            header,
            standard_information: Vec::new(),
            attribute_list: Vec::new(),
            file_name: Vec::new(),
            object_id: Vec::new(),
            security_descriptor: Vec::new(),
            volume_name: Vec::new(),
            volume_information: Vec::new(),
            data: Vec::new(),
            index_root: Vec::new(),
            index_allocation: Vec::new(),
            bitmap: Vec::new(),
            reparse_point: Vec::new(),
            ea_information: Vec::new(),
            ea: Vec::new(),
            logged_utility_stream: Vec::new(),
            unknown: Vec::new(),
            diagnostics: Vec::new(),
        };
        entry.decode_attributes(&ByteCursor::new(&buf), &mut sink);
        entry.diagnostics = sink.into_inner();
        Ok(entry)
    }

    /// Walk the attribute records from the first-attribute offset.
    ///
    /// Every cycle advances by the record length of the attribute just read,
    /// whatever happened to its body, so the walk always terminates.
    fn decode_attributes(&mut self, record: &ByteCursor<'_>, sink: &mut DiagnosticSink) {
        let used_size = u64::from(self.header.used_size);
        let len = record.len() as u64;
        let mut position = u64::from(self.header.first_attribute_offset);
        let mut cursor = record.clone();

        while position < used_size {
            if position + MIN_ATTRIBUTE_HEADER > len {
                sink.report(
                    None,
                    position,
                    DecodeError::OutOfBounds {
                        offset: position,
                        len: record.len(),
                    },
                );
                break;
            }
            if let Err(e) = cursor.seek(position) {
                sink.report(None, position, e);
                break;
            }
            let header = match AttributeHeader::from_cursor(&mut cursor, sink) {
                Ok(Some(header)) => header,
                Ok(None) => break,
                Err(e) => {
                    sink.report(None, position, e);
                    break;
                }
            };

            let record_length = u64::from(header.record_length);
            if record_length == 0 {
                sink.report(
                    Some(header.type_code),
                    position,
                    DecodeError::StructuralCorruption("zero-length attribute record".into()),
                );
                break;
            }
            if position + record_length > len {
                sink.report(
                    Some(header.type_code),
                    position,
                    DecodeError::OutOfBounds {
                        offset: position + record_length,
                        len: record.len(),
                    },
                );
                break;
            }

            trace!(
                "attribute {} at {} ({} bytes)",
                header.type_code, position, record_length
            );
            self.dispatch(header, record, sink);
            position += record_length;
        }
    }

    fn dispatch(
        &mut self,
        header: AttributeHeader,
        record: &ByteCursor<'_>,
        sink: &mut DiagnosticSink,
    ) {
        match header.type_code {
            AttributeType::StandardInformation => {
                self.standard_information.push(decode_body(header, record, sink))
            }
            AttributeType::AttributeList => {
                self.attribute_list.push(decode_body(header, record, sink))
            }
            AttributeType::FileName => self.file_name.push(decode_body(header, record, sink)),
            AttributeType::ObjectId => self.object_id.push(decode_body(header, record, sink)),
            AttributeType::SecurityDescriptor => {
                self.security_descriptor.push(decode_body(header, record, sink))
            }
            AttributeType::VolumeName => self.volume_name.push(decode_body(header, record, sink)),
            AttributeType::VolumeInformation => {
                self.volume_information.push(decode_body(header, record, sink))
            }
            AttributeType::Data => self.data.push(decode_body(header, record, sink)),
            AttributeType::IndexRoot => self.index_root.push(decode_body(header, record, sink)),
            AttributeType::IndexAllocation => self.index_allocation.push(header),
            AttributeType::Bitmap => self.bitmap.push(header),
            AttributeType::ReparsePoint => self.reparse_point.push(header),
            AttributeType::EaInformation => self.ea_information.push(header),
            AttributeType::Ea => self.ea.push(header),
            AttributeType::LoggedUtilityStream => self.logged_utility_stream.push(header),
            AttributeType::EndOfAttributes | AttributeType::Unknown(_) => {
                sink.report(
                    None,
                    header.offset,
                    DecodeError::UnknownAttributeType(header.type_code.code()),
                );
                self.unknown.push(header);
            }
        }
    }

    /// Names from every decoded $FILE_NAME (there may be 2, long & DOS).
    pub fn file_names(&self) -> Vec<&FileName> {
        self.file_name.iter().filter_map(|a| a.body.as_ref()).collect()
    }

    /// The first name a user would see; the DOS alias only when nothing else exists.
    pub fn primary_name(&self) -> Option<&str> {
        let names = self.file_names();
        names
            .iter()
            .find(|f| !f.is_dos_only())
            .or_else(|| names.first())
            .map(|f| f.name.as_str())
    }

    pub fn parent_reference(&self) -> Option<FileReference> {
        let names = self.file_names();
        names
            .iter()
            .find(|f| !f.is_dos_only())
            .or_else(|| names.first())
            .map(|f| f.parent)
    }

    pub fn is_active(&self) -> bool {
        self.header.is_active()
    }

    pub fn is_directory(&self) -> bool {
        self.header.has_index()
    }

    /// Named $DATA attributes, resident or not.
    pub fn alternate_data_streams(&self) -> Vec<DataStream> {
        self.data
            .iter()
            .filter(|a| a.header.name_length > 0)
            .map(|a| DataStream {
                name: a.header.name.clone().unwrap_or_default(),
                size: a.header.value_size(),
                resident: a.header.is_resident(),
            })
            .collect()
    }

    /// Errors only; skipped unknown attribute types are left out.
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }

    /// Cluster runs of a non-resident stream are not decoded by this crate.
    pub fn data_runs(&self, attribute: &Attribute<Data>) -> Result<Vec<(i64, u64)>> {
        Err(DecodeError::Unsupported(format!(
            "data runs of {} attribute #{}",
            attribute.header.type_code.name(),
            attribute.header.instance
        )))
    }

    /// Merging attributes held by extension records needs the whole table.
    pub fn resolve_attribute_list(&self) -> Result<MftEntry> {
        Err(DecodeError::Unsupported(format!(
            "resolving {} attribute list(s)",
            self.attribute_list.len()
        )))
    }

    pub fn to_json(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or_else(|_| json!({}));
        if let Value::Object(map) = &mut value {
            map.insert("primary_name".into(), json!(self.primary_name()));
            map.insert("ads".into(), json!(self.alternate_data_streams()));
        }
        value
    }

    /// Convert the entry to a human-readable table string.
    pub fn to_table_string(&self) -> String {
        let mut out = String::new();

        //  Header
        let mut hdr = Table::new();
        hdr.add_row(row!["MFT Entry Header Values"]);
        hdr.add_row(row![b -> "Signature", self.header.signature.as_str()]);
        hdr.add_row(row![b -> "Record Number", opt(self.header.mft_record_number)]);
        hdr.add_row(row![b -> "Sequence", self.header.sequence_number]);
        hdr.add_row(row![b -> "$LogFile Sequence Number", self.header.log_file_sequence_number]);
        hdr.add_row(row![b -> "Flags", flag_names(&self.header.flags)]);
        hdr.add_row(row![b -> "Links", self.header.reference_count]);
        let sizes = format!("{} / {}", self.header.used_size, self.header.total_size);
        hdr.add_row(row![b -> "Used / Allocated", sizes]);
        if !self.header.is_base_record() {
            hdr.add_row(row![b -> "Base Record", self.header.base_file_record_segment]);
        }
        out.push_str(&hdr.to_string());

        //  Attributes overview
        let mut attrs = Table::new();
        attrs.add_row(row!["Attributes", "Name", "Status", "Size"]);
        for h in self.attribute_headers() {
            attrs.add_row(row![
                format!("{}-#{}", h.type_code, h.instance),
                h.name.clone().unwrap_or_else(|| "N/A".to_string()),
                if h.is_resident() { "Resident" } else { "Non-resident" },
                h.value_size()
            ]);
        }
        out.push('\n');
        out.push_str(&attrs.to_string());

        for si in self.standard_information.iter().filter_map(|a| a.body.as_ref()) {
            let mut t = Table::new();
            t.add_row(row!["$STANDARD_INFORMATION"]);
            t.add_row(row![b -> "Created", time(&si.created)]);
            t.add_row(row![b -> "File Modified", time(&si.modified)]);
            t.add_row(row![b -> "MFT Modified", time(&si.mft_modified)]);
            t.add_row(row![b -> "Accessed", time(&si.accessed)]);
            t.add_row(row![b -> "Flags", flag_names(&si.file_attributes)]);
            t.add_row(row![b -> "Owner ID", opt(si.owner_id)]);
            t.add_row(row![b -> "Security ID", opt(si.security_id)]);
            if let Some(q) = si.quota_charged {
                t.add_row(row![b -> "Quota Charged", q]);
            }
            if let Some(u) = si.usn {
                t.add_row(row![b -> "Last USN", u]);
            }
            out.push('\n');
            out.push_str(&t.to_string());
        }

        let names = self.file_names();
        if !names.is_empty() {
            let mut t = Table::new();
            t.add_row(row!["$FILE_NAME Attributes"]);
            for fname in names {
                t.add_row(row![b -> "Name", fname.name]);
                t.add_row(row![b -> "Namespace", format!("{:?}", fname.namespace)]);
                t.add_row(row![b -> "Parent MFT", fname.parent]);
                t.add_row(row![b -> "Allocated", fname.allocated_size]);
                t.add_row(row![b -> "Actual", fname.real_size]);
                t.add_row(row!["Flags", flag_names(&fname.flags)]);
                t.add_row(row![b -> "Timestamps", ""]);
                t.add_row(row!["- Created", time(&fname.created)]);
                t.add_row(row!["- Modified", time(&fname.modified)]);
                t.add_row(row!["- MFT Mod", time(&fname.mft_modified)]);
                t.add_row(row!["- Accessed", time(&fname.accessed)]);
                t.add_row(row!["", ""]);
            }
            out.push('\n');
            out.push_str(&t.to_string());
        }

        for sd in self.security_descriptor.iter().filter_map(|a| a.body.as_ref()) {
            let mut t = Table::new();
            t.add_row(row!["$SECURITY_DESCRIPTOR"]);
            t.add_row(row![b -> "Control", flag_names(&sd.control)]);
            t.add_row(row![b -> "Owner", opt(sd.owner.as_ref())]);
            t.add_row(row![b -> "Group", opt(sd.group.as_ref())]);
            for (label, acl) in [("DACL", &sd.dacl), ("SACL", &sd.sacl)] {
                if let Some(acl) = acl {
                    for ace in &acl.entries {
                        t.add_row(row![
                            b -> label,
                            format!("{:?} {} {}", ace.ace_type, ace.sid, flag_names(&ace.mask))
                        ]);
                    }
                }
            }
            out.push('\n');
            out.push_str(&t.to_string());
        }

        let ads = self.alternate_data_streams();
        if !ads.is_empty() {
            let mut t = Table::new();
            t.add_row(row!["Alternate Data Streams"]);
            t.add_row(row![b -> "Name", "Size", "Resident"]);
            for s in ads {
                t.add_row(row![s.name, s.size, if s.resident { "Yes" } else { "No" }]);
            }
            out.push('\n');
            out.push_str(&t.to_string());
        }

        if !self.diagnostics.is_empty() {
            let mut t = Table::new();
            t.add_row(row!["Diagnostics", "Offset", "Attribute"]);
            for d in &self.diagnostics {
                t.add_row(row![
                    d.error,
                    d.offset,
                    d.attribute_type.map_or("-".to_string(), |a| a.to_string())
                ]);
            }
            out.push('\n');
            out.push_str(&t.to_string());
        }

        out
    }

    /// Every attribute header in on-disk order.
    pub fn attribute_headers(&self) -> Vec<&AttributeHeader> {
        let mut headers: Vec<&AttributeHeader> = Vec::new();
        headers.extend(self.standard_information.iter().map(|a| &a.header));
        headers.extend(self.attribute_list.iter().map(|a| &a.header));
        headers.extend(self.file_name.iter().map(|a| &a.header));
        headers.extend(self.object_id.iter().map(|a| &a.header));
        headers.extend(self.security_descriptor.iter().map(|a| &a.header));
        headers.extend(self.volume_name.iter().map(|a| &a.header));
        headers.extend(self.volume_information.iter().map(|a| &a.header));
        headers.extend(self.data.iter().map(|a| &a.header));
        headers.extend(self.index_root.iter().map(|a| &a.header));
        headers.extend(self.index_allocation.iter());
        headers.extend(self.bitmap.iter());
        headers.extend(self.reparse_point.iter());
        headers.extend(self.ea_information.iter());
        headers.extend(self.ea.iter());
        headers.extend(self.logged_utility_stream.iter());
        headers.extend(self.unknown.iter());
        headers.sort_by_key(|h| h.offset);
        headers
    }
}

/// Decode the resident body of one attribute, containing any failure.
fn decode_body<T: ResidentBody>(
    header: AttributeHeader,
    record: &ByteCursor<'_>,
    sink: &mut DiagnosticSink,
) -> Attribute<T> {
    if !header.is_resident() {
        debug!(
            "{} at {} is non-resident, body not decoded",
            header.type_code, header.offset
        );
        return Attribute { header, body: None };
    }
    let body = header
        .value_cursor(record)
        .and_then(|mut value| T::from_cursor(&mut value));
    match body {
        Ok(body) => Attribute {
            header,
            body: Some(body),
        },
        Err(e) => {
            sink.report(Some(T::TYPE), header.offset, e);
            Attribute { header, body: None }
        }
    }
}

fn time(t: &Option<DateTime<Utc>>) -> String {
    t.map_or("-".to_string(), |t| t.to_rfc3339())
}

fn opt<T: ToString>(v: Option<T>) -> String {
    v.map_or("-".to_string(), |v| v.to_string())
}
