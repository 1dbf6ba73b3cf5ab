//! Builders for synthetic MFT records used by the unit tests.

use crate::cursor::FILETIME_UNIX_EPOCH_DELTA;

pub fn utf16(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
}

/// FILETIME ticks for a Unix timestamp in seconds.
pub fn filetime(unix_secs: i64) -> u64 {
    (unix_secs * 10_000_000 + FILETIME_UNIX_EPOCH_DELTA) as u64
}

fn align8(n: usize) -> usize {
    (n + 7) & !7
}

pub struct AttrBuilder {
    type_code: u32,
    resident: bool,
    name: Option<String>,
    flags: u16,
    instance: u16,
    value: Vec<u8>,
    file_size: u64,
}

impl AttrBuilder {
    pub fn resident(type_code: u32, value: Vec<u8>) -> Self {
        Self {
            type_code,
            resident: true,
            name: None,
            flags: 0,
            instance: 0,
            value,
            file_size: 0,
        }
    }

    pub fn non_resident(type_code: u32, file_size: u64) -> Self {
        Self {
            type_code,
            resident: false,
            name: None,
            flags: 0,
            instance: 0,
            value: Vec::new(),
            file_size,
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn instance(mut self, instance: u16) -> Self {
        self.instance = instance;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let header_len = if self.resident { 0x18 } else { 0x40 };
        let name = self.name.as_deref().map(utf16).unwrap_or_default();
        let payload_offset = align8(header_len + name.len());
        let payload: Vec<u8> = if self.resident {
            self.value.clone()
        } else {
            vec![0x11, 0x01, 0x2C, 0x00]
        };
        let length = align8(payload_offset + payload.len());

        let mut out = vec![0u8; length];
        out[0..4].copy_from_slice(&self.type_code.to_le_bytes());
        out[4..8].copy_from_slice(&(length as u32).to_le_bytes());
        out[8] = u8::from(!self.resident);
        out[9] = (name.len() / 2) as u8;
        let name_offset: u16 = if name.is_empty() { 0 } else { header_len as u16 };
        out[0x0A..0x0C].copy_from_slice(&name_offset.to_le_bytes());
        out[0x0C..0x0E].copy_from_slice(&self.flags.to_le_bytes());
        out[0x0E..0x10].copy_from_slice(&self.instance.to_le_bytes());
        if self.resident {
            out[0x10..0x14].copy_from_slice(&(payload.len() as u32).to_le_bytes());
            out[0x14..0x16].copy_from_slice(&(payload_offset as u16).to_le_bytes());
        } else {
            let clusters = self.file_size.div_ceil(4096);
            out[0x18..0x20].copy_from_slice(&clusters.saturating_sub(1).to_le_bytes());
            out[0x20..0x22].copy_from_slice(&(payload_offset as u16).to_le_bytes());
            out[0x28..0x30].copy_from_slice(&(clusters * 4096).to_le_bytes());
            out[0x30..0x38].copy_from_slice(&self.file_size.to_le_bytes());
            out[0x38..0x40].copy_from_slice(&self.file_size.to_le_bytes());
        }
        out[header_len..header_len + name.len()].copy_from_slice(&name);
        out[payload_offset..payload_offset + payload.len()].copy_from_slice(&payload);
        out
    }
}

pub struct RecordBuilder {
    sequence: u16,
    flags: u16,
    used_size: Option<u32>,
    attributes: Vec<Vec<u8>>,
}

impl RecordBuilder {
    pub const DEFAULT_RECORD_NUMBER: u32 = 42;
    pub const FIRST_ATTRIBUTE: usize = 0x38;
    const USA_OFFSET: usize = 0x30;
    const USN: u16 = 0x0001;

    pub fn new() -> Self {
        Self {
            sequence: 1,
            flags: 0x0001,
            used_size: None,
            attributes: Vec::new(),
        }
    }

    pub fn sequence(mut self, sequence: u16) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn flags(mut self, flags: u16) -> Self {
        self.flags = flags;
        self
    }

    pub fn used_size(mut self, used_size: u32) -> Self {
        self.used_size = Some(used_size);
        self
    }

    pub fn attribute(mut self, attribute: Vec<u8>) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// A fixup-protected 1024-byte record.
    pub fn build(&self) -> Vec<u8> {
        let mut buf = vec![0u8; 1024];
        buf[0..4].copy_from_slice(b"FILE");
        buf[4..6].copy_from_slice(&(Self::USA_OFFSET as u16).to_le_bytes());
        buf[6..8].copy_from_slice(&3u16.to_le_bytes());
        buf[8..16].copy_from_slice(&0x1000u64.to_le_bytes());
        buf[0x10..0x12].copy_from_slice(&self.sequence.to_le_bytes());
        buf[0x12..0x14].copy_from_slice(&1u16.to_le_bytes());
        buf[0x14..0x16].copy_from_slice(&(Self::FIRST_ATTRIBUTE as u16).to_le_bytes());
        buf[0x16..0x18].copy_from_slice(&self.flags.to_le_bytes());
        buf[0x1C..0x20].copy_from_slice(&1024u32.to_le_bytes());
        buf[0x28..0x2A].copy_from_slice(&(self.attributes.len() as u16).to_le_bytes());
        buf[0x2C..0x30].copy_from_slice(&Self::DEFAULT_RECORD_NUMBER.to_le_bytes());

        let mut at = Self::FIRST_ATTRIBUTE;
        for attribute in &self.attributes {
            buf[at..at + attribute.len()].copy_from_slice(attribute);
            at += attribute.len();
        }
        buf[at..at + 4].copy_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
        let used = self.used_size.unwrap_or((at + 8) as u32);
        buf[0x18..0x1C].copy_from_slice(&used.to_le_bytes());

        protect(&mut buf, Self::USA_OFFSET, Self::USN);
        buf
    }
}

/// Move each sector's last two bytes into the update sequence array and stamp the USN.
pub fn protect(buf: &mut [u8], usa_offset: usize, usn: u16) {
    buf[usa_offset..usa_offset + 2].copy_from_slice(&usn.to_le_bytes());
    for i in 1..=buf.len() / 512 {
        let tail = i * 512 - 2;
        let slot = usa_offset + 2 * i;
        buf[slot] = buf[tail];
        buf[slot + 1] = buf[tail + 1];
        buf[tail..tail + 2].copy_from_slice(&usn.to_le_bytes());
    }
}

pub fn standard_information_value(ticks: u64, attributes: u32, full: bool) -> Vec<u8> {
    let mut v = Vec::new();
    for _ in 0..4 {
        v.extend(ticks.to_le_bytes());
    }
    v.extend(attributes.to_le_bytes());
    v.extend([0u8; 12]);
    if full {
        v.extend(0u32.to_le_bytes());
        v.extend(0x100u32.to_le_bytes());
        v.extend(0u64.to_le_bytes());
        v.extend(0x1122u64.to_le_bytes());
    }
    v
}

pub fn file_name_value(
    parent_segment: u64,
    parent_sequence: u16,
    name: &str,
    namespace: u8,
    ticks: u64,
) -> Vec<u8> {
    let mut v = Vec::new();
    v.extend((parent_segment | (u64::from(parent_sequence) << 48)).to_le_bytes());
    for _ in 0..4 {
        v.extend(ticks.to_le_bytes());
    }
    v.extend(4096u64.to_le_bytes());
    v.extend(1234u64.to_le_bytes());
    v.extend(0x20u32.to_le_bytes());
    v.extend(0u32.to_le_bytes());
    v.push(name.encode_utf16().count() as u8);
    v.push(namespace);
    v.extend(utf16(name));
    v
}

pub fn attribute_list_entry(
    type_code: u32,
    lowest_vcn: u64,
    segment: u64,
    attribute_id: u16,
    name: Option<&str>,
) -> Vec<u8> {
    let name = name.map(utf16).unwrap_or_default();
    let length = align8(0x1A + name.len());
    let mut v = vec![0u8; length];
    v[0..4].copy_from_slice(&type_code.to_le_bytes());
    v[4..6].copy_from_slice(&(length as u16).to_le_bytes());
    v[6] = (name.len() / 2) as u8;
    v[7] = 0x1A;
    v[8..16].copy_from_slice(&lowest_vcn.to_le_bytes());
    v[16..24].copy_from_slice(&(segment | (1u64 << 48)).to_le_bytes());
    v[24..26].copy_from_slice(&attribute_id.to_le_bytes());
    v[0x1A..0x1A + name.len()].copy_from_slice(&name);
    v
}

pub fn sid_bytes(revision: u8, authority: u64, sub_authorities: &[u32]) -> Vec<u8> {
    let mut v = vec![revision, sub_authorities.len() as u8];
    v.extend(&authority.to_be_bytes()[2..]);
    for sub in sub_authorities {
        v.extend(sub.to_le_bytes());
    }
    v
}

pub fn ace_bytes(ace_type: u8, flags: u8, mask: u32, sid: &[u8]) -> Vec<u8> {
    let size = (8 + sid.len()) as u16;
    let mut v = vec![ace_type, flags];
    v.extend(size.to_le_bytes());
    v.extend(mask.to_le_bytes());
    v.extend(sid);
    v
}

pub fn acl_bytes(aces: &[Vec<u8>]) -> Vec<u8> {
    let size: usize = 8 + aces.iter().map(Vec::len).sum::<usize>();
    let mut v = vec![2u8, 0];
    v.extend((size as u16).to_le_bytes());
    v.extend((aces.len() as u16).to_le_bytes());
    v.extend([0u8; 2]);
    for ace in aces {
        v.extend(ace);
    }
    v
}

/// Owner S-1-5-32-544, group S-1-5-18 and a one-entry DACL granting S-1-5-18.
pub fn security_descriptor_value(control: u16) -> Vec<u8> {
    let owner = sid_bytes(1, 5, &[32, 544]);
    let group = sid_bytes(1, 5, &[18]);
    let dacl = acl_bytes(&[ace_bytes(0x00, 0x00, 0x001F_01FF, &group)]);

    let owner_offset = 20u32;
    let group_offset = owner_offset + owner.len() as u32;
    let dacl_offset = group_offset + group.len() as u32;

    let mut v = vec![1u8, 0];
    v.extend(control.to_le_bytes());
    v.extend(owner_offset.to_le_bytes());
    v.extend(group_offset.to_le_bytes());
    v.extend(0u32.to_le_bytes());
    v.extend(dacl_offset.to_le_bytes());
    v.extend(owner);
    v.extend(group);
    v.extend(dacl);
    v
}

pub fn index_entry(
    segment: u64,
    sequence: u16,
    key: &[u8],
    flags: u32,
    vcn: Option<u64>,
) -> Vec<u8> {
    let mut length = align8(16 + key.len());
    if vcn.is_some() {
        length += 8;
    }
    let mut v = vec![0u8; length];
    v[0..8].copy_from_slice(&(segment | (u64::from(sequence) << 48)).to_le_bytes());
    v[8..10].copy_from_slice(&(length as u16).to_le_bytes());
    v[10..12].copy_from_slice(&(key.len() as u16).to_le_bytes());
    v[12..16].copy_from_slice(&flags.to_le_bytes());
    v[16..16 + key.len()].copy_from_slice(key);
    if let Some(vcn) = vcn {
        v[length - 8..].copy_from_slice(&vcn.to_le_bytes());
    }
    v
}

pub fn index_root_value(indexed_type: u32, node_flags: u8, entries: &[Vec<u8>]) -> Vec<u8> {
    let entries_len: usize = entries.iter().map(Vec::len).sum();
    let mut v = Vec::new();
    v.extend(indexed_type.to_le_bytes());
    v.extend(u32::from(indexed_type == 0x30).to_le_bytes());
    v.extend(4096u32.to_le_bytes());
    v.extend([1u8, 0, 0, 0]);
    v.extend(0x10u32.to_le_bytes());
    v.extend(((0x10 + entries_len) as u32).to_le_bytes());
    v.extend(((0x10 + entries_len) as u32).to_le_bytes());
    v.extend([node_flags, 0, 0, 0]);
    for entry in entries {
        v.extend(entry);
    }
    v
}
