#![allow(dead_code)]

pub const ENTRY_SIZE: usize = 1024;
pub const FIRST_ATTRIBUTE: usize = 0x38;

pub fn utf16(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
}

pub fn filetime(unix_secs: i64) -> u64 {
    (unix_secs * 10_000_000 + 116_444_736_000_000_000) as u64
}

fn align8(n: usize) -> usize {
    (n + 7) & !7
}

/// Resident attribute record with an optional name.
pub fn resident(type_code: u32, name: Option<&str>, value: &[u8]) -> Vec<u8> {
    let name = name.map(utf16).unwrap_or_default();
    let value_offset = align8(0x18 + name.len());
    let length = align8(value_offset + value.len());
    let mut out = vec![0u8; length];
    out[0..4].copy_from_slice(&type_code.to_le_bytes());
    out[4..8].copy_from_slice(&(length as u32).to_le_bytes());
    out[9] = (name.len() / 2) as u8;
    if !name.is_empty() {
        out[0x0A..0x0C].copy_from_slice(&0x18u16.to_le_bytes());
    }
    out[0x10..0x14].copy_from_slice(&(value.len() as u32).to_le_bytes());
    out[0x14..0x16].copy_from_slice(&(value_offset as u16).to_le_bytes());
    out[0x18..0x18 + name.len()].copy_from_slice(&name);
    out[value_offset..value_offset + value.len()].copy_from_slice(value);
    out
}

pub fn file_name(parent: u64, name: &str, namespace: u8, ticks: u64) -> Vec<u8> {
    let mut v = Vec::new();
    v.extend((parent | (1u64 << 48)).to_le_bytes());
    for _ in 0..4 {
        v.extend(ticks.to_le_bytes());
    }
    v.extend(0u64.to_le_bytes());
    v.extend(0u64.to_le_bytes());
    v.extend(0u32.to_le_bytes());
    v.extend(0u32.to_le_bytes());
    v.push(name.encode_utf16().count() as u8);
    v.push(namespace);
    v.extend(utf16(name));
    v
}

pub fn standard_information(ticks: u64) -> Vec<u8> {
    let mut v = Vec::new();
    for _ in 0..4 {
        v.extend(ticks.to_le_bytes());
    }
    v.extend([0u8; 16]);
    v
}

pub fn sid(revision: u8, authority: u64, subs: &[u32]) -> Vec<u8> {
    let mut v = vec![revision, subs.len() as u8];
    v.extend(&authority.to_be_bytes()[2..]);
    for s in subs {
        v.extend(s.to_le_bytes());
    }
    v
}

/// A 1024-byte record with a FILE signature, fixups applied on disk, and the
/// given attribute records followed by the end marker.
pub fn record(sequence: u16, flags: u16, attributes: &[Vec<u8>]) -> Vec<u8> {
    let mut buf = vec![0u8; ENTRY_SIZE];
    buf[0..4].copy_from_slice(b"FILE");
    buf[4..6].copy_from_slice(&0x30u16.to_le_bytes());
    buf[6..8].copy_from_slice(&3u16.to_le_bytes());
    buf[0x10..0x12].copy_from_slice(&sequence.to_le_bytes());
    buf[0x12..0x14].copy_from_slice(&1u16.to_le_bytes());
    buf[0x14..0x16].copy_from_slice(&(FIRST_ATTRIBUTE as u16).to_le_bytes());
    buf[0x16..0x18].copy_from_slice(&flags.to_le_bytes());
    buf[0x1C..0x20].copy_from_slice(&(ENTRY_SIZE as u32).to_le_bytes());

    let mut at = FIRST_ATTRIBUTE;
    for a in attributes {
        buf[at..at + a.len()].copy_from_slice(a);
        at += a.len();
    }
    buf[at..at + 4].copy_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
    buf[0x18..0x1C].copy_from_slice(&((at + 8) as u32).to_le_bytes());

    // move each sector tail into the update sequence array
    let usn = [0x07u8, 0x00];
    buf[0x30..0x32].copy_from_slice(&usn);
    for i in 1..=2 {
        let tail = i * 512 - 2;
        let slot = 0x30 + 2 * i;
        buf[slot] = buf[tail];
        buf[slot + 1] = buf[tail + 1];
        buf[tail..tail + 2].copy_from_slice(&usn);
    }
    buf
}

pub fn set_u32(buf: &mut [u8], at: usize, value: u32) {
    buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
}
