use serde::{Serialize, Serializer};
use std::fmt::Write;
use xxhash_rust::xxh3::xxh3_64;

use crate::attribute::{AttributeType, ResidentBody};
use crate::cursor::ByteCursor;
use crate::error::Result;

/// Resident $DATA content with its xxh3-64 digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Data {
    #[serde(serialize_with = "as_hex")]
    pub content: Vec<u8>,
    #[serde(serialize_with = "as_hex_u64")]
    pub content_hash: u64,
}

impl Data {
    pub fn new(content: Vec<u8>) -> Self {
        let content_hash = xxh3_64(&content);
        Self {
            content,
            content_hash,
        }
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

impl ResidentBody for Data {
    const TYPE: AttributeType = AttributeType::Data;

    fn from_cursor(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        let content = cursor.read_bytes(cursor.remaining())?;
        Ok(Self::new(content))
    }
}

pub(crate) fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{:02x}", b);
    }
    out
}

fn as_hex<S: Serializer>(bytes: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&to_hex(bytes))
}

fn as_hex_u64<S: Serializer>(value: &u64, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("{:016x}", value))
}
