use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::attribute::AttributeType;
use crate::error::DecodeError;

/// One contained decoding failure, tagged with where it happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Caller supplied record index, or the on-disk record number when the caller had none.
    pub record: Option<u64>,
    pub attribute_type: Option<AttributeType>,
    /// Byte offset inside the record.
    pub offset: u64,
    pub error: DecodeError,
}

impl Diagnostic {
    pub fn is_error(&self) -> bool {
        self.error.is_error()
    }
}

/// Per-parse accumulator. Owned by one `MftEntry::from_bytes` call and moved
/// into the entry it produces, so decoding stays free of shared state.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    record: Option<u64>,
    items: Vec<Diagnostic>,
}

impl DiagnosticSink {
    pub fn new(record: Option<u64>) -> Self {
        Self {
            record,
            items: Vec::new(),
        }
    }

    pub fn report(
        &mut self,
        attribute_type: Option<AttributeType>,
        offset: u64,
        error: DecodeError,
    ) {
        match &error {
            DecodeError::UnknownAttributeType(_) => {
                debug!("record {:?}: skipping {} at offset {}", self.record, error, offset)
            }
            DecodeError::StructuralCorruption(_) => {
                warn!("record {:?}: {} at offset {}", self.record, error, offset)
            }
            _ => debug!(
                "record {:?}: {} while decoding {:?} at offset {}",
                self.record, error, attribute_type, offset
            ),
        }
        self.items.push(Diagnostic {
            record: self.record,
            attribute_type,
            offset,
            error,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_inner(self) -> Vec<Diagnostic> {
        self.items
    }
}
