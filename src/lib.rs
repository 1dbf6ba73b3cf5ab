// Sources:
// - https://dubeyko.com/development/FileSystems/NTFS/ntfsdoc.pdf
// - https://en.wikipedia.org/wiki/NTFS

use log::{debug, warn};
use rayon::prelude::*;
use std::io::{Read, Seek, SeekFrom};

pub mod attribute;
pub mod attribute_list;
pub mod cursor;
pub mod data;
pub mod diagnostics;
pub mod entry;
pub mod error;
pub mod file_name;
pub mod header;
pub mod index_root;
pub mod object_id;
pub mod output;
pub mod security;
pub mod source;
pub mod standard_information;
pub mod types;
pub mod volume;

#[cfg(test)]
mod testutil;

pub use attribute::{Attribute, AttributeHeader, AttributeType, Form};
pub use diagnostics::Diagnostic;
pub use entry::MftEntry;
pub use error::{DecodeError, Result};
pub use header::{EntryHeader, MFT_ENTRY_SIZE, Signature};
pub use source::{LocatedEntry, SourceFile};
pub use types::FileReference;

/// A raw `$MFT` stream: consecutive 1 KiB entries.
#[derive(Debug)]
pub struct MftFile<T: Read + Seek> {
    pub body: T,
    len: u64,
}

impl<T: Read + Seek> MftFile<T> {
    pub fn new(mut body: T) -> Result<Self> {
        let len = body.seek(SeekFrom::End(0))?;
        let tail = len % MFT_ENTRY_SIZE as u64;
        if tail != 0 {
            warn!(
                "$MFT length {} is not a multiple of {}, the last {} bytes are ignored",
                len, MFT_ENTRY_SIZE, tail
            );
        }
        Ok(Self { body, len })
    }

    /// Number of complete entries in the stream.
    pub fn entry_count(&self) -> u64 {
        self.len / MFT_ENTRY_SIZE as u64
    }

    pub fn read_raw_entry(&mut self, index: u64) -> Result<Vec<u8>> {
        if index >= self.entry_count() {
            return Err(DecodeError::OutOfBounds {
                offset: index.saturating_mul(MFT_ENTRY_SIZE as u64),
                len: self.len as usize,
            });
        }
        self.body
            .seek(SeekFrom::Start(index * MFT_ENTRY_SIZE as u64))?;
        let mut buf = vec![0u8; MFT_ENTRY_SIZE];
        self.body.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub fn get_entry(&mut self, index: u64) -> Result<MftEntry> {
        let raw = self.read_raw_entry(index)?;
        debug!("MFT entry {} read from offset 0x{:X}", index, index * MFT_ENTRY_SIZE as u64);
        MftEntry::from_bytes(&raw, Some(index))
    }

    /// Raw entries in on-disk order, each paired with its index.
    pub fn raw_entries(&mut self) -> RawEntries<'_, T> {
        RawEntries {
            file: self,
            next: 0,
        }
    }

    /// Decode `count` entries starting at `first` on the rayon pool.
    ///
    /// The result keeps on-disk order; entries whose header is unreadable carry their error.
    pub fn decode_batch(&mut self, first: u64, count: u64) -> Result<Vec<(u64, Result<MftEntry>)>> {
        let count = count.min(self.entry_count().saturating_sub(first));
        if count == 0 {
            return Ok(Vec::new());
        }
        self.body
            .seek(SeekFrom::Start(first * MFT_ENTRY_SIZE as u64))?;
        let mut buf = vec![0u8; count as usize * MFT_ENTRY_SIZE];
        self.body.read_exact(&mut buf)?;
        Ok(decode_entries(&buf, first))
    }
}

/// Decode every complete entry of an in-memory `$MFT` image in parallel.
pub fn decode_entries(buf: &[u8], first_index: u64) -> Vec<(u64, Result<MftEntry>)> {
    buf.par_chunks_exact(MFT_ENTRY_SIZE)
        .enumerate()
        .map(|(i, raw)| {
            let index = first_index + i as u64;
            (index, MftEntry::from_bytes(raw, Some(index)))
        })
        .collect()
}

pub struct RawEntries<'a, T: Read + Seek> {
    file: &'a mut MftFile<T>,
    next: u64,
}

impl<T: Read + Seek> Iterator for RawEntries<'_, T> {
    type Item = Result<(u64, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.file.entry_count() {
            return None;
        }
        let index = self.next;
        self.next += 1;
        Some(self.file.read_raw_entry(index).map(|raw| (index, raw)))
    }
}
