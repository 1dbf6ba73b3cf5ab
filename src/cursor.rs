// Sources:
// - https://learn.microsoft.com/windows/win32/api/minwinbase/ns-minwinbase-filetime
// - https://dubeyko.com/development/FileSystems/NTFS/ntfsdoc.pdf

//! Positionable little-endian reader over a borrowed record buffer.

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use chrono::{DateTime, TimeZone, Utc};
use log::trace;
use std::io::{self, Cursor, Read};

use crate::error::{DecodeError, Result};

/// 100ns ticks between 1601-01-01 and 1970-01-01.
pub const FILETIME_UNIX_EPOCH_DELTA: i64 = 116_444_736_000_000_000;
const TICKS_PER_SECOND: i64 = 10_000_000;

/// Convert a raw FILETIME into a UTC instant.
pub fn filetime_to_datetime(ticks: u64) -> Result<DateTime<Utc>> {
    // FILETIME is a signed quantity on Windows, values past i64::MAX are invalid.
    let signed = i64::try_from(ticks).map_err(|_| DecodeError::TimestampOutOfRange(ticks))?;
    let unix_ticks = signed - FILETIME_UNIX_EPOCH_DELTA;
    let secs = unix_ticks.div_euclid(TICKS_PER_SECOND);
    let nanos = (unix_ticks.rem_euclid(TICKS_PER_SECOND) * 100) as u32;
    Utc.timestamp_opt(secs, nanos)
        .single()
        .ok_or(DecodeError::TimestampOutOfRange(ticks))
}

/// Inverse of [`filetime_to_datetime`], truncated to 100ns.
pub fn datetime_to_filetime(dt: &DateTime<Utc>) -> Option<u64> {
    let ticks = dt
        .timestamp()
        .checked_mul(TICKS_PER_SECOND)?
        .checked_add(i64::from(dt.timestamp_subsec_nanos() / 100))?
        .checked_add(FILETIME_UNIX_EPOCH_DELTA)?;
    u64::try_from(ticks).ok()
}

/// Reader over a fixed byte buffer. All decoding goes through `seek`/`read`/`tell`.
///
/// Reads never run past the end of the buffer: a short read is a
/// [`DecodeError::Truncated`], a seek past the end an [`DecodeError::OutOfBounds`].
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    inner: Cursor<&'a [u8]>,
}

impl<'a> ByteCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            inner: Cursor::new(buf),
        }
    }

    fn buffer(&self) -> &'a [u8] {
        *self.inner.get_ref()
    }

    pub fn len(&self) -> usize {
        self.buffer().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer().is_empty()
    }

    pub fn tell(&self) -> u64 {
        self.inner.position()
    }

    pub fn remaining(&self) -> usize {
        self.len().saturating_sub(self.tell() as usize)
    }

    pub fn seek(&mut self, offset: u64) -> Result<()> {
        if offset > self.len() as u64 {
            return Err(DecodeError::OutOfBounds {
                offset,
                len: self.len(),
            });
        }
        self.inner.set_position(offset);
        Ok(())
    }

    pub fn skip(&mut self, n: u64) -> Result<()> {
        let target = self.tell().saturating_add(n);
        self.seek(target)
    }

    fn ensure(&self, needed: usize) -> Result<()> {
        let available = self.remaining();
        if available < needed {
            trace!(
                "short read at {}: wanted {} bytes, have {}",
                self.tell(),
                needed,
                available
            );
            return Err(DecodeError::Truncated {
                offset: self.tell(),
                needed,
                available,
            });
        }
        Ok(())
    }

    /// Check bounds up front so the byteorder call can only fail on a real I/O error,
    /// which a slice cursor never produces.
    fn read_with<T>(
        &mut self,
        needed: usize,
        f: impl FnOnce(&mut Cursor<&'a [u8]>) -> io::Result<T>,
    ) -> Result<T> {
        let offset = self.tell();
        self.ensure(needed)?;
        let available = self.remaining();
        f(&mut self.inner).map_err(|_| DecodeError::Truncated {
            offset,
            needed,
            available,
        })
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        self.read_with(n, |c| {
            let mut out = vec![0u8; n];
            c.read_exact(&mut out)?;
            Ok(out)
        })
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.read_with(1, |c| c.read_u8())
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.read_with(2, |c| c.read_u16::<LittleEndian>())
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.read_with(4, |c| c.read_u32::<LittleEndian>())
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        self.read_with(8, |c| c.read_u64::<LittleEndian>())
    }

    /// 48-bit big-endian integer (SID identifier authority).
    pub fn read_u48_be(&mut self) -> Result<u64> {
        self.read_with(6, |c| c.read_u48::<BigEndian>())
    }

    fn read_utf16_units(&mut self, chars: usize) -> Result<Vec<u16>> {
        self.read_with(chars * 2, |c| {
            let mut units = vec![0u16; chars];
            c.read_u16_into::<LittleEndian>(&mut units)?;
            Ok(units)
        })
    }

    /// Strict UTF-16LE: unpaired surrogates are an `InvalidEncoding`.
    pub fn read_utf16(&mut self, chars: usize) -> Result<String> {
        let offset = self.tell();
        let units = self.read_utf16_units(chars)?;
        String::from_utf16(&units).map_err(|_| DecodeError::InvalidEncoding { offset })
    }

    /// Forensic UTF-16LE: malformed sequences become U+FFFD instead of failing.
    pub fn read_utf16_lossy(&mut self, chars: usize) -> Result<String> {
        let units = self.read_utf16_units(chars)?;
        Ok(String::from_utf16_lossy(&units))
    }

    /// A FILETIME field; an unrepresentable value reads as `None`.
    pub fn read_filetime(&mut self) -> Result<Option<DateTime<Utc>>> {
        let ticks = self.read_u64()?;
        match filetime_to_datetime(ticks) {
            Ok(dt) => Ok(Some(dt)),
            Err(e) => {
                trace!("{} at offset {}", e, self.tell() - 8);
                Ok(None)
            }
        }
    }

    /// A new cursor over `len` bytes starting at `offset` of the same buffer.
    pub fn sub_cursor(&self, offset: u64, len: usize) -> Result<ByteCursor<'a>> {
        let buf = self.buffer();
        if offset > buf.len() as u64 {
            return Err(DecodeError::OutOfBounds {
                offset,
                len: buf.len(),
            });
        }
        let start = offset as usize;
        let available = buf.len() - start;
        if len > available {
            return Err(DecodeError::Truncated {
                offset,
                needed: len,
                available,
            });
        }
        Ok(ByteCursor::new(&buf[start..start + len]))
    }
}
