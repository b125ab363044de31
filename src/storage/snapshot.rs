//! Snapshot format
//!
//! Binary format (little-endian):
//!
//! ```text
//! [magic "MSNP"] [format(u8)] [count(u64)]
//! count x [key_len(u32)] [key] [value_len(u32)] [value] [expires_at_ms(u64)] [version(u64)]
//! [checksum(u64)]
//! ```
//!
//! `expires_at_ms` is wall-clock milliseconds since the Unix epoch, `0` for
//! entries that never expire. The checksum is xxhash64 of every preceding byte.

use crate::error::{Result, StorageError};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io::{Read, Write};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use xxhash_rust::xxh64::{xxh64, Xxh64};

const MAGIC: &[u8; 4] = b"MSNP";
const FORMAT_VERSION: u8 = 1;
const HEADER_LEN: usize = MAGIC.len() + 1 + 8;
const CHECKSUM_LEN: usize = 8;

/// Marker for entries without expiry.
pub const NEVER_EXPIRES: u64 = 0;

/// One decoded snapshot entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRecord {
    pub key: Bytes,
    pub value: Bytes,
    pub expires_at_ms: u64,
    pub version: u64,
}

/// Pairs a monotonic and a wall-clock reading taken at the same moment,
/// to translate expiry deadlines to and from the snapshot's epoch times.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Clock {
    pub(crate) instant: Instant,
    pub(crate) wall: SystemTime,
}

impl Clock {
    pub(crate) fn now() -> Self {
        Self {
            instant: Instant::now(),
            wall: SystemTime::now(),
        }
    }

    pub(crate) fn to_epoch_ms(&self, deadline: Option<Instant>) -> u64 {
        let Some(deadline) = deadline else {
            return NEVER_EXPIRES;
        };
        let Some(at) = self
            .wall
            .checked_add(deadline.saturating_duration_since(self.instant))
        else {
            return NEVER_EXPIRES;
        };
        let ms = at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        ms.max(1)
    }

    /// Returns `None` if the epoch time has already passed.
    pub(crate) fn to_deadline(&self, epoch_ms: u64) -> Option<Option<Instant>> {
        if epoch_ms == NEVER_EXPIRES {
            return Some(None);
        }
        let Some(at) = UNIX_EPOCH.checked_add(Duration::from_millis(epoch_ms)) else {
            return Some(None);
        };
        match at.duration_since(self.wall) {
            Ok(remaining) if !remaining.is_zero() => Some(self.instant.checked_add(remaining)),
            _ => None,
        }
    }
}

/// Streams a snapshot to a sink, hashing as it goes.
pub struct SnapshotWriter<'a, W: Write + ?Sized> {
    sink: &'a mut W,
    hasher: Xxh64,
    buf: BytesMut,
    written: u64,
}

impl<'a, W: Write + ?Sized> SnapshotWriter<'a, W> {
    /// Writes the header for a snapshot of `count` entries.
    pub fn begin(sink: &'a mut W, count: u64) -> Result<Self> {
        let mut writer = Self {
            sink,
            hasher: Xxh64::new(0),
            buf: BytesMut::with_capacity(HEADER_LEN),
            written: 0,
        };

        writer.buf.put_slice(MAGIC);
        writer.buf.put_u8(FORMAT_VERSION);
        writer.buf.put_u64_le(count);
        writer.flush_buf()?;

        Ok(writer)
    }

    /// Appends one entry.
    ///
    /// Fails with an `InvalidInput` I/O error, before anything is written, if
    /// the key or value does not fit a 32-bit length prefix.
    pub fn write_record(
        &mut self,
        key: &[u8],
        value: &[u8],
        expires_at_ms: u64,
        version: u64,
    ) -> Result<()> {
        let key_len = chunk_len(key.len(), "key")?;
        let value_len = chunk_len(value.len(), "value")?;

        self.buf.reserve(4 + key.len() + 4 + value.len() + 16);
        self.buf.put_u32_le(key_len);
        self.buf.put_slice(key);
        self.buf.put_u32_le(value_len);
        self.buf.put_slice(value);
        self.buf.put_u64_le(expires_at_ms);
        self.buf.put_u64_le(version);
        self.flush_buf()
    }

    /// Writes the checksum and returns the total number of bytes written.
    pub fn finish(mut self) -> Result<u64> {
        let checksum = self.hasher.digest();
        self.sink.write_all(&checksum.to_le_bytes())?;
        self.sink.flush()?;
        Ok(self.written + CHECKSUM_LEN as u64)
    }

    fn flush_buf(&mut self) -> Result<()> {
        self.hasher.update(&self.buf);
        self.sink.write_all(&self.buf)?;
        self.written += self.buf.len() as u64;
        self.buf.clear();
        Ok(())
    }
}

fn chunk_len(len: usize, what: &str) -> Result<u32> {
    u32::try_from(len).map_err(|_| {
        StorageError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{} of {} bytes exceeds the snapshot limit of {}", what, len, u32::MAX),
        ))
    })
}

/// Reads a whole snapshot from `source` and decodes it.
pub fn read_snapshot<R: Read + ?Sized>(source: &mut R) -> Result<Vec<SnapshotRecord>> {
    let mut data = Vec::new();
    source.read_to_end(&mut data)?;
    decode(Bytes::from(data))
}

/// Decodes and verifies a complete snapshot.
pub fn decode(data: Bytes) -> Result<Vec<SnapshotRecord>> {
    if data.len() < HEADER_LEN + CHECKSUM_LEN {
        return Err(StorageError::decode("snapshot too short"));
    }

    let body_len = data.len() - CHECKSUM_LEN;
    let stored_checksum = u64::from_le_bytes(
        data[body_len..]
            .try_into()
            .map_err(|_| StorageError::decode("invalid checksum"))?,
    );
    let calculated_checksum = xxh64(&data[..body_len], 0);
    if stored_checksum != calculated_checksum {
        return Err(StorageError::Decode(format!(
            "checksum mismatch: expected {:#018x}, got {:#018x}",
            stored_checksum, calculated_checksum
        )));
    }

    let mut body = data.slice(..body_len);

    if &body[..MAGIC.len()] != MAGIC {
        return Err(StorageError::decode("bad magic"));
    }
    body.advance(MAGIC.len());

    let format = body.get_u8();
    if format != FORMAT_VERSION {
        return Err(StorageError::Decode(format!(
            "unsupported snapshot format {}",
            format
        )));
    }

    let count = body.get_u64_le();
    // Each record takes at least 24 bytes
    let mut records = Vec::with_capacity(count.min(body.remaining() as u64 / 24) as usize);

    for index in 0..count {
        let key = read_chunk(&mut body, index, "key")?;
        let value = read_chunk(&mut body, index, "value")?;
        if body.remaining() < 16 {
            return Err(StorageError::Decode(format!(
                "record {} truncated in metadata",
                index
            )));
        }
        let expires_at_ms = body.get_u64_le();
        let version = body.get_u64_le();

        records.push(SnapshotRecord {
            key,
            value,
            expires_at_ms,
            version,
        });
    }

    if body.has_remaining() {
        return Err(StorageError::Decode(format!(
            "{} trailing bytes after {} records",
            body.remaining(),
            count
        )));
    }

    Ok(records)
}

fn read_chunk(body: &mut Bytes, index: u64, what: &str) -> Result<Bytes> {
    if body.remaining() < 4 {
        return Err(StorageError::Decode(format!(
            "record {} truncated before {} length",
            index, what
        )));
    }
    let len = body.get_u32_le() as usize;
    if body.remaining() < len {
        return Err(StorageError::Decode(format!(
            "record {} {} length {} exceeds remaining {} bytes",
            index,
            what,
            len,
            body.remaining()
        )));
    }
    Ok(body.split_to(len))
}
