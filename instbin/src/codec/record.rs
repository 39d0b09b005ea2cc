//! Framed, optionally compressed records.
//!
//! ```text
//! magic: [u8; 4] | compressedLength: i32 | decompressedLength: i32 | payload
//! ```
//!
//! `compressedLength == 0` means the payload is stored raw and is
//! `decompressedLength` bytes long.

use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};

use crate::config::Compression;
use crate::error::{FormatError, InstbinError, Result};

pub(crate) const TYPE_MAGIC: &[u8; 4] = b"TYPE";
pub(crate) const PROP_MAGIC: &[u8; 4] = b"PROP";

fn magic_name(magic: &[u8; 4]) -> &'static str {
    if magic == TYPE_MAGIC { "TYPE" } else { "PROP" }
}

fn length_i32(len: usize) -> Result<i32> {
    i32::try_from(len).map_err(|_| {
        FormatError::RecordTooLarge {
            size: len as i64,
            limit: i32::MAX as usize,
        }
        .into()
    })
}

/// Writes one record and returns the number of bytes written.
pub(crate) fn write_record<W: Write>(
    writer: &mut W,
    magic: &[u8; 4],
    payload: &[u8],
    compression: Compression,
) -> Result<usize> {
    let decompressed_len = length_i32(payload.len())?;
    writer.write_all(magic)?;
    let body_len = match compression {
        Compression::Lz4 => {
            let compressed = lz4_flex::block::compress(payload);
            writer.write_all(&length_i32(compressed.len())?.to_le_bytes())?;
            writer.write_all(&decompressed_len.to_le_bytes())?;
            writer.write_all(&compressed)?;
            compressed.len()
        }
        Compression::None => {
            writer.write_all(&0i32.to_le_bytes())?;
            writer.write_all(&decompressed_len.to_le_bytes())?;
            writer.write_all(payload)?;
            payload.len()
        }
    };
    log::trace!(
        "Wrote {} record: {} bytes ({} on the wire)",
        magic_name(magic),
        payload.len(),
        body_len
    );
    Ok(12 + body_len)
}

/// Reads exactly `buf.len()` bytes, mapping a short read to [`FormatError::Truncated`].
pub(crate) fn read_exact_or_truncated<R: Read>(
    reader: &mut R,
    buf: &mut [u8],
    what: &'static str,
) -> Result<()> {
    reader.read_exact(buf).map_err(|err| match err.kind() {
        ErrorKind::UnexpectedEof => InstbinError::Format(FormatError::Truncated(what)),
        _ => InstbinError::Io(err),
    })
}

pub(crate) fn read_i32<R: Read>(reader: &mut R, what: &'static str) -> Result<i32> {
    let mut buf = [0u8; 4];
    read_exact_or_truncated(reader, &mut buf, what)?;
    Ok(i32::from_le_bytes(buf))
}

/// Reads up to `buf.len()` bytes, stopping early only at end of stream.
pub(crate) fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => {}
            Err(err) => return Err(err.into()),
        }
    }
    Ok(filled)
}

/// Reads a record that must be present.
pub(crate) fn read_record<R: Read>(
    reader: &mut R,
    magic: &'static [u8; 4],
    max_size: usize,
) -> Result<Vec<u8>> {
    let mut found = [0u8; 4];
    read_exact_or_truncated(reader, &mut found, magic_name(magic))?;
    if &found != magic {
        return Err(FormatError::BadRecordMagic {
            expected: magic_name(magic),
            found: found.to_vec(),
        }
        .into());
    }
    read_body(reader, magic_name(magic), max_size)
}

/// Reads a record if the next bytes carry `magic`.
///
/// On a mismatch (or fewer than four bytes left) the stream is rewound to
/// where it was and `None` is returned.
pub(crate) fn try_read_record<R: Read + Seek>(
    reader: &mut R,
    magic: &'static [u8; 4],
    max_size: usize,
) -> Result<Option<Vec<u8>>> {
    let mut found = [0u8; 4];
    let n = read_up_to(reader, &mut found)?;
    if n < found.len() || &found != magic {
        reader.seek(SeekFrom::Current(-(n as i64)))?;
        return Ok(None);
    }
    read_body(reader, magic_name(magic), max_size).map(Some)
}

fn read_body<R: Read>(reader: &mut R, what: &'static str, max_size: usize) -> Result<Vec<u8>> {
    let compressed_len = read_i32(reader, what)?;
    let decompressed_len = read_i32(reader, what)?;
    let compressed_len = checked_len(compressed_len, "compressed length", max_size)?;
    let decompressed_len = checked_len(decompressed_len, "decompressed length", max_size)?;

    if compressed_len == 0 {
        let mut payload = vec![0u8; decompressed_len];
        read_exact_or_truncated(reader, &mut payload, what)?;
        return Ok(payload);
    }

    let mut compressed = vec![0u8; compressed_len];
    read_exact_or_truncated(reader, &mut compressed, what)?;
    let payload = lz4_flex::block::decompress(&compressed, decompressed_len)
        .map_err(|err| FormatError::Decompression(err.to_string()))?;
    if payload.len() != decompressed_len {
        return Err(FormatError::Decompression(format!(
            "expected {decompressed_len} bytes, got {}",
            payload.len()
        ))
        .into());
    }
    Ok(payload)
}

fn checked_len(len: i32, what: &'static str, max_size: usize) -> Result<usize> {
    let len = usize::try_from(len).map_err(|_| FormatError::NegativeCount { what, count: len })?;
    if len > max_size {
        return Err(FormatError::RecordTooLarge {
            size: len as i64,
            limit: max_size,
        }
        .into());
    }
    Ok(len)
}
