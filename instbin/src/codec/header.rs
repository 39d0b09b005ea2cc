//! Stream header and end marker.
//!
//! ```text
//! "INSTBIN" | version: i32 len + utf-8 | totalTypes: i32 | totalObjects: i32 | [0u8; 8]
//! ```

use std::io::{Read, Write};

use super::record::{read_exact_or_truncated, read_i32, read_up_to};
use crate::error::{FormatError, Result};

pub const MAGIC: &[u8; 7] = b"INSTBIN";
pub const END_MARKER: &[u8; 3] = b"END";
pub const FORMAT_VERSION: &str = "1.0";

const RESERVED_LEN: usize = 8;
const MAX_VERSION_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Header {
    pub total_types: usize,
    pub total_objects: usize,
}

pub(crate) fn write_header<W: Write>(
    writer: &mut W,
    total_types: usize,
    total_objects: usize,
) -> Result<usize> {
    let count = |n: usize| {
        i32::try_from(n).map_err(|_| FormatError::RecordTooLarge {
            size: n as i64,
            limit: i32::MAX as usize,
        })
    };
    writer.write_all(MAGIC)?;
    writer.write_all(&(FORMAT_VERSION.len() as i32).to_le_bytes())?;
    writer.write_all(FORMAT_VERSION.as_bytes())?;
    writer.write_all(&count(total_types)?.to_le_bytes())?;
    writer.write_all(&count(total_objects)?.to_le_bytes())?;
    writer.write_all(&[0u8; RESERVED_LEN])?;
    Ok(MAGIC.len() + 4 + FORMAT_VERSION.len() + 8 + RESERVED_LEN)
}

pub(crate) fn read_magic<R: Read>(reader: &mut R) -> Result<()> {
    let mut found = [0u8; 7];
    let n = read_up_to(reader, &mut found)?;
    if n < found.len() || &found != MAGIC {
        return Err(FormatError::BadMagic {
            found: found[..n].to_vec(),
        }
        .into());
    }
    Ok(())
}

/// Reads the length-prefixed version string.
pub(crate) fn read_version<R: Read>(reader: &mut R) -> Result<String> {
    let len = read_i32(reader, "version")?;
    let len = usize::try_from(len).map_err(|_| FormatError::NegativeCount {
        what: "version length",
        count: len,
    })?;
    if len > MAX_VERSION_LEN {
        return Err(FormatError::UnsupportedVersion(format!("<{len} bytes>")).into());
    }
    let mut bytes = vec![0u8; len];
    read_exact_or_truncated(reader, &mut bytes, "version")?;
    String::from_utf8(bytes).map_err(|_| FormatError::InvalidUtf8("version").into())
}

/// Reads the header. The magic is skipped when the caller already consumed it.
pub(crate) fn read_header<R: Read>(reader: &mut R, skip_magic: bool) -> Result<Header> {
    if !skip_magic {
        read_magic(reader)?;
    }
    let version = read_version(reader)?;
    if version != FORMAT_VERSION {
        return Err(FormatError::UnsupportedVersion(version).into());
    }
    let total_types = read_i32(reader, "header")?;
    let total_objects = read_i32(reader, "header")?;
    let mut reserved = [0u8; RESERVED_LEN];
    read_exact_or_truncated(reader, &mut reserved, "header")?;

    let total_types = usize::try_from(total_types).map_err(|_| FormatError::NegativeCount {
        what: "type",
        count: total_types,
    })?;
    let total_objects =
        usize::try_from(total_objects).map_err(|_| FormatError::NegativeCount {
            what: "object",
            count: total_objects,
        })?;
    Ok(Header {
        total_types,
        total_objects,
    })
}

pub(crate) fn write_end<W: Write>(writer: &mut W) -> Result<usize> {
    writer.write_all(END_MARKER)?;
    Ok(END_MARKER.len())
}

pub(crate) fn read_end<R: Read>(reader: &mut R) -> Result<()> {
    let mut found = [0u8; 3];
    let n = read_up_to(reader, &mut found)?;
    if n < found.len() || &found != END_MARKER {
        return Err(FormatError::BadEndMarker {
            found: found[..n].to_vec(),
        }
        .into());
    }
    Ok(())
}
