//! On-disk framing shared by the WAL and the snapshot.
//!
//! A file starts with a header naming what it holds, followed by frames:
//!
//! ```text
//! header: [magic: 4 bytes][format version: 1 byte]
//! frame:  [format version: 1 byte][length: 4 bytes LE][JSON][crc32: 4 bytes LE]
//! ```
//!
//! A frame cut short reads as `UnexpectedEof` (a torn append); every other
//! defect reads as `InvalidData`.

use std::io::{Error as IoError, ErrorKind, Read, Result as IoResult, Write};

use crc32fast::Hasher;
use serde::{de::DeserializeOwned, Serialize};

const FORMAT_VERSION: u8 = 1;

/// Largest frame accepted on read.
const MAX_FRAME_LEN: usize = 100 * 1024 * 1024;

/// Bytes taken by a file header.
pub(crate) const HEADER_LEN: u64 = 5;

/// What a file holds. Each kind has its own magic so a snapshot can never be
/// replayed as a log or the other way round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FileKind {
    Wal,
    Snapshot,
}

impl FileKind {
    const fn magic(self) -> [u8; 4] {
        match self {
            Self::Wal => *b"CGWL",
            Self::Snapshot => *b"CGSN",
        }
    }
}

fn invalid(message: String) -> IoError {
    IoError::new(ErrorKind::InvalidData, message)
}

fn checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

pub(crate) fn write_header(writer: &mut impl Write, kind: FileKind) -> IoResult<()> {
    writer.write_all(&kind.magic())?;
    writer.write_all(&[FORMAT_VERSION])
}

/// Checks that the header names `kind` in a format this build reads.
pub(crate) fn read_header(reader: &mut impl Read, kind: FileKind) -> IoResult<()> {
    let mut header = [0u8; 5];
    reader.read_exact(&mut header)?;
    if header[..4] != kind.magic() {
        return Err(invalid(format!("not a {kind:?} file (magic {:?})", &header[..4])));
    }
    if header[4] != FORMAT_VERSION {
        return Err(invalid(format!("unsupported {kind:?} format version {}", header[4])));
    }
    Ok(())
}

/// Serializes `value` into one frame.
pub(crate) fn encode<T: Serialize>(value: &T) -> IoResult<Vec<u8>> {
    let data = serde_json::to_vec(value).map_err(|e| invalid(format!("serialization failed: {e}")))?;
    let len = u32::try_from(data.len()).map_err(|_| invalid("frame larger than 4 GiB".to_string()))?;

    let mut out = Vec::with_capacity(data.len() + 9);
    out.push(FORMAT_VERSION);
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&data);
    out.extend_from_slice(&checksum(&data).to_le_bytes());
    Ok(out)
}

/// Reads and verifies one frame.
pub(crate) fn decode<T: DeserializeOwned>(reader: &mut impl Read) -> IoResult<T> {
    let mut prefix = [0u8; 5];
    reader.read_exact(&mut prefix)?;
    if prefix[0] != FORMAT_VERSION {
        return Err(invalid(format!("unsupported frame version {}", prefix[0])));
    }
    let len = u32::from_le_bytes([prefix[1], prefix[2], prefix[3], prefix[4]]) as usize;
    if len > MAX_FRAME_LEN {
        return Err(invalid(format!("frame length {len} exceeds maximum {MAX_FRAME_LEN}")));
    }

    let mut data = vec![0u8; len + 4];
    reader.read_exact(&mut data)?;
    let stored = u32::from_le_bytes([data[len], data[len + 1], data[len + 2], data[len + 3]]);
    data.truncate(len);
    if stored != checksum(&data) {
        return Err(invalid(format!("checksum mismatch in {len}-byte frame")));
    }

    serde_json::from_slice(&data).map_err(|e| invalid(format!("deserialization failed: {e}")))
}
