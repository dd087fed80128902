//! Loose object file reading.
//!
//! A loose object is a single zlib-compressed file whose inflated contents
//! begin with the ASCII header `"<type> <decimal length>\0"` followed by
//! the payload. The type names the object kind; the decimal length must
//! match the payload exactly.
//!
//! Size-only reads inflate just enough of the stream to parse the header,
//! never the payload.

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use memchr::memchr;

use crate::inflate::{inflate_limited, inflate_prefix, InflateError};
use crate::object::{ObjectKind, RawObject};
use crate::pack::DecodeLimits;

/// Safety allowance for headers (`"commit <digits>\0"` never comes close).
const HEADER_MAX_BYTES: usize = 64;

/// Errors from loose object reading.
#[derive(Debug)]
#[non_exhaustive]
pub enum LooseError {
    /// File read failed.
    Io(io::Error),
    /// Zlib inflation failed.
    Inflate(InflateError),
    /// Header or payload structure is malformed.
    Corrupt { detail: &'static str },
    /// Header names a type other than blob/tree/commit/tag.
    UnknownType,
    /// Declared size exceeds the configured cap.
    TooLarge { size: u64, max: usize },
}

impl fmt::Display for LooseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "loose object I/O error: {err}"),
            Self::Inflate(err) => write!(f, "loose object inflate failed: {err}"),
            Self::Corrupt { detail } => write!(f, "corrupt loose object: {detail}"),
            Self::UnknownType => write!(f, "unknown loose object type"),
            Self::TooLarge { size, max } => {
                write!(f, "loose object size {size} exceeds cap {max}")
            }
        }
    }
}

impl std::error::Error for LooseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Inflate(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for LooseError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<InflateError> for LooseError {
    fn from(err: InflateError) -> Self {
        Self::Inflate(err)
    }
}

/// Parsed loose object header.
struct LooseHeader {
    kind: ObjectKind,
    size: u64,
    /// Offset of the first payload byte in the inflated stream.
    payload_start: usize,
}

/// Reads the loose object file at `path`.
///
/// With `size_only`, only the header region is inflated and the returned
/// payload is empty. A stream that ends exactly when the payload is
/// complete is success.
///
/// # Errors
/// Returns `LooseError` for I/O failures, corrupt streams, malformed
/// headers, unknown type names, and sizes beyond
/// `limits.max_object_bytes`.
pub fn read_loose(
    path: &Path,
    size_only: bool,
    limits: &DecodeLimits,
) -> Result<RawObject, LooseError> {
    let compressed = fs::read(path)?;

    if size_only {
        let mut head = Vec::with_capacity(HEADER_MAX_BYTES);
        inflate_prefix(&compressed, &mut head, HEADER_MAX_BYTES)?;
        let header = parse_header(&head, limits)?;
        return Ok(RawObject {
            kind: header.kind,
            size: header.size,
            data: Vec::new(),
        });
    }

    let max_out = limits.max_object_bytes.saturating_add(HEADER_MAX_BYTES);
    let mut inflated = Vec::new();
    inflate_limited(&compressed, &mut inflated, max_out)?;

    let header = parse_header(&inflated, limits)?;
    let payload = &inflated[header.payload_start..];
    if payload.len() as u64 != header.size {
        return Err(LooseError::Corrupt {
            detail: "payload length does not match header",
        });
    }

    Ok(RawObject {
        kind: header.kind,
        size: header.size,
        data: payload.to_vec(),
    })
}

/// Parses `"<type> <decimal>\0"` from the head of the inflated stream.
fn parse_header(bytes: &[u8], limits: &DecodeLimits) -> Result<LooseHeader, LooseError> {
    let header_end = memchr(0, &bytes[..bytes.len().min(HEADER_MAX_BYTES)]).ok_or(
        LooseError::Corrupt {
            detail: "missing header terminator",
        },
    )?;
    let header = &bytes[..header_end];

    let space = memchr(b' ', header).ok_or(LooseError::Corrupt {
        detail: "missing type separator",
    })?;

    let kind = ObjectKind::from_header_name(&header[..space]).ok_or(LooseError::UnknownType)?;
    let size = parse_decimal(&header[space + 1..]).ok_or(LooseError::Corrupt {
        detail: "invalid size field",
    })?;

    if size > limits.max_object_bytes as u64 {
        return Err(LooseError::TooLarge {
            size,
            max: limits.max_object_bytes,
        });
    }

    Ok(LooseHeader {
        kind,
        size,
        payload_start: header_end + 1,
    })
}

/// Parses a non-negative base-10 integer; rejects empty and non-digit input.
fn parse_decimal(bytes: &[u8]) -> Option<u64> {
    if bytes.is_empty() {
        return None;
    }
    let mut value: u64 = 0;
    for &b in bytes {
        if !b.is_ascii_digit() {
            return None;
        }
        value = value.checked_mul(10)?.checked_add(u64::from(b - b'0'))?;
    }
    Some(value)
}
