//! Pack file object reading.
//!
//! A pack concatenates many objects, some stored whole and some as deltas
//! against earlier objects in the same file. Each entry starts with a
//! bit-packed header: byte 0 carries the object type in bits 6..4 and the
//! low 4 bits of the inflated size; while bit 7 is set, continuation bytes
//! contribute 7 size bits each at shifts 4, 11, 18, … For delta entries the
//! header size is the inflated size of the *delta program*, not of the
//! reconstructed object.
//!
//! `read_object_at` opens a fresh descriptor per call, maps the pack, and
//! resolves offset-delta chains by recursion bounded by
//! [`DecodeLimits::max_delta_depth`]. Id-delta entries (`0x70`) are
//! rejected; only offset-based deltas are supported.
//!
//! # Caller Expectations
//! - Offsets must point at entry headers (typically from an index lookup).
//! - The pack trailer hash is ignored; integrity checks happen elsewhere.

use std::fmt;
use std::fs::File;
use std::io;
use std::path::Path;

use memmap2::Mmap;

use crate::delta::{self, DeltaError};
use crate::inflate::{inflate_exact, InflateError};
use crate::object::{ObjectKind, RawObject};
use crate::varint::{self, VarintError};

/// Pack header size: magic(4) + version(4) + object_count(4).
const PACK_HEADER_SIZE: usize = 12;

/// Trailing pack hash length.
const PACK_TRAILER_SIZE: usize = 20;

/// Hard caps for pack decoding.
///
/// All limits are explicit guardrails against corrupt or adversarial pack
/// data; exceeding one surfaces as an error, never as silent truncation.
#[derive(Clone, Copy, Debug)]
pub struct DecodeLimits {
    /// Maximum header bytes to parse for an entry.
    pub max_header_bytes: usize,
    /// Maximum inflated size allowed for any object.
    pub max_object_bytes: usize,
    /// Maximum inflated size for a delta program (not the final object).
    pub max_delta_bytes: usize,
    /// Maximum delta chain depth. Depth counts delta edges; a value of 0
    /// rejects any delta entry.
    pub max_delta_depth: u8,
}

impl DecodeLimits {
    /// Defaults sized for large repositories.
    pub const DEFAULT: Self = Self {
        max_header_bytes: 64,
        max_object_bytes: 1024 * 1024 * 1024,
        max_delta_bytes: 1024 * 1024 * 1024,
        max_delta_depth: 50,
    };

    /// Validates that limits are internally consistent.
    ///
    /// # Panics
    /// Panics if limits are invalid (indicates a configuration bug).
    #[track_caller]
    pub const fn validate(&self) {
        assert!(self.max_header_bytes >= 2, "header limit too small");
        assert!(self.max_object_bytes > 0, "object limit must be > 0");
        assert!(self.max_delta_bytes > 0, "delta limit must be > 0");
    }
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Pack structure parse error taxonomy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum PackParseError {
    /// File is smaller than header plus trailer.
    TooSmall,
    /// Missing `PACK` signature.
    BadSignature,
    /// Version word is neither 2 nor 3.
    UnsupportedVersion(u32),
    /// Entry offset outside the object data region.
    OffsetOutOfRange(u64),
    /// Entry header exceeded the safety bound.
    HeaderTooLong,
    /// Data ended inside a header.
    Truncated,
    /// Reserved or unknown object type bits.
    BadObjType(u8),
    /// Offset-delta back-reference is malformed.
    BadOfsEncoding,
    /// Offset-delta back-reference points before the pack start.
    OfsUnderflow,
}

impl fmt::Display for PackParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooSmall => write!(f, "pack too small"),
            Self::BadSignature => write!(f, "bad pack signature"),
            Self::UnsupportedVersion(v) => write!(f, "unsupported pack version {v}"),
            Self::OffsetOutOfRange(o) => write!(f, "offset {o} out of range"),
            Self::HeaderTooLong => write!(f, "header exceeded safety bound"),
            Self::Truncated => write!(f, "truncated pack data"),
            Self::BadObjType(t) => write!(f, "bad object type {t}"),
            Self::BadOfsEncoding => write!(f, "bad offset-delta encoding"),
            Self::OfsUnderflow => write!(f, "offset-delta base underflow"),
        }
    }
}

impl std::error::Error for PackParseError {}

/// Errors from pack object reading.
#[derive(Debug)]
#[non_exhaustive]
pub enum PackReadError {
    /// Pack file I/O failed.
    Io(io::Error),
    /// Pack structure parsing failed.
    Parse(PackParseError),
    /// Zlib inflation failed.
    Inflate(InflateError),
    /// Delta application failed.
    Delta(DeltaError),
    /// Non-delta object size exceeds the configured cap.
    ObjectTooLarge { size: u64, max: usize },
    /// Delta program size exceeds the configured cap.
    DeltaTooLarge { size: u64, max: usize },
    /// Delta chain exceeded the configured depth.
    DepthExceeded { max_depth: u8 },
    /// Id-delta entries (base named by identifier) are not supported.
    RefDeltaUnsupported,
}

impl fmt::Display for PackReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "pack I/O error: {err}"),
            Self::Parse(err) => write!(f, "{err}"),
            Self::Inflate(err) => write!(f, "{err}"),
            Self::Delta(err) => write!(f, "{err}"),
            Self::ObjectTooLarge { size, max } => {
                write!(f, "object size {size} exceeds cap {max}")
            }
            Self::DeltaTooLarge { size, max } => {
                write!(f, "delta program size {size} exceeds cap {max}")
            }
            Self::DepthExceeded { max_depth } => {
                write!(f, "delta chain depth exceeded (max {max_depth})")
            }
            Self::RefDeltaUnsupported => write!(f, "id-delta entries are not supported"),
        }
    }
}

impl std::error::Error for PackReadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Parse(err) => Some(err),
            Self::Inflate(err) => Some(err),
            Self::Delta(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for PackReadError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<PackParseError> for PackReadError {
    fn from(err: PackParseError) -> Self {
        Self::Parse(err)
    }
}

impl From<InflateError> for PackReadError {
    fn from(err: InflateError) -> Self {
        Self::Inflate(err)
    }
}

impl From<DeltaError> for PackReadError {
    fn from(err: DeltaError) -> Self {
        Self::Delta(err)
    }
}

/// Parsed pack entry kind from a header.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum EntryKind {
    /// Stored object (commit, tree, blob, tag).
    Stored { kind: ObjectKind },
    /// Offset delta: base at a backward offset in the same pack.
    OfsDelta { base_offset: u64 },
    /// Id delta: base named by a 20-byte identifier (rejected).
    RefDelta,
}

/// Entry header parsed from a pack file.
#[derive(Clone, Copy, Debug)]
struct EntryHeader {
    /// Inflated payload size (for deltas, the delta program's size).
    size: u64,
    /// Byte offset where the zlib stream begins.
    data_start: usize,
    /// Entry kind.
    kind: EntryKind,
}

/// Zero-copy view over pack file bytes.
///
/// The trailing hash is excluded from `data_end` to prevent misparsing the
/// checksum as object data. No checksum verification is done.
#[derive(Debug)]
struct PackView<'a> {
    bytes: &'a [u8],
    data_end: usize,
}

impl<'a> PackView<'a> {
    /// Parses and validates a pack file header.
    fn parse(bytes: &'a [u8]) -> Result<Self, PackParseError> {
        if bytes.len() < PACK_HEADER_SIZE + PACK_TRAILER_SIZE {
            return Err(PackParseError::TooSmall);
        }
        if &bytes[0..4] != b"PACK" {
            return Err(PackParseError::BadSignature);
        }
        let version = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if version != 2 && version != 3 {
            return Err(PackParseError::UnsupportedVersion(version));
        }

        Ok(Self {
            bytes,
            data_end: bytes.len() - PACK_TRAILER_SIZE,
        })
    }

    /// Parses the entry header at `offset`.
    ///
    /// For offset-delta entries the returned `data_start` points past the
    /// back-reference, at the first byte of the delta's zlib stream.
    fn entry_header_at(
        &self,
        offset: u64,
        max_header_bytes: usize,
    ) -> Result<EntryHeader, PackParseError> {
        let start = offset as usize;
        if offset >= self.data_end as u64 || start < PACK_HEADER_SIZE {
            return Err(PackParseError::OffsetOutOfRange(offset));
        }

        let mut pos = start;
        let mut byte = self.byte_at(pos)?;
        pos += 1;

        let obj_type = (byte >> 4) & 0x07;
        let mut size: u64 = u64::from(byte & 0x0f);
        let mut shift: u32 = 4;

        while byte & 0x80 != 0 {
            if pos - start >= max_header_bytes {
                return Err(PackParseError::HeaderTooLong);
            }
            byte = self.byte_at(pos)?;
            pos += 1;
            size |= u64::from(byte & 0x7f) << shift;
            shift += 7;
            if shift > 63 {
                return Err(PackParseError::HeaderTooLong);
            }
        }

        let kind = match obj_type {
            1 => EntryKind::Stored {
                kind: ObjectKind::Commit,
            },
            2 => EntryKind::Stored {
                kind: ObjectKind::Tree,
            },
            3 => EntryKind::Stored {
                kind: ObjectKind::Blob,
            },
            4 => EntryKind::Stored {
                kind: ObjectKind::Tag,
            },
            6 => {
                let (distance, used) =
                    varint::ofs_delta_distance(&self.bytes[pos..self.data_end]).map_err(|err| {
                        match err {
                            VarintError::Truncated => PackParseError::Truncated,
                            VarintError::Overflow => PackParseError::BadOfsEncoding,
                        }
                    })?;
                if pos - start + used > max_header_bytes {
                    return Err(PackParseError::HeaderTooLong);
                }
                if distance >= offset {
                    return Err(PackParseError::OfsUnderflow);
                }
                pos += used;
                EntryKind::OfsDelta {
                    base_offset: offset - distance,
                }
            }
            7 => {
                // Skip the embedded base identifier so the header is still
                // well-formed; the read path rejects the entry.
                pos += 20;
                if pos > self.data_end {
                    return Err(PackParseError::Truncated);
                }
                EntryKind::RefDelta
            }
            other => return Err(PackParseError::BadObjType(other)),
        };

        Ok(EntryHeader {
            size,
            data_start: pos,
            kind,
        })
    }

    /// Raw bytes from `start` to the end of the data region.
    #[inline]
    fn slice_from(&self, start: usize) -> &'a [u8] {
        debug_assert!(start <= self.data_end, "slice_from out of range");
        &self.bytes[start..self.data_end]
    }

    #[inline]
    fn byte_at(&self, pos: usize) -> Result<u8, PackParseError> {
        if pos >= self.data_end {
            return Err(PackParseError::Truncated);
        }
        Ok(self.bytes[pos])
    }
}

/// Reads the object at `offset` in the pack at `pack_path`.
///
/// Offset-delta chains are resolved recursively against earlier entries in
/// the same pack; the returned kind is the chain base's kind. With
/// `size_only` the payload is not materialized: for stored objects nothing
/// is inflated, for deltas only the delta program (whose head declares the
/// reconstructed size) is.
///
/// A fresh descriptor is opened per call; no locks are held, so concurrent
/// reads of the same pack are race-free.
///
/// # Errors
/// Returns `PackReadError` for I/O failures, malformed pack data, delta
/// failures, chains deeper than `limits.max_delta_depth`, and id-delta
/// entries (`RefDeltaUnsupported`).
pub fn read_object_at(
    pack_path: &Path,
    offset: u64,
    size_only: bool,
    limits: &DecodeLimits,
) -> Result<RawObject, PackReadError> {
    let file = File::open(pack_path)?;

    // SAFETY: pack files are immutable while the repository is open; a
    // concurrent rewrite may fault the mapping and that risk is accepted.
    let mmap = unsafe { Mmap::map(&file)? };
    advise_sequential(&file, &mmap);

    let pack = PackView::parse(&mmap)?;
    read_at(&pack, offset, size_only, limits.max_delta_depth, limits)
}

/// Reads one entry, recursing through offset-delta bases.
fn read_at(
    pack: &PackView<'_>,
    offset: u64,
    size_only: bool,
    depth: u8,
    limits: &DecodeLimits,
) -> Result<RawObject, PackReadError> {
    let header = pack.entry_header_at(offset, limits.max_header_bytes)?;

    match header.kind {
        EntryKind::Stored { kind } => {
            if header.size > limits.max_object_bytes as u64 {
                return Err(PackReadError::ObjectTooLarge {
                    size: header.size,
                    max: limits.max_object_bytes,
                });
            }
            if size_only {
                return Ok(RawObject {
                    kind,
                    size: header.size,
                    data: Vec::new(),
                });
            }

            let mut data = Vec::with_capacity(header.size as usize);
            inflate_exact(
                pack.slice_from(header.data_start),
                &mut data,
                header.size as usize,
            )?;
            Ok(RawObject {
                kind,
                size: header.size,
                data,
            })
        }
        EntryKind::OfsDelta { base_offset } => {
            if header.size > limits.max_delta_bytes as u64 {
                return Err(PackReadError::DeltaTooLarge {
                    size: header.size,
                    max: limits.max_delta_bytes,
                });
            }
            if depth == 0 {
                return Err(PackReadError::DepthExceeded {
                    max_depth: limits.max_delta_depth,
                });
            }

            // The header size is the inflated length of the delta program
            // itself; the program's own head declares the base and result
            // sizes.
            let mut program = Vec::with_capacity(header.size as usize);
            inflate_exact(
                pack.slice_from(header.data_start),
                &mut program,
                header.size as usize,
            )?;
            let (_, result_size) = delta::delta_sizes(&program)?;

            let base = read_at(pack, base_offset, size_only, depth - 1, limits)?;

            if size_only {
                return Ok(RawObject {
                    kind: base.kind,
                    size: result_size as u64,
                    data: Vec::new(),
                });
            }

            let mut data = Vec::new();
            delta::apply_delta(&base.data, &program, &mut data, limits.max_object_bytes)?;
            Ok(RawObject {
                kind: base.kind,
                size: result_size as u64,
                data,
            })
        }
        EntryKind::RefDelta => Err(PackReadError::RefDeltaUnsupported),
    }
}

#[cfg(unix)]
fn advise_sequential(file: &File, mapped: &Mmap) {
    use std::os::unix::io::AsRawFd;

    // SAFETY: the descriptor is valid for the duration of `fadvise`, and
    // the mapping pointer/length are valid for `madvise`. Both calls are
    // advisory; errors are silently ignored.
    unsafe {
        #[cfg(target_os = "linux")]
        let _ = libc::posix_fadvise(file.as_raw_fd(), 0, 0, libc::POSIX_FADV_SEQUENTIAL);
        #[cfg(not(target_os = "linux"))]
        let _ = file;
        let _ = libc::madvise(
            mapped.as_ptr() as *mut libc::c_void,
            mapped.len(),
            libc::MADV_SEQUENTIAL,
        );
    }
}

#[cfg(not(unix))]
fn advise_sequential(_file: &File, _mapped: &Mmap) {}
