//! Pack index (`.idx`) version 2 reading.
//!
//! A pack index is the sidecar that maps object identifiers to byte
//! offsets inside its companion `.pack` file. `IndexFile` memory-maps the
//! index read-only and answers lookups directly against the mapped tables;
//! nothing is copied out.
//!
//! # Layout (v2)
//! ```text
//! +----------------+
//! | Magic (4B)     |  0xff 't' 'O' 'c'
//! | Version (4B)   |  big-endian 2
//! +----------------+
//! | Fanout (1024B) |  256 * u32 BE cumulative counts
//! +----------------+
//! | Id Table       |  N * 20 bytes, sorted ascending
//! +----------------+
//! | CRC Table      |  N * 4 bytes (skipped)
//! +----------------+
//! | Offset Table   |  N * 4 bytes BE (MSB set -> large offset index)
//! +----------------+
//! | Large Offsets  |  M * 8 bytes BE (optional)
//! +----------------+
//! | Pack Checksum  |  20 bytes (ignored)
//! | Idx Checksum   |  20 bytes (ignored)
//! +----------------+
//! ```
//!
//! # Scope
//! - Version 2 only; version 1 files are rejected.
//! - Validates header, fanout monotonicity, and table bounds.
//! - Does not verify checksums or CRC entries.
//!
//! # Complexity
//! - `offset_for` is O(log N) via fanout-bucketed binary search.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use crate::bytes::BytesView;
use crate::object_id::ObjectId;

/// Pack index magic bytes for the v2 format.
const IDX_MAGIC: [u8; 4] = [0xff, b't', b'O', b'c'];
/// Pack index version 2 (only supported version).
const IDX_VERSION: u32 = 2;
/// Header size (4 magic + 4 version).
const IDX_HEADER_SIZE: usize = 8;
/// Fanout table entries.
const FANOUT_ENTRIES: usize = 256;
/// Fanout table size in bytes.
const FANOUT_SIZE: usize = FANOUT_ENTRIES * 4;
/// Identifier length in bytes.
const OID_LEN: usize = ObjectId::LEN;
/// Two trailing hashes, both ignored by readers.
const TRAILER_SIZE: usize = 2 * OID_LEN;
/// MSB mask marking a large-offset indirection.
const LARGE_OFFSET_FLAG: u32 = 0x8000_0000;
/// Maximum index file size (2 GB, conservative limit).
const MAX_IDX_SIZE: u64 = 2 * 1024 * 1024 * 1024;
/// Pack file signature.
const PACK_MAGIC: [u8; 4] = *b"PACK";

/// Errors from pack index opening and lookup.
#[derive(Debug)]
#[non_exhaustive]
pub enum IdxError {
    /// Index file is corrupt or malformed.
    Corrupt { detail: &'static str },
    /// Index version is not supported (only v2 is).
    UnsupportedVersion { version: u32 },
    /// Index file exceeds the size limit.
    TooLarge { size: u64, max: u64 },
    /// A large-offset indirection points outside the 8-byte table.
    LargeOffsetOutOfBounds { index: u32, count: u32 },
    /// The companion pack file is missing its signature or version.
    CorruptPack { detail: &'static str },
    /// I/O error while opening or mapping.
    Io(io::Error),
}

impl IdxError {
    /// Constructs a corruption error with a static detail string.
    #[inline]
    pub const fn corrupt(detail: &'static str) -> Self {
        Self::Corrupt { detail }
    }
}

impl fmt::Display for IdxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Corrupt { detail } => write!(f, "corrupt pack index: {detail}"),
            Self::UnsupportedVersion { version } => {
                write!(f, "unsupported pack index version: {version} (expected 2)")
            }
            Self::TooLarge { size, max } => {
                write!(f, "pack index too large: {size} bytes (max: {max})")
            }
            Self::LargeOffsetOutOfBounds { index, count } => {
                write!(f, "large offset index out of bounds: {index} >= {count}")
            }
            Self::CorruptPack { detail } => write!(f, "corrupt pack file: {detail}"),
            Self::Io(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl std::error::Error for IdxError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for IdxError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

/// Validated table positions within an index file.
#[derive(Clone, Copy, Debug)]
struct IdxLayout {
    object_count: u32,
    oid_table: usize,
    offset_table: usize,
    large_offsets: usize,
    large_count: u32,
}

impl IdxLayout {
    /// Parses and validates the v2 layout.
    ///
    /// All table positions are checked to lie within `data`; accessors can
    /// slice without further bounds errors.
    fn parse(data: &[u8]) -> Result<Self, IdxError> {
        if data.len() as u64 > MAX_IDX_SIZE {
            return Err(IdxError::TooLarge {
                size: data.len() as u64,
                max: MAX_IDX_SIZE,
            });
        }

        let min_size = IDX_HEADER_SIZE + FANOUT_SIZE + TRAILER_SIZE;
        if data.len() < min_size {
            return Err(IdxError::corrupt("file too small"));
        }

        if data[0..4] != IDX_MAGIC {
            return Err(IdxError::corrupt("invalid magic"));
        }

        let version = be_u32(data, 4);
        if version != IDX_VERSION {
            return Err(IdxError::UnsupportedVersion { version });
        }

        let object_count = validate_fanout(&data[IDX_HEADER_SIZE..IDX_HEADER_SIZE + FANOUT_SIZE])?;
        let n = object_count as usize;

        let oid_table = IDX_HEADER_SIZE + FANOUT_SIZE;
        let crc_table = oid_table + n * OID_LEN;
        let offset_table = crc_table + n * 4;
        let large_offsets = offset_table + n * 4;

        if data.len() < large_offsets + TRAILER_SIZE {
            return Err(IdxError::corrupt("tables truncated"));
        }

        let large_bytes = data.len() - TRAILER_SIZE - large_offsets;
        if large_bytes % 8 != 0 {
            return Err(IdxError::corrupt(
                "large offset table not a multiple of 8 bytes",
            ));
        }

        Ok(Self {
            object_count,
            oid_table,
            offset_table,
            large_offsets,
            large_count: (large_bytes / 8) as u32,
        })
    }
}

/// An opened pack index and the path of its companion pack.
///
/// # Invariants
/// - The backing bytes are immutable for the lifetime of the handle; the
///   handle is freely shareable across threads.
/// - All table positions were bounds-checked at open.
#[derive(Debug)]
pub struct IndexFile {
    pack_path: PathBuf,
    data: BytesView,
    layout: IdxLayout,
}

impl IndexFile {
    /// Opens a `.idx` file, memory-mapping it read-only.
    ///
    /// The companion pack path is derived from the index stem
    /// (`<stem>.pack`) and its signature is verified.
    ///
    /// # Errors
    /// Returns `IdxError` if the index is malformed or has an unsupported
    /// version, or `CorruptPack` if the companion pack is missing its
    /// `PACK` signature.
    pub fn open(idx_path: &Path) -> Result<Self, IdxError> {
        let file = File::open(idx_path)?;
        let metadata = file.metadata()?;
        if metadata.len() > MAX_IDX_SIZE {
            return Err(IdxError::TooLarge {
                size: metadata.len(),
                max: MAX_IDX_SIZE,
            });
        }

        // SAFETY: the index is mapped read-only and treated as immutable
        // for the lifetime of the handle. Repositories are expected to be
        // quiescent while open; a concurrent rewrite may fault the mapping
        // and that risk is accepted.
        let mmap = unsafe { Mmap::map(&file)? };

        let index = Self::from_bytes(BytesView::from_mmap(mmap), idx_path.with_extension("pack"))?;
        verify_pack_signature(&index.pack_path)?;
        Ok(index)
    }

    /// Constructs an index from in-memory bytes without touching the pack.
    fn from_bytes(data: BytesView, pack_path: PathBuf) -> Result<Self, IdxError> {
        let layout = IdxLayout::parse(data.as_slice())?;
        Ok(Self {
            pack_path,
            data,
            layout,
        })
    }

    /// Path of the companion `.pack` file.
    #[inline]
    #[must_use]
    pub fn pack_path(&self) -> &Path {
        &self.pack_path
    }

    /// Number of objects indexed.
    #[inline]
    #[must_use]
    pub fn object_count(&self) -> u32 {
        self.layout.object_count
    }

    /// Looks up the pack offset of an identifier.
    ///
    /// Returns `Ok(None)` when the identifier is not in this index. The
    /// search window is narrowed by the fanout bucket of the first byte,
    /// then binary-searched with 20-byte lexicographic compares.
    ///
    /// # Errors
    /// Returns `LargeOffsetOutOfBounds` if a matching entry carries a
    /// corrupt large-offset indirection.
    pub fn offset_for(&self, id: &ObjectId) -> Result<Option<u64>, IdxError> {
        let first = id.first_byte();
        let mut lo = if first == 0 { 0 } else { self.fanout(first - 1) };
        let mut hi = self.fanout(first);

        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match id.as_bytes()[..].cmp(self.id_at(mid)) {
                std::cmp::Ordering::Equal => return self.offset_at(mid).map(Some),
                std::cmp::Ordering::Less => hi = mid,
                std::cmp::Ordering::Greater => lo = mid + 1,
            }
        }

        Ok(None)
    }

    /// Returns the cumulative count for a first-byte bucket.
    #[inline]
    fn fanout(&self, first_byte: u8) -> u32 {
        be_u32(
            self.data.as_slice(),
            IDX_HEADER_SIZE + first_byte as usize * 4,
        )
    }

    /// Returns the identifier bytes at a table position.
    #[inline]
    fn id_at(&self, idx: u32) -> &[u8] {
        debug_assert!(idx < self.layout.object_count, "id index out of bounds");
        let start = self.layout.oid_table + idx as usize * OID_LEN;
        &self.data.as_slice()[start..start + OID_LEN]
    }

    /// Returns the pack offset at a table position, following large-offset
    /// indirection when the MSB is set.
    fn offset_at(&self, idx: u32) -> Result<u64, IdxError> {
        debug_assert!(idx < self.layout.object_count, "offset index out of bounds");
        let raw = be_u32(
            self.data.as_slice(),
            self.layout.offset_table + idx as usize * 4,
        );

        if raw & LARGE_OFFSET_FLAG == 0 {
            return Ok(u64::from(raw));
        }

        let large_idx = raw & !LARGE_OFFSET_FLAG;
        if large_idx >= self.layout.large_count {
            return Err(IdxError::LargeOffsetOutOfBounds {
                index: large_idx,
                count: self.layout.large_count,
            });
        }

        Ok(be_u64(
            self.data.as_slice(),
            self.layout.large_offsets + large_idx as usize * 8,
        ))
    }
}

/// Validates that the fanout table is non-decreasing and returns the total
/// object count (`fanout[255]`).
fn validate_fanout(fanout: &[u8]) -> Result<u32, IdxError> {
    debug_assert!(fanout.len() == FANOUT_SIZE);

    let mut prev = 0u32;
    for i in 0..FANOUT_ENTRIES {
        let val = be_u32(fanout, i * 4);
        if val < prev {
            return Err(IdxError::corrupt("fanout not monotonic"));
        }
        prev = val;
    }

    Ok(prev)
}

/// Verifies the companion pack's signature and version word.
fn verify_pack_signature(pack_path: &Path) -> Result<(), IdxError> {
    let mut file = File::open(pack_path)?;
    let mut header = [0u8; 8];
    file.read_exact(&mut header).map_err(|err| {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            IdxError::CorruptPack {
                detail: "pack file too small for header",
            }
        } else {
            IdxError::Io(err)
        }
    })?;

    if header[0..4] != PACK_MAGIC {
        return Err(IdxError::CorruptPack {
            detail: "missing PACK signature",
        });
    }

    let version = be_u32(&header, 4);
    if version != 2 && version != 3 {
        return Err(IdxError::CorruptPack {
            detail: "unsupported pack version",
        });
    }

    Ok(())
}

#[inline]
fn be_u32(data: &[u8], pos: usize) -> u32 {
    u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]])
}

#[inline]
fn be_u64(data: &[u8], pos: usize) -> u64 {
    u64::from_be_bytes([
        data[pos],
        data[pos + 1],
        data[pos + 2],
        data[pos + 3],
        data[pos + 4],
        data[pos + 5],
        data[pos + 6],
        data[pos + 7],
    ])
}
