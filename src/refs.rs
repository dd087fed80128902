//! Symbolic reference resolution.
//!
//! A repository names commits through text files: `HEAD` and the files
//! under `refs/` hold either a 40-character identifier or a symbolic
//! pointer `"ref: <dest>"`. References absent as files may still appear as
//! `"<40-hex> <name>"` pairs in `info/refs` (tab-separated) or
//! `packed-refs` (space-separated); the scanner is agnostic about the
//! separator.
//!
//! Symbolic chains are followed up to a fixed hop limit so a cyclic `HEAD`
//! cannot loop forever.

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use crate::object_id::{IdError, ObjectId};

/// Maximum symbolic hops before giving up.
const MAX_SYMREF_HOPS: usize = 8;

/// Errors from reference resolution.
#[derive(Debug)]
#[non_exhaustive]
pub enum RefError {
    /// File read failed.
    Io(io::Error),
    /// The reference exists nowhere: not as a file, not in `info/refs`,
    /// not in `packed-refs`.
    NotFound,
    /// A ref file holds neither an identifier nor a `"ref: "` pointer.
    Malformed { detail: &'static str },
    /// The identifier in a ref file failed to parse.
    Id(IdError),
    /// A symbolic chain exceeded the hop limit.
    ChainTooDeep { max: usize },
}

impl fmt::Display for RefError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "reference I/O error: {err}"),
            Self::NotFound => write!(f, "reference not found"),
            Self::Malformed { detail } => write!(f, "malformed reference: {detail}"),
            Self::Id(err) => write!(f, "{err}"),
            Self::ChainTooDeep { max } => {
                write!(f, "symbolic reference chain too deep (max {max})")
            }
        }
    }
}

impl std::error::Error for RefError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Id(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for RefError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<IdError> for RefError {
    fn from(err: IdError) -> Self {
        Self::Id(err)
    }
}

/// A resolved reference: the requested name and its target identifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reference {
    /// The name as requested (e.g. `HEAD`, `refs/heads/main`).
    pub name: String,
    /// The identifier the reference ultimately points at.
    pub target: ObjectId,
}

/// Resolves `name` within the repository at `repo_path`.
///
/// # Errors
/// Returns `RefError::NotFound` when the name resolves nowhere,
/// `ChainTooDeep` on runaway symbolic chains, and `Malformed`/`Id` for
/// unparseable ref content.
pub fn resolve(repo_path: &Path, name: &str) -> Result<Reference, RefError> {
    let mut current = name.to_string();

    for _ in 0..MAX_SYMREF_HOPS {
        let bytes = match fs::read(repo_path.join(&current)) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                // Not a file; the name may still be listed in info/refs or
                // packed-refs.
                for list in [repo_path.join("info/refs"), repo_path.join("packed-refs")] {
                    if let Some(target) = scan_ref_list(&list, current.as_bytes())? {
                        return Ok(Reference {
                            name: name.to_string(),
                            target,
                        });
                    }
                }
                return Err(RefError::NotFound);
            }
            Err(err) => return Err(RefError::Io(err)),
        };

        let content = trim_ascii(&bytes);
        if let Some(dest) = content.strip_prefix(b"ref: ") {
            current = std::str::from_utf8(dest)
                .map_err(|_| RefError::Malformed {
                    detail: "symbolic target is not UTF-8",
                })?
                .to_string();
            continue;
        }

        let hex = std::str::from_utf8(content).map_err(|_| RefError::Malformed {
            detail: "ref content is not UTF-8",
        })?;
        let target = ObjectId::from_hex(hex)?;
        return Ok(Reference {
            name: name.to_string(),
            target,
        });
    }

    Err(RefError::ChainTooDeep {
        max: MAX_SYMREF_HOPS,
    })
}

/// Scans a `"<40-hex> <name>"` list file for `name`.
///
/// Returns `Ok(None)` when the file is absent or holds no match. Blank
/// lines and `#` comments are skipped; peeled-tag lines (`^<hex>`) fall out
/// naturally because they have a single field.
fn scan_ref_list(path: &Path, name: &[u8]) -> Result<Option<ObjectId>, RefError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(RefError::Io(err)),
    };

    for line in bytes.split(|&b| b == b'\n') {
        let line = trim_ascii(line);
        if line.is_empty() || line[0] == b'#' {
            continue;
        }

        let mut fields = line
            .split(|&b| b == b' ' || b == b'\t')
            .filter(|f| !f.is_empty());
        let (Some(hex), Some(ref_name), None) = (fields.next(), fields.next(), fields.next())
        else {
            continue;
        };
        if hex.len() != ObjectId::HEX_LEN || ref_name != name {
            continue;
        }

        let hex = std::str::from_utf8(hex).map_err(|_| RefError::Malformed {
            detail: "ref list identifier is not UTF-8",
        })?;
        return Ok(Some(ObjectId::from_hex(hex)?));
    }

    Ok(None)
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |p| p + 1);
    &bytes[start..end]
}
