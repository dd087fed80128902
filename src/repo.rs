//! Repository facade.
//!
//! `Repository` is the entry point: it opens a bare repository directory,
//! discovers every pack index under `objects/pack/`, and dispatches each
//! object lookup first to the loose path and then to the indexes in open
//! order.
//!
//! # Invariants
//! - The index list is fixed at open time; packs added later are not
//!   observed.
//! - A `Repository` is immutable after construction and freely shareable
//!   across threads. Object reads open their own descriptors and hold no
//!   locks.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::commit::{self, Commit, CommitParseError};
use crate::idx::{IdxError, IndexFile};
use crate::loose::{self, LooseError};
use crate::object::{ObjectKind, RawObject};
use crate::object_id::ObjectId;
use crate::pack::{self, DecodeLimits, PackReadError};
use crate::refs::{self, RefError, Reference};
use crate::tree::{self, Tree, TreeParseError};

/// Errors from opening a repository.
#[derive(Debug)]
#[non_exhaustive]
pub enum OpenError {
    /// The path does not exist.
    PathNotFound,
    /// The path exists but is not a directory.
    NotADirectory,
    /// I/O error during discovery.
    Io(io::Error),
    /// A pack index failed to open; fatal for the whole repository.
    Idx(IdxError),
}

impl fmt::Display for OpenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PathNotFound => write!(f, "repository path not found"),
            Self::NotADirectory => write!(f, "repository path is not a directory"),
            Self::Io(err) => write!(f, "I/O error: {err}"),
            Self::Idx(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for OpenError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Idx(err) => Some(err),
            _ => None,
        }
    }
}

impl From<IdxError> for OpenError {
    fn from(err: IdxError) -> Self {
        Self::Idx(err)
    }
}

/// Errors from object retrieval and the lookups built on it.
#[derive(Debug)]
#[non_exhaustive]
pub enum ObjectError {
    /// The identifier is unknown to this repository.
    NotFound,
    /// Loose object read failed.
    Loose(LooseError),
    /// Pack object read failed.
    Pack(PackReadError),
    /// Index lookup failed.
    Idx(IdxError),
    /// The object exists but has a different kind than requested.
    WrongKind {
        expected: ObjectKind,
        found: ObjectKind,
    },
    /// Reference resolution failed.
    Ref(RefError),
    /// Commit payload parsing failed.
    Commit(CommitParseError),
    /// Tree payload parsing failed.
    Tree(TreeParseError),
}

impl fmt::Display for ObjectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "object not found"),
            Self::Loose(err) => write!(f, "{err}"),
            Self::Pack(err) => write!(f, "{err}"),
            Self::Idx(err) => write!(f, "{err}"),
            Self::WrongKind { expected, found } => {
                write!(f, "object is a {found}, expected a {expected}")
            }
            Self::Ref(err) => write!(f, "{err}"),
            Self::Commit(err) => write!(f, "{err}"),
            Self::Tree(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ObjectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Loose(err) => Some(err),
            Self::Pack(err) => Some(err),
            Self::Idx(err) => Some(err),
            Self::Ref(err) => Some(err),
            Self::Commit(err) => Some(err),
            Self::Tree(err) => Some(err),
            _ => None,
        }
    }
}

impl From<LooseError> for ObjectError {
    fn from(err: LooseError) -> Self {
        Self::Loose(err)
    }
}

impl From<PackReadError> for ObjectError {
    fn from(err: PackReadError) -> Self {
        Self::Pack(err)
    }
}

impl From<IdxError> for ObjectError {
    fn from(err: IdxError) -> Self {
        Self::Idx(err)
    }
}

impl From<RefError> for ObjectError {
    fn from(err: RefError) -> Self {
        Self::Ref(err)
    }
}

impl From<CommitParseError> for ObjectError {
    fn from(err: CommitParseError) -> Self {
        Self::Commit(err)
    }
}

impl From<TreeParseError> for ObjectError {
    fn from(err: TreeParseError) -> Self {
        Self::Tree(err)
    }
}

/// An opened bare repository.
#[derive(Debug)]
pub struct Repository {
    path: PathBuf,
    indexes: Vec<IndexFile>,
    limits: DecodeLimits,
}

impl Repository {
    /// Opens the repository at `path` with default decode limits.
    ///
    /// # Errors
    /// Returns `PathNotFound`/`NotADirectory` for bad paths and `Idx` if
    /// any discovered pack index fails to open.
    pub fn open(path: &Path) -> Result<Self, OpenError> {
        Self::open_with_limits(path, DecodeLimits::DEFAULT)
    }

    /// Opens the repository at `path` with explicit decode limits.
    ///
    /// Index files under `objects/pack/` are opened in sorted name order,
    /// which fixes the lookup order for identifiers present in several
    /// packs.
    ///
    /// # Panics
    /// Panics if `limits` is internally inconsistent (a configuration
    /// bug, not a data error).
    pub fn open_with_limits(path: &Path, limits: DecodeLimits) -> Result<Self, OpenError> {
        limits.validate();

        let path = fs::canonicalize(path).map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                OpenError::PathNotFound
            } else {
                OpenError::Io(err)
            }
        })?;
        let metadata = fs::metadata(&path).map_err(OpenError::Io)?;
        if !metadata.is_dir() {
            return Err(OpenError::NotADirectory);
        }

        let mut indexes = Vec::new();
        for idx_path in list_index_files(&path.join("objects").join("pack"))? {
            indexes.push(IndexFile::open(&idx_path)?);
        }

        Ok(Self {
            path,
            indexes,
            limits,
        })
    }

    /// The canonicalized repository root.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of pack indexes discovered at open.
    #[inline]
    #[must_use]
    pub fn index_count(&self) -> usize {
        self.indexes.len()
    }

    /// Retrieves the raw object named by `id`: kind, inflated size, and
    /// payload bytes.
    ///
    /// The loose path `objects/<id[0..2]>/<id[2..]>` is tried first, then
    /// each index in open order.
    ///
    /// # Errors
    /// Returns `ObjectError::NotFound` when no store holds the identifier.
    pub fn raw_object(&self, id: &ObjectId) -> Result<RawObject, ObjectError> {
        self.read_object(id, false)
    }

    /// Returns the inflated size of the object named by `id` without
    /// materializing its payload.
    pub fn object_size(&self, id: &ObjectId) -> Result<u64, ObjectError> {
        self.read_object(id, true).map(|obj| obj.size)
    }

    /// Returns the kind of the object named by `id` without materializing
    /// its payload.
    pub fn object_kind(&self, id: &ObjectId) -> Result<ObjectKind, ObjectError> {
        self.read_object(id, true).map(|obj| obj.kind)
    }

    /// Resolves a reference name (e.g. `HEAD`, `refs/heads/main`) to its
    /// target identifier.
    pub fn lookup_reference(&self, name: &str) -> Result<Reference, ObjectError> {
        Ok(refs::resolve(&self.path, name)?)
    }

    /// Retrieves and decodes the commit named by `id`.
    ///
    /// # Errors
    /// Returns `WrongKind` if the identifier names a non-commit object.
    pub fn lookup_commit(&self, id: &ObjectId) -> Result<Commit, ObjectError> {
        let obj = self.raw_object(id)?;
        if obj.kind != ObjectKind::Commit {
            return Err(ObjectError::WrongKind {
                expected: ObjectKind::Commit,
                found: obj.kind,
            });
        }
        Ok(commit::parse_commit(&obj.data)?)
    }

    /// Retrieves and decodes the tree named by `id`.
    ///
    /// # Errors
    /// Returns `WrongKind` if the identifier names a non-tree object.
    pub fn lookup_tree(&self, id: &ObjectId) -> Result<Tree, ObjectError> {
        let obj = self.raw_object(id)?;
        if obj.kind != ObjectKind::Tree {
            return Err(ObjectError::WrongKind {
                expected: ObjectKind::Tree,
                found: obj.kind,
            });
        }
        Ok(tree::parse_tree(&obj.data)?)
    }

    /// Loose-first, then pack-by-pack object read.
    fn read_object(&self, id: &ObjectId, size_only: bool) -> Result<RawObject, ObjectError> {
        let loose_path = self.loose_path(id);
        if is_file(&loose_path) {
            return Ok(loose::read_loose(&loose_path, size_only, &self.limits)?);
        }

        for index in &self.indexes {
            if let Some(offset) = index.offset_for(id)? {
                return Ok(pack::read_object_at(
                    index.pack_path(),
                    offset,
                    size_only,
                    &self.limits,
                )?);
            }
        }

        Err(ObjectError::NotFound)
    }

    /// Path of the loose object file for `id`.
    fn loose_path(&self, id: &ObjectId) -> PathBuf {
        let hex = id.to_hex();
        self.path.join("objects").join(&hex[..2]).join(&hex[2..])
    }
}

/// Lists `*.idx` files in `pack_dir`, sorted by name.
///
/// A missing pack directory is an empty repository, not an error.
fn list_index_files(pack_dir: &Path) -> Result<Vec<PathBuf>, OpenError> {
    let entries = match fs::read_dir(pack_dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(OpenError::Io(err)),
    };

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(OpenError::Io)?;
        let file_type = entry.file_type().map_err(OpenError::Io)?;
        if !file_type.is_file() {
            continue;
        }

        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "idx") {
            paths.push(path);
        }
    }

    paths.sort();
    Ok(paths)
}

#[inline]
fn is_file(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}
