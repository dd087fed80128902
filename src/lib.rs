//! Read-only access to the object store of a bare Git repository.
//!
//! Given a repository directory, this crate resolves symbolic references
//! to object identifiers, retrieves objects by identifier, decodes commits
//! and trees, and navigates from a commit to its root tree and entries.
//! There is no write path.
//!
//! Lookup flow for one identifier:
//! 1. `Repository` checks the loose path `objects/<xx>/<38 hex>`; a hit
//!    goes to the loose reader.
//! 2. Otherwise each pack index (`objects/pack/*.idx`, mmapped at open) is
//!    queried via a fanout-narrowed binary search for the pack offset.
//! 3. The pack reader decodes the entry at that offset, recursively
//!    reconstructing offset-delta chains, and returns kind, inflated size,
//!    and payload bytes.
//!
//! # Scope
//! - Pack index version 2 and pack versions 2/3 only.
//! - Offset-based deltas only; id-delta entries are rejected.
//! - Checksums and CRC tables are not verified.
//!
//! # Concurrency
//! `Repository` and its index handles are immutable after open and safe to
//! share across threads. Object reads open their own descriptors; inflate
//! scratch state is thread-local.

pub mod bytes;
pub mod commit;
pub mod delta;
pub mod idx;
pub mod inflate;
pub mod loose;
pub mod object;
pub mod object_id;
pub mod pack;
pub mod refs;
pub mod repo;
pub mod tree;
pub mod varint;

pub use commit::{parse_commit, Commit, CommitParseError, Signature};
pub use delta::{apply_delta, delta_sizes, DeltaError};
pub use idx::{IdxError, IndexFile};
pub use inflate::InflateError;
pub use loose::{read_loose, LooseError};
pub use object::{ObjectKind, RawObject};
pub use object_id::{IdError, ObjectId};
pub use pack::{read_object_at, DecodeLimits, PackParseError, PackReadError};
pub use refs::{RefError, Reference};
pub use repo::{ObjectError, OpenError, Repository};
pub use tree::{parse_tree, EntryKind, Tree, TreeEntry, TreeParseError};
