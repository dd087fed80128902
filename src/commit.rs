//! Parser for commit object payloads.
//!
//! # Commit Object Format
//! ```text
//! tree <hex-oid>\n
//! parent <hex-oid>\n   (zero or more)
//! author <name> <email> <timestamp> <tz>\n
//! committer <name> <email> <timestamp> <tz>\n
//! [other headers, possibly spanning continuation lines]\n
//! \n
//! <message>
//! ```
//!
//! Headers are recognized by tag; unknown headers (`gpgsig`, `encoding`,
//! and so on) and their space-indented continuation lines are skipped
//! without validation. The blank line starts the message, which is kept as
//! raw bytes since commit messages are not required to be UTF-8.

use std::fmt;

use memchr::memchr;

use crate::object_id::{IdError, ObjectId};

/// Errors from commit parsing.
#[derive(Debug)]
#[non_exhaustive]
pub enum CommitParseError {
    /// Commit data is corrupt or malformed.
    Corrupt { detail: &'static str },
    /// An identifier field failed to parse.
    Id(IdError),
}

impl CommitParseError {
    /// Constructs a corruption error with a static detail string.
    #[inline]
    pub const fn corrupt(detail: &'static str) -> Self {
        Self::Corrupt { detail }
    }
}

impl fmt::Display for CommitParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Corrupt { detail } => write!(f, "corrupt commit: {detail}"),
            Self::Id(err) => write!(f, "corrupt commit: {err}"),
        }
    }
}

impl std::error::Error for CommitParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Id(err) => Some(err),
            _ => None,
        }
    }
}

impl From<IdError> for CommitParseError {
    fn from(err: IdError) -> Self {
        Self::Id(err)
    }
}

/// An author or committer line: identity plus timestamp.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    /// Person name; may contain spaces.
    pub name: String,
    /// Email address without the angle brackets.
    pub email: String,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    /// Timezone offset in minutes east of UTC (`+0200` is 120).
    pub tz_offset_minutes: i32,
}

/// A decoded commit.
#[derive(Clone, Debug)]
pub struct Commit {
    /// The root tree this commit points at.
    pub tree_id: ObjectId,
    /// Parent commits, in header order; empty for a root commit.
    pub parents: Vec<ObjectId>,
    /// The `author` signature.
    pub author: Signature,
    /// The `committer` signature.
    pub committer: Signature,
    /// Raw message bytes, everything after the blank line.
    pub message: Vec<u8>,
}

impl Commit {
    /// Identifier of the root tree, for navigating into the snapshot.
    #[inline]
    #[must_use]
    pub fn tree_id(&self) -> &ObjectId {
        &self.tree_id
    }

    /// Number of parents (0 for a root commit).
    #[inline]
    #[must_use]
    pub fn parent_count(&self) -> usize {
        self.parents.len()
    }

    /// Identifier of parent `n`, if present.
    #[must_use]
    pub fn parent_id(&self, n: usize) -> Option<&ObjectId> {
        self.parents.get(n)
    }
}

/// Parses a commit payload (the raw object bytes, header already removed).
///
/// # Errors
/// Returns `CommitParseError` if the `tree`, `author`, or `committer`
/// headers are missing or any recognized header is malformed.
pub fn parse_commit(data: &[u8]) -> Result<Commit, CommitParseError> {
    let mut tree_id = None;
    let mut parents = Vec::new();
    let mut author = None;
    let mut committer = None;
    let mut message = Vec::new();

    let mut pos = 0;
    while pos < data.len() {
        let line_end = memchr(b'\n', &data[pos..]).map_or(data.len(), |n| pos + n);
        let line = &data[pos..line_end];

        if line.is_empty() {
            // Blank line: the rest is the message.
            if line_end < data.len() {
                message = data[line_end + 1..].to_vec();
            }
            break;
        }

        // Continuation of a multi-line header we don't interpret.
        if line[0] != b' ' {
            let (tag, rest) = match memchr(b' ', line) {
                Some(space) => (&line[..space], &line[space + 1..]),
                None => (line, &[][..]),
            };

            match tag {
                b"tree" => tree_id = Some(parse_hex_field(rest)?),
                b"parent" => parents.push(parse_hex_field(rest)?),
                b"author" => author = Some(parse_signature(rest)?),
                b"committer" => committer = Some(parse_signature(rest)?),
                _ => {}
            }
        }

        pos = line_end + 1;
    }

    Ok(Commit {
        tree_id: tree_id.ok_or(CommitParseError::corrupt("missing tree header"))?,
        parents,
        author: author.ok_or(CommitParseError::corrupt("missing author header"))?,
        committer: committer.ok_or(CommitParseError::corrupt("missing committer header"))?,
        message,
    })
}

fn parse_hex_field(field: &[u8]) -> Result<ObjectId, CommitParseError> {
    let hex = std::str::from_utf8(field)
        .map_err(|_| CommitParseError::corrupt("identifier field is not UTF-8"))?;
    Ok(ObjectId::from_hex(hex)?)
}

/// Parses `"Name <email> <timestamp> <tz>"`.
///
/// Names and emails may contain spaces, so the line is split around the
/// angle brackets rather than on whitespace.
fn parse_signature(line: &[u8]) -> Result<Signature, CommitParseError> {
    let open = memchr(b'<', line).ok_or(CommitParseError::corrupt("signature missing '<'"))?;
    let close = memchr(b'>', &line[open..])
        .map(|n| open + n)
        .ok_or(CommitParseError::corrupt("signature missing '>'"))?;

    let name = std::str::from_utf8(trim_ascii(&line[..open]))
        .map_err(|_| CommitParseError::corrupt("signature name is not UTF-8"))?
        .to_string();
    let email = std::str::from_utf8(&line[open + 1..close])
        .map_err(|_| CommitParseError::corrupt("signature email is not UTF-8"))?
        .to_string();

    let mut fields = line[close + 1..]
        .split(|&b| b == b' ')
        .filter(|f| !f.is_empty());
    let timestamp = fields
        .next()
        .and_then(parse_i64)
        .ok_or(CommitParseError::corrupt("signature missing timestamp"))?;
    let tz_offset_minutes = fields
        .next()
        .and_then(parse_tz_offset)
        .ok_or(CommitParseError::corrupt("signature missing timezone"))?;

    Ok(Signature {
        name,
        email,
        timestamp,
        tz_offset_minutes,
    })
}

fn parse_i64(bytes: &[u8]) -> Option<i64> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

/// Parses `+HHMM` / `-HHMM` into minutes east of UTC.
fn parse_tz_offset(bytes: &[u8]) -> Option<i32> {
    if bytes.len() != 5 {
        return None;
    }
    let sign = match bytes[0] {
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };
    let digits = std::str::from_utf8(&bytes[1..]).ok()?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    Some(sign * (hours * 60 + minutes))
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
