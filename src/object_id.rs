//! Object identifiers.
//!
//! `ObjectId` is the fixed 20-byte identifier naming every object in the
//! store. It is a plain value type: zero-heap storage, bytewise equality,
//! and lexicographic ordering that matches the sorted identifier table in
//! pack indexes.
//!
//! # Hex Encoding
//! - `from_hex` accepts exactly 40 hex characters, upper or lower case.
//! - `Display` always renders 40 lowercase characters, matching Git's
//!   canonical rendering.

use std::fmt;

/// Errors from identifier construction.
#[derive(Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum IdError {
    /// Input has the wrong length (bytes for `from_bytes`, characters for
    /// `from_hex`).
    InvalidLength { found: usize, expected: usize },
    /// Input contains a non-hex character.
    InvalidHex { byte: u8 },
}

impl fmt::Display for IdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidLength { found, expected } => {
                write!(f, "invalid identifier length: {found} (expected {expected})")
            }
            Self::InvalidHex { byte } => {
                write!(f, "invalid hex byte in identifier: 0x{byte:02x}")
            }
        }
    }
}

impl std::error::Error for IdError {}

/// A 20-byte object identifier.
///
/// # Invariants
/// - Ordering is lexicographic on the raw bytes.
/// - The hex rendering is always 40 lowercase characters.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId([u8; 20]);

impl ObjectId {
    /// Identifier length in bytes.
    pub const LEN: usize = 20;
    /// Identifier length in hex characters.
    pub const HEX_LEN: usize = 40;

    /// Creates an identifier from a raw byte array.
    #[inline]
    #[must_use]
    pub const fn from_raw(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Creates an identifier from a byte slice.
    ///
    /// # Errors
    /// Returns `IdError::InvalidLength` unless the slice is exactly 20 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IdError> {
        if bytes.len() != Self::LEN {
            return Err(IdError::InvalidLength {
                found: bytes.len(),
                expected: Self::LEN,
            });
        }
        let mut raw = [0u8; 20];
        raw.copy_from_slice(bytes);
        Ok(Self(raw))
    }

    /// Parses a 40-character hex string, case-insensitively.
    ///
    /// # Errors
    /// Returns `IdError::InvalidLength` for any other length and
    /// `IdError::InvalidHex` on the first non-hex character.
    pub fn from_hex(hex: &str) -> Result<Self, IdError> {
        let hex = hex.as_bytes();
        if hex.len() != Self::HEX_LEN {
            return Err(IdError::InvalidLength {
                found: hex.len(),
                expected: Self::HEX_LEN,
            });
        }
        let mut raw = [0u8; 20];
        for (i, out) in raw.iter_mut().enumerate() {
            let hi = hex_value(hex[2 * i])?;
            let lo = hex_value(hex[2 * i + 1])?;
            *out = (hi << 4) | lo;
        }
        Ok(Self(raw))
    }

    /// Returns the raw identifier bytes.
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Returns the canonical 40-character lowercase hex form.
    #[must_use]
    pub fn to_hex(&self) -> String {
        self.to_string()
    }

    /// Returns the first identifier byte, the fanout bucket key.
    #[inline]
    #[must_use]
    pub const fn first_byte(&self) -> u8 {
        self.0[0]
    }
}

fn hex_value(byte: u8) -> Result<u8, IdError> {
    match byte {
        b'0'..=b'9' => Ok(byte - b'0'),
        b'a'..=b'f' => Ok(byte - b'a' + 10),
        b'A'..=b'F' => Ok(byte - b'A' + 10),
        _ => Err(IdError::InvalidHex { byte }),
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({self})")
    }
}
