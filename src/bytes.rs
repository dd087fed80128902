//! Read-only byte container for index data.
//!
//! `BytesView` lets the index reader hold either a memory mapping
//! (production) or owned in-memory bytes (tests) behind one type, keeping
//! zero-copy access on the lookup path. Clones are cheap: the backing
//! storage is reference-counted and treated as immutable for the lifetime
//! of any view.

use std::sync::Arc;

use memmap2::Mmap;

/// Read-only view over index bytes.
#[derive(Clone, Debug)]
pub struct BytesView {
    inner: BytesInner,
}

#[derive(Clone, Debug)]
enum BytesInner {
    Mmap(Arc<Mmap>),
    Owned(Arc<[u8]>),
}

impl BytesView {
    /// Wraps a memory-mapped file.
    #[must_use]
    pub fn from_mmap(mmap: Mmap) -> Self {
        Self {
            inner: BytesInner::Mmap(Arc::new(mmap)),
        }
    }

    /// Wraps owned bytes.
    #[must_use]
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self {
            inner: BytesInner::Owned(Arc::from(bytes)),
        }
    }

    /// Returns the underlying bytes as a slice.
    #[inline(always)]
    pub fn as_slice(&self) -> &[u8] {
        match &self.inner {
            BytesInner::Mmap(mmap) => mmap.as_ref(),
            BytesInner::Owned(bytes) => bytes.as_ref(),
        }
    }

    /// Returns the length of the byte view.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// Returns true if the view is empty.
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }
}

impl AsRef<[u8]> for BytesView {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}
