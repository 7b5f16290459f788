//! Raw file bytes and the `(offset, length)` ranges the models use to refer to them.
//!
//! Models never hold references into the buffer. They keep [`ByteRange`]s and
//! resolve them against whatever [`ByteSource`] the caller hands in, so the
//! buffer can be moved or reallocated freely.

use crate::error::{Error, Result};
use std::fmt;
use std::path::Path;

/// A half-open byte span `[offset, offset + len)` inside a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ByteRange {
    pub offset: u64,
    pub len: u64,
}

impl ByteRange {
    pub const fn new(offset: u64, len: u64) -> Self {
        Self { offset, len }
    }

    /// End offset, or `None` when `offset + len` overflows.
    pub fn end(&self) -> Option<u64> {
        self.offset.checked_add(self.len)
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True when the whole range lies inside a file of `file_len` bytes.
    pub fn fits_in(&self, file_len: u64) -> bool {
        matches!(self.end(), Some(end) if end <= file_len)
    }

    pub fn contains(&self, other: &ByteRange) -> bool {
        match (self.end(), other.end()) {
            (Some(end), Some(other_end)) => other.offset >= self.offset && other_end <= end,
            _ => false,
        }
    }

    /// Empty ranges never overlap anything.
    pub fn overlaps(&self, other: &ByteRange) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        let end = self.end().unwrap_or(u64::MAX);
        let other_end = other.end().unwrap_or(u64::MAX);
        self.offset < other_end && other.offset < end
    }

    pub(crate) fn as_usize(&self) -> Option<std::ops::Range<usize>> {
        let start = usize::try_from(self.offset).ok()?;
        let end = usize::try_from(self.end()?).ok()?;
        Some(start..end)
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:#x}, +{:#x})", self.offset, self.len)
    }
}

/// Read-only random access over a file's bytes.
pub trait ByteSource {
    fn as_bytes(&self) -> &[u8];

    fn len(&self) -> u64 {
        self.as_bytes().len() as u64
    }

    fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    /// Borrow `range`, failing with `TruncatedInput` when it runs past the end.
    fn read(&self, range: ByteRange) -> Result<&[u8]> {
        let data = self.as_bytes();
        match range.as_usize() {
            Some(r) if r.end <= data.len() => Ok(&data[r]),
            _ => Err(Error::TruncatedInput {
                needed: range.end().unwrap_or(u64::MAX),
                available: data.len() as u64,
            }),
        }
    }
}

/// The writable counterpart of [`ByteSource`]. Writes never change the length.
pub trait ByteSink: ByteSource {
    fn as_bytes_mut(&mut self) -> &mut [u8];

    fn write_at(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        let range = ByteRange::new(offset, bytes.len() as u64);
        let available = self.len();
        match range.as_usize() {
            Some(r) if (r.end as u64) <= available => {
                self.as_bytes_mut()[r].copy_from_slice(bytes);
                Ok(())
            }
            _ => Err(Error::TruncatedInput {
                needed: range.end().unwrap_or(u64::MAX),
                available,
            }),
        }
    }
}

impl ByteSource for [u8] {
    fn as_bytes(&self) -> &[u8] {
        self
    }
}

impl ByteSource for Vec<u8> {
    fn as_bytes(&self) -> &[u8] {
        self
    }
}

impl ByteSink for Vec<u8> {
    fn as_bytes_mut(&mut self) -> &mut [u8] {
        self
    }
}

/// The whole content of one executable file, owned by a single session.
#[derive(Clone, PartialEq, Eq)]
pub struct RawFile {
    data: Vec<u8>,
}

impl RawFile {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read(&path)?;
        log::debug!("loaded {} ({} bytes)", path.as_ref().display(), data.len());
        Ok(Self { data })
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

impl fmt::Debug for RawFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawFile")
            .field("len", &self.data.len())
            .finish()
    }
}

impl From<Vec<u8>> for RawFile {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl From<&[u8]> for RawFile {
    fn from(data: &[u8]) -> Self {
        Self::new(data.to_vec())
    }
}

impl ByteSource for RawFile {
    fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl ByteSink for RawFile {
    fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// Length of the NUL-terminated string starting at the beginning of `bytes`,
/// or `None` when no terminator is found.
pub(crate) fn c_str_len(bytes: &[u8]) -> Option<usize> {
    bytes.iter().position(|&b| b == 0)
}
