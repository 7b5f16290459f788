//! Staged edits.
//!
//! An edit never touches the original bytes. It records the range it replaces
//! and the full replacement content (already NUL padded to the range length),
//! keyed by what it targets so that editing the same field twice replaces the
//! earlier value instead of stacking.

use crate::bytes::ByteRange;
use crate::error::{Error, Result};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

/// What a staged edit rewrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EditTarget {
    /// The PT_INTERP segment content.
    Interpreter,
    /// A string of the dynamic string table, by file offset.
    DynamicString { offset: u64 },
    /// One dynamic entry, by its index in the dynamic array.
    DynamicEntry { index: usize },
    /// A DLL name referenced by an import or delay-load descriptor, by file offset.
    DllName { offset: u64 },
    /// Arbitrary bytes. Only reachable from tests, to fake a buggy editor.
    #[cfg(test)]
    Raw { offset: u64 },
}

impl fmt::Display for EditTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditTarget::Interpreter => f.write_str("interpreter"),
            EditTarget::DynamicString { offset } => write!(f, "dynamic string at {offset:#x}"),
            EditTarget::DynamicEntry { index } => write!(f, "dynamic entry #{index}"),
            EditTarget::DllName { offset } => write!(f, "DLL name at {offset:#x}"),
            #[cfg(test)]
            EditTarget::Raw { offset } => write!(f, "raw bytes at {offset:#x}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub target: EditTarget,
    pub range: ByteRange,
    pub bytes: Vec<u8>,
}

impl Edit {
    /// `value` followed by NUL bytes up to `range.len`.
    ///
    /// Fails with `InsufficientSpace` when `value` plus its terminator does not fit.
    pub fn padded_string(target: EditTarget, range: ByteRange, value: &str) -> Result<Self> {
        if value.as_bytes().contains(&0) {
            return Err(Error::InvalidValue {
                reason: format!("{target}: value contains a NUL byte"),
            });
        }
        let required = value.len() as u64 + 1;
        if required > range.len {
            return Err(Error::InsufficientSpace {
                field: target.to_string(),
                required,
                capacity: range.len,
            });
        }
        let mut bytes = vec![0u8; range.len as usize];
        bytes[..value.len()].copy_from_slice(value.as_bytes());
        Ok(Self {
            target,
            range,
            bytes,
        })
    }
}

/// Edits accumulated on a model, applied in one pass by the serializer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditSet {
    edits: BTreeMap<EditTarget, Edit>,
}

impl EditSet {
    pub fn stage(&mut self, edit: Edit) {
        debug_assert_eq!(edit.bytes.len() as u64, edit.range.len);
        log::debug!("staging {} over {}", edit.target, edit.range);
        self.edits.insert(edit.target, edit);
    }

    pub fn get(&self, target: &EditTarget) -> Option<&Edit> {
        self.edits.get(target)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Edit> {
        self.edits.values()
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// The bytes of `range` as they will be serialized.
    pub fn overlay<'a>(&self, original: &'a [u8], range: ByteRange) -> Cow<'a, [u8]> {
        let touching: Vec<&Edit> = self
            .edits
            .values()
            .filter(|e| e.range.overlaps(&range))
            .collect();
        if touching.is_empty() {
            return Cow::Borrowed(original);
        }
        let mut bytes = original.to_vec();
        for edit in touching {
            let start = edit.range.offset.max(range.offset);
            let limit = range.offset + bytes.len() as u64;
            let end = edit.range.end().unwrap_or(u64::MAX).min(limit);
            if start >= end {
                continue;
            }
            let src = (start - edit.range.offset) as usize..(end - edit.range.offset) as usize;
            let dst = (start - range.offset) as usize..(end - range.offset) as usize;
            bytes[dst].copy_from_slice(&edit.bytes[src]);
        }
        Cow::Owned(bytes)
    }

    /// Reject edits that step on each other; applying them would depend on order.
    pub fn check_disjoint(&self) -> Result<()> {
        let mut sorted: Vec<&Edit> = self
            .edits
            .values()
            .filter(|e| !e.range.is_empty())
            .collect();
        sorted.sort_by_key(|e| e.range.offset);
        for pair in sorted.windows(2) {
            if pair[0].range.overlaps(&pair[1].range) {
                return Err(Error::violation(
                    pair[1].target.to_string(),
                    pair[1].range.offset,
                    format!("edit overlaps {} {}", pair[0].target, pair[0].range),
                ));
            }
        }
        Ok(())
    }
}
