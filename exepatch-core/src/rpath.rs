//! Library search paths as stored in DT_RPATH / DT_RUNPATH.
//!
//! Entries relative to the binary's own directory are written with the
//! `$ORIGIN` (or `${ORIGIN}`) prefix in the file. In an [`RPath`] they are kept
//! as plain relative paths (`$ORIGIN/../lib` becomes `../lib`, `$ORIGIN` becomes `.`).

use crate::error::{Error, Result};
use std::fmt;

const ORIGIN: &str = "$ORIGIN";
const ORIGIN_BRACED: &str = "${ORIGIN}";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RPathEntry {
    path: String,
}

impl RPathEntry {
    /// Returns `None` for a blank path.
    pub fn new(path: &str) -> Option<Self> {
        let path = path.trim();
        if path.is_empty() {
            return None;
        }
        Some(Self {
            path: path.to_string(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_relative(&self) -> bool {
        !self.path.starts_with('/')
    }

    fn parse(item: &str) -> Result<Self> {
        let item = item.trim();
        let relative = if let Some(rest) = item.strip_prefix(ORIGIN_BRACED) {
            Some((ORIGIN_BRACED, rest))
        } else {
            item.strip_prefix(ORIGIN).map(|rest| (ORIGIN, rest))
        };

        let path = match relative {
            Some((_, "")) => ".".to_string(),
            Some((_, rest)) if rest.starts_with('/') => {
                let rest = rest.trim_start_matches('/');
                if rest.is_empty() {
                    ".".to_string()
                } else {
                    rest.to_string()
                }
            }
            Some((variable, rest)) => {
                let found = rest.chars().next().unwrap_or_default();
                let reason = format!("expected '/' after {variable}, got '{found}'");
                return Err(Error::InvalidValue { reason });
            }
            None => item.to_string(),
        };
        Ok(Self { path })
    }

    fn to_elf_string(&self) -> String {
        if !self.is_relative() {
            return self.path.clone();
        }
        if self.path == "." {
            ORIGIN.to_string()
        } else if let Some(rest) = self.path.strip_prefix("./") {
            format!("{ORIGIN}/{rest}")
        } else {
            format!("{ORIGIN}/{}", self.path)
        }
    }
}

/// An ordered list of library search paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct RPath {
    entries: Vec<RPathEntry>,
}

impl RPath {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the `:`-separated form found in the dynamic string table.
    pub fn parse(value: &str) -> Result<Self> {
        let entries = value
            .split(':')
            .filter(|item| !item.trim().is_empty())
            .map(RPathEntry::parse)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { entries })
    }

    pub fn push(&mut self, entry: RPathEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[RPathEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render back to the `:`-separated form, re-adding `$ORIGIN` to relative entries.
    pub fn to_elf_string(&self) -> String {
        self.entries
            .iter()
            .map(RPathEntry::to_elf_string)
            .collect::<Vec<_>>()
            .join(":")
    }
}

impl fmt::Display for RPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_elf_string())
    }
}

impl FromIterator<RPathEntry> for RPath {
    fn from_iter<I: IntoIterator<Item = RPathEntry>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
