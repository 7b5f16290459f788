use crate::bytes::{c_str_len, ByteRange};
use crate::error::{Error, Result};

/// A region of NUL-terminated strings, addressed by byte offset from its start.
///
/// Holds only the location; the bytes are looked up in the file on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StringTable {
    pub range: ByteRange,
}

impl StringTable {
    pub fn new(range: ByteRange) -> Self {
        Self { range }
    }

    /// File span of the string at `index`, terminator included.
    ///
    /// `table` must be the bytes of `self.range`.
    pub fn entry_range(&self, table: &[u8], index: u64) -> Result<ByteRange> {
        let offset = self.range.offset;
        let start = match usize::try_from(index) {
            Ok(start) if start < table.len() => start,
            _ => {
                let reason = format!("string index {index:#x} is outside the table");
                return Err(Error::malformed_elf(offset, reason));
            }
        };
        let Some(len) = c_str_len(&table[start..]) else {
            let reason = "string is not NUL-terminated inside its table";
            return Err(Error::malformed_elf(offset + index, reason));
        };
        Ok(ByteRange::new(offset + index, len as u64 + 1))
    }

    /// The string at `index`, lossily decoded.
    pub fn get(&self, table: &[u8], index: u64) -> Result<String> {
        let entry = self.entry_range(table, index)?;
        let start = (entry.offset - self.range.offset) as usize;
        let end = start + entry.len as usize - 1;
        Ok(String::from_utf8_lossy(&table[start..end]).into_owned())
    }
}
