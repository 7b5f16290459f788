use crate::bytes::ByteSource;
use crate::error::{Error, Result};
use byteorder::{ByteOrder, LE};
use goblin::elf::header::{ELFMAG, SELFMAG};
use goblin::pe::header::{DOS_MAGIC, PE_MAGIC, PE_POINTER_OFFSET};
use std::fmt;

/// Bytes needed before a file can be classified; covers the ELF64 header and the DOS header.
pub const MIN_DETECT_LEN: u64 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Format {
    Elf,
    Pe,
    #[default]
    Unknown,
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Format::Elf => "ELF",
            Format::Pe => "PE",
            Format::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Classify `source` by its leading bytes.
///
/// Short input is reported as `TruncatedInput` so callers can tell "not enough
/// data yet" apart from `UnrecognizedFormat`.
pub fn detect<S: ByteSource + ?Sized>(source: &S) -> Result<Format> {
    let data = source.as_bytes();
    let available = data.len() as u64;
    if available < MIN_DETECT_LEN {
        return Err(Error::TruncatedInput {
            needed: MIN_DETECT_LEN,
            available,
        });
    }

    if &data[..SELFMAG] == ELFMAG {
        log::debug!("ELF magic found");
        return Ok(Format::Elf);
    }

    if LE::read_u16(&data[..2]) == DOS_MAGIC {
        let pointer = PE_POINTER_OFFSET as usize;
        let pe_offset = LE::read_u32(&data[pointer..pointer + 4]) as u64;
        let needed = pe_offset + 4;
        if needed > available {
            return Err(Error::TruncatedInput { needed, available });
        }
        let at = pe_offset as usize;
        if LE::read_u32(&data[at..at + 4]) == PE_MAGIC {
            log::debug!("PE signature found at {pe_offset:#x}");
            return Ok(Format::Pe);
        }
        log::debug!("MZ stub without PE signature at {pe_offset:#x}");
    }

    Err(Error::UnrecognizedFormat)
}
