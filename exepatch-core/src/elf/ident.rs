//! Phase one of ELF parsing: the 16 identification bytes.
//!
//! Nothing past `e_ident` can be decoded before the class and data encoding
//! are known. [`Ident::parse`] reads only those fixed-position bytes and yields
//! a goblin [`Ctx`], and every later field goes through a [`FieldCursor`] built
//! from it, so the width/endianness decision is made in exactly one place.

use crate::error::{Error, Result};
use byteorder::{ReadBytesExt, BE, LE};
use goblin::elf::dynamic::Dyn;
use goblin::elf::header::{
    Header as RawHeader, EI_CLASS, EI_DATA, EI_OSABI, EI_VERSION, ELFCLASS32, ELFCLASS64,
    ELFDATA2LSB, ELFDATA2MSB, ELFMAG, EV_CURRENT, SELFMAG,
};
use goblin::elf::program_header::ProgramHeader as RawProgramHeader;
use goblin::elf::section_header::SectionHeader as RawSectionHeader;
use std::io::{self, Cursor};

pub use goblin::container::{Container, Ctx, Endian};

const EI_ABIVERSION: usize = 8;
pub const SIZEOF_IDENT: usize = 16;

/// On-disk sizes of the fixed ELF records for one class.
pub trait RecordSizes {
    fn header_size(&self) -> u64;
    fn program_header_size(&self) -> u64;
    fn section_header_size(&self) -> u64;
    fn dynamic_entry_size(&self) -> u64;
}

impl RecordSizes for Ctx {
    fn header_size(&self) -> u64 {
        RawHeader::size(*self) as u64
    }

    fn program_header_size(&self) -> u64 {
        RawProgramHeader::size(*self) as u64
    }

    fn section_header_size(&self) -> u64 {
        RawSectionHeader::size(*self) as u64
    }

    fn dynamic_entry_size(&self) -> u64 {
        Dyn::size(self.container) as u64
    }
}

/// `e_ident`, decoded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ident {
    pub ctx: Ctx,
    pub version: u8,
    pub os_abi: u8,
    pub abi_version: u8,
}

impl Ident {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < SIZEOF_IDENT {
            return Err(Error::TruncatedInput {
                needed: SIZEOF_IDENT as u64,
                available: data.len() as u64,
            });
        }
        if &data[..SELFMAG] != ELFMAG {
            return Err(Error::malformed_elf(0, "bad magic"));
        }
        let container = match data[EI_CLASS] {
            ELFCLASS32 => Container::Little,
            ELFCLASS64 => Container::Big,
            other => {
                let reason = format!("invalid class {other}");
                return Err(Error::malformed_elf(EI_CLASS as u64, reason));
            }
        };
        let endian = match data[EI_DATA] {
            ELFDATA2LSB => Endian::Little,
            ELFDATA2MSB => Endian::Big,
            other => {
                let reason = format!("invalid data encoding {other}");
                return Err(Error::malformed_elf(EI_DATA as u64, reason));
            }
        };
        let version = data[EI_VERSION];
        if version != EV_CURRENT {
            let reason = format!("unsupported ident version {version}");
            return Err(Error::malformed_elf(EI_VERSION as u64, reason));
        }
        Ok(Self {
            ctx: Ctx::new(container, endian),
            version,
            os_abi: data[EI_OSABI],
            abi_version: data[EI_ABIVERSION],
        })
    }
}

/// Sequential field reader over a slice, decoding with a fixed [`Ctx`].
///
/// Running past the end of the slice yields `MalformedElf` naming the file
/// offset `base + position`.
pub struct FieldCursor<'a> {
    inner: Cursor<&'a [u8]>,
    ctx: Ctx,
    base: u64,
}

impl<'a> FieldCursor<'a> {
    /// `base` is the file offset of `data[0]`, used for error reporting.
    pub fn new(data: &'a [u8], ctx: Ctx, base: u64) -> Self {
        Self {
            inner: Cursor::new(data),
            ctx,
            base,
        }
    }

    pub fn position(&self) -> u64 {
        self.base + self.inner.position()
    }

    fn check<T>(&self, what: &str, value: io::Result<T>) -> Result<T> {
        value.map_err(|_| {
            Error::malformed_elf(
                self.position(),
                format!("{what} runs past the end of its table"),
            )
        })
    }

    pub fn skip(&mut self, count: u64) {
        let pos = self.inner.position();
        self.inner.set_position(pos + count);
    }

    pub fn u8(&mut self) -> Result<u8> {
        let value = self.inner.read_u8();
        self.check("byte", value)
    }

    pub fn u16(&mut self) -> Result<u16> {
        let value = match self.ctx.le {
            Endian::Little => self.inner.read_u16::<LE>(),
            Endian::Big => self.inner.read_u16::<BE>(),
        };
        self.check("half word", value)
    }

    pub fn u32(&mut self) -> Result<u32> {
        let value = match self.ctx.le {
            Endian::Little => self.inner.read_u32::<LE>(),
            Endian::Big => self.inner.read_u32::<BE>(),
        };
        self.check("word", value)
    }

    pub fn u64(&mut self) -> Result<u64> {
        let value = match self.ctx.le {
            Endian::Little => self.inner.read_u64::<LE>(),
            Endian::Big => self.inner.read_u64::<BE>(),
        };
        self.check("double word", value)
    }

    /// An address, offset or size: 4 bytes for ELF32, 8 for ELF64.
    pub fn word(&mut self) -> Result<u64> {
        match self.ctx.container {
            Container::Little => self.u32().map(u64::from),
            Container::Big => self.u64(),
        }
    }
}
