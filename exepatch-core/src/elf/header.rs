use crate::elf::ident::{Ctx, FieldCursor, Ident, RecordSizes};
use crate::error::{Error, Result};
use crate::header::Header;
use goblin::elf::header::{ET_DYN, ET_EXEC};

/// Section index meaning "the real value lives in section header 0".
pub const SHN_XINDEX: u16 = 0xffff;
/// Program header count meaning "the real count lives in section header 0".
pub const PN_XNUM: u16 = 0xffff;

/// The ELF file header (`Elf32_Ehdr` / `Elf64_Ehdr`), decoded to native integers.
///
/// It appears at the very beginning of every ELF file and describes where the
/// program header and section header tables live.
///
/// Reference: [ELF Specification v1.2](https://refspecs.linuxfoundation.org/elf/elf.pdf)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElfHeader {
    /// Decoded identification bytes (class, data encoding, OS/ABI).
    pub ident: Ident,

    /// Object file type.
    ///
    /// Common values:
    /// - `ET_REL` (1): Relocatable file
    /// - `ET_EXEC` (2): Executable file
    /// - `ET_DYN` (3): Shared object or position independent executable
    pub e_type: u16,

    /// Target architecture, e.g. `EM_X86_64` (62) or `EM_AARCH64` (183).
    pub e_machine: u16,

    /// Object file version, normally `EV_CURRENT` (1).
    pub e_version: u32,

    /// Virtual address of the program entry point.
    pub e_entry: u64,

    /// File offset of the program header table.
    pub e_phoff: u64,

    /// File offset of the section header table.
    pub e_shoff: u64,

    /// Processor-specific flags.
    pub e_flags: u32,

    /// Size of this header (52 for ELF32, 64 for ELF64).
    pub e_ehsize: u16,

    /// Size of one entry in the program header table.
    pub e_phentsize: u16,

    /// Number of entries in the program header table, or `PN_XNUM`.
    pub e_phnum: u16,

    /// Size of one entry in the section header table.
    pub e_shentsize: u16,

    /// Number of entries in the section header table, or 0 with extended numbering.
    pub e_shnum: u16,

    /// Index of the section header string table, or `SHN_XINDEX`.
    pub e_shstrndx: u16,
}

impl ElfHeader {
    /// Phase two: decode the rest of the header with the strategy from `ident`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let ident = Ident::parse(data)?;
        let ctx = ident.ctx;
        let needed = ctx.header_size();
        if (data.len() as u64) < needed {
            return Err(Error::TruncatedInput {
                needed,
                available: data.len() as u64,
            });
        }

        let mut cur = FieldCursor::new(&data[..needed as usize], ctx, 0);
        cur.skip(16);
        let header = ElfHeader {
            ident,
            e_type: cur.u16()?,
            e_machine: cur.u16()?,
            e_version: cur.u32()?,
            e_entry: cur.word()?,
            e_phoff: cur.word()?,
            e_shoff: cur.word()?,
            e_flags: cur.u32()?,
            e_ehsize: cur.u16()?,
            e_phentsize: cur.u16()?,
            e_phnum: cur.u16()?,
            e_shentsize: cur.u16()?,
            e_shnum: cur.u16()?,
            e_shstrndx: cur.u16()?,
        };
        header.check_entry_sizes()?;
        Ok(header)
    }

    pub fn ctx(&self) -> Ctx {
        self.ident.ctx
    }

    fn check_entry_sizes(&self) -> Result<()> {
        let ctx = self.ctx();
        let expected = ctx.header_size();
        if u64::from(self.e_ehsize) != expected {
            let reason = format!("e_ehsize {} should be {expected}", self.e_ehsize);
            return Err(Error::malformed_elf(0, reason));
        }
        let expected = ctx.program_header_size();
        if self.e_phnum != 0 && u64::from(self.e_phentsize) != expected {
            let reason = format!("e_phentsize {} should be {expected}", self.e_phentsize);
            return Err(Error::malformed_elf(self.e_phoff, reason));
        }
        let expected = ctx.section_header_size();
        let has_sections = self.e_shnum != 0 || self.e_shoff != 0;
        if has_sections && u64::from(self.e_shentsize) != expected {
            let reason = format!("e_shentsize {} should be {expected}", self.e_shentsize);
            return Err(Error::malformed_elf(self.e_shoff, reason));
        }
        Ok(())
    }
}

impl Header for ElfHeader {
    fn entry_point(&self) -> u64 {
        self.e_entry
    }

    fn machine(&self) -> u16 {
        self.e_machine
    }

    fn is_64(&self) -> bool {
        self.ctx().is_big()
    }

    fn format_name(&self) -> &'static str {
        "ELF"
    }

    fn is_executable(&self) -> bool {
        self.e_type == ET_EXEC
    }

    fn is_executable_or_shared_library(&self) -> bool {
        self.e_type == ET_EXEC || self.e_type == ET_DYN
    }
}
