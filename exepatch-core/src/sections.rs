use crate::bytes::ByteRange;
use crate::elf;
use crate::pe;

/// A section as both formats can describe it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    /// Virtual address (ELF `sh_addr`, PE `VirtualAddress` as an RVA).
    pub vma: u64,
    /// Size in memory.
    pub size: u64,
    pub file_offset: u64,
    /// Raw flags: ELF `sh_flags`, PE `Characteristics`.
    pub flags: u64,
    /// Bytes occupied in the file; empty for NOBITS and uninitialized sections.
    pub file_range: ByteRange,
}

impl From<&elf::SectionHeader> for Section {
    fn from(sh: &elf::SectionHeader) -> Self {
        Section {
            name: sh.name.clone(),
            vma: sh.sh_addr,
            size: sh.sh_size,
            file_offset: sh.sh_offset,
            flags: sh.sh_flags,
            file_range: sh.file_range(),
        }
    }
}

impl From<&pe::SectionHeader> for Section {
    fn from(sh: &pe::SectionHeader) -> Self {
        Section {
            name: sh.name.clone(),
            vma: u64::from(sh.virtual_address),
            size: u64::from(sh.virtual_span()),
            file_offset: u64::from(sh.pointer_to_raw_data),
            flags: u64::from(sh.characteristics),
            file_range: sh.raw_range(),
        }
    }
}
