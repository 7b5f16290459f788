use crate::bytes::ByteRange;
use crate::elf::ident::{Container, Ctx, FieldCursor};
use crate::error::Result;
use goblin::elf::program_header::{
    PT_DYNAMIC, PT_INTERP, PT_LOAD, PT_NOTE, PT_NULL, PT_PHDR, PT_TLS,
};

/// One program header table entry (a segment).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramHeader {
    pub p_type: u32,
    pub p_flags: u32,
    pub p_offset: u64,
    pub p_vaddr: u64,
    pub p_paddr: u64,
    pub p_filesz: u64,
    pub p_memsz: u64,
    pub p_align: u64,
}

impl ProgramHeader {
    /// Decode one entry. The field order differs between classes: ELF64 moves
    /// `p_flags` up next to `p_type` for alignment.
    pub fn parse(cur: &mut FieldCursor<'_>, ctx: Ctx) -> Result<Self> {
        let p_type = cur.u32()?;
        match ctx.container {
            Container::Little => {
                let p_offset = cur.word()?;
                let p_vaddr = cur.word()?;
                let p_paddr = cur.word()?;
                let p_filesz = cur.word()?;
                let p_memsz = cur.word()?;
                let p_flags = cur.u32()?;
                let p_align = cur.word()?;
                Ok(Self {
                    p_type,
                    p_flags,
                    p_offset,
                    p_vaddr,
                    p_paddr,
                    p_filesz,
                    p_memsz,
                    p_align,
                })
            }
            Container::Big => Ok(Self {
                p_type,
                p_flags: cur.u32()?,
                p_offset: cur.word()?,
                p_vaddr: cur.word()?,
                p_paddr: cur.word()?,
                p_filesz: cur.word()?,
                p_memsz: cur.word()?,
                p_align: cur.word()?,
            }),
        }
    }

    pub fn file_range(&self) -> ByteRange {
        ByteRange::new(self.p_offset, self.p_filesz)
    }

    /// `[p_vaddr, p_vaddr + p_memsz)` expressed as a range.
    pub fn memory_range(&self) -> ByteRange {
        ByteRange::new(self.p_vaddr, self.p_memsz)
    }

    pub fn is_load(&self) -> bool {
        self.p_type == PT_LOAD
    }

    /// File offset backing virtual address `vaddr`, if `len` bytes from it
    /// are all present in this segment's file image.
    pub fn vaddr_to_offset(&self, vaddr: u64, len: u64) -> Option<u64> {
        if !self.is_load() || vaddr < self.p_vaddr {
            return None;
        }
        let delta = vaddr - self.p_vaddr;
        if delta.checked_add(len)? > self.p_filesz {
            return None;
        }
        self.p_offset.checked_add(delta)
    }

    pub fn type_name(&self) -> &'static str {
        match self.p_type {
            PT_NULL => "NULL",
            PT_LOAD => "LOAD",
            PT_DYNAMIC => "DYNAMIC",
            PT_INTERP => "INTERP",
            PT_NOTE => "NOTE",
            PT_PHDR => "PHDR",
            PT_TLS => "TLS",
            _ => "OTHER",
        }
    }
}
