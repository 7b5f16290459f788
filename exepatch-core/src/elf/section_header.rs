use crate::bytes::ByteRange;
use crate::elf::ident::FieldCursor;
use crate::error::Result;
use goblin::elf::section_header::SHT_NOBITS;

/// One section header table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionHeader {
    /// Offset of the name in the section header string table.
    pub sh_name: u32,
    /// Resolved name; empty until the string table has been read.
    pub name: String,
    pub sh_type: u32,
    pub sh_flags: u64,
    pub sh_addr: u64,
    pub sh_offset: u64,
    pub sh_size: u64,
    pub sh_link: u32,
    pub sh_info: u32,
    pub sh_addralign: u64,
    pub sh_entsize: u64,
}

impl SectionHeader {
    pub fn parse(cur: &mut FieldCursor<'_>) -> Result<Self> {
        Ok(Self {
            sh_name: cur.u32()?,
            name: String::new(),
            sh_type: cur.u32()?,
            sh_flags: cur.word()?,
            sh_addr: cur.word()?,
            sh_offset: cur.word()?,
            sh_size: cur.word()?,
            sh_link: cur.u32()?,
            sh_info: cur.u32()?,
            sh_addralign: cur.word()?,
            sh_entsize: cur.word()?,
        })
    }

    /// NOBITS sections occupy no file space.
    pub fn occupies_file(&self) -> bool {
        self.sh_type != SHT_NOBITS
    }

    pub fn file_range(&self) -> ByteRange {
        if self.occupies_file() {
            ByteRange::new(self.sh_offset, self.sh_size)
        } else {
            ByteRange::new(self.sh_offset, 0)
        }
    }
}
