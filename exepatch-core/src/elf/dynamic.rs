use crate::bytes::ByteRange;
use crate::elf::ident::{Container, Ctx, Endian, FieldCursor, RecordSizes};
use crate::elf::string_table::StringTable;
use crate::error::Result;
use byteorder::{ByteOrder, BE, LE};
use goblin::elf::dynamic::{
    DT_NEEDED, DT_NULL, DT_RPATH, DT_RUNPATH, DT_SONAME, DT_STRSZ, DT_STRTAB,
};

/// Tag written over a removed entry.
///
/// DT_NULL would end the array and hide every later entry. The first tag of
/// the OS-specific range (DT_LOOS) is not interpreted by glibc or musl.
pub const DT_REMOVED: u64 = 0x6000_000d;

/// One `(d_tag, d_val)` pair of the dynamic array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DynamicEntry {
    /// Position in the dynamic array.
    pub index: usize,
    pub tag: u64,
    pub value: u64,
}

impl DynamicEntry {
    pub fn tag_name(&self) -> &'static str {
        match self.tag {
            DT_NULL => "NULL",
            DT_NEEDED => "NEEDED",
            DT_STRTAB => "STRTAB",
            DT_STRSZ => "STRSZ",
            DT_SONAME => "SONAME",
            DT_RPATH => "RPATH",
            DT_RUNPATH => "RUNPATH",
            DT_REMOVED => "REMOVED",
            _ => "OTHER",
        }
    }

    /// Tags whose value is an offset into the dynamic string table.
    pub fn refers_to_string(&self) -> bool {
        matches!(self.tag, DT_NEEDED | DT_SONAME | DT_RPATH | DT_RUNPATH)
    }
}

/// How the dynamic string table was located.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringTableSource {
    /// DT_STRTAB mapped through the LOAD segment containing it.
    Segment { vaddr: u64, segment: usize },
    /// The `sh_link` section of the SHT_DYNAMIC section.
    Section { index: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicSection {
    /// The whole dynamic array as declared by its segment or section.
    pub range: ByteRange,
    pub entry_size: u64,
    /// Entries before the first DT_NULL.
    pub entries: Vec<DynamicEntry>,
    pub strtab: Option<StringTable>,
    pub strtab_source: Option<StringTableSource>,
}

impl DynamicSection {
    /// Walk the array in `data` (the bytes of `range`) until DT_NULL or the end.
    pub fn parse(data: &[u8], range: ByteRange, ctx: Ctx) -> Result<Self> {
        let entry_size = ctx.dynamic_entry_size();
        let slots = data.len() as u64 / entry_size;
        let mut cur = FieldCursor::new(data, ctx, range.offset);
        let mut entries = Vec::new();
        for index in 0..slots as usize {
            let tag = cur.word()?;
            let value = cur.word()?;
            if tag == DT_NULL {
                break;
            }
            entries.push(DynamicEntry { index, tag, value });
        }
        Ok(Self {
            range,
            entry_size,
            entries,
            strtab: None,
            strtab_source: None,
        })
    }

    pub fn entry_range(&self, entry: &DynamicEntry) -> ByteRange {
        ByteRange::new(
            self.range.offset + entry.index as u64 * self.entry_size,
            self.entry_size,
        )
    }

    pub fn find(&self, tag: u64) -> Option<&DynamicEntry> {
        self.entries.iter().find(|e| e.tag == tag)
    }

    pub fn find_all(&self, tag: u64) -> impl Iterator<Item = &DynamicEntry> {
        self.entries.iter().filter(move |e| e.tag == tag)
    }

    pub(crate) fn entry_mut(&mut self, index: usize) -> Option<&mut DynamicEntry> {
        self.entries.iter_mut().find(|e| e.index == index)
    }

    pub fn string_table_address(&self) -> Option<u64> {
        self.find(DT_STRTAB).map(|e| e.value)
    }

    pub fn string_table_size(&self) -> Option<u64> {
        self.find(DT_STRSZ).map(|e| e.value)
    }
}

/// Encode one `(d_tag, d_val)` pair in the class and byte order of `ctx`.
pub fn encode_entry(ctx: Ctx, tag: u64, value: u64) -> Vec<u8> {
    let mut buf = [0u8; 16];
    let word = ctx.size();
    for (slot, field) in buf.chunks_exact_mut(word).zip([tag, value]) {
        match (ctx.container, ctx.le) {
            (Container::Little, Endian::Little) => LE::write_u32(slot, field as u32),
            (Container::Little, Endian::Big) => BE::write_u32(slot, field as u32),
            (Container::Big, Endian::Little) => LE::write_u64(slot, field),
            (Container::Big, Endian::Big) => BE::write_u64(slot, field),
        }
    }
    buf[..2 * word].to_vec()
}
