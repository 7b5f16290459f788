use crate::bytes::ByteRange;
use crate::error::{Error, Result};
use crate::pe::header::LeCursor;

pub const SIZEOF_SECTION_HEADER: u64 = 40;

/// One section table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionHeader {
    /// Name bytes up to the first NUL. Long names (`/123`) are kept as written.
    pub name: String,
    pub virtual_size: u32,
    pub virtual_address: u32,
    pub size_of_raw_data: u32,
    pub pointer_to_raw_data: u32,
    pub pointer_to_relocations: u32,
    pub pointer_to_linenumbers: u32,
    pub number_of_relocations: u16,
    pub number_of_linenumbers: u16,
    pub characteristics: u32,
}

impl SectionHeader {
    pub(crate) fn parse(raw: &[u8], base: u64) -> Result<Self> {
        let name_bytes = raw
            .get(..8)
            .ok_or_else(|| Error::malformed_pe(base, "truncated section header"))?;
        let name_len = name_bytes.iter().position(|&b| b == 0).unwrap_or(8);
        let name = String::from_utf8_lossy(&name_bytes[..name_len]).into_owned();

        let mut cur = LeCursor::new(raw, base);
        cur.seek(8);
        Ok(Self {
            name,
            virtual_size: cur.u32()?,
            virtual_address: cur.u32()?,
            size_of_raw_data: cur.u32()?,
            pointer_to_raw_data: cur.u32()?,
            pointer_to_relocations: cur.u32()?,
            pointer_to_linenumbers: cur.u32()?,
            number_of_relocations: cur.u16()?,
            number_of_linenumbers: cur.u16()?,
            characteristics: cur.u32()?,
        })
    }

    /// Bytes of the section present in the file.
    pub fn raw_range(&self) -> ByteRange {
        if self.pointer_to_raw_data == 0 {
            return ByteRange::new(0, 0);
        }
        let offset = u64::from(self.pointer_to_raw_data);
        ByteRange::new(offset, u64::from(self.size_of_raw_data))
    }

    /// Size in memory; linkers that leave `VirtualSize` at zero mean the raw size.
    pub fn virtual_span(&self) -> u32 {
        if self.virtual_size == 0 {
            self.size_of_raw_data
        } else {
            self.virtual_size
        }
    }

    pub fn virtual_range(&self) -> ByteRange {
        let start = u64::from(self.virtual_address);
        ByteRange::new(start, u64::from(self.virtual_span()))
    }

    pub fn contains_rva(&self, rva: u32) -> bool {
        let start = u64::from(self.virtual_address);
        let rva = u64::from(rva);
        rva >= start && rva < start + u64::from(self.virtual_span())
    }
}

/// File offset of `rva`.
///
/// Exactly one section must contain it, and the byte must be backed by that
/// section's raw data rather than its zero-filled tail.
pub fn rva_to_offset(sections: &[SectionHeader], rva: u32) -> Result<u64> {
    let mut containing = sections.iter().filter(|s| s.contains_rva(rva));
    let section = containing
        .next()
        .ok_or_else(|| Error::malformed_pe(0, format!("RVA {rva:#x} is not inside any section")))?;
    if let Some(other) = containing.next() {
        let (first, second) = (&section.name, &other.name);
        let reason = format!("RVA {rva:#x} is inside both {first} and {second}");
        return Err(Error::malformed_pe(0, reason));
    }
    let delta = rva - section.virtual_address;
    if delta >= section.size_of_raw_data || section.pointer_to_raw_data == 0 {
        let name = &section.name;
        let reason = format!("RVA {rva:#x} falls in the uninitialized part of {name}");
        return Err(Error::malformed_pe(u64::from(section.pointer_to_raw_data), reason));
    }
    Ok(u64::from(section.pointer_to_raw_data) + u64::from(delta))
}
