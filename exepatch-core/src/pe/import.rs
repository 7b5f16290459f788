//! Import and delay-load import directories.
//!
//! Both are arrays of fixed-size descriptors ending with an all-zero one.
//! Only the DLL names are interpreted; thunk tables are left alone.

use crate::bytes::{c_str_len, ByteRange};
use crate::error::{Error, Result};
use crate::pe::header::{DataDirectory, LeCursor};
use crate::pe::section::{rva_to_offset, SectionHeader};

pub const SIZEOF_IMPORT_DESCRIPTOR: u64 = 20;
pub const SIZEOF_DELAY_DESCRIPTOR: u64 = 32;

/// One `IMAGE_IMPORT_DESCRIPTOR`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportDirectoryEntry {
    /// File offset of the descriptor itself.
    pub descriptor_offset: u64,
    pub original_first_thunk: u32,
    pub time_date_stamp: u32,
    pub forwarder_chain: u32,
    pub name_rva: u32,
    pub first_thunk: u32,
    /// The DLL name in the file, terminator included.
    pub name_range: ByteRange,
}

/// One `IMAGE_DELAYLOAD_DESCRIPTOR`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelayLoadEntry {
    pub descriptor_offset: u64,
    pub attributes: u32,
    pub name_rva: u32,
    pub module_handle_rva: u32,
    pub import_address_table_rva: u32,
    pub import_name_table_rva: u32,
    pub bound_import_address_table_rva: u32,
    pub unload_information_table_rva: u32,
    pub time_date_stamp: u32,
    pub name_range: ByteRange,
}

/// Find the NUL-terminated DLL name at `rva`.
fn resolve_name(
    data: &[u8],
    sections: &[SectionHeader],
    rva: u32,
    descriptor_offset: u64,
) -> Result<ByteRange> {
    if rva == 0 {
        return Err(Error::malformed_pe(descriptor_offset, "descriptor has no DLL name"));
    }
    let offset = rva_to_offset(sections, rva)?;
    let tail = data
        .get(offset as usize..)
        .ok_or_else(|| Error::malformed_pe(offset, "DLL name lies outside the file"))?;
    let Some(len) = c_str_len(tail) else {
        return Err(Error::malformed_pe(offset, "DLL name is not NUL-terminated"));
    };
    Ok(ByteRange::new(offset, len as u64 + 1))
}

/// `size`-byte descriptors from `directory` up to the all-zero terminator,
/// each with its file offset.
fn descriptors<'a>(
    data: &'a [u8],
    sections: &[SectionHeader],
    directory: DataDirectory,
    size: u64,
) -> Result<Vec<(u64, &'a [u8])>> {
    let start = rva_to_offset(sections, directory.virtual_address)?;
    let mut table = Vec::new();
    let mut offset = start;
    loop {
        let end = offset + size;
        let Some(raw) = data.get(offset as usize..end as usize) else {
            let reason = format!("descriptor table is not terminated before {offset:#x}");
            return Err(Error::malformed_pe(start, reason));
        };
        if raw.iter().all(|&b| b == 0) {
            return Ok(table);
        }
        table.push((offset, raw));
        offset = end;
    }
}

pub fn parse_imports(
    data: &[u8],
    sections: &[SectionHeader],
    directory: DataDirectory,
) -> Result<Vec<ImportDirectoryEntry>> {
    let table = descriptors(data, sections, directory, SIZEOF_IMPORT_DESCRIPTOR)?;
    let mut entries = Vec::with_capacity(table.len());
    for (descriptor_offset, raw) in table {
        let mut cur = LeCursor::new(raw, descriptor_offset);
        let original_first_thunk = cur.u32()?;
        let time_date_stamp = cur.u32()?;
        let forwarder_chain = cur.u32()?;
        let name_rva = cur.u32()?;
        let first_thunk = cur.u32()?;
        let name_range = resolve_name(data, sections, name_rva, descriptor_offset)?;
        entries.push(ImportDirectoryEntry {
            descriptor_offset,
            original_first_thunk,
            time_date_stamp,
            forwarder_chain,
            name_rva,
            first_thunk,
            name_range,
        });
    }
    Ok(entries)
}

pub fn parse_delay_imports(
    data: &[u8],
    sections: &[SectionHeader],
    directory: DataDirectory,
) -> Result<Vec<DelayLoadEntry>> {
    let table = descriptors(data, sections, directory, SIZEOF_DELAY_DESCRIPTOR)?;
    let mut entries = Vec::with_capacity(table.len());
    for (descriptor_offset, raw) in table {
        let mut cur = LeCursor::new(raw, descriptor_offset);
        let attributes = cur.u32()?;
        let name_rva = cur.u32()?;
        entries.push(DelayLoadEntry {
            descriptor_offset,
            attributes,
            name_rva,
            module_handle_rva: cur.u32()?,
            import_address_table_rva: cur.u32()?,
            import_name_table_rva: cur.u32()?,
            bound_import_address_table_rva: cur.u32()?,
            unload_information_table_rva: cur.u32()?,
            time_date_stamp: cur.u32()?,
            name_range: resolve_name(data, sections, name_rva, descriptor_offset)?,
        });
    }
    Ok(entries)
}
