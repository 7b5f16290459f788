use crate::bytes::{c_str_len, ByteRange};
use crate::detect::Format;
use crate::edit::EditSet;
use crate::elf::dynamic::{DynamicSection, StringTableSource};
use crate::elf::header::{ElfHeader, PN_XNUM, SHN_XINDEX};
use crate::elf::ident::{FieldCursor, RecordSizes};
use crate::elf::program_header::ProgramHeader;
use crate::elf::section_header::SectionHeader;
use crate::elf::string_table::StringTable;
use crate::error::{Error, Result};
use crate::header::Header;
use crate::layout;
use crate::model::ExecutableModel;
use crate::platform::{OperatingSystem, Platform, ProcessorIsa};
use crate::rpath::RPath;
use crate::sections::Section;
use goblin::elf::dynamic::{DT_NEEDED, DT_RPATH, DT_RUNPATH, DT_SONAME};
use goblin::elf::header::{ELFOSABI_LINUX, ELFOSABI_SYSV, EM_386, EM_AARCH64, EM_ARM, EM_X86_64};
use goblin::elf::program_header::{PT_DYNAMIC, PT_INTERP};
use goblin::elf::section_header::SHT_DYNAMIC;
use std::borrow::Cow;

/// Everything the engine understands about one ELF file.
///
/// All locations are [`ByteRange`]s into the original bytes; the model never
/// owns or borrows the file. Edits are staged in `edits` and observed by the
/// query methods, which therefore take the original bytes as an argument.
#[derive(Debug, Clone)]
pub struct ElfModel {
    pub header: ElfHeader,
    pub program_headers: Vec<ProgramHeader>,
    pub section_headers: Vec<SectionHeader>,
    /// Index of the section header string table, after extended numbering.
    pub shstrndx: Option<usize>,
    pub dynamic: Option<DynamicSection>,
    /// File range of the PT_INTERP segment.
    pub interpreter: Option<ByteRange>,
    pub file_len: u64,
    pub(crate) edits: EditSet,
}

fn table_range(
    offset: u64,
    count: u64,
    entry_size: u64,
    what: &str,
    file_len: u64,
) -> Result<ByteRange> {
    let len = count
        .checked_mul(entry_size)
        .ok_or_else(|| Error::malformed_elf(offset, format!("{what} size overflows")))?;
    let range = ByteRange::new(offset, len);
    if !range.fits_in(file_len) {
        let reason = format!("{what} of {count} x {entry_size} bytes exceeds the file");
        return Err(Error::malformed_elf(offset, reason));
    }
    Ok(range)
}

fn slice<'a>(data: &'a [u8], range: ByteRange, what: &str) -> Result<&'a [u8]> {
    match range.as_usize().and_then(|r| data.get(r)) {
        Some(bytes) => Ok(bytes),
        None => {
            let reason = format!("{what} {range} lies outside the file");
            Err(Error::malformed_elf(range.offset, reason))
        }
    }
}

impl ElfModel {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let header = ElfHeader::parse(data)?;
        let ctx = header.ctx();
        let file_len = data.len() as u64;
        let sh_size = ctx.section_header_size();

        let section_zero = if header.e_shoff != 0 {
            let what = "section header 0";
            let range = table_range(header.e_shoff, 1, sh_size, what, file_len)?;
            let mut cur = FieldCursor::new(slice(data, range, what)?, ctx, range.offset);
            Some(SectionHeader::parse(&mut cur)?)
        } else {
            None
        };

        let mut section_headers = Vec::new();
        if let Some(zero) = &section_zero {
            let count = match header.e_shnum {
                0 => zero.sh_size,
                n => u64::from(n),
            };
            let what = "section header table";
            let range = table_range(header.e_shoff, count, sh_size, what, file_len)?;
            let mut cur = FieldCursor::new(slice(data, range, what)?, ctx, range.offset);
            for _ in 0..count {
                section_headers.push(SectionHeader::parse(&mut cur)?);
            }
        } else if header.e_shnum != 0 {
            return Err(Error::malformed_elf(0, "e_shnum is set but e_shoff is zero"));
        }

        let phnum = match (header.e_phnum, &section_zero) {
            (PN_XNUM, Some(zero)) => u64::from(zero.sh_info),
            (count, _) => u64::from(count),
        };
        let mut program_headers = Vec::new();
        if phnum > 0 {
            let what = "program header table";
            let ph_size = ctx.program_header_size();
            let range = table_range(header.e_phoff, phnum, ph_size, what, file_len)?;
            let mut cur = FieldCursor::new(slice(data, range, what)?, ctx, range.offset);
            for _ in 0..phnum {
                program_headers.push(ProgramHeader::parse(&mut cur, ctx)?);
            }
        }

        let shstrndx = match (header.e_shstrndx, &section_zero) {
            (0, _) | (_, None) => None,
            (SHN_XINDEX, Some(zero)) => Some(zero.sh_link as usize),
            (index, Some(_)) => Some(index as usize),
        };
        if let Some(index) = shstrndx {
            resolve_section_names(data, &mut section_headers, index, header.e_shoff)?;
        }

        check_load_overlaps(&program_headers)?;
        let interpreter = find_interpreter(data, &program_headers)?;
        let dynamic = find_dynamic(data, &program_headers, &section_headers, &header)?;

        let model = ElfModel {
            header,
            program_headers,
            section_headers,
            shstrndx,
            dynamic,
            interpreter,
            file_len,
            edits: EditSet::default(),
        };
        log::debug!(
            "parsed ELF: {} program headers, {} sections, dynamic entries: {}",
            model.program_headers.len(),
            model.section_headers.len(),
            model.dynamic.as_ref().map_or(0, |d| d.entries.len())
        );
        Ok(model)
    }

    pub fn edits(&self) -> &EditSet {
        &self.edits
    }

    /// Bytes of `range` as they will be serialized.
    fn view<'a>(&self, data: &'a [u8], range: ByteRange, what: &str) -> Result<Cow<'a, [u8]>> {
        Ok(self.edits.overlay(slice(data, range, what)?, range))
    }

    /// The dynamic string table and its original bytes.
    pub(crate) fn dynamic_strtab<'a>(&self, data: &'a [u8]) -> Result<(StringTable, &'a [u8])> {
        let strtab = self
            .dynamic
            .as_ref()
            .and_then(|d| d.strtab)
            .ok_or_else(|| Error::not_found("dynamic string table"))?;
        let table = slice(data, strtab.range, "dynamic string table")?;
        Ok((strtab, table))
    }

    /// The dynamic string at `index`, with staged edits applied.
    pub fn dynamic_string(&self, data: &[u8], index: u64) -> Result<String> {
        let (strtab, _) = self.dynamic_strtab(data)?;
        let table = self.view(data, strtab.range, "dynamic string table")?;
        strtab.get(&table, index)
    }

    fn dynamic_string_for(&self, data: &[u8], tag: u64) -> Result<Option<String>> {
        match self.dynamic.as_ref().and_then(|d| d.find(tag)) {
            Some(entry) => self.dynamic_string(data, entry.value).map(Some),
            None => Ok(None),
        }
    }

    /// The program interpreter path, if the file has a PT_INTERP segment.
    pub fn interpreter(&self, data: &[u8]) -> Result<Option<String>> {
        let Some(range) = self.interpreter else {
            return Ok(None);
        };
        let bytes = self.view(data, range, "interpreter")?;
        let len = c_str_len(&bytes).unwrap_or(bytes.len());
        Ok(Some(String::from_utf8_lossy(&bytes[..len]).into_owned()))
    }

    /// DT_NEEDED names in dynamic array order; removed entries are skipped.
    pub fn needed(&self, data: &[u8]) -> Result<Vec<String>> {
        let Some(dynamic) = &self.dynamic else {
            return Ok(Vec::new());
        };
        dynamic
            .find_all(DT_NEEDED)
            .map(|entry| self.dynamic_string(data, entry.value))
            .collect()
    }

    pub fn rpath(&self, data: &[u8]) -> Result<Option<String>> {
        self.dynamic_string_for(data, DT_RPATH)
    }

    pub fn runpath(&self, data: &[u8]) -> Result<Option<String>> {
        self.dynamic_string_for(data, DT_RUNPATH)
    }

    pub fn so_name(&self, data: &[u8]) -> Result<Option<String>> {
        self.dynamic_string_for(data, DT_SONAME)
    }

    /// DT_RUNPATH when present, DT_RPATH otherwise, parsed.
    pub fn run_path(&self, data: &[u8]) -> Result<RPath> {
        match self.runpath(data)? {
            Some(value) => RPath::parse(&value),
            None => match self.rpath(data)? {
                Some(value) => RPath::parse(&value),
                None => Ok(RPath::new()),
            },
        }
    }

    pub fn section(&self, name: &str) -> Option<&SectionHeader> {
        self.section_headers.iter().find(|s| s.name == name)
    }

    pub fn contains_debug_symbols(&self) -> bool {
        self.section_headers
            .iter()
            .any(|s| s.name.starts_with(".debug"))
    }

    pub fn platform(&self) -> Platform {
        let operating_system = match self.header.ident.os_abi {
            ELFOSABI_SYSV | ELFOSABI_LINUX => OperatingSystem::Linux,
            _ => OperatingSystem::Unknown,
        };
        let processor_isa = match self.header.e_machine {
            EM_386 => ProcessorIsa::X86_32,
            EM_X86_64 => ProcessorIsa::X86_64,
            EM_AARCH64 => ProcessorIsa::Aarch64,
            EM_ARM => ProcessorIsa::Arm,
            _ => ProcessorIsa::Unknown,
        };
        Platform::new(operating_system, Format::Elf, processor_isa)
    }

    /// Stage bytes at an arbitrary location, bypassing every editor check.
    #[cfg(test)]
    pub(crate) fn stage_raw(&mut self, offset: u64, bytes: Vec<u8>) {
        self.edits.stage(crate::edit::Edit {
            target: crate::edit::EditTarget::Raw { offset },
            range: ByteRange::new(offset, bytes.len() as u64),
            bytes,
        });
    }
}

fn resolve_section_names(
    data: &[u8],
    sections: &mut [SectionHeader],
    index: usize,
    shoff: u64,
) -> Result<()> {
    let count = sections.len();
    let Some(shstrtab) = sections.get(index) else {
        let reason = format!("e_shstrndx {index} is not below the section count {count}");
        return Err(Error::malformed_elf(shoff, reason));
    };
    let strtab = StringTable::new(shstrtab.file_range());
    let table = slice(data, strtab.range, "section name string table")?;
    for section in sections.iter_mut() {
        section.name = strtab.get(table, u64::from(section.sh_name))?;
    }
    Ok(())
}

fn check_load_overlaps(program_headers: &[ProgramHeader]) -> Result<()> {
    let mut loads: Vec<&ProgramHeader> = program_headers
        .iter()
        .filter(|p| p.is_load() && p.p_memsz > 0)
        .collect();
    loads.sort_by_key(|p| p.p_vaddr);
    for pair in loads.windows(2) {
        if pair[0].memory_range().overlaps(&pair[1].memory_range()) {
            return Err(Error::malformed_elf(
                pair[1].p_offset,
                format!(
                    "LOAD segment at {:#x} overlaps LOAD segment at {:#x}",
                    pair[1].p_vaddr, pair[0].p_vaddr
                ),
            ));
        }
    }
    Ok(())
}

fn find_interpreter(data: &[u8], program_headers: &[ProgramHeader]) -> Result<Option<ByteRange>> {
    let mut interps = program_headers.iter().filter(|p| p.p_type == PT_INTERP);
    let Some(interp) = interps.next() else {
        return Ok(None);
    };
    if interps.next().is_some() {
        let reason = "more than one PT_INTERP segment";
        return Err(Error::malformed_elf(interp.p_offset, reason));
    }
    let range = interp.file_range();
    let bytes = slice(data, range, "PT_INTERP segment")?;
    if c_str_len(bytes).is_none() {
        let reason = "interpreter path is not NUL-terminated";
        return Err(Error::malformed_elf(range.offset, reason));
    }
    Ok(Some(range))
}

fn find_dynamic(
    data: &[u8],
    program_headers: &[ProgramHeader],
    section_headers: &[SectionHeader],
    header: &ElfHeader,
) -> Result<Option<DynamicSection>> {
    let ctx = header.ctx();
    let dynamic_section = section_headers.iter().find(|s| s.sh_type == SHT_DYNAMIC);
    let range = match program_headers.iter().find(|p| p.p_type == PT_DYNAMIC) {
        Some(segment) => segment.file_range(),
        None => match dynamic_section {
            Some(section) => section.file_range(),
            None => return Ok(None),
        },
    };
    let bytes = slice(data, range, "dynamic array")?;
    let mut dynamic = DynamicSection::parse(bytes, range, ctx)?;

    let linked = dynamic_section
        .map(|s| s.sh_link as usize)
        .filter(|&i| i != 0)
        .and_then(|i| section_headers.get(i).map(|s| (i, s)));

    let mapped = dynamic.string_table_address().and_then(|vaddr| {
        let size = dynamic
            .string_table_size()
            .or_else(|| linked.map(|(_, s)| s.sh_size))?;
        let (segment, offset) = program_headers
            .iter()
            .enumerate()
            .find_map(|(i, p)| p.vaddr_to_offset(vaddr, size).map(|offset| (i, offset)))?;
        let source = StringTableSource::Segment { vaddr, segment };
        Some((ByteRange::new(offset, size), source))
    });

    let located = match (mapped, linked) {
        (Some(found), _) => Some(found),
        (None, Some((index, section))) => {
            let source = StringTableSource::Section { index };
            Some((section.file_range(), source))
        }
        (None, None) => None,
    };

    if let Some((strtab_range, source)) = located {
        log::debug!("dynamic string table at {strtab_range} via {source:?}");
        let strtab = StringTable::new(strtab_range);
        let table = slice(data, strtab_range, "dynamic string table")?;
        for entry in dynamic.entries.iter().filter(|e| e.refers_to_string()) {
            strtab.entry_range(table, entry.value)?;
        }
        dynamic.strtab = Some(strtab);
        dynamic.strtab_source = Some(source);
    } else if dynamic.entries.iter().any(|e| e.refers_to_string()) {
        return Err(Error::malformed_elf(
            range.offset,
            "dynamic entries reference strings but the string table cannot be located",
        ));
    }

    Ok(Some(dynamic))
}

impl ExecutableModel for ElfModel {
    const FORMAT: Format = Format::Elf;

    fn parse(data: &[u8]) -> Result<Self> {
        ElfModel::parse(data)
    }

    fn validate(&self) -> Result<()> {
        layout::elf::validate(self)
    }

    fn edits(&self) -> &EditSet {
        &self.edits
    }

    fn header(&self) -> &dyn Header {
        &self.header
    }

    fn platform(&self) -> Platform {
        ElfModel::platform(self)
    }

    fn sections(&self) -> Vec<Section> {
        self.section_headers
            .iter()
            .skip(1)
            .map(Section::from)
            .collect()
    }

    fn file_len(&self) -> u64 {
        self.file_len
    }
}
