use crate::bytes::{c_str_len, ByteRange};
use crate::detect::Format;
use crate::edit::EditSet;
use crate::error::{Error, Result};
use crate::header::Header;
use crate::layout;
use crate::model::ExecutableModel;
use crate::pe::header::{PeHeader, DEBUG_DIRECTORY, DELAY_IMPORT_DIRECTORY, IMPORT_DIRECTORY};
use crate::pe::import::{parse_delay_imports, parse_imports, DelayLoadEntry, ImportDirectoryEntry};
use crate::pe::section::{SectionHeader, SIZEOF_SECTION_HEADER};
use crate::platform::{OperatingSystem, Platform, ProcessorIsa};
use crate::sections::Section;
use goblin::pe::header::{
    COFF_MACHINE_ARM64, COFF_MACHINE_ARMNT, COFF_MACHINE_X86, COFF_MACHINE_X86_64,
};

/// Everything the engine understands about one PE image.
#[derive(Debug, Clone)]
pub struct PeModel {
    pub header: PeHeader,
    pub sections: Vec<SectionHeader>,
    pub imports: Vec<ImportDirectoryEntry>,
    pub delay_imports: Vec<DelayLoadEntry>,
    pub file_len: u64,
    pub(crate) edits: EditSet,
}

impl PeModel {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let header = PeHeader::parse(data)?;
        let file_len = data.len() as u64;

        let count = u64::from(header.coff.number_of_sections);
        let table = ByteRange::new(header.section_table_offset, count * SIZEOF_SECTION_HEADER);
        let table_bytes = match table.as_usize().and_then(|r| data.get(r)) {
            Some(bytes) => bytes,
            None => {
                let reason = format!("section table of {count} entries exceeds the file");
                return Err(Error::malformed_pe(table.offset, reason));
            }
        };
        let sections = table_bytes
            .chunks_exact(SIZEOF_SECTION_HEADER as usize)
            .enumerate()
            .map(|(i, raw)| {
                let base = table.offset + i as u64 * SIZEOF_SECTION_HEADER;
                SectionHeader::parse(raw, base)
            })
            .collect::<Result<Vec<_>>>()?;

        let imports = match header.optional.data_directory(IMPORT_DIRECTORY) {
            Some(directory) => parse_imports(data, &sections, directory)?,
            None => Vec::new(),
        };
        let delay_imports = match header.optional.data_directory(DELAY_IMPORT_DIRECTORY) {
            Some(directory) => parse_delay_imports(data, &sections, directory)?,
            None => Vec::new(),
        };

        log::debug!(
            "parsed PE: {} sections, {} imports, {} delay-load imports",
            sections.len(),
            imports.len(),
            delay_imports.len()
        );
        Ok(Self {
            header,
            sections,
            imports,
            delay_imports,
            file_len,
            edits: EditSet::default(),
        })
    }

    pub fn edits(&self) -> &EditSet {
        &self.edits
    }

    /// The NUL-terminated name at `range`, with staged edits applied.
    pub(crate) fn name_at(&self, data: &[u8], range: ByteRange) -> Result<String> {
        let original = range
            .as_usize()
            .and_then(|r| data.get(r))
            .ok_or_else(|| Error::malformed_pe(range.offset, "DLL name lies outside the file"))?;
        let bytes = self.edits.overlay(original, range);
        let len = c_str_len(&bytes).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..len]).into_owned())
    }

    /// DLL names of the import directory, in descriptor order.
    pub fn imported_dlls(&self, data: &[u8]) -> Result<Vec<String>> {
        self.imports
            .iter()
            .map(|e| self.name_at(data, e.name_range))
            .collect()
    }

    pub fn delay_loaded_dlls(&self, data: &[u8]) -> Result<Vec<String>> {
        self.delay_imports
            .iter()
            .map(|e| self.name_at(data, e.name_range))
            .collect()
    }

    /// Imports followed by delay-load imports.
    pub fn needed(&self, data: &[u8]) -> Result<Vec<String>> {
        let mut names = self.imported_dlls(data)?;
        names.extend(self.delay_loaded_dlls(data)?);
        Ok(names)
    }

    pub fn is_dll(&self) -> bool {
        self.header.coff.is_dll()
    }

    pub fn has_debug_directory(&self) -> bool {
        let debug = self.header.optional.data_directory(DEBUG_DIRECTORY);
        debug.is_some()
    }

    pub fn contains_debug_symbols(&self) -> bool {
        self.has_debug_directory() || self.sections.iter().any(|s| s.name.starts_with(".debug"))
    }

    pub fn platform(&self) -> Platform {
        let processor_isa = match self.header.coff.machine {
            COFF_MACHINE_X86 => ProcessorIsa::X86_32,
            COFF_MACHINE_X86_64 => ProcessorIsa::X86_64,
            COFF_MACHINE_ARM64 => ProcessorIsa::Aarch64,
            COFF_MACHINE_ARMNT => ProcessorIsa::Arm,
            _ => ProcessorIsa::Unknown,
        };
        Platform::new(OperatingSystem::Windows, Format::Pe, processor_isa)
    }
}

impl ExecutableModel for PeModel {
    const FORMAT: Format = Format::Pe;

    fn parse(data: &[u8]) -> Result<Self> {
        PeModel::parse(data)
    }

    fn validate(&self) -> Result<()> {
        layout::pe::validate(self)
    }

    fn edits(&self) -> &EditSet {
        &self.edits
    }

    fn header(&self) -> &dyn Header {
        &self.header
    }

    fn platform(&self) -> Platform {
        PeModel::platform(self)
    }

    fn sections(&self) -> Vec<Section> {
        self.sections.iter().map(Section::from).collect()
    }

    fn file_len(&self) -> u64 {
        self.file_len
    }
}
