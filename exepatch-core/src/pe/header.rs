use crate::error::{Error, Result};
use crate::header::Header;
use byteorder::{ReadBytesExt, LE};
use goblin::pe::characteristic::{IMAGE_FILE_DLL, IMAGE_FILE_EXECUTABLE_IMAGE};
use goblin::pe::header::{DOS_MAGIC, PE_MAGIC, PE_POINTER_OFFSET};
use goblin::pe::optional_header::{MAGIC_32, MAGIC_64};
use std::io::{self, Cursor};

pub const SIZEOF_DOS_HEADER: u64 = 64;
pub const SIZEOF_PE_SIGNATURE: u64 = 4;
pub const SIZEOF_COFF_HEADER: u64 = 20;
pub const SIZEOF_DATA_DIRECTORY: u64 = 8;

/// Data directory slots this crate reads.
pub const IMPORT_DIRECTORY: usize = 1;
pub const DEBUG_DIRECTORY: usize = 6;
pub const DELAY_IMPORT_DIRECTORY: usize = 13;

/// Little-endian field reader; PE has no other byte order.
pub(crate) struct LeCursor<'a> {
    inner: Cursor<&'a [u8]>,
    base: u64,
}

impl<'a> LeCursor<'a> {
    /// `base` is the file offset of `data[0]`.
    pub(crate) fn new(data: &'a [u8], base: u64) -> Self {
        Self {
            inner: Cursor::new(data),
            base,
        }
    }

    pub(crate) fn position(&self) -> u64 {
        self.base + self.inner.position()
    }

    /// Jump to `offset` bytes from the start of the slice.
    pub(crate) fn seek(&mut self, offset: u64) {
        self.inner.set_position(offset);
    }

    fn check<T>(&self, value: io::Result<T>) -> Result<T> {
        let offset = self.position();
        value.map_err(|_| Error::malformed_pe(offset, "structure runs past its declared size"))
    }

    pub(crate) fn u16(&mut self) -> Result<u16> {
        let value = self.inner.read_u16::<LE>();
        self.check(value)
    }

    pub(crate) fn u32(&mut self) -> Result<u32> {
        let value = self.inner.read_u32::<LE>();
        self.check(value)
    }

    pub(crate) fn u64(&mut self) -> Result<u64> {
        let value = self.inner.read_u64::<LE>();
        self.check(value)
    }
}

/// The MS-DOS stub header. Only the magic and the pointer to the PE header matter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DosHeader {
    /// `MZ`
    pub e_magic: u16,
    /// File offset of the `PE\0\0` signature.
    pub e_lfanew: u32,
}

impl DosHeader {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if (data.len() as u64) < SIZEOF_DOS_HEADER {
            return Err(Error::TruncatedInput {
                needed: SIZEOF_DOS_HEADER,
                available: data.len() as u64,
            });
        }
        let mut cur = LeCursor::new(data, 0);
        let e_magic = cur.u16()?;
        if e_magic != DOS_MAGIC {
            return Err(Error::malformed_pe(0, format!("bad DOS magic {e_magic:#06x}")));
        }
        cur.seek(u64::from(PE_POINTER_OFFSET));
        let e_lfanew = cur.u32()?;
        Ok(Self { e_magic, e_lfanew })
    }
}

/// The COFF file header following the PE signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoffHeader {
    /// Target machine, e.g. `COFF_MACHINE_X86_64` (0x8664).
    pub machine: u16,
    pub number_of_sections: u16,
    pub time_date_stamp: u32,
    pub pointer_to_symbol_table: u32,
    pub number_of_symbols: u32,
    /// Size of the optional header, which sits between this header and the section table.
    pub size_of_optional_header: u16,
    /// `IMAGE_FILE_*` flags.
    pub characteristics: u16,
}

impl CoffHeader {
    pub(crate) fn parse(cur: &mut LeCursor<'_>) -> Result<Self> {
        Ok(Self {
            machine: cur.u16()?,
            number_of_sections: cur.u16()?,
            time_date_stamp: cur.u32()?,
            pointer_to_symbol_table: cur.u32()?,
            number_of_symbols: cur.u32()?,
            size_of_optional_header: cur.u16()?,
            characteristics: cur.u16()?,
        })
    }

    pub fn is_executable_image(&self) -> bool {
        self.characteristics & IMAGE_FILE_EXECUTABLE_IMAGE != 0
    }

    pub fn is_dll(&self) -> bool {
        self.characteristics & IMAGE_FILE_DLL != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeKind {
    Pe32,
    Pe32Plus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DataDirectory {
    pub virtual_address: u32,
    pub size: u32,
}

impl DataDirectory {
    pub fn is_present(&self) -> bool {
        self.virtual_address != 0 && self.size != 0
    }
}

/// The optional header, with PE32 and PE32+ widened to the same fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionalHeader {
    /// Decided by `magic`; every later field offset depends on it.
    pub kind: PeKind,
    pub magic: u16,
    pub address_of_entry_point: u32,
    pub image_base: u64,
    pub section_alignment: u32,
    pub file_alignment: u32,
    pub size_of_image: u32,
    pub size_of_headers: u32,
    pub check_sum: u32,
    pub subsystem: u16,
    pub dll_characteristics: u16,
    pub number_of_rva_and_sizes: u32,
    pub data_directories: Vec<DataDirectory>,
}

impl OptionalHeader {
    /// Decode the optional header from exactly `size_of_optional_header` bytes.
    pub(crate) fn parse(data: &[u8], base: u64) -> Result<Self> {
        let mut cur = LeCursor::new(data, base);
        let magic = cur.u16()?;
        let kind = match magic {
            MAGIC_32 => PeKind::Pe32,
            MAGIC_64 => PeKind::Pe32Plus,
            other => {
                let reason = format!("unsupported optional header magic {other:#06x}");
                return Err(Error::malformed_pe(base, reason));
            }
        };

        cur.seek(16);
        let address_of_entry_point = cur.u32()?;
        let image_base = match kind {
            PeKind::Pe32 => {
                cur.seek(28);
                u64::from(cur.u32()?)
            }
            PeKind::Pe32Plus => {
                cur.seek(24);
                cur.u64()?
            }
        };
        cur.seek(32);
        let section_alignment = cur.u32()?;
        let file_alignment = cur.u32()?;
        cur.seek(56);
        let size_of_image = cur.u32()?;
        let size_of_headers = cur.u32()?;
        let check_sum = cur.u32()?;
        let subsystem = cur.u16()?;
        let dll_characteristics = cur.u16()?;

        let directories_at = match kind {
            PeKind::Pe32 => 96,
            PeKind::Pe32Plus => 112,
        };
        cur.seek(directories_at - 4);
        let number_of_rva_and_sizes = cur.u32()?;
        let table_end = u64::from(number_of_rva_and_sizes) * SIZEOF_DATA_DIRECTORY + directories_at;
        if table_end > data.len() as u64 {
            let (count, len) = (number_of_rva_and_sizes, data.len());
            let reason = format!("{count} data directories do not fit in {len:#x} bytes");
            return Err(Error::malformed_pe(base, reason));
        }
        let mut data_directories = Vec::with_capacity(number_of_rva_and_sizes as usize);
        for _ in 0..number_of_rva_and_sizes {
            data_directories.push(DataDirectory {
                virtual_address: cur.u32()?,
                size: cur.u32()?,
            });
        }

        Ok(Self {
            kind,
            magic,
            address_of_entry_point,
            image_base,
            section_alignment,
            file_alignment,
            size_of_image,
            size_of_headers,
            check_sum,
            subsystem,
            dll_characteristics,
            number_of_rva_and_sizes,
            data_directories,
        })
    }

    /// Slot `index` when the header declares it and it is non-empty.
    pub fn data_directory(&self, index: usize) -> Option<DataDirectory> {
        self.data_directories
            .get(index)
            .copied()
            .filter(DataDirectory::is_present)
    }
}

/// Everything before the section table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeHeader {
    pub dos: DosHeader,
    pub coff: CoffHeader,
    pub optional: OptionalHeader,
    /// File offset of the optional header.
    pub optional_header_offset: u64,
    /// File offset of the first section table entry.
    pub section_table_offset: u64,
}

impl PeHeader {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let dos = DosHeader::parse(data)?;
        let file_len = data.len() as u64;
        let pe_offset = u64::from(dos.e_lfanew);
        let coff_offset = pe_offset + SIZEOF_PE_SIGNATURE;
        let optional_header_offset = coff_offset + SIZEOF_COFF_HEADER;
        if optional_header_offset > file_len {
            let reason = "PE and COFF headers run past the end of the file";
            return Err(Error::malformed_pe(pe_offset, reason));
        }

        let pe_bytes = &data[pe_offset as usize..optional_header_offset as usize];
        let mut cur = LeCursor::new(pe_bytes, pe_offset);
        let signature = cur.u32()?;
        if signature != PE_MAGIC {
            let reason = format!("bad PE signature {signature:#010x}");
            return Err(Error::malformed_pe(pe_offset, reason));
        }
        let coff = CoffHeader::parse(&mut cur)?;

        let optional_len = u64::from(coff.size_of_optional_header);
        let section_table_offset = optional_header_offset + optional_len;
        if section_table_offset > file_len {
            let reason = format!("optional header of {optional_len:#x} bytes exceeds the file");
            return Err(Error::malformed_pe(optional_header_offset, reason));
        }
        let optional = OptionalHeader::parse(
            &data[optional_header_offset as usize..section_table_offset as usize],
            optional_header_offset,
        )?;

        Ok(Self {
            dos,
            coff,
            optional,
            optional_header_offset,
            section_table_offset,
        })
    }
}

impl Header for PeHeader {
    fn entry_point(&self) -> u64 {
        u64::from(self.optional.address_of_entry_point)
    }

    fn machine(&self) -> u16 {
        self.coff.machine
    }

    fn is_64(&self) -> bool {
        self.optional.kind == PeKind::Pe32Plus
    }

    fn format_name(&self) -> &'static str {
        "PE"
    }

    fn is_executable(&self) -> bool {
        self.coff.is_executable_image() && !self.coff.is_dll()
    }

    fn is_executable_or_shared_library(&self) -> bool {
        self.coff.is_executable_image()
    }
}
