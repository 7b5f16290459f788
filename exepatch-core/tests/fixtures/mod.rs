//! Minimal well-formed executables built byte by byte.
//!
//! Shared by the unit tests (through a `#[path]` include) and the integration
//! tests. Each builder returns the image and the offsets tests need to poke at it.
#![allow(dead_code)]

use byteorder::{ByteOrder, BE, LE};
use std::collections::BTreeMap;

pub const ELF_BASE: u64 = 0x40_0000;
pub const INTERP_OFFSET: u64 = 0x100;
pub const DEFAULT_INTERP: &str = "/lib64/ld-linux-x86-64.so.2";

const PT_LOAD: u32 = 1;
const PT_DYNAMIC: u32 = 2;
const PT_INTERP: u32 = 3;
const SHT_PROGBITS: u32 = 1;
const SHT_STRTAB: u32 = 3;
const SHT_DYNAMIC: u32 = 6;
const DT_NEEDED: u64 = 1;
const DT_STRTAB: u64 = 5;
const DT_STRSZ: u64 = 10;
const DT_SONAME: u64 = 14;
const DT_RPATH: u64 = 15;
const DT_RUNPATH: u64 = 29;

/// Writes fields at a moving position in a pre-sized buffer.
struct Writer {
    data: Vec<u8>,
    pos: usize,
    big: bool,
    wide: bool,
}

impl Writer {
    fn new(len: usize, big: bool, wide: bool) -> Self {
        Self {
            data: vec![0; len],
            pos: 0,
            big,
            wide,
        }
    }

    fn at(&mut self, offset: u64) -> &mut Self {
        self.pos = offset as usize;
        self
    }

    fn bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.data[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
        self
    }

    fn u16(&mut self, value: u16) -> &mut Self {
        let slot = &mut self.data[self.pos..self.pos + 2];
        if self.big {
            BE::write_u16(slot, value)
        } else {
            LE::write_u16(slot, value)
        }
        self.pos += 2;
        self
    }

    fn u32(&mut self, value: u32) -> &mut Self {
        let slot = &mut self.data[self.pos..self.pos + 4];
        if self.big {
            BE::write_u32(slot, value)
        } else {
            LE::write_u32(slot, value)
        }
        self.pos += 4;
        self
    }

    fn u64(&mut self, value: u64) -> &mut Self {
        let slot = &mut self.data[self.pos..self.pos + 8];
        if self.big {
            BE::write_u64(slot, value)
        } else {
            LE::write_u64(slot, value)
        }
        self.pos += 8;
        self
    }

    /// Address-sized field.
    fn word(&mut self, value: u64) -> &mut Self {
        if self.wide {
            self.u64(value)
        } else {
            self.u32(value as u32)
        }
    }
}

fn align(value: u64, to: u64) -> u64 {
    value.div_ceil(to) * to
}

/// Section header index of `name`; index 0 is the null section.
fn section_index(names: &[&str], name: &str) -> u64 {
    names
        .iter()
        .position(|n| *n == name)
        .map_or(0, |i| i as u64 + 1)
}

#[derive(Debug, Clone)]
pub struct ElfFixture {
    pub class64: bool,
    pub big_endian: bool,
    pub e_type: u16,
    pub machine: u16,
    pub os_abi: u8,
    pub interp: Option<String>,
    /// `p_filesz` of PT_INTERP.
    pub interp_capacity: u64,
    pub needed: Vec<String>,
    pub soname: Option<String>,
    pub rpath: Option<String>,
    pub runpath: Option<String>,
    /// Point DT_RPATH at the DT_RUNPATH string instead of a string of its own.
    pub share_path_string: bool,
    pub debug_section: bool,
}

impl Default for ElfFixture {
    fn default() -> Self {
        Self {
            class64: true,
            big_endian: false,
            e_type: 3,
            machine: 62,
            os_abi: 0,
            interp: Some(DEFAULT_INTERP.to_string()),
            interp_capacity: 40,
            needed: vec!["libm.so.6".to_string(), "libc.so.6".to_string()],
            soname: None,
            rpath: None,
            runpath: Some("$ORIGIN/../lib".to_string()),
            share_path_string: false,
            debug_section: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ElfLayout {
    pub phoff: u64,
    pub program_header_size: u64,
    pub interp_offset: u64,
    pub dynstr_offset: u64,
    pub dynstr_len: u64,
    pub dynamic_offset: u64,
    pub dynamic_entry_size: u64,
    /// Dynamic array index of each tag written, in order.
    pub dynamic_tags: Vec<u64>,
    pub shstrtab_offset: u64,
    pub shoff: u64,
    pub section_header_size: u64,
    /// Section name to index.
    pub sections: BTreeMap<String, usize>,
    /// File offset of each string in the dynamic string table.
    pub strings: BTreeMap<String, u64>,
    pub file_len: u64,
}

impl ElfLayout {
    /// File offset of section header `index`.
    pub fn section_header(&self, index: usize) -> u64 {
        self.shoff + index as u64 * self.section_header_size
    }

    pub fn program_header(&self, index: usize) -> u64 {
        self.phoff + index as u64 * self.program_header_size
    }
}

pub fn build_elf(fixture: &ElfFixture) -> (Vec<u8>, ElfLayout) {
    let wide = fixture.class64;
    let (ehsize, phentsize, shentsize, dynsize) = if wide {
        (64u64, 56u64, 64u64, 16u64)
    } else {
        (52, 32, 40, 8)
    };

    // dynamic string table
    let mut dynstr = vec![0u8];
    let mut string_index: BTreeMap<String, u64> = BTreeMap::new();
    let mut intern = |s: &str, dynstr: &mut Vec<u8>| -> u64 {
        if let Some(&i) = string_index.get(s) {
            return i;
        }
        let i = dynstr.len() as u64;
        dynstr.extend_from_slice(s.as_bytes());
        dynstr.push(0);
        string_index.insert(s.to_string(), i);
        i
    };
    let mut dynamic: Vec<(u64, u64)> = Vec::new();
    for lib in &fixture.needed {
        let i = intern(lib, &mut dynstr);
        dynamic.push((DT_NEEDED, i));
    }
    if let Some(soname) = &fixture.soname {
        let i = intern(soname, &mut dynstr);
        dynamic.push((DT_SONAME, i));
    }
    let runpath_index = fixture.runpath.as_ref().map(|r| intern(r, &mut dynstr));
    if let Some(rpath) = &fixture.rpath {
        let i = match (fixture.share_path_string, runpath_index) {
            (true, Some(shared)) => shared,
            _ => intern(rpath, &mut dynstr),
        };
        dynamic.push((DT_RPATH, i));
    }
    if let Some(i) = runpath_index {
        dynamic.push((DT_RUNPATH, i));
    }

    let phnum: u64 = if fixture.interp.is_some() { 3 } else { 2 };
    let phoff = ehsize;
    let interp_offset = INTERP_OFFSET;
    let dynstr_offset = align(interp_offset + fixture.interp_capacity, 0x10);
    let dynamic_offset = align(dynstr_offset + dynstr.len() as u64, 8);
    let strings = string_index
        .iter()
        .map(|(s, &i)| (s.clone(), dynstr_offset + i))
        .collect();
    dynamic.push((DT_STRTAB, ELF_BASE + dynstr_offset));
    dynamic.push((DT_STRSZ, dynstr.len() as u64));
    let dynamic_tags: Vec<u64> = dynamic.iter().map(|&(t, _)| t).collect();
    // terminator plus one spare slot
    let dynamic_len = (dynamic.len() as u64 + 2) * dynsize;

    let mut section_names: Vec<&str> = Vec::new();
    if fixture.interp.is_some() {
        section_names.push(".interp");
    }
    section_names.extend([".dynstr", ".dynamic", ".shstrtab"]);
    if fixture.debug_section {
        section_names.push(".debug_info");
    }
    let mut shstrtab = vec![0u8];
    let mut name_offsets = Vec::new();
    for name in &section_names {
        name_offsets.push(shstrtab.len() as u32);
        shstrtab.extend_from_slice(name.as_bytes());
        shstrtab.push(0);
    }
    let shstrtab_offset = dynamic_offset + dynamic_len;
    let debug_offset = shstrtab_offset + shstrtab.len() as u64;
    let debug_len = if fixture.debug_section { 16 } else { 0 };
    let shoff = align(debug_offset + debug_len, 8);
    let shnum = section_names.len() as u64 + 1;
    let file_len = shoff + shnum * shentsize;

    let mut w = Writer::new(file_len as usize, fixture.big_endian, wide);
    let class = if wide { 2 } else { 1 };
    let encoding = if fixture.big_endian { 2 } else { 1 };
    w.bytes(&[0x7f, b'E', b'L', b'F', class, encoding, 1, fixture.os_abi]);
    w.at(16)
        .u16(fixture.e_type)
        .u16(fixture.machine)
        .u32(1)
        .word(ELF_BASE + 0x1000)
        .word(phoff)
        .word(shoff)
        .u32(0)
        .u16(ehsize as u16)
        .u16(phentsize as u16)
        .u16(phnum as u16)
        .u16(shentsize as u16)
        .u16(shnum as u16)
        .u16(section_index(&section_names, ".shstrtab") as u16);

    let mut segments = vec![(PT_LOAD, 5u32, 0u64, file_len, 0x1000u64)];
    if fixture.interp.is_some() {
        segments.push((PT_INTERP, 4, interp_offset, fixture.interp_capacity, 1));
    }
    segments.push((PT_DYNAMIC, 6, dynamic_offset, dynamic_len, 8));
    for (i, &(p_type, flags, offset, size, p_align)) in segments.iter().enumerate() {
        w.at(phoff + i as u64 * phentsize).u32(p_type);
        if wide {
            w.u32(flags);
        }
        w.word(offset)
            .word(ELF_BASE + offset)
            .word(ELF_BASE + offset)
            .word(size)
            .word(size);
        if !wide {
            w.u32(flags);
        }
        w.word(p_align);
    }

    if let Some(interp) = &fixture.interp {
        w.at(interp_offset).bytes(interp.as_bytes());
    }
    w.at(dynstr_offset).bytes(&dynstr);
    w.at(dynamic_offset);
    for &(tag, value) in &dynamic {
        w.word(tag).word(value);
    }
    w.at(shstrtab_offset).bytes(&shstrtab);
    if fixture.debug_section {
        w.at(debug_offset).bytes(&[0xd0; 16]);
    }

    let mut sections = BTreeMap::new();
    let dynstr_index = section_index(&section_names, ".dynstr") as u32;
    for (i, name) in section_names.iter().enumerate() {
        let index = i + 1;
        sections.insert(name.to_string(), index);
        let (sh_type, offset, size, link, entsize) = match *name {
            ".interp" => (SHT_PROGBITS, interp_offset, fixture.interp_capacity, 0, 0),
            ".dynstr" => (SHT_STRTAB, dynstr_offset, dynstr.len() as u64, 0, 0),
            ".dynamic" => (SHT_DYNAMIC, dynamic_offset, dynamic_len, dynstr_index, dynsize),
            ".shstrtab" => (SHT_STRTAB, shstrtab_offset, shstrtab.len() as u64, 0, 0),
            _ => (SHT_PROGBITS, debug_offset, debug_len, 0, 0),
        };
        let addr = if matches!(*name, ".shstrtab" | ".debug_info") {
            0
        } else {
            ELF_BASE + offset
        };
        w.at(shoff + index as u64 * shentsize)
            .u32(name_offsets[i])
            .u32(sh_type)
            .word(if *name == ".dynamic" { 3 } else { 2 })
            .word(addr)
            .word(offset)
            .word(size)
            .u32(link)
            .u32(0)
            .word(if *name == ".dynamic" { 8 } else { 1 })
            .word(entsize);
    }

    let layout = ElfLayout {
        phoff,
        program_header_size: phentsize,
        interp_offset,
        dynstr_offset,
        dynstr_len: dynstr.len() as u64,
        dynamic_offset,
        dynamic_entry_size: dynsize,
        dynamic_tags,
        shstrtab_offset,
        shoff,
        section_header_size: shentsize,
        sections,
        strings,
        file_len,
    };
    (w.data, layout)
}

pub const PE_FILE_LEN: u64 = 0x600;
pub const PE_LFANEW: u64 = 0x40;
const IDATA_RVA: u32 = 0x2000;
const IDATA_RAW: u32 = 0x400;
const DELAY_RVA: u32 = IDATA_RVA + 0x80;
const NAMES_RVA: u32 = IDATA_RVA + 0x100;
const EMPTY_THUNKS_RVA: u32 = IDATA_RVA + 0x1f0;

#[derive(Debug, Clone)]
pub struct PeFixture {
    pub plus: bool,
    pub machine: u16,
    pub characteristics: u16,
    pub imports: Vec<String>,
    pub delay_imports: Vec<String>,
    pub debug_directory: bool,
}

impl Default for PeFixture {
    fn default() -> Self {
        Self {
            plus: true,
            machine: 0x8664,
            // EXECUTABLE_IMAGE | LARGE_ADDRESS_AWARE
            characteristics: 0x0022,
            imports: vec!["KERNEL32.dll".to_string(), "USER32.dll".to_string()],
            delay_imports: Vec::new(),
            debug_directory: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PeLayout {
    pub optional_header_offset: u64,
    pub section_table_offset: u64,
    pub import_descriptors: u64,
    pub delay_descriptors: u64,
    /// File offsets of the DLL names: imports first, then delay-load imports.
    pub name_offsets: Vec<u64>,
}

fn rva_to_raw(rva: u32) -> u64 {
    u64::from(rva - IDATA_RVA + IDATA_RAW)
}

pub fn build_pe(fixture: &PeFixture) -> (Vec<u8>, PeLayout) {
    let mut w = Writer::new(PE_FILE_LEN as usize, false, false);
    let optional_size: u16 = if fixture.plus { 240 } else { 224 };
    let optional_header_offset = PE_LFANEW + 4 + 20;
    let section_table_offset = optional_header_offset + u64::from(optional_size);

    w.bytes(b"MZ").at(0x3c).u32(PE_LFANEW as u32);
    w.at(PE_LFANEW)
        .bytes(b"PE\0\0")
        .u16(fixture.machine)
        .u16(2)
        .u32(0x6000_0000)
        .u32(0)
        .u32(0)
        .u16(optional_size)
        .u16(fixture.characteristics);

    // names
    let mut name_rvas = Vec::new();
    let mut next = NAMES_RVA;
    w.at(rva_to_raw(NAMES_RVA));
    for name in fixture.imports.iter().chain(&fixture.delay_imports) {
        name_rvas.push(next);
        w.bytes(name.as_bytes()).bytes(&[0]);
        next += name.len() as u32 + 1;
    }
    assert!(next <= EMPTY_THUNKS_RVA, "fixture names overflow .idata");

    w.at(rva_to_raw(IDATA_RVA));
    for rva in &name_rvas[..fixture.imports.len()] {
        w.u32(EMPTY_THUNKS_RVA)
            .u32(0)
            .u32(0)
            .u32(*rva)
            .u32(EMPTY_THUNKS_RVA);
    }
    w.at(rva_to_raw(DELAY_RVA));
    for rva in &name_rvas[fixture.imports.len()..] {
        w.u32(1)
            .u32(*rva)
            .u32(EMPTY_THUNKS_RVA + 8)
            .u32(EMPTY_THUNKS_RVA)
            .u32(EMPTY_THUNKS_RVA)
            .u32(0)
            .u32(0)
            .u32(0);
    }

    w.at(optional_header_offset)
        .u16(if fixture.plus { 0x20b } else { 0x10b })
        .bytes(&[14, 0])
        .u32(0x200)
        .u32(0x200)
        .u32(0)
        .u32(0x1000)
        .u32(0x1000);
    if fixture.plus {
        w.u64(0x1_4000_0000);
    } else {
        w.u32(0x2000).u32(0x40_0000);
    }
    w.u32(0x1000) // SectionAlignment
        .u32(0x200) // FileAlignment
        .u16(6)
        .u16(0)
        .u16(0)
        .u16(0)
        .u16(6)
        .u16(0)
        .u32(0)
        .u32(0x3000) // SizeOfImage
        .u32(0x200) // SizeOfHeaders
        .u32(0)
        .u16(3)
        .u16(0x8160);
    for value in [0x10_0000u64, 0x1000, 0x10_0000, 0x1000] {
        if fixture.plus {
            w.u64(value);
        } else {
            w.u32(value as u32);
        }
    }
    w.u32(0).u32(16);
    let mut directories = [(0u32, 0u32); 16];
    if !fixture.imports.is_empty() {
        directories[1] = (IDATA_RVA, (fixture.imports.len() as u32 + 1) * 20);
    }
    if fixture.debug_directory {
        directories[6] = (0x1000, 28);
    }
    if !fixture.delay_imports.is_empty() {
        directories[13] = (DELAY_RVA, (fixture.delay_imports.len() as u32 + 1) * 32);
    }
    for (rva, size) in directories {
        w.u32(rva).u32(size);
    }

    w.at(section_table_offset)
        .bytes(b".text\0\0\0")
        .u32(0x10)
        .u32(0x1000)
        .u32(0x200)
        .u32(0x200)
        .u32(0)
        .u32(0)
        .u16(0)
        .u16(0)
        .u32(0x6000_0020);
    w.bytes(b".idata\0\0")
        .u32(0x200)
        .u32(IDATA_RVA)
        .u32(0x200)
        .u32(IDATA_RAW)
        .u32(0)
        .u32(0)
        .u16(0)
        .u16(0)
        .u32(0xc000_0040);

    let layout = PeLayout {
        optional_header_offset,
        section_table_offset,
        import_descriptors: rva_to_raw(IDATA_RVA),
        delay_descriptors: rva_to_raw(DELAY_RVA),
        name_offsets: name_rvas.into_iter().map(rva_to_raw).collect(),
    };
    (w.data, layout)
}
