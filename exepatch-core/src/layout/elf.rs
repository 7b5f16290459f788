use crate::bytes::ByteRange;
use crate::elf::reader::ElfModel;
use crate::elf::ident::RecordSizes;
use crate::error::{Error, Result};
use crate::layout::{check_disjoint, check_in_bounds, is_power_of_two_or_zero, reported, Region};
use goblin::elf::section_header::SHT_NULL;

pub fn validate(model: &ElfModel) -> Result<()> {
    reported(check(model))
}

fn check(model: &ElfModel) -> Result<()> {
    let file_len = model.file_len;
    let ctx = model.header.ctx();

    let header = Region::new("ELF header", ByteRange::new(0, ctx.header_size()));
    check_in_bounds(&header, file_len)?;

    let mut tables = vec![header];
    if !model.program_headers.is_empty() {
        let len = model.program_headers.len() as u64 * ctx.program_header_size();
        let range = ByteRange::new(model.header.e_phoff, len);
        tables.push(Region::new("program header table", range));
    }
    if !model.section_headers.is_empty() {
        let len = model.section_headers.len() as u64 * ctx.section_header_size();
        let range = ByteRange::new(model.header.e_shoff, len);
        tables.push(Region::new("section header table", range));
    }
    for table in &tables {
        check_in_bounds(table, file_len)?;
    }
    check_disjoint("table", tables.clone(), |_, _| false)?;

    check_segments(model)?;
    check_sections(model, &tables)?;

    if let Some(range) = model.interpreter {
        check_in_bounds(&Region::new("PT_INTERP", range), file_len)?;
    }
    if let Some(dynamic) = &model.dynamic {
        check_in_bounds(&Region::new("dynamic array", dynamic.range), file_len)?;
        if let Some(strtab) = &dynamic.strtab {
            let region = Region::new("dynamic string table", strtab.range);
            check_in_bounds(&region, file_len)?;
        }
    }
    Ok(())
}

fn check_segments(model: &ElfModel) -> Result<()> {
    let mut loads = Vec::new();
    for (i, ph) in model.program_headers.iter().enumerate() {
        let name = format!("segment #{i} ({})", ph.type_name());
        check_in_bounds(&Region::new(&name, ph.file_range()), model.file_len)?;
        if !is_power_of_two_or_zero(ph.p_align) {
            let reason = format!("p_align {:#x} is not a power of two", ph.p_align);
            return Err(Error::violation(name, ph.p_offset, reason));
        }
        if ph.p_align > 1 && ph.p_offset % ph.p_align != ph.p_vaddr % ph.p_align {
            return Err(Error::violation(
                name,
                ph.p_offset,
                format!(
                    "p_offset {:#x} and p_vaddr {:#x} disagree modulo p_align {:#x}",
                    ph.p_offset, ph.p_vaddr, ph.p_align
                ),
            ));
        }
        if ph.is_load() {
            loads.push(Region::new(name, ph.memory_range()));
        }
    }
    check_disjoint("virtual range", loads, |_, _| false)
}

fn check_sections(model: &ElfModel, tables: &[Region]) -> Result<()> {
    let mut data = Vec::new();
    for (i, sh) in model.section_headers.iter().enumerate() {
        if sh.sh_type == SHT_NULL {
            continue;
        }
        let name = format!("section #{i} ({})", sh.name);
        if !is_power_of_two_or_zero(sh.sh_addralign) {
            return Err(Error::violation(
                name,
                sh.sh_offset,
                format!("sh_addralign {:#x} is not a power of two", sh.sh_addralign),
            ));
        }
        let region = Region::new(name, sh.file_range());
        check_in_bounds(&region, model.file_len)?;
        data.push((i, region));
    }

    let shstrndx = model.shstrndx;
    let is_shstrtab = |region: &Region| {
        data.iter()
            .any(|(i, r)| Some(*i) == shstrndx && r.name == region.name)
    };
    check_disjoint(
        "section data",
        data.iter().map(|(_, r)| r.clone()).collect(),
        |a, b| is_shstrtab(a) || is_shstrtab(b),
    )?;

    let mut with_tables: Vec<Region> = tables.to_vec();
    with_tables.extend(data.iter().map(|(_, r)| r.clone()));
    let table_names: Vec<&str> = tables.iter().map(|t| t.name.as_str()).collect();
    check_disjoint("section data", with_tables, |a, b| {
        let a_table = table_names.contains(&a.name.as_str());
        let b_table = table_names.contains(&b.name.as_str());
        // section against section was checked above
        !a_table && !b_table
    })
}
