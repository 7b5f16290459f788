use crate::bytes::ByteRange;
use crate::error::{Error, Result};
use crate::layout::{check_disjoint, check_in_bounds, reported, Region};
use crate::pe::reader::PeModel;
use crate::pe::section::SIZEOF_SECTION_HEADER;

pub fn validate(model: &PeModel) -> Result<()> {
    reported(check(model))
}

fn check(model: &PeModel) -> Result<()> {
    let optional = &model.header.optional;
    let file_len = model.file_len;

    for (field, value) in [
        ("SectionAlignment", optional.section_alignment),
        ("FileAlignment", optional.file_alignment),
    ] {
        if !value.is_power_of_two() {
            return Err(Error::violation(
                "optional header",
                model.header.optional_header_offset,
                format!("{field} {value:#x} is not a power of two"),
            ));
        }
    }

    let table_len = model.sections.len() as u64 * SIZEOF_SECTION_HEADER;
    let headers_end = model.header.section_table_offset + table_len;
    let headers = Region::new("headers", ByteRange::new(0, headers_end));
    check_in_bounds(&headers, file_len)?;
    let size_of_headers = u64::from(optional.size_of_headers);
    let declared = Region::new("SizeOfHeaders", ByteRange::new(0, size_of_headers));
    check_in_bounds(&declared, file_len)?;

    let mut raw = vec![headers];
    let mut virtual_ranges = Vec::new();
    for section in &model.sections {
        let name = format!("section {}", section.name);
        if section.virtual_address % optional.section_alignment != 0 {
            return Err(Error::violation(
                name,
                u64::from(section.pointer_to_raw_data),
                format!(
                    "VirtualAddress {:#x} is not a multiple of SectionAlignment {:#x}",
                    section.virtual_address, optional.section_alignment
                ),
            ));
        }
        let region = Region::new(&name, section.raw_range());
        check_in_bounds(&region, file_len)?;
        raw.push(region);
        virtual_ranges.push(Region::new(name, section.virtual_range()));
    }

    check_disjoint("raw data", raw, |_, _| false)?;
    check_disjoint("virtual range", virtual_ranges, |_, _| false)
}
