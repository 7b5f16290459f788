//! ELF32/ELF64 in either byte order.

pub mod dynamic;
pub mod editor;
pub mod header;
pub mod ident;
pub mod program_header;
pub mod reader;
pub mod section_header;
pub mod string_table;

pub use dynamic::{encode_entry, DynamicEntry, DynamicSection, DT_REMOVED};
pub use editor::ElfEditor;
pub use header::ElfHeader;
pub use ident::{Container, Ctx, Endian, Ident, RecordSizes};
pub use program_header::ProgramHeader;
pub use reader::ElfModel;
pub use section_header::SectionHeader;
pub use string_table::StringTable;
