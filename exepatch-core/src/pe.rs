//! PE32 and PE32+ images.

pub mod editor;
pub mod header;
pub mod import;
pub mod reader;
pub mod section;

pub use editor::PeEditor;
pub use header::{CoffHeader, DataDirectory, DosHeader, OptionalHeader, PeHeader, PeKind};
pub use import::{DelayLoadEntry, ImportDirectoryEntry};
pub use reader::PeModel;
pub use section::SectionHeader;
