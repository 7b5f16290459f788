//! Reading and in-place editing of ELF and PE executables.
//!
//! Files are never relinked. Every supported edit rewrites bytes inside the
//! space the original file already reserved for them, so no offset anywhere
//! else in the file changes.
//!
//! ```no_run
//! use exepatch_core::{RawFile, Session};
//!
//! # fn main() -> exepatch_core::Result<()> {
//! let mut session = Session::open(RawFile::load("a.out")?)?;
//! if let Some(mut editor) = session.elf_editor() {
//!     editor.set_interpreter("/lib/ld.so")?;
//! }
//! let bytes = session.serialize()?;
//! # let _ = bytes;
//! # Ok(())
//! # }
//! ```

pub mod bytes;
pub mod detect;
pub mod edit;
pub mod elf;
pub mod error;
pub mod header;
pub mod layout;
pub mod model;
pub mod pe;
pub mod platform;
pub mod rpath;
pub mod sections;
pub mod serialize;
pub mod session;

#[cfg(test)]
#[path = "../tests/fixtures/mod.rs"]
pub(crate) mod fixtures;

pub use bytes::{ByteRange, ByteSink, ByteSource, RawFile};
pub use detect::{detect, Format};
pub use edit::{Edit, EditSet, EditTarget};
pub use elf::{ElfEditor, ElfModel};
pub use error::{EditError, Error, OpenError, Result, SerializeError};
pub use header::Header;
pub use model::ExecutableModel;
pub use pe::{PeEditor, PeModel};
pub use platform::{OperatingSystem, Platform, ProcessorIsa};
pub use rpath::{RPath, RPathEntry};
pub use sections::Section;
pub use session::{Model, OpenOptions, Session};

/// Detect, parse and validate `bytes`.
pub fn open(bytes: impl Into<RawFile>) -> Result<Session> {
    Session::open(bytes)
}
