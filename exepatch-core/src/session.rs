use crate::bytes::{ByteSource, RawFile};
use crate::detect::{detect, Format};
use crate::elf::{ElfEditor, ElfModel};
use crate::error::{Error, Result};
use crate::header::Header;
use crate::model::ExecutableModel;
use crate::pe::{PeEditor, PeModel};
use crate::platform::Platform;
use crate::rpath::RPath;
use crate::sections::Section;
use crate::serialize::serialize;
use std::path::Path;

/// Settings for [`Session::open_with`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenOptions {
    /// Refuse files built for anything else.
    pub expected_platform: Option<Platform>,
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expected_platform(mut self, platform: Platform) -> Self {
        self.expected_platform = Some(platform);
        self
    }
}

/// The parsed model of whichever format was detected.
#[derive(Debug, Clone)]
pub enum Model {
    Elf(ElfModel),
    Pe(PeModel),
}

/// One file from open to serialize.
///
/// The session owns the original bytes and the model. Edits go through
/// [`Session::elf_editor`] or [`Session::pe_editor`] and stay staged until
/// [`Session::serialize`], which leaves the session usable afterwards.
#[derive(Debug)]
pub struct Session {
    raw: RawFile,
    model: Model,
}

fn parse_validated<M: ExecutableModel>(data: &[u8]) -> Result<M> {
    let model = M::parse(data)?;
    model.validate()?;
    Ok(model)
}

impl Session {
    /// Detect, parse and validate with default options.
    pub fn open(raw: impl Into<RawFile>) -> Result<Self> {
        Self::open_with(raw, OpenOptions::default())
    }

    pub fn open_with(raw: impl Into<RawFile>, options: OpenOptions) -> Result<Self> {
        let raw = raw.into();
        let format = detect(&raw)?;
        log::info!("detected {format} ({} bytes)", raw.len());
        let model = match format {
            Format::Elf => Model::Elf(parse_validated(raw.as_bytes())?),
            Format::Pe => Model::Pe(parse_validated(raw.as_bytes())?),
            Format::Unknown => return Err(Error::UnrecognizedFormat),
        };
        let session = Self { raw, model };

        if let Some(expected) = options.expected_platform {
            let found = session.platform();
            if found != expected {
                return Err(Error::PlatformMismatch { expected, found });
            }
        }
        Ok(session)
    }

    /// Read `path` and open it.
    pub fn load<P: AsRef<Path>>(path: P, options: OpenOptions) -> Result<Self> {
        Self::open_with(RawFile::load(path)?, options)
    }

    pub fn format(&self) -> Format {
        match self.model {
            Model::Elf(_) => Format::Elf,
            Model::Pe(_) => Format::Pe,
        }
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn raw(&self) -> &RawFile {
        &self.raw
    }

    pub fn elf(&self) -> Option<&ElfModel> {
        match &self.model {
            Model::Elf(model) => Some(model),
            Model::Pe(_) => None,
        }
    }

    pub fn pe(&self) -> Option<&PeModel> {
        match &self.model {
            Model::Pe(model) => Some(model),
            Model::Elf(_) => None,
        }
    }

    pub fn elf_editor(&mut self) -> Option<ElfEditor<'_>> {
        match &mut self.model {
            Model::Elf(model) => Some(ElfEditor::new(self.raw.as_bytes(), model)),
            Model::Pe(_) => None,
        }
    }

    pub fn pe_editor(&mut self) -> Option<PeEditor<'_>> {
        match &mut self.model {
            Model::Pe(model) => Some(PeEditor::new(self.raw.as_bytes(), model)),
            Model::Elf(_) => None,
        }
    }

    /// The original bytes with every staged edit applied.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        match &self.model {
            Model::Elf(model) => serialize(&self.raw, model),
            Model::Pe(model) => serialize(&self.raw, model),
        }
    }

    pub fn header(&self) -> &dyn Header {
        match &self.model {
            Model::Elf(model) => ExecutableModel::header(model),
            Model::Pe(model) => ExecutableModel::header(model),
        }
    }

    pub fn platform(&self) -> Platform {
        match &self.model {
            Model::Elf(model) => model.platform(),
            Model::Pe(model) => model.platform(),
        }
    }

    pub fn sections(&self) -> Vec<Section> {
        match &self.model {
            Model::Elf(model) => ExecutableModel::sections(model),
            Model::Pe(model) => ExecutableModel::sections(model),
        }
    }

    pub fn is_executable_or_shared_library(&self) -> bool {
        self.header().is_executable_or_shared_library()
    }

    pub fn contains_debug_symbols(&self) -> bool {
        match &self.model {
            Model::Elf(model) => model.contains_debug_symbols(),
            Model::Pe(model) => model.contains_debug_symbols(),
        }
    }

    /// DT_NEEDED names, or imported then delay-loaded DLLs.
    pub fn needed_shared_libraries(&self) -> Result<Vec<String>> {
        match &self.model {
            Model::Elf(model) => model.needed(self.raw.as_bytes()),
            Model::Pe(model) => model.needed(self.raw.as_bytes()),
        }
    }

    /// Library search path of an ELF file; always empty for PE.
    pub fn run_path(&self) -> Result<RPath> {
        match &self.model {
            Model::Elf(model) => model.run_path(self.raw.as_bytes()),
            Model::Pe(_) => Ok(RPath::new()),
        }
    }
}
