use crate::detect::Format;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OperatingSystem {
    #[default]
    Unknown,
    Linux,
    Windows,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProcessorIsa {
    #[default]
    Unknown,
    X86_32,
    X86_64,
    Aarch64,
    Arm,
}

/// What a binary was built for, as far as its headers tell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Platform {
    pub operating_system: OperatingSystem,
    pub file_format: Format,
    pub processor_isa: ProcessorIsa,
}

impl Platform {
    pub fn new(
        operating_system: OperatingSystem,
        file_format: Format,
        processor_isa: ProcessorIsa,
    ) -> Self {
        Self {
            operating_system,
            file_format,
            processor_isa,
        }
    }

    /// True when any component could not be determined.
    pub fn is_null(&self) -> bool {
        self.operating_system == OperatingSystem::Unknown
            || self.file_format == Format::Unknown
            || self.processor_isa == ProcessorIsa::Unknown
    }

    pub fn supports_rpath(&self) -> bool {
        self.file_format == Format::Elf
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}/{}/{:?}",
            self.operating_system, self.file_format, self.processor_isa
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_elf_supports_rpath() {
        let linux = Platform::new(OperatingSystem::Linux, Format::Elf, ProcessorIsa::X86_64);
        let windows = Platform::new(OperatingSystem::Windows, Format::Pe, ProcessorIsa::X86_64);
        assert!(linux.supports_rpath());
        assert!(!windows.supports_rpath());
        assert!(!Platform::default().supports_rpath());
    }

    #[test]
    fn null_when_any_part_is_unknown() {
        assert!(Platform::default().is_null());
        let partial = Platform::new(OperatingSystem::Linux, Format::Elf, ProcessorIsa::Unknown);
        assert!(partial.is_null());
        let windows = Platform::new(OperatingSystem::Windows, Format::Pe, ProcessorIsa::X86_32);
        assert!(!windows.is_null());
        let arm = Platform::new(OperatingSystem::Linux, Format::Elf, ProcessorIsa::Aarch64);
        assert_eq!(arm.to_string(), "Linux/ELF/Aarch64");
    }
}
