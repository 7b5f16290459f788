use crate::detect::Format;
use crate::edit::EditSet;
use crate::error::Result;
use crate::header::Header;
use crate::platform::Platform;
use crate::sections::Section;

/// What the session and the serializer need from a parsed format.
///
/// ELF and PE models share nothing else; each owns its own structures.
pub trait ExecutableModel: Sized + std::fmt::Debug {
    const FORMAT: Format;

    /// Build the model from the whole file.
    fn parse(data: &[u8]) -> Result<Self>;

    /// Check the layout rules of the format against the model.
    fn validate(&self) -> Result<()>;

    /// Edits staged so far.
    fn edits(&self) -> &EditSet;

    fn header(&self) -> &dyn Header;

    fn platform(&self) -> Platform;

    fn sections(&self) -> Vec<Section>;

    /// Length of the file the model was parsed from.
    fn file_len(&self) -> u64;
}
