use crate::bytes::ByteRange;
use crate::edit::{Edit, EditTarget};
use crate::error::{Error, Result};
use crate::pe::reader::PeModel;

/// In-place mutations of a [`PeModel`].
///
/// DLL names can be replaced by names that fit in the bytes of the original
/// name and its terminator. Descriptor RVAs never change.
#[derive(Debug)]
pub struct PeEditor<'a> {
    data: &'a [u8],
    model: &'a mut PeModel,
}

impl<'a> PeEditor<'a> {
    /// `data` must be the bytes `model` was parsed from.
    pub fn new(data: &'a [u8], model: &'a mut PeModel) -> Self {
        Self { data, model }
    }

    pub fn model(&self) -> &PeModel {
        self.model
    }

    pub fn imported_dlls(&self) -> Result<Vec<String>> {
        self.model.imported_dlls(self.data)
    }

    pub fn delay_loaded_dlls(&self) -> Result<Vec<String>> {
        self.model.delay_loaded_dlls(self.data)
    }

    /// Rename the DLL of import descriptor `index`.
    pub fn set_imported_dll_name(&mut self, index: usize, name: &str) -> Result<()> {
        let range = self
            .model
            .imports
            .get(index)
            .map(|e| e.name_range)
            .ok_or_else(|| Error::not_found(format!("import descriptor #{index}")))?;
        self.stage_name(range, name)
    }

    /// Rename the DLL of delay-load descriptor `index`.
    pub fn set_delay_loaded_dll_name(&mut self, index: usize, name: &str) -> Result<()> {
        let range = self
            .model
            .delay_imports
            .get(index)
            .map(|e| e.name_range)
            .ok_or_else(|| Error::not_found(format!("delay-load descriptor #{index}")))?;
        self.stage_name(range, name)
    }

    fn stage_name(&mut self, range: ByteRange, name: &str) -> Result<()> {
        let target = EditTarget::DllName {
            offset: range.offset,
        };
        let others = self
            .model
            .imports
            .iter()
            .map(|e| e.name_range)
            .chain(self.model.delay_imports.iter().map(|e| e.name_range));
        for other in others {
            if other != range && other.overlaps(&range) {
                return Err(Error::violation(
                    target.to_string(),
                    range.offset,
                    format!("name shares bytes with the DLL name at {other}"),
                ));
            }
        }
        let edit = Edit::padded_string(target, range, name)?;
        log::info!("{target} -> {name:?} (capacity {})", range.len);
        self.model.edits.stage(edit);
        Ok(())
    }
}
