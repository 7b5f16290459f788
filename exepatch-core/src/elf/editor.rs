use crate::bytes::ByteRange;
use crate::edit::{Edit, EditTarget};
use crate::elf::dynamic::{encode_entry, DT_REMOVED};
use crate::elf::reader::ElfModel;
use crate::error::{Error, Result};
use crate::rpath::RPath;
use goblin::elf::dynamic::{DT_NEEDED, DT_RPATH, DT_RUNPATH};

/// In-place mutations of an [`ElfModel`].
///
/// Every operation checks the new value against the space the original file
/// reserved for it and either stages one edit or leaves the model untouched.
/// Nothing is written until the session serializes.
#[derive(Debug)]
pub struct ElfEditor<'a> {
    data: &'a [u8],
    model: &'a mut ElfModel,
}

impl<'a> ElfEditor<'a> {
    /// `data` must be the bytes `model` was parsed from.
    pub fn new(data: &'a [u8], model: &'a mut ElfModel) -> Self {
        Self { data, model }
    }

    pub fn model(&self) -> &ElfModel {
        self.model
    }

    /// Overwrite the PT_INTERP path. Capacity is the segment's `p_filesz`.
    pub fn set_interpreter(&mut self, path: &str) -> Result<()> {
        let range = self
            .model
            .interpreter
            .ok_or_else(|| Error::not_found("PT_INTERP segment"))?;
        let edit = Edit::padded_string(EditTarget::Interpreter, range, path)?;
        log::info!("interpreter -> {path:?} (capacity {})", range.len);
        self.model.edits.stage(edit);
        Ok(())
    }

    pub fn interpreter(&self) -> Result<Option<String>> {
        self.model.interpreter(self.data)
    }

    /// Replace the DT_RUNPATH string. Fails with `EntryNotFound` when the file has none.
    pub fn set_run_path(&mut self, value: &str) -> Result<()> {
        self.set_dynamic_string(DT_RUNPATH, "DT_RUNPATH", value)
    }

    /// Replace the DT_RPATH string. Fails with `EntryNotFound` when the file has none.
    pub fn set_rpath(&mut self, value: &str) -> Result<()> {
        self.set_dynamic_string(DT_RPATH, "DT_RPATH", value)
    }

    pub fn set_run_path_entries(&mut self, rpath: &RPath) -> Result<()> {
        self.set_run_path(&rpath.to_elf_string())
    }

    pub fn run_path(&self) -> Result<Option<String>> {
        self.model.runpath(self.data)
    }

    pub fn rpath(&self) -> Result<Option<String>> {
        self.model.rpath(self.data)
    }

    pub fn list_needed(&self) -> Result<Vec<String>> {
        self.model.needed(self.data)
    }

    /// Neutralise every DT_NEEDED entry naming `name`.
    ///
    /// The entries keep their slot; their tag becomes [`DT_REMOVED`] so that
    /// later entries and all string offsets stay where they are.
    pub fn remove_needed(&mut self, name: &str) -> Result<()> {
        let dynamic = self
            .model
            .dynamic
            .as_ref()
            .ok_or_else(|| Error::not_found("dynamic section"))?;

        let mut matching = Vec::new();
        for entry in dynamic.find_all(DT_NEEDED) {
            if self.model.dynamic_string(self.data, entry.value)? == name {
                matching.push((entry.index, dynamic.entry_range(entry)));
            }
        }
        if matching.is_empty() {
            return Err(Error::not_found(format!("DT_NEEDED {name}")));
        }

        let ctx = self.model.header.ctx();
        for (index, range) in matching {
            self.model.edits.stage(Edit {
                target: EditTarget::DynamicEntry { index },
                range,
                bytes: encode_entry(ctx, DT_REMOVED, 0),
            });
            let dynamic = self.model.dynamic.as_mut();
            if let Some(entry) = dynamic.and_then(|d| d.entry_mut(index)) {
                entry.tag = DT_REMOVED;
                entry.value = 0;
            }
            log::info!("removed DT_NEEDED {name} (dynamic entry #{index})");
        }
        Ok(())
    }

    fn set_dynamic_string(&mut self, tag: u64, tag_name: &str, value: &str) -> Result<()> {
        let entry = self
            .model
            .dynamic
            .as_ref()
            .and_then(|d| d.find(tag))
            .copied()
            .ok_or_else(|| Error::not_found(tag_name))?;
        let (strtab, table) = self.model.dynamic_strtab(self.data)?;
        let range = strtab.entry_range(table, entry.value)?;
        self.check_unshared(range, tag_name)?;

        let target = EditTarget::DynamicString {
            offset: range.offset,
        };
        let edit = Edit::padded_string(target, range, value)?;
        log::info!("{tag_name} -> {value:?} (capacity {})", range.len);
        self.model.edits.stage(edit);
        Ok(())
    }

    /// A linker may point one entry into the tail of another entry's string.
    /// Rewriting such a string would silently change the other entry too.
    fn check_unshared(&self, range: ByteRange, tag_name: &str) -> Result<()> {
        let Some(dynamic) = &self.model.dynamic else {
            return Ok(());
        };
        let (strtab, table) = self.model.dynamic_strtab(self.data)?;
        for other in dynamic.entries.iter().filter(|e| e.refers_to_string()) {
            let other_range = strtab.entry_range(table, other.value)?;
            if other_range != range && other_range.overlaps(&range) {
                let other_name = other.tag_name();
                let reason = format!("string shares bytes with DT_{other_name} at {other_range}");
                return Err(Error::violation(tag_name, range.offset, reason));
            }
        }
        Ok(())
    }
}
