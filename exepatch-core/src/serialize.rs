//! Applying staged edits to a copy of the original bytes.

use crate::bytes::{ByteSink, ByteSource, RawFile};
use crate::error::{Error, Result};
use crate::model::ExecutableModel;

/// Produce the edited file.
///
/// The output equals `original` outside the staged ranges and has the same
/// length. The model is validated before, and the output is parsed and
/// validated again after, the edits are applied. Any failure comes back as
/// `SerializationRejected` wrapping the cause, and nothing is returned.
pub fn serialize<M: ExecutableModel>(original: &RawFile, model: &M) -> Result<Vec<u8>> {
    apply(original, model).map_err(|err| {
        log::warn!("serialization of {} rejected: {err}", M::FORMAT);
        Error::SerializationRejected(Box::new(err))
    })
}

fn apply<M: ExecutableModel>(original: &RawFile, model: &M) -> Result<Vec<u8>> {
    if original.len() != model.file_len() {
        let (parsed, got) = (model.file_len(), original.len());
        let reason = format!("model was parsed from {parsed} bytes, got {got}");
        return Err(Error::InvalidValue { reason });
    }
    model.validate()?;
    let edits = model.edits();
    edits.check_disjoint()?;

    let mut out = original.clone();
    for edit in edits.iter() {
        out.write_at(edit.range.offset, &edit.bytes)?;
    }

    if !edits.is_empty() {
        let reparsed = M::parse(out.as_bytes())?;
        reparsed.validate()?;
    }

    log::info!(
        "serialized {} with {} edit(s), {} bytes",
        M::FORMAT,
        edits.len(),
        out.len()
    );
    Ok(out.into_bytes())
}
