use crate::platform::Platform;
use thiserror::Error;

/// Everything that can go wrong while opening, editing or serializing a file.
///
/// Offsets are file offsets into the original bytes.
#[derive(Debug, Error)]
pub enum Error {
    #[error("input truncated: {needed} bytes needed, {available} available")]
    TruncatedInput { needed: u64, available: u64 },

    #[error("unrecognized executable format")]
    UnrecognizedFormat,

    #[error("malformed ELF at {offset:#x}: {reason}")]
    MalformedElf { offset: u64, reason: String },

    #[error("malformed PE at {offset:#x}: {reason}")]
    MalformedPe { offset: u64, reason: String },

    #[error("{entity} at {offset:#x} violates layout rule: {rule}")]
    InvariantViolation {
        entity: String,
        offset: u64,
        rule: String,
    },

    #[error("entry not found: {entry}")]
    EntryNotFound { entry: String },

    #[error("insufficient space for {field}: {required} bytes required, {capacity} allocated")]
    InsufficientSpace {
        field: String,
        required: u64,
        capacity: u64,
    },

    #[error("serialization rejected: {0}")]
    SerializationRejected(Box<Error>),

    #[error("invalid value: {reason}")]
    InvalidValue { reason: String },

    #[error("platform mismatch: expected {expected}, found {found}")]
    PlatformMismatch { expected: Platform, found: Platform },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

pub type OpenError = Error;
pub type EditError = Error;
pub type SerializeError = Error;

impl Error {
    pub(crate) fn malformed_elf(offset: u64, reason: impl Into<String>) -> Self {
        Error::MalformedElf {
            offset,
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed_pe(offset: u64, reason: impl Into<String>) -> Self {
        Error::MalformedPe {
            offset,
            reason: reason.into(),
        }
    }

    pub(crate) fn violation(
        entity: impl Into<String>,
        offset: u64,
        rule: impl Into<String>,
    ) -> Self {
        Error::InvariantViolation {
            entity: entity.into(),
            offset,
            rule: rule.into(),
        }
    }

    pub(crate) fn not_found(entry: impl Into<String>) -> Self {
        Error::EntryNotFound {
            entry: entry.into(),
        }
    }
}
