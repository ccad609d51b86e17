//! Error taxonomy for the DWARF engine.
//!
//! Normal parsing is permissive: every recoverable failure is handed to an
//! [`ErrorHandler`], which decides whether the surrounding operation halts or
//! skips the offending unit/section and keeps going.

use std::path::PathBuf;
use std::rc::Rc;

use thiserror::Error;

/// Everything that can go wrong while decoding debug info.
#[derive(Debug, Error)]
pub enum Error {
    /// A unit, table or section header contains nonsense.
    #[error("malformed header at offset {offset:#x}: {reason}")]
    MalformedHeader { offset: u64, reason: &'static str },

    /// A form code that we don't know how to decode, or an indirection chain
    /// that is too deep.
    #[error("invalid form {form} at offset {offset:#x}")]
    InvalidForm { form: gimli::DwForm, offset: u64 },

    /// An offset that points outside of the section it refers to.
    #[error("offset {offset:#x} is outside of {section} (size {size:#x})")]
    OutOfBoundsOffset {
        section: &'static str,
        offset: u64,
        size: u64,
    },

    /// A unit or table version we don't support.
    #[error("unsupported version {version} at offset {offset:#x}")]
    UnsupportedVersion { version: u16, offset: u64 },

    /// A read ran off the end of the data.
    #[error("truncated data: {size} bytes needed at offset {offset:#x}")]
    TruncatedSection { offset: u64, size: u64 },

    /// A LEB128 value that doesn't fit in 64 bits.
    #[error("malformed LEB128 value at offset {offset:#x}")]
    MalformedLeb128 { offset: u64 },

    /// An entry uses an abbreviation code its table doesn't declare.
    #[error("abbreviation code {code} for entry at {offset:#x} is not declared")]
    UnknownAbbreviation { code: u64, offset: u64 },

    /// A `.dwo` or `.dwp` file could not be opened or parsed.
    #[error("split debug file {} is unavailable: {source}", .path.display())]
    SplitFileUnavailable {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A structural inconsistency found by the verifier.
    #[error("verification failed: {0}")]
    VerificationViolation(String),

    /// The primary file could not be read from disk.
    #[error("reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The container file could not be parsed.
    #[error("object file: {0}")]
    Object(#[from] object::Error),

    /// The call frame information parser rejected a section.
    #[error("call frame information: {0}")]
    Frame(#[from] gimli::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Decision returned by an [`ErrorHandler`] for a recoverable error.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorPolicy {
    /// Stop constructing the current context or section.
    Halt,
    /// Skip the offending unit or section and keep going.
    Continue,
}

/// Caller-supplied policy for recoverable errors. Contexts opened for split
/// files share their owner's handler.
pub type ErrorHandler = Rc<dyn Fn(&Error) -> ErrorPolicy>;

/// Handler used when the caller doesn't supply one: log and keep going.
pub fn default_error_handler(err: &Error) -> ErrorPolicy {
    tracing::warn!(%err, "recoverable DWARF error");
    ErrorPolicy::Continue
}

/// Handler that stops at the first error. Handy in tests and for strict
/// tooling.
pub fn halt_on_error(err: &Error) -> ErrorPolicy {
    tracing::debug!(%err, "halting on DWARF error");
    ErrorPolicy::Halt
}
