//! Crate-level error type.
use std::{fmt, io};

use crate::path::RelativePath;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong building, packing, diffing, or applying
/// a virtual directory.
#[derive(Debug)]
pub enum Error {
    /// An export or codec was asked to emit something out of nothing.
    EmptyInput,
    /// A header title mismatch, a truncated payload, or an instruction
    /// range that escapes the declared uncompressed size.
    CorruptFrame { reason: &'static str },
    /// Applying a delta to a directory whose file fingerprints don't match
    /// the delta's recorded old-hashes.
    PreconditionMismatch { path: RelativePath },
    /// Post-patch fingerprint doesn't match the delta's recorded new-hash.
    CorruptPatch { path: RelativePath },
    /// Underlying filesystem read/write failure (import/export only).
    IoFailure { path: Option<RelativePath>, cause: io::Error },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::EmptyInput => write!(f, "nothing to emit: directory has no entries"),
            Error::CorruptFrame { reason } => write!(f, "corrupt frame: {}", reason),
            Error::PreconditionMismatch { path } => {
                write!(f, "precondition mismatch applying patch for {}", path)
            }
            Error::CorruptPatch { path } => {
                write!(f, "corrupt patch: reconstructed content for {} doesn't match", path)
            }
            Error::IoFailure { path: Some(path), cause } => {
                write!(f, "io failure on {}: {}", path, cause)
            }
            Error::IoFailure { path: None, cause } => write!(f, "io failure: {}", cause),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoFailure { cause, .. } => Some(cause),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(cause: io::Error) -> Self {
        Error::IoFailure { path: None, cause }
    }
}
