//! Centralized error types for mailtriage.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the mailtriage library.
///
/// `NoGroupMatch` / `NoPicMatch` are deliberately absent: an unresolvable
/// sender is an expected outcome (see [`crate::engine::assign::AssignOutcome`]).
#[derive(Error, Debug)]
pub enum TriageError {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The file vanished (or never existed).
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Malformed mail, group or PIC JSON.
    #[error("Parse error in '{path}': {reason}")]
    Parse { path: PathBuf, reason: String },

    /// The file does not live in one of the six state folders.
    #[error("Path is not inside a known mail folder: {0}")]
    InvalidLayout(PathBuf),

    /// The `Date` pair could not be interpreted.
    #[error("Invalid Date value {raw} in '{path}'")]
    InvalidDate { path: PathBuf, raw: String },

    /// No mail record carries this id.
    #[error("No mail record with id '{0}'")]
    RecordNotFound(String),

    /// A manual assignment named a group or PIC the directory does not know.
    #[error("Unknown assignee: {0}")]
    UnknownAssignee(String),

    /// The filesystem watcher could not be started.
    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    /// A manual action was requested from a folder it does not apply to.
    #[error("Cannot apply action to mail '{id}': {reason}")]
    InvalidTransition { id: String, reason: String },
}

/// Convenience alias for `Result<T, TriageError>`.
pub type Result<T> = std::result::Result<T, TriageError>;

impl TriageError {
    /// Create an error from a path and an `io::Error`.
    ///
    /// `ErrorKind::NotFound` becomes [`TriageError::NotFound`] so callers can
    /// treat a vanished file as deleted rather than as a disk failure.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            return Self::NotFound(path);
        }
        Self::Io { path, source }
    }

    /// Create a `Parse` variant.
    pub fn parse(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Self::Parse {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the failure is a disk failure worth one retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io { .. })
    }

    /// Whether the file disappeared underneath us.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::RecordNotFound(_))
    }
}

/// Allow `?` on `std::io::Error` when no path context is available
/// (rare; prefer `TriageError::io`).
impl From<std::io::Error> for TriageError {
    fn from(source: std::io::Error) -> Self {
        Self::io(PathBuf::from("<unknown>"), source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_not_found_maps_to_not_found() {
        let err = TriageError::io(
            "/tmp/x.json",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.is_not_found());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_io_other_is_retryable() {
        let err = TriageError::io(
            "/tmp/x.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope"),
        );
        assert!(err.is_retryable());
        assert!(err.to_string().contains("/tmp/x.json"));
    }
}
