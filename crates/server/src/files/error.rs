//! Errors surfaced to clients by file commands.
//!
//! The `Display` text of every variant is the message sent back in an
//! error response, so it is written for the person at the client.

use std::io;

use protocol::ProtocolError;
use thiserror::Error;

use super::resolver::ResolveError;

/// Broad category of a [`FileError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The path escapes the export root or is otherwise unusable.
    InvalidPath,
    /// The target does not exist.
    NotFound,
    /// The destination is already occupied.
    AlreadyExists,
    /// The request could not be parsed or lacks a required argument.
    Malformed,
    /// The filesystem reported an error.
    IoFailure,
    /// The request named a command the server does not implement.
    Unknown,
}

/// Errors that can occur while serving a file command.
#[derive(Debug, Error)]
pub enum FileError {
    /// The path resolves outside the export root.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// The export root itself may not be removed.
    #[error("Cannot remove the export root")]
    RemoveRoot,

    /// A directory may not be copied into its own subtree.
    #[error("Cannot copy a directory into itself: {0}")]
    CopyIntoSelf(String),

    /// Source and destination are the same file.
    #[error("Source and destination are the same: {0}")]
    SameFile(String),

    /// Listed path does not exist.
    #[error("Path does not exist: {0}")]
    PathNotFound(String),

    /// Removed or downloaded path does not exist.
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Copy source does not exist.
    #[error("Source not found: {0}")]
    SourceNotFound(String),

    /// Copy destination already exists.
    #[error("Destination already exists: {0}")]
    DestinationExists(String),

    /// A required path argument was empty.
    #[error("No file path provided")]
    MissingPath,

    /// A copy argument was empty.
    #[error("Source and destination paths are required")]
    MissingCopyPaths,

    /// The request could not be decoded.
    #[error("Invalid command format")]
    Malformed {
        /// What was wrong with the request, for logging.
        reason: String,
    },

    /// The request named an unknown command.
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// The filesystem reported an error.
    #[error("Error {action}: {source}")]
    Io {
        /// What the server was doing, e.g. "removing path".
        action: &'static str,
        /// Underlying error.
        source: io::Error,
    },

    /// The blocking task running the operation failed.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FileError {
    /// The category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FileError::InvalidPath(_)
            | FileError::RemoveRoot
            | FileError::CopyIntoSelf(_)
            | FileError::SameFile(_) => ErrorKind::InvalidPath,
            FileError::PathNotFound(_)
            | FileError::FileNotFound(_)
            | FileError::SourceNotFound(_) => ErrorKind::NotFound,
            FileError::DestinationExists(_) => ErrorKind::AlreadyExists,
            FileError::MissingPath
            | FileError::MissingCopyPaths
            | FileError::Malformed { .. } => ErrorKind::Malformed,
            FileError::UnknownCommand(_) => ErrorKind::Unknown,
            FileError::Io { .. } | FileError::Internal(_) => ErrorKind::IoFailure,
        }
    }

    /// Attach an action to an IO error.
    pub fn io(action: &'static str) -> impl FnOnce(io::Error) -> FileError {
        move |source| FileError::Io { action, source }
    }

    /// Convert a resolver error for `logical`, choosing the not-found flavour.
    pub(crate) fn from_resolve(
        err: ResolveError,
        action: &'static str,
        not_found: fn(String) -> FileError,
    ) -> FileError {
        match err {
            ResolveError::OutsideRoot(path) => FileError::InvalidPath(path),
            ResolveError::NotFound(path) => not_found(path),
            ResolveError::Io(source) => FileError::Io { action, source },
            ResolveError::NotADirectory(path) => FileError::Internal(format!(
                "export root is not a directory: {}",
                path.display()
            )),
        }
    }
}

impl From<ProtocolError> for FileError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::UnknownCommand(name) => FileError::UnknownCommand(name),
            ProtocolError::MalformedCommand { reason } => FileError::Malformed { reason },
            other => FileError::Malformed {
                reason: other.to_string(),
            },
        }
    }
}
