//! Protocol message definitions for remofs.
//!
//! Requests and responses are JSON objects. A request names its command in
//! the `command` field:
//!
//! ```json
//! {"command": "cp", "source": "reports", "destination": "backup/reports"}
//! ```
//!
//! A response always has `status` and `message`; listing and download
//! responses flatten a typed payload next to them:
//!
//! ```json
//! {"status": "success", "message": "File retrieved: a.txt",
//!  "type": "file", "name": "a.txt", "content": "6869", "encoding": "hex"}
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::encoding::ContentEncoding;
use crate::error::Result;

/// Wire names of every command the server understands.
pub const COMMAND_NAMES: &[&str] = &["ls", "rm", "cp", "get"];

/// A client request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command")]
pub enum Command {
    /// Describe a file or list a directory's immediate children.
    #[serde(rename = "ls")]
    List {
        /// Logical path; empty lists the export root.
        #[serde(default)]
        path: String,
    },
    /// Delete a file or a whole directory tree.
    #[serde(rename = "rm")]
    Remove {
        /// Logical path of the target.
        path: String,
    },
    /// Copy a file or a directory tree.
    #[serde(rename = "cp")]
    Copy {
        /// Logical path to copy from.
        source: String,
        /// Logical path to copy to.
        destination: String,
    },
    /// Download a file or every regular file under a directory.
    #[serde(rename = "get")]
    Get {
        /// Logical path of the target.
        path: String,
    },
}

impl Command {
    /// The command's wire name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::List { .. } => "ls",
            Self::Remove { .. } => "rm",
            Self::Copy { .. } => "cp",
            Self::Get { .. } => "get",
        }
    }
}

/// Response status discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// The command completed.
    Success,
    /// The command failed; `message` says why.
    Error,
}

/// Kind of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// A regular file.
    File,
    /// A directory.
    Directory,
}

/// One child in a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Entry name, not a path.
    pub name: String,
    /// Entry kind.
    #[serde(rename = "type")]
    pub kind: EntryKind,
    /// Size in bytes, omitted for directories.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// Payload of a successful `ls`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Listing {
    /// The path named a file.
    File {
        /// File name.
        name: String,
        /// Size in bytes.
        size: u64,
    },
    /// The path named a directory.
    Directory {
        /// Immediate children.
        files: Vec<FileEntry>,
    },
}

/// Payload of a successful `get`. Content is printable-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Download {
    /// The path named a file.
    File {
        /// File name.
        name: String,
        /// Encoded file content.
        content: String,
        /// Encoding applied to `content`.
        encoding: ContentEncoding,
    },
    /// The path named a directory.
    Directory {
        /// Directory name.
        name: String,
        /// Encoded content keyed by path relative to the export root.
        files: BTreeMap<String, String>,
        /// Encoding applied to every value in `files`.
        encoding: ContentEncoding,
    },
}

impl Download {
    /// Decode the payload into `(relative path, bytes)` pairs.
    ///
    /// A file download yields a single pair keyed by the file name.
    pub fn decode_files(&self) -> Result<Vec<(String, Vec<u8>)>> {
        match self {
            Self::File {
                name,
                content,
                encoding,
            } => Ok(vec![(name.clone(), encoding.decode(content)?)]),
            Self::Directory {
                files, encoding, ..
            } => files
                .iter()
                .map(|(path, content)| Ok((path.clone(), encoding.decode(content)?)))
                .collect(),
        }
    }
}

/// Command-specific response payload.
///
/// Listing and download payloads share the `type` tag values, so the two are
/// told apart by shape: listings carry `size`/an entry array, downloads carry
/// `content`/a content map plus `encoding`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    /// Result of `ls`.
    Listing(Listing),
    /// Result of `get`.
    Download(Download),
}

/// A server response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// Outcome.
    pub status: Status,
    /// Human-readable message, shown to the user verbatim.
    pub message: String,
    /// Optional command-specific payload, flattened into the object.
    #[serde(flatten)]
    pub payload: Option<Payload>,
}

impl Response {
    /// A success response with no payload.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: Status::Success,
            message: message.into(),
            payload: None,
        }
    }

    /// A success response carrying a payload.
    pub fn with_payload(message: impl Into<String>, payload: Payload) -> Self {
        Self {
            status: Status::Success,
            message: message.into(),
            payload: Some(payload),
        }
    }

    /// An error response.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            message: message.into(),
            payload: None,
        }
    }

    /// Whether the command succeeded.
    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    /// The listing payload, if any.
    pub fn listing(&self) -> Option<&Listing> {
        match &self.payload {
            Some(Payload::Listing(listing)) => Some(listing),
            _ => None,
        }
    }

    /// The download payload, if any.
    pub fn download(&self) -> Option<&Download> {
        match &self.payload {
            Some(Payload::Download(download)) => Some(download),
            _ => None,
        }
    }
}
