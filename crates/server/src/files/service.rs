//! File commands executed under the shared export-root lock.
//!
//! [`FileService`] is cloned into every session. All four commands acquire
//! the same mutex, then resolve and operate on the blocking thread pool with
//! the guard moved into the blocking task. A command that has started always
//! runs to completion under the lock, even if its session goes away.

use std::fs;
use std::sync::Arc;

use protocol::{ContentEncoding, Download, Listing, Payload, Response};
use tokio::sync::Mutex;

use super::error::FileError;
use super::operations::{self, Entry, Fetched, Listed};
use super::resolver::ExportRoot;

/// Executes file commands against one export root.
#[derive(Debug, Clone)]
pub struct FileService {
    root: Arc<ExportRoot>,
    encoding: ContentEncoding,
    lock: Arc<Mutex<()>>,
}

impl FileService {
    /// Create a service for `root`, encoding downloads with `encoding`.
    pub fn new(root: ExportRoot, encoding: ContentEncoding) -> Self {
        Self {
            root: Arc::new(root),
            encoding,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// The export root.
    pub fn root(&self) -> &ExportRoot {
        &self.root
    }

    /// Describe a file or list a directory.
    pub async fn list(&self, path: String) -> Result<Response, FileError> {
        self.run(move |root, _| list_path(root, &path)).await
    }

    /// Remove a file or directory tree.
    pub async fn remove(&self, path: String) -> Result<Response, FileError> {
        self.run(move |root, _| remove_path(root, &path)).await
    }

    /// Copy a file or directory tree.
    pub async fn copy(&self, source: String, destination: String) -> Result<Response, FileError> {
        self.run(move |root, _| copy_path(root, &source, &destination))
            .await
    }

    /// Read a file or directory tree for download.
    pub async fn get(&self, path: String) -> Result<Response, FileError> {
        self.run(move |root, encoding| get_path(root, encoding, &path))
            .await
    }

    async fn run<F>(&self, op: F) -> Result<Response, FileError>
    where
        F: FnOnce(&ExportRoot, ContentEncoding) -> Result<Response, FileError> + Send + 'static,
    {
        let guard = Arc::clone(&self.lock).lock_owned().await;
        let root = Arc::clone(&self.root);
        let encoding = self.encoding;

        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            op(&root, encoding)
        })
        .await
        .map_err(|e| FileError::Internal(e.to_string()))?
    }
}

fn list_path(root: &ExportRoot, path: &str) -> Result<Response, FileError> {
    const ACTION: &str = "listing path";

    let resolved = root
        .resolve(path)
        .map_err(|e| FileError::from_resolve(e, ACTION, FileError::PathNotFound))?;

    let response = match operations::list(root, &resolved).map_err(FileError::io(ACTION))? {
        Listed::File(Entry { name, size, .. }) => Response::with_payload(
            format!("File: {name}, Size: {size} bytes"),
            Payload::Listing(Listing::File { name, size }),
        ),
        Listed::Directory(entries) => {
            let label = if path.is_empty() { "root directory" } else { path };
            Response::with_payload(
                format!("Contents of {label}:"),
                Payload::Listing(Listing::Directory {
                    files: entries.iter().map(Entry::to_protocol).collect(),
                }),
            )
        }
    };

    Ok(response)
}

fn remove_path(root: &ExportRoot, path: &str) -> Result<Response, FileError> {
    const ACTION: &str = "removing path";

    if path.is_empty() {
        return Err(FileError::MissingPath);
    }

    let resolved = root
        .resolve_link(path)
        .map_err(|e| FileError::from_resolve(e, ACTION, FileError::FileNotFound))?;

    if root.is_root(&resolved) {
        return Err(FileError::RemoveRoot);
    }

    let message = match operations::remove(&resolved).map_err(FileError::io(ACTION))? {
        protocol::EntryKind::Directory => format!("Directory and all contents removed: {path}"),
        protocol::EntryKind::File => format!("File removed successfully: {path}"),
    };

    Ok(Response::success(message))
}

fn copy_path(root: &ExportRoot, source: &str, destination: &str) -> Result<Response, FileError> {
    if source.is_empty() || destination.is_empty() {
        return Err(FileError::MissingCopyPaths);
    }

    let src = root
        .resolve(source)
        .map_err(|e| FileError::from_resolve(e, "copying", FileError::SourceNotFound))?;
    let dst = root
        .resolve_for_creation(destination)
        .map_err(|e| FileError::from_resolve(e, "copying", FileError::InvalidPath))?;

    if src.is_dir() {
        if fs::symlink_metadata(&dst).is_ok() {
            return Err(FileError::DestinationExists(destination.to_string()));
        }
        if dst.starts_with(&src) {
            return Err(FileError::CopyIntoSelf(destination.to_string()));
        }

        operations::copy_tree(&src, &dst).map_err(FileError::io("copying directory"))?;
        Ok(Response::success(format!(
            "Directory copied from {source} to {destination}"
        )))
    } else {
        if dst.is_dir() {
            return Err(FileError::DestinationExists(destination.to_string()));
        }
        if dst == src {
            return Err(FileError::SameFile(destination.to_string()));
        }

        operations::copy_file(&src, &dst).map_err(FileError::io("copying file"))?;
        Ok(Response::success(format!(
            "File copied from {source} to {destination}"
        )))
    }
}

fn get_path(
    root: &ExportRoot,
    encoding: ContentEncoding,
    path: &str,
) -> Result<Response, FileError> {
    const ACTION: &str = "reading path";

    if path.is_empty() {
        return Err(FileError::MissingPath);
    }

    let resolved = root
        .resolve(path)
        .map_err(|e| FileError::from_resolve(e, ACTION, FileError::FileNotFound))?;

    let response = match operations::fetch(root, &resolved).map_err(FileError::io(ACTION))? {
        Fetched::File { name, content } => Response::with_payload(
            format!("File retrieved: {path}"),
            Payload::Download(Download::File {
                name,
                content: encoding.encode(&content),
                encoding,
            }),
        ),
        Fetched::Directory { name, files } => Response::with_payload(
            format!("Directory contents retrieved: {path}"),
            Payload::Download(Download::Directory {
                name,
                files: files
                    .into_iter()
                    .map(|(key, content)| (key, encoding.encode(&content)))
                    .collect(),
                encoding,
            }),
        ),
    };

    Ok(response)
}
