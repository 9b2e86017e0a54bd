//! Sandboxed filesystem access for the export root.
//!
//! This module provides:
//! - Logical path resolution with containment checks ([`resolver`])
//! - List, remove, copy and read operations on resolved paths ([`operations`])
//! - Command execution under the shared export-root lock ([`service`])
//! - Client-facing error messages ([`error`])
//!
//! # Security
//!
//! Every path from a client goes through [`ExportRoot::resolve`] or
//! [`ExportRoot::resolve_for_creation`] before it reaches the filesystem.
//! Both canonicalize and reject anything that lands outside the root.

pub mod error;
pub mod operations;
pub mod resolver;
pub mod service;

pub use error::{ErrorKind, FileError};
pub use operations::{Entry, Fetched, Listed};
pub use resolver::{ExportRoot, ResolveError};
pub use service::FileService;
