//! # remofs Server Library
//!
//! This crate provides the server side of remofs, a remote file service that
//! exposes one sandboxed directory tree to many clients over TCP.
//!
//! ## Overview
//!
//! Clients connect, send framed JSON commands and receive one response per
//! command. The server provides:
//!
//! - **Path Sandbox**: every client path is canonicalized and must stay
//!   inside the export root
//! - **File Operations**: list, remove, copy and download (files or whole
//!   directory trees, binary-safe)
//! - **Concurrency**: one task per connection, with a single lock
//!   serializing filesystem operations server-wide
//! - **Client Library**: a matching client that can save downloads locally
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  Server (listener)                   │
//! │        accept loop · session registry · shutdown     │
//! ├─────────────────────────────────────────────────────┤
//! │   Session   │   Session   │   Session   │    ...     │
//! ├─────────────────────────────────────────────────────┤
//! │                   Command Router                     │
//! ├─────────────────────────────────────────────────────┤
//! │        File Service (shared lock, blocking pool)     │
//! ├──────────────────────────┬──────────────────────────┤
//! │      Path Resolver       │   Filesystem Operations   │
//! └──────────────────────────┴──────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use server::{Config, Server};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load_default()?;
//!     let server = Server::from_config(&config).await?;
//!
//!     let shutdown = CancellationToken::new();
//!     server.serve(shutdown).await
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and validation
//! - [`files`]: Path resolution, filesystem operations and the file service
//! - [`router`]: Request decoding and command dispatch
//! - [`network`]: Framed connections, sessions, listener and client

pub mod config;
pub mod files;
pub mod network;
pub mod router;

pub use config::{Config, ConfigError};
pub use files::{ErrorKind, ExportRoot, FileError, FileService};
pub use network::{ClientError, ConnectionError, FileClient, Server, SessionInfo};
pub use router::CommandRouter;
