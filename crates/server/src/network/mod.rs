//! TCP transport for the file service.
//!
//! - [`connection`]: length-prefixed frames over any async byte stream
//! - [`session`]: the per-connection request loop
//! - [`listener`]: accept loop, session registry and graceful shutdown
//! - [`client`]: the client library used by tools and tests

pub mod client;
pub mod connection;
pub mod listener;
pub mod session;

pub use client::{save_download, ClientError, FileClient};
pub use connection::{ConnectionError, FramedConnection};
pub use listener::{Server, SessionInfo, SessionRegistry};
pub use session::{Session, SessionEnd};
