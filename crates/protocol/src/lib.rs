//! # remofs Protocol Library
//!
//! Wire definitions for the remofs remote file service.
//!
//! ## Overview
//!
//! A client talks to the server over a persistent TCP connection. Each
//! request carries exactly one [`Command`] and is answered by exactly one
//! [`Response`]. The crate provides:
//!
//! - **Message Definitions**: commands, responses and their payloads
//! - **Codec**: JSON encoding/decoding with protocol-level error mapping
//! - **Content Encodings**: hex or base64 rendering of binary file content
//! - **Frame Codec**: length-prefixed framing with optional LZ4 compression
//!
//! ## Layering
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        Commands / Responses             │  JSON, hex/base64 content
//! ├─────────────────────────────────────────┤
//! │              Framing                    │  Length-prefixed, LZ4
//! ├─────────────────────────────────────────┤
//! │              Transport (TCP)            │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust
//! use protocol::{codec, Command, Frame, FrameCodec};
//!
//! let bytes = codec::encode_command(&Command::List { path: "docs".into() }).unwrap();
//! let frame_bytes = FrameCodec::new().encode(&Frame::new(bytes)).unwrap();
//!
//! let (frame, consumed) = FrameCodec::new().decode(&frame_bytes).unwrap();
//! assert_eq!(consumed, frame_bytes.len());
//! let command = codec::decode_command(&frame.payload).unwrap();
//! assert_eq!(command.name(), "ls");
//! ```
//!
//! ## Modules
//!
//! - [`messages`]: Command and response definitions
//! - [`codec`]: JSON codec for requests and responses
//! - [`encoding`]: Printable encodings for binary content
//! - [`framing`]: Frame codec with compression
//! - [`error`]: Error types

pub mod codec;
pub mod encoding;
pub mod error;
pub mod framing;
pub mod messages;

pub use encoding::ContentEncoding;
pub use error::{ProtocolError, Result};
pub use framing::{
    Frame, FrameCodec, FrameFlags, COMPRESSION_THRESHOLD, FRAME_HEADER_SIZE, FRAME_MAGIC,
    MAX_FRAME_SIZE,
};
pub use messages::{
    Command, Download, EntryKind, FileEntry, Listing, Payload, Response, Status,
};
