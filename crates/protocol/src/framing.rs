//! Frame codec for length-prefixed framing with optional LZ4 compression.
//!
//! # Frame Format
//!
//! Each frame consists of:
//! - 4 bytes: magic bytes "RMFS"
//! - 4 bytes: content length (big-endian, includes flags byte)
//! - 1 byte: flags (bit 0 = compressed)
//! - N bytes: payload (possibly LZ4 compressed)
//!
//! A stream reader accumulates bytes and calls [`FrameCodec::try_decode`]
//! until a whole frame is available, so a single socket read may carry a
//! partial frame or several frames back to back.
//!
//! # Compression
//!
//! Payloads larger than 1KB are compressed with LZ4 when compression is
//! enabled and the compressed form is actually smaller. Hex-encoded file
//! content compresses well, which offsets the 2x expansion of hex.

use crate::error::{ProtocolError, Result};

/// Magic bytes identifying a remofs frame.
pub const FRAME_MAGIC: [u8; 4] = *b"RMFS";

/// Compression threshold in bytes. Payloads larger than this are compressed.
pub const COMPRESSION_THRESHOLD: usize = 1024;

/// Default maximum frame size (64 MB).
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Frame header size: 4 (magic) + 4 (length) + 1 (flags) = 9 bytes.
pub const FRAME_HEADER_SIZE: usize = 9;

/// Magic + length prefix, without the flags byte.
const PREFIX_SIZE: usize = 8;

/// Flags indicating frame properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameFlags(u8);

impl FrameFlags {
    /// Flag indicating the payload is LZ4 compressed.
    pub const COMPRESSED: u8 = 0b0000_0001;

    /// Create a new empty flags set.
    #[inline]
    pub fn new() -> Self {
        Self(0)
    }

    /// Create flags from a raw byte value.
    #[inline]
    pub fn from_byte(byte: u8) -> Self {
        Self(byte)
    }

    /// Get the raw byte value of the flags.
    #[inline]
    pub fn as_byte(self) -> u8 {
        self.0
    }

    /// Check if the compressed flag is set.
    #[inline]
    pub fn is_compressed(self) -> bool {
        self.0 & Self::COMPRESSED != 0
    }

    /// Set the compressed flag.
    #[inline]
    pub fn set_compressed(&mut self, compressed: bool) {
        if compressed {
            self.0 |= Self::COMPRESSED;
        } else {
            self.0 &= !Self::COMPRESSED;
        }
    }

    /// Return a new flags with compressed set.
    #[inline]
    pub fn with_compressed(mut self, compressed: bool) -> Self {
        self.set_compressed(compressed);
        self
    }
}

/// A frame containing a header and payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame flags.
    pub flags: FrameFlags,
    /// The payload data (uncompressed form).
    pub payload: Vec<u8>,
}

impl Frame {
    /// Create a new frame with the given payload.
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            flags: FrameFlags::new(),
            payload,
        }
    }
}

/// Encoder and decoder for frames.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    /// Whether to enable compression for large payloads.
    compression_enabled: bool,
    /// Largest frame accepted or produced, header included. Applies to the
    /// decompressed payload as well as to the bytes on the wire.
    max_frame_size: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCodec {
    /// Create a new frame codec with compression enabled.
    pub fn new() -> Self {
        Self {
            compression_enabled: true,
            max_frame_size: MAX_FRAME_SIZE,
        }
    }

    /// Create a new frame codec with compression disabled.
    pub fn without_compression() -> Self {
        Self {
            compression_enabled: false,
            max_frame_size: MAX_FRAME_SIZE,
        }
    }

    /// Set the maximum frame size.
    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    /// Enable or disable compression.
    pub fn set_compression(&mut self, enabled: bool) {
        self.compression_enabled = enabled;
    }

    /// The maximum frame size this codec enforces.
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Encode a frame into bytes.
    pub fn encode(&self, frame: &Frame) -> Result<Vec<u8>> {
        let payload = &frame.payload;

        // The peer checks the decompressed size against the same limit
        let raw_size = FRAME_HEADER_SIZE + payload.len();
        if raw_size > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                size: raw_size,
                max: self.max_frame_size,
            });
        }

        let should_compress = self.compression_enabled && payload.len() > COMPRESSION_THRESHOLD;

        let compressed;
        let (encoded_payload, flags): (&[u8], FrameFlags) = if should_compress {
            compressed = lz4_flex::compress_prepend_size(payload);
            // Only use compression if it actually reduces size
            if compressed.len() < payload.len() {
                (&compressed, FrameFlags::new().with_compressed(true))
            } else {
                (payload, frame.flags)
            }
        } else {
            (payload, frame.flags)
        };

        let total_size = FRAME_HEADER_SIZE + encoded_payload.len();
        if total_size > self.max_frame_size || total_size - PREFIX_SIZE > u32::MAX as usize {
            return Err(ProtocolError::FrameTooLarge {
                size: total_size,
                max: self.max_frame_size,
            });
        }

        // Content = flags byte + payload
        let content_len = 1 + encoded_payload.len();

        let mut output = Vec::with_capacity(total_size);
        output.extend_from_slice(&FRAME_MAGIC);
        output.extend_from_slice(&(content_len as u32).to_be_bytes());
        output.push(flags.as_byte());
        output.extend_from_slice(encoded_payload);

        Ok(output)
    }

    /// Decode a frame from bytes.
    ///
    /// Returns the decoded frame and the number of bytes consumed.
    pub fn decode(&self, data: &[u8]) -> Result<(Frame, usize)> {
        if data.len() < FRAME_HEADER_SIZE {
            return Err(ProtocolError::Deserialization(format!(
                "insufficient data for frame header: need {} bytes, have {}",
                FRAME_HEADER_SIZE,
                data.len()
            )));
        }

        let content_len = self.check_prefix(data)?;

        if data.len() < PREFIX_SIZE + content_len {
            return Err(ProtocolError::Deserialization(format!(
                "insufficient data for frame: need {} bytes, have {}",
                PREFIX_SIZE + content_len,
                data.len()
            )));
        }

        // Content must have at least the flags byte
        if content_len < 1 {
            return Err(ProtocolError::Deserialization(
                "invalid frame: content length must be at least 1 for flags byte".to_string(),
            ));
        }

        let flags = FrameFlags::from_byte(data[PREFIX_SIZE]);
        let payload_data = &data[FRAME_HEADER_SIZE..PREFIX_SIZE + content_len];

        let payload = if flags.is_compressed() {
            self.check_decompressed_size(payload_data)?;
            lz4_flex::decompress_size_prepended(payload_data).map_err(|e| {
                ProtocolError::Deserialization(format!("failed to decompress payload: {}", e))
            })?
        } else {
            payload_data.to_vec()
        };

        let frame = Frame {
            flags: FrameFlags::new(), // payload is now decompressed
            payload,
        };

        Ok((frame, PREFIX_SIZE + content_len))
    }

    /// Try to decode a frame from bytes, returning None if there isn't enough data.
    ///
    /// Bad magic and oversized length prefixes are reported as soon as the
    /// header is visible, without waiting for the body.
    pub fn try_decode(&self, data: &[u8]) -> Result<Option<(Frame, usize)>> {
        if data.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        let content_len = self.check_prefix(data)?;

        if data.len() < PREFIX_SIZE + content_len {
            return Ok(None);
        }

        self.decode(data).map(Some)
    }

    /// Validate magic and length prefix, returning the content length.
    fn check_prefix(&self, data: &[u8]) -> Result<usize> {
        let magic = [data[0], data[1], data[2], data[3]];
        if magic != FRAME_MAGIC {
            return Err(ProtocolError::InvalidFrameMagic {
                expected: u32::from_be_bytes(FRAME_MAGIC),
                got: u32::from_be_bytes(magic),
            });
        }

        let content_len = u32::from_be_bytes([data[4], data[5], data[6], data[7]]) as usize;

        let total_frame_size = PREFIX_SIZE + content_len;
        if total_frame_size > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                size: total_frame_size,
                max: self.max_frame_size,
            });
        }

        Ok(content_len)
    }

    /// Validate the little-endian size LZ4 prepends to a compressed payload
    /// before anything is allocated for it.
    fn check_decompressed_size(&self, compressed: &[u8]) -> Result<()> {
        let Some(size) = compressed.first_chunk::<4>() else {
            return Err(ProtocolError::Deserialization(
                "invalid frame: compressed payload is missing its size".to_string(),
            ));
        };

        let size = FRAME_HEADER_SIZE.saturating_add(u32::from_le_bytes(*size) as usize);
        if size > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                size,
                max: self.max_frame_size,
            });
        }

        Ok(())
    }
}
