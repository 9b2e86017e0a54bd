//! Framed byte stream shared by the server session and the client.
//!
//! Reads accumulate in a [`BytesMut`] buffer and are handed to
//! [`FrameCodec::try_decode`] until a whole frame is available, so partial
//! socket reads and several frames arriving together are both handled.

use std::io;

use bytes::{Buf, BytesMut};
use protocol::{Frame, FrameCodec, ProtocolError};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Initial capacity of the read buffer.
const READ_BUFFER_CAPACITY: usize = 8 * 1024;

/// Errors that can occur on a framed connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A frame or message could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The peer closed the connection in the middle of a frame.
    #[error("connection closed mid-frame with {0} bytes buffered")]
    ClosedMidFrame(usize),

    /// The peer closed the connection before a response arrived.
    #[error("connection closed by peer")]
    Closed,

    /// No data arrived within the allowed time.
    #[error("connection timed out")]
    Timeout,
}

/// A stream carrying length-prefixed frames.
#[derive(Debug)]
pub struct FramedConnection<S> {
    stream: S,
    buffer: BytesMut,
    codec: FrameCodec,
}

impl<S> FramedConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap a stream.
    pub fn new(stream: S, codec: FrameCodec) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(READ_BUFFER_CAPACITY),
            codec,
        }
    }

    /// Replace the frame codec.
    pub fn set_codec(&mut self, codec: FrameCodec) {
        self.codec = codec;
    }

    /// Read the next frame's payload.
    ///
    /// Returns `None` if the peer closed the connection cleanly between
    /// frames. Cancel-safe: bytes already read stay buffered.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream fails, the frame header is invalid, or
    /// the peer disconnects part-way through a frame.
    pub async fn read_frame(&mut self) -> Result<Option<Vec<u8>>, ConnectionError> {
        loop {
            if let Some((frame, consumed)) = self.codec.try_decode(&self.buffer)? {
                self.buffer.advance(consumed);
                return Ok(Some(frame.payload));
            }

            if self.stream.read_buf(&mut self.buffer).await? == 0 {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Err(ConnectionError::ClosedMidFrame(self.buffer.len()));
            }
        }
    }

    /// Frame and send a payload.
    ///
    /// Nothing is written if the frame would exceed the codec's maximum
    /// size; the error is [`ProtocolError::FrameTooLarge`] and the
    /// connection remains usable.
    pub async fn write_frame(&mut self, payload: Vec<u8>) -> Result<(), ConnectionError> {
        let bytes = self.codec.encode(&Frame::new(payload))?;
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Shut down the write half of the stream.
    pub async fn shutdown(&mut self) -> Result<(), ConnectionError> {
        self.stream.shutdown().await?;
        Ok(())
    }
}
