//! One client connection, served until it closes.
//!
//! A session reads one request, answers it, and repeats. Requests on a
//! session are handled strictly in order. A shutdown signal closes a session
//! that is waiting for a request; one that is busy finishes the request and
//! writes its response first.

use std::time::Duration;

use protocol::{codec, ProtocolError, Response};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::connection::{ConnectionError, FramedConnection};
use crate::router::CommandRouter;

/// Why a session ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client closed the connection.
    ClientClosed,
    /// The server is shutting down.
    Shutdown,
}

/// A connected client.
pub struct Session<S> {
    conn: FramedConnection<S>,
    router: CommandRouter,
    idle_timeout: Option<Duration>,
    shutdown: CancellationToken,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Create a session over an accepted connection.
    ///
    /// The caller instruments [`Session::run`] with a span carrying the
    /// session id and peer address.
    pub fn new(
        conn: FramedConnection<S>,
        router: CommandRouter,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            conn,
            router,
            idle_timeout: None,
            shutdown,
        }
    }

    /// Close the session after this long without a request.
    pub fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Serve requests until the client disconnects or the server shuts down.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, an invalid frame, or an idle
    /// timeout. Bad requests are answered, not returned as errors.
    pub async fn run(mut self) -> Result<SessionEnd, ConnectionError> {
        info!("Client connected");
        let shutdown = self.shutdown.clone();

        loop {
            let body = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    debug!("Closing idle session for shutdown");
                    if let Err(e) = self.conn.shutdown().await {
                        debug!(error = %e, "Failed to shut down connection");
                    }
                    return Ok(SessionEnd::Shutdown);
                }
                read = self.next_request() => read?,
            };

            let Some(body) = body else {
                return Ok(SessionEnd::ClientClosed);
            };

            debug!(bytes = body.len(), "Request received");
            let response = self.router.handle_request(&body).await;
            self.send_response(&response).await?;
        }
    }

    async fn next_request(&mut self) -> Result<Option<Vec<u8>>, ConnectionError> {
        match self.idle_timeout {
            Some(limit) => tokio::time::timeout(limit, self.conn.read_frame())
                .await
                .map_err(|_| ConnectionError::Timeout)?,
            None => self.conn.read_frame().await,
        }
    }

    async fn send_response(&mut self, response: &Response) -> Result<(), ConnectionError> {
        let body = codec::encode_response(response)?;

        match self.conn.write_frame(body).await {
            Err(ConnectionError::Protocol(ProtocolError::FrameTooLarge { size, max })) => {
                warn!(size, max, "Response exceeds frame limit");
                let fallback = Response::error(format!(
                    "Response too large: {size} bytes exceeds maximum of {max} bytes"
                ));
                self.conn
                    .write_frame(codec::encode_response(&fallback)?)
                    .await
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::{ExportRoot, FileService};
    use protocol::{Command, ContentEncoding, FrameCodec, Status};
    use std::fs;
    use tempfile::TempDir;
    use tokio::io::{duplex, DuplexStream};

    fn create_test_router() -> (TempDir, CommandRouter) {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.txt"), "hi").unwrap();
        let root = ExportRoot::open(temp.path(), false).unwrap();
        (
            temp,
            CommandRouter::new(FileService::new(root, ContentEncoding::Hex)),
        )
    }

    fn spawn_session(
        router: CommandRouter,
        codec: FrameCodec,
        shutdown: CancellationToken,
    ) -> (
        FramedConnection<DuplexStream>,
        tokio::task::JoinHandle<Result<SessionEnd, ConnectionError>>,
    ) {
        let (client, server) = duplex(64 * 1024);
        let session = Session::new(FramedConnection::new(server, codec), router, shutdown);
        let handle = tokio::spawn(session.run());
        (FramedConnection::new(client, FrameCodec::new()), handle)
    }

    async fn request(conn: &mut FramedConnection<DuplexStream>, body: &[u8]) -> Response {
        conn.write_frame(body.to_vec()).await.unwrap();
        let reply = conn.read_frame().await.unwrap().unwrap();
        codec::decode_response(&reply).unwrap()
    }

    #[tokio::test]
    async fn test_bad_requests_keep_session_open() {
        let (_temp, router) = create_test_router();
        let (mut client, handle) =
            spawn_session(router, FrameCodec::new(), CancellationToken::new());

        let response = request(&mut client, b"{{{").await;
        assert_eq!(response.message, "Invalid command format");

        let response = request(&mut client, br#"{"command":"chmod"}"#).await;
        assert_eq!(response.message, "Unknown command: chmod");

        let response = request(&mut client, br#"{"command":"ls","path":"a.txt"}"#).await;
        assert!(response.is_success());

        drop(client);
        assert_eq!(handle.await.unwrap().unwrap(), SessionEnd::ClientClosed);
    }

    #[tokio::test]
    async fn test_oversized_response_becomes_error() {
        let (temp, router) = create_test_router();
        fs::write(temp.path().join("big.bin"), vec![0xAB; 4096]).unwrap();

        let limited = FrameCodec::without_compression().with_max_frame_size(2048);
        let (mut client, _handle) = spawn_session(router, limited, CancellationToken::new());

        let body = codec::encode_command(&Command::Get {
            path: "big.bin".to_string(),
        })
        .unwrap();
        let response = request(&mut client, &body).await;
        assert_eq!(response.status, Status::Error);
        assert!(response.message.starts_with("Response too large"));

        // The session is still usable
        let response = request(&mut client, br#"{"command":"ls"}"#).await;
        assert!(response.is_success());
    }

    #[tokio::test]
    async fn test_shutdown_closes_idle_session() {
        let (_temp, router) = create_test_router();
        let token = CancellationToken::new();
        let (mut client, handle) = spawn_session(router, FrameCodec::new(), token.clone());

        let response = request(&mut client, br#"{"command":"ls"}"#).await;
        assert!(response.is_success());

        token.cancel();
        assert_eq!(handle.await.unwrap().unwrap(), SessionEnd::Shutdown);
        assert!(client.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_idle_timeout() {
        let (_temp, router) = create_test_router();
        let (client, server) = duplex(1024);
        let session = Session::new(
            FramedConnection::new(server, FrameCodec::new()),
            router,
            CancellationToken::new(),
        )
        .with_idle_timeout(Some(Duration::from_millis(50)));

        let result = session.run().await;
        assert!(matches!(result, Err(ConnectionError::Timeout)));
        drop(client);
    }

    #[tokio::test]
    async fn test_invalid_frame_ends_session() {
        let (_temp, router) = create_test_router();
        let (client, server) = duplex(1024);
        let session = Session::new(
            FramedConnection::new(server, FrameCodec::new()),
            router,
            CancellationToken::new(),
        );
        let handle = tokio::spawn(session.run());

        let mut raw = client;
        tokio::io::AsyncWriteExt::write_all(&mut raw, b"NOPE\0\0\0\x01\0")
            .await
            .unwrap();

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(ConnectionError::Protocol(_))));
    }
}
