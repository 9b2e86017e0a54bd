//! TCP listener that runs one session task per client.
//!
//! The accept loop never stops because a session failed. On shutdown it
//! stops accepting, signals every session, and waits for them to finish.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use dashmap::DashMap;
use protocol::FrameCodec;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::connection::{ConnectionError, FramedConnection};
use super::session::{Session, SessionEnd};
use crate::config::Config;
use crate::files::{ExportRoot, FileService};
use crate::router::CommandRouter;

/// Pause after a failed accept before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// A connected client as recorded in the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    /// Session identifier, also used in log output.
    pub id: Uuid,
    /// Remote address of the client.
    pub peer: SocketAddr,
    /// When the connection was accepted.
    pub connected_at: SystemTime,
}

/// Registry of active sessions.
///
/// Cheap to clone; all clones share the same table.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<Uuid, SessionInfo>>,
}

impl SessionRegistry {
    /// Snapshot of every active session.
    pub fn active_sessions(&self) -> Vec<SessionInfo> {
        self.sessions.iter().map(|e| e.value().clone()).collect()
    }

    /// Number of active sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is active.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn register(&self, info: SessionInfo) {
        self.sessions.insert(info.id, info);
    }

    fn unregister(&self, id: &Uuid) -> Option<SessionInfo> {
        self.sessions.remove(id).map(|(_, info)| info)
    }
}

/// The remote file server.
pub struct Server {
    listener: TcpListener,
    router: CommandRouter,
    codec: FrameCodec,
    idle_timeout: Option<Duration>,
    registry: SessionRegistry,
    tracker: TaskTracker,
}

impl Server {
    /// Bind a listener with `SO_REUSEADDR` and the given backlog.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be created, bound, or put into
    /// listening mode.
    pub async fn bind(addr: SocketAddr, backlog: u32, router: CommandRouter) -> io::Result<Self> {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        let listener = socket.listen(backlog)?;

        Ok(Self {
            listener,
            router,
            codec: FrameCodec::new(),
            idle_timeout: None,
            registry: SessionRegistry::default(),
            tracker: TaskTracker::new(),
        })
    }

    /// Build and bind a server from configuration.
    ///
    /// Opens the export root (creating it if configured to), then binds.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let addr = config.bind_addr()?;

        let root = ExportRoot::open(&config.export.root, config.export.create_if_missing)
            .with_context(|| {
                format!(
                    "Failed to open export root: {}",
                    config.export.root.display()
                )
            })?;
        info!(root = %root.path().display(), "Export root ready");

        let service = FileService::new(root, config.export.content_encoding);
        let router = CommandRouter::new(service);

        let mut codec =
            FrameCodec::new().with_max_frame_size(config.transport.max_frame_size);
        codec.set_compression(config.transport.compression);

        let server = Self::bind(addr, config.server.backlog, router)
            .await
            .with_context(|| format!("Failed to bind {addr}"))?
            .with_codec(codec)
            .with_idle_timeout(config.idle_timeout());

        Ok(server)
    }

    /// Use a specific frame codec for every session.
    pub fn with_codec(mut self, codec: FrameCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Close sessions that stay idle this long.
    pub fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// The bound address.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle to the session registry, usable while the server runs.
    pub fn registry(&self) -> SessionRegistry {
        self.registry.clone()
    }

    /// Snapshot of every active session.
    pub fn active_sessions(&self) -> Vec<SessionInfo> {
        self.registry.active_sessions()
    }

    /// Accept connections until `shutdown` is cancelled.
    ///
    /// After cancellation the listener is closed, idle sessions are closed,
    /// and busy sessions finish their current request. Returns once every
    /// session task has ended.
    pub async fn serve(self, shutdown: CancellationToken) -> Result<()> {
        let addr = self.local_addr()?;
        info!(%addr, "Server listening");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.spawn_session(stream, peer, shutdown.child_token()),
                    Err(e) => {
                        warn!(error = %e, "Failed to accept connection");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
            }
        }

        let Self {
            listener,
            registry,
            tracker,
            ..
        } = self;
        drop(listener);

        info!(sessions = registry.len(), "Stopped accepting, waiting for sessions");
        tracker.close();
        tracker.wait().await;
        info!("Server stopped");

        Ok(())
    }

    fn spawn_session(&self, stream: TcpStream, peer: SocketAddr, shutdown: CancellationToken) {
        if let Err(e) = stream.set_nodelay(true) {
            warn!(%peer, error = %e, "Failed to set TCP_NODELAY");
        }

        let id = Uuid::new_v4();
        self.registry.register(SessionInfo {
            id,
            peer,
            connected_at: SystemTime::now(),
        });

        let session = Session::new(
            FramedConnection::new(stream, self.codec.clone()),
            self.router.clone(),
            shutdown,
        )
        .with_idle_timeout(self.idle_timeout);

        let registry = self.registry.clone();
        let span = info_span!("session", session_id = %id, %peer);

        self.tracker.spawn(
            async move {
                match session.run().await {
                    Ok(SessionEnd::ClientClosed) => info!("Client disconnected"),
                    Ok(SessionEnd::Shutdown) => info!("Session closed for shutdown"),
                    Err(ConnectionError::Timeout) => info!("Session idle timeout"),
                    Err(e) => error!(error = %e, "Session ended with error"),
                }
                registry.unregister(&id);
            }
            .instrument(span),
        );
    }
}
