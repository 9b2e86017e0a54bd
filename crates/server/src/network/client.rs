//! Client for talking to a remofs server.
//!
//! The client connects over TCP and sends commands, receiving responses in a
//! request-response pattern. Downloads can be written to a local directory
//! with [`save_download`], which recreates the remote relative layout.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use protocol::{codec, Command, Download, FrameCodec, ProtocolError, Response};
use tokio::net::{TcpStream, ToSocketAddrs};

use super::connection::{ConnectionError, FramedConnection};

/// Default timeout for client operations in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Errors that can occur on the client side.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The connection failed.
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// A message could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A downloaded path would land outside the download directory.
    #[error("refusing to write outside the download directory: {0}")]
    UnsafePath(String),

    /// Writing a download failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// An earlier request timed out or broke the transport, so replies on
    /// this connection can no longer be matched to requests.
    #[error("connection is unusable after an earlier failure; reconnect")]
    Poisoned,
}

/// A client connected to a remofs server.
pub struct FileClient {
    conn: FramedConnection<TcpStream>,
    timeout: Duration,
    poisoned: bool,
}

impl FileClient {
    /// Connect to the server at `addr`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, ClientError> {
        Self::connect_with_timeout(addr, Duration::from_secs(DEFAULT_TIMEOUT_SECS)).await
    }

    /// Connect with a custom timeout, used for the connect and for every
    /// request after it.
    pub async fn connect_with_timeout<A: ToSocketAddrs>(
        addr: A,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ConnectionError::Timeout)?
            .map_err(ConnectionError::Io)?;
        stream.set_nodelay(true).map_err(ConnectionError::Io)?;

        Ok(Self {
            conn: FramedConnection::new(stream, FrameCodec::new()),
            timeout,
            poisoned: false,
        })
    }

    /// Use a specific frame codec, e.g. to match a server's size limit.
    pub fn with_codec(mut self, codec: FrameCodec) -> Self {
        self.conn.set_codec(codec);
        self
    }

    /// Set the timeout for operations.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Send a command and wait for its response.
    ///
    /// # Errors
    ///
    /// Returns an error on timeout, transport failure, or an undecodable
    /// response. An error *response* from the server is returned as `Ok`.
    pub async fn send(&mut self, command: &Command) -> Result<Response, ClientError> {
        let body = codec::encode_command(command)?;
        self.send_raw(body).await
    }

    /// Send an arbitrary request body and wait for the response.
    ///
    /// A timeout or transport failure poisons the client: a late reply may
    /// still arrive, so every later call fails with [`ClientError::Poisoned`]
    /// and the caller has to connect again.
    pub async fn send_raw(&mut self, body: Vec<u8>) -> Result<Response, ClientError> {
        if self.poisoned {
            return Err(ClientError::Poisoned);
        }

        let result = match tokio::time::timeout(self.timeout, self.send_internal(body)).await {
            Ok(result) => result,
            Err(_) => Err(ConnectionError::Timeout.into()),
        };

        if matches!(result, Err(ClientError::Connection(_))) {
            self.poisoned = true;
        }
        result
    }

    async fn send_internal(&mut self, body: Vec<u8>) -> Result<Response, ClientError> {
        self.conn.write_frame(body).await?;

        let reply = self
            .conn
            .read_frame()
            .await?
            .ok_or(ConnectionError::Closed)?;

        Ok(codec::decode_response(&reply)?)
    }

    /// List a path; empty lists the export root.
    pub async fn ls(&mut self, path: &str) -> Result<Response, ClientError> {
        self.send(&Command::List {
            path: path.to_string(),
        })
        .await
    }

    /// Remove a file or directory tree.
    pub async fn rm(&mut self, path: &str) -> Result<Response, ClientError> {
        self.send(&Command::Remove {
            path: path.to_string(),
        })
        .await
    }

    /// Copy a file or directory tree.
    pub async fn cp(&mut self, source: &str, destination: &str) -> Result<Response, ClientError> {
        self.send(&Command::Copy {
            source: source.to_string(),
            destination: destination.to_string(),
        })
        .await
    }

    /// Download a file or directory tree.
    pub async fn get(&mut self, path: &str) -> Result<Response, ClientError> {
        self.send(&Command::Get {
            path: path.to_string(),
        })
        .await
    }

    /// Download `path` and write it under `dir`.
    ///
    /// Returns the written files. An error response yields an empty list.
    pub async fn download_to(
        &mut self,
        path: &str,
        dir: &Path,
    ) -> Result<(Response, Vec<PathBuf>), ClientError> {
        let response = self.get(path).await?;
        let written = match response.download() {
            Some(download) => save_download(download, dir)?,
            None => Vec::new(),
        };
        Ok((response, written))
    }
}

/// Write a download payload under `dir`.
///
/// A file download is written as `dir/<name>`; a directory download writes
/// every entry at `dir/<relative path>`, creating parent directories. Any
/// name that is absolute or contains `..` is refused before anything is
/// written.
pub fn save_download(download: &Download, dir: &Path) -> Result<Vec<PathBuf>, ClientError> {
    let files = download.decode_files()?;

    let targets = files
        .iter()
        .map(|(rel, _)| safe_join(dir, rel))
        .collect::<Result<Vec<_>, _>>()?;

    for (target, (_, content)) in targets.iter().zip(&files) {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(target, content)?;
    }

    Ok(targets)
}

fn safe_join(base: &Path, rel: &str) -> Result<PathBuf, ClientError> {
    let mut joined = base.to_path_buf();
    let mut depth = 0;

    for component in Path::new(rel).components() {
        match component {
            Component::Normal(name) => {
                joined.push(name);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ClientError::UnsafePath(rel.to_string()));
            }
        }
    }

    if depth == 0 {
        return Err(ClientError::UnsafePath(rel.to_string()));
    }

    Ok(joined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::ContentEncoding;
    use std::collections::BTreeMap;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_timeout_poisons_client() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Accepts and reads, never replies
        let silent = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            while socket.read(&mut buf).await.unwrap_or(0) > 0 {}
        });

        let mut client = FileClient::connect(addr).await.unwrap();
        client.set_timeout(Duration::from_millis(50));

        let err = client.ls("").await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Connection(ConnectionError::Timeout)
        ));

        let err = client.ls("").await.unwrap_err();
        assert!(matches!(err, ClientError::Poisoned));

        drop(client);
        silent.await.unwrap();
    }

    #[test]
    fn test_safe_join() {
        let base = Path::new("/tmp/downloads");
        assert_eq!(
            safe_join(base, "reports/a.txt").unwrap(),
            base.join("reports/a.txt")
        );
        assert_eq!(safe_join(base, "./a.txt").unwrap(), base.join("a.txt"));

        for bad in ["../a.txt", "/etc/passwd", "a/../../b", "", "."] {
            assert!(
                matches!(safe_join(base, bad), Err(ClientError::UnsafePath(_))),
                "{bad} should be refused"
            );
        }
    }

    #[test]
    fn test_save_directory_download() {
        let temp = TempDir::new().unwrap();
        let mut files = BTreeMap::new();
        files.insert("reports/a.txt".to_string(), "6869".to_string());
        files.insert("reports/sub/b.txt".to_string(), "627965".to_string());
        let download = Download::Directory {
            name: "reports".to_string(),
            files,
            encoding: ContentEncoding::Hex,
        };

        let written = save_download(&download, temp.path()).unwrap();
        assert_eq!(written.len(), 2);
        assert_eq!(fs::read(temp.path().join("reports/a.txt")).unwrap(), b"hi");
        assert_eq!(
            fs::read(temp.path().join("reports/sub/b.txt")).unwrap(),
            b"bye"
        );
    }

    #[test]
    fn test_save_file_download() {
        let temp = TempDir::new().unwrap();
        let download = Download::File {
            name: "blob.bin".to_string(),
            content: "AP8=".to_string(),
            encoding: ContentEncoding::Base64,
        };

        save_download(&download, temp.path()).unwrap();
        assert_eq!(fs::read(temp.path().join("blob.bin")).unwrap(), vec![0x00, 0xff]);
    }

    #[test]
    fn test_escaping_download_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("downloads");
        let mut files = BTreeMap::new();
        files.insert("ok.txt".to_string(), "6869".to_string());
        files.insert("../escape.txt".to_string(), "6869".to_string());
        let download = Download::Directory {
            name: "x".to_string(),
            files,
            encoding: ContentEncoding::Hex,
        };

        let err = save_download(&download, &dest).unwrap_err();
        assert!(matches!(err, ClientError::UnsafePath(_)));
        assert!(!dest.join("ok.txt").exists());
        assert!(!temp.path().join("escape.txt").exists());
    }
}
