//! Command router for dispatching decoded requests to the file service.
//!
//! This module provides the `CommandRouter` struct that turns a request body
//! into exactly one [`Response`]. Decode failures and file errors become
//! error responses; nothing here closes a connection.

use protocol::{codec, Command, Response};
use tracing::{debug, info, warn};

use crate::files::{FileError, FileService};

/// Router that dispatches commands to the file service.
#[derive(Debug, Clone)]
pub struct CommandRouter {
    /// File service shared by every session.
    service: FileService,
}

impl CommandRouter {
    /// Create a new router over the given file service.
    pub fn new(service: FileService) -> Self {
        Self { service }
    }

    /// Decode a request body and route it.
    pub async fn handle_request(&self, body: &[u8]) -> Response {
        match codec::decode_command(body) {
            Ok(command) => self.route(command).await,
            Err(e) => {
                let err = FileError::from(e);
                if let FileError::Malformed { reason } = &err {
                    debug!(%reason, "Malformed request");
                }
                warn!(kind = ?err.kind(), error = %err, "Rejected request");
                Response::error(err.to_string())
            }
        }
    }

    /// Route a command to the matching handler.
    pub async fn route(&self, command: Command) -> Response {
        let name = command.name();
        let target = describe_target(&command);
        debug!(command = name, path = %target, "Routing command");

        let result = match command {
            Command::List { path } => self.service.list(path).await,
            Command::Remove { path } => self.service.remove(path).await,
            Command::Copy {
                source,
                destination,
            } => self.service.copy(source, destination).await,
            Command::Get { path } => self.service.get(path).await,
        };

        match result {
            Ok(response) => {
                info!(command = name, path = %target, "{}", response.message);
                response
            }
            Err(e) => {
                warn!(command = name, path = %target, kind = ?e.kind(), error = %e, "Command failed");
                Response::error(e.to_string())
            }
        }
    }
}

fn describe_target(command: &Command) -> String {
    match command {
        Command::List { path } | Command::Remove { path } | Command::Get { path } => path.clone(),
        Command::Copy {
            source,
            destination,
        } => format!("{source} -> {destination}"),
    }
}
