//! JSON codec for commands and responses.
//!
//! The server side uses [`decode_command`] and [`encode_response`]; the
//! client side uses the mirror pair. Decoding a command distinguishes an
//! unknown command name from a malformed request so the server can answer
//! each with its own message.

use serde_json::Value;

use crate::error::{ProtocolError, Result};
use crate::messages::{Command, Response, COMMAND_NAMES};

/// Decode a request body into a [`Command`].
///
/// # Errors
///
/// - [`ProtocolError::UnknownCommand`] when `command` names no known command.
/// - [`ProtocolError::MalformedCommand`] when the body is not a JSON object,
///   has no string `command`, or lacks a required argument.
pub fn decode_command(bytes: &[u8]) -> Result<Command> {
    let value: Value = serde_json::from_slice(bytes).map_err(ProtocolError::malformed)?;

    let name = match value.get("command") {
        Some(Value::String(name)) => name.clone(),
        Some(other) => {
            return Err(ProtocolError::malformed(format!(
                "`command` must be a string, got {other}"
            )))
        }
        None => return Err(ProtocolError::malformed("missing field `command`")),
    };

    if !COMMAND_NAMES.contains(&name.as_str()) {
        return Err(ProtocolError::UnknownCommand(name));
    }

    serde_json::from_value(value).map_err(ProtocolError::malformed)
}

/// Encode a command as a request body.
pub fn encode_command(command: &Command) -> Result<Vec<u8>> {
    serde_json::to_vec(command).map_err(|e| ProtocolError::Serialization(e.to_string()))
}

/// Encode a response body.
pub fn encode_response(response: &Response) -> Result<Vec<u8>> {
    serde_json::to_vec(response).map_err(|e| ProtocolError::Serialization(e.to_string()))
}

/// Decode a response body.
pub fn decode_response(bytes: &[u8]) -> Result<Response> {
    Ok(serde_json::from_slice(bytes)?)
}
