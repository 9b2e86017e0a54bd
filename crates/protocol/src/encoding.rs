//! Printable encodings for binary file content.
//!
//! Download responses never embed raw bytes in JSON. File content is
//! rendered as hex (lowercase, the format older clients expect) or standard
//! base64, and the response names the encoding it used.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, Result};

/// Encoding applied to file content inside a download response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContentEncoding {
    /// Lowercase hexadecimal, two characters per byte.
    #[default]
    Hex,
    /// Standard base64 with padding.
    Base64,
}

impl ContentEncoding {
    /// Name used on the wire and in configuration.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hex => "hex",
            Self::Base64 => "base64",
        }
    }

    /// Render bytes as printable text.
    pub fn encode(self, bytes: &[u8]) -> String {
        match self {
            Self::Hex => hex::encode(bytes),
            Self::Base64 => STANDARD.encode(bytes),
        }
    }

    /// Recover bytes from printable text.
    pub fn decode(self, text: &str) -> Result<Vec<u8>> {
        let decoded = match self {
            Self::Hex => hex::decode(text).map_err(|e| e.to_string()),
            Self::Base64 => STANDARD.decode(text).map_err(|e| e.to_string()),
        };
        decoded.map_err(|reason| ProtocolError::InvalidContent {
            encoding: self.as_str(),
            reason,
        })
    }
}

impl std::fmt::Display for ContentEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ContentEncoding {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hex" => Ok(Self::Hex),
            "base64" => Ok(Self::Base64),
            other => Err(format!("unknown content encoding: {other}")),
        }
    }
}
