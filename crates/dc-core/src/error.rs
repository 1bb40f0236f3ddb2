//! Domain-specific error types following panic-free policy.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ClientId;

/// Errors recorded against a client while establishing or polling a connection.
///
/// None of these are fatal to the process. They are stored on the client
/// record and shown next to the last good snapshot.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum PollError {
    /// TCP dial failure, connect timeout, or a configuration that forbids dialing
    #[error("connect failed: {0}")]
    Connect(String),

    /// Handshake rejected or malformed reply during authentication
    #[error("authentication failed: {0}")]
    Auth(String),

    /// A frame arrived but could not be parsed into the expected structure
    #[error("decode failed: {0}")]
    Decode(String),

    /// State query failed on an established connection
    #[error("fetch failed: {0}")]
    Fetch(String),
}

/// Discriminant of [`PollError`], for matching without the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollErrorKind {
    Connect,
    Auth,
    Decode,
    Fetch,
}

impl PollError {
    /// Creates a connect error from any displayable error.
    pub fn connect<E: std::fmt::Display>(err: E) -> Self {
        Self::Connect(err.to_string())
    }

    /// Creates an authentication error from any displayable error.
    pub fn auth<E: std::fmt::Display>(err: E) -> Self {
        Self::Auth(err.to_string())
    }

    /// Creates a decode error from any displayable error.
    pub fn decode<E: std::fmt::Display>(err: E) -> Self {
        Self::Decode(err.to_string())
    }

    /// Creates a fetch error from any displayable error.
    pub fn fetch<E: std::fmt::Display>(err: E) -> Self {
        Self::Fetch(err.to_string())
    }

    pub fn kind(&self) -> PollErrorKind {
        match self {
            Self::Connect(_) => PollErrorKind::Connect,
            Self::Auth(_) => PollErrorKind::Auth,
            Self::Decode(_) => PollErrorKind::Decode,
            Self::Fetch(_) => PollErrorKind::Fetch,
        }
    }

    /// Returns the message without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Connect(m) | Self::Auth(m) | Self::Decode(m) | Self::Fetch(m) => m,
        }
    }
}

/// Errors raised while loading the fleet configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for the expected shape
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// Two clients of the same family share a name
    #[error("duplicate client: {0}")]
    DuplicateClient(ClientId),
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProtocolFamily;

    #[test]
    fn test_poll_error_display() {
        let err = PollError::connect("connection refused");
        assert_eq!(err.to_string(), "connect failed: connection refused");

        let err = PollError::auth("unauthorized");
        assert_eq!(err.to_string(), "authentication failed: unauthorized");

        let err = PollError::decode("unexpected end of input");
        assert_eq!(err.to_string(), "decode failed: unexpected end of input");

        let err = PollError::fetch("broken pipe");
        assert_eq!(err.to_string(), "fetch failed: broken pipe");
    }

    #[test]
    fn test_poll_error_kind_and_message() {
        let err = PollError::decode("bad xml");
        assert_eq!(err.kind(), PollErrorKind::Decode);
        assert_eq!(err.message(), "bad xml");
        assert_eq!(PollError::connect("x").kind(), PollErrorKind::Connect);
    }

    #[test]
    fn test_poll_error_serializes_with_kind_tag() {
        let json = serde_json::to_value(PollError::auth("nope")).unwrap();
        assert_eq!(json["kind"], "auth");
        assert_eq!(json["message"], "nope");
    }

    #[test]
    fn test_config_error_duplicate_display() {
        let err = ConfigError::DuplicateClient(ClientId::new(ProtocolFamily::Fah, "rig"));
        assert_eq!(err.to_string(), "duplicate client: fah/rig");
    }
}
