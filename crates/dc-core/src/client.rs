//! Client identity and static per-client configuration.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::PollError;

/// Lowest port a client may be configured on.
pub const MIN_CLIENT_PORT: u16 = 1024;

/// Refresh interval used when neither the client nor its family sets one.
pub const DEFAULT_REFRESH: Duration = Duration::from_secs(10);

// ============================================================================
// Protocol Family
// ============================================================================

/// The wire protocol spoken by a remote daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolFamily {
    /// BOINC GUI-RPC: XML documents terminated by `0x03`.
    Boinc,
    /// Folding@home command server: text commands, PyON replies ending at `>`.
    Fah,
}

impl ProtocolFamily {
    pub const ALL: [ProtocolFamily; 2] = [ProtocolFamily::Boinc, ProtocolFamily::Fah];

    /// Short lowercase label used in client ids and log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Boinc => "boinc",
            Self::Fah => "fah",
        }
    }

    /// Human-facing name of the daemon flavor.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Boinc => "BOINC",
            Self::Fah => "Folding@home",
        }
    }
}

impl fmt::Display for ProtocolFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Client Id
// ============================================================================

/// Unique identifier for a configured client: `<family>/<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    pub fn new(family: ProtocolFamily, name: &str) -> Self {
        Self(format!("{}/{}", family.as_str(), name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Client Config
// ============================================================================

/// Static configuration of one remote daemon. Immutable after load.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub family: ProtocolFamily,
    pub name: String,
    pub address: String,
    pub port: u16,
    /// GUI-RPC password (BOINC) or command server password (FAH)
    #[serde(skip_serializing, default)]
    pub password: String,
    /// Log every raw frame exchanged with this client
    pub debug: bool,
    pub refresh: Duration,
}

impl ClientConfig {
    /// Creates a config with the default refresh interval and debug off.
    pub fn new(
        family: ProtocolFamily,
        name: impl Into<String>,
        address: impl Into<String>,
        port: u16,
        password: impl Into<String>,
    ) -> Self {
        Self {
            family,
            name: name.into(),
            address: address.into(),
            port,
            password: password.into(),
            debug: false,
            refresh: DEFAULT_REFRESH,
        }
    }

    #[must_use]
    pub fn with_refresh(mut self, refresh: Duration) -> Self {
        self.refresh = refresh;
        self
    }

    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn id(&self) -> ClientId {
        ClientId::new(self.family, &self.name)
    }

    /// Checks that this client may be dialed at all.
    ///
    /// # Errors
    ///
    /// Returns `PollError::Connect` for an empty address or a port below
    /// [`MIN_CLIENT_PORT`]. No socket is touched.
    pub fn validate(&self) -> Result<(), PollError> {
        if self.address.trim().is_empty() {
            return Err(PollError::Connect(format!(
                "invalid configuration for {}: empty address",
                self.id()
            )));
        }
        if self.port < MIN_CLIENT_PORT {
            return Err(PollError::Connect(format!(
                "invalid configuration for {}: port {} is below {}",
                self.id(),
                self.port,
                MIN_CLIENT_PORT
            )));
        }
        Ok(())
    }

    /// `host:port` form used in log fields.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

// The password must never reach logs.
impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("family", &self.family)
            .field("name", &self.name)
            .field("address", &self.address)
            .field("port", &self.port)
            .field("password", &"<redacted>")
            .field("debug", &self.debug)
            .field("refresh", &self.refresh)
            .finish()
    }
}
