//! Protocol adapters.
//!
//! An adapter establishes an authenticated connection to one client; the
//! resulting [`LiveConnection`] fetches state until it fails. Liveness is
//! tracked by the registry, not by the adapter.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use dc_core::{ClientConfig, ClientId, PollError, ProtocolFamily, StateSnapshot};

mod boinc;
mod fah;

pub use boinc::{BoincAdapter, BoincConnection};
pub use fah::{FahAdapter, FahConnection};

/// Default bound on every frame read and write.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(30);

/// Connects and authenticates clients of one protocol family.
#[async_trait]
pub trait ProtocolAdapter: Send + Sync + 'static {
    type Connection: LiveConnection;

    fn family(&self) -> ProtocolFamily;

    /// Opens and authenticates a connection.
    ///
    /// # Errors
    ///
    /// `PollError::Connect` for invalid endpoints and dial failures,
    /// `PollError::Auth` for any failure during the handshake.
    async fn connect(&self, config: &ClientConfig) -> Result<Self::Connection, PollError>;
}

/// An authenticated connection owned by one polling task.
#[async_trait]
pub trait LiveConnection: Send + 'static {
    /// Runs one fetch cycle.
    ///
    /// `current` is the snapshot published by the previous cycle, used when
    /// only part of the state could be refreshed.
    async fn fetch_state(&mut self, current: &StateSnapshot) -> Result<StateSnapshot, FetchFailure>;

    /// Closes the connection.
    async fn disconnect(self);
}

/// A failed fetch cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchFailure {
    pub error: PollError,
    /// Snapshot to publish despite the failure; `None` keeps the current one
    pub replacement: Option<StateSnapshot>,
}

impl FetchFailure {
    /// Request failed: the prior snapshot stays.
    pub fn keep(error: PollError) -> Self {
        Self {
            error,
            replacement: None,
        }
    }

    /// The cycle produced (part of) a new snapshot before failing.
    pub fn replace(error: PollError, snapshot: StateSnapshot) -> Self {
        Self {
            error,
            replacement: Some(snapshot),
        }
    }
}

/// Timeouts and logging shared by both adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdapterTimeouts {
    pub connect: Duration,
    pub io: Duration,
}

/// Raw frame logging for clients configured with `debug: true`.
#[derive(Debug, Clone)]
pub(crate) struct FrameLog {
    client: ClientId,
    enabled: bool,
}

impl FrameLog {
    pub(crate) fn new(config: &ClientConfig) -> Self {
        Self {
            client: config.id(),
            enabled: config.debug,
        }
    }

    pub(crate) fn sent(&self, what: &dyn fmt::Display) {
        if self.enabled {
            info!(client = %self.client, "send: {}", what);
        }
    }

    pub(crate) fn received(&self, frame: &[u8]) {
        if self.enabled {
            info!(client = %self.client, "recv: {:?}", String::from_utf8_lossy(frame));
        }
    }
}
