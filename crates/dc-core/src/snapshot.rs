//! Snapshots of client state and the read-only view handed to consumers.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{BoincState, ClientConfig, ClientId, FahState, PollError, ProtocolFamily};

// ============================================================================
// State Snapshot
// ============================================================================

/// The latest complete decoded state of one client.
///
/// Always replaced as a whole; consumers never see a partially updated value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum StateSnapshot {
    Boinc(BoincState),
    Fah(FahState),
}

impl StateSnapshot {
    /// The snapshot of a client that has never delivered data.
    pub fn empty(family: ProtocolFamily) -> Self {
        match family {
            ProtocolFamily::Boinc => Self::Boinc(BoincState::default()),
            ProtocolFamily::Fah => Self::Fah(FahState::default()),
        }
    }

    pub fn family(&self) -> ProtocolFamily {
        match self {
            Self::Boinc(_) => ProtocolFamily::Boinc,
            Self::Fah(_) => ProtocolFamily::Fah,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Boinc(state) => state.is_empty(),
            Self::Fah(state) => state.is_empty(),
        }
    }

    pub fn as_boinc(&self) -> Option<&BoincState> {
        match self {
            Self::Boinc(state) => Some(state),
            Self::Fah(_) => None,
        }
    }

    pub fn as_fah(&self) -> Option<&FahState> {
        match self {
            Self::Fah(state) => Some(state),
            Self::Boinc(_) => None,
        }
    }
}

// ============================================================================
// Connection State
// ============================================================================

/// Where a client is in its connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No connection; eligible for the next scan
    #[default]
    Absent,
    /// Claimed by a scan, handshake in progress
    Connecting,
    /// Authenticated and owned by a polling task
    Live,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Connecting => "connecting",
            Self::Live => "live",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Client View
// ============================================================================

/// Read-only view of one client for the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientView {
    pub id: ClientId,
    pub family: ProtocolFamily,
    pub name: String,
    pub address: String,
    pub port: u16,
    pub state: ConnectionState,
    /// Last connect/auth/decode/fetch error, cleared on a successful handshake
    pub last_error: Option<PollError>,
    pub snapshot: Arc<StateSnapshot>,
    pub connected_since: Option<DateTime<Utc>>,
    pub last_update: Option<DateTime<Utc>>,
}

impl ClientView {
    /// View of a configured client that has not been polled yet.
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            id: config.id(),
            family: config.family,
            name: config.name.clone(),
            address: config.address.clone(),
            port: config.port,
            state: ConnectionState::Absent,
            last_error: None,
            snapshot: Arc::new(StateSnapshot::empty(config.family)),
            connected_since: None,
            last_update: None,
        }
    }

    pub fn is_live(&self) -> bool {
        self.state == ConnectionState::Live
    }

    /// Status label for display: the error text when there is one.
    pub fn status_label(&self) -> String {
        match (&self.last_error, self.state) {
            (Some(err), ConnectionState::Absent) => err.to_string(),
            _ => self.state.to_string(),
        }
    }
}
