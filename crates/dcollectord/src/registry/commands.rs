//! Registry actor commands, errors, and events.
//!
//! - `RegistryCommand`: messages sent to the actor
//! - `RegistryError`: failures of registry operations
//! - `ClientEvent`: lifecycle events published to subscribers

use std::fmt;
use std::sync::Arc;

use dc_core::{ClientConfig, ClientId, ClientView, ConnectionState, PollError, ProtocolFamily, StateSnapshot};
use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Registry Commands
// ============================================================================

/// Commands sent to the registry actor.
///
/// Request/response commands carry a oneshot `respond_to` channel.
#[derive(Debug)]
pub enum RegistryCommand {
    /// Atomically move every `Absent` client of a family to `Connecting`
    /// and hand back their configurations.
    ClaimAbsent {
        family: ProtocolFamily,
        respond_to: oneshot::Sender<Vec<Arc<ClientConfig>>>,
    },

    /// Handshake succeeded: `Connecting` -> `Live`.
    ///
    /// `stop` is cancelled by [`RegistryCommand::RequestReconnect`]. The
    /// response is the snapshot the client held before connecting.
    MarkLive {
        id: ClientId,
        stop: CancellationToken,
        respond_to: oneshot::Sender<Result<Arc<StateSnapshot>, RegistryError>>,
    },

    /// Handshake failed: `Connecting` -> `Absent` with the error recorded.
    ConnectFailed {
        id: ClientId,
        error: PollError,
        respond_to: oneshot::Sender<Result<(), RegistryError>>,
    },

    /// Replace the snapshot of a `Live` client.
    PublishSnapshot {
        id: ClientId,
        snapshot: Arc<StateSnapshot>,
        respond_to: oneshot::Sender<Result<(), RegistryError>>,
    },

    /// The polling task released its connection: -> `Absent`.
    MarkDisconnected {
        id: ClientId,
        reason: DisconnectReason,
        error: Option<PollError>,
        /// Snapshot to publish with the transition; `None` keeps the current one
        replacement: Option<StateSnapshot>,
        respond_to: oneshot::Sender<Result<(), RegistryError>>,
    },

    GetClient {
        id: ClientId,
        respond_to: oneshot::Sender<Option<ClientView>>,
    },

    /// All clients, or those of one family, in configuration order.
    GetClients {
        family: Option<ProtocolFamily>,
        respond_to: oneshot::Sender<Vec<ClientView>>,
    },

    /// Signal the live connections of a family to stop so the next scan
    /// reconnects them. `name: None` targets the whole family.
    RequestReconnect {
        family: ProtocolFamily,
        name: Option<String>,
        /// Number of live connections signalled
        respond_to: oneshot::Sender<Result<usize, RegistryError>>,
    },
}

// ============================================================================
// Registry Errors
// ============================================================================

/// Errors that can occur during registry operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("client not found: {0}")]
    ClientNotFound(ClientId),

    /// The command does not apply to the client's current state.
    #[error("cannot {action} client {id} while {state}")]
    InvalidTransition {
        id: ClientId,
        state: ConnectionState,
        action: &'static str,
    },

    /// The actor has shut down.
    #[error("response channel closed")]
    ChannelClosed,
}

// ============================================================================
// Client Events
// ============================================================================

/// Events published by the registry to subscribers.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    Connected {
        id: ClientId,
        family: ProtocolFamily,
    },

    ConnectFailed {
        id: ClientId,
        family: ProtocolFamily,
        error: PollError,
    },

    /// A new snapshot was published. Boxed to keep the enum small.
    SnapshotUpdated { client: Box<ClientView> },

    Disconnected {
        id: ClientId,
        family: ProtocolFamily,
        reason: DisconnectReason,
        error: Option<PollError>,
    },

    ReconnectRequested {
        family: ProtocolFamily,
        name: Option<String>,
        signalled: usize,
    },
}

impl ClientEvent {
    pub fn family(&self) -> ProtocolFamily {
        match self {
            Self::Connected { family, .. }
            | Self::ConnectFailed { family, .. }
            | Self::Disconnected { family, .. }
            | Self::ReconnectRequested { family, .. } => *family,
            Self::SnapshotUpdated { client } => client.family,
        }
    }
}

/// Why a live connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// A request or decode step failed.
    FetchFailed,

    /// The registry no longer accepted snapshots from the polling task.
    PublishRejected,

    /// The stop token was cancelled by a reconnect request.
    ReconnectRequested,

    /// The daemon is shutting down.
    Shutdown,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FetchFailed => write!(f, "fetch failed"),
            Self::PublishRejected => write!(f, "publish rejected"),
            Self::ReconnectRequested => write!(f, "reconnect requested"),
            Self::Shutdown => write!(f, "shutdown"),
        }
    }
}
