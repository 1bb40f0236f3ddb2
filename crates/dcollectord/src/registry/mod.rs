//! Client registry using the actor pattern.
//!
//! The registry holds one record per configured client: its connection
//! state, last error and latest snapshot. It receives commands over an
//! mpsc channel and broadcasts lifecycle events.
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌──────────────────┐
//! │ Scheduler tasks │────▶│  RegistryActor  │────▶│ Broadcast channel│
//! └─────────────────┘     └─────────────────┘     └──────────────────┘
//!         │                       │                        │
//!         │  RegistryCommand      │  ClientEvent           │
//!         ▼                       ▼                        ▼
//!   claim / live /        HashMap<ClientId,         scheduler rescans,
//!   publish / release     ClientRecord>             presentation layer
//! ```
//!
//! Lifecycle of a client:
//!
//! ```text
//! Absent ──claim──▶ Connecting ──mark_live──▶ Live
//!   ▲                   │                       │
//!   └───connect_failed──┘                       │
//!   └────────────────mark_disconnected──────────┘
//! ```

use tokio::sync::{broadcast, mpsc};

use dc_core::ClientConfig;

mod actor;
mod commands;
mod handle;

pub use actor::RegistryActor;
pub use commands::{ClientEvent, DisconnectReason, RegistryCommand, RegistryError};
pub use handle::RegistryHandle;

/// Channel buffer sizes
const COMMAND_BUFFER: usize = 100;
const EVENT_BUFFER: usize = 256;

/// Spawns the registry actor for a static client list and returns a handle.
///
/// # Example
///
/// ```no_run
/// use dcollectord::registry::spawn_registry;
///
/// #[tokio::main]
/// async fn main() {
///     let handle = spawn_registry(Vec::new());
///     let clients = handle.get_clients(None).await;
///     assert!(clients.is_empty());
/// }
/// ```
pub fn spawn_registry(clients: Vec<ClientConfig>) -> RegistryHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

    let actor = RegistryActor::new(clients, cmd_rx, event_tx.clone());
    tokio::spawn(actor.run());

    RegistryHandle::new(cmd_tx, event_tx)
}
