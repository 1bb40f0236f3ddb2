//! Registry actor - owns every client record and processes commands.
//!
//! The actor is the only writer of client state. Commands are handled one
//! at a time, so a reader never observes a half-applied transition, and a
//! snapshot is published by swapping its `Arc` in a single step.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use dc_core::{
    ClientConfig, ClientId, ClientView, ConnectionState, PollError, ProtocolFamily, StateSnapshot,
};

use super::commands::{ClientEvent, DisconnectReason, RegistryCommand, RegistryError};

/// One configured client.
struct ClientRecord {
    config: Arc<ClientConfig>,
    view: ClientView,
    /// Present while `Live`; cancelling it asks the polling task to stop
    stop: Option<CancellationToken>,
}

impl ClientRecord {
    fn new(config: ClientConfig) -> Self {
        let view = ClientView::new(&config);
        Self {
            config: Arc::new(config),
            view,
            stop: None,
        }
    }

    fn state(&self) -> ConnectionState {
        self.view.state
    }
}

/// The registry actor.
///
/// Client records are stored by id; `order` remembers configuration order
/// so listings are stable.
pub struct RegistryActor {
    receiver: mpsc::Receiver<RegistryCommand>,
    clients: HashMap<ClientId, ClientRecord>,
    order: Vec<ClientId>,
    event_publisher: broadcast::Sender<ClientEvent>,
}

impl RegistryActor {
    /// Creates the actor with the static client list.
    ///
    /// Duplicate ids keep the first entry; configuration loading rejects
    /// duplicates before this point.
    pub fn new(
        clients: Vec<ClientConfig>,
        receiver: mpsc::Receiver<RegistryCommand>,
        event_publisher: broadcast::Sender<ClientEvent>,
    ) -> Self {
        let mut records = HashMap::with_capacity(clients.len());
        let mut order = Vec::with_capacity(clients.len());

        for config in clients {
            let id = config.id();
            if records.contains_key(&id) {
                warn!(client = %id, "Duplicate client ignored");
                continue;
            }
            order.push(id.clone());
            records.insert(id, ClientRecord::new(config));
        }

        Self {
            receiver,
            clients: records,
            order,
            event_publisher,
        }
    }

    /// Runs the actor until every handle has been dropped.
    pub async fn run(mut self) {
        info!(clients = self.clients.len(), "Registry actor starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!(
            live = self
                .clients
                .values()
                .filter(|r| r.state() == ConnectionState::Live)
                .count(),
            "Registry actor stopped"
        );
    }

    fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::ClaimAbsent { family, respond_to } => {
                let result = self.handle_claim_absent(family);
                let _ = respond_to.send(result);
            }
            RegistryCommand::MarkLive {
                id,
                stop,
                respond_to,
            } => {
                let result = self.handle_mark_live(id, stop);
                let _ = respond_to.send(result);
            }
            RegistryCommand::ConnectFailed {
                id,
                error,
                respond_to,
            } => {
                let result = self.handle_connect_failed(id, error);
                let _ = respond_to.send(result);
            }
            RegistryCommand::PublishSnapshot {
                id,
                snapshot,
                respond_to,
            } => {
                let result = self.handle_publish_snapshot(id, snapshot);
                let _ = respond_to.send(result);
            }
            RegistryCommand::MarkDisconnected {
                id,
                reason,
                error,
                replacement,
                respond_to,
            } => {
                let result = self.handle_mark_disconnected(id, reason, error, replacement);
                let _ = respond_to.send(result);
            }
            RegistryCommand::GetClient { id, respond_to } => {
                let result = self.clients.get(&id).map(|r| r.view.clone());
                let _ = respond_to.send(result);
            }
            RegistryCommand::GetClients { family, respond_to } => {
                let result = self.handle_get_clients(family);
                let _ = respond_to.send(result);
            }
            RegistryCommand::RequestReconnect {
                family,
                name,
                respond_to,
            } => {
                let result = self.handle_request_reconnect(family, name);
                let _ = respond_to.send(result);
            }
        }
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    fn handle_claim_absent(&mut self, family: ProtocolFamily) -> Vec<Arc<ClientConfig>> {
        let mut claimed = Vec::new();

        for id in &self.order {
            let Some(record) = self.clients.get_mut(id) else {
                continue;
            };
            if record.config.family != family || record.state() != ConnectionState::Absent {
                continue;
            }
            record.view.state = ConnectionState::Connecting;
            claimed.push(Arc::clone(&record.config));
        }

        if !claimed.is_empty() {
            debug!(family = %family, count = claimed.len(), "Claimed absent clients");
        }
        claimed
    }

    fn handle_mark_live(
        &mut self,
        id: ClientId,
        stop: CancellationToken,
    ) -> Result<Arc<StateSnapshot>, RegistryError> {
        let record = self
            .clients
            .get_mut(&id)
            .ok_or_else(|| RegistryError::ClientNotFound(id.clone()))?;

        if record.state() != ConnectionState::Connecting {
            return Err(RegistryError::InvalidTransition {
                id,
                state: record.state(),
                action: "mark live",
            });
        }

        record.view.state = ConnectionState::Live;
        record.view.last_error = None;
        record.view.connected_since = Some(Utc::now());
        record.stop = Some(stop);

        info!(client = %id, endpoint = %record.config.endpoint(), "Client connected");

        let family = record.config.family;
        let snapshot = Arc::clone(&record.view.snapshot);
        let _ = self
            .event_publisher
            .send(ClientEvent::Connected { id, family });

        Ok(snapshot)
    }

    fn handle_connect_failed(&mut self, id: ClientId, error: PollError) -> Result<(), RegistryError> {
        let record = self
            .clients
            .get_mut(&id)
            .ok_or_else(|| RegistryError::ClientNotFound(id.clone()))?;

        if record.state() != ConnectionState::Connecting {
            return Err(RegistryError::InvalidTransition {
                id,
                state: record.state(),
                action: "fail connecting",
            });
        }

        record.view.state = ConnectionState::Absent;
        record.view.last_error = Some(error.clone());
        record.view.connected_since = None;

        warn!(client = %id, error = %error, "Client connect failed");

        let family = record.config.family;
        let _ = self
            .event_publisher
            .send(ClientEvent::ConnectFailed { id, family, error });
        Ok(())
    }

    fn handle_publish_snapshot(
        &mut self,
        id: ClientId,
        snapshot: Arc<StateSnapshot>,
    ) -> Result<(), RegistryError> {
        let record = self
            .clients
            .get_mut(&id)
            .ok_or_else(|| RegistryError::ClientNotFound(id.clone()))?;

        if record.state() != ConnectionState::Live {
            return Err(RegistryError::InvalidTransition {
                id,
                state: record.state(),
                action: "publish to",
            });
        }
        if snapshot.family() != record.config.family {
            warn!(client = %id, "Snapshot family mismatch, ignored");
            return Ok(());
        }

        record.view.snapshot = snapshot;
        record.view.last_update = Some(Utc::now());

        debug!(client = %id, "Snapshot published");

        let _ = self.event_publisher.send(ClientEvent::SnapshotUpdated {
            client: Box::new(record.view.clone()),
        });
        Ok(())
    }

    fn handle_mark_disconnected(
        &mut self,
        id: ClientId,
        reason: DisconnectReason,
        error: Option<PollError>,
        replacement: Option<StateSnapshot>,
    ) -> Result<(), RegistryError> {
        let record = self
            .clients
            .get_mut(&id)
            .ok_or_else(|| RegistryError::ClientNotFound(id.clone()))?;

        if record.state() == ConnectionState::Absent {
            return Err(RegistryError::InvalidTransition {
                id,
                state: record.state(),
                action: "disconnect",
            });
        }

        record.view.state = ConnectionState::Absent;
        record.view.connected_since = None;
        record.stop = None;
        if let Some(snapshot) = replacement.filter(|s| s.family() == record.config.family) {
            record.view.snapshot = Arc::new(snapshot);
            record.view.last_update = Some(Utc::now());
        }
        if error.is_some() {
            record.view.last_error = error.clone();
        }

        match &error {
            Some(err) => warn!(client = %id, reason = %reason, error = %err, "Client disconnected"),
            None => info!(client = %id, reason = %reason, "Client disconnected"),
        }

        let family = record.config.family;
        let _ = self.event_publisher.send(ClientEvent::Disconnected {
            id,
            family,
            reason,
            error,
        });
        Ok(())
    }

    fn handle_get_clients(&self, family: Option<ProtocolFamily>) -> Vec<ClientView> {
        self.order
            .iter()
            .filter_map(|id| self.clients.get(id))
            .filter(|r| family.map_or(true, |f| r.config.family == f))
            .map(|r| r.view.clone())
            .collect()
    }

    fn handle_request_reconnect(
        &mut self,
        family: ProtocolFamily,
        name: Option<String>,
    ) -> Result<usize, RegistryError> {
        if let Some(name) = &name {
            let id = ClientId::new(family, name);
            if !self.clients.contains_key(&id) {
                return Err(RegistryError::ClientNotFound(id));
            }
        }

        let mut signalled = 0;
        for record in self.clients.values() {
            if record.config.family != family {
                continue;
            }
            if name.as_deref().is_some_and(|n| n != record.config.name) {
                continue;
            }
            if let Some(stop) = &record.stop {
                stop.cancel();
                signalled += 1;
            }
        }

        info!(family = %family, name = ?name, signalled, "Reconnect requested");

        let _ = self.event_publisher.send(ClientEvent::ReconnectRequested {
            family,
            name,
            signalled,
        });
        Ok(signalled)
    }

    // ========================================================================
    // Accessors (for testing)
    // ========================================================================

    #[cfg(test)]
    fn state_of(&self, id: &ClientId) -> Option<ConnectionState> {
        self.clients.get(id).map(|r| r.state())
    }
}
