//! Client interface for interacting with the RegistryActor.
//!
//! `RegistryHandle` is cheap to clone. The scheduler uses the lifecycle
//! methods, the presentation layer uses the read methods and the event
//! subscription.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use dc_core::{
    work_unit_span, ClientConfig, ClientId, ClientView, PollError, ProtocolFamily, StateSnapshot,
    WorkUnitSpan,
};

use super::commands::{ClientEvent, DisconnectReason, RegistryCommand, RegistryError};

// ============================================================================
// Registry Handle
// ============================================================================

/// Handle for interacting with the registry actor.
#[derive(Clone)]
pub struct RegistryHandle {
    sender: mpsc::Sender<RegistryCommand>,
    event_sender: broadcast::Sender<ClientEvent>,
}

impl RegistryHandle {
    pub fn new(
        sender: mpsc::Sender<RegistryCommand>,
        event_sender: broadcast::Sender<ClientEvent>,
    ) -> Self {
        Self {
            sender,
            event_sender,
        }
    }

    /// Sends a command and awaits its reply.
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> RegistryCommand,
    ) -> Result<T, RegistryError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;
        rx.await.map_err(|_| RegistryError::ChannelClosed)
    }

    // ------------------------------------------------------------------------
    // Lifecycle (used by the scheduler)
    // ------------------------------------------------------------------------

    /// Claims every `Absent` client of `family`, moving them to `Connecting`.
    ///
    /// Returns an empty list if the actor has shut down.
    pub async fn claim_absent(&self, family: ProtocolFamily) -> Vec<Arc<ClientConfig>> {
        self.request(|respond_to| RegistryCommand::ClaimAbsent { family, respond_to })
            .await
            .unwrap_or_default()
    }

    /// Marks a claimed client `Live`, returning the snapshot it held so far.
    ///
    /// # Errors
    ///
    /// - `RegistryError::InvalidTransition` if the client is not `Connecting`
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn mark_live(
        &self,
        id: ClientId,
        stop: CancellationToken,
    ) -> Result<Arc<StateSnapshot>, RegistryError> {
        self.request(|respond_to| RegistryCommand::MarkLive {
            id,
            stop,
            respond_to,
        })
        .await?
    }

    /// Records a failed handshake; the client returns to `Absent`.
    pub async fn connect_failed(&self, id: ClientId, error: PollError) -> Result<(), RegistryError> {
        self.request(|respond_to| RegistryCommand::ConnectFailed {
            id,
            error,
            respond_to,
        })
        .await?
    }

    /// Publishes a fresh snapshot of a `Live` client.
    pub async fn publish_snapshot(
        &self,
        id: ClientId,
        snapshot: Arc<StateSnapshot>,
    ) -> Result<(), RegistryError> {
        self.request(|respond_to| RegistryCommand::PublishSnapshot {
            id,
            snapshot,
            respond_to,
        })
        .await?
    }

    /// Returns a client to `Absent` after its connection was released.
    pub async fn mark_disconnected(
        &self,
        id: ClientId,
        reason: DisconnectReason,
        error: Option<PollError>,
        replacement: Option<StateSnapshot>,
    ) -> Result<(), RegistryError> {
        self.request(|respond_to| RegistryCommand::MarkDisconnected {
            id,
            reason,
            error,
            replacement,
            respond_to,
        })
        .await?
    }

    // ------------------------------------------------------------------------
    // Reads (used by the presentation layer)
    // ------------------------------------------------------------------------

    /// Returns `None` if the client is unknown or the actor has shut down.
    pub async fn get_client(&self, id: ClientId) -> Option<ClientView> {
        self.request(|respond_to| RegistryCommand::GetClient { id, respond_to })
            .await
            .ok()
            .flatten()
    }

    /// Views of all clients (or of one family) in configuration order.
    pub async fn get_clients(&self, family: Option<ProtocolFamily>) -> Vec<ClientView> {
        self.request(|respond_to| RegistryCommand::GetClients { family, respond_to })
            .await
            .unwrap_or_default()
    }

    /// Smallest and largest work-unit names across every BOINC client.
    pub async fn work_unit_span(&self) -> Option<WorkUnitSpan> {
        let views = self.get_clients(Some(ProtocolFamily::Boinc)).await;
        work_unit_span(
            views
                .iter()
                .filter_map(|v| v.snapshot.as_boinc())
                .flat_map(|state| state.results.iter()),
        )
    }

    /// Asks the live connections of a family (or one named client) to drop
    /// so they are re-established by an immediate rescan. The family's
    /// scheduler also rescans its `Absent` clients right away.
    ///
    /// Returns how many live connections were signalled.
    ///
    /// # Errors
    ///
    /// - `RegistryError::ClientNotFound` if `name` is given but unknown
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn request_reconnect(
        &self,
        family: ProtocolFamily,
        name: Option<String>,
    ) -> Result<usize, RegistryError> {
        self.request(|respond_to| RegistryCommand::RequestReconnect {
            family,
            name,
            respond_to,
        })
        .await?
    }

    /// Subscribe to client events. Does not talk to the actor.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.event_sender.subscribe()
    }

    /// Returns `true` while the command channel is open.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_handle() -> (RegistryHandle, mpsc::Receiver<RegistryCommand>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (event_tx, _event_rx) = broadcast::channel(16);
        (RegistryHandle::new(cmd_tx, event_tx), cmd_rx)
    }

    #[tokio::test]
    async fn test_claim_sends_command() {
        let (handle, mut rx) = create_test_handle();

        let responder = tokio::spawn(async move {
            if let Some(RegistryCommand::ClaimAbsent { family, respond_to }) = rx.recv().await {
                assert_eq!(family, ProtocolFamily::Fah);
                let config = ClientConfig::new(family, "rig", "h", 36330, "pw");
                let _ = respond_to.send(vec![Arc::new(config)]);
                return true;
            }
            false
        });

        let claimed = handle.claim_absent(ProtocolFamily::Fah).await;
        assert_eq!(claimed.len(), 1);
        assert!(responder.await.unwrap());
    }

    #[tokio::test]
    async fn test_channel_closed_errors() {
        let (handle, rx) = create_test_handle();
        drop(rx);

        let id = ClientId::new(ProtocolFamily::Boinc, "x");
        assert!(handle.claim_absent(ProtocolFamily::Boinc).await.is_empty());
        assert!(handle.get_client(id.clone()).await.is_none());
        assert!(handle.get_clients(None).await.is_empty());
        assert!(handle.work_unit_span().await.is_none());
        assert_eq!(
            handle.mark_live(id.clone(), CancellationToken::new()).await,
            Err(RegistryError::ChannelClosed)
        );
        assert_eq!(
            handle.request_reconnect(ProtocolFamily::Boinc, None).await,
            Err(RegistryError::ChannelClosed)
        );
        assert!(!handle.is_connected());
    }

    #[tokio::test]
    async fn test_dropped_responder_is_channel_closed() {
        let (handle, mut rx) = create_test_handle();
        tokio::spawn(async move {
            // receive and drop the command without replying
            let _ = rx.recv().await;
        });

        let id = ClientId::new(ProtocolFamily::Boinc, "x");
        assert_eq!(
            handle.connect_failed(id, PollError::connect("x")).await,
            Err(RegistryError::ChannelClosed)
        );
    }
}
