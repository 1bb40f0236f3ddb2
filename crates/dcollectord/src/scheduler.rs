//! Polling scheduler: one scan loop per protocol family.
//!
//! Every scan claims the family's `Absent` clients and spawns one task per
//! claimed client. That task connects, and on success becomes the client's
//! polling task: it owns the connection, fetches on the client's refresh
//! interval, and releases the client back to `Absent` on the first error.
//! There is no backoff beyond the scan interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use dc_core::{ClientConfig, PollError, StateSnapshot};

use crate::adapter::{LiveConnection, ProtocolAdapter};
use crate::registry::{ClientEvent, DisconnectReason, RegistryHandle};

/// Default period between scans for unconnected clients.
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub scan_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            scan_interval: DEFAULT_SCAN_INTERVAL,
        }
    }
}

/// Spawns the scan loop of one protocol family.
///
/// The loop scans immediately, then every `scan_interval`, and also right
/// after a reconnect is requested for its family or one of its clients was
/// disconnected on request. It stops when
/// `shutdown` is cancelled; polling tasks observe the same token.
pub fn spawn_scheduler<A: ProtocolAdapter>(
    adapter: A,
    registry: RegistryHandle,
    config: SchedulerConfig,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let adapter = Arc::new(adapter);

    tokio::spawn(async move {
        let family = adapter.family();
        let mut events = registry.subscribe();
        let mut ticker = interval(config.scan_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            family = %family,
            scan_interval_secs = config.scan_interval.as_secs_f64(),
            "Scheduler started"
        );

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!(family = %family, "Scheduler shutting down");
                    break;
                }

                _ = ticker.tick() => {
                    scan_once(&adapter, &registry, &shutdown).await;
                }

                event = events.recv() => match event {
                    Ok(ClientEvent::Disconnected {
                        family: event_family,
                        reason: DisconnectReason::ReconnectRequested,
                        ..
                    }) if event_family == family => {
                        scan_once(&adapter, &registry, &shutdown).await;
                    }
                    // absent clients have no stop token to cancel
                    Ok(ClientEvent::ReconnectRequested {
                        family: event_family,
                        ..
                    }) if event_family == family => {
                        scan_once(&adapter, &registry, &shutdown).await;
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(family = %family, skipped, "Scheduler lagged behind events");
                        scan_once(&adapter, &registry, &shutdown).await;
                    }
                    Err(RecvError::Closed) => {
                        debug!(family = %family, "Registry closed, scheduler stopping");
                        break;
                    }
                },
            }
        }
    })
}

/// Claims every `Absent` client of the adapter's family and spawns a
/// connect-then-poll task for each. Returns the spawned tasks.
///
/// Each task gets a child of `shutdown` as its stop token, so either a
/// shutdown or a reconnect request ends it.
pub async fn scan_once<A: ProtocolAdapter>(
    adapter: &Arc<A>,
    registry: &RegistryHandle,
    shutdown: &CancellationToken,
) -> Vec<JoinHandle<()>> {
    let claimed = registry.claim_absent(adapter.family()).await;
    if !claimed.is_empty() {
        debug!(family = %adapter.family(), count = claimed.len(), "Scan claimed clients");
    }

    claimed
        .into_iter()
        .map(|config| {
            let task = ClientTask {
                adapter: Arc::clone(adapter),
                registry: registry.clone(),
                config,
                shutdown: shutdown.clone(),
                stop: shutdown.child_token(),
            };
            tokio::spawn(task.run())
        })
        .collect()
}

/// How a polling loop ended.
struct Exit {
    reason: DisconnectReason,
    error: Option<PollError>,
    replacement: Option<StateSnapshot>,
}

impl Exit {
    fn cancelled(shutdown: &CancellationToken) -> Self {
        let reason = if shutdown.is_cancelled() {
            DisconnectReason::Shutdown
        } else {
            DisconnectReason::ReconnectRequested
        };
        Self {
            reason,
            error: None,
            replacement: None,
        }
    }

    fn publish_rejected(shutdown: &CancellationToken) -> Self {
        let reason = if shutdown.is_cancelled() {
            DisconnectReason::Shutdown
        } else {
            DisconnectReason::PublishRejected
        };
        Self {
            reason,
            error: None,
            replacement: None,
        }
    }
}

/// Connect-then-poll task of one claimed client.
struct ClientTask<A> {
    adapter: Arc<A>,
    registry: RegistryHandle,
    config: Arc<ClientConfig>,
    shutdown: CancellationToken,
    stop: CancellationToken,
}

impl<A: ProtocolAdapter> ClientTask<A> {
    async fn run(self) {
        let id = self.config.id();

        let connected = tokio::select! {
            _ = self.stop.cancelled() => None,
            result = self.adapter.connect(&self.config) => Some(result),
        };

        let mut conn = match connected {
            Some(Ok(conn)) => conn,
            Some(Err(error)) => {
                let _ = self.registry.connect_failed(id, error).await;
                return;
            }
            None => {
                let exit = Exit::cancelled(&self.shutdown);
                let _ = self
                    .registry
                    .mark_disconnected(id, exit.reason, None, None)
                    .await;
                return;
            }
        };

        let mut current = match self.registry.mark_live(id.clone(), self.stop.clone()).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(client = %id, error = %e, "Registry refused live connection");
                conn.disconnect().await;
                return;
            }
        };

        let exit = loop {
            let fetched = tokio::select! {
                _ = self.stop.cancelled() => break Exit::cancelled(&self.shutdown),
                result = conn.fetch_state(&current) => result,
            };

            match fetched {
                Ok(snapshot) => {
                    let snapshot = Arc::new(snapshot);
                    if let Err(e) = self
                        .registry
                        .publish_snapshot(id.clone(), Arc::clone(&snapshot))
                        .await
                    {
                        debug!(client = %id, error = %e, "Publish rejected, stopping");
                        break Exit::publish_rejected(&self.shutdown);
                    }
                    current = snapshot;
                }
                Err(failure) => {
                    break Exit {
                        reason: DisconnectReason::FetchFailed,
                        error: Some(failure.error),
                        replacement: failure.replacement,
                    };
                }
            }

            tokio::select! {
                _ = self.stop.cancelled() => break Exit::cancelled(&self.shutdown),
                _ = sleep(self.config.refresh) => {}
            }
        };

        conn.disconnect().await;
        let _ = self
            .registry
            .mark_disconnected(id, exit.reason, exit.error, exit.replacement)
            .await;
    }
}
