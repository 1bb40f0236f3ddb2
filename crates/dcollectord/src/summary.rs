//! Periodic fleet summary for the daemon log.
//!
//! Once a minute the daemon logs, per protocol family, how many clients are
//! configured, how many are live, and how many were last released with an
//! error. Errored clients are listed at debug level.

use std::time::Duration;

use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use dc_core::{ClientView, ConnectionState, ProtocolFamily};

use crate::registry::RegistryHandle;

/// How often the summary is logged.
pub const SUMMARY_INTERVAL: Duration = Duration::from_secs(60);

/// Client counts of one protocol family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FamilySummary {
    pub family: ProtocolFamily,
    pub configured: usize,
    pub live: usize,
    pub connecting: usize,
    /// Absent clients whose last attempt failed
    pub errored: usize,
}

impl FamilySummary {
    pub fn from_views(family: ProtocolFamily, views: &[ClientView]) -> Self {
        let mut summary = Self {
            family,
            configured: 0,
            live: 0,
            connecting: 0,
            errored: 0,
        };

        for view in views.iter().filter(|v| v.family == family) {
            summary.configured += 1;
            match view.state {
                ConnectionState::Live => summary.live += 1,
                ConnectionState::Connecting => summary.connecting += 1,
                ConnectionState::Absent if view.last_error.is_some() => summary.errored += 1,
                ConnectionState::Absent => {}
            }
        }

        summary
    }
}

/// Spawns the summary logging task.
///
/// Uses cooperative shutdown via `cancel_token`.
pub fn spawn_summary_task(
    registry: RegistryHandle,
    cancel_token: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = interval(SUMMARY_INTERVAL);

        info!(interval_secs = SUMMARY_INTERVAL.as_secs(), "Fleet summary started");

        loop {
            tokio::select! {
                biased;

                _ = cancel_token.cancelled() => {
                    info!("Fleet summary shutting down");
                    break;
                }

                _ = tick.tick() => {
                    let views = registry.get_clients(None).await;
                    log_summary(&views);
                }
            }
        }

        debug!("Fleet summary task completed");
    })
}

fn log_summary(views: &[ClientView]) {
    for family in ProtocolFamily::ALL {
        let summary = FamilySummary::from_views(family, views);
        if summary.configured == 0 {
            continue;
        }

        if summary.live == 0 {
            warn!(
                family = %family,
                configured = summary.configured,
                errored = summary.errored,
                "No live clients"
            );
        } else {
            info!(
                family = %family,
                configured = summary.configured,
                live = summary.live,
                connecting = summary.connecting,
                errored = summary.errored,
                "Fleet status"
            );
        }

        for view in views.iter().filter(|v| v.family == family) {
            if let (ConnectionState::Absent, Some(err)) = (view.state, &view.last_error) {
                debug!(client = %view.id, error = %err, "Client unavailable");
            }
        }
    }
}
