//! Integration tests for the client registry.
//!
//! These drive the registry through `spawn_registry()` and the
//! `RegistryHandle` interface only, the way scheduler tasks do.

use std::sync::Arc;
use std::time::Duration;

use dc_core::{
    BoincState, ClientConfig, ClientId, ConnectionState, PollError, ProtocolFamily, StateSnapshot,
    WorkResult,
};
use dcollectord::registry::{spawn_registry, ClientEvent, DisconnectReason, RegistryError};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Test Helpers
// ============================================================================

fn boinc(name: &str) -> ClientConfig {
    ClientConfig::new(ProtocolFamily::Boinc, name, "10.0.0.1", 31416, "pw")
}

fn fah(name: &str) -> ClientConfig {
    ClientConfig::new(ProtocolFamily::Fah, name, "10.0.0.2", 36330, "pw")
}

fn result(wu_name: &str, remaining: f64) -> WorkResult {
    let mut result = WorkResult {
        name: format!("{wu_name}_0"),
        wu_name: wu_name.to_string(),
        estimated_remaining_secs: remaining,
        ..Default::default()
    };
    result.refresh_derived();
    result
}

fn boinc_snapshot(results: Vec<WorkResult>) -> Arc<StateSnapshot> {
    Arc::new(StateSnapshot::Boinc(BoincState {
        results,
        ..Default::default()
    }))
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_configured_clients_start_absent_in_order() {
    let handle = spawn_registry(vec![boinc("b"), boinc("a"), fah("z")]);

    let views = handle.get_clients(None).await;
    let names: Vec<_> = views.iter().map(|v| v.id.as_str().to_string()).collect();
    assert_eq!(names, vec!["boinc/b", "boinc/a", "fah/z"]);
    assert!(views.iter().all(|v| v.state == ConnectionState::Absent));
    assert!(views.iter().all(|v| v.snapshot.is_empty()));

    let fah_views = handle.get_clients(Some(ProtocolFamily::Fah)).await;
    assert_eq!(fah_views.len(), 1);
    assert!(handle.is_connected());
}

#[tokio::test]
async fn test_full_lifecycle() {
    let handle = spawn_registry(vec![boinc("rig")]);
    let id = ClientId::new(ProtocolFamily::Boinc, "rig");

    let claimed = handle.claim_absent(ProtocolFamily::Boinc).await;
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].name, "rig");
    assert_eq!(
        handle.get_client(id.clone()).await.unwrap().state,
        ConnectionState::Connecting
    );

    // nothing left to claim while connecting
    assert!(handle.claim_absent(ProtocolFamily::Boinc).await.is_empty());

    let prior = handle
        .mark_live(id.clone(), CancellationToken::new())
        .await
        .expect("mark live");
    assert!(prior.is_empty());

    handle
        .publish_snapshot(id.clone(), boinc_snapshot(vec![result("wu_a", 10.0)]))
        .await
        .expect("publish");

    let view = handle.get_client(id.clone()).await.unwrap();
    assert_eq!(view.state, ConnectionState::Live);
    assert!(view.connected_since.is_some());
    assert!(view.last_update.is_some());
    assert_eq!(view.snapshot.as_boinc().unwrap().results.len(), 1);

    handle
        .mark_disconnected(
            id.clone(),
            DisconnectReason::FetchFailed,
            Some(PollError::fetch("connection reset")),
            None,
        )
        .await
        .expect("disconnect");

    let view = handle.get_client(id.clone()).await.unwrap();
    assert_eq!(view.state, ConnectionState::Absent);
    assert!(view.connected_since.is_none());
    assert_eq!(view.last_error, Some(PollError::fetch("connection reset")));
    // the last good snapshot stays visible
    assert_eq!(view.snapshot.as_boinc().unwrap().results.len(), 1);

    // and is handed back on the next successful connect
    handle.claim_absent(ProtocolFamily::Boinc).await;
    let prior = handle.mark_live(id.clone(), CancellationToken::new()).await.unwrap();
    assert_eq!(prior.as_boinc().unwrap().results.len(), 1);
    assert!(handle.get_client(id).await.unwrap().last_error.is_none());
}

#[tokio::test]
async fn test_connect_failure_returns_client_to_absent() {
    let handle = spawn_registry(vec![fah("rig")]);
    let id = ClientId::new(ProtocolFamily::Fah, "rig");

    handle.claim_absent(ProtocolFamily::Fah).await;
    handle
        .connect_failed(id.clone(), PollError::auth("ERROR: invalid password"))
        .await
        .unwrap();

    let view = handle.get_client(id.clone()).await.unwrap();
    assert_eq!(view.state, ConnectionState::Absent);
    assert_eq!(view.status_label(), "authentication failed: ERROR: invalid password");

    // eligible again
    assert_eq!(handle.claim_absent(ProtocolFamily::Fah).await.len(), 1);
}

#[tokio::test]
async fn test_replacement_snapshot_applied_on_disconnect() {
    let handle = spawn_registry(vec![boinc("rig")]);
    let id = ClientId::new(ProtocolFamily::Boinc, "rig");

    handle.claim_absent(ProtocolFamily::Boinc).await;
    handle.mark_live(id.clone(), CancellationToken::new()).await.unwrap();
    handle
        .publish_snapshot(id.clone(), boinc_snapshot(vec![result("wu_a", 1.0)]))
        .await
        .unwrap();

    handle
        .mark_disconnected(
            id.clone(),
            DisconnectReason::FetchFailed,
            Some(PollError::decode("bad xml")),
            Some(StateSnapshot::empty(ProtocolFamily::Boinc)),
        )
        .await
        .unwrap();

    let view = handle.get_client(id).await.unwrap();
    assert!(view.snapshot.is_empty());
}

#[tokio::test]
async fn test_invalid_transitions_are_rejected() {
    let handle = spawn_registry(vec![boinc("rig")]);
    let id = ClientId::new(ProtocolFamily::Boinc, "rig");

    let err = handle
        .mark_live(id.clone(), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RegistryError::InvalidTransition {
            state: ConnectionState::Absent,
            ..
        }
    ));

    let err = handle
        .publish_snapshot(id.clone(), boinc_snapshot(Vec::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::InvalidTransition { .. }));

    let unknown = ClientId::new(ProtocolFamily::Boinc, "ghost");
    let err = handle
        .connect_failed(unknown.clone(), PollError::connect("x"))
        .await
        .unwrap_err();
    assert_eq!(err, RegistryError::ClientNotFound(unknown));
}

// ============================================================================
// Aggregates
// ============================================================================

#[tokio::test]
async fn test_work_unit_span_spans_all_boinc_clients() {
    let handle = spawn_registry(vec![boinc("a"), boinc("b"), fah("c")]);
    assert!(handle.work_unit_span().await.is_none());

    handle.claim_absent(ProtocolFamily::Boinc).await;
    for name in ["a", "b"] {
        let id = ClientId::new(ProtocolFamily::Boinc, name);
        handle.mark_live(id, CancellationToken::new()).await.unwrap();
    }

    handle
        .publish_snapshot(
            ClientId::new(ProtocolFamily::Boinc, "a"),
            boinc_snapshot(vec![result("wu_m", 5.0), result("wu_c", 1.0)]),
        )
        .await
        .unwrap();
    handle
        .publish_snapshot(
            ClientId::new(ProtocolFamily::Boinc, "b"),
            boinc_snapshot(vec![result("wu_x", 0.0)]),
        )
        .await
        .unwrap();

    let span = handle.work_unit_span().await.expect("span");
    assert_eq!(span.min, "wu_c");
    assert_eq!(span.max, "wu_x");
    assert_eq!(span.count, 3);
}

// ============================================================================
// Reconnect
// ============================================================================

#[tokio::test]
async fn test_request_reconnect_cancels_live_tokens() {
    let handle = spawn_registry(vec![fah("a"), fah("b"), boinc("a")]);

    let fah_a = CancellationToken::new();
    let fah_b = CancellationToken::new();
    let boinc_a = CancellationToken::new();

    handle.claim_absent(ProtocolFamily::Fah).await;
    handle.claim_absent(ProtocolFamily::Boinc).await;
    handle
        .mark_live(ClientId::new(ProtocolFamily::Fah, "a"), fah_a.clone())
        .await
        .unwrap();
    handle
        .mark_live(ClientId::new(ProtocolFamily::Fah, "b"), fah_b.clone())
        .await
        .unwrap();
    handle
        .mark_live(ClientId::new(ProtocolFamily::Boinc, "a"), boinc_a.clone())
        .await
        .unwrap();

    let signalled = handle
        .request_reconnect(ProtocolFamily::Fah, Some("b".to_string()))
        .await
        .unwrap();
    assert_eq!(signalled, 1);
    assert!(fah_b.is_cancelled());
    assert!(!fah_a.is_cancelled());

    let signalled = handle.request_reconnect(ProtocolFamily::Fah, None).await.unwrap();
    assert_eq!(signalled, 2);
    assert!(fah_a.is_cancelled());
    assert!(!boinc_a.is_cancelled());
}

#[tokio::test]
async fn test_request_reconnect_unknown_name() {
    let handle = spawn_registry(vec![fah("a")]);
    let err = handle
        .request_reconnect(ProtocolFamily::Fah, Some("nope".to_string()))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        RegistryError::ClientNotFound(ClientId::new(ProtocolFamily::Fah, "nope"))
    );

    // no live connections is not an error
    assert_eq!(handle.request_reconnect(ProtocolFamily::Fah, None).await, Ok(0));
}

// ============================================================================
// Events
// ============================================================================

#[tokio::test]
async fn test_lifecycle_events_are_broadcast() {
    let handle = spawn_registry(vec![boinc("rig")]);
    let id = ClientId::new(ProtocolFamily::Boinc, "rig");
    let mut events = handle.subscribe();

    handle.claim_absent(ProtocolFamily::Boinc).await;
    handle.mark_live(id.clone(), CancellationToken::new()).await.unwrap();
    handle
        .publish_snapshot(id.clone(), boinc_snapshot(Vec::new()))
        .await
        .unwrap();
    handle
        .mark_disconnected(id.clone(), DisconnectReason::Shutdown, None, None)
        .await
        .unwrap();

    let wait = Duration::from_secs(1);
    let event = timeout(wait, events.recv()).await.unwrap().unwrap();
    assert!(matches!(event, ClientEvent::Connected { .. }));

    let event = timeout(wait, events.recv()).await.unwrap().unwrap();
    match event {
        ClientEvent::SnapshotUpdated { client } => {
            assert_eq!(client.id, id);
            assert_eq!(client.state, ConnectionState::Live);
        }
        other => panic!("expected SnapshotUpdated, got {other:?}"),
    }

    let event = timeout(wait, events.recv()).await.unwrap().unwrap();
    match event {
        ClientEvent::Disconnected { reason, error, family, .. } => {
            assert_eq!(reason, DisconnectReason::Shutdown);
            assert_eq!(family, ProtocolFamily::Boinc);
            assert!(error.is_none());
        }
        other => panic!("expected Disconnected, got {other:?}"),
    }
}

#[tokio::test]
async fn test_concurrent_handles() {
    let configs: Vec<_> = (0..20).map(|i| boinc(&format!("rig{i}"))).collect();
    let handle = spawn_registry(configs);

    let claimed = handle.claim_absent(ProtocolFamily::Boinc).await;
    assert_eq!(claimed.len(), 20);

    let mut tasks = Vec::new();
    for config in claimed {
        let h = handle.clone();
        tasks.push(tokio::spawn(async move {
            let id = config.id();
            h.mark_live(id.clone(), CancellationToken::new()).await.unwrap();
            h.publish_snapshot(id, boinc_snapshot(vec![result(&config.name, 1.0)]))
                .await
                .unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let views = handle.get_clients(Some(ProtocolFamily::Boinc)).await;
    assert!(views.iter().all(|v| v.is_live()));
    assert_eq!(handle.work_unit_span().await.unwrap().count, 20);
}

#[tokio::test]
async fn test_client_view_serializes_for_presentation() {
    let handle = spawn_registry(vec![fah("rig")]);
    let id = ClientId::new(ProtocolFamily::Fah, "rig");

    handle.claim_absent(ProtocolFamily::Fah).await;
    handle
        .connect_failed(id.clone(), PollError::connect("refused"))
        .await
        .unwrap();

    let view = handle.get_client(id).await.unwrap();
    let json = serde_json::to_value(&view).unwrap();
    assert_eq!(json["id"], "fah/rig");
    assert_eq!(json["family"], "fah");
    assert_eq!(json["state"], "absent");
    assert_eq!(json["last_error"]["kind"], "connect");
    assert_eq!(json["last_error"]["message"], "refused");
    assert!(json.get("password").is_none());
}
