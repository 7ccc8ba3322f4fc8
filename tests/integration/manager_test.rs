//! Integration tests for the connection lifecycle

use crate::support::{default_config, manager, manager_with, record_status, wait_for_state};
use nogasm_ws::ws::{ConnectionState, WsError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn reconnect_delays(seen: &[ConnectionState]) -> Vec<u64> {
    seen.iter()
        .filter_map(|state| match state {
            ConnectionState::Reconnecting { delay_ms } => Some(*delay_ms),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_connect_uses_endpoint_url() {
    let (manager, mut remote) = manager();
    let connecting = manager.connect();
    let peer = remote.next_peer().await;
    peer.open();
    connecting.await.unwrap();

    assert_eq!(remote.urls(), vec!["ws://nogasm.local/ws"]);
}

#[tokio::test]
async fn test_clean_connect_publishes_connecting_then_connected() {
    let (manager, mut remote) = manager();
    let seen = record_status(&manager);
    assert_eq!(manager.status(), ConnectionState::Disconnected);

    let connecting = manager.connect();
    let peer = remote.next_peer().await;
    peer.open();

    assert_eq!(connecting.await, Ok(()));
    assert_eq!(manager.status(), ConnectionState::Connected);
    assert_eq!(
        *seen.lock().unwrap(),
        vec![ConnectionState::Connecting, ConnectionState::Connected]
    );
}

#[tokio::test]
async fn test_connect_pending_until_open() {
    let (manager, mut remote) = manager();
    let mut connecting = tokio_test::task::spawn(manager.connect());
    let peer = remote.next_peer().await;
    tokio_test::assert_pending!(connecting.poll());

    peer.open();
    wait_for_state(&manager, ConnectionState::is_connected).await;
    assert!(connecting.is_woken());
    tokio_test::assert_ready_eq!(connecting.poll(), Ok(()));
}

#[tokio::test]
async fn test_connect_while_connected_keeps_handle() {
    let (manager, mut remote) = manager();
    let connecting = manager.connect();
    let peer = remote.next_peer().await;
    peer.open();
    connecting.await.unwrap();

    assert_eq!(manager.connect().await, Ok(()));
    assert_eq!(manager.connect().await, Ok(()));

    assert_eq!(remote.opens(), 1);
    assert!(!remote.has_pending_peer());
    assert!(!peer.is_detached());
}

#[tokio::test(start_paused = true)]
async fn test_initial_failure_sequence() {
    let (manager, mut remote) = manager();
    let seen = record_status(&manager);

    let connecting = manager.connect();
    let peer = remote.next_peer().await;
    peer.error("connection refused");
    assert!(matches!(connecting.await, Err(WsError::OpenFailed(_))));

    let _retry = remote.next_peer().await;
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            ConnectionState::Connecting,
            ConnectionState::Error,
            ConnectionState::Reconnecting { delay_ms: 100 },
            ConnectionState::Connecting,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_backoff_delays_grow_and_cap() {
    let (manager, mut remote) = manager();
    let seen = record_status(&manager);

    let _ = manager.connect();
    for _ in 0..8 {
        let peer = remote.next_peer().await;
        peer.error("connection refused");
    }
    let _ninth = remote.next_peer().await;

    assert_eq!(
        reconnect_delays(&seen.lock().unwrap()),
        vec![100, 200, 400, 800, 1600, 3200, 5000, 5000]
    );
    assert_eq!(manager.reconnect_attempts(), 8);
}

#[tokio::test(start_paused = true)]
async fn test_counter_resets_after_successful_open() {
    let (manager, mut remote) = manager();
    let seen = record_status(&manager);

    let _ = manager.connect();
    remote.next_peer().await.error("refused");
    remote.next_peer().await.error("refused");
    let peer = remote.next_peer().await;
    assert_eq!(manager.reconnect_attempts(), 2);

    peer.open();
    wait_for_state(&manager, ConnectionState::is_connected).await;
    assert_eq!(manager.reconnect_attempts(), 0);

    // A later loss starts over at the base delay
    peer.closed(Some(1006), "abnormal");
    wait_for_state(&manager, ConnectionState::is_reconnecting).await;
    assert_eq!(manager.reconnect_attempts(), 1);
    assert_eq!(reconnect_delays(&seen.lock().unwrap()), vec![100, 200, 100]);
}

#[tokio::test(start_paused = true)]
async fn test_close_after_open_reconnects() {
    let (manager, mut remote) = manager();
    let seen = record_status(&manager);

    let connecting = manager.connect();
    let peer = remote.next_peer().await;
    peer.open();
    connecting.await.unwrap();

    peer.closed(None, "device rebooting");
    let retry = remote.next_peer().await;
    retry.open();
    wait_for_state(&manager, ConnectionState::is_connected).await;

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Disconnected,
            ConnectionState::Reconnecting { delay_ms: 100 },
            ConnectionState::Connecting,
            ConnectionState::Connected,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_close_before_open_rejects_connect() {
    let (manager, mut remote) = manager();

    let connecting = manager.connect();
    let peer = remote.next_peer().await;
    drop(peer);

    assert_eq!(connecting.await, Err(WsError::ClosedBeforeOpen));
    assert!(manager.status().is_reconnecting());
}

#[tokio::test(start_paused = true)]
async fn test_error_detaches_and_closes_transport() {
    let (manager, mut remote) = manager();

    let connecting = manager.connect();
    let mut peer = remote.next_peer().await;
    peer.open();
    connecting.await.unwrap();

    peer.error("reset by peer");
    wait_for_state(&manager, ConnectionState::is_reconnecting).await;
    assert!(peer.is_detached());
    assert!(peer.close_requested());

    // Stale events from the discarded transport are never observed
    peer.open();
    peer.message(r#"{"type":"ble_status"}"#);
    assert_eq!(manager.status(), ConnectionState::Reconnecting { delay_ms: 100 });
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_while_connected() {
    let (manager, mut remote) = manager();
    let seen = record_status(&manager);

    let connecting = manager.connect();
    let mut peer = remote.next_peer().await;
    peer.open();
    connecting.await.unwrap();

    manager.disconnect().await;
    assert_eq!(manager.status(), ConnectionState::Disconnected);
    assert!(peer.close_requested());

    let published = seen.lock().unwrap().len();
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(seen.lock().unwrap().len(), published);
    assert_eq!(remote.opens(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_during_reconnect_wait() {
    let (manager, mut remote) = manager();
    let seen = record_status(&manager);

    let _ = manager.connect();
    remote.next_peer().await.error("refused");
    wait_for_state(&manager, ConnectionState::is_reconnecting).await;

    manager.disconnect().await;
    assert_eq!(manager.status(), ConnectionState::Disconnected);
    assert_eq!(manager.reconnect_attempts(), 0);
    assert_eq!(
        seen.lock().unwrap().last(),
        Some(&ConnectionState::Disconnected)
    );

    let published = seen.lock().unwrap().len();
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(seen.lock().unwrap().len(), published);
    assert_eq!(remote.opens(), 1);
    assert!(!remote.has_pending_peer());
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_while_connecting_aborts_attempt() {
    let (manager, mut remote) = manager();

    let connecting = manager.connect();
    let mut peer = remote.next_peer().await;
    manager.disconnect().await;

    assert_eq!(connecting.await, Err(WsError::Aborted));
    assert!(peer.close_requested());
    assert_eq!(manager.status(), ConnectionState::Disconnected);

    // A late open from the abandoned transport changes nothing
    peer.open();
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(manager.status(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_disconnect_when_idle_is_noop() {
    let (manager, _remote) = manager();
    let seen = record_status(&manager);

    manager.disconnect().await;
    manager.disconnect().await;

    assert_eq!(manager.status(), ConnectionState::Disconnected);
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_connect_after_disconnect_resumes() {
    let (manager, mut remote) = manager();

    let _ = manager.connect();
    remote.next_peer().await.error("refused");
    manager.disconnect().await;

    let connecting = manager.connect();
    let peer = remote.next_peer().await;
    peer.open();
    assert_eq!(connecting.await, Ok(()));
    assert_eq!(remote.opens(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_manual_connect_cancels_pending_reconnect() {
    let (manager, mut remote) = manager();

    let _ = manager.connect();
    remote.next_peer().await.error("refused");
    wait_for_state(&manager, ConnectionState::is_reconnecting).await;

    let connecting = manager.connect();
    let peer = remote.next_peer().await;
    peer.open();
    connecting.await.unwrap();

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(remote.opens(), 2);
    assert_eq!(manager.status(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_construction_failure_rejects_and_retries() {
    let (manager, mut remote) = manager();
    let seen = record_status(&manager);
    remote.fail_construction(true);

    let result = manager.connect().await;
    assert_eq!(
        result,
        Err(WsError::TransportConstruction("blocked".to_string()))
    );
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            ConnectionState::Connecting,
            ConnectionState::Error,
            ConnectionState::Reconnecting { delay_ms: 100 },
        ]
    );

    remote.fail_construction(false);
    let peer = remote.next_peer().await;
    peer.open();
    wait_for_state(&manager, ConnectionState::is_connected).await;
    assert_eq!(remote.opens(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_auto_reconnect_disabled() {
    let (manager, mut remote) = manager_with(default_config().auto_reconnect(false));

    let connecting = manager.connect();
    let peer = remote.next_peer().await;
    peer.open();
    connecting.await.unwrap();

    peer.closed(None, "bye");
    wait_for_state(&manager, |s| *s == ConnectionState::Disconnected).await;

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(manager.status(), ConnectionState::Disconnected);
    assert_eq!(remote.opens(), 1);
    assert_eq!(manager.reconnect_attempts(), 0);
}

#[tokio::test]
async fn test_failing_status_subscriber_does_not_block_state() {
    let (manager, mut remote) = manager();
    let _broken = manager.subscribe_status(|_| anyhow::bail!("render failed"));
    let _panicky = manager.subscribe_status(|_| panic!("badge exploded"));
    let seen = record_status(&manager);

    let connecting = manager.connect();
    let peer = remote.next_peer().await;
    peer.open();
    connecting.await.unwrap();

    assert_eq!(manager.status(), ConnectionState::Connected);
    assert_eq!(
        *seen.lock().unwrap(),
        vec![ConnectionState::Connecting, ConnectionState::Connected]
    );
}

#[tokio::test]
async fn test_subscriber_can_call_back_into_manager() {
    let (manager, mut remote) = manager();
    let handle = manager.downgrade();
    let requested = Arc::new(Mutex::new(false));
    let flag = Arc::clone(&requested);
    let _ = manager.subscribe_status(move |state| {
        if state.is_connected() {
            if let Some(manager) = handle.upgrade() {
                *flag.lock().unwrap() = true;
                let _ = manager.disconnect();
            }
        }
        Ok(())
    });

    let connecting = manager.connect();
    let peer = remote.next_peer().await;
    peer.open();
    connecting.await.unwrap();

    wait_for_state(&manager, |s| *s == ConnectionState::Disconnected).await;
    assert!(*requested.lock().unwrap());
    assert!(peer.is_detached());
}

#[tokio::test]
async fn test_dropping_last_handle_stops_driver_with_reentrant_subscriber() {
    let (manager, mut remote) = manager();
    let handle = manager.downgrade();
    let _ = manager.subscribe_status(move |state| {
        if state == ConnectionState::Error {
            if let Some(manager) = handle.upgrade() {
                let _ = manager.connect();
            }
        }
        Ok(())
    });

    let connecting = manager.connect();
    let mut peer = remote.next_peer().await;
    peer.open();
    connecting.await.unwrap();

    let weak = manager.downgrade();
    drop(manager);
    tokio::time::timeout(Duration::from_secs(2), peer.wait_close_request())
        .await
        .expect("driver kept the transport open");
    assert!(weak.upgrade().is_none());
}

#[tokio::test]
async fn test_unawaited_disconnect_still_takes_effect() {
    let (manager, mut remote) = manager();
    let connecting = manager.connect();
    let mut peer = remote.next_peer().await;
    peer.open();
    connecting.await.unwrap();

    drop(manager.disconnect());
    wait_for_state(&manager, |s| *s == ConnectionState::Disconnected).await;
    assert!(peer.close_requested());
    assert_eq!(manager.reconnect_attempts(), 0);
}

#[tokio::test]
async fn test_shared_manager_clones_one_connection() {
    let (manager, mut remote) = manager();
    let other = manager.clone();

    let first = manager.connect();
    let second = other.connect();
    let peer = remote.next_peer().await;
    peer.open();

    assert_eq!(first.await, Ok(()));
    assert_eq!(second.await, Ok(()));
    assert_eq!(other.status(), ConnectionState::Connected);
    assert_eq!(remote.opens(), 1);
}
