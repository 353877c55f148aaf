//! Shutdown and drain behavior.

mod common;

use cam_test_utils::MockRpcClient;
use common::{spawn_gateway, wait_until};
use std::time::Duration;

#[tokio::test]
async fn shutdown_drains_clients_and_refuses_new_upgrades() {
    let (state, url) = spawn_gateway(|_| {}).await;

    let mut client = MockRpcClient::connect(&url).await.expect("connect");
    assert_eq!(client.call("ping", None).await.unwrap()["result"], "pong");

    // Fire twice: the signal is single-shot and idempotent.
    state.shutdown.fire();
    state.shutdown.fire();
    assert!(state.shutdown.is_fired());

    // The read loop sends a close frame and exits promptly.
    let outcome = tokio::time::timeout(Duration::from_secs(2), client.recv_response()).await;
    match outcome {
        Ok(Err(_)) => {}
        Ok(Ok(frame)) => panic!("expected close, got frame {frame}"),
        Err(_) => panic!("server did not close the connection"),
    }
    assert!(wait_until(|| state.sessions.is_empty()).await);
    assert_eq!(state.metrics.active_connections(), 0);

    // A draining gateway refuses fresh upgrades at the handshake.
    assert!(MockRpcClient::connect(&url).await.is_err());
}

#[tokio::test]
async fn session_cleanup_runs_once_per_connection() {
    let (state, url) = spawn_gateway(|_| {}).await;

    for _ in 0..3 {
        let mut client = MockRpcClient::connect(&url).await.expect("connect");
        assert_eq!(client.call("ping", None).await.unwrap()["result"], "pong");
        client.close().await.expect("close");
    }

    assert!(wait_until(|| state.metrics.active_connections() == 0).await);
    assert!(wait_until(|| state.sessions.is_empty()).await);
    let stats = state.bus.stats();
    assert_eq!(stats.total_clients, 0);
    assert_eq!(stats.active_subscriptions, 0);
}
