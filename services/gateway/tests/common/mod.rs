//! Shared harness: boot a real gateway on an ephemeral port and hand back
//! the state plus the WebSocket URL.

use gateway::config::GatewayConfig;
use gateway::media::backend::InProcessMedia;
use gateway::permissions::Role;
use gateway::state::AppState;
use std::sync::Arc;
use std::time::Duration;

/// Tokens seeded into every test gateway.
pub const VIEWER_TOKEN: &str = "viewer.v-secret";
pub const OPERATOR_TOKEN: &str = "op.o-secret";
pub const ADMIN_TOKEN: &str = "adm.a-secret";

pub async fn spawn_gateway(mutate: impl FnOnce(&mut GatewayConfig)) -> (AppState, String) {
    let mut config = GatewayConfig::default();
    config.server.host = "127.0.0.1".to_owned();
    mutate(&mut config);

    let media = Arc::new(InProcessMedia::new());
    let media_controller: Arc<dyn gateway::media::MediaController> = media.clone();
    let state = AppState::new(config, media_controller, media);
    state
        .tokens
        .insert("viewer", "v-secret", "vera", Role::Viewer, None);
    state
        .tokens
        .insert("op", "o-secret", "oscar", Role::Operator, None);
    state
        .tokens
        .insert("adm", "a-secret", "ada", Role::Admin, None);

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0))
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");
    let router = gateway::build_router(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });

    let url = format!("ws://{addr}{}", state.config.server.path);
    (state, url)
}

/// Poll until `predicate` holds or the deadline passes.
pub async fn wait_until(mut predicate: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    predicate()
}
