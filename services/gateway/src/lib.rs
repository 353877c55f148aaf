pub mod auth;
pub mod cameras;
pub mod config;
pub mod dispatch;
pub mod events;
pub mod mapper;
pub mod media;
pub mod methods;
pub mod metrics;
pub mod notifiers;
pub mod permissions;
pub mod rate_limit;
pub mod session;
pub mod state;
pub mod validation;
pub mod ws;

pub use state::AppState;

use axum::{Router, routing::get};

/// Build the gateway router: a single upgrade path carrying the JSON-RPC
/// channel.  The method registry is already complete inside `state`, so the
/// gateway is ready the moment this router is served.
pub fn build_router(state: AppState) -> Router {
    let path = state.config.server.path.clone();
    Router::new()
        .route(&path, get(ws::ws_handler))
        .with_state(state)
}
