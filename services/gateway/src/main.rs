use gateway::config;
use gateway::media::backend::InProcessMedia;
use gateway::state::AppState;
use std::env;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .init();

    let config = match config::load_config() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            std::process::exit(1);
        }
    };

    let media = Arc::new(InProcessMedia::new());
    let media_controller: Arc<dyn gateway::media::MediaController> = media.clone();
    let state = AppState::new(config, media_controller, media);

    if let Some(token_file) = state.config.auth.token_file.clone() {
        match state.tokens.load_seed_file(&token_file) {
            Ok(count) => info!(count, path = %token_file.display(), "token seeds loaded"),
            Err(e) => {
                error!(error = %e, "failed to load token seed file");
                std::process::exit(1);
            }
        }
    }

    let bind_addr = state.config.bind_addr();
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(addr = %bind_addr, error = %e, "failed to bind");
            std::process::exit(1);
        }
    };
    info!(addr = %bind_addr, path = %state.config.server.path, "gateway listening");

    state.system_notifier().startup(env!("CARGO_PKG_VERSION"));

    let router = gateway::build_router(state.clone());
    let shutdown = state.shutdown.clone();
    let drain_state = state.clone();
    let mut server_task = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown_signal().await;
                info!("shutdown signal received, draining");
                drain_state.system_notifier().shutdown("signal received");
                drain_state.shutdown.fire();
            })
            .await
    });

    // Wait for the drain to begin, then bound it: loops get
    // shutdown_timeout to exit on their own, stragglers are force-closed
    // and given client_cleanup_timeout to finish tearing down.
    let mut shutdown_rx = shutdown.subscribe();
    tokio::select! {
        result = &mut server_task => {
            report_server_exit(result);
            return;
        }
        _ = shutdown_rx.changed() => {}
    }

    let grace = state.config.server.shutdown_timeout;
    tokio::select! {
        result = &mut server_task => report_server_exit(result),
        _ = tokio::time::sleep(grace) => {
            warn!("drain deadline exceeded, force-closing remaining connections");
            server_task.abort();
            let cleanup = state.config.server.client_cleanup_timeout;
            let _ = tokio::time::timeout(cleanup, server_task).await;
        }
    }
    info!("gateway shut down");
}

fn report_server_exit(result: Result<std::io::Result<()>, tokio::task::JoinError>) {
    match result {
        Ok(Ok(())) => info!("server shut down gracefully"),
        Ok(Err(e)) => error!(error = %e, "server error"),
        Err(e) => error!(error = %e, "server task failed"),
    }
}

/// Waits for SIGTERM or Ctrl-C (SIGINT) and returns to trigger graceful shutdown.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
