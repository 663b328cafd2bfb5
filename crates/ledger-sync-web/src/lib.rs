mod api;
mod state;
mod watcher;

use axum::{
    Router,
    routing::{delete, get, post},
};
use ledger_sync::AutoRunConfig;
use std::{
    net::{Ipv4Addr, SocketAddrV4},
    path::PathBuf,
};
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _};

use state::AppState;

pub const DEFAULT_PORT: u16 = 8472;

fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/accounts",
            get(api::list_accounts).post(api::store_accounts),
        )
        .route(
            "/api/accounts/{id}/transactions",
            get(api::list_transactions),
        )
        .route("/api/transactions", post(api::store_transactions))
        .route("/api/transactions/{id}", delete(api::delete_transaction))
        .route("/api/auto-run", get(api::get_auto_run))
        .route("/api/auto-run/start", post(api::start_auto_run))
        .route("/api/auto-run/complete", post(api::complete_auto_run))
        .route("/api/auto-run/increment", post(api::increment_auto_run))
        .route("/api/auto-run/finish", post(api::finish_auto_run))
        .route("/api/events", get(api::state_changes_stream))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn run(ledger_file: PathBuf, auto_run: AutoRunConfig, port: u16) -> anyhow::Result<()> {
    // Initialize tracing if not already initialized
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ledger_sync_web=info,ledger_sync=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();

    let (state_change_tx, _) = broadcast::channel(100);
    let state = AppState::new(ledger_file, auto_run, state_change_tx)?;

    let watched = state.clone();
    let _watcher = watcher::LedgerWatcher::new(state.ledger_path(), move || {
        if let Err(e) = watched.reload() {
            tracing::error!("Failed to reload ledger: {e:#}");
        }
    })?;

    let app = router(state);

    let listen = SocketAddrV4::new(Ipv4Addr::LOCALHOST, port);
    let listener = tokio::net::TcpListener::bind(listen).await?;
    tracing::info!("Server listening on http://{}", listen);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
