// Framework bootstrap for the game server runtime.

use crate::frameworks::config::{self, Cli};
use crate::interface_adapters::net::run_listener;
use crate::interface_adapters::state::AppState;
use crate::use_cases::lobby::lobby_worker;

use std::io::Result;
use std::net::SocketAddr;
use std::sync::Arc;

fn init_runtime() {
    let _ = dotenvy::dotenv();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::capture();
        tracing::error!(%info, ?backtrace, "panic");
    }));
}

/// Wires up shared state and spawns the listener and lobby tasks against an
/// already-bound socket, then waits for either to exit.
pub async fn run(listener: tokio::net::TcpListener) -> Result<()> {
    let (lobby_tx, lobby_rx) = tokio::sync::mpsc::channel(config::LISTENER_CHANNEL_CAPACITY);
    let state = AppState::new();

    let lobby_handle = tokio::spawn(lobby_worker(Arc::clone(&state), lobby_rx));
    if let Err(e) = run_listener(listener, lobby_tx).await {
        tracing::error!(error = %e, "listener exited with an error");
    }

    let _ = lobby_handle.await;
    Ok(())
}

/// Parses CLI arguments, initializes logging, and binds the listener before handing
/// off to `run`.
pub async fn run_with_config() -> Result<()> {
    init_runtime();

    let cli = Cli::parse_spec_compliant();
    let address = SocketAddr::from(([0, 0, 0, 0], cli.port));

    let listener = tokio::net::TcpListener::bind(address)
        .await
        .inspect_err(|e| {
            tracing::error!(%address, error = %e, "failed to bind");
        })?;

    run(listener).await
}
