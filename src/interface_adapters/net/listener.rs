// Connection listener (component C3).
//
// Grounded on `original_source/src/server/server.c`'s `main`: bind, listen, and an
// infinite accept loop that hands each connection off rather than serving it inline.
// The original additionally ignores `SIGPIPE` process-wide before accepting; that step
// has no equivalent here; a write to a closed `tokio::net::TcpStream` surfaces as an
// `Err` from the write call, it never raises a signal (see DESIGN.md).

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug)]
pub enum ListenerError {
    Bind(std::io::Error),
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Bind(e) => write!(f, "failed to bind listener: {e}"),
        }
    }
}

impl std::error::Error for ListenerError {}

/// Accepts on an already-bound `listener`, forwarding every accepted socket to
/// `lobby_tx` until the channel's receiver is dropped. Takes ownership of the
/// listener rather than an address: the caller binds once (so it can learn the
/// actual port before serving, e.g. for an ephemeral `:0` in tests) and this
/// function never re-binds.
pub async fn run_listener(listener: TcpListener, lobby_tx: mpsc::Sender<TcpStream>) -> Result<(), ListenerError> {
    let addr = listener.local_addr().map_err(ListenerError::Bind)?;
    info!(%addr, "listening");

    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "accept failed");
                continue;
            }
        };
        debug!(%peer, "accepted connection");

        if lobby_tx.send(socket).await.is_err() {
            warn!("lobby channel closed; stopping listener");
            break;
        }
    }

    Ok(())
}
