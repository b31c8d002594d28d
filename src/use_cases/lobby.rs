// Lobby worker (component C4): the single admission loop that authenticates
// connections and moves them into a game once they create or join one.
//
// Grounded on `original_source/src/server/users.c`'s `create_game`/`add_player_to_game`
// for the registry bookkeeping, and on the teacher's `use_cases::game::world_task`
// for the shape of an event loop built from `tokio::select!` over a fixed set of
// channels — generalized here to a dynamically-sized socket set via
// `futures::stream::FuturesUnordered`, since the original's `epoll`-based multiplexer
// has no fixed-arity equivalent in `tokio::select!`.

use crate::frameworks::config::ADMISSION_CHANNEL_CAPACITY;
use crate::interface_adapters::codec::{self, Payload, record};
use crate::interface_adapters::protocol::{ClientMsg, ServerMsg};
use crate::interface_adapters::state::{AppState, GameRecord, UserRecord};
use crate::use_cases::game::game_worker;
use crate::use_cases::types::Admission;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

type ReadOutcome = (u32, TcpStream, Result<(u16, Payload), codec::CodecError>);

async fn read_one(user_id: u32, mut socket: TcpStream) -> ReadOutcome {
    let result = codec::recv_message(&mut socket).await;
    (user_id, socket, result)
}

async fn reply(socket: &mut TcpStream, msg: ServerMsg, payload: Payload) {
    if let Err(_e) = codec::send_message(socket, msg.code(), &payload).await {
        debug!("failed to send reply; connection likely already gone");
    }
}

fn is_authenticated(state: &AppState, user_id: u32) -> bool {
    state
        .users
        .with(user_id, |u| u.username.is_some())
        .unwrap_or(false)
}

/// Runs the lobby's admission loop until the listener's sending half is dropped.
pub async fn lobby_worker(state: Arc<AppState>, mut admission_rx: mpsc::Receiver<TcpStream>) {
    let mut pending = FuturesUnordered::new();

    loop {
        tokio::select! {
            accepted = admission_rx.recv() => {
                match accepted {
                    Some(socket) => {
                        let Ok(user_id) = state.users.add(UserRecord::default()) else {
                            warn!("user registry full; dropping connection");
                            continue;
                        };
                        debug!(user_id, "connection admitted to lobby");
                        pending.push(read_one(user_id, socket));
                    }
                    None => {
                        info!("listener channel closed; lobby shutting down");
                        break;
                    }
                }
            }
            Some((user_id, mut socket, result)) = pending.next(), if !pending.is_empty() => {
                match result {
                    Ok((msg_type, payload)) => {
                        if let Some(socket) = handle_message(&state, user_id, msg_type, payload, socket).await {
                            pending.push(read_one(user_id, socket));
                        }
                    }
                    Err(_) => {
                        debug!(user_id, "connection dropped before joining a game");
                        state.users.release(user_id);
                        let _ = socket.shutdown().await;
                    }
                }
            }
        }
    }
}

/// Dispatches one message from a lobby-resident connection. Returns the socket back
/// if the connection should keep being watched by the lobby, or `None` if it was
/// transferred to a game (or closed).
async fn handle_message(
    state: &Arc<AppState>,
    user_id: u32,
    msg_type: u16,
    payload: Payload,
    mut socket: TcpStream,
) -> Option<TcpStream> {
    let Some(msg) = ClientMsg::from_code(msg_type) else {
        reply(&mut socket, ServerMsg::ErrorUnexpectedMessage, Vec::new()).await;
        return Some(socket);
    };

    match msg {
        ClientMsg::Login => {
            let Some(username) = codec::get_str(&payload, 0, "username").map(str::to_string) else {
                reply(&mut socket, ServerMsg::ErrorMalformedMessage, Vec::new()).await;
                return Some(socket);
            };
            state.users.with(user_id, |u| u.username = Some(username.clone()));
            info!(user_id, %username, "login");
            reply(
                &mut socket,
                ServerMsg::Welcome,
                vec![record(&[
                    ("username", &username),
                    ("user_id", &user_id.to_string()),
                ])],
            )
            .await;
            Some(socket)
        }

        ClientMsg::CreateGame => {
            if !is_authenticated(state, user_id) {
                reply(&mut socket, ServerMsg::ErrorNotAuthenticated, Vec::new()).await;
                return Some(socket);
            }
            let Some(game_name) = codec::get_str(&payload, 0, "game_name").map(str::to_string) else {
                reply(&mut socket, ServerMsg::ErrorCreateGame, Vec::new()).await;
                return Some(socket);
            };
            let username = state
                .users
                .with(user_id, |u| u.username.clone())
                .flatten()
                .unwrap_or_default();

            let (admission_tx, admission_rx) = mpsc::channel::<Admission>(ADMISSION_CHANNEL_CAPACITY);
            let game_id = match state.games.add(GameRecord {
                name: game_name.clone(),
                owner_id: user_id,
                admission_tx: admission_tx.clone(),
                started: false,
            }) {
                Ok(id) => id,
                Err(_) => {
                    reply(&mut socket, ServerMsg::ErrorCreateGame, Vec::new()).await;
                    return Some(socket);
                }
            };
            state.users.with(user_id, |u| u.game_id = game_id);

            info!(game_id, owner_id = user_id, name = %game_name, "game created");
            reply(
                &mut socket,
                ServerMsg::GameCreated,
                vec![record(&[("game_id", &game_id.to_string())])],
            )
            .await;

            tokio::spawn(game_worker(
                Arc::clone(state),
                game_id,
                game_name,
                admission_rx,
            ));

            if admission_tx
                .send(Admission {
                    user_id,
                    username,
                    socket,
                })
                .await
                .is_err()
            {
                warn!(game_id, user_id, "game worker gone before admission");
                state.users.release(user_id);
            }
            None
        }

        ClientMsg::JoinGame => {
            if !is_authenticated(state, user_id) {
                reply(&mut socket, ServerMsg::ErrorNotAuthenticated, Vec::new()).await;
                return Some(socket);
            }
            let Some(game_id) = codec::get_int(&payload, 0, "game_id").map(|v| v as u32) else {
                reply(&mut socket, ServerMsg::ErrorJoinGame, Vec::new()).await;
                return Some(socket);
            };

            let lookup = state.games.with(game_id, |g| {
                if g.started {
                    None
                } else {
                    Some((g.name.clone(), g.admission_tx.clone()))
                }
            });

            let Some(Some((game_name, admission_tx))) = lookup else {
                reply(&mut socket, ServerMsg::ErrorJoinGame, Vec::new()).await;
                return Some(socket);
            };

            let username = state
                .users
                .with(user_id, |u| u.username.clone())
                .flatten()
                .unwrap_or_default();
            state.users.with(user_id, |u| u.game_id = game_id);

            info!(game_id, user_id, "game joined");
            reply(
                &mut socket,
                ServerMsg::GameJoined,
                vec![record(&[("game_name", &game_name)])],
            )
            .await;

            if admission_tx
                .send(Admission {
                    user_id,
                    username,
                    socket,
                })
                .await
                .is_err()
            {
                warn!(game_id, user_id, "game worker gone before admission");
                state.users.release(user_id);
            }
            None
        }

        ClientMsg::LeaveGame => {
            // Equivalent to a clean disconnect from the client side (see SPEC_FULL.md
            // section 9): a user with no game to leave has nothing to clean up beyond
            // the closed socket itself.
            let _ = socket.shutdown().await;
            state.users.release(user_id);
            None
        }

        ClientMsg::ReadyToPlay
        | ClientMsg::StartGame
        | ClientMsg::Attack
        | ClientMsg::SetupFleet => {
            reply(&mut socket, ServerMsg::ErrorUnexpectedMessage, Vec::new()).await;
            Some(socket)
        }
    }
}

