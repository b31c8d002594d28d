// Game worker (component C5): per-game event loop driving the
// WAITING_FOR_PLAYERS -> WAITING_FLEET_SETUP -> IN_PROGRESS -> FINISHED state
// machine.
//
// Grounded on the teacher's `use_cases::game::world_task` for the overall shape of a
// `tokio::select!`-driven loop with a shutdown/timer/event trio, generalized to a
// dynamic client socket set via `futures::stream::FuturesUnordered` (the lobby does
// the same, see `use_cases::lobby`), and on `original_source/src/common/game.c` for
// the underlying placement/attack semantics (via `domain::rules`).

use crate::domain::rules::{self, AttackOutcome};
use crate::domain::ShipPlacement;
use crate::frameworks::config::{FLEET_SETUP_TIMEOUT, TURN_TIMEOUT};
use crate::interface_adapters::codec::{self, Payload, record};
use crate::interface_adapters::protocol::{ClientMsg, ServerMsg};
use crate::interface_adapters::state::AppState;
use crate::use_cases::types::{Admission, GamePhase, PlayerState, Seat};

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

type ReadOutcome = (u32, OwnedReadHalf, Result<(u16, Payload), codec::CodecError>);

async fn read_one(user_id: u32, mut reader: OwnedReadHalf) -> ReadOutcome {
    let result = codec::recv_message(&mut reader).await;
    (user_id, reader, result)
}

struct Match {
    id: u32,
    name: String,
    owner_id: u32,
    phase: GamePhase,
    players: Vec<PlayerState>,
    turn_order: Vec<Seat>,
    turn_index: usize,
    fleet_deadline: Option<Instant>,
    turn_deadline: Option<Instant>,
}

impl Match {
    fn new(id: u32, name: String, owner_id: u32) -> Self {
        Self {
            id,
            name,
            owner_id,
            phase: GamePhase::WaitingForPlayers,
            players: Vec::new(),
            turn_order: Vec::new(),
            turn_index: 0,
            fleet_deadline: None,
            turn_deadline: None,
        }
    }

    fn timer_deadline(&self) -> Option<Instant> {
        match self.phase {
            GamePhase::WaitingFleetSetup => self.fleet_deadline,
            GamePhase::InProgress => self.turn_deadline,
            _ => None,
        }
    }

    fn player_mut(&mut self, user_id: u32) -> Option<&mut PlayerState> {
        self.players.iter_mut().find(|p| p.user_id == user_id)
    }

    fn player(&self, user_id: u32) -> Option<&PlayerState> {
        self.players.iter().find(|p| p.user_id == user_id)
    }

    fn all_have_fleets(&self) -> bool {
        !self.players.is_empty() && self.players.iter().all(PlayerState::has_fleet)
    }

    fn current_actor(&self) -> Option<u32> {
        self.turn_order.get(self.turn_index).and_then(|s| s.user_id())
    }

    fn living_count(&self) -> usize {
        self.turn_order
            .iter()
            .filter(|s| matches!(s, Seat::Player(_)))
            .count()
    }

    /// Generates a uniformly shuffled turn order over the currently seated players.
    fn generate_turn_order(&mut self) {
        let mut ids: Vec<u32> = self.players.iter().map(|p| p.user_id).collect();
        ids.shuffle(&mut rand::thread_rng());
        self.turn_order = ids.into_iter().map(Seat::Player).collect();
        self.turn_index = 0;
    }

    fn eliminate(&mut self, user_id: u32) {
        for seat in self.turn_order.iter_mut() {
            if seat.user_id() == Some(user_id) {
                *seat = Seat::Eliminated;
            }
        }
    }

    /// Moves `turn_index` to the next living seat, wrapping around.
    fn advance_turn(&mut self) {
        if self.turn_order.is_empty() {
            return;
        }
        let len = self.turn_order.len();
        for step in 1..=len {
            let idx = (self.turn_index + step) % len;
            if matches!(self.turn_order[idx], Seat::Player(_)) {
                self.turn_index = idx;
                break;
            }
        }
        self.turn_deadline = Some(Instant::now() + TURN_TIMEOUT);
    }
}

async fn send_to(
    connections: &mut HashMap<u32, OwnedWriteHalf>,
    user_id: u32,
    msg: ServerMsg,
    payload: Payload,
) {
    if let Some(writer) = connections.get_mut(&user_id) {
        if codec::send_message(writer, msg.code(), &payload).await.is_err() {
            debug!(user_id, "send failed; connection will be reaped on next read");
        }
    }
}

/// Sends the same message to every connection except `except`. A send failure here
/// is not acted on directly; the affected connection's own pending read eventually
/// errors out and takes the `disconnect` path (see `game_worker`).
async fn broadcast(
    connections: &mut HashMap<u32, OwnedWriteHalf>,
    except: Option<u32>,
    msg: ServerMsg,
    payload: Payload,
) {
    for (&user_id, writer) in connections.iter_mut() {
        if Some(user_id) == except {
            continue;
        }
        if codec::send_message(writer, msg.code(), &payload).await.is_err() {
            debug!(user_id, "broadcast send failed; connection will be reaped on next read");
        }
    }
}

/// Broadcasts `GameStarted`, one record per seat in turn order (see SPEC_FULL.md
/// section 6's message schema table).
async fn broadcast_game_started(m: &Match, connections: &mut HashMap<u32, OwnedWriteHalf>) {
    let records: Payload = m
        .turn_order
        .iter()
        .filter_map(|s| s.user_id())
        .map(|id| record(&[("player_id", &id.to_string())]))
        .collect();
    broadcast(connections, None, ServerMsg::GameStarted, records).await;
}

/// Tells the current actor it's their turn and everyone else whose turn it now is.
async fn notify_turn(m: &Match, connections: &mut HashMap<u32, OwnedWriteHalf>) {
    if let Some(actor) = m.current_actor() {
        send_to(connections, actor, ServerMsg::YourTurn, Vec::new()).await;
        broadcast(
            connections,
            Some(actor),
            ServerMsg::TurnOrderUpdate,
            vec![record(&[("player_turn", &m.turn_index.to_string())])],
        )
        .await;
    }
}

/// Shuffles turn order and moves the match into `InProgress`. Shared by the
/// StartGame-with-all-fleets path, the WaitingFleetSetup timeout path, and the
/// SetupFleet-completes-the-set path.
async fn start_match(m: &mut Match, connections: &mut HashMap<u32, OwnedWriteHalf>) {
    m.phase = GamePhase::InProgress;
    m.fleet_deadline = None;
    m.generate_turn_order();
    m.turn_deadline = Some(Instant::now() + TURN_TIMEOUT);
    info!(game_id = m.id, players = m.players.len(), "match started");
    // The client infers the first actor from GameStarted's turn-order records
    // themselves (see SPEC_FULL.md section 8 scenario 2/3); YourTurn/TurnOrderUpdate
    // are only sent on subsequent turn advances.
    broadcast_game_started(m, connections).await;
}

/// Ends the match, announcing whichever seat is still standing.
async fn finish_match(m: &mut Match, connections: &mut HashMap<u32, OwnedWriteHalf>) {
    let winner = m.turn_order.iter().find_map(|s| s.user_id());
    m.phase = GamePhase::Finished;
    m.turn_deadline = None;
    if let Some(winner_id) = winner {
        broadcast(
            connections,
            None,
            ServerMsg::GameFinished,
            vec![record(&[("winner_id", &winner_id.to_string())])],
        )
        .await;
    }
    info!(game_id = m.id, ?winner, "game finished");
}

/// Parses a `SetupFleet` payload's five ship records. Each record is expected to
/// carry integer `dim`/`vertical`/`x`/`y` fields; `dim` must be in 2..=5 (the widest
/// and narrowest hulls in the canonical fleet). Composition is checked separately by
/// `domain::fleet::composition_matches`.
fn parse_fleet(payload: &Payload) -> Option<[ShipPlacement; crate::domain::fleet::NUM_SHIPS]> {
    use crate::domain::fleet::NUM_SHIPS;

    if payload.len() != NUM_SHIPS {
        return None;
    }
    let mut ships = [ShipPlacement {
        dim: 0,
        vertical: false,
        x: 0,
        y: 0,
    }; NUM_SHIPS];

    for (i, slot) in ships.iter_mut().enumerate() {
        let dim = codec::get_int(payload, i, "dim")?;
        let vertical = codec::get_int(payload, i, "vertical")?;
        let x = codec::get_int(payload, i, "x")?;
        let y = codec::get_int(payload, i, "y")?;
        if !(2..=5).contains(&dim) {
            return None;
        }
        *slot = ShipPlacement {
            dim: dim as u8,
            vertical: vertical != 0,
            x: x as i32,
            y: y as i32,
        };
    }
    Some(ships)
}

/// Runs one game's event loop until every player has left.
pub async fn game_worker(
    state: Arc<AppState>,
    game_id: u32,
    name: String,
    mut admission_rx: mpsc::Receiver<Admission>,
) {
    let mut connections: HashMap<u32, OwnedWriteHalf> = HashMap::new();
    let mut pending = FuturesUnordered::new();
    let mut game: Option<Match> = None;

    loop {
        let deadline = game.as_ref().and_then(Match::timer_deadline);
        let timer = async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(at.into()).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = timer => {
                let Some(m) = game.as_mut() else { continue };
                handle_timeout(&state, m, &mut connections).await;
            }
            admitted = admission_rx.recv() => {
                match admitted {
                    Some(admission) => {
                        if let Some((user_id, reader)) = admit(&mut game, &mut connections, game_id, &name, admission).await {
                            pending.push(read_one(user_id, reader));
                        }
                    }
                    None => {
                        debug!(game_id, "admission channel closed");
                    }
                }
            }
            Some((user_id, reader, result)) = pending.next(), if !pending.is_empty() => {
                let Some(m) = game.as_mut() else { continue };
                match result {
                    Ok((msg_type, payload)) => {
                        handle_message(&state, m, &mut connections, user_id, msg_type, payload).await;
                        if connections.contains_key(&user_id) {
                            pending.push(read_one(user_id, reader));
                        }
                    }
                    Err(_) => {
                        disconnect(&state, m, &mut connections, user_id).await;
                    }
                }
            }
        }

        if let Some(m) = game.as_ref() {
            if m.players.is_empty() {
                state.games.release(game_id);
                info!(game_id, "game empty; worker exiting");
                break;
            }
            if matches!(m.phase, GamePhase::Finished) {
                break;
            }
        }
    }

    for (_, mut writer) in connections.drain() {
        let _ = writer.shutdown().await;
    }
}

/// Admits a newly arrived socket into the match, unless it has already started.
/// Returns the read half to watch when admission succeeds.
async fn admit(
    game: &mut Option<Match>,
    connections: &mut HashMap<u32, OwnedWriteHalf>,
    game_id: u32,
    name: &str,
    admission: Admission,
) -> Option<(u32, OwnedReadHalf)> {
    let Admission {
        user_id,
        username,
        mut socket,
    } = admission;

    let m = game.get_or_insert_with(|| Match::new(game_id, name.to_string(), user_id));

    if !matches!(m.phase, GamePhase::WaitingForPlayers) {
        warn!(game_id, user_id, "rejecting late join; game already started");
        let _ = socket.shutdown().await;
        return None;
    }

    info!(game_id, user_id, %username, "player admitted to game");
    m.players.push(PlayerState::new(user_id, username));

    let (reader, writer) = socket.into_split();
    connections.insert(user_id, writer);
    Some((user_id, reader))
}

/// Handles the match's active deadline firing: fleet-setup players who never sent a
/// fleet are evicted, or an idle turn is skipped to the next living seat.
async fn handle_timeout(state: &Arc<AppState>, m: &mut Match, connections: &mut HashMap<u32, OwnedWriteHalf>) {
    match m.phase {
        GamePhase::WaitingFleetSetup => {
            let late: Vec<u32> = m
                .players
                .iter()
                .filter(|p| !p.has_fleet())
                .map(|p| p.user_id)
                .collect();
            for user_id in late {
                warn!(game_id = m.id, user_id, "fleet setup timed out; evicting player");
                disconnect(state, m, connections, user_id).await;
            }
            if m.players.is_empty() || matches!(m.phase, GamePhase::Finished) {
                return;
            }
            start_match(m, connections).await;
        }
        GamePhase::InProgress => {
            if let Some(actor) = m.current_actor() {
                warn!(game_id = m.id, user_id = actor, "turn timed out");
            }
            m.advance_turn();
            notify_turn(m, connections).await;
        }
        _ => {}
    }
}

/// Dispatches one in-game message per the table in SPEC_FULL.md section 4.5.
async fn handle_message(
    state: &Arc<AppState>,
    m: &mut Match,
    connections: &mut HashMap<u32, OwnedWriteHalf>,
    user_id: u32,
    msg_type: u16,
    payload: Payload,
) {
    let Some(msg) = ClientMsg::from_code(msg_type) else {
        send_to(connections, user_id, ServerMsg::ErrorUnexpectedMessage, Vec::new()).await;
        return;
    };

    match msg {
        ClientMsg::ReadyToPlay => {
            let mut records: Payload = vec![record(&[
                ("type", "game_info"),
                ("game_id", &m.id.to_string()),
                ("game_name", &m.name),
            ])];
            for p in &m.players {
                if p.user_id == user_id {
                    continue;
                }
                records.push(record(&[
                    ("type", "player_info"),
                    ("player_id", &p.user_id.to_string()),
                    ("username", &p.username),
                ]));
            }
            send_to(connections, user_id, ServerMsg::GameStateUpdate, records).await;

            if let Some(p) = m.player(user_id) {
                let username = p.username.clone();
                broadcast(
                    connections,
                    Some(user_id),
                    ServerMsg::PlayerJoined,
                    vec![record(&[("player_id", &user_id.to_string()), ("username", &username)])],
                )
                .await;
            }
        }

        ClientMsg::SetupFleet => {
            if !matches!(m.phase, GamePhase::WaitingForPlayers | GamePhase::WaitingFleetSetup) {
                send_to(connections, user_id, ServerMsg::ErrorUnexpectedMessage, Vec::new()).await;
                return;
            }
            let Some(ships) = parse_fleet(&payload) else {
                send_to(connections, user_id, ServerMsg::ErrorPlayerAction, Vec::new()).await;
                return;
            };
            if !crate::domain::fleet::composition_matches(&ships) {
                send_to(connections, user_id, ServerMsg::ErrorPlayerAction, Vec::new()).await;
                return;
            }
            match rules::place_fleet(&ships) {
                Ok(board) => {
                    if let Some(p) = m.player_mut(user_id) {
                        p.board = Some(board);
                    }
                    info!(game_id = m.id, user_id, "fleet placed");
                    if matches!(m.phase, GamePhase::WaitingFleetSetup) && m.all_have_fleets() {
                        start_match(m, connections).await;
                    }
                }
                Err(_) => {
                    send_to(connections, user_id, ServerMsg::ErrorPlayerAction, Vec::new()).await;
                }
            }
        }

        ClientMsg::StartGame => {
            if !matches!(m.phase, GamePhase::WaitingForPlayers) || user_id != m.owner_id {
                send_to(connections, user_id, ServerMsg::ErrorPlayerAction, Vec::new()).await;
                return;
            }
            state.games.with(m.id, |g| g.started = true);
            info!(game_id = m.id, "game started by owner");
            if m.all_have_fleets() {
                start_match(m, connections).await;
            } else {
                m.phase = GamePhase::WaitingFleetSetup;
                m.fleet_deadline = Some(Instant::now() + FLEET_SETUP_TIMEOUT);
            }
        }

        ClientMsg::Attack => {
            if !matches!(m.phase, GamePhase::InProgress) || m.current_actor() != Some(user_id) {
                send_to(connections, user_id, ServerMsg::ErrorNotYourTurn, Vec::new()).await;
                return;
            }
            let target_id = codec::get_int(&payload, 0, "player_id").map(|v| v as u32);
            let x = codec::get_int(&payload, 0, "x");
            let y = codec::get_int(&payload, 0, "y");
            let (Some(target_id), Some(x), Some(y)) = (target_id, x, y) else {
                send_to(connections, user_id, ServerMsg::ErrorPlayerAction, Vec::new()).await;
                return;
            };

            let Some(target) = m.player_mut(target_id) else {
                send_to(connections, user_id, ServerMsg::ErrorPlayerAction, Vec::new()).await;
                return;
            };
            let Some(board) = target.board.as_mut() else {
                send_to(connections, user_id, ServerMsg::ErrorPlayerAction, Vec::new()).await;
                return;
            };

            match rules::attack(board, x as i32, y as i32) {
                Err(_) => {
                    send_to(connections, user_id, ServerMsg::ErrorPlayerAction, Vec::new()).await;
                }
                Ok(outcome) => {
                    let result = match outcome {
                        AttackOutcome::Miss => "miss",
                        AttackOutcome::Hit => "hit",
                        AttackOutcome::Sunk | AttackOutcome::SunkLastShip => "sunk",
                    };
                    broadcast(
                        connections,
                        None,
                        ServerMsg::AttackUpdate,
                        vec![record(&[
                            ("attacker_id", &user_id.to_string()),
                            ("attacked_id", &target_id.to_string()),
                            ("x", &x.to_string()),
                            ("y", &y.to_string()),
                            ("result", result),
                        ])],
                    )
                    .await;

                    if matches!(outcome, AttackOutcome::SunkLastShip) {
                        m.eliminate(target_id);
                    }
                    if m.living_count() <= 1 {
                        finish_match(m, connections).await;
                    } else {
                        m.advance_turn();
                        notify_turn(m, connections).await;
                    }
                }
            }
        }

        ClientMsg::Login | ClientMsg::CreateGame | ClientMsg::JoinGame | ClientMsg::LeaveGame => {
            send_to(connections, user_id, ServerMsg::ErrorUnexpectedMessage, Vec::new()).await;
        }
    }
}

/// Cleans up after a connection drops, mid-game or not: closes the write half,
/// marks the seat eliminated, drops the player record, and releases the user slot.
async fn disconnect(state: &Arc<AppState>, m: &mut Match, connections: &mut HashMap<u32, OwnedWriteHalf>, user_id: u32) {
    if let Some(mut writer) = connections.remove(&user_id) {
        let _ = writer.shutdown().await;
    }
    let was_current = m.current_actor() == Some(user_id);
    m.eliminate(user_id);
    m.players.retain(|p| p.user_id != user_id);
    state.users.release(user_id);
    info!(game_id = m.id, user_id, "player disconnected");

    broadcast(
        connections,
        None,
        ServerMsg::PlayerLeft,
        vec![record(&[("player_id", &user_id.to_string())])],
    )
    .await;

    if matches!(m.phase, GamePhase::InProgress) {
        if m.living_count() <= 1 {
            finish_match(m, connections).await;
        } else if was_current {
            m.advance_turn();
            notify_turn(m, connections).await;
        }
    }
}
