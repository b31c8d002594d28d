// End-to-end coverage of the scenarios in SPEC_FULL.md section 8: a client drives
// the real wire protocol over a loopback TCP connection against a fully wired
// server (listener + lobby + game worker), with no mocking of any layer.

mod support;

use battleship_server::interface_adapters::codec::{self, Payload, Record, record};
use battleship_server::interface_adapters::protocol::{ClientMsg, ServerMsg};
use support::TestClient;

fn ship_record(dim: u8, vertical: bool, x: i32, y: i32) -> Record {
    record(&[
        ("dim", &dim.to_string()),
        ("vertical", if vertical { "1" } else { "0" }),
        ("x", &x.to_string()),
        ("y", &y.to_string()),
    ])
}

/// The canonical fleet from SPEC_FULL.md's two-player happy path scenario: one 5,
/// one 4, two 3s, one 2, none overlapping, none out of bounds.
fn canonical_fleet() -> Payload {
    vec![
        ship_record(5, true, 0, 0),
        ship_record(4, false, 0, 6),
        ship_record(3, true, 3, 0),
        ship_record(3, false, 4, 6),
        ship_record(2, true, 8, 0),
    ]
}

async fn login(client: &mut TestClient, username: &str) -> u32 {
    client
        .send(ClientMsg::Login.code(), &vec![record(&[("username", username)])])
        .await;
    let (msg_type, payload) = client.recv().await;
    assert_eq!(msg_type, ServerMsg::Welcome.code());
    codec::get_int(&payload, 0, "user_id").expect("user_id in Welcome") as u32
}

#[tokio::test]
async fn login_then_create_and_join_game() {
    let addr = support::ensure_server();

    let mut owner = TestClient::connect(addr).await;
    login(&mut owner, "alice").await;

    owner
        .send(
            ClientMsg::CreateGame.code(),
            &vec![record(&[("game_name", "alice's game")])],
        )
        .await;
    let (msg_type, payload) = owner.recv().await;
    assert_eq!(msg_type, ServerMsg::GameCreated.code());
    let game_id = codec::get_int(&payload, 0, "game_id").expect("game_id in GameCreated");

    let mut joiner = TestClient::connect(addr).await;
    login(&mut joiner, "bob").await;
    joiner
        .send(
            ClientMsg::JoinGame.code(),
            &vec![record(&[("game_id", &game_id.to_string())])],
        )
        .await;
    let (msg_type, payload) = joiner.recv().await;
    assert_eq!(msg_type, ServerMsg::GameJoined.code());
    assert_eq!(codec::get_str(&payload, 0, "game_name"), Some("alice's game"));
}

#[tokio::test]
async fn ready_to_play_lists_other_players() {
    let addr = support::ensure_server();

    let mut owner = TestClient::connect(addr).await;
    login(&mut owner, "carol").await;
    owner
        .send(ClientMsg::CreateGame.code(), &vec![record(&[("game_name", "room")])])
        .await;
    let (_, payload) = owner.recv().await;
    let game_id = codec::get_int(&payload, 0, "game_id").unwrap();

    let mut joiner = TestClient::connect(addr).await;
    let dave_id = login(&mut joiner, "dave").await;
    joiner
        .send(
            ClientMsg::JoinGame.code(),
            &vec![record(&[("game_id", &game_id.to_string())])],
        )
        .await;
    let _ = joiner.recv().await;

    owner.send(ClientMsg::ReadyToPlay.code(), &Vec::new()).await;
    let (msg_type, payload) = owner.recv().await;
    assert_eq!(msg_type, ServerMsg::GameStateUpdate.code());
    let has_dave = payload
        .iter()
        .any(|rec| rec.iter().any(|(k, v)| k == "player_id" && v == &dave_id.to_string()));
    assert!(has_dave, "owner's GameStateUpdate should list the joined player");

    let (msg_type, payload) = joiner.recv().await;
    assert_eq!(msg_type, ServerMsg::PlayerJoined.code());
    assert_eq!(codec::get_int(&payload, 0, "player_id"), Some(i64::from(dave_id)));
    assert_eq!(codec::get_str(&payload, 0, "username"), Some("dave"));
}

#[tokio::test]
async fn bad_fleet_composition_is_rejected_and_retryable() {
    let addr = support::ensure_server();

    let mut owner = TestClient::connect(addr).await;
    login(&mut owner, "erin").await;
    owner
        .send(ClientMsg::CreateGame.code(), &vec![record(&[("game_name", "room")])])
        .await;
    let (_, payload) = owner.recv().await;
    let game_id = codec::get_int(&payload, 0, "game_id").unwrap();

    let mut joiner = TestClient::connect(addr).await;
    login(&mut joiner, "frank").await;
    joiner
        .send(
            ClientMsg::JoinGame.code(),
            &vec![record(&[("game_id", &game_id.to_string())])],
        )
        .await;
    let _ = joiner.recv().await;

    owner.send(ClientMsg::StartGame.code(), &Vec::new()).await;

    // Two size-5 ships: wrong multiset per the canonical composition.
    let bad_fleet = vec![
        ship_record(5, true, 0, 0),
        ship_record(5, false, 0, 5),
        ship_record(3, true, 3, 0),
        ship_record(3, false, 4, 6),
        ship_record(2, true, 8, 0),
    ];
    owner.send(ClientMsg::SetupFleet.code(), &bad_fleet).await;
    let (msg_type, _) = owner.recv().await;
    assert_eq!(msg_type, ServerMsg::ErrorPlayerAction.code());

    // The same client can retry with a valid fleet; no GameStarted is expected yet
    // because the other player hasn't submitted theirs.
    owner.send(ClientMsg::SetupFleet.code(), &canonical_fleet()).await;
}

#[tokio::test]
async fn fleet_setup_from_both_players_starts_the_match() {
    let addr = support::ensure_server();

    let mut owner = TestClient::connect(addr).await;
    let owner_id = login(&mut owner, "gina").await;
    owner
        .send(ClientMsg::CreateGame.code(), &vec![record(&[("game_name", "room")])])
        .await;
    let (_, payload) = owner.recv().await;
    let game_id = codec::get_int(&payload, 0, "game_id").unwrap();

    let mut joiner = TestClient::connect(addr).await;
    let joiner_id = login(&mut joiner, "hank").await;
    joiner
        .send(
            ClientMsg::JoinGame.code(),
            &vec![record(&[("game_id", &game_id.to_string())])],
        )
        .await;
    let _ = joiner.recv().await;

    owner.send(ClientMsg::StartGame.code(), &Vec::new()).await;
    owner.send(ClientMsg::SetupFleet.code(), &canonical_fleet()).await;
    joiner.send(ClientMsg::SetupFleet.code(), &canonical_fleet()).await;

    let (owner_msg, owner_started) = owner.recv().await;
    let (joiner_msg, joiner_started) = joiner.recv().await;
    assert_eq!(owner_msg, ServerMsg::GameStarted.code());
    assert_eq!(joiner_msg, ServerMsg::GameStarted.code());

    // Both clients see the same turn order; each infers its own turn by finding
    // its own id in the list rather than waiting on a separate YourTurn ping.
    let seats: Vec<i64> = owner_started
        .iter()
        .filter_map(|rec| rec.iter().find(|(k, _)| k == "player_id").map(|(_, v)| v.parse().unwrap()))
        .collect();
    assert_eq!(seats.len(), 2);
    assert!(seats.contains(&i64::from(owner_id)));
    assert!(seats.contains(&i64::from(joiner_id)));
    assert_eq!(joiner_started, owner_started);
}

#[tokio::test]
async fn malformed_frame_closes_the_connection() {
    use tokio::io::AsyncWriteExt;

    let addr = support::ensure_server();
    let mut socket = tokio::net::TcpStream::connect(addr).await.expect("connect");

    // A header declaring a payload far larger than MAX_PAYLOAD_SIZE; the server must
    // treat this as a disconnect rather than attempt to read that many bytes.
    let mut header = Vec::with_capacity(6);
    header.extend_from_slice(&ClientMsg::Login.code().to_le_bytes());
    header.extend_from_slice(&u32::MAX.to_le_bytes());
    socket.write_all(&header).await.expect("write oversized header");
    socket.flush().await.expect("flush");

    // The server closes its side; our next read observes EOF (0 bytes) rather than
    // blocking forever or erroring with anything else.
    let mut buf = [0u8; 1];
    let n = tokio::time::timeout(std::time::Duration::from_secs(5), tokio::io::AsyncReadExt::read(&mut socket, &mut buf))
        .await
        .expect("server should close promptly")
        .expect("read should not error");
    assert_eq!(n, 0, "server should have closed the connection");
}
