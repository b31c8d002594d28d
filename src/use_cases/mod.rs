// Use cases layer: application workflows for the game server.

pub mod game;
pub mod lobby;
pub mod types;

pub use game::game_worker;
pub use lobby::lobby_worker;
pub use types::{Admission, GamePhase, PlayerState, Seat};
