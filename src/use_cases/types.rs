// Shared application-level types for the lobby and game workflows.

use crate::domain::Board;
use tokio::net::TcpStream;

/// A socket handed from the lobby to a game worker once a player has been admitted.
pub struct Admission {
    pub user_id: u32,
    pub username: String,
    pub socket: TcpStream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GamePhase {
    WaitingForPlayers,
    WaitingFleetSetup,
    InProgress,
    Finished,
}

#[derive(Debug, Clone)]
pub struct PlayerState {
    pub user_id: u32,
    pub username: String,
    /// `None` until the player's fleet has been placed.
    pub board: Option<Board>,
}

impl PlayerState {
    pub fn new(user_id: u32, username: String) -> Self {
        Self {
            user_id,
            username,
            board: None,
        }
    }

    pub fn has_fleet(&self) -> bool {
        self.board.is_some()
    }
}

/// A seat in turn order: a living player's id, or `Eliminated` once their fleet is
/// fully sunk. Seats keep their index stable so turn-order broadcasts stay meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seat {
    Player(u32),
    Eliminated,
}

impl Seat {
    pub fn user_id(self) -> Option<u32> {
        match self {
            Seat::Player(id) => Some(id),
            Seat::Eliminated => None,
        }
    }
}
