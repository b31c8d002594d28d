// Domain layer: pure game rules, no I/O, no async.

pub mod board;
pub mod fleet;
pub mod rules;

pub use board::{Board, Cell, GRID_SIZE};
pub use fleet::{ShipPlacement, SHIP_SIZES};
pub use rules::{AttackError, AttackOutcome, PlaceError};
