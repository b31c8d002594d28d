// Pure rule functions: placing ships and resolving attacks.
//
// Grounded on `original_source/src/common/game.c`'s `place_ship`/`attack`, with two
// deliberate departures called out in SPEC_FULL.md section 4.6:
//   - a placement occupies the ship's full `dim`-length footprint, not one cell;
//   - adjacency between ships is permitted (the original rejected it);
//   - a ship's individual sunk state is tracked, so the caller can tell "this ship
//     just went down" apart from "the whole fleet is down".

use super::board::{Board, Cell};
use super::fleet::ShipPlacement;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceError {
    OutOfBounds,
    Overlap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttackError {
    OutOfBounds,
    AlreadyAttacked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttackOutcome {
    Miss,
    Hit,
    /// This attack sank a ship, but other ships remain afloat.
    Sunk,
    /// This attack sank the last remaining ship on the board.
    SunkLastShip,
}

fn footprint(ship: &ShipPlacement) -> Option<Vec<(i32, i32)>> {
    let mut cells = Vec::with_capacity(ship.dim as usize);
    for i in 0..ship.dim as i32 {
        let (x, y) = if ship.vertical {
            (ship.x, ship.y + i)
        } else {
            (ship.x + i, ship.y)
        };
        if !Board::in_bounds(x, y) {
            return None;
        }
        cells.push((x, y));
    }
    Some(cells)
}

/// Places a single ship on `board`. On failure the board is left untouched.
pub fn place_ship(board: &mut Board, ship: &ShipPlacement) -> Result<(), PlaceError> {
    let cells = footprint(ship).ok_or(PlaceError::OutOfBounds)?;
    for &(x, y) in &cells {
        if board.cell(x as usize, y as usize) != Cell::Empty {
            return Err(PlaceError::Overlap);
        }
    }

    let index = board.push_ship(ship.dim);
    for (x, y) in cells {
        board.set_cell(x as usize, y as usize, Cell::Ship(index));
    }
    Ok(())
}

/// Places every ship in `ships` on a fresh board, rolling back entirely on the first
/// failure. Callers are expected to have already validated the fleet composition.
pub fn place_fleet(ships: &[ShipPlacement]) -> Result<Board, PlaceError> {
    let mut board = Board::new();
    for ship in ships {
        place_ship(&mut board, ship)?;
    }
    Ok(board)
}

/// Resolves an attack against `board` at `(x, y)`.
pub fn attack(board: &mut Board, x: i32, y: i32) -> Result<AttackOutcome, AttackError> {
    if !Board::in_bounds(x, y) {
        return Err(AttackError::OutOfBounds);
    }
    let (ux, uy) = (x as usize, y as usize);

    match board.cell(ux, uy) {
        Cell::Hit(_) | Cell::Miss => Err(AttackError::AlreadyAttacked),
        Cell::Empty => {
            board.set_cell(ux, uy, Cell::Miss);
            Ok(AttackOutcome::Miss)
        }
        Cell::Ship(index) => {
            board.set_cell(ux, uy, Cell::Hit(index));
            let status = board.ship_mut(index);
            status.hits += 1;
            let sunk = status.is_sunk();

            if !sunk {
                return Ok(AttackOutcome::Hit);
            }
            if board.all_ships_sunk() {
                Ok(AttackOutcome::SunkLastShip)
            } else {
                Ok(AttackOutcome::Sunk)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ship(dim: u8, vertical: bool, x: i32, y: i32) -> ShipPlacement {
        ShipPlacement {
            dim,
            vertical,
            x,
            y,
        }
    }

    #[test]
    fn place_ship_rejects_out_of_bounds() {
        let mut board = Board::new();
        let result = place_ship(&mut board, &ship(5, false, 7, 0));
        assert_eq!(result, Err(PlaceError::OutOfBounds));
    }

    #[test]
    fn place_ship_rejects_overlap() {
        let mut board = Board::new();
        place_ship(&mut board, &ship(3, false, 0, 0)).unwrap();
        let result = place_ship(&mut board, &ship(2, true, 1, 0));
        assert_eq!(result, Err(PlaceError::Overlap));
    }

    #[test]
    fn place_ship_permits_adjacency() {
        let mut board = Board::new();
        place_ship(&mut board, &ship(3, false, 0, 0)).unwrap();
        let result = place_ship(&mut board, &ship(2, false, 0, 1));
        assert!(result.is_ok());
    }

    #[test]
    fn attack_reports_hit_then_sunk() {
        let mut board = Board::new();
        place_ship(&mut board, &ship(2, false, 0, 0)).unwrap();
        assert_eq!(attack(&mut board, 0, 0), Ok(AttackOutcome::Hit));
        assert_eq!(attack(&mut board, 1, 0), Ok(AttackOutcome::SunkLastShip));
    }

    #[test]
    fn attack_distinguishes_sunk_from_sunk_last_ship() {
        let mut board = Board::new();
        place_ship(&mut board, &ship(2, false, 0, 0)).unwrap();
        place_ship(&mut board, &ship(2, false, 0, 1)).unwrap();
        assert_eq!(attack(&mut board, 0, 0), Ok(AttackOutcome::Hit));
        assert_eq!(attack(&mut board, 1, 0), Ok(AttackOutcome::Sunk));
        assert_eq!(attack(&mut board, 0, 1), Ok(AttackOutcome::Hit));
        assert_eq!(attack(&mut board, 1, 1), Ok(AttackOutcome::SunkLastShip));
    }

    #[test]
    fn attack_rejects_double_strike() {
        let mut board = Board::new();
        attack(&mut board, 3, 3).unwrap();
        assert_eq!(attack(&mut board, 3, 3), Err(AttackError::AlreadyAttacked));
    }

    #[test]
    fn attack_rejects_out_of_bounds() {
        let mut board = Board::new();
        assert_eq!(attack(&mut board, -1, 0), Err(AttackError::OutOfBounds));
    }
}
