//! Last-move inference from full board snapshots
//!
//! The server only ever sends whole boards. To animate a drop the client has
//! to work out which single cell changed between the board it last drew and
//! the one that just arrived. When more than one move landed between two
//! deliveries there is no safe answer, and none is given.

use shared::{BoardSnapshot, CellCoord};

/// Infers the cell played between `previous` and `current`
///
/// Returns the one cell that is occupied in `current` but empty or differently
/// marked in `previous`, even when marks have vanished since `previous`.
/// When `previous` is unknown or has a different size, or when nothing new
/// appeared on a board that lost marks (a reset), falls back to the
/// cold-start rule: if `current` holds exactly one mark, that mark is the move.
/// Every other case yields None.
pub fn infer_last_move(previous: Option<&BoardSnapshot>, current: &BoardSnapshot) -> Option<CellCoord> {
    match previous {
        Some(previous) if previous.same_dimensions(current) => {
            single_new_cell(previous, current).or_else(|| {
                if can_precede(previous, current) {
                    None
                } else {
                    only_occupied_cell(current)
                }
            })
        }
        _ => only_occupied_cell(current),
    }
}

/// True when `previous` has the same size and every mark it holds is still
/// present in `current`
fn can_precede(previous: &BoardSnapshot, current: &BoardSnapshot) -> bool {
    previous.same_dimensions(current)
        && previous
            .occupied()
            .all(|(cell, _)| current.get(cell).is_some())
}

fn single_new_cell(previous: &BoardSnapshot, current: &BoardSnapshot) -> Option<CellCoord> {
    let mut changed = current
        .occupied()
        .filter(|&(cell, mark)| previous.get(cell) != Some(mark))
        .map(|(cell, _)| cell);

    let first = changed.next()?;
    match changed.next() {
        None => Some(first),
        Some(_) => None,
    }
}

/// The cell holding the board's only mark, if there is exactly one
fn only_occupied_cell(current: &BoardSnapshot) -> Option<CellCoord> {
    let mut occupied = current.occupied().map(|(cell, _)| cell);
    let first = occupied.next()?;
    match occupied.next() {
        None => Some(first),
        Some(_) => None,
    }
}

/// True when `incoming` is an older state of the game `retained` shows
///
/// That is a board of the same size holding fewer marks, all of which are
/// still in place on `retained`.
pub fn is_stale(retained: &BoardSnapshot, incoming: &BoardSnapshot) -> bool {
    incoming.occupied_count() < retained.occupied_count() && can_precede(incoming, retained)
}

/// True when `current` is `previous` plus exactly one mark resting on the
/// bottom row or on another mark
pub fn is_successor(previous: &BoardSnapshot, current: &BoardSnapshot) -> bool {
    if !can_precede(previous, current) {
        return false;
    }

    let Some(cell) = single_new_cell(previous, current) else {
        return false;
    };

    let resting = cell.row + 1 == current.rows()
        || current.get(CellCoord::new(cell.row + 1, cell.col)).is_some();
    let was_empty = previous.get(cell).is_none();

    resting && was_empty && current.occupied_count() == previous.occupied_count() + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{BoardEngine, FourInARow, PlayerMark};

    fn empty() -> BoardSnapshot {
        BoardSnapshot::empty(6, 7)
    }

    fn play(board: &BoardSnapshot, columns: &[usize]) -> BoardSnapshot {
        let engine = FourInARow::default();
        columns.iter().fold(board.clone(), |board, &col| {
            let mark = board.current_player();
            engine
                .drop_mark(&board, col, mark)
                .unwrap()
                .snapshot
                .with_current_player(mark.next())
        })
    }

    #[test]
    fn test_single_move_is_inferred() {
        let previous = play(&empty(), &[3, 3, 2]);
        let current = play(&previous, &[4]);
        assert_eq!(infer_last_move(Some(&previous), &current), Some(CellCoord::new(5, 4)));
        assert!(is_successor(&previous, &current));
    }

    #[test]
    fn test_every_single_cell_difference_is_found() {
        let base = play(&empty(), &[0, 1, 2]);
        for col in 0..7 {
            let current = play(&base, &[col]);
            let expected = CellCoord::new(base.landing_row(col).unwrap(), col);
            assert_eq!(infer_last_move(Some(&base), &current), Some(expected));
        }
    }

    #[test]
    fn test_first_move_without_previous() {
        let current = empty().with_mark(CellCoord::new(5, 3), PlayerMark::A);
        assert_eq!(infer_last_move(None, &current), Some(CellCoord::new(5, 3)));
        assert_eq!(infer_last_move(Some(&empty()), &current), Some(CellCoord::new(5, 3)));
    }

    #[test]
    fn test_identical_snapshots_yield_nothing() {
        let board = play(&empty(), &[3, 4, 5]);
        assert_eq!(infer_last_move(Some(&board), &board), None);

        let single = play(&empty(), &[3]);
        assert_eq!(infer_last_move(Some(&single), &single), None);

        assert_eq!(infer_last_move(Some(&empty()), &empty()), None);
    }

    #[test]
    fn test_coalesced_moves_yield_nothing() {
        let previous = play(&empty(), &[0, 1]);
        let current = play(&previous, &[2, 3, 4]);
        assert_eq!(previous.occupied_count(), 2);
        assert_eq!(current.occupied_count(), 5);
        assert_eq!(infer_last_move(Some(&previous), &current), None);
        assert!(!is_successor(&previous, &current));
    }

    #[test]
    fn test_two_moves_yield_nothing() {
        let previous = empty();
        let current = play(&previous, &[2, 5]);
        assert_eq!(infer_last_move(Some(&previous), &current), None);
        assert_eq!(infer_last_move(None, &current), None);
    }

    #[test]
    fn test_changed_mark_counts_as_difference() {
        let previous = empty().with_mark(CellCoord::new(5, 0), PlayerMark::A);
        let current = empty().with_mark(CellCoord::new(5, 0), PlayerMark::B);
        assert_eq!(infer_last_move(Some(&previous), &current), Some(CellCoord::new(5, 0)));
        assert!(!is_successor(&previous, &current));
    }

    #[test]
    fn test_dimension_change_falls_back_to_cold_start() {
        let previous = BoardSnapshot::empty(5, 5);
        let current = empty().with_mark(CellCoord::new(5, 6), PlayerMark::A);
        assert_eq!(infer_last_move(Some(&previous), &current), Some(CellCoord::new(5, 6)));

        let crowded = play(&empty(), &[1, 2]);
        assert_eq!(infer_last_move(Some(&previous), &crowded), None);
    }

    #[test]
    fn test_reset_board_falls_back_to_cold_start() {
        let previous = play(&empty(), &[0, 1, 2, 3]);
        let current = play(&empty(), &[6]);
        assert_eq!(infer_last_move(Some(&previous), &current), Some(CellCoord::new(5, 6)));
    }

    #[test]
    fn test_vanished_marks_do_not_hide_single_new_cell() {
        let previous = empty()
            .with_mark(CellCoord::new(5, 0), PlayerMark::A)
            .with_mark(CellCoord::new(5, 1), PlayerMark::B)
            .with_mark(CellCoord::new(5, 2), PlayerMark::A);
        let current = empty()
            .with_mark(CellCoord::new(5, 0), PlayerMark::A)
            .with_mark(CellCoord::new(5, 4), PlayerMark::B);

        assert_eq!(infer_last_move(Some(&previous), &current), Some(CellCoord::new(5, 4)));
        assert!(!is_successor(&previous, &current));
    }

    #[test]
    fn test_reset_to_a_kept_mark_is_the_only_mark() {
        // Nothing new appeared but the board lost marks
        let previous = play(&empty(), &[0, 1]);
        let current = play(&empty(), &[0]);
        assert_eq!(infer_last_move(Some(&previous), &current), Some(CellCoord::new(5, 0)));

        let shrunk = play(&empty(), &[0, 1, 2]);
        let kept = play(&empty(), &[0, 1]);
        assert_eq!(infer_last_move(Some(&shrunk), &kept), None);
    }

    #[test]
    fn test_older_board_is_stale() {
        let older = play(&empty(), &[3, 3]);
        let newer = play(&older, &[4, 2]);
        assert!(is_stale(&newer, &older));
        assert!(!is_stale(&older, &newer));
        assert!(!is_stale(&newer, &newer));

        // Fewer marks that were never on the retained board
        let other_game = play(&empty(), &[6]);
        assert!(!is_stale(&newer, &other_game));
        assert!(!is_stale(&newer, &BoardSnapshot::empty(5, 5)));
    }

    #[test]
    fn test_floating_mark_is_not_a_successor() {
        let previous = empty();
        let current = empty().with_mark(CellCoord::new(2, 2), PlayerMark::A);
        assert_eq!(infer_last_move(Some(&previous), &current), Some(CellCoord::new(2, 2)));
        assert!(!is_successor(&previous, &current));
    }
}
